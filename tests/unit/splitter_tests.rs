//! Lane splitting and batch chunking.

use lanefarm::models::job::JobDescriptor;
use lanefarm::orchestrator::splitter::{chunk, plan_lanes, split};
use lanefarm::AppError;

fn jobs(n: usize) -> Vec<JobDescriptor> {
    (0..n).map(|i| JobDescriptor::from(format!("job-{i}"))).collect()
}

#[test]
fn split_sizes_differ_by_at_most_one() {
    for n in [0_usize, 1, 7, 10, 99, 250, 1001] {
        for lanes in 1..=9 {
            let input: Vec<usize> = (0..n).collect();
            let out = split(&input, lanes).expect("split");
            assert_eq!(out.len(), lanes);

            let max = out.iter().map(Vec::len).max().unwrap();
            let min = out.iter().map(Vec::len).min().unwrap();
            assert!(max - min <= 1, "n={n} lanes={lanes} sizes {min}..{max}");

            let rejoined: Vec<usize> = out.into_iter().flatten().collect();
            assert_eq!(rejoined, input, "concatenation must reproduce the input");
        }
    }
}

#[test]
fn split_gives_extra_jobs_to_leading_lanes() {
    let out = split(&[1, 2, 3, 4, 5, 6, 7], 3).expect("split");
    assert_eq!(out, vec![vec![1, 2, 3], vec![4, 5], vec![6, 7]]);
}

#[test]
fn split_with_more_lanes_than_jobs_leaves_empty_lanes() {
    let out = split(&["a", "b"], 4).expect("split");
    assert_eq!(out.iter().map(Vec::len).collect::<Vec<_>>(), vec![1, 1, 0, 0]);
}

#[test]
fn split_rejects_zero_lanes() {
    assert!(matches!(split(&[1, 2, 3], 0), Err(AppError::Config(_))));
}

#[test]
fn chunk_produces_ceil_batches() {
    for n in [0_usize, 1, 99, 100, 101, 125, 250] {
        for max in [1_usize, 3, 100] {
            let input: Vec<usize> = (0..n).collect();
            let batches = chunk(&input, max).expect("chunk");

            assert_eq!(batches.len(), n.div_ceil(max), "n={n} max={max}");
            for (i, batch) in batches.iter().enumerate() {
                assert!(!batch.is_empty());
                if i + 1 < batches.len() {
                    assert_eq!(batch.len(), max);
                } else {
                    assert!(batch.len() <= max);
                }
            }
            let rejoined: Vec<usize> = batches.into_iter().flatten().collect();
            assert_eq!(rejoined, input);
        }
    }
}

#[test]
fn chunk_rejects_zero_batch_size() {
    assert!(matches!(chunk(&[1, 2, 3], 0), Err(AppError::Config(_))));
}

#[test]
fn plan_for_250_jobs_over_two_lanes() {
    let input = jobs(250);
    let plan = plan_lanes(&input, 2, 100).expect("plan");

    assert_eq!(plan.len(), 2);
    for (lane, batches) in plan.iter().enumerate() {
        let sizes: Vec<usize> = batches.iter().map(|b| b.len()).collect();
        assert_eq!(sizes, vec![100, 25]);
        for (index, batch) in batches.iter().enumerate() {
            assert_eq!(batch.lane, lane);
            assert_eq!(batch.index, index);
        }
    }

    let total: usize = plan.iter().flatten().map(|b| b.len()).sum();
    assert_eq!(total, 250);

    assert_eq!(plan[0][0].jobs[0], JobDescriptor::from("job-0"));
    assert_eq!(plan[1][0].jobs[0], JobDescriptor::from("job-125"));
    assert_eq!(plan[1][1].jobs[24], JobDescriptor::from("job-249"));
}

#[test]
fn plan_rejects_invalid_bounds() {
    let input = jobs(3);
    assert!(plan_lanes(&input, 0, 10).is_err());
    assert!(plan_lanes(&input, 2, 0).is_err());
}
