//! Partition a job list into lanes and size-bounded batches.

use crate::models::job::{Batch, JobDescriptor};
use crate::{AppError, Result};

/// Split `jobs` into `num_lanes` contiguous lanes whose sizes differ by at
/// most one. The first `len % num_lanes` lanes receive the extra job.
///
/// # Errors
///
/// Returns `AppError::Config` if `num_lanes` is zero.
pub fn split<T: Clone>(jobs: &[T], num_lanes: usize) -> Result<Vec<Vec<T>>> {
    if num_lanes == 0 {
        return Err(AppError::Config("lane count must be greater than zero".into()));
    }

    let base = jobs.len() / num_lanes;
    let extra = jobs.len() % num_lanes;

    let mut lanes = Vec::with_capacity(num_lanes);
    let mut start = 0;
    for lane in 0..num_lanes {
        let size = base + usize::from(lane < extra);
        lanes.push(jobs[start..start + size].to_vec());
        start += size;
    }

    Ok(lanes)
}

/// Chunk one lane's jobs into `ceil(len / max_per_batch)` batches of
/// `max_per_batch` jobs, the last one possibly shorter.
///
/// # Errors
///
/// Returns `AppError::Config` if `max_per_batch` is zero.
pub fn chunk<T: Clone>(lane_jobs: &[T], max_per_batch: usize) -> Result<Vec<Vec<T>>> {
    if max_per_batch == 0 {
        return Err(AppError::Config(
            "max_per_batch must be greater than zero".into(),
        ));
    }

    Ok(lane_jobs
        .chunks(max_per_batch)
        .map(<[T]>::to_vec)
        .collect())
}

/// Split and chunk in one pass, tagging every batch with its lane and index.
///
/// # Errors
///
/// Returns `AppError::Config` if either bound is zero.
pub fn plan_lanes(
    jobs: &[JobDescriptor],
    num_lanes: usize,
    max_per_batch: usize,
) -> Result<Vec<Vec<Batch>>> {
    split(jobs, num_lanes)?
        .into_iter()
        .enumerate()
        .map(|(lane, lane_jobs)| {
            Ok(chunk(&lane_jobs, max_per_batch)?
                .into_iter()
                .enumerate()
                .map(|(index, jobs)| Batch { lane, index, jobs })
                .collect())
        })
        .collect()
}
