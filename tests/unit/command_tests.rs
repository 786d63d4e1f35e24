//! Command template expansion.

use std::collections::HashMap;

use lanefarm::command::{CommandBuilder, TemplateCommand, ENV_BATCH, ENV_JOBS_FILE, ENV_LANE};
use lanefarm::config::CommandConfig;
use lanefarm::models::job::{Batch, JobDescriptor};

fn batch() -> Batch {
    Batch {
        lane: 1,
        index: 2,
        jobs: vec![
            JobDescriptor::from("scene-a"),
            JobDescriptor(serde_json::json!({"seed": 7})),
        ],
    }
}

fn template(args: &[&str]) -> TemplateCommand {
    TemplateCommand::new(CommandConfig {
        program: "blender".into(),
        args: args.iter().map(|a| (*a).to_owned()).collect(),
        env: HashMap::from([("OUT".to_owned(), "frames/{lane}/{batch}".to_owned())]),
        working_dir: None,
    })
}

#[test]
fn expands_placeholders() {
    let temp = tempfile::tempdir().expect("tempdir");
    let command = template(&[
        "--background",
        "--jobs={jobs_file}",
        "--lane",
        "{lane}",
        "--batch",
        "{batch}",
        "--count={job_count}",
    ]);

    let invocation = command.set_job(&batch(), temp.path()).expect("invocation");
    let jobs_file = TemplateCommand::jobs_file_path(&batch(), temp.path());

    assert_eq!(invocation.program, "blender");
    assert_eq!(
        invocation.args,
        vec![
            "--background".to_owned(),
            format!("--jobs={}", jobs_file.display()),
            "--lane".to_owned(),
            "1".to_owned(),
            "--batch".to_owned(),
            "2".to_owned(),
            "--count=2".to_owned(),
        ]
    );
}

#[test]
fn jobs_placeholder_expands_to_one_arg_per_job() {
    let temp = tempfile::tempdir().expect("tempdir");
    let command = template(&["--", "{jobs}", "--end"]);

    let invocation = command.set_job(&batch(), temp.path()).expect("invocation");
    assert_eq!(invocation.args, vec!["--", "scene-a", r#"{"seed":7}"#, "--end"]);
}

#[test]
fn writes_jobs_file_with_batch_contents() {
    let temp = tempfile::tempdir().expect("tempdir");
    let command = template(&[]);

    command.set_job(&batch(), temp.path()).expect("invocation");

    let path = TemplateCommand::jobs_file_path(&batch(), temp.path());
    assert_eq!(path.file_name().unwrap(), "jobs_01_002.json");
    let written: Vec<JobDescriptor> =
        serde_json::from_str(&std::fs::read_to_string(&path).expect("read")).expect("json");
    assert_eq!(written, batch().jobs);
}

#[test]
fn sets_lane_environment() {
    let temp = tempfile::tempdir().expect("tempdir");
    let invocation = template(&[]).set_job(&batch(), temp.path()).expect("invocation");

    let env: HashMap<_, _> = invocation.env.into_iter().collect();
    assert_eq!(env.get(ENV_LANE).map(String::as_str), Some("1"));
    assert_eq!(env.get(ENV_BATCH).map(String::as_str), Some("2"));
    assert!(env.get(ENV_JOBS_FILE).is_some_and(|p| p.ends_with("jobs_01_002.json")));
    assert_eq!(env.get("OUT").map(String::as_str), Some("frames/1/2"));
}

#[test]
fn missing_scratch_dir_fails() {
    let temp = tempfile::tempdir().expect("tempdir");
    let result = template(&[]).set_job(&batch(), &temp.path().join("absent"));
    assert!(result.is_err());
}
