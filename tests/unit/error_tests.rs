//! Display format and conversions of `AppError`.

use lanefarm::AppError;

#[test]
fn display_uses_kind_prefix() {
    assert_eq!(AppError::Config("bad".into()).to_string(), "config: bad");
    assert_eq!(AppError::Jobs("bad".into()).to_string(), "jobs: bad");
    assert_eq!(AppError::Spawn("bad".into()).to_string(), "spawn: bad");
    assert_eq!(AppError::Io("bad".into()).to_string(), "io: bad");
    assert_eq!(AppError::Report("bad".into()).to_string(), "report: bad");
}

#[test]
fn toml_errors_become_config_errors() {
    let err: AppError = toml::from_str::<toml::Value>("lanes = = 2")
        .expect_err("invalid toml")
        .into();
    assert!(matches!(err, AppError::Config(ref msg) if msg.starts_with("invalid config")));
}

#[test]
fn json_errors_become_jobs_errors() {
    let err: AppError = serde_json::from_str::<serde_json::Value>("[1,")
        .expect_err("invalid json")
        .into();
    assert!(matches!(err, AppError::Jobs(_)));
}

#[test]
fn implements_std_error() {
    let err: Box<dyn std::error::Error> = Box::new(AppError::Io("disk full".into()));
    assert_eq!(err.to_string(), "io: disk full");
}
