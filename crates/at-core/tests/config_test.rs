use std::path::Path;

use at_core::config::Config;

#[test]
fn default_config() {
    let cfg = Config::default();
    assert_eq!(cfg.general.log_level, "info");
    assert!(cfg.storage.root.ends_with(".pi/teams"));
    assert_eq!(cfg.worker.program, "pi");
    assert_eq!(cfg.worker.args, vec!["--session", "{session}"]);
    assert_eq!(cfg.worker.lead_name, "lead");
    assert_eq!(cfg.worker.write_timeout_ms, 5000);
    assert_eq!(cfg.shutdown.grace_ms, 1000);
    assert_eq!(cfg.shutdown.kill_wait_ms, 5000);
}

#[test]
fn config_roundtrip() {
    let cfg = Config::default();
    let toml_str = cfg.to_toml().expect("serialize to toml");
    assert!(toml_str.contains("grace_ms"));

    let parsed: Config = toml::from_str(&toml_str).expect("parse toml back");
    assert_eq!(parsed.worker.program, cfg.worker.program);
    assert_eq!(parsed.storage.root, cfg.storage.root);
    assert_eq!(parsed.shutdown.grace_ms, cfg.shutdown.grace_ms);
    parsed.validate().expect("config validates");
}

#[test]
fn config_partial_toml() {
    let partial = r#"
[storage]
root = "/var/lib/teams"

[shutdown]
grace_ms = 250
"#;
    let cfg = Config::from_toml(partial).expect("parse partial");
    assert_eq!(cfg.storage.root, Path::new("/var/lib/teams"));
    assert_eq!(cfg.shutdown.grace_ms, 250);
    // defaults should fill in the rest
    assert_eq!(cfg.shutdown.kill_wait_ms, 5000);
    assert_eq!(cfg.worker.program, "pi");
}

#[test]
fn session_placeholder_is_substituted() {
    let cfg = Config::from_toml(
        r#"
[worker]
program = "agent"
args = ["--resume={session}", "--quiet"]
"#,
    )
    .expect("parse worker section");
    let args = cfg.worker.args_for(Path::new("/tmp/demo/alice.session"));
    assert_eq!(args, vec!["--resume=/tmp/demo/alice.session", "--quiet"]);
}

#[test]
fn empty_worker_program_fails_validation() {
    let mut cfg = Config::default();
    cfg.worker.program = "  ".to_string();
    let err = cfg.validate().expect_err("validation should fail");
    assert!(err.to_string().contains("worker.program"));
}

#[test]
fn zero_grace_fails_validation() {
    let err = Config::from_toml("[shutdown]\ngrace_ms = 0\n").expect_err("validation should fail");
    assert!(err.to_string().contains("grace_ms"));
}

#[test]
fn zero_write_timeout_fails_validation() {
    let err = Config::from_toml("[worker]\nwrite_timeout_ms = 0\n").expect_err("validation should fail");
    assert!(err.to_string().contains("write_timeout_ms"));
}

#[test]
fn load_from_missing_file_is_io_error() {
    let err = Config::load_from("/definitely/not/here/config.toml").expect_err("missing file");
    assert!(err.to_string().starts_with("io:"));
}
