//! Configuration loading tests.

use std::io::Write;

use provql::Config;

#[test]
fn defaults_when_no_file_exists() {
    let cfg = Config::from_file("/nonexistent/provql.toml").unwrap();
    assert_eq!(cfg.optimizer.max_passes, 10);
    assert!(!cfg.dumps.enabled);
}

#[test]
fn file_values_override_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("provql.toml");
    let mut f = std::fs::File::create(&path).unwrap();
    writeln!(
        f,
        "[optimizer]\nmax_passes = 3\nfuse_step_chains = true\n\n[dumps]\nenabled = true\nlayout_width = 120\n"
    )
    .unwrap();

    let cfg = Config::from_file(path.to_str().unwrap()).unwrap();
    assert_eq!(cfg.optimizer.max_passes, 3);
    assert!(cfg.optimizer.fuse_step_chains);
    assert!(cfg.dumps.enabled);
    assert_eq!(cfg.dumps.layout_width, 120);
    // unset fields keep their defaults
    assert!(!cfg.dumps.trace);
}

#[test]
fn environment_overrides_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("provql.toml");
    std::fs::write(&path, "[optimizer]\nmax_passes = 3\n").unwrap();

    std::env::set_var("PROVQL_OPTIMIZER__MAX_PASSES", "7");
    let cfg = Config::from_file(path.to_str().unwrap()).unwrap();
    std::env::remove_var("PROVQL_OPTIMIZER__MAX_PASSES");

    assert_eq!(cfg.optimizer.max_passes, 7);
}

#[test]
fn partial_files_are_fine() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("provql.toml");
    std::fs::write(&path, "[dumps]\ntrace = true\n").unwrap();

    let cfg = Config::from_file(path.to_str().unwrap()).unwrap();
    assert!(cfg.dumps.trace);
    assert_eq!(cfg.optimizer.max_passes, 10);
}
