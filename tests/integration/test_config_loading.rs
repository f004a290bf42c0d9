use gitfleet::core::config::{ConfigLoader, CONFIG_FILE_NAME};
use gitfleet::logging::{ConsoleOutput, LoggingConfig};
use serial_test::serial;
use std::env;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn clear_gitfleet_env() {
    for v in &[
        "GITFLEET_ROOTS",
        "GITFLEET_PARALLELISM",
        "GITFLEET_ASSUME_YES",
        "GITFLEET_FAIL_FAST",
        "GITFLEET_LOG_LEVEL",
    ] {
        env::remove_var(v);
    }
}

/// File values override defaults, environment overrides the file
#[test]
#[serial]
fn test_config_precedence_defaults_file_env() {
    clear_gitfleet_env();
    let temp_dir = TempDir::new().unwrap();
    let workspace_path = temp_dir.path();

    fs::write(
        workspace_path.join(CONFIG_FILE_NAME),
        r#"
[defaults]
roots = ["/srv/git"]
parallelism = 3
assume_yes = true

[logging]
level = "debug"
console_output = "none"
enable_file = true
log_dir = "logs"
"#,
    )
    .unwrap();

    let from_file = ConfigLoader::load_from_workspace(workspace_path).unwrap();
    assert_eq!(from_file.defaults.roots, vec![PathBuf::from("/srv/git")]);
    assert_eq!(from_file.defaults.parallelism, 3);
    assert!(from_file.defaults.assume_yes);
    assert!(from_file.defaults.fail_fast);

    let roots = env::join_paths([PathBuf::from("/a"), PathBuf::from("/b")]).unwrap();
    env::set_var("GITFLEET_ROOTS", &roots);
    env::set_var("GITFLEET_FAIL_FAST", "false");

    let with_env = ConfigLoader::load_from_workspace(workspace_path).unwrap();
    assert_eq!(
        with_env.defaults.roots,
        vec![PathBuf::from("/a"), PathBuf::from("/b")]
    );
    assert!(!with_env.defaults.fail_fast);
    assert_eq!(with_env.defaults.parallelism, 3);

    let logging = LoggingConfig::from_section(&with_env.logging).unwrap();
    assert_eq!(logging.default_level, "debug");
    assert_eq!(logging.console_output, Some(ConsoleOutput::None));
    assert!(logging.enable_file);
    assert_eq!(logging.log_dir, Some(PathBuf::from("logs")));

    clear_gitfleet_env();
}

#[test]
#[serial]
fn test_invalid_values_in_file_are_rejected() {
    clear_gitfleet_env();
    let temp_dir = TempDir::new().unwrap();
    fs::write(
        temp_dir.path().join(CONFIG_FILE_NAME),
        "[defaults]\nparallelism = 0\n",
    )
    .unwrap();

    let err = ConfigLoader::load_from_workspace(temp_dir.path()).unwrap_err();
    assert_eq!(err.code, "CFG-VALUE-001");
}

#[test]
#[serial]
fn test_unknown_console_output_fails_to_parse() {
    clear_gitfleet_env();
    let temp_dir = TempDir::new().unwrap();
    fs::write(
        temp_dir.path().join(CONFIG_FILE_NAME),
        "[logging]\nconsole_output = \"syslog\"\n",
    )
    .unwrap();

    let err = ConfigLoader::load_from_workspace(temp_dir.path()).unwrap_err();
    assert_eq!(err.code, "CFG-PARSE-001");
}
