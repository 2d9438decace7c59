// ABOUTME: Behavioral tests for configuration loading and robot selection
// Verifies config files layer over defaults and selectors resolve to run sets

use std::fs;

use pretty_assertions::assert_eq;
use tempfile::TempDir;

use robodeploy::config::DeployConfig;
use robodeploy::credentials::{self, CredentialSource};
use robodeploy::hosts::{RunSet, Selector};

/// Test that a config file adds robots and overrides paths without losing built-ins
#[test]
fn test_explicit_config_file_layers_over_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("robodeploy.toml");
    fs::write(
        &path,
        r#"
local_dir = "target/ev3"
command = "brickrun -r -- ./main"

[robots.gizella]
host = "10.42.0.3"
password = "maker"
"#,
    )
    .unwrap();

    let config = DeployConfig::load(Some(&path)).unwrap();

    assert_eq!(config.local_dir, std::path::PathBuf::from("target/ev3"));
    assert_eq!(config.command_line(), "brickrun -r -- ./main");
    assert_eq!(config.robots["gizella"].host, "10.42.0.3");
    assert_eq!(config.robots["gizella"].username, "robot");
    assert!(config.robots.contains_key("ferenc"), "built-in robot kept");
}

/// Test that an invalid file is rejected with the offending path in the error
#[test]
fn test_invalid_config_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("bad.toml");
    fs::write(&path, "remote_dir = \"relative/dir\"\n").unwrap();

    let err = DeployConfig::load(Some(&path)).unwrap_err();
    assert!(format!("{err:#}").contains("absolute"), "{err:#}");

    fs::write(&path, "remote_dir = [\n").unwrap();
    let err = DeployConfig::load(Some(&path)).unwrap_err();
    assert!(format!("{err:#}").contains("bad.toml"), "{err:#}");
}

/// Test that "all" selects every robot once and a name selects exactly one
#[test]
fn test_selectors_resolve_to_run_sets() {
    let config = DeployConfig::default();
    let lookup = |_: &str, _: &robodeploy::RobotConfig| Ok(("maker".to_string(), CredentialSource::Config));

    let all = Selector::parse("all", &config).unwrap();
    let (set, unresolved) = RunSet::resolve_with(&all, &config, lookup);
    assert!(unresolved.is_empty());
    assert_eq!(set.names(), vec!["ferenc", "viktor"]);

    let one = Selector::parse("Viktor", &config).unwrap();
    let (set, _) = RunSet::resolve_with(&one, &config, lookup);
    assert_eq!(set.names(), vec!["viktor"]);
    let viktor = set.iter().next().unwrap();
    assert_eq!(viktor.address(), "robot@viktor.local:22");
}

/// Test that unknown selectors resolve to nothing instead of an error
#[test]
fn test_unknown_selector_selects_nothing() {
    let config = DeployConfig::default();
    assert_eq!(Selector::parse("gizella", &config), None);
    assert_eq!(Selector::parse("  ", &config), None);
}

/// Test that a password in the config file wins over environment and keychain
#[test]
fn test_credential_precedence() {
    let mut robot = DeployConfig::default().robots["ferenc"].clone();

    let (_, source) = credentials::resolve_with(
        "ferenc",
        &robot,
        |_| Some("from-env".to_string()),
        |_| Ok(Some("from-keychain".to_string())),
    )
    .unwrap();
    assert_eq!(source, CredentialSource::Environment);

    robot.password = Some("from-config".to_string());
    let (password, source) = credentials::resolve_with(
        "ferenc",
        &robot,
        |_| Some("from-env".to_string()),
        |_| Ok(Some("from-keychain".to_string())),
    )
    .unwrap();
    assert_eq!(password, "from-config");
    assert_eq!(source, CredentialSource::Config);
}
