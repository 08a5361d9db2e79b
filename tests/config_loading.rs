//! Configuration layering (spec.md §3): file → env → CLI overrides.

use oidcd::config::{Args, OidcdConfig};
use std::io::Write;

fn base_args(config_path: Option<std::path::PathBuf>) -> Args {
    Args {
        config: config_path,
        bind_addr: None,
        signing_key: None,
        signing_cert: None,
        allow_insecure_http: false,
    }
}

#[test]
fn defaults_apply_with_no_file_or_env() {
    let args = base_args(None);
    let config = OidcdConfig::load_with_overrides(&args).expect("loads defaults");
    assert_eq!(config.bind_addr, "127.0.0.1:8080");
    assert!(config.endpoints.authorization_enabled());
    assert!(!config.server.allow_insecure_http);
}

#[test]
fn yaml_file_overrides_defaults() {
    let mut file = tempfile::NamedTempFile::new().expect("tempfile created");
    writeln!(
        file,
        "bind_addr: 0.0.0.0:9000\nserver:\n  allow_insecure_http: true\nendpoints:\n  logout: null\n"
    )
    .expect("write config");

    let args = base_args(Some(file.path().to_path_buf()));
    let config = OidcdConfig::load_with_overrides(&args).expect("loads from file");
    assert_eq!(config.bind_addr, "0.0.0.0:9000");
    assert!(config.server.allow_insecure_http);
    assert!(!config.endpoints.logout_enabled());
    // Endpoints not named in the file keep their defaults.
    assert!(config.endpoints.token_enabled());
}

#[test]
fn cli_overrides_win_over_file() {
    let mut file = tempfile::NamedTempFile::new().expect("tempfile created");
    writeln!(file, "bind_addr: 0.0.0.0:9000\n").expect("write config");

    let mut args = base_args(Some(file.path().to_path_buf()));
    args.bind_addr = Some("10.0.0.1:7000".to_string());
    args.allow_insecure_http = true;

    let config = OidcdConfig::load_with_overrides(&args).expect("loads with cli overrides");
    assert_eq!(config.bind_addr, "10.0.0.1:7000");
    assert!(config.server.allow_insecure_http);
}
