//! Server configuration (spec.md §3 "Endpoint Configuration").
//!
//! Loaded the way the teacher loads `ArkConfig`: a `config::Config` builder
//! layering a YAML file, `OIDCD_*` environment variables, and `clap` CLI
//! overrides on top of an in-code default.

use crate::errors::StartupError;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

fn default_false() -> bool {
    false
}

fn default_code_ttl() -> i64 {
    300
}

fn default_access_token_ttl() -> i64 {
    3600
}

fn default_id_token_ttl() -> i64 {
    3600
}

fn default_refresh_token_ttl() -> i64 {
    2_592_000
}

/// Per-endpoint path configuration. An endpoint is "enabled" iff its path is
/// `Some` (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfiguration {
    #[serde(default = "default_authorization_path")]
    pub authorization: Option<String>,
    #[serde(default = "default_token_path")]
    pub token: Option<String>,
    #[serde(default = "default_validation_path")]
    pub validation: Option<String>,
    #[serde(default = "default_logout_path")]
    pub logout: Option<String>,
    #[serde(default = "default_configuration_path")]
    pub configuration: Option<String>,
    #[serde(default = "default_cryptography_path")]
    pub cryptography: Option<String>,
}

fn default_authorization_path() -> Option<String> {
    Some("/connect/authorize".into())
}
fn default_token_path() -> Option<String> {
    Some("/connect/token".into())
}
fn default_validation_path() -> Option<String> {
    Some("/connect/introspect".into())
}
fn default_logout_path() -> Option<String> {
    Some("/connect/endsession".into())
}
fn default_configuration_path() -> Option<String> {
    Some("/.well-known/openid-configuration".into())
}
fn default_cryptography_path() -> Option<String> {
    Some("/.well-known/jwks.json".into())
}

impl Default for EndpointConfiguration {
    fn default() -> Self {
        Self {
            authorization: default_authorization_path(),
            token: default_token_path(),
            validation: default_validation_path(),
            logout: default_logout_path(),
            configuration: default_configuration_path(),
            cryptography: default_cryptography_path(),
        }
    }
}

impl EndpointConfiguration {
    pub fn authorization_enabled(&self) -> bool {
        self.authorization.is_some()
    }

    pub fn token_enabled(&self) -> bool {
        self.token.is_some()
    }

    pub fn validation_enabled(&self) -> bool {
        self.validation.is_some()
    }

    pub fn logout_enabled(&self) -> bool {
        self.logout.is_some()
    }

    pub fn configuration_enabled(&self) -> bool {
        self.configuration.is_some()
    }

    pub fn cryptography_enabled(&self) -> bool {
        self.cryptography.is_some()
    }
}

/// Server-wide options (spec.md §3 "Endpoint Configuration", §5 "Shared
/// resource policy").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerOptions {
    #[serde(default = "default_false")]
    pub allow_insecure_http: bool,
    #[serde(default = "default_false")]
    pub use_sliding_expiration: bool,
    #[serde(default = "default_false")]
    pub application_can_display_errors: bool,
    #[serde(default = "default_code_ttl")]
    pub authorization_code_lifetime_secs: i64,
    #[serde(default = "default_access_token_ttl")]
    pub access_token_lifetime_secs: i64,
    #[serde(default = "default_id_token_ttl")]
    pub identity_token_lifetime_secs: i64,
    #[serde(default = "default_refresh_token_ttl")]
    pub refresh_token_lifetime_secs: i64,
    /// Overrides the computed issuer (request origin) when set.
    #[serde(default)]
    pub issuer: Option<String>,
    #[serde(default)]
    pub signing_key_path: Option<String>,
    #[serde(default)]
    pub signing_cert_path: Option<String>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            allow_insecure_http: false,
            use_sliding_expiration: false,
            application_can_display_errors: false,
            authorization_code_lifetime_secs: default_code_ttl(),
            access_token_lifetime_secs: default_access_token_ttl(),
            identity_token_lifetime_secs: default_id_token_ttl(),
            refresh_token_lifetime_secs: default_refresh_token_ttl(),
            issuer: None,
            signing_key_path: None,
            signing_cert_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OidcdConfig {
    #[serde(default)]
    pub endpoints: EndpointConfiguration,
    #[serde(default)]
    pub server: ServerOptions,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

fn default_bind_addr() -> String {
    "127.0.0.1:8080".into()
}

/// CLI overrides layered on top of file/env configuration (teacher pattern:
/// `ArkConfig::load_with_overrides`).
#[derive(Debug, Parser)]
#[command(name = "oidcd-demo", about = "OIDC authorization server demonstration binary")]
pub struct Args {
    /// Path to a YAML configuration file.
    #[arg(long, env = "OIDCD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address to bind the demonstration HTTP server to.
    #[arg(long, env = "OIDCD_BIND_ADDR")]
    pub bind_addr: Option<String>,

    /// Path to a PEM-encoded RSA private key used for token signing.
    #[arg(long, env = "OIDCD_SIGNING_KEY")]
    pub signing_key: Option<PathBuf>,

    /// Optional PEM-encoded X.509 certificate accompanying the signing key.
    #[arg(long, env = "OIDCD_SIGNING_CERT")]
    pub signing_cert: Option<PathBuf>,

    /// Allow plain-HTTP traffic to reach OIDC endpoints (test/dev only).
    #[arg(long)]
    pub allow_insecure_http: bool,
}

impl OidcdConfig {
    /// Loads configuration from an optional YAML file, then `OIDCD_*`
    /// environment variables, then explicit CLI overrides — mirroring the
    /// teacher's `ArkConfig::load_with_overrides` layering order.
    pub fn load_with_overrides(args: &Args) -> Result<Self, StartupError> {
        let mut builder = config::Config::builder()
            .set_default("bind_addr", default_bind_addr())
            .map_err(|e| StartupError::ConfigError(e.to_string()))?;

        if let Some(path) = &args.config {
            let contents = std::fs::read_to_string(path)
                .map_err(|e| StartupError::ConfigError(format!("reading {}: {e}", path.display())))?;
            let parsed: serde_yaml_ng::Value = serde_yaml_ng::from_str(&contents).map_err(|e| {
                StartupError::ConfigError(format!("parsing {}: {e}", path.display()))
            })?;
            let json = serde_json::to_value(parsed)
                .map_err(|e| StartupError::ConfigError(e.to_string()))?;
            builder = builder
                .add_source(config::File::from_str(
                    &json.to_string(),
                    config::FileFormat::Json,
                ))
                .map_err(|e| StartupError::ConfigError(e.to_string()))?;
        }

        builder = builder
            .add_source(config::Environment::with_prefix("OIDCD").separator("__"))
            .map_err(|e| StartupError::ConfigError(e.to_string()))?;

        let mut config: OidcdConfig = builder
            .build()
            .map_err(|e| StartupError::ConfigError(e.to_string()))?
            .try_deserialize()
            .unwrap_or_default();

        if let Some(bind) = &args.bind_addr {
            config.bind_addr = bind.clone();
        }
        if let Some(key) = &args.signing_key {
            config.server.signing_key_path = Some(key.display().to_string());
        }
        if let Some(cert) = &args.signing_cert {
            config.server.signing_cert_path = Some(cert.display().to_string());
        }
        if args.allow_insecure_http {
            config.server.allow_insecure_http = true;
        }

        Ok(config)
    }
}
