//! Error types for the authorization server core.
//!
//! Two families, mirroring the split between protocol-level failures and
//! start-up failures: [`OidcError`] is what pipelines hand back to callers to
//! build an error page, error redirect, or JSON error body; [`StartupError`]
//! aborts construction of the server before it ever accepts a request.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Token signing misconfigured: {0}")]
    SigningMisconfigured(String),

    #[error("Key/Cert mismatch: {0}")]
    KeyCertMismatch(String),

    #[error("Other startup error: {0}")]
    Other(String),
}

/// The seven OAuth 2.0 / OIDC error codes this server ever emits.
///
/// `Display` renders the wire value used in the `error` parameter/field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OidcErrorCode {
    InvalidRequest,
    InvalidClient,
    InvalidGrant,
    UnauthorizedClient,
    UnsupportedGrantType,
    UnsupportedResponseType,
    ServerError,
}

impl OidcErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            OidcErrorCode::InvalidRequest => "invalid_request",
            OidcErrorCode::InvalidClient => "invalid_client",
            OidcErrorCode::InvalidGrant => "invalid_grant",
            OidcErrorCode::UnauthorizedClient => "unauthorized_client",
            OidcErrorCode::UnsupportedGrantType => "unsupported_grant_type",
            OidcErrorCode::UnsupportedResponseType => "unsupported_response_type",
            OidcErrorCode::ServerError => "server_error",
        }
    }

    /// The HTTP status a JSON-bodied rendering of this error should carry.
    pub fn status_code(self) -> u16 {
        match self {
            OidcErrorCode::ServerError => 500,
            _ => 400,
        }
    }
}

impl std::fmt::Display for OidcErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A protocol-level failure, carrying everything needed to render an error
/// page, an error redirect (`error`/`error_description`/`error_uri`/`state`),
/// or a JSON error body.
#[derive(Debug, Clone, Error)]
#[error("{code}: {}", description.as_deref().unwrap_or(""))]
pub struct OidcError {
    pub code: OidcErrorCode,
    pub description: Option<String>,
    pub error_uri: Option<String>,
}

impl OidcError {
    pub fn new(code: OidcErrorCode) -> Self {
        Self {
            code,
            description: None,
            error_uri: None,
        }
    }

    pub fn with_description(code: OidcErrorCode, description: impl Into<String>) -> Self {
        Self {
            code,
            description: Some(description.into()),
            error_uri: None,
        }
    }

    pub fn invalid_request(description: impl Into<String>) -> Self {
        Self::with_description(OidcErrorCode::InvalidRequest, description)
    }

    pub fn invalid_client(description: impl Into<String>) -> Self {
        Self::with_description(OidcErrorCode::InvalidClient, description)
    }

    pub fn invalid_grant(description: impl Into<String>) -> Self {
        Self::with_description(OidcErrorCode::InvalidGrant, description)
    }

    pub fn unauthorized_client(description: impl Into<String>) -> Self {
        Self::with_description(OidcErrorCode::UnauthorizedClient, description)
    }

    pub fn unsupported_grant_type(description: impl Into<String>) -> Self {
        Self::with_description(OidcErrorCode::UnsupportedGrantType, description)
    }

    pub fn unsupported_response_type(description: impl Into<String>) -> Self {
        Self::with_description(OidcErrorCode::UnsupportedResponseType, description)
    }

    pub fn server_error(description: impl Into<String>) -> Self {
        Self::with_description(OidcErrorCode::ServerError, description)
    }

    /// Renders the standard `error`/`error_description`/`error_uri` triple as
    /// owned key-value pairs, suitable for a query/fragment/form_post response
    /// or a JSON error body.
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = vec![("error".to_string(), self.code.as_str().to_string())];
        if let Some(desc) = &self.description {
            params.push(("error_description".to_string(), desc.clone()));
        }
        if let Some(uri) = &self.error_uri {
            params.push(("error_uri".to_string(), uri.clone()));
        }
        params
    }

    pub fn to_json(&self) -> serde_json::Value {
        let mut obj = serde_json::Map::new();
        obj.insert(
            "error".to_string(),
            serde_json::Value::String(self.code.as_str().to_string()),
        );
        if let Some(desc) = &self.description {
            obj.insert(
                "error_description".to_string(),
                serde_json::Value::String(desc.clone()),
            );
        }
        if let Some(uri) = &self.error_uri {
            obj.insert(
                "error_uri".to_string(),
                serde_json::Value::String(uri.clone()),
            );
        }
        serde_json::Value::Object(obj)
    }
}
