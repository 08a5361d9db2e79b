//! Endpoint classification (spec.md §4.1).
//!
//! Path → [`EndpointKind`] is decided first by the host's
//! [`ProviderHooks::match_endpoint`] override, falling back to the default
//! well-known suffixes the discovery document advertises.

use crate::hooks::{Decision, EndpointKind, ProviderHooks};
use std::sync::Arc;

/// Classifies `path` into one of the six endpoint kinds, giving the host a
/// chance to override via `match_endpoint` first.
pub async fn classify(hooks: &Arc<dyn ProviderHooks>, path: &str) -> Option<EndpointKind> {
    match hooks.match_endpoint(path).await {
        Decision::Handled(kind) => Some(kind),
        Decision::Rejected(_) => None,
        _ => default_classify(path),
    }
}

fn default_classify(path: &str) -> Option<EndpointKind> {
    match path {
        "/connect/authorize" => Some(EndpointKind::Authorization),
        "/connect/token" => Some(EndpointKind::Token),
        "/connect/introspect" => Some(EndpointKind::Validation),
        "/connect/endsession" => Some(EndpointKind::Logout),
        "/.well-known/openid-configuration" => Some(EndpointKind::Configuration),
        "/.well-known/jwks.json" => Some(EndpointKind::Cryptography),
        _ => None,
    }
}

/// Whether `scheme` is permitted to reach an OIDC endpoint. HTTPS is always
/// allowed; plain HTTP is only allowed when the deployment has explicitly
/// opted in (spec.md §5 "Transport", `AllowInsecureHttp`).
pub fn scheme_allowed(scheme: &str, allow_insecure_http: bool) -> bool {
    match scheme {
        "https" => true,
        "http" => allow_insecure_http,
        _ => false,
    }
}
