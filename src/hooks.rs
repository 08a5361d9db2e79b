//! The host extension surface (spec.md §6 "Extensibility hooks").
//!
//! Every named hook in spec.md §6 is one async method on [`ProviderHooks`].
//! All of them default to [`Decision::Skipped`] so a host only has to
//! override the handful it actually cares about; [`NoopHooks`] is the
//! all-defaults implementation used when no host customization is wired in.

use crate::message::OidcMessage;
use crate::ticket::AuthenticationTicket;
use async_trait::async_trait;
use axum::response::Response;

/// Outcome of invoking a hook. Reused across every hook in this module with a
/// different `T` at each call site (`T = ()` for pure yes/no decisions,
/// `T = Response` for endpoint notifications that may short-circuit the
/// pipeline, `T = AuthenticationTicket`/`String` for hooks that produce or
/// transform a value).
#[derive(Debug, Clone)]
pub enum Decision<T = ()> {
    /// The host did not implement this hook (or declined to act); the
    /// pipeline should fall through to its own default behavior.
    Skipped,
    /// The host inspected the request and approved it unchanged.
    Validated,
    /// The host rejected the request with a reason suitable for
    /// `error_description`.
    Rejected(String),
    /// The host fully handled this step, producing `T`.
    Handled(T),
}

impl<T> Decision<T> {
    pub fn is_validated(&self) -> bool {
        matches!(self, Decision::Validated | Decision::Handled(_))
    }

    pub fn rejection(&self) -> Option<&str> {
        match self {
            Decision::Rejected(reason) => Some(reason),
            _ => None,
        }
    }

    pub fn into_handled(self) -> Option<T> {
        match self {
            Decision::Handled(v) => Some(v),
            _ => None,
        }
    }
}

impl<T> Default for Decision<T> {
    fn default() -> Self {
        Decision::Skipped
    }
}

/// The endpoint kind a request path classifies to (spec.md §4.1 "Endpoint
/// classification").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    Authorization,
    Token,
    Validation,
    Logout,
    Configuration,
    Cryptography,
}

/// Every extension point a host may observe or override. Method names match
/// spec.md §6 one-to-one.
#[async_trait]
pub trait ProviderHooks: Send + Sync {
    async fn match_endpoint(&self, _path: &str) -> Decision<EndpointKind> {
        Decision::Skipped
    }

    async fn validate_client_redirect_uri(
        &self,
        _client_id: &str,
        _redirect_uri: &str,
    ) -> Decision<String> {
        Decision::Skipped
    }

    async fn validate_client_logout_redirect_uri(
        &self,
        _client_id: &str,
        _post_logout_redirect_uri: &str,
    ) -> Decision<String> {
        Decision::Skipped
    }

    async fn validate_client_authentication(
        &self,
        _client_id: &str,
        _client_secret: Option<&str>,
    ) -> Decision<()> {
        Decision::Skipped
    }

    async fn validate_authorization_request(&self, _message: &OidcMessage) -> Decision<()> {
        Decision::Skipped
    }

    async fn validate_token_request(&self, _message: &OidcMessage) -> Decision<()> {
        Decision::Skipped
    }

    async fn authorization_endpoint(&self, _message: &OidcMessage) -> Decision<Response> {
        Decision::Skipped
    }

    async fn authorization_endpoint_response(
        &self,
        _message: &OidcMessage,
        _params: &[(String, String)],
    ) -> Decision<Response> {
        Decision::Skipped
    }

    async fn logout_endpoint(&self, _message: &OidcMessage) -> Decision<Response> {
        Decision::Skipped
    }

    async fn logout_endpoint_response(&self, _message: &OidcMessage) -> Decision<Response> {
        Decision::Skipped
    }

    async fn configuration_endpoint(&self) -> Decision<serde_json::Value> {
        Decision::Skipped
    }

    async fn configuration_endpoint_response(
        &self,
        _document: &serde_json::Value,
    ) -> Decision<Response> {
        Decision::Skipped
    }

    async fn cryptography_endpoint(&self) -> Decision<serde_json::Value> {
        Decision::Skipped
    }

    async fn cryptography_endpoint_response(
        &self,
        _document: &serde_json::Value,
    ) -> Decision<Response> {
        Decision::Skipped
    }

    async fn token_endpoint(&self, _message: &OidcMessage) -> Decision<Response> {
        Decision::Skipped
    }

    async fn token_endpoint_response(&self, _body: &serde_json::Value) -> Decision<Response> {
        Decision::Skipped
    }

    async fn validation_endpoint(
        &self,
        _message: &OidcMessage,
        _ticket: &AuthenticationTicket,
    ) -> Decision<()> {
        Decision::Skipped
    }

    async fn validation_endpoint_response(&self, _body: &serde_json::Value) -> Decision<Response> {
        Decision::Skipped
    }

    async fn grant_authorization_code(
        &self,
        _message: &OidcMessage,
        _ticket: AuthenticationTicket,
    ) -> Decision<AuthenticationTicket> {
        Decision::Skipped
    }

    async fn grant_refresh_token(
        &self,
        _message: &OidcMessage,
        _ticket: AuthenticationTicket,
    ) -> Decision<AuthenticationTicket> {
        Decision::Skipped
    }

    async fn grant_resource_owner_credentials(
        &self,
        _message: &OidcMessage,
    ) -> Decision<AuthenticationTicket> {
        Decision::Skipped
    }

    async fn grant_client_credentials(
        &self,
        _message: &OidcMessage,
    ) -> Decision<AuthenticationTicket> {
        Decision::Skipped
    }

    async fn grant_custom_extension(
        &self,
        _message: &OidcMessage,
    ) -> Decision<AuthenticationTicket> {
        Decision::Skipped
    }

    async fn create_authorization_code(&self, _ticket: &AuthenticationTicket) -> Decision<String> {
        Decision::Skipped
    }

    async fn create_access_token(&self, _ticket: &AuthenticationTicket) -> Decision<String> {
        Decision::Skipped
    }

    async fn create_identity_token(&self, _ticket: &AuthenticationTicket) -> Decision<String> {
        Decision::Skipped
    }

    async fn create_refresh_token(&self, _ticket: &AuthenticationTicket) -> Decision<String> {
        Decision::Skipped
    }

    async fn receive_authorization_code(&self, _code: &str) -> Decision<AuthenticationTicket> {
        Decision::Skipped
    }

    async fn receive_access_token(&self, _token: &str) -> Decision<AuthenticationTicket> {
        Decision::Skipped
    }

    async fn receive_identity_token(&self, _token: &str) -> Decision<AuthenticationTicket> {
        Decision::Skipped
    }

    async fn receive_refresh_token(&self, _token: &str) -> Decision<AuthenticationTicket> {
        Decision::Skipped
    }
}

/// All-defaults [`ProviderHooks`] implementation — used when a deployment
/// wires in no host customization at all.
pub struct NoopHooks;

impl ProviderHooks for NoopHooks {}
