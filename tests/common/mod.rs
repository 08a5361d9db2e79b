use async_trait::async_trait;
use oidcd::cache::MemoryCache;
use oidcd::config::{EndpointConfiguration, ServerOptions};
use oidcd::crypto::SigningCredential;
use oidcd::hooks::{Decision, ProviderHooks};
use oidcd::message::OidcMessage;
use oidcd::state::OidcState;
use std::sync::Arc;

/// A host that registers every client and redirect_uri unconditionally —
/// stands in for a real client registry in tests that exercise the happy
/// path through the validation hooks (spec.md §6: `Skipped` means "no
/// opinion", so a host must explicitly `Validated` a client/request it
/// actually recognizes).
pub struct PermissiveHooks;

#[async_trait]
impl ProviderHooks for PermissiveHooks {
    async fn validate_client_redirect_uri(&self, _client_id: &str, _redirect_uri: &str) -> Decision<String> {
        Decision::Validated
    }

    async fn validate_client_logout_redirect_uri(&self, _client_id: &str, _post_logout_redirect_uri: &str) -> Decision<String> {
        Decision::Validated
    }

    async fn validate_client_authentication(&self, _client_id: &str, _client_secret: Option<&str>) -> Decision<()> {
        Decision::Validated
    }

    async fn validate_authorization_request(&self, _message: &OidcMessage) -> Decision<()> {
        Decision::Validated
    }

    async fn validate_token_request(&self, _message: &OidcMessage) -> Decision<()> {
        Decision::Validated
    }
}

const TEST_KEY_PEM: &str = include_str!("../fixtures/test_key.pem");

pub async fn test_state(hooks: Arc<dyn ProviderHooks>) -> OidcState {
    let credential = SigningCredential::from_pem(TEST_KEY_PEM.as_bytes(), None).expect("test key must parse");
    let signing = oidcd::crypto::SigningCredentials::new(vec![credential]);
    let cache = Arc::new(MemoryCache::new());
    OidcState::new(
        EndpointConfiguration::default(),
        ServerOptions::default(),
        signing,
        cache,
        hooks,
        "https://issuer.example",
    )
}
