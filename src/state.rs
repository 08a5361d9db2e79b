//! Shared, read-only-after-startup server state (spec.md §5 "Shared-resource
//! policy"), analogous to the teacher's `AuthState`/`ArkState`: plain `Arc`
//! fields cloned into every request, no interior mutability beyond what the
//! cache/ticket-store already provide.

use crate::cache::DynCache;
use crate::config::{EndpointConfiguration, ServerOptions};
use crate::crypto::SigningCredentials;
use crate::hooks::ProviderHooks;
use crate::ticket::{TicketService, TicketStore};
use std::sync::Arc;

/// Everything a pipeline needs to process a request. Cheap to clone — every
/// field is an `Arc` or a small `Copy`/owned value.
#[derive(Clone)]
pub struct OidcState {
    pub endpoints: Arc<EndpointConfiguration>,
    pub options: Arc<ServerOptions>,
    pub signing: SigningCredentials,
    pub cache: DynCache,
    pub tickets: Arc<TicketService>,
    pub hooks: Arc<dyn ProviderHooks>,
}

impl OidcState {
    pub fn new(
        endpoints: EndpointConfiguration,
        options: ServerOptions,
        signing: SigningCredentials,
        cache: DynCache,
        hooks: Arc<dyn ProviderHooks>,
        issuer: impl Into<String>,
    ) -> Self {
        let store = TicketStore::new(cache.clone(), signing.clone(), issuer);
        let tickets = Arc::new(TicketService::new(store, hooks.clone()));
        Self {
            endpoints: Arc::new(endpoints),
            options: Arc::new(options),
            signing,
            cache,
            tickets,
            hooks,
        }
    }
}
