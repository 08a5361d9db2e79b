//! `oidcd-demo`: a minimal host binary demonstrating the authorization
//! server core wired to `axum`. Clients are not persisted anywhere — every
//! `client_id`/`redirect_uri` is accepted as-is via [`oidcd::hooks::NoopHooks`]
//! — and sign-in accepts any username unconditionally. Real deployments
//! supply their own [`oidcd::hooks::ProviderHooks`] implementation backing
//! client lookup, consent, and authentication.

use axum::Router;
use axum::body::Body;
use axum::extract::{Query, Request, State};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::response::IntoResponse;
use axum::routing::any;
use clap::Parser;
use oidcd::cache::{self, MemoryCache};
use oidcd::config::{Args, OidcdConfig};
use oidcd::crypto::load_signing_credentials_from_paths;
use oidcd::hooks::NoopHooks;
use oidcd::message::{MessageKind, OidcMessage};
use oidcd::pipelines::{self, IncomingRequest};
use oidcd::state::OidcState;
use oidcd::ticket::Properties;
use std::collections::HashMap;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

fn init_logging() {
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).compact())
        .with(EnvFilter::new(env_filter))
        .init();
}

/// Already-read HTTP request pieces, kept owned so an [`IncomingRequest`] can
/// borrow from them for the lifetime of a single handler call.
struct Extracted {
    method: String,
    query: Option<String>,
    body: String,
    content_type: Option<String>,
    authorization_header: Option<String>,
    is_https: bool,
}

impl Extracted {
    fn as_incoming(&self) -> IncomingRequest<'_> {
        IncomingRequest {
            method: &self.method,
            query: self.query.as_deref(),
            body: Some(&self.body),
            content_type: self.content_type.as_deref(),
            authorization_header: self.authorization_header.as_deref(),
            is_https: self.is_https,
        }
    }
}

async fn extract(req: Request<Body>) -> Extracted {
    let (parts, body) = req.into_parts();
    let is_https = parts
        .headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("https"))
        .unwrap_or(false);
    let content_type = parts
        .headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let authorization_header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let query = parts.uri.query().map(str::to_string);
    let body_bytes = axum::body::to_bytes(body, 1024 * 1024).await.unwrap_or_default();
    let body = String::from_utf8_lossy(&body_bytes).to_string();
    Extracted {
        method: parts.method.as_str().to_string(),
        query,
        body,
        content_type,
        authorization_header,
        is_https,
    }
}

/// Spec.md §4.1: after endpoint classification, a request on a disallowed
/// scheme (plain HTTP without `AllowInsecureHttp`) is logged and passed
/// through rather than dispatched. There is no further middleware to hand
/// the request to here, so passing through renders as an unmatched route.
fn passthrough_if_insecure(state: &OidcState, extracted: &Extracted) -> Option<axum::response::Response> {
    let scheme = if extracted.is_https { "https" } else { "http" };
    if oidcd::router::scheme_allowed(scheme, state.options.allow_insecure_http) {
        return None;
    }
    tracing::warn!(scheme, "insecure request to an OIDC endpoint, passing through");
    Some(axum::http::StatusCode::NOT_FOUND.into_response())
}

async fn authorization_handler(State(state): State<OidcState>, req: Request<Body>) -> axum::response::Response {
    let extracted = extract(req).await;
    if let Some(resp) = passthrough_if_insecure(&state, &extracted) {
        return resp;
    }
    pipelines::authorization::begin(&state, extracted.as_incoming()).await.into_response()
}

async fn token_handler(State(state): State<OidcState>, req: Request<Body>) -> axum::response::Response {
    let extracted = extract(req).await;
    if let Some(resp) = passthrough_if_insecure(&state, &extracted) {
        return resp;
    }
    pipelines::token::handle(&state, extracted.as_incoming()).await.into_response()
}

async fn validation_handler(State(state): State<OidcState>, req: Request<Body>) -> axum::response::Response {
    let extracted = extract(req).await;
    if let Some(resp) = passthrough_if_insecure(&state, &extracted) {
        return resp;
    }
    pipelines::validation::handle(&state, extracted.as_incoming()).await.into_response()
}

async fn logout_handler(State(state): State<OidcState>, req: Request<Body>) -> axum::response::Response {
    let extracted = extract(req).await;
    if let Some(resp) = passthrough_if_insecure(&state, &extracted) {
        return resp;
    }
    pipelines::logout::handle(&state, extracted.as_incoming()).await.into_response()
}

async fn configuration_handler(State(state): State<OidcState>, req: Request<Body>) -> axum::response::Response {
    let extracted = extract(req).await;
    if let Some(resp) = passthrough_if_insecure(&state, &extracted) {
        return resp;
    }
    let issuer = state.options.issuer.clone().unwrap_or_else(|| "http://localhost:8080".to_string());
    pipelines::discovery::configuration(&state, &issuer).await.into_response()
}

async fn cryptography_handler(State(state): State<OidcState>, req: Request<Body>) -> axum::response::Response {
    let extracted = extract(req).await;
    if let Some(resp) = passthrough_if_insecure(&state, &extracted) {
        return resp;
    }
    pipelines::discovery::cryptography(&state).await.into_response()
}

/// Demonstration-only sign-in completion: accepts any `subject` as the
/// user's identity and resumes the authorization request persisted under
/// `unique_id` (spec.md §4.4.1). A real host replaces this with an actual
/// login/consent screen.
async fn demo_sign_in_handler(
    State(state): State<OidcState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let Some(unique_id) = params.get("unique_id") else {
        return pipelines::Outcome::Html(
            axum::http::StatusCode::BAD_REQUEST,
            "unique_id is required".to_string(),
        );
    };
    let subject = params.get("subject").cloned().unwrap_or_else(|| "demo-user".to_string());

    let Ok(Some(blob)) = state.cache.get(unique_id).await else {
        return pipelines::Outcome::Html(axum::http::StatusCode::NOT_FOUND, "not found".to_string());
    };
    let Some(stored) = cache::blob::decode(&blob) else {
        return pipelines::Outcome::Html(axum::http::StatusCode::NOT_FOUND, "not found".to_string());
    };
    let mut message = OidcMessage::new(MessageKind::AuthenticationRequest);
    for (k, v) in stored {
        message.set(k, v);
    }

    let principal = pipelines::authorization::principal_with_subject(subject);
    pipelines::authorization::complete_sign_in(&state, &message, principal, Properties::default()).await
}

fn build_router(state: OidcState) -> Router {
    let mut router = Router::new();
    if let Some(path) = state.endpoints.authorization.clone() {
        router = router
            .route(&path, any(authorization_handler))
            .route(&format!("{path}/complete"), any(demo_sign_in_handler));
    }
    if let Some(path) = &state.endpoints.token {
        router = router.route(path, any(token_handler));
    }
    if let Some(path) = &state.endpoints.validation {
        router = router.route(path, any(validation_handler));
    }
    if let Some(path) = &state.endpoints.logout {
        router = router.route(path, any(logout_handler));
    }
    if let Some(path) = &state.endpoints.configuration {
        router = router.route(path, any(configuration_handler));
    }
    if let Some(path) = &state.endpoints.cryptography {
        router = router.route(path, any(cryptography_handler));
    }
    router
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::cors::CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use oidcd::cache::MemoryCache;
    use oidcd::config::{EndpointConfiguration, ServerOptions};
    use oidcd::crypto::SigningCredentials;

    fn state_with(allow_insecure_http: bool) -> OidcState {
        OidcState::new(
            EndpointConfiguration::default(),
            ServerOptions { allow_insecure_http, ..ServerOptions::default() },
            SigningCredentials::new(Vec::new()),
            Arc::new(MemoryCache::new()),
            Arc::new(NoopHooks),
            "https://issuer.example",
        )
    }

    fn extracted(is_https: bool) -> Extracted {
        Extracted {
            method: "GET".to_string(),
            query: None,
            body: String::new(),
            content_type: None,
            authorization_header: None,
            is_https,
        }
    }

    #[test]
    fn plain_http_is_passed_through_when_disallowed() {
        let state = state_with(false);
        let resp = passthrough_if_insecure(&state, &extracted(false)).expect("must pass through");
        assert_eq!(resp.status(), axum::http::StatusCode::NOT_FOUND);
    }

    #[test]
    fn plain_http_dispatches_when_explicitly_allowed() {
        let state = state_with(true);
        assert!(passthrough_if_insecure(&state, &extracted(false)).is_none());
    }

    #[test]
    fn https_always_dispatches() {
        let state = state_with(false);
        assert!(passthrough_if_insecure(&state, &extracted(true)).is_none());
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let args = Args::parse();
    let config = OidcdConfig::load_with_overrides(&args)?;

    oidcd::metrics::init()?;

    let signing = match (&config.server.signing_key_path, &config.server.signing_cert_path) {
        (Some(key), cert) => load_signing_credentials_from_paths(key, cert.as_deref())?,
        (None, _) => {
            tracing::warn!("no signing key configured — id_token/access_token issuance is disabled");
            oidcd::crypto::SigningCredentials::new(Vec::new())
        }
    };

    let cache: oidcd::cache::DynCache = Arc::new(MemoryCache::new());
    let hooks: Arc<dyn oidcd::hooks::ProviderHooks> = Arc::new(NoopHooks);
    let issuer = config
        .server
        .issuer
        .clone()
        .unwrap_or_else(|| format!("http://{}", config.bind_addr));

    let state = OidcState::new(
        config.endpoints.clone(),
        config.server.clone(),
        signing,
        cache,
        hooks,
        issuer,
    );

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "oidcd-demo listening");
    axum::serve(listener, app).await?;
    Ok(())
}
