//! DiscoveryPipeline — `/.well-known/openid-configuration` and the JWKS
//! cryptography endpoint (spec.md §4.9).

use crate::hooks::Decision;
use crate::pipelines::Outcome;
use crate::state::OidcState;
use axum::http::StatusCode;

/// Builds the discovery document. Issuer is `options.issuer` when configured,
/// otherwise the endpoint is considered misconfigured by the caller — a
/// demonstration binary always sets one (spec.md §3 "Endpoint Configuration").
pub async fn configuration(state: &OidcState, issuer: &str) -> Outcome {
    if let Decision::Handled(document) = state.hooks.configuration_endpoint().await {
        return respond(state, document).await;
    }

    let endpoints = &state.endpoints;
    let auth_enabled = endpoints.authorization_enabled();
    let token_enabled = endpoints.token_enabled();
    let signing_present = !state.signing.is_empty();

    let mut grant_types = Vec::new();
    if auth_enabled && token_enabled {
        grant_types.push("authorization_code");
    }
    if auth_enabled {
        grant_types.push("implicit");
    }
    if token_enabled {
        grant_types.push("refresh_token");
        if !auth_enabled {
            grant_types.push("password");
            grant_types.push("client_credentials");
        }
    }

    let mut response_types = Vec::new();
    if auth_enabled {
        response_types.push("token");
        if token_enabled {
            response_types.push("code");
        }
        if signing_present {
            response_types.push("id_token");
            response_types.push("id_token token");
            if token_enabled {
                response_types.push("code id_token");
                response_types.push("code token");
                response_types.push("code id_token token");
            }
        }
    }

    let mut document = serde_json::json!({
        "issuer": issuer,
        "response_types_supported": response_types,
        "grant_types_supported": grant_types,
        "subject_types_supported": ["public"],
        "id_token_signing_alg_values_supported": ["RS256"],
        "token_endpoint_auth_methods_supported": ["client_secret_post", "client_secret_basic"],
        "claims_supported": ["sub", "iss", "aud", "exp", "iat"],
        "scopes_supported": ["openid", "profile", "email", "offline_access"],
    });
    let obj = document.as_object_mut().expect("document is always an object");
    if let Some(path) = &endpoints.authorization {
        obj.insert("authorization_endpoint".into(), serde_json::Value::String(format!("{issuer}{path}")));
    }
    if let Some(path) = &endpoints.token {
        obj.insert("token_endpoint".into(), serde_json::Value::String(format!("{issuer}{path}")));
    }
    if let Some(path) = &endpoints.validation {
        obj.insert("introspection_endpoint".into(), serde_json::Value::String(format!("{issuer}{path}")));
    }
    if let Some(path) = &endpoints.logout {
        obj.insert("end_session_endpoint".into(), serde_json::Value::String(format!("{issuer}{path}")));
    }
    if let Some(path) = &endpoints.cryptography {
        obj.insert("jwks_uri".into(), serde_json::Value::String(format!("{issuer}{path}")));
    }

    respond(state, document).await
}

async fn respond(state: &OidcState, document: serde_json::Value) -> Outcome {
    if let Decision::Handled(resp) = state.hooks.configuration_endpoint_response(&document).await {
        return Outcome::Handled(resp);
    }
    Outcome::Json(StatusCode::OK, document)
}

pub async fn cryptography(state: &OidcState) -> Outcome {
    let document = match state.hooks.cryptography_endpoint().await {
        Decision::Handled(document) => document,
        _ => state.signing.jwks(),
    };
    if let Decision::Handled(resp) = state.hooks.cryptography_endpoint_response(&document).await {
        return Outcome::Handled(resp);
    }
    Outcome::Json(StatusCode::OK, document)
}
