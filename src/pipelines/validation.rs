//! ValidationPipeline — token introspection (spec.md §4.7).

use crate::errors::OidcError;
use crate::hooks::Decision;
use crate::message::{self, MessageKind};
use crate::metrics;
use crate::pipelines::{IncomingRequest, Outcome};
use crate::state::OidcState;
use crate::ticket::{AuthenticationTicket, Claim, Principal, Properties, CLAIM_SUB};
use axum::http::StatusCode;
use chrono::Utc;

fn json_error(status: StatusCode, error: &OidcError) -> Outcome {
    Outcome::JsonNoCache(status, error.to_json())
}

/// Reconstructs a minimal [`AuthenticationTicket`] from decoded JWT claims,
/// for tokens that are verified by signature rather than looked up from the
/// opaque cache (spec.md §4.7, the `Receive*` hook default path).
fn ticket_from_claims(claims: &serde_json::Value) -> Option<AuthenticationTicket> {
    let obj = claims.as_object()?;
    let mut principal = Principal::new();
    let mut properties = Properties::default();

    if let Some(sub) = obj.get("sub").and_then(|v| v.as_str()) {
        principal = principal.with_claim(Claim::new(CLAIM_SUB, sub).for_both());
    }
    if let Some(exp) = obj.get("exp").and_then(|v| v.as_i64()) {
        properties.expires_utc = chrono::DateTime::from_timestamp(exp, 0);
    }
    if let Some(iat) = obj.get("iat").and_then(|v| v.as_i64()) {
        properties.issued_utc = chrono::DateTime::from_timestamp(iat, 0);
    }
    let audiences = match obj.get("aud") {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .collect::<Vec<_>>()
            .join(" "),
        _ => String::new(),
    };
    if !audiences.is_empty() {
        properties.audiences = Some(audiences);
    }

    for (k, v) in obj {
        if matches!(k.as_str(), "sub" | "exp" | "iat" | "iss" | "aud" | "nonce" | "c_hash" | "at_hash") {
            continue;
        }
        if let Some(s) = v.as_str() {
            principal = principal.with_claim(Claim::new(k.clone(), s).for_both());
        }
    }

    Some(AuthenticationTicket::new(principal, properties, "jwt"))
}

pub async fn handle(state: &OidcState, req: IncomingRequest<'_>) -> Outcome {
    let msg = match req.method {
        "GET" => message::parse_query(MessageKind::TokenRequest, req.query.unwrap_or("")),
        "POST" => {
            let content_type = req.content_type.unwrap_or("");
            if !message::is_form_urlencoded_content_type(content_type) {
                return json_error(StatusCode::BAD_REQUEST, &OidcError::invalid_request("unsupported content type"));
            }
            message::parse_form(MessageKind::TokenRequest, req.body.unwrap_or(""))
        }
        _ => return json_error(StatusCode::BAD_REQUEST, &OidcError::invalid_request("method must be GET or POST")),
    };

    metrics::record_introspection_request();

    let present: Vec<&str> = ["token", "id_token", "refresh_token"]
        .into_iter()
        .filter(|k| msg.has(k))
        .collect();
    if present.len() != 1 {
        return json_error(
            StatusCode::BAD_REQUEST,
            &OidcError::invalid_request("exactly one of token, id_token, refresh_token is required"),
        );
    }
    let kind = present[0];
    let value = msg.get(kind).unwrap_or_default();

    let ticket = match kind {
        "refresh_token" => match state.tickets.receive_refresh_token(value).await {
            Ok(Some(t)) => t,
            _ => return json_error(StatusCode::BAD_REQUEST, &OidcError::invalid_grant("invalid or expired ticket")),
        },
        "token" => match state.hooks.receive_access_token(value).await {
            Decision::Handled(t) => t,
            Decision::Rejected(_) => return json_error(StatusCode::BAD_REQUEST, &OidcError::invalid_grant("invalid or expired ticket")),
            _ => match state.signing.verify(value).ok().and_then(|c| ticket_from_claims(&c)) {
                Some(t) => t,
                None => return json_error(StatusCode::BAD_REQUEST, &OidcError::invalid_grant("invalid or expired ticket")),
            },
        },
        "id_token" => match state.hooks.receive_identity_token(value).await {
            Decision::Handled(t) => t,
            Decision::Rejected(_) => return json_error(StatusCode::BAD_REQUEST, &OidcError::invalid_grant("invalid or expired ticket")),
            _ => match state.signing.verify(value).ok().and_then(|c| ticket_from_claims(&c)) {
                Some(t) => t,
                None => return json_error(StatusCode::BAD_REQUEST, &OidcError::invalid_grant("invalid or expired ticket")),
            },
        },
        _ => unreachable!(),
    };

    if ticket.is_expired(Utc::now()) {
        return json_error(StatusCode::BAD_REQUEST, &OidcError::invalid_grant("Expired access token received"));
    }

    if let Some(requested) = msg.get("audience") {
        let requested: Vec<&str> = requested.split_whitespace().collect();
        let ticket_audiences = ticket.properties.audiences();
        if !ticket_audiences.is_empty() && !requested.iter().all(|a| ticket_audiences.contains(a)) {
            return json_error(StatusCode::BAD_REQUEST, &OidcError::invalid_grant("audience is not a subset of the ticket's audiences"));
        }
    }

    if !state.hooks.validation_endpoint(&msg, &ticket).await.is_validated() {
        // Skipped means "no opinion" — default acceptance, mirroring every
        // other optional validation hook in this pipeline family.
    }

    let audiences = ticket.properties.audiences();
    let expires_in = ticket
        .properties
        .expires_utc
        .map(|exp| (exp - Utc::now()).num_seconds().max(0));

    let claims: Vec<serde_json::Value> = ticket
        .principal
        .claims
        .iter()
        .map(|c| serde_json::json!({ "type": c.claim_type, "value": c.value }))
        .collect();

    let mut body = serde_json::Map::new();
    body.insert(
        "audiences".to_string(),
        serde_json::Value::Array(audiences.into_iter().map(|a| serde_json::Value::String(a.to_string())).collect()),
    );
    if let Some(secs) = expires_in {
        body.insert("expires_in".to_string(), serde_json::Value::from(secs));
    }
    body.insert("claims".to_string(), serde_json::Value::Array(claims));
    let document = serde_json::Value::Object(body);

    if let Decision::Handled(resp) = state.hooks.validation_endpoint_response(&document).await {
        return Outcome::Handled(resp);
    }

    Outcome::JsonNoCache(StatusCode::OK, document)
}
