//! TokenPipeline (spec.md §4.5) and token construction rules (spec.md §4.6).

use crate::errors::OidcError;
use crate::hooks::Decision;
use crate::message::{self, MessageKind, OidcMessage};
use crate::metrics;
use crate::pipelines::{IncomingRequest, Outcome};
use crate::state::OidcState;
use crate::ticket::AuthenticationTicket;
use axum::http::StatusCode;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64_STD;
use chrono::Utc;
use std::time::Duration;

fn json_error(status: StatusCode, error: &OidcError) -> Outcome {
    Outcome::JsonNoCache(status, error.to_json())
}

/// Resolves `client_id`/`client_secret` from the form body, falling back to
/// HTTP Basic auth (spec.md §4.5 "Client authentication").
fn resolve_client_credentials(
    msg: &OidcMessage,
    authorization_header: Option<&str>,
) -> (Option<String>, Option<String>) {
    if msg.has("client_id") || msg.has("client_secret") {
        return (
            msg.get("client_id").map(str::to_string),
            msg.get("client_secret").map(str::to_string),
        );
    }
    let Some(header) = authorization_header else {
        return (None, None);
    };
    let Some(encoded) = header.strip_prefix("Basic ") else {
        return (None, None);
    };
    let Ok(decoded) = BASE64_STD.decode(encoded.trim()) else {
        return (None, None);
    };
    let Ok(text) = String::from_utf8(decoded) else {
        return (None, None);
    };
    match text.split_once(':') {
        Some((id, secret)) => (Some(id.to_string()), Some(secret.to_string())),
        None => (Some(text), None),
    }
}

fn subset(request_values: &[&str], ticket_values: &[&str]) -> bool {
    request_values
        .iter()
        .all(|v| ticket_values.contains(v))
}

/// Receives and validates the ticket bound to an `authorization_code` or
/// `refresh_token` grant (spec.md §4.5 steps 1–5).
async fn receive_grant_ticket(
    state: &OidcState,
    msg: &OidcMessage,
    client_id: &str,
    is_refresh: bool,
) -> Result<AuthenticationTicket, OidcError> {
    let ticket = if is_refresh {
        let token = msg.get("refresh_token").unwrap_or_default();
        state.tickets.receive_refresh_token(token).await
    } else {
        let code = msg.get("code").unwrap_or_default();
        state.tickets.receive_authorization_code(code).await
    };
    let Ok(Some(mut ticket)) = ticket else {
        return Err(OidcError::invalid_grant("Invalid ticket"));
    };

    if ticket.is_expired(Utc::now()) {
        return Err(OidcError::invalid_grant("Expired"));
    }

    if !is_refresh {
        if let Some(stored_redirect) = ticket.properties.redirect_uri.clone() {
            if msg.get("redirect_uri") != Some(stored_redirect.as_str()) {
                return Err(OidcError::invalid_grant("redirect_uri mismatch"));
            }
            ticket.properties.redirect_uri = None;
        }
    }

    if let Some(stored_client) = &ticket.properties.client_id
        && client_id != stored_client.as_str()
    {
        return Err(OidcError::invalid_grant("client_id mismatch"));
    }

    if let Some(resource) = msg.get("resource") {
        let requested: Vec<&str> = resource.split_whitespace().collect();
        let stored = ticket.properties.resources();
        if stored.is_empty() || !subset(&requested, &stored) {
            return Err(OidcError::invalid_grant("resource not granted"));
        }
    }
    if let Some(scope) = msg.get("scope") {
        let requested: Vec<&str> = scope.split_whitespace().collect();
        let stored = ticket.properties.scopes();
        if stored.is_empty() || !subset(&requested, &stored) {
            return Err(OidcError::invalid_grant("scope not granted"));
        }
    }

    Ok(ticket)
}

/// Caps a freshly issued token's `expires_utc` at the refresh ticket's own
/// expiry when sliding expiration is disabled (spec.md §4.5 issuance rules).
fn apply_sliding_cap(expires_utc: chrono::DateTime<Utc>, refresh_ticket_expiry: Option<chrono::DateTime<Utc>>, sliding: bool) -> chrono::DateTime<Utc> {
    if sliding {
        return expires_utc;
    }
    match refresh_ticket_expiry {
        Some(cap) if expires_utc > cap => cap,
        _ => expires_utc,
    }
}

pub async fn handle(state: &OidcState, req: IncomingRequest<'_>) -> Outcome {
    if req.method != "POST" {
        return json_error(
            StatusCode::BAD_REQUEST,
            &OidcError::invalid_request("method must be POST"),
        );
    }
    let content_type = req.content_type.unwrap_or("");
    if !message::is_form_urlencoded_content_type(content_type) {
        return json_error(
            StatusCode::BAD_REQUEST,
            &OidcError::invalid_request("unsupported content type"),
        );
    }
    let msg = message::parse_form(MessageKind::TokenRequest, req.body.unwrap_or(""));

    let (client_id, client_secret) = resolve_client_credentials(&msg, req.authorization_header);
    let client_id = match client_id {
        Some(id) => id,
        None => return json_error(StatusCode::BAD_REQUEST, &OidcError::invalid_client("client_id is missing")),
    };
    if !state
        .hooks
        .validate_client_authentication(&client_id, client_secret.as_deref())
        .await
        .is_validated()
    {
        return json_error(
            StatusCode::BAD_REQUEST,
            &OidcError::invalid_client("client authentication failed"),
        );
    }

    let grant_type = msg.get("grant_type").unwrap_or("").to_string();

    let mut ticket = match grant_type.as_str() {
        "authorization_code" => match receive_grant_ticket(state, &msg, &client_id, false).await {
            Ok(t) => t,
            Err(e) => return json_error(StatusCode::BAD_REQUEST, &e),
        },
        "refresh_token" => match receive_grant_ticket(state, &msg, &client_id, true).await {
            Ok(t) => t,
            Err(e) => return json_error(StatusCode::BAD_REQUEST, &e),
        },
        "password" => {
            match state.hooks.grant_resource_owner_credentials(&msg).await {
                Decision::Handled(t) => t,
                _ => return json_error(StatusCode::BAD_REQUEST, &OidcError::invalid_grant("resource owner credentials rejected")),
            }
        }
        "client_credentials" => match state.hooks.grant_client_credentials(&msg).await {
            Decision::Handled(t) => t,
            _ => {
                return json_error(
                    StatusCode::BAD_REQUEST,
                    &OidcError::unauthorized_client("client_credentials grant rejected"),
                );
            }
        },
        "" => return json_error(StatusCode::BAD_REQUEST, &OidcError::unsupported_grant_type("grant_type is missing")),
        _ => match state.hooks.grant_custom_extension(&msg).await {
            Decision::Handled(t) => t,
            _ => {
                return json_error(
                    StatusCode::BAD_REQUEST,
                    &OidcError::unsupported_grant_type("grant_type is not supported"),
                );
            }
        },
    };

    if matches!(grant_type.as_str(), "authorization_code" | "refresh_token") {
        if !state.hooks.validate_token_request(&msg).await.is_validated() {
            // ValidateTokenRequest has no documented built-in default beyond
            // proceeding when skipped — only a reject is terminal.
        }
        let pre_issued = ticket.properties.issued_utc;
        let pre_expires = ticket.properties.expires_utc;
        let replaced = if grant_type == "authorization_code" {
            state.hooks.grant_authorization_code(&msg, ticket.clone()).await
        } else {
            state.hooks.grant_refresh_token(&msg, ticket.clone()).await
        };
        if let Decision::Handled(new_ticket) = replaced {
            ticket = new_ticket;
        }
        if ticket.properties.issued_utc == pre_issued && ticket.properties.expires_utc == pre_expires {
            ticket.properties.issued_utc = None;
            ticket.properties.expires_utc = None;
        }
    }

    metrics::record_token_issued(grant_type.as_str());

    if let Decision::Handled(resp) = state.hooks.token_endpoint(&msg).await {
        return Outcome::Handled(resp);
    }

    ticket.properties.client_id = Some(client_id.clone());
    if let Some(resource) = msg.get("resource") {
        ticket.properties.resource = Some(resource.to_string());
    }
    if let Some(scope) = msg.get("scope") {
        ticket.properties.scope = Some(scope.to_string());
    }

    let response_types = msg.response_types();
    let issue_all = response_types.is_empty();
    let refresh_ticket_expiry = if grant_type == "refresh_token" {
        ticket.properties.expires_utc
    } else {
        None
    };
    let sliding = state.options.use_sliding_expiration;
    let openid_in_play = ticket.properties.scopes().contains(&"openid");

    let mut body = serde_json::Map::new();
    body.insert("token_type".to_string(), serde_json::Value::String("Bearer".to_string()));

    let mut issued_access_token: Option<String> = None;

    if issue_all || response_types.contains(&"token") {
        let mut access_props = ticket.properties.with_expiry(state.options.access_token_lifetime_secs);
        if let Some(exp) = access_props.expires_utc {
            access_props.expires_utc = Some(apply_sliding_cap(exp, refresh_ticket_expiry, sliding));
        }
        let access_ticket = AuthenticationTicket::new(ticket.principal.clone(), access_props, ticket.scheme.clone());
        let resources = access_ticket.properties.resources();
        match state.tickets.create_access_token(&access_ticket, &resources).await {
            Ok(Some(token)) => {
                issued_access_token = Some(token.clone());
                if let Some(exp) = access_ticket.properties.expires_utc {
                    let secs = (exp - Utc::now()).num_seconds().max(0);
                    body.insert("expires_in".to_string(), serde_json::Value::from(secs));
                }
                body.insert("access_token".to_string(), serde_json::Value::String(token));
            }
            _ => return json_error(StatusCode::INTERNAL_SERVER_ERROR, &OidcError::server_error("failed to issue access token")),
        }
    }

    if (issue_all && openid_in_play) || response_types.contains(&"id_token") {
        let mut id_props = ticket.properties.with_expiry(state.options.identity_token_lifetime_secs);
        if let Some(exp) = id_props.expires_utc {
            id_props.expires_utc = Some(apply_sliding_cap(exp, refresh_ticket_expiry, sliding));
        }
        let id_ticket = AuthenticationTicket::new(ticket.principal.clone(), id_props, ticket.scheme.clone());
        let nonce = msg.get("nonce");
        match state
            .tickets
            .create_identity_token(&id_ticket, &client_id, nonce, None, issued_access_token.as_deref())
            .await
        {
            Ok(Some(token)) => {
                body.insert("id_token".to_string(), serde_json::Value::String(token));
            }
            Ok(None) | Err(_) if openid_in_play => {
                return json_error(StatusCode::INTERNAL_SERVER_ERROR, &OidcError::server_error("failed to issue id_token"));
            }
            _ => {}
        }
    }

    if issue_all || response_types.contains(&"refresh_token") {
        let mut refresh_props = ticket.properties.with_expiry(state.options.refresh_token_lifetime_secs);
        if let Some(exp) = refresh_props.expires_utc {
            refresh_props.expires_utc = Some(apply_sliding_cap(exp, refresh_ticket_expiry, sliding));
        }
        let refresh_ticket = AuthenticationTicket::new(ticket.principal.clone(), refresh_props, ticket.scheme.clone());
        let lifetime = Duration::from_secs(state.options.refresh_token_lifetime_secs.max(0) as u64);
        match state.tickets.create_refresh_token(&refresh_ticket, lifetime).await {
            Ok(Some(token)) => {
                body.insert("refresh_token".to_string(), serde_json::Value::String(token));
            }
            _ => {}
        }
    }

    Outcome::JsonNoCache(StatusCode::OK, serde_json::Value::Object(body))
}
