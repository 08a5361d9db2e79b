//! AuthorizationPipeline (spec.md §4.4 / §4.4.1).

use crate::cache::{self, REQUEST_CACHE_TTL};
use crate::crypto::random_token_256;
use crate::errors::OidcError;
use crate::hooks::Decision;
use crate::message::{self, MessageKind, OidcMessage, ResponseMode};
use crate::metrics;
use crate::pipelines::{IncomingRequest, Outcome};
use crate::state::OidcState;
use crate::ticket::{AuthenticationTicket, Claim, Principal, Properties};
use axum::http::StatusCode;
use chrono::Utc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    None,
    Code,
    Implicit,
    Hybrid,
}

fn classify_flow(response_types: &[&str]) -> Option<Flow> {
    if response_types.is_empty() {
        return None;
    }
    if !response_types
        .iter()
        .all(|t| matches!(*t, "code" | "id_token" | "token" | "none"))
    {
        return None;
    }
    if response_types == ["none"] {
        return Some(Flow::None);
    }
    let has_code = response_types.contains(&"code");
    let has_token = response_types.contains(&"token");
    let has_id_token = response_types.contains(&"id_token");
    match (has_code, has_token || has_id_token) {
        (true, false) => Some(Flow::Code),
        (false, true) => Some(Flow::Implicit),
        (true, true) => Some(Flow::Hybrid),
        (false, false) => None,
    }
}

fn default_response_mode(flow: Flow) -> ResponseMode {
    match flow {
        Flow::None | Flow::Code => ResponseMode::Query,
        Flow::Implicit | Flow::Hybrid => ResponseMode::Fragment,
    }
}

fn error_page(error: &OidcError) -> Outcome {
    Outcome::Html(StatusCode::BAD_REQUEST, message::error_page(error))
}

fn redirect_error(
    redirect_uri: &str,
    mode: ResponseMode,
    error: &OidcError,
    request_state: Option<&str>,
) -> Outcome {
    let mut params = error.to_params();
    if let Some(s) = request_state {
        params.push(("state".to_string(), s.to_string()));
    }
    match mode {
        ResponseMode::Query => Outcome::Redirect(message::emit_query(redirect_uri, &params)),
        ResponseMode::Fragment => Outcome::Redirect(message::emit_fragment(redirect_uri, &params)),
        ResponseMode::FormPost => {
            Outcome::Html(StatusCode::OK, message::emit_form_post(redirect_uri, &params))
        }
    }
}

/// Parses the incoming request into an [`OidcMessage`] (spec.md §4.4 step 1).
fn parse_request(req: &IncomingRequest<'_>) -> Result<OidcMessage, OidcError> {
    match req.method {
        "GET" => Ok(message::parse_query(
            MessageKind::AuthenticationRequest,
            req.query.unwrap_or(""),
        )),
        "POST" => {
            let content_type = req.content_type.unwrap_or("");
            if !message::is_form_urlencoded_content_type(content_type) {
                return Err(OidcError::invalid_request("unsupported content type"));
            }
            Ok(message::parse_form(
                MessageKind::AuthenticationRequest,
                req.body.unwrap_or(""),
            ))
        }
        _ => Err(OidcError::invalid_request("method must be GET or POST")),
    }
}

/// Steps 1–15 of spec.md §4.4. Returns the validated message and resolved
/// redirect_uri/response_mode on success, ready for sign-in, or an `Outcome`
/// describing the terminal failure.
pub async fn begin(state: &OidcState, req: IncomingRequest<'_>) -> Outcome {
    metrics::record_authorization_request();

    // Step 1: parse.
    let mut msg = match parse_request(&req) {
        Ok(m) => m,
        Err(e) => return error_page(&e),
    };

    // Step 2: request reassembly.
    if let Some(unique_id) = msg.get("unique_id").map(str::to_string) {
        let Ok(Some(blob)) = state.cache.get(&unique_id).await else {
            return error_page(&OidcError::invalid_request("timeout expired"));
        };
        let Some(stored) = cache::blob::decode(&blob) else {
            let _ = state.cache.remove(&unique_id).await;
            return error_page(&OidcError::invalid_request("timeout expired"));
        };
        for (k, v) in stored {
            msg.set_if_absent(k, v);
        }
    }

    // Step 4: client_id presence.
    if !msg.has("client_id") {
        return error_page(&OidcError::invalid_request("client_id is missing"));
    }

    let openid_requested = msg.has_scope("openid");
    let request_state = msg.get("state").map(str::to_string);

    // Step 5: redirect_uri presence.
    let redirect_uri_required = openid_requested;
    if redirect_uri_required && !msg.has("redirect_uri") {
        return error_page(&OidcError::invalid_request("redirect_uri is missing"));
    }

    // Step 6: redirect_uri format.
    let mut redirect_uri = msg.get("redirect_uri").map(str::to_string);
    if let Some(uri) = &redirect_uri {
        match url::Url::parse(uri) {
            Ok(parsed) => {
                if parsed.fragment().is_some() {
                    return error_page(&OidcError::invalid_request(
                        "redirect_uri must not contain a fragment",
                    ));
                }
                if parsed.scheme() == "http" && !state.options.allow_insecure_http {
                    return error_page(&OidcError::invalid_request(
                        "redirect_uri must use https",
                    ));
                }
            }
            Err(_) => {
                return error_page(&OidcError::invalid_request(
                    "redirect_uri must be an absolute URI",
                ));
            }
        }
    }

    // Step 7: client validation hook.
    if let Some(uri) = &redirect_uri {
        let client_id = msg.get("client_id").unwrap_or_default().to_string();
        let outcome = state
            .hooks
            .validate_client_redirect_uri(&client_id, uri)
            .await;
        if !outcome.is_validated() {
            redirect_uri = None;
            return error_page(&OidcError::invalid_request("redirect_uri is not registered"));
        }
        if let Decision::Handled(replacement) = outcome {
            redirect_uri = Some(replacement);
        }
    }

    let Some(redirect_uri) = redirect_uri else {
        return error_page(&OidcError::invalid_request("redirect_uri is missing"));
    };

    // Step 8: response_type presence and membership.
    let response_types = msg.response_types();
    let Some(flow) = classify_flow(&response_types) else {
        return redirect_error(
            &redirect_uri,
            ResponseMode::Query,
            &OidcError::unsupported_response_type("response_type is missing or unrecognized"),
            request_state.as_deref(),
        );
    };

    // Step 9: response_mode membership.
    let mode = match msg.get("response_mode") {
        Some(m) => match ResponseMode::parse(m) {
            Some(mode) => mode,
            None => {
                return redirect_error(
                    &redirect_uri,
                    ResponseMode::Query,
                    &OidcError::invalid_request("response_mode is unrecognized"),
                    request_state.as_deref(),
                );
            }
        },
        None => default_response_mode(flow),
    };

    // Step 10: safety — response_mode=query with id_token/token in response_type.
    if mode == ResponseMode::Query
        && (response_types.contains(&"id_token") || response_types.contains(&"token"))
    {
        return redirect_error(
            &redirect_uri,
            ResponseMode::Query,
            &OidcError::invalid_request(
                "response_mode=query is not allowed with response_type containing id_token or token",
            ),
            request_state.as_deref(),
        );
    }

    // Step 11: nonce required for implicit/hybrid + openid.
    if openid_requested
        && matches!(flow, Flow::Implicit | Flow::Hybrid)
        && !msg.has("nonce")
    {
        return redirect_error(
            &redirect_uri,
            mode,
            &OidcError::invalid_request("nonce parameter missing"),
            request_state.as_deref(),
        );
    }

    // Step 12: consistency checks.
    if response_types.contains(&"id_token") && !openid_requested {
        return redirect_error(
            &redirect_uri,
            mode,
            &OidcError::invalid_request("openid scope is required for id_token response type"),
            request_state.as_deref(),
        );
    }
    if response_types.contains(&"code") && !state.endpoints.token_enabled() {
        return redirect_error(
            &redirect_uri,
            mode,
            &OidcError::invalid_request("token endpoint is not enabled"),
            request_state.as_deref(),
        );
    }
    if response_types.contains(&"id_token") && state.signing.is_empty() {
        return redirect_error(
            &redirect_uri,
            mode,
            &OidcError::invalid_request("no signing credentials configured"),
            request_state.as_deref(),
        );
    }

    // Step 13: request validation hook.
    let outcome = state.hooks.validate_authorization_request(&msg).await;
    if !outcome.is_validated() {
        let reason = outcome
            .rejection()
            .unwrap_or("authorization request rejected")
            .to_string();
        return redirect_error(
            &redirect_uri,
            mode,
            &OidcError::invalid_request(reason),
            request_state.as_deref(),
        );
    }

    // Step 14: assign unique_id, persist request.
    if !msg.has("unique_id") {
        let unique_id = random_token_256();
        let params: Vec<(String, String)> =
            msg.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        let blob = cache::blob::encode(&params);
        if state.cache.set(&unique_id, blob, REQUEST_CACHE_TTL).await.is_err() {
            return redirect_error(
                &redirect_uri,
                mode,
                &OidcError::server_error("failed to persist authorization request"),
                request_state.as_deref(),
            );
        }
        msg.set("unique_id", unique_id);
    }

    // Step 15: authorization hook.
    match state.hooks.authorization_endpoint(&msg).await {
        Decision::Handled(response) => Outcome::Handled(response),
        _ => Outcome::Html(
            StatusCode::UNAUTHORIZED,
            "<!DOCTYPE html><html><body>sign-in required</body></html>".to_string(),
        ),
    }
}

/// Sign-in emission (spec.md §4.4.1), invoked by the host once it has
/// established the user's identity for the persisted request carried by
/// `message` (as produced by [`begin`]).
pub async fn complete_sign_in(
    state: &OidcState,
    message: &OidcMessage,
    principal: Principal,
    properties: Properties,
) -> Outcome {
    let redirect_uri = match message.get("redirect_uri") {
        Some(uri) => uri.to_string(),
        None => {
            return Outcome::Html(
                StatusCode::BAD_REQUEST,
                message::error_page(&OidcError::invalid_request("redirect_uri is missing")),
            );
        }
    };
    let mode = message
        .get("response_mode")
        .and_then(ResponseMode::parse)
        .unwrap_or(ResponseMode::Query);
    let request_state = message.get("state").map(str::to_string);
    let response_types = message.response_types();

    let mut response_params: Vec<(String, String)> = Vec::new();
    if let Some(s) = &request_state {
        response_params.push(("state".to_string(), s.clone()));
    }

    let mut code_value: Option<String> = None;
    let mut access_token_value: Option<String> = None;

    if response_types.contains(&"code") {
        let mut code_properties = properties.without_lifetime();
        code_properties.client_id = message.get("client_id").map(str::to_string);
        code_properties.redirect_uri = message.get("redirect_uri").map(str::to_string);
        let code_ticket = AuthenticationTicket::new(principal.clone(), code_properties, "oidc");
        let lifetime = std::time::Duration::from_secs(
            state.options.authorization_code_lifetime_secs.max(0) as u64,
        );
        match state
            .tickets
            .create_authorization_code(&code_ticket, lifetime)
            .await
        {
            Ok(Some(code)) => {
                code_value = Some(code.clone());
                response_params.push(("code".to_string(), code));
            }
            _ => return issuance_failed(&redirect_uri, mode, request_state.as_deref()),
        }
    }

    if response_types.contains(&"token") {
        let access_ticket = AuthenticationTicket::new(
            principal.clone(),
            properties.with_expiry(state.options.access_token_lifetime_secs),
            "oidc",
        );
        let resources: Vec<&str> = access_ticket.properties.resources();
        match state.tickets.create_access_token(&access_ticket, &resources).await {
            Ok(Some(token)) => {
                access_token_value = Some(token.clone());
                response_params.push(("access_token".to_string(), token));
                response_params.push(("token_type".to_string(), "Bearer".to_string()));
                if let Some(exp) = access_ticket.properties.expires_utc {
                    let secs = (exp - Utc::now()).num_seconds().max(0);
                    response_params.push(("expires_in".to_string(), secs.to_string()));
                }
            }
            _ => return issuance_failed(&redirect_uri, mode, request_state.as_deref()),
        }
    }

    if response_types.contains(&"id_token") {
        let client_id = message.get("client_id").unwrap_or_default();
        let nonce = message.get("nonce");
        let id_ticket = AuthenticationTicket::new(
            principal.clone(),
            properties.with_expiry(state.options.identity_token_lifetime_secs),
            "oidc",
        );
        match state
            .tickets
            .create_identity_token(
                &id_ticket,
                client_id,
                nonce,
                code_value.as_deref(),
                access_token_value.as_deref(),
            )
            .await
        {
            Ok(Some(token)) => response_params.push(("id_token".to_string(), token)),
            _ => return issuance_failed(&redirect_uri, mode, request_state.as_deref()),
        }
    }

    if let Some(unique_id) = message.get("unique_id") {
        let _ = state.cache.remove(unique_id).await;
    }

    if let Decision::Handled(resp) = state
        .hooks
        .authorization_endpoint_response(message, &response_params)
        .await
    {
        return Outcome::Handled(resp);
    }

    match mode {
        ResponseMode::Query => Outcome::Redirect(message::emit_query(&redirect_uri, &response_params)),
        ResponseMode::Fragment => {
            Outcome::Redirect(message::emit_fragment(&redirect_uri, &response_params))
        }
        ResponseMode::FormPost => Outcome::Html(
            StatusCode::OK,
            message::emit_form_post(&redirect_uri, &response_params),
        ),
    }
}

fn issuance_failed(redirect_uri: &str, mode: ResponseMode, request_state: Option<&str>) -> Outcome {
    redirect_error(
        redirect_uri,
        mode,
        &OidcError::server_error("failed to issue token"),
        request_state,
    )
}

/// Convenience constructor for a principal carrying just a subject claim,
/// visible to both id_token and access_token — used by hosts wiring up a
/// minimal sign-in decision and by this crate's own tests.
pub fn principal_with_subject(subject: impl Into<String>) -> Principal {
    Principal::new().with_claim(Claim::new(crate::ticket::CLAIM_SUB, subject).for_both())
}
