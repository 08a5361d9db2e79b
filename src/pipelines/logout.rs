//! LogoutPipeline — end-session / RP-initiated logout (spec.md §4.8).

use crate::hooks::Decision;
use crate::message::{self, MessageKind};
use crate::pipelines::{IncomingRequest, Outcome};
use crate::state::OidcState;
use axum::http::StatusCode;

const LOGGED_OUT_HTML: &str = "<!DOCTYPE html>\n<html>\n<head><title>Signed out</title></head>\n<body>\n<p>You have been signed out.</p>\n</body>\n</html>";

pub async fn handle(state: &OidcState, req: IncomingRequest<'_>) -> Outcome {
    let mut msg = match req.method {
        "GET" => message::parse_query(MessageKind::LogoutRequest, req.query.unwrap_or("")),
        "POST" => message::parse_form(MessageKind::LogoutRequest, req.body.unwrap_or("")),
        _ => return Outcome::Html(StatusCode::BAD_REQUEST, "method must be GET or POST".to_string()),
    };

    if let Some(redirect_uri) = msg.get("post_logout_redirect_uri").map(str::to_string) {
        let client_id = msg.get("client_id").unwrap_or_default().to_string();
        let outcome = state
            .hooks
            .validate_client_logout_redirect_uri(&client_id, &redirect_uri)
            .await;
        if !outcome.is_validated() {
            msg.remove("post_logout_redirect_uri");
        } else if let Decision::Handled(replacement) = outcome {
            msg.set("post_logout_redirect_uri", replacement);
        }
    }

    if let Decision::Handled(resp) = state.hooks.logout_endpoint(&msg).await {
        return Outcome::Handled(resp);
    }

    let default_outcome = match msg.get("post_logout_redirect_uri") {
        Some(redirect_uri) => {
            let params: Vec<(String, String)> = msg
                .iter()
                .filter(|(k, _)| *k != "post_logout_redirect_uri")
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            Outcome::Redirect(message::emit_query(redirect_uri, &params))
        }
        None => Outcome::Html(StatusCode::OK, LOGGED_OUT_HTML.to_string()),
    };

    if let Decision::Handled(resp) = state.hooks.logout_endpoint_response(&msg).await {
        return Outcome::Handled(resp);
    }

    default_outcome
}
