//! End-to-end authorization_code flow: begin → sign-in → token exchange →
//! introspection (spec.md §4.4, §4.4.1, §4.5, §4.7; §8 scenario A).

mod common;

use common::{test_state, PermissiveHooks};
use oidcd::message::{MessageKind, OidcMessage};
use oidcd::pipelines::{self, IncomingRequest, Outcome};
use oidcd::ticket::Properties;
use std::sync::Arc;

fn extract_response_params(url: &str) -> Vec<(String, String)> {
    let (_, query) = url.split_once('?').expect("redirect must carry a query");
    url::form_urlencoded::parse(query.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

#[tokio::test]
async fn authorization_code_round_trip_issues_tokens() {
    let state = test_state(Arc::new(PermissiveHooks)).await;

    let body = "response_type=code&client_id=demo-client&redirect_uri=https%3A%2F%2Frp.example%2Fcb&scope=openid+profile&state=xyz";
    let begin_outcome = pipelines::authorization::begin(
        &state,
        IncomingRequest {
            method: "POST",
            query: None,
            body: Some(body),
            content_type: Some("application/x-www-form-urlencoded"),
            authorization_header: None,
            is_https: true,
        },
    )
    .await;

    // NoopHooks never handles `authorization_endpoint`, so begin() falls
    // through to the default sign-in-required page — the request is now
    // persisted under a unique_id in the cache.
    match begin_outcome {
        Outcome::Html(status, _) => assert_eq!(status, axum::http::StatusCode::UNAUTHORIZED),
        _ => panic!("expected a sign-in-required page"),
    }

    // The host locates the persisted request itself in a real deployment;
    // here we reconstruct it the same way the demo binary's sign-in
    // completion handler does.
    let mut message = OidcMessage::new(MessageKind::AuthenticationRequest);
    message.set("response_type", "code");
    message.set("client_id", "demo-client");
    message.set("redirect_uri", "https://rp.example/cb");
    message.set("scope", "openid profile");
    message.set("state", "xyz");

    let principal = pipelines::authorization::principal_with_subject("alice");
    let sign_in_outcome =
        pipelines::authorization::complete_sign_in(&state, &message, principal, Properties::default()).await;

    let redirect = match sign_in_outcome {
        Outcome::Redirect(url) => url,
        _ => panic!("expected a redirect with the authorization code"),
    };
    assert!(redirect.starts_with("https://rp.example/cb?"));
    let params = extract_response_params(&redirect);
    let code = params.iter().find(|(k, _)| k == "code").map(|(_, v)| v.clone()).expect("code");
    assert_eq!(params.iter().find(|(k, _)| k == "state").map(|(_, v)| v.as_str()), Some("xyz"));

    let token_body = format!(
        "grant_type=authorization_code&code={}&redirect_uri=https%3A%2F%2Frp.example%2Fcb&client_id=demo-client",
        urlencoding::encode(&code)
    );
    let token_outcome = pipelines::token::handle(
        &state,
        IncomingRequest {
            method: "POST",
            query: None,
            body: Some(&token_body),
            content_type: Some("application/x-www-form-urlencoded"),
            authorization_header: None,
            is_https: true,
        },
    )
    .await;

    let document = match token_outcome {
        Outcome::JsonNoCache(status, document) => {
            assert_eq!(status, axum::http::StatusCode::OK);
            document
        }
        _ => panic!("expected a JSON token response"),
    };
    let access_token = document.get("access_token").and_then(|v| v.as_str()).expect("access_token").to_string();
    assert!(document.get("id_token").and_then(|v| v.as_str()).is_some());

    // The same authorization code must not be redeemable twice.
    let replay_outcome = pipelines::token::handle(
        &state,
        IncomingRequest {
            method: "POST",
            query: None,
            body: Some(&token_body),
            content_type: Some("application/x-www-form-urlencoded"),
            authorization_header: None,
            is_https: true,
        },
    )
    .await;
    match replay_outcome {
        Outcome::JsonNoCache(status, document) => {
            assert_eq!(status, axum::http::StatusCode::BAD_REQUEST);
            assert_eq!(document.get("error").and_then(|v| v.as_str()), Some("invalid_grant"));
        }
        _ => panic!("expected a JSON error response"),
    }

    let introspect_body = format!("token={}", urlencoding::encode(&access_token));
    let introspect_outcome = pipelines::validation::handle(
        &state,
        IncomingRequest {
            method: "POST",
            query: None,
            body: Some(&introspect_body),
            content_type: Some("application/x-www-form-urlencoded"),
            authorization_header: None,
            is_https: true,
        },
    )
    .await;
    match introspect_outcome {
        Outcome::JsonNoCache(status, document) => {
            assert_eq!(status, axum::http::StatusCode::OK);
            let claims = document.get("claims").and_then(|v| v.as_array()).expect("claims");
            assert!(claims.iter().any(|c| c.get("type").and_then(|v| v.as_str()) == Some("sub")
                && c.get("value").and_then(|v| v.as_str()) == Some("alice")));
        }
        _ => panic!("expected a JSON introspection response"),
    }
}

#[tokio::test]
async fn authorization_code_redemption_rejects_mismatched_redirect_uri() {
    let state = test_state(Arc::new(PermissiveHooks)).await;

    let mut message = OidcMessage::new(MessageKind::AuthenticationRequest);
    message.set("response_type", "code");
    message.set("client_id", "demo-client");
    message.set("redirect_uri", "https://rp.example/cb");
    message.set("scope", "openid");

    let principal = pipelines::authorization::principal_with_subject("alice");
    let sign_in_outcome =
        pipelines::authorization::complete_sign_in(&state, &message, principal, Properties::default()).await;
    let redirect = match sign_in_outcome {
        Outcome::Redirect(url) => url,
        _ => panic!("expected a redirect with the authorization code"),
    };
    let params = extract_response_params(&redirect);
    let code = params.iter().find(|(k, _)| k == "code").map(|(_, v)| v.clone()).expect("code");

    // Redeeming with a redirect_uri that doesn't match what was bound at
    // issuance must be rejected, not silently accepted.
    let token_body = format!(
        "grant_type=authorization_code&code={}&redirect_uri=https%3A%2F%2Fattacker.example%2Fcb&client_id=demo-client",
        urlencoding::encode(&code)
    );
    let token_outcome = pipelines::token::handle(
        &state,
        IncomingRequest {
            method: "POST",
            query: None,
            body: Some(&token_body),
            content_type: Some("application/x-www-form-urlencoded"),
            authorization_header: None,
            is_https: true,
        },
    )
    .await;

    match token_outcome {
        Outcome::JsonNoCache(status, document) => {
            assert_eq!(status, axum::http::StatusCode::BAD_REQUEST);
            assert_eq!(document.get("error").and_then(|v| v.as_str()), Some("invalid_grant"));
        }
        _ => panic!("expected a JSON error response"),
    }
}
