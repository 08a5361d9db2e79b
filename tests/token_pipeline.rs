//! TokenPipeline grant dispatch (spec.md §4.5; §8 scenario B/C).

mod common;

use async_trait::async_trait;
use common::{test_state, PermissiveHooks};
use oidcd::hooks::{Decision, ProviderHooks};
use oidcd::message::OidcMessage;
use oidcd::pipelines::{self, IncomingRequest, Outcome};
use oidcd::ticket::{AuthenticationTicket, Principal, Properties};
use std::sync::Arc;

struct ClientCredentialsHooks;

#[async_trait]
impl ProviderHooks for ClientCredentialsHooks {
    async fn validate_client_authentication(
        &self,
        _client_id: &str,
        _client_secret: Option<&str>,
    ) -> Decision<()> {
        Decision::Validated
    }

    async fn grant_client_credentials(&self, _message: &OidcMessage) -> Decision<AuthenticationTicket> {
        let principal = pipelines::authorization::principal_with_subject("service-account");
        Decision::Handled(AuthenticationTicket::new(principal, Properties::default(), "client_credentials"))
    }
}

#[tokio::test]
async fn client_credentials_grant_issues_access_token() {
    let state = test_state(Arc::new(ClientCredentialsHooks)).await;
    let outcome = pipelines::token::handle(
        &state,
        IncomingRequest {
            method: "POST",
            query: None,
            body: Some("grant_type=client_credentials&client_id=svc&client_secret=s3cret"),
            content_type: Some("application/x-www-form-urlencoded"),
            authorization_header: None,
            is_https: true,
        },
    )
    .await;

    match outcome {
        Outcome::JsonNoCache(status, document) => {
            assert_eq!(status, axum::http::StatusCode::OK);
            assert!(document.get("access_token").and_then(|v| v.as_str()).is_some());
            // No scope was requested so this is a bare client_credentials
            // ticket with no `openid` scope: no id_token is expected.
            assert!(document.get("id_token").is_none());
        }
        _ => panic!("expected a JSON token response"),
    }
}

#[tokio::test]
async fn unsupported_grant_type_is_rejected() {
    let state = test_state(Arc::new(PermissiveHooks)).await;
    let outcome = pipelines::token::handle(
        &state,
        IncomingRequest {
            method: "POST",
            query: None,
            body: Some("grant_type=urn:ietf:params:oauth:grant-type:jwt-bearer&client_id=demo"),
            content_type: Some("application/x-www-form-urlencoded"),
            authorization_header: None,
            is_https: true,
        },
    )
    .await;

    match outcome {
        Outcome::JsonNoCache(status, document) => {
            assert_eq!(status, axum::http::StatusCode::BAD_REQUEST);
            assert_eq!(document.get("error").and_then(|v| v.as_str()), Some("unsupported_grant_type"));
        }
        _ => panic!("expected a JSON error response"),
    }
}

#[tokio::test]
async fn client_authentication_via_basic_header() {
    let state = test_state(Arc::new(ClientCredentialsHooks)).await;
    let header = format!("Basic {}", base64::Engine::encode(&base64::engine::general_purpose::STANDARD, "svc:s3cret"));
    let outcome = pipelines::token::handle(
        &state,
        IncomingRequest {
            method: "POST",
            query: None,
            body: Some("grant_type=client_credentials"),
            content_type: Some("application/x-www-form-urlencoded"),
            authorization_header: Some(&header),
            is_https: true,
        },
    )
    .await;

    match outcome {
        Outcome::JsonNoCache(status, _) => assert_eq!(status, axum::http::StatusCode::OK),
        _ => panic!("expected a JSON token response"),
    }
}

#[tokio::test]
async fn authorization_code_redemption_via_basic_auth_succeeds() {
    let state = test_state(Arc::new(PermissiveHooks)).await;

    let begin_body = "response_type=code&client_id=demo-client&redirect_uri=https%3A%2F%2Frp.example%2Fcb&scope=openid&state=xyz";
    pipelines::authorization::begin(
        &state,
        IncomingRequest {
            method: "POST",
            query: None,
            body: Some(begin_body),
            content_type: Some("application/x-www-form-urlencoded"),
            authorization_header: None,
            is_https: true,
        },
    )
    .await;

    let mut message = oidcd::message::OidcMessage::new(oidcd::message::MessageKind::AuthenticationRequest);
    message.set("response_type", "code");
    message.set("client_id", "demo-client");
    message.set("redirect_uri", "https://rp.example/cb");
    message.set("scope", "openid");
    message.set("state", "xyz");
    let principal = pipelines::authorization::principal_with_subject("alice");
    let sign_in_outcome =
        pipelines::authorization::complete_sign_in(&state, &message, principal, Properties::default()).await;
    let redirect = match sign_in_outcome {
        Outcome::Redirect(url) => url,
        _ => panic!("expected a redirect with the authorization code"),
    };
    let (_, query) = redirect.split_once('?').expect("redirect carries a query");
    let code = url::form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == "code")
        .map(|(_, v)| v.into_owned())
        .expect("code");

    // client_id/client_secret are absent from the form; they must be
    // resolved from the Basic auth header and used for the code's
    // client_id binding check, not rejected as a mismatch.
    let header = format!("Basic {}", base64::Engine::encode(&base64::engine::general_purpose::STANDARD, "demo-client:unused"));
    let token_body = format!(
        "grant_type=authorization_code&code={}&redirect_uri=https%3A%2F%2Frp.example%2Fcb",
        urlencoding::encode(&code)
    );
    let outcome = pipelines::token::handle(
        &state,
        IncomingRequest {
            method: "POST",
            query: None,
            body: Some(&token_body),
            content_type: Some("application/x-www-form-urlencoded"),
            authorization_header: Some(&header),
            is_https: true,
        },
    )
    .await;

    match outcome {
        Outcome::JsonNoCache(status, document) => {
            assert_eq!(status, axum::http::StatusCode::OK);
            assert!(document.get("access_token").and_then(|v| v.as_str()).is_some());
        }
        _ => panic!("expected a JSON token response"),
    }
}

#[tokio::test]
async fn authorization_code_grant_id_token_carries_no_c_hash() {
    let state = test_state(Arc::new(PermissiveHooks)).await;

    let begin_body = "response_type=code&client_id=demo-client&redirect_uri=https%3A%2F%2Frp.example%2Fcb&scope=openid&state=xyz";
    pipelines::authorization::begin(
        &state,
        IncomingRequest {
            method: "POST",
            query: None,
            body: Some(begin_body),
            content_type: Some("application/x-www-form-urlencoded"),
            authorization_header: None,
            is_https: true,
        },
    )
    .await;

    let mut message = oidcd::message::OidcMessage::new(oidcd::message::MessageKind::AuthenticationRequest);
    message.set("response_type", "code");
    message.set("client_id", "demo-client");
    message.set("redirect_uri", "https://rp.example/cb");
    message.set("scope", "openid");
    message.set("state", "xyz");
    let principal = pipelines::authorization::principal_with_subject("alice");
    let sign_in_outcome =
        pipelines::authorization::complete_sign_in(&state, &message, principal, Properties::default()).await;
    let redirect = match sign_in_outcome {
        Outcome::Redirect(url) => url,
        _ => panic!("expected a redirect with the authorization code"),
    };
    let (_, query) = redirect.split_once('?').expect("redirect carries a query");
    let code = url::form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == "code")
        .map(|(_, v)| v.into_owned())
        .expect("code");

    let token_body = format!(
        "grant_type=authorization_code&code={}&redirect_uri=https%3A%2F%2Frp.example%2Fcb&client_id=demo-client",
        urlencoding::encode(&code)
    );
    let outcome = pipelines::token::handle(
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

    let id_token = match outcome {
        Outcome::JsonNoCache(status, document) => {
            assert_eq!(status, axum::http::StatusCode::OK);
            document.get("id_token").and_then(|v| v.as_str()).expect("id_token").to_string()
        }
        _ => panic!("expected a JSON token response"),
    };

    let claims = state.signing.verify(&id_token).expect("id_token verifies");
    assert!(claims.get("c_hash").is_none());
}

#[tokio::test]
async fn missing_grant_type_is_rejected() {
    let state = test_state(Arc::new(PermissiveHooks)).await;
    let outcome = pipelines::token::handle(
        &state,
        IncomingRequest {
            method: "POST",
            query: None,
            body: Some("client_id=demo"),
            content_type: Some("application/x-www-form-urlencoded"),
            authorization_header: None,
            is_https: true,
        },
    )
    .await;

    match outcome {
        Outcome::JsonNoCache(status, document) => {
            assert_eq!(status, axum::http::StatusCode::BAD_REQUEST);
            assert_eq!(document.get("error").and_then(|v| v.as_str()), Some("unsupported_grant_type"));
        }
        _ => panic!("expected a JSON error response"),
    }
}
