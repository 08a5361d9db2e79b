//! ValidationPipeline edge cases (spec.md §4.7).

mod common;

use async_trait::async_trait;
use common::test_state;
use oidcd::hooks::{Decision, NoopHooks, ProviderHooks};
use oidcd::message::OidcMessage;
use oidcd::pipelines::{self, IncomingRequest, Outcome};
use oidcd::ticket::{AuthenticationTicket, Properties};
use std::sync::Arc;

struct ClientCredentialsHooks;

#[async_trait]
impl ProviderHooks for ClientCredentialsHooks {
    async fn validate_client_authentication(&self, _client_id: &str, _client_secret: Option<&str>) -> Decision<()> {
        Decision::Validated
    }

    async fn grant_client_credentials(&self, _message: &OidcMessage) -> Decision<AuthenticationTicket> {
        let principal = pipelines::authorization::principal_with_subject("service-account");
        Decision::Handled(AuthenticationTicket::new(principal, Properties::default(), "client_credentials"))
    }
}

#[tokio::test]
async fn requires_exactly_one_of_token_id_token_refresh_token() {
    let state = test_state(Arc::new(NoopHooks)).await;
    let outcome = pipelines::validation::handle(
        &state,
        IncomingRequest {
            method: "POST",
            query: None,
            body: Some("token=abc&id_token=def"),
            content_type: Some("application/x-www-form-urlencoded"),
            authorization_header: None,
            is_https: true,
        },
    )
    .await;

    match outcome {
        Outcome::JsonNoCache(status, document) => {
            assert_eq!(status, axum::http::StatusCode::BAD_REQUEST);
            assert_eq!(document.get("error").and_then(|v| v.as_str()), Some("invalid_request"));
        }
        _ => panic!("expected a JSON error response"),
    }
}

#[tokio::test]
async fn missing_any_token_parameter_is_rejected() {
    let state = test_state(Arc::new(NoopHooks)).await;
    let outcome = pipelines::validation::handle(
        &state,
        IncomingRequest {
            method: "GET",
            query: Some(""),
            body: None,
            content_type: None,
            authorization_header: None,
            is_https: true,
        },
    )
    .await;

    match outcome {
        Outcome::JsonNoCache(status, document) => {
            assert_eq!(status, axum::http::StatusCode::BAD_REQUEST);
            assert_eq!(document.get("error").and_then(|v| v.as_str()), Some("invalid_request"));
        }
        _ => panic!("expected a JSON error response"),
    }
}

#[tokio::test]
async fn garbage_access_token_fails_signature_verification() {
    let state = test_state(Arc::new(NoopHooks)).await;
    let outcome = pipelines::validation::handle(
        &state,
        IncomingRequest {
            method: "GET",
            query: Some("token=not-a-real-jwt"),
            body: None,
            content_type: None,
            authorization_header: None,
            is_https: true,
        },
    )
    .await;

    match outcome {
        Outcome::JsonNoCache(status, document) => {
            assert_eq!(status, axum::http::StatusCode::BAD_REQUEST);
            assert_eq!(document.get("error").and_then(|v| v.as_str()), Some("invalid_grant"));
        }
        _ => panic!("expected a JSON error response"),
    }
}

#[tokio::test]
async fn unknown_refresh_token_is_rejected() {
    let state = test_state(Arc::new(NoopHooks)).await;
    let outcome = pipelines::validation::handle(
        &state,
        IncomingRequest {
            method: "GET",
            query: Some("refresh_token=never-issued"),
            body: None,
            content_type: None,
            authorization_header: None,
            is_https: true,
        },
    )
    .await;

    match outcome {
        Outcome::JsonNoCache(status, document) => {
            assert_eq!(status, axum::http::StatusCode::BAD_REQUEST);
            assert_eq!(document.get("error").and_then(|v| v.as_str()), Some("invalid_grant"));
        }
        _ => panic!("expected a JSON error response"),
    }
}

#[tokio::test]
async fn token_requesting_an_unregistered_audience_is_rejected() {
    let state = test_state(Arc::new(ClientCredentialsHooks)).await;

    let issue_outcome = pipelines::token::handle(
        &state,
        IncomingRequest {
            method: "POST",
            query: None,
            body: Some("grant_type=client_credentials&client_id=svc&client_secret=s3cret&resource=https%3A%2F%2Fapi.example%2Ffoo"),
            content_type: Some("application/x-www-form-urlencoded"),
            authorization_header: None,
            is_https: true,
        },
    )
    .await;
    let access_token = match issue_outcome {
        Outcome::JsonNoCache(status, document) => {
            assert_eq!(status, axum::http::StatusCode::OK);
            document.get("access_token").and_then(|v| v.as_str()).expect("access_token").to_string()
        }
        _ => panic!("expected a JSON token response"),
    };

    let introspect_body = format!(
        "token={}&audience=https%3A%2F%2Fapi.other.example",
        urlencoding::encode(&access_token)
    );
    let outcome = pipelines::validation::handle(
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

    match outcome {
        Outcome::JsonNoCache(status, document) => {
            assert_eq!(status, axum::http::StatusCode::BAD_REQUEST);
            assert_eq!(document.get("error").and_then(|v| v.as_str()), Some("invalid_grant"));
        }
        _ => panic!("expected a JSON error response"),
    }
}
