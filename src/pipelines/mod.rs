//! Shared pipeline plumbing (spec.md §4.4–§4.9): the HTTP-agnostic request
//! shape every pipeline entry point accepts, and the outcome type every
//! pipeline produces.

pub mod authorization;
pub mod discovery;
pub mod logout;
pub mod token;
pub mod validation;

use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use serde_json::Value;

/// The already-extracted pieces of an HTTP request a pipeline needs. Raw
/// socket I/O and header parsing are the host's concern (spec.md §1
/// "Out of scope: HTTP server plumbing"); this is the boundary.
pub struct IncomingRequest<'a> {
    pub method: &'a str,
    pub query: Option<&'a str>,
    pub body: Option<&'a str>,
    pub content_type: Option<&'a str>,
    pub authorization_header: Option<&'a str>,
    pub is_https: bool,
}

/// What a pipeline decided to do with a request. Kept HTTP-framework-neutral
/// except for the escape hatch hooks use to fully take over a response.
pub enum Outcome {
    Redirect(String),
    Html(StatusCode, String),
    Json(StatusCode, Value),
    /// JSON body with `Cache-Control: no-cache`, `Pragma: no-cache`,
    /// `Expires: -1` (spec.md §4.5, §4.7).
    JsonNoCache(StatusCode, Value),
    /// A host hook fully produced the response; pass it through unchanged.
    Handled(Response),
}

impl IntoResponse for Outcome {
    fn into_response(self) -> Response {
        match self {
            Outcome::Redirect(url) => axum::response::Redirect::to(&url).into_response(),
            Outcome::Html(status, body) => (status, Html(body)).into_response(),
            Outcome::Json(status, body) => (status, axum::Json(body)).into_response(),
            Outcome::JsonNoCache(status, body) => {
                let mut resp = (status, axum::Json(body)).into_response();
                let headers = resp.headers_mut();
                headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
                headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
                headers.insert(header::EXPIRES, HeaderValue::from_static("-1"));
                resp
            }
            Outcome::Handled(resp) => resp,
        }
    }
}
