//! Parsing and emission of OIDC messages (spec.md §3 "OIDC Message", §4.2).
//!
//! An [`OidcMessage`] is an ordered mapping of string parameters plus a
//! request-type tag. Order is preserved because response emission
//! (`query`/`fragment`/`form_post`) walks the parameters in insertion order,
//! and because request reassembly (spec.md §4.4 step 2) needs stable,
//! inspectable storage rather than an opaque generic map.

use crate::errors::OidcError;
use std::fmt::Write as _;
use url::form_urlencoded;

/// What kind of OIDC request this message represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    AuthenticationRequest,
    TokenRequest,
    LogoutRequest,
}

/// An ordered string/string parameter bag. Preserves insertion order and
/// arbitrary, non-well-known keys untouched.
#[derive(Debug, Clone, Default)]
pub struct OidcMessage {
    pub kind: Option<MessageKind>,
    params: Vec<(String, String)>,
}

impl OidcMessage {
    pub fn new(kind: MessageKind) -> Self {
        Self {
            kind: Some(kind),
            params: Vec::new(),
        }
    }

    pub fn empty() -> Self {
        Self {
            kind: None,
            params: Vec::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Sets `key` to `value`, overwriting any existing entry in place, or
    /// appending if absent.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        if let Some(entry) = self.params.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
        } else {
            self.params.push((key, value));
        }
    }

    /// Sets `key` to `value` only if `key` is not already present — used by
    /// request reassembly, where live parameters must win over restored ones
    /// (spec.md §4.4 step 2, invariant 2).
    pub fn set_if_absent(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        if !self.has(&key) {
            self.params.push((key, value));
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        if let Some(pos) = self.params.iter().position(|(k, _)| k == key) {
            Some(self.params.remove(pos).1)
        } else {
            None
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Space-delimited `scope` parameter split into individual scope values.
    pub fn scopes(&self) -> Vec<&str> {
        self.get("scope")
            .map(|s| s.split_whitespace().collect())
            .unwrap_or_default()
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes().contains(&scope)
    }

    /// Space-delimited `response_type` parameter split into individual
    /// values (e.g. `"code id_token"` → `["code", "id_token"]`).
    pub fn response_types(&self) -> Vec<&str> {
        self.get("response_type")
            .map(|s| s.split_whitespace().collect())
            .unwrap_or_default()
    }

    pub fn response_type_contains(&self, value: &str) -> bool {
        self.response_types().contains(&value)
    }

    /// Serializes to `application/x-www-form-urlencoded` form.
    pub fn to_form_urlencoded(&self) -> String {
        self.params
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }
}

/// Parses a query string (`a=b&c=d`, no leading `?`) into an [`OidcMessage`].
pub fn parse_query(kind: MessageKind, query: &str) -> OidcMessage {
    let mut msg = OidcMessage::new(kind);
    for (k, v) in form_urlencoded::parse(query.as_bytes()) {
        msg.set(k.into_owned(), v.into_owned());
    }
    msg
}

/// Parses an `application/x-www-form-urlencoded` body into an
/// [`OidcMessage`].
pub fn parse_form(kind: MessageKind, body: &str) -> OidcMessage {
    parse_query(kind, body)
}

/// Checks a `Content-Type` header value against
/// `application/x-www-form-urlencoded`, case-insensitively, allowing trailing
/// `; charset=...` parameters (spec.md §4.2).
pub fn is_form_urlencoded_content_type(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .map(|t| t.trim().eq_ignore_ascii_case("application/x-www-form-urlencoded"))
        .unwrap_or(false)
}

/// How the authorization endpoint response is delivered back to the client
/// (spec.md §2 "response_mode" / §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    Query,
    Fragment,
    FormPost,
}

impl ResponseMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "query" => Some(ResponseMode::Query),
            "fragment" => Some(ResponseMode::Fragment),
            "form_post" => Some(ResponseMode::FormPost),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ResponseMode::Query => "query",
            ResponseMode::Fragment => "fragment",
            ResponseMode::FormPost => "form_post",
        }
    }
}

/// Appends `params` to `redirect_uri` as a query string, per spec.md §4.2
/// "query" response mode. `redirect_uri` itself is never echoed back.
pub fn emit_query(redirect_uri: &str, params: &[(String, String)]) -> String {
    let mut out = redirect_uri.to_string();
    let separator = if redirect_uri.contains('?') { '&' } else { '?' };
    out.push(separator);
    append_pairs(&mut out, params);
    out
}

/// Appends `params` to `redirect_uri`'s fragment, per spec.md §4.2
/// "fragment" response mode: `#key=val&key=val`.
pub fn emit_fragment(redirect_uri: &str, params: &[(String, String)]) -> String {
    let mut out = redirect_uri.to_string();
    out.push('#');
    append_pairs(&mut out, params);
    out
}

fn append_pairs(out: &mut String, params: &[(String, String)]) {
    for (i, (k, v)) in params.iter().enumerate() {
        if i > 0 {
            out.push('&');
        }
        let _ = write!(
            out,
            "{}={}",
            urlencoding::encode(k),
            urlencoding::encode(v)
        );
    }
}

/// Renders a self-submitting HTML document that POSTs `params` to
/// `redirect_uri`, per spec.md §4.2 "form_post" response mode.
/// `redirect_uri` is HTML-encoded in the form `action`; it is never included
/// as a hidden input.
pub fn emit_form_post(redirect_uri: &str, params: &[(String, String)]) -> String {
    let mut inputs = String::new();
    for (k, v) in params {
        let _ = write!(
            inputs,
            "<input type=\"hidden\" name=\"{}\" value=\"{}\"/>\n",
            html_escape(k),
            html_escape(v)
        );
    }
    format!(
        "<!DOCTYPE html>\n<html>\n<head><title>Working...</title></head>\n<body onload=\"javascript:document.forms[0].submit()\">\n<form method=\"post\" action=\"{}\">\n{}</form>\n</body>\n</html>",
        html_escape(redirect_uri),
        inputs
    )
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Builds a minimal error page body for failures that occur before a
/// `redirect_uri` has been validated (spec.md §7). Hosts that set
/// `ApplicationCanDisplayErrors` are expected to intercept this and render
/// their own page instead.
pub fn error_page(error: &OidcError) -> String {
    let desc = error.description.as_deref().unwrap_or("");
    format!(
        "<!DOCTYPE html>\n<html>\n<head><title>Error</title></head>\n<body>\n<h1>{}</h1>\n<p>{}</p>\n</body>\n</html>",
        html_escape(error.code.as_str()),
        html_escape(desc)
    )
}
