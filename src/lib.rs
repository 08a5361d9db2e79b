//! OpenID Connect 1.0 / OAuth 2.0 authorization server core.
//!
//! This crate implements the protocol state machines (authorization, token,
//! introspection, logout, discovery) as HTTP-framework-neutral pipelines over
//! an injected [`cache::Cache`] and [`hooks::ProviderHooks`] extension point.
//! Wiring them to an actual HTTP server, persisting clients, and
//! authenticating users are host concerns — see `oidcd-demo` for a minimal
//! example host built on `axum`.

pub mod cache;
pub mod config;
pub mod crypto;
pub mod errors;
pub mod hooks;
pub mod message;
pub mod metrics;
pub mod pipelines;
pub mod router;
pub mod state;
pub mod ticket;
