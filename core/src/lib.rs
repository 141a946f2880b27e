//! Synchronous client core for a wiki's `api.php` query/action API.
//!
//! # Overview
//! `WikiClient` holds one session: endpoint, user agent, cookie jar and a
//! token cache. Requests are GET or POST with `format=json` forced; bodies
//! are decoded into a path-navigable `Document`. API-level `error` and
//! `warnings` markers are reported separately from transport failures.
//!
//! # Design
//! - The HTTP round-trip sits behind the `Transport` trait. `UreqTransport`
//!   is the default; tests use scripted transports that record requests.
//! - Request building (`build_request`) is pure, so the wire shape is
//!   testable without a server.
//! - Login is a bounded two-round handshake: credentials, then credentials
//!   plus the token from a `NeedToken` answer.
//! - Tokens are cached per kind until the caller invalidates them.

pub mod client;
pub mod config;
pub mod cookies;
pub mod document;
pub mod error;
pub mod http;
pub mod params;

pub use client::WikiClient;
pub use config::{ClientConfig, DEFAULT_USER_AGENT, FORMAT};
pub use cookies::{Cookie, CookieJar};
pub use document::{decode, error_check, ApiStatus, Document};
pub use error::ClientError;
pub use http::{HttpMethod, HttpRequest, HttpResponse, Transport, UreqTransport};
pub use params::Params;
