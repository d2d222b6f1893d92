//! Conflict-aware HTTP action dispatcher.
//!
//! # Overview
//! Issues GET/POST/PUT/DELETE requests through a pluggable `Transport` and
//! routes the final outcome of each call to exactly one of two caller
//! handlers. PUT recovers from 409 Conflict by re-fetching and resubmitting
//! (bounded) and from 412 Precondition Failed by a single three-way merge.
//!
//! # Design
//! - `Dispatcher` keeps no state between calls.
//! - Each verb is split into `build_*` (plain request data), `try_*`
//!   (`Result`-returning) and the callback form, so the request shapes and the
//!   status policies can be tested without a network.
//! - Non-2xx statuses are data. Transports only fail when there is no
//!   response at all.
//! - `reqwest` (default feature) supplies `ReqwestTransport`; hosts can
//!   implement `Transport` over any other client.

pub mod backoff;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod merge;
pub mod transport;
pub mod types;

pub use client::Dispatcher;
pub use config::DispatcherConfig;
pub use error::{DispatchError, TransportError};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use transport::Transport;
pub use types::{Edit, Representation};

#[cfg(feature = "reqwest")]
pub use transport::ReqwestTransport;
