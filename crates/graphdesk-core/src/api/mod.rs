//! Microsoft Graph REST client.
//!
//! Requests are described by a [`GraphRequest`] value (path, selected
//! fields, page size, ordering, body) and executed by a [`GraphTransport`].
//! [`HttpTransport`] is the real implementation: it asks a token credential
//! for a bearer token and performs the call with reqwest.

pub mod client;
pub mod error;
pub mod request;

pub use client::{HttpTransport, GRAPH_BASE_URL};
pub use error::ApiError;
pub use request::{Direction, GraphRequest, GraphTransport, Method};
