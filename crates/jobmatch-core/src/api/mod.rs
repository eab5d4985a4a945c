//! REST API client module for the jobmatch service.
//!
//! This module provides the shared `ApiClient`, the `Transport` it sends
//! requests over, and the `RequestInterceptor` hook through which the
//! session attaches its bearer credential to every outbound request.

pub mod client;
pub mod error;
pub mod interceptor;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use client::ApiClient;
pub use error::ApiError;
pub use interceptor::{BearerAuth, CredentialSlot, RequestInterceptor};
pub use transport::{HttpTransport, RawResponse, Transport};
