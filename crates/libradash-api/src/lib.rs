//! HTTP transport for the libradash dashboard backend.
//!
//! This crate is deliberately thin: it knows how to build an
//! authenticated [`RestClient`] from a [`TransportConfig`] and how to
//! turn every transport failure into a typed [`ApiError`]. Caching,
//! request coalescing, retries, and fallback substitution all live in
//! `libradash-core`, which consumes this crate.

pub mod error;
pub mod rest;
pub mod transport;

pub use error::ApiError;
pub use rest::RestClient;
pub use transport::TransportConfig;
