//! # Gateway Providers
//!
//! Concrete collaborators for the gateway:
//! - [`HttpApiClient`]: JSON-over-HTTP client with status classification
//! - [`StaticFallback`]: local fallback provider with canned responses

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod fallback;
pub mod http;

pub use fallback::StaticFallback;
pub use http::{build_clients, classify_status, HttpApiClient, HttpClientConfig, COST_HEADER};
