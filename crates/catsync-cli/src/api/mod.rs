//! Enrichment API client module
//!
//! HTTP client for the product lookup API that supplies enriched catalog data.

pub mod client;
pub mod endpoints;
pub mod types;

pub use client::{EnrichmentApi, ProductApiClient};
pub use types::*;
