//! catsync Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the catsync project.
//!
//! # Overview
//!
//! This crate provides common functionality used across all catsync workspace members:
//!
//! - **Error Handling**: Custom error types and result types
//! - **Ranges**: A1-notation range addressing for the tabular store
//! - **Types**: Cell values, checkpoints, and enrichment results
//! - **Logging**: Centralized `tracing` setup
//!
//! # Example
//!
//! ```no_run
//! use catsync_common::{Result, range::A1Range};
//!
//! fn header_range(sheet: &str) -> Result<A1Range> {
//!     let range: A1Range = format!("{}!A1:ZZ", sheet).parse()?;
//!     Ok(range)
//! }
//! ```

pub mod error;
pub mod logging;
pub mod range;
pub mod types;

// Re-export commonly used types
pub use error::{CommonError, Result};
pub use types::{CellValue, Checkpoint, EnrichmentResult};
