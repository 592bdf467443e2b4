//! Tabfeed Common Library
//!
//! Shared types, configuration and error handling for the tabfeed workspace.
//!
//! # Overview
//!
//! This crate provides common functionality used across all tabfeed workspace
//! members:
//!
//! - **Error Handling**: the pipeline-wide error type and result alias
//! - **Logging**: tracing-based logging configuration and initialization
//! - **Settings**: runtime settings with environment overrides
//! - **Types**: the record model, type inference and import value objects
//!
//! # Example
//!
//! ```
//! use tabfeed_common::types::{Record, Scalar};
//!
//! let mut record = Record::new();
//! record.insert("amount", Scalar::infer("3000").unwrap());
//! assert_eq!(record.get("amount"), Some(&Scalar::Int(3000)));
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{Result, TabfeedError};
