//! Bulwark common types, ids, and errors.
//!
//! This crate provides foundational types shared across bw-core modules:
//! - Rollback point identity with sentinel semantics
//! - Common error types with stable codes
//! - Output format specifications

pub mod error;
pub mod id;
pub mod output;

pub use error::{Error, ErrorKind, Result};
pub use id::RollbackId;
pub use output::OutputFormat;
