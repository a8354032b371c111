//! Shared types, errors, and configuration for Sarraf.
//!
//! This crate provides common types used across all other crates:
//! - Money types on integer minor units with decimal rate math
//! - Typed IDs for type-safe entity references
//! - Pagination types for list operations
//! - The service-wide error taxonomy
//! - Configuration management

pub mod config;
pub mod error;
pub mod types;

pub use config::AppConfig;
pub use error::{ErrorKind, ServiceError, ServiceResult};
