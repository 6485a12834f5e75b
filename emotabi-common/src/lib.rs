//! # EMOTABI Common Library
//!
//! Shared code for the EMOTABI service binaries:
//! - Common error type
//! - TOML configuration schema and file discovery
//! - Root folder resolution and initialization
//! - API key format checks used by startup diagnostics

pub mod config;
pub mod error;
pub mod keys;

pub use error::{Error, Result};
