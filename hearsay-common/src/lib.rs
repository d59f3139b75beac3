//! # Hearsay Common Library
//!
//! Shared code for the hearsay listening-test engine:
//! - Database initialization and schema
//! - Error types
//! - Configuration loading
//! - Short public identifier generation

pub mod config;
pub mod db;
pub mod error;
pub mod uid;

pub use error::{Error, Result};
