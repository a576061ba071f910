//! # Raag Common Library
//!
//! Shared code for the Musical Map of India asset tooling:
//! - Error type used across crates
//! - Configuration loading (root folder, bootstrap TOML, atomic writes)
//! - Human-readable duration formatting for progress output

pub mod config;
pub mod error;
pub mod human_time;

pub use error::{Error, Result};
