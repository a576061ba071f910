//! raag-assets library interface
//!
//! Acquires the images and audio the Musical Map of India website needs,
//! substitutes placeholders for anything that cannot be fetched, and keeps a
//! JSON manifest describing what is actually on disk.
//!
//! The binary is a thin CLI over [`orchestrator::Orchestrator`]; everything is
//! exposed here for integration testing.

pub mod acquire;
pub mod audio_search;
pub mod catalog;
pub mod checkpoint;
pub mod classifier;
pub mod config;
pub mod content;
pub mod error;
pub mod manifest;
pub mod orchestrator;
pub mod placeholder;
pub mod retry;
pub mod search;
pub mod stats;
pub mod transfer;

pub use crate::catalog::{AssetCategory, AssetDescriptor, Catalog, MediaKind, SourceHint};
pub use crate::config::PipelineConfig;
pub use crate::error::AcquireError;
pub use crate::orchestrator::{AssetOutcome, DryRunEstimate, Orchestrator, RunReport};
