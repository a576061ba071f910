//! Test Helper Utilities
//!
//! Shared utilities for testing raag-assets

pub mod audio_generator;
pub mod fixtures;
pub mod log_capture;

// Re-export commonly used items
pub use audio_generator::{genuine_wav_bytes, wav_bytes, AudioConfig};
pub use fixtures::{
    genuine_jpeg_bytes, read_manifest_json, test_config, untagged_mp3_bytes, write_file,
    MockAudioSearch, MockSearch, MockTransfer, Scripted,
};
pub use log_capture::{init_test_logging, LogCapture};
