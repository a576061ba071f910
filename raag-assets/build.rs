//! Build script for raag-assets
//!
//! Stamps the binary with the commit it was built from, when it was built,
//! and the cargo profile. The startup log line prints all three so a run log
//! can be matched to a build.

use std::process::Command;

fn git_short_hash() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short=8", "HEAD"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8(output.stdout)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn main() {
    let git_hash = git_short_hash().unwrap_or_else(|| "unknown".to_string());
    let built_at = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    let profile = std::env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string());

    println!("cargo:rustc-env=RAAG_GIT_HASH={}", git_hash);
    println!("cargo:rustc-env=RAAG_BUILD_TIMESTAMP={}", built_at);
    println!("cargo:rustc-env=RAAG_BUILD_PROFILE={}", profile);

    // The built-in catalog is compiled in with include_str!
    println!("cargo:rerun-if-changed=data/catalog.toml");
    println!("cargo:rerun-if-changed=build.rs");
}
