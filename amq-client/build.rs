//! Stamps the `amq` binary with where and how it was built.
//!
//! `main` logs these at startup so a stream capture can be matched to a build.

use std::env;
use std::process::Command;

const UNKNOWN: &str = "unknown";

fn main() {
    // Re-stamp when the checked-out commit moves; source edits already trigger a rebuild.
    println!("cargo:rerun-if-changed=../.git/HEAD");
    println!("cargo:rerun-if-changed=build.rs");

    let stamp = [
        ("GIT_HASH", short_commit().unwrap_or_else(|| UNKNOWN.into())),
        (
            "BUILD_TIMESTAMP",
            chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        ),
        ("BUILD_PROFILE", env::var("PROFILE").unwrap_or_else(|_| UNKNOWN.into())),
    ];

    for (key, value) in stamp {
        println!("cargo:rustc-env={key}={value}");
    }
}

/// Short commit id, or `None` outside a git checkout
fn short_commit() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short=8", "HEAD"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let hash = String::from_utf8(output.stdout).ok()?;
    let hash = hash.trim();
    (!hash.is_empty()).then(|| hash.to_string())
}
