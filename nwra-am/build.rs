//! Build script for nwra-am
//!
//! Captures build identification recorded in the provenance document:
//! - Git commit hash, most recent tag, commit date and remote URL
//! - Build timestamp

use std::process::Command;

fn git(args: &[&str]) -> String {
    Command::new("git")
        .args(args)
        .output()
        .ok()
        .and_then(|output| {
            if output.status.success() {
                String::from_utf8(output.stdout).ok()
            } else {
                None
            }
        })
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

fn main() {
    let commit = git(&["rev-parse", "HEAD"]);
    let tag = git(&["describe", "--tags", "--abbrev=0"]);
    let commit_date = git(&["log", "-1", "--format=%cI"]);
    let remote_url = git(&["config", "--get", "remote.origin.url"]);

    // Format: YYYY-MM-DDTHH:MM:SS±HH:MM
    let build_timestamp = chrono::Local::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, false);

    println!("cargo:rustc-env=GIT_COMMIT={}", commit);
    println!("cargo:rustc-env=GIT_TAG={}", tag);
    println!("cargo:rustc-env=GIT_COMMIT_DATE={}", commit_date);
    println!("cargo:rustc-env=GIT_REMOTE_URL={}", remote_url);
    println!("cargo:rustc-env=BUILD_TIMESTAMP={}", build_timestamp);
}
