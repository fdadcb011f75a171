//! Shared fixtures for integration tests.
#![allow(dead_code)]

use assert_cmd::Command;
use beadwork::model::Issue;
use chrono::{TimeZone, Utc};
use std::path::Path;

/// An issue with deterministic timestamps.
#[must_use]
pub fn issue(id: &str, title: &str) -> Issue {
    Issue {
        id: id.to_string(),
        title: title.to_string(),
        created_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        updated_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        ..Issue::default()
    }
}

/// Serialize issues to journal lines.
#[must_use]
pub fn journal_lines(issues: &[Issue]) -> String {
    let mut out = String::new();
    for issue in issues {
        out.push_str(&serde_json::to_string(issue).unwrap());
        out.push('\n');
    }
    out
}

/// A `bd` invocation rooted in the given workspace directory, insulated
/// from the developer's real environment.
#[must_use]
pub fn bd(workspace: &Path) -> Command {
    let mut cmd = Command::cargo_bin("bd").unwrap();
    cmd.current_dir(workspace)
        .env("HOME", workspace)
        .env_remove("BEADS_DIR")
        .env_remove("BD_ACTOR")
        .env_remove("BD_DEBUG")
        .env("USER", "tester");
    cmd
}
