//! Workspace discovery and configuration.
//!
//! Resolution order for the workspace:
//! 1. `BEADS_DIR` environment override
//! 2. Walk up from the current directory looking for `.beads/`
//! 3. Fall back to `~/.beads` (created on demand by `bd init` or first open)
//!
//! `.beads/config.yaml` may override the database and journal filenames.

use crate::error::{BeadworkError, Result};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

const DEFAULT_DB_FILENAME: &str = "beads.db";
const DEFAULT_JOURNAL_FILENAME: &str = "issues.jsonl";
const FALLBACK_DB_FILENAME: &str = "default.db";

/// Optional per-workspace settings from `.beads/config.yaml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct WorkspaceConfig {
    /// Database filename (relative to `.beads/`) or absolute path.
    #[serde(default)]
    pub database: Option<String>,
    /// Journal filename (relative to `.beads/`) or absolute path.
    #[serde(default)]
    pub jsonl_export: Option<String>,
    /// Issue ID prefix for this workspace.
    #[serde(default)]
    pub prefix: Option<String>,
}

impl WorkspaceConfig {
    /// Load `config.yaml` from a beads directory. Missing file is fine.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(beads_dir: &Path) -> Result<Self> {
        let path = beads_dir.join("config.yaml");
        if !path.is_file() {
            return Ok(Self {
                database: None,
                jsonl_export: None,
                prefix: None,
            });
        }
        let raw = std::fs::read_to_string(&path)?;
        let config: Self = serde_yaml::from_str(&raw)?;
        Ok(config)
    }
}

/// Resolved filesystem paths for this workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPaths {
    pub beads_dir: PathBuf,
    pub db_path: PathBuf,
    pub journal_path: PathBuf,
    /// Issue ID prefix (default "bd").
    pub prefix: String,
}

impl ConfigPaths {
    /// Resolve database and journal paths for a beads directory.
    ///
    /// `--db` overrides discovery entirely; the journal then lives next to
    /// the overridden database file.
    ///
    /// # Errors
    ///
    /// Returns an error if `config.yaml` exists but cannot be parsed.
    pub fn resolve(beads_dir: &Path, db_override: Option<&Path>) -> Result<Self> {
        let config = WorkspaceConfig::load(beads_dir)?;

        let db_path = match db_override {
            Some(path) => path.to_path_buf(),
            None => join_or_absolute(
                beads_dir,
                config.database.as_deref().unwrap_or(DEFAULT_DB_FILENAME),
            ),
        };

        let journal_path = if db_override.is_some() {
            db_path.with_extension("jsonl")
        } else {
            join_or_absolute(
                beads_dir,
                config
                    .jsonl_export
                    .as_deref()
                    .unwrap_or(DEFAULT_JOURNAL_FILENAME),
            )
        };

        Ok(Self {
            beads_dir: beads_dir.to_path_buf(),
            db_path,
            journal_path,
            prefix: config.prefix.unwrap_or_else(|| "bd".to_string()),
        })
    }
}

fn join_or_absolute(base: &Path, name: &str) -> PathBuf {
    let candidate = PathBuf::from(name);
    if candidate.is_absolute() {
        candidate
    } else {
        base.join(candidate)
    }
}

/// Discover the active `.beads` directory.
///
/// Honors `BEADS_DIR` when set, otherwise walks up from `start` (or CWD).
///
/// # Errors
///
/// Returns `NotInitialized` if no beads directory is found.
pub fn discover_beads_dir(start: Option<&Path>) -> Result<PathBuf> {
    if let Ok(value) = env::var("BEADS_DIR") {
        if !value.trim().is_empty() {
            let path = PathBuf::from(value);
            if path.is_dir() {
                return Ok(path);
            }
        }
    }

    let mut current = match start {
        Some(path) => path.to_path_buf(),
        None => env::current_dir()?,
    };

    loop {
        let candidate = current.join(".beads");
        if candidate.is_dir() {
            return Ok(candidate);
        }
        if !current.pop() {
            break;
        }
    }

    Err(BeadworkError::NotInitialized)
}

/// Fallback workspace in the user's home directory (`~/.beads`).
///
/// Used when no project workspace exists and no `--db` override was given;
/// the database there is `default.db` with a sibling journal.
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn home_fallback_paths() -> Result<ConfigPaths> {
    let home =
        env::var("HOME").map_err(|_| BeadworkError::Config("HOME is not set".to_string()))?;
    let beads_dir = Path::new(&home).join(".beads");
    let db_path = beads_dir.join(FALLBACK_DB_FILENAME);
    let journal_path = db_path.with_extension("jsonl");
    Ok(ConfigPaths {
        beads_dir,
        db_path,
        journal_path,
        prefix: "bd".to_string(),
    })
}

/// Resolve the audit-trail actor.
///
/// Priority: `--actor` flag > `BD_ACTOR` > `USER` > `"unknown"`.
#[must_use]
pub fn resolve_actor(flag: Option<&str>) -> String {
    if let Some(actor) = flag {
        if !actor.is_empty() {
            return actor.to_string();
        }
    }
    for var in ["BD_ACTOR", "USER"] {
        if let Ok(value) = env::var(var) {
            if !value.is_empty() {
                return value;
            }
        }
    }
    "unknown".to_string()
}

/// Whether the `BD_DEBUG` diagnostic stderr channel is enabled.
#[must_use]
pub fn debug_enabled() -> bool {
    env::var("BD_DEBUG").is_ok_and(|v| !v.is_empty())
}

/// Emit a diagnostic line to stderr when `BD_DEBUG` is set.
pub fn debug_log(message: &str) {
    if debug_enabled() {
        eprintln!("Debug: {message}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn discover_walks_up() {
        let temp = TempDir::new().unwrap();
        let beads_dir = temp.path().join(".beads");
        std::fs::create_dir_all(&beads_dir).unwrap();
        let nested = temp.path().join("a/b/c");
        std::fs::create_dir_all(&nested).unwrap();

        let found = discover_beads_dir(Some(&nested)).unwrap();
        assert_eq!(found.canonicalize().unwrap(), beads_dir.canonicalize().unwrap());
    }

    #[test]
    fn discover_errors_when_absent() {
        let temp = TempDir::new().unwrap();
        let err = discover_beads_dir(Some(temp.path())).unwrap_err();
        assert!(matches!(err, BeadworkError::NotInitialized));
    }

    #[test]
    fn resolve_uses_defaults() {
        let temp = TempDir::new().unwrap();
        let beads_dir = temp.path().join(".beads");
        std::fs::create_dir_all(&beads_dir).unwrap();

        let paths = ConfigPaths::resolve(&beads_dir, None).unwrap();
        assert_eq!(paths.db_path, beads_dir.join("beads.db"));
        assert_eq!(paths.journal_path, beads_dir.join("issues.jsonl"));
        assert_eq!(paths.prefix, "bd");
    }

    #[test]
    fn resolve_honors_config_yaml() {
        let temp = TempDir::new().unwrap();
        let beads_dir = temp.path().join(".beads");
        std::fs::create_dir_all(&beads_dir).unwrap();
        std::fs::write(
            beads_dir.join("config.yaml"),
            "database: tracker.db\njsonl_export: tracker.jsonl\nprefix: trk\n",
        )
        .unwrap();

        let paths = ConfigPaths::resolve(&beads_dir, None).unwrap();
        assert_eq!(paths.db_path, beads_dir.join("tracker.db"));
        assert_eq!(paths.journal_path, beads_dir.join("tracker.jsonl"));
        assert_eq!(paths.prefix, "trk");
    }

    #[test]
    fn db_override_moves_journal_beside_it() {
        let temp = TempDir::new().unwrap();
        let beads_dir = temp.path().join(".beads");
        std::fs::create_dir_all(&beads_dir).unwrap();
        let override_db = temp.path().join("elsewhere/my.db");

        let paths = ConfigPaths::resolve(&beads_dir, Some(&override_db)).unwrap();
        assert_eq!(paths.db_path, override_db);
        assert_eq!(paths.journal_path, temp.path().join("elsewhere/my.jsonl"));
    }

    #[test]
    fn actor_falls_back_to_unknown() {
        // Flag wins when provided.
        assert_eq!(resolve_actor(Some("alice")), "alice");
    }
}
