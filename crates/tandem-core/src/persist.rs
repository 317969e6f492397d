//! Schema-versioned persistence for the client cache.
//!
//! The persisted state is a single JSON snapshot: confirmed entities, the
//! bounded notification list, and the session credential. The snapshot
//! carries an explicit [`SCHEMA_VERSION`]; a mismatch on load is a typed
//! error, never a silent reinterpretation — callers treat it as "start
//! empty and refetch". Optimistic state (temporary records, pending
//! patches, in-flight requests) is never persisted.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::model::{Comment, Credential, Project, Task, Team};
use crate::notify::Notification;

/// Version written into every snapshot. Bump on any shape change.
pub const SCHEMA_VERSION: u32 = 1;

/// Everything the client persists across reloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSnapshot {
    /// Snapshot format version; checked before anything else is read.
    pub schema_version: u32,
    /// Session credential for reconnecting the channel.
    pub credential: Credential,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub projects: Vec<Project>,
    #[serde(default)]
    pub teams: Vec<Team>,
    #[serde(default)]
    pub comments: Vec<Comment>,
    #[serde(default)]
    pub notifications: Vec<Notification>,
}

/// Why a cache snapshot could not be loaded.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The snapshot was written by a different schema version.
    #[error("cache schema version {found} does not match expected {expected}")]
    SchemaVersion {
        /// The version this build reads and writes.
        expected: u32,
        /// The version found in the file.
        found: u32,
    },

    /// The file is not a valid snapshot.
    #[error("malformed cache snapshot: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Serialize a snapshot to `path`, overwriting any previous one.
///
/// # Errors
///
/// I/O and serialization failures, with the path attached.
pub fn save(path: &Path, snapshot: &CacheSnapshot) -> Result<()> {
    let json = serde_json::to_string(snapshot).context("serialize cache snapshot")?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create cache directory {}", parent.display()))?;
    }
    fs::write(path, json).with_context(|| format!("write cache snapshot {}", path.display()))
}

/// Load and version-check a snapshot from `path`.
///
/// # Errors
///
/// I/O failures with the path attached; [`CacheError::SchemaVersion`] when
/// the snapshot was written by a different version;
/// [`CacheError::Malformed`] when the file is not a snapshot at all.
pub fn load(path: &Path) -> Result<CacheSnapshot> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("read cache snapshot {}", path.display()))?;

    // Check the version before deserializing the full shape, so an old
    // snapshot reports SchemaVersion rather than a field-level error.
    #[derive(Deserialize)]
    struct VersionProbe {
        #[serde(default)]
        schema_version: u32,
    }
    let probe: VersionProbe = serde_json::from_str(&content).map_err(CacheError::Malformed)?;
    if probe.schema_version != SCHEMA_VERSION {
        return Err(CacheError::SchemaVersion {
            expected: SCHEMA_VERSION,
            found: probe.schema_version,
        }
        .into());
    }

    let snapshot: CacheSnapshot = serde_json::from_str(&content).map_err(CacheError::Malformed)?;
    Ok(snapshot)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EntityId, Revision};

    fn snapshot() -> CacheSnapshot {
        let mut task = Task::draft("Persisted");
        task.id = EntityId::new("42");
        task.revision = Revision::from_micros(7);
        CacheSnapshot {
            schema_version: SCHEMA_VERSION,
            credential: Credential::new("token"),
            tasks: vec![task],
            projects: Vec::new(),
            teams: Vec::new(),
            comments: Vec::new(),
            notifications: Vec::new(),
        }
    }

    #[test]
    fn save_load_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("cache.json");

        save(&path, &snapshot()).expect("save");
        let loaded = load(&path).expect("load");
        assert_eq!(loaded.schema_version, SCHEMA_VERSION);
        assert_eq!(loaded.tasks.len(), 1);
        assert_eq!(loaded.tasks[0].id, EntityId::new("42"));
        assert_eq!(loaded.credential, Credential::new("token"));
    }

    #[test]
    fn version_mismatch_is_typed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("cache.json");

        let mut old = snapshot();
        old.schema_version = 0;
        let json = serde_json::to_string(&old).expect("serialize");
        fs::write(&path, json).expect("write");

        let err = load(&path).unwrap_err();
        let cache_err = err.downcast_ref::<CacheError>().expect("typed error");
        assert!(matches!(
            cache_err,
            CacheError::SchemaVersion {
                expected: SCHEMA_VERSION,
                found: 0
            }
        ));
    }

    #[test]
    fn garbage_is_malformed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("cache.json");
        fs::write(&path, "not json").expect("write");

        let err = load(&path).unwrap_err();
        assert!(err.downcast_ref::<CacheError>().is_some());
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = load(&dir.path().join("absent.json")).unwrap_err();
        assert!(err.downcast_ref::<CacheError>().is_none());
    }
}
