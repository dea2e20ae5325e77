//! Best-effort index snapshot.
//!
//! A restart convenience, not durable storage: the server remains the source
//! of truth, and a missing or corrupt snapshot simply means starting empty.

use crate::index::ResourceIndex;
use crate::folders::FolderUiMeta;
use crate::pipeline::UpsertStrategy;
use fieldlink_core::constants::SNAPSHOT_VERSION;
use fieldlink_core::error::{IndexError, SnapshotError};
use fieldlink_core::kind::ResourceKind;
use fieldlink_core::resource::{FolderId, Resource, SpecialStatus};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub resources: Vec<Resource>,
    pub folder_ui: HashMap<FolderId, FolderUiMeta>,
}

/// Capture the current index contents. Resources are ordered by kind, server
/// id, then UUID so successive snapshots of the same state are byte-stable.
pub fn capture(index: &ResourceIndex) -> Snapshot {
    let mut resources: Vec<Resource> = index.all_resources().cloned().collect();
    resources.sort_by_key(|r| (r.kind(), r.server_id_or_sentinel(), r.uuid));
    Snapshot {
        version: SNAPSHOT_VERSION,
        resources,
        folder_ui: index.folder_ui_meta().clone(),
    }
}

/// Write the snapshot atomically: serialize into a temp file in the target
/// directory, then rename over the destination.
pub fn write(index: &ResourceIndex, path: &Path) -> Result<(), SnapshotError> {
    let snapshot = capture(index);
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    serde_json::to_writer(&mut tmp, &snapshot).map_err(|e| SnapshotError::Encode(e.to_string()))?;
    tmp.persist(path).map_err(|e| SnapshotError::Io(e.error))?;
    info!(
        path = %path.display(),
        resources = snapshot.resources.len(),
        "snapshot written"
    );
    Ok(())
}

pub fn read(path: &Path) -> Result<Snapshot, SnapshotError> {
    let raw = std::fs::read(path)?;
    let snapshot: Snapshot = serde_json::from_slice(&raw).map_err(SnapshotError::decode)?;
    if snapshot.version != SNAPSHOT_VERSION {
        return Err(SnapshotError::VersionMismatch {
            found: snapshot.version,
            expected: SNAPSHOT_VERSION,
        });
    }
    Ok(snapshot)
}

/// Replay a snapshot into the index as per-kind initial loads.
pub fn restore(index: &mut ResourceIndex, snapshot: Snapshot) -> Result<(), IndexError> {
    let mut by_kind: BTreeMap<ResourceKind, Vec<Resource>> = BTreeMap::new();
    for mut resource in snapshot.resources {
        // an in-flight save died with the process that issued it; the edit it
        // carried is still unconfirmed
        if resource.special_status == SpecialStatus::Saving {
            resource.special_status = SpecialStatus::Dirty;
        }
        by_kind.entry(resource.kind()).or_default().push(resource);
    }
    index.restore_folder_ui(snapshot.folder_ui);
    for (kind, batch) in by_kind {
        index.upsert(kind, batch, UpsertStrategy::Initial)?;
    }
    Ok(())
}
