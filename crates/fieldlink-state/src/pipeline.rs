//! The ordered indexer pipeline.
//!
//! Every insertion and removal runs the full list of per-concern hooks; a
//! per-kind "before" hook may run once per batch and an "after" hook once per
//! batch to recompute kind-specific aggregates. Hooks are idempotent and
//! independent of each other; the only ordering contract is that removal runs
//! the list in reverse, tearing composite indexes down before primitive ones.
//! The order is a property of the table construction below, not of any
//! runtime mutation, and is pinned by a test.

use crate::in_use::{self, InUseRelation};
use crate::index::ResourceIndex;
use crate::sequence_meta;
use fieldlink_core::error::IndexError;
use fieldlink_core::kind::ResourceKind;
use fieldlink_core::resource::Resource;
use std::collections::HashSet;
use tracing::debug;
use uuid::Uuid;

/// How a batch merges into the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertStrategy {
    /// A kind's full canonical collection arrived: evict previously-indexed
    /// resources of the kind that are absent from the batch, so the replica
    /// cannot retain entries the server no longer has.
    Initial,
    /// Merge into whatever is already indexed.
    Ongoing,
}

/// One derived index maintained in lockstep with the canonical table.
pub(crate) struct IndexHook {
    pub name: &'static str,
    pub up: fn(&mut ResourceIndex, &Resource),
    pub down: fn(&mut ResourceIndex, &Resource),
}

pub(crate) const PIPELINE: [IndexHook; 5] = [
    IndexHook {
        name: "references",
        up: reference_up,
        down: reference_down,
    },
    IndexHook {
        name: "all",
        up: all_up,
        down: all_down,
    },
    IndexHook {
        name: "by_kind",
        up: by_kind_up,
        down: by_kind_down,
    },
    IndexHook {
        name: "by_kind_and_id",
        up: by_kind_and_id_up,
        down: by_kind_and_id_down,
    },
    IndexHook {
        name: "folders",
        up: folder_up,
        down: folder_down,
    },
];

/// Hook names in insertion order.
pub fn hook_order() -> Vec<&'static str> {
    PIPELINE.iter().map(|h| h.name).collect()
}

fn reference_up(index: &mut ResourceIndex, resource: &Resource) {
    index.references.insert(resource.uuid, resource.clone());
}

fn reference_down(index: &mut ResourceIndex, resource: &Resource) {
    index.references.remove(&resource.uuid);
}

fn all_up(index: &mut ResourceIndex, resource: &Resource) {
    index.all.insert(resource.uuid);
}

fn all_down(index: &mut ResourceIndex, resource: &Resource) {
    index.all.remove(&resource.uuid);
}

fn by_kind_up(index: &mut ResourceIndex, resource: &Resource) {
    index
        .by_kind
        .entry(resource.kind())
        .or_default()
        .insert(resource.uuid);
}

fn by_kind_down(index: &mut ResourceIndex, resource: &Resource) {
    if let Some(set) = index.by_kind.get_mut(&resource.kind()) {
        set.remove(&resource.uuid);
        if set.is_empty() {
            index.by_kind.remove(&resource.kind());
        }
    }
}

fn by_kind_and_id_up(index: &mut ResourceIndex, resource: &Resource) {
    index
        .by_kind_and_id
        .insert((resource.kind(), resource.server_id_or_sentinel()), resource.uuid);
}

fn by_kind_and_id_down(index: &mut ResourceIndex, resource: &Resource) {
    // every unsaved resource of a kind shares the 0-sentinel key; only clear
    // the slot while it still points at the departing resource
    let key = (resource.kind(), resource.server_id_or_sentinel());
    if index.by_kind_and_id.get(&key) == Some(&resource.uuid) {
        index.by_kind_and_id.remove(&key);
    }
}

fn folder_up(index: &mut ResourceIndex, resource: &Resource) {
    let kind = resource.kind();
    if kind == ResourceKind::Folder || kind.folder_member() {
        index.rebuild_folders(None);
    }
}

fn folder_down(index: &mut ResourceIndex, resource: &Resource) {
    let kind = resource.kind();
    if kind == ResourceKind::Folder || kind.folder_member() {
        index.rebuild_folders(Some(resource.uuid));
    }
}

type BeforeHook = fn(&mut ResourceIndex, UpsertStrategy);
type AfterHook = fn(&mut ResourceIndex);

/// Per-kind batch prologue. Dispatch is an exhaustive mapping over the closed
/// kind enumeration.
fn before_hook(kind: ResourceKind) -> Option<BeforeHook> {
    match kind {
        // logs replace wholesale rather than merge
        ResourceKind::Log => Some(clear_logs_on_initial),
        ResourceKind::Device
        | ResourceKind::Sequence
        | ResourceKind::Regimen
        | ResourceKind::FarmEvent
        | ResourceKind::PinBinding
        | ResourceKind::BootConfig
        | ResourceKind::Folder
        | ResourceKind::Point
        | ResourceKind::EnvVar => None,
    }
}

/// Per-kind batch epilogue: recompute the aggregate indexes a mutation of
/// this kind can invalidate, from scratch, inside the same indexing pass.
fn after_hook(kind: ResourceKind) -> Option<AfterHook> {
    match kind {
        ResourceKind::Sequence => Some(after_sequences),
        ResourceKind::Regimen => Some(after_regimens),
        ResourceKind::FarmEvent => Some(after_farm_events),
        ResourceKind::PinBinding => Some(after_pin_bindings),
        ResourceKind::BootConfig => Some(after_boot_configs),
        ResourceKind::Device
        | ResourceKind::Folder
        | ResourceKind::Log
        | ResourceKind::Point
        | ResourceKind::EnvVar => None,
    }
}

fn clear_logs_on_initial(index: &mut ResourceIndex, strategy: UpsertStrategy) {
    if strategy != UpsertStrategy::Initial {
        return;
    }
    for uuid in index.uuids_of_kind(ResourceKind::Log) {
        if let Ok(removed) = index.tear_down(uuid) {
            debug!(uuid = %removed.uuid, "cleared log before initial load");
        }
    }
}

fn recompute_touching(index: &mut ResourceIndex, kind: ResourceKind) {
    for relation in InUseRelation::touching(kind) {
        in_use::recompute_relation(index, relation);
    }
}

fn after_sequences(index: &mut ResourceIndex) {
    recompute_touching(index, ResourceKind::Sequence);
    sequence_meta::recompute(index);
}

fn after_regimens(index: &mut ResourceIndex) {
    recompute_touching(index, ResourceKind::Regimen);
}

fn after_farm_events(index: &mut ResourceIndex) {
    recompute_touching(index, ResourceKind::FarmEvent);
}

fn after_pin_bindings(index: &mut ResourceIndex) {
    recompute_touching(index, ResourceKind::PinBinding);
}

fn after_boot_configs(index: &mut ResourceIndex) {
    recompute_touching(index, ResourceKind::BootConfig);
}

impl ResourceIndex {
    /// Insert or replace a single-kind batch.
    ///
    /// Batches must be homogeneous: the per-kind before/after hooks assume
    /// it, so a stray resource of another kind is an invariant violation.
    pub fn upsert(
        &mut self,
        kind: ResourceKind,
        batch: Vec<Resource>,
        strategy: UpsertStrategy,
    ) -> Result<(), IndexError> {
        for resource in &batch {
            if resource.kind() != kind {
                return Err(IndexError::MixedKindBatch {
                    expected: kind,
                    found: resource.kind(),
                });
            }
        }

        if strategy == UpsertStrategy::Initial {
            let incoming: HashSet<Uuid> = batch.iter().map(|r| r.uuid).collect();
            for uuid in self.uuids_of_kind(kind) {
                if !incoming.contains(&uuid) {
                    self.tear_down(uuid)?;
                }
            }
        }

        if let Some(hook) = before_hook(kind) {
            hook(self, strategy);
        }
        for resource in batch {
            self.insert_one(resource)?;
        }
        if let Some(hook) = after_hook(kind) {
            hook(self);
        }
        Ok(())
    }

    /// Remove one resource; returns it for callers that need the final state
    /// (destroy rollback, logging).
    pub fn remove(&mut self, uuid: Uuid) -> Result<Resource, IndexError> {
        let removed = self.tear_down(uuid)?;
        if let Some(hook) = after_hook(removed.kind()) {
            hook(self);
        }
        Ok(removed)
    }

    /// Run the removal hooks (reverse order) without the batch epilogue.
    pub(crate) fn tear_down(&mut self, uuid: Uuid) -> Result<Resource, IndexError> {
        let resource = self
            .references
            .get(&uuid)
            .cloned()
            .ok_or(IndexError::ResourceNotFound { uuid })?;
        for hook in PIPELINE.iter().rev() {
            (hook.down)(self, &resource);
        }
        Ok(resource)
    }

    fn insert_one(&mut self, resource: Resource) -> Result<(), IndexError> {
        if let Some(id) = resource.id {
            if let Some(&existing) = self.by_kind_and_id.get(&(resource.kind(), id)) {
                if existing != resource.uuid {
                    return Err(IndexError::DuplicateServerId {
                        kind: resource.kind(),
                        id,
                        existing,
                        incoming: resource.uuid,
                    });
                }
            }
        }
        if let Some(old) = self.references.get(&resource.uuid).cloned() {
            // replace: tear the old entry down first so stale derived keys
            // (a previous sentinel id, a previous folder assignment) cannot
            // survive the swap
            for hook in PIPELINE.iter().rev() {
                (hook.down)(self, &old);
            }
        }
        for hook in PIPELINE.iter() {
            (hook.up)(self, &resource);
        }
        Ok(())
    }
}
