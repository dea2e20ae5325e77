//! Special-status transitions.
//!
//! All transitions re-index the mutated resource through the pipeline so the
//! derived tables can never disagree with a resource's current body.

use crate::index::ResourceIndex;
use crate::pipeline::UpsertStrategy;
use fieldlink_core::error::IndexError;
use fieldlink_core::resource::{Resource, ResourceBody, ResourceId, SpecialStatus};
use uuid::Uuid;

/// What a local edit did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    /// Proposed body matched the current body; no transition (a no-op edit
    /// must not mark the resource dirty).
    Unchanged,
    /// Body applied, resource marked dirty.
    MarkedDirty,
    /// Body applied while a save was in flight; the caller must stage the
    /// edit for re-application once the save resolves.
    AppliedWhileSaving,
}

/// Apply a local edit.
pub fn edit(
    index: &mut ResourceIndex,
    uuid: Uuid,
    body: ResourceBody,
) -> Result<EditOutcome, IndexError> {
    let current = index
        .get_by_uuid(&uuid)
        .ok_or(IndexError::ResourceNotFound { uuid })?;
    if current.kind() != body.kind() {
        return Err(IndexError::MixedKindBatch {
            expected: current.kind(),
            found: body.kind(),
        });
    }
    if current.body == body {
        return Ok(EditOutcome::Unchanged);
    }
    let mut updated = current.clone();
    let outcome = match current.special_status {
        SpecialStatus::Saving => EditOutcome::AppliedWhileSaving,
        SpecialStatus::Saved | SpecialStatus::Dirty => {
            updated.special_status = SpecialStatus::Dirty;
            EditOutcome::MarkedDirty
        }
    };
    updated.body = body;
    index.upsert(updated.kind(), vec![updated], UpsertStrategy::Ongoing)?;
    Ok(outcome)
}

/// Transition a dirty resource into `Saving` and return the snapshot to send.
/// Returns `None` when there is nothing to save.
pub fn begin_save(
    index: &mut ResourceIndex,
    uuid: Uuid,
) -> Result<Option<Resource>, IndexError> {
    let current = index
        .get_by_uuid(&uuid)
        .ok_or(IndexError::ResourceNotFound { uuid })?;
    if current.special_status != SpecialStatus::Dirty {
        return Ok(None);
    }
    let mut updated = current.clone();
    updated.special_status = SpecialStatus::Saving;
    index.upsert(updated.kind(), vec![updated.clone()], UpsertStrategy::Ongoing)?;
    Ok(Some(updated))
}

/// Save success: the server's response body becomes authoritative (the server
/// may normalize fields) and the server id sticks.
pub fn finish_save_ok(
    index: &mut ResourceIndex,
    uuid: Uuid,
    id: ResourceId,
    body: ResourceBody,
) -> Result<(), IndexError> {
    let current = index
        .get_by_uuid(&uuid)
        .ok_or(IndexError::ResourceNotFound { uuid })?;
    if current.kind() != body.kind() {
        return Err(IndexError::MixedKindBatch {
            expected: current.kind(),
            found: body.kind(),
        });
    }
    let mut updated = current.clone();
    updated.id = Some(id);
    updated.body = body;
    updated.special_status = SpecialStatus::Saved;
    index.upsert(updated.kind(), vec![updated], UpsertStrategy::Ongoing)
}

/// Save failure: roll back to `Dirty` so the edit is not lost and stays
/// retryable.
pub fn finish_save_err(index: &mut ResourceIndex, uuid: Uuid) -> Result<(), IndexError> {
    set_status(index, uuid, SpecialStatus::Dirty)
}

pub fn set_status(
    index: &mut ResourceIndex,
    uuid: Uuid,
    status: SpecialStatus,
) -> Result<(), IndexError> {
    let current = index
        .get_by_uuid(&uuid)
        .ok_or(IndexError::ResourceNotFound { uuid })?;
    if current.special_status == status {
        return Ok(());
    }
    let mut updated = current.clone();
    updated.special_status = status;
    index.upsert(updated.kind(), vec![updated], UpsertStrategy::Ongoing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldlink_core::kind::ResourceKind;
    use fieldlink_core::resource::{LogBody, SequenceBody};

    fn seeded(index: &mut ResourceIndex, name: &str) -> Uuid {
        let mut r = Resource::local(ResourceBody::Sequence(SequenceBody {
            name: name.to_string(),
            ..Default::default()
        }));
        r.special_status = SpecialStatus::Saved;
        r.id = Some(1);
        let uuid = r.uuid;
        index
            .upsert(ResourceKind::Sequence, vec![r], UpsertStrategy::Ongoing)
            .unwrap();
        uuid
    }

    fn body(name: &str) -> ResourceBody {
        ResourceBody::Sequence(SequenceBody {
            name: name.to_string(),
            ..Default::default()
        })
    }

    #[test]
    fn noop_edit_does_not_mark_dirty() {
        let mut index = ResourceIndex::new();
        let uuid = seeded(&mut index, "same");
        let outcome = edit(&mut index, uuid, body("same")).unwrap();
        assert_eq!(outcome, EditOutcome::Unchanged);
        assert_eq!(
            index.get_by_uuid(&uuid).unwrap().special_status,
            SpecialStatus::Saved
        );
    }

    #[test]
    fn real_edit_marks_dirty() {
        let mut index = ResourceIndex::new();
        let uuid = seeded(&mut index, "before");
        let outcome = edit(&mut index, uuid, body("after")).unwrap();
        assert_eq!(outcome, EditOutcome::MarkedDirty);
        let r = index.get_by_uuid(&uuid).unwrap();
        assert_eq!(r.special_status, SpecialStatus::Dirty);
        assert_eq!(r.body, body("after"));
    }

    #[test]
    fn edit_rejects_kind_change() {
        let mut index = ResourceIndex::new();
        let uuid = seeded(&mut index, "seq");
        let err = edit(&mut index, uuid, ResourceBody::Log(LogBody::default())).unwrap_err();
        assert!(matches!(err, IndexError::MixedKindBatch { .. }));
    }

    #[test]
    fn save_cycle_success() {
        let mut index = ResourceIndex::new();
        let uuid = seeded(&mut index, "before");
        edit(&mut index, uuid, body("after")).unwrap();

        let snapshot = begin_save(&mut index, uuid).unwrap().unwrap();
        assert_eq!(snapshot.special_status, SpecialStatus::Saving);
        assert_eq!(
            index.get_by_uuid(&uuid).unwrap().special_status,
            SpecialStatus::Saving
        );
        // nothing further to save while in flight
        assert!(begin_save(&mut index, uuid).unwrap().is_none());

        finish_save_ok(&mut index, uuid, 42, body("after (normalized)")).unwrap();
        let r = index.get_by_uuid(&uuid).unwrap();
        assert_eq!(r.special_status, SpecialStatus::Saved);
        assert_eq!(r.id, Some(42));
        assert_eq!(r.body, body("after (normalized)"));
    }

    #[test]
    fn save_failure_rolls_back_to_dirty() {
        let mut index = ResourceIndex::new();
        let uuid = seeded(&mut index, "before");
        edit(&mut index, uuid, body("after")).unwrap();
        begin_save(&mut index, uuid).unwrap().unwrap();

        finish_save_err(&mut index, uuid).unwrap();
        let r = index.get_by_uuid(&uuid).unwrap();
        assert_eq!(r.special_status, SpecialStatus::Dirty);
        assert_eq!(r.body, body("after"), "the edit is not lost");
    }

    #[test]
    fn edit_during_save_is_applied_and_flagged_for_staging() {
        let mut index = ResourceIndex::new();
        let uuid = seeded(&mut index, "v1");
        edit(&mut index, uuid, body("v2")).unwrap();
        begin_save(&mut index, uuid).unwrap().unwrap();

        let outcome = edit(&mut index, uuid, body("v3")).unwrap();
        assert_eq!(outcome, EditOutcome::AppliedWhileSaving);
        let r = index.get_by_uuid(&uuid).unwrap();
        assert_eq!(r.body, body("v3"), "the UI sees the newest body at once");
        assert_eq!(r.special_status, SpecialStatus::Saving);
    }
}
