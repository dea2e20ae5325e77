//! Sequence dependency indexer.
//!
//! Computes "in use by" relations between resources for referential-integrity
//! checks. Every relation is re-derived from scratch from the current
//! authoritative bodies: references sit deep inside tree-shaped step lists,
//! so diffing "what changed" is more bug-prone than a full recompute over
//! resource counts measured in hundreds. The recompute runs synchronously
//! inside the indexing pass of the triggering mutation — a stale index that
//! under-reports usage is a data-loss risk.

use crate::index::ResourceIndex;
use fieldlink_core::kind::ResourceKind;
use fieldlink_core::resource::{Executable, ResourceBody, ResourceId, Step};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use uuid::Uuid;

/// One tracked referenced-kind/referencing-kind pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum InUseRelation {
    SequenceByRegimen,
    SequenceBySequence,
    SequenceByPinBinding,
    SequenceByBootConfig,
    SequenceByFarmEvent,
    RegimenByFarmEvent,
}

impl InUseRelation {
    pub const ALL: [InUseRelation; 6] = [
        Self::SequenceByRegimen,
        Self::SequenceBySequence,
        Self::SequenceByPinBinding,
        Self::SequenceByBootConfig,
        Self::SequenceByFarmEvent,
        Self::RegimenByFarmEvent,
    ];

    /// The kind being depended on.
    pub fn referenced(&self) -> ResourceKind {
        match self {
            Self::SequenceByRegimen
            | Self::SequenceBySequence
            | Self::SequenceByPinBinding
            | Self::SequenceByBootConfig
            | Self::SequenceByFarmEvent => ResourceKind::Sequence,
            Self::RegimenByFarmEvent => ResourceKind::Regimen,
        }
    }

    /// The kind holding the reference.
    pub fn referencer(&self) -> ResourceKind {
        match self {
            Self::SequenceByRegimen => ResourceKind::Regimen,
            Self::SequenceBySequence => ResourceKind::Sequence,
            Self::SequenceByPinBinding => ResourceKind::PinBinding,
            Self::SequenceByBootConfig => ResourceKind::BootConfig,
            Self::SequenceByFarmEvent | Self::RegimenByFarmEvent => ResourceKind::FarmEvent,
        }
    }

    /// Index key, `<referenced>.<referencer>`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SequenceByRegimen => "Sequence.Regimen",
            Self::SequenceBySequence => "Sequence.Sequence",
            Self::SequenceByPinBinding => "Sequence.PinBinding",
            Self::SequenceByBootConfig => "Sequence.BootConfig",
            Self::SequenceByFarmEvent => "Sequence.FarmEvent",
            Self::RegimenByFarmEvent => "Regimen.FarmEvent",
        }
    }

    /// Relations invalidated by a mutation of `kind`, on either side.
    pub fn touching(kind: ResourceKind) -> impl Iterator<Item = InUseRelation> {
        Self::ALL
            .into_iter()
            .filter(move |r| r.referenced() == kind || r.referencer() == kind)
    }
}

impl std::fmt::Display for InUseRelation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sequence ids called from a step tree, however deeply nested.
pub fn called_sequence_ids(steps: &[Step]) -> BTreeSet<ResourceId> {
    let mut out = BTreeSet::new();
    for step in steps {
        collect_step(step, &mut out);
    }
    out
}

fn collect_step(step: &Step, out: &mut BTreeSet<ResourceId>) {
    match step {
        Step::Execute { sequence_id } => {
            out.insert(*sequence_id);
        }
        Step::If {
            on_true, on_false, ..
        } => {
            if let Some(step) = on_true {
                collect_step(step, out);
            }
            if let Some(step) = on_false {
                collect_step(step, out);
            }
        }
        Step::Wait { .. } | Step::WritePin { .. } | Step::EmitLog { .. } => {}
    }
}

/// Server ids of `relation.referenced()` resources mentioned by one
/// referencer body. Bodies of any other kind contribute nothing.
pub(crate) fn referenced_ids(relation: InUseRelation, body: &ResourceBody) -> BTreeSet<ResourceId> {
    match (relation, body) {
        (InUseRelation::SequenceByRegimen, ResourceBody::Regimen(b)) => {
            b.regimen_items.iter().map(|i| i.sequence_id).collect()
        }
        (InUseRelation::SequenceBySequence, ResourceBody::Sequence(b)) => {
            called_sequence_ids(&b.steps)
        }
        (InUseRelation::SequenceByPinBinding, ResourceBody::PinBinding(b)) => {
            b.sequence_id.into_iter().collect()
        }
        (InUseRelation::SequenceByBootConfig, ResourceBody::BootConfig(b)) => {
            b.boot_sequence_id.into_iter().collect()
        }
        (InUseRelation::SequenceByFarmEvent, ResourceBody::FarmEvent(b)) => match b.executable {
            Executable::Sequence(id) => BTreeSet::from([id]),
            Executable::Regimen(_) => BTreeSet::new(),
        },
        (InUseRelation::RegimenByFarmEvent, ResourceBody::FarmEvent(b)) => match b.executable {
            Executable::Regimen(id) => BTreeSet::from([id]),
            Executable::Sequence(_) => BTreeSet::new(),
        },
        _ => BTreeSet::new(),
    }
}

/// Rebuild one relation: referenced UUID → set of referencing UUIDs.
/// References to ids not currently indexed are dropped; they re-appear on the
/// next recompute once the target arrives.
pub(crate) fn recompute_relation(index: &mut ResourceIndex, relation: InUseRelation) {
    let mut rebuilt: HashMap<Uuid, HashSet<Uuid>> = HashMap::new();
    for referencer in index.get_all_of_kind(relation.referencer()) {
        for id in referenced_ids(relation, &referencer.body) {
            if let Some(target) = index.lookup_uuid(relation.referenced(), id) {
                rebuilt.entry(target).or_default().insert(referencer.uuid);
            }
        }
    }
    index.set_in_use(relation, rebuilt);
}
