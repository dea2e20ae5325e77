//! Derived per-sequence metadata consumed by downstream editors.

use crate::in_use::called_sequence_ids;
use crate::index::ResourceIndex;
use fieldlink_core::kind::ResourceKind;
use fieldlink_core::resource::{ResourceBody, ResourceId, SequenceBody};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

/// Variable and dependency metadata for one sequence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SequenceMeta {
    /// Labels of variables the sequence declares and callers may bind.
    pub declared_variables: BTreeSet<String>,
    /// Server ids of sequences called directly from the step tree.
    pub called_sequences: BTreeSet<ResourceId>,
}

impl SequenceMeta {
    pub fn derive(body: &SequenceBody) -> Self {
        Self {
            declared_variables: body.args.iter().map(|a| a.label.clone()).collect(),
            called_sequences: called_sequence_ids(&body.steps),
        }
    }
}

/// Recompute metadata for every indexed sequence.
pub(crate) fn recompute(index: &mut ResourceIndex) {
    let metas: HashMap<Uuid, SequenceMeta> = index
        .get_all_of_kind(ResourceKind::Sequence)
        .iter()
        .filter_map(|r| match &r.body {
            ResourceBody::Sequence(b) => Some((r.uuid, SequenceMeta::derive(b))),
            _ => None,
        })
        .collect();
    index.set_sequence_metas(metas);
}
