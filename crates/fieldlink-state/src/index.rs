//! The normalized resource store.
//!
//! The index is the single arena for resource objects: every other component
//! holds only UUIDs, never long-lived references, so any entry can be
//! replaced without invalidating holders. All mutation funnels through the
//! pipeline entry points in [`crate::pipeline`]; nothing else may touch the
//! derived tables.

use crate::folders::{self, FlatFolder, FolderIndex, FolderMember, FolderTree, FolderUiMeta};
use crate::in_use::InUseRelation;
use crate::sequence_meta::SequenceMeta;
use fieldlink_core::kind::ResourceKind;
use fieldlink_core::resource::{FolderId, Resource, ResourceBody, ResourceId};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct ResourceIndex {
    /// Every live UUID.
    pub(crate) all: HashSet<Uuid>,
    /// Kind → UUIDs of that kind.
    pub(crate) by_kind: HashMap<ResourceKind, HashSet<Uuid>>,
    /// `(kind, server id)` → UUID; the sentinel id 0 stands for "no id yet".
    pub(crate) by_kind_and_id: HashMap<(ResourceKind, ResourceId), Uuid>,
    /// UUID → the resource itself; single source of truth for field values.
    pub(crate) references: HashMap<Uuid, Resource>,
    /// Relation → referenced UUID → referencing UUIDs.
    pub(crate) in_use: HashMap<InUseRelation, HashMap<Uuid, HashSet<Uuid>>>,
    /// Sequence UUID → derived variable/dependency metadata.
    pub(crate) sequence_metas: HashMap<Uuid, SequenceMeta>,
    /// Folder tree, raw per-folder UI metadata, and the search filter cache.
    pub(crate) folders: FolderIndex,
}

impl ResourceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Read API. Synchronous; callers receive borrows into the arena and
    // must not hold them across the next mutation.
    // ------------------------------------------------------------------

    pub fn get_by_uuid(&self, uuid: &Uuid) -> Option<&Resource> {
        self.references.get(uuid)
    }

    /// All resources of one kind, ordered by server id then UUID so output
    /// is stable across runs.
    pub fn get_all_of_kind(&self, kind: ResourceKind) -> Vec<&Resource> {
        let mut out: Vec<&Resource> = self
            .by_kind
            .get(&kind)
            .into_iter()
            .flatten()
            .filter_map(|uuid| self.references.get(uuid))
            .collect();
        out.sort_by_key(|r| (r.server_id_or_sentinel(), r.uuid));
        out
    }

    pub fn get_by_kind_and_id(&self, kind: ResourceKind, id: ResourceId) -> Option<&Resource> {
        self.lookup_uuid(kind, id)
            .and_then(|uuid| self.references.get(&uuid))
    }

    pub fn lookup_uuid(&self, kind: ResourceKind, id: ResourceId) -> Option<Uuid> {
        self.by_kind_and_id.get(&(kind, id)).copied()
    }

    /// Referencing UUIDs for one referenced resource, or `None` when nothing
    /// depends on it.
    pub fn get_in_use(&self, relation: InUseRelation, uuid: &Uuid) -> Option<&HashSet<Uuid>> {
        self.in_use.get(&relation).and_then(|m| m.get(uuid))
    }

    pub fn in_use_count(&self, relation: InUseRelation, uuid: &Uuid) -> usize {
        self.get_in_use(relation, uuid).map_or(0, HashSet::len)
    }

    pub fn get_sequence_meta(&self, uuid: &Uuid) -> Option<&SequenceMeta> {
        self.sequence_metas.get(uuid)
    }

    pub fn get_folder_tree(&self) -> &FolderTree {
        self.folders.tree()
    }

    /// The cached search-filtered tree, when a query is active.
    pub fn get_filtered_folder_tree(&self) -> Option<&FolderTree> {
        self.folders.filtered()
    }

    pub fn folder_search_query(&self) -> Option<&str> {
        self.folders.query()
    }

    pub fn folder_ui_meta(&self) -> &HashMap<FolderId, FolderUiMeta> {
        self.folders.ui_meta()
    }

    pub fn contains(&self, uuid: &Uuid) -> bool {
        self.all.contains(uuid)
    }

    pub fn len(&self) -> usize {
        self.all.len()
    }

    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }

    pub fn uuids_of_kind(&self, kind: ResourceKind) -> Vec<Uuid> {
        self.by_kind
            .get(&kind)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn all_resources(&self) -> impl Iterator<Item = &Resource> {
        self.references.values()
    }

    // ------------------------------------------------------------------
    // Folder UI operations. UI metadata is merged into the rebuilt tree,
    // never patched into it in place.
    // ------------------------------------------------------------------

    pub fn set_folder_open(&mut self, id: FolderId, open: bool) {
        if self.folders.set_open(id, open) {
            self.rebuild_folders(None);
        }
    }

    pub fn set_folder_editing(&mut self, id: FolderId, editing: bool) {
        if self.folders.set_editing(id, editing) {
            self.rebuild_folders(None);
        }
    }

    /// Set or clear the member-name search filter. Empty queries clear it.
    pub fn set_folder_search_query(&mut self, query: Option<String>) {
        let names = self.member_names();
        self.folders.apply_query(query, &names);
    }

    // ------------------------------------------------------------------
    // Internal mutators, reachable only from the indexer pipeline and the
    // aggregate recompute hooks.
    // ------------------------------------------------------------------

    pub(crate) fn set_in_use(
        &mut self,
        relation: InUseRelation,
        rebuilt: HashMap<Uuid, HashSet<Uuid>>,
    ) {
        if rebuilt.is_empty() {
            self.in_use.remove(&relation);
        } else {
            self.in_use.insert(relation, rebuilt);
        }
    }

    pub(crate) fn set_sequence_metas(&mut self, metas: HashMap<Uuid, SequenceMeta>) {
        self.sequence_metas = metas;
    }

    pub(crate) fn restore_folder_ui(&mut self, ui: HashMap<FolderId, FolderUiMeta>) {
        self.folders.restore_ui(ui);
    }

    /// Rebuild the folder tree from the flat resource list. `exclude` names a
    /// resource that is on its way out of the index but still present in the
    /// reference table while removal hooks run in reverse order.
    pub(crate) fn rebuild_folders(&mut self, exclude: Option<Uuid>) {
        let mut flat: Vec<FlatFolder> = Vec::new();
        let mut members: Vec<FolderMember> = Vec::new();
        for resource in self.references.values() {
            if Some(resource.uuid) == exclude {
                continue;
            }
            match &resource.body {
                ResourceBody::Folder(b) => flat.push(FlatFolder {
                    id: resource.server_id_or_sentinel(),
                    parent_id: b.parent_id,
                    name: b.name.clone(),
                    color: b.color.clone(),
                }),
                ResourceBody::Sequence(b) => members.push(FolderMember {
                    uuid: resource.uuid,
                    name: b.name.clone(),
                    folder_id: b.folder_id,
                }),
                _ => {}
            }
        }
        let names: HashMap<Uuid, String> = members
            .iter()
            .map(|m| (m.uuid, m.name.clone()))
            .collect();
        let tree = folders::ingest(&flat, &members, self.folders.ui_meta());
        self.folders.install(tree, &names);
    }

    fn member_names(&self) -> HashMap<Uuid, String> {
        self.references
            .values()
            .filter_map(|r| match &r.body {
                ResourceBody::Sequence(b) => Some((r.uuid, b.name.clone())),
                _ => None,
            })
            .collect()
    }

    /// Diagnostic: referential-consistency breaches between the canonical
    /// table and every derived index. Empty on a healthy index.
    pub fn consistency_violations(&self) -> Vec<String> {
        let mut problems = Vec::new();
        for uuid in &self.all {
            if !self.references.contains_key(uuid) {
                problems.push(format!("{uuid} in all but not in references"));
            }
        }
        for (uuid, resource) in &self.references {
            if !self.all.contains(uuid) {
                problems.push(format!("{uuid} in references but not in all"));
            }
            if resource.uuid != *uuid {
                problems.push(format!("{uuid} keyed under a foreign uuid"));
            }
        }
        for (kind, uuids) in &self.by_kind {
            for uuid in uuids {
                match self.references.get(uuid) {
                    None => problems.push(format!("{uuid} in by_kind[{kind}] but unreferenced")),
                    Some(r) if r.kind() != *kind => {
                        problems.push(format!("{uuid} filed under {kind} but is {}", r.kind()));
                    }
                    Some(_) => {}
                }
            }
        }
        for ((kind, id), uuid) in &self.by_kind_and_id {
            match self.references.get(uuid) {
                None => problems.push(format!("{kind}.{id} maps to unreferenced {uuid}")),
                Some(r) if r.kind() != *kind => {
                    problems.push(format!("{kind}.{id} maps to a {} resource", r.kind()));
                }
                Some(_) => {}
            }
        }
        for (relation, map) in &self.in_use {
            for (referenced, referencers) in map {
                if !self.references.contains_key(referenced) {
                    problems.push(format!("{relation} keys unreferenced {referenced}"));
                }
                for referencer in referencers {
                    if !self.references.contains_key(referencer) {
                        problems.push(format!("{relation} lists unreferenced {referencer}"));
                    }
                }
            }
        }
        for uuid in self.sequence_metas.keys() {
            if !self.references.contains_key(uuid) {
                problems.push(format!("sequence meta for unreferenced {uuid}"));
            }
        }
        problems
    }
}
