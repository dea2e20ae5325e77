//! Folder hierarchy builder.
//!
//! Rebuilds a tree view of one resource kind from a flat parent-pointer list
//! plus per-node UI metadata. The rebuild is whole-tree rather than
//! incremental: folder membership changes are infrequent relative to other
//! resource churn, and a full O(n) rebuild is simpler to prove correct than
//! tree surgery.

use fieldlink_core::constants::FOLDER_MAX_DEPTH;
use fieldlink_core::resource::FolderId;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// One folder as it appears in the flat resource list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatFolder {
    pub id: FolderId,
    /// `None` marks a root.
    pub parent_id: Option<FolderId>,
    pub name: String,
    pub color: Option<String>,
}

/// A resource that can be assigned to a folder.
#[derive(Debug, Clone, PartialEq)]
pub struct FolderMember {
    pub uuid: Uuid,
    pub name: String,
    pub folder_id: Option<FolderId>,
}

/// Per-folder UI state, merged into the rebuilt tree. Defaults to
/// closed/not-editing when absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderUiMeta {
    #[serde(default)]
    pub open: bool,
    #[serde(default)]
    pub editing: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FolderNode {
    pub id: FolderId,
    pub name: String,
    pub color: Option<String>,
    pub open: bool,
    pub editing: bool,
    /// Member UUIDs, sorted case-insensitively by member name.
    pub content: Vec<Uuid>,
    pub children: Vec<FolderNode>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FolderTree {
    pub folders: Vec<FolderNode>,
    /// Members never assigned to a folder, assigned to an unknown folder, or
    /// assigned to one deeper than the fixed hierarchy.
    pub no_folder: Vec<Uuid>,
}

fn name_key(name: &str) -> String {
    name.to_lowercase()
}

/// Build the folder tree from the flat lists. Pure: same inputs always
/// produce the same tree, inputs are not mutated.
///
/// The hierarchy is fixed at [`FOLDER_MAX_DEPTH`] levels (root, medial,
/// terminal); children are sorted case-insensitively by name at every level.
pub fn ingest(
    folders: &[FlatFolder],
    members: &[FolderMember],
    ui: &HashMap<FolderId, FolderUiMeta>,
) -> FolderTree {
    // Option<FolderId> is the uniform parent key: None groups the roots, so a
    // single index covers root and non-root nodes alike.
    let mut by_parent: HashMap<Option<FolderId>, Vec<&FlatFolder>> = HashMap::new();
    for folder in folders {
        by_parent.entry(folder.parent_id).or_default().push(folder);
    }
    for children in by_parent.values_mut() {
        children.sort_by(|a, b| {
            name_key(&a.name)
                .cmp(&name_key(&b.name))
                .then(a.id.cmp(&b.id))
        });
    }

    let mut members_by_folder: HashMap<FolderId, Vec<&FolderMember>> = HashMap::new();
    let mut sorted_members: Vec<&FolderMember> = members.iter().collect();
    sorted_members.sort_by(|a, b| {
        name_key(&a.name)
            .cmp(&name_key(&b.name))
            .then(a.uuid.cmp(&b.uuid))
    });
    for member in &sorted_members {
        if let Some(folder_id) = member.folder_id {
            members_by_folder.entry(folder_id).or_default().push(*member);
        }
    }

    let mut placed: HashSet<Uuid> = HashSet::new();
    let roots = by_parent.get(&None).map(Vec::as_slice).unwrap_or(&[]);
    let tree_folders = roots
        .iter()
        .map(|root| materialize(root, 1, &by_parent, &members_by_folder, ui, &mut placed))
        .collect();

    let no_folder = sorted_members
        .iter()
        .filter(|m| !placed.contains(&m.uuid))
        .map(|m| m.uuid)
        .collect();

    FolderTree {
        folders: tree_folders,
        no_folder,
    }
}

fn materialize(
    folder: &FlatFolder,
    depth: usize,
    by_parent: &HashMap<Option<FolderId>, Vec<&FlatFolder>>,
    members_by_folder: &HashMap<FolderId, Vec<&FolderMember>>,
    ui: &HashMap<FolderId, FolderUiMeta>,
    placed: &mut HashSet<Uuid>,
) -> FolderNode {
    let content: Vec<Uuid> = members_by_folder
        .get(&folder.id)
        .map(|members| members.iter().map(|m| m.uuid).collect())
        .unwrap_or_default();
    placed.extend(content.iter().copied());

    let children = if depth < FOLDER_MAX_DEPTH {
        by_parent
            .get(&Some(folder.id))
            .map(Vec::as_slice)
            .unwrap_or(&[])
            .iter()
            .map(|child| materialize(child, depth + 1, by_parent, members_by_folder, ui, placed))
            .collect()
    } else {
        Vec::new()
    };

    let meta = ui.get(&folder.id).copied().unwrap_or_default();
    FolderNode {
        id: folder.id,
        name: folder.name.clone(),
        color: folder.color.clone(),
        open: meta.open,
        editing: meta.editing,
        content,
        children,
    }
}

/// Flatten a built tree back to the flat parent-pointer list.
pub fn flatten(tree: &FolderTree) -> Vec<FlatFolder> {
    fn walk(node: &FolderNode, parent_id: Option<FolderId>, out: &mut Vec<FlatFolder>) {
        out.push(FlatFolder {
            id: node.id,
            parent_id,
            name: node.name.clone(),
            color: node.color.clone(),
        });
        for child in &node.children {
            walk(child, Some(node.id), out);
        }
    }
    let mut out = Vec::new();
    for root in &tree.folders {
        walk(root, None, &mut out);
    }
    out
}

/// Filter a built tree down to branches containing members whose name matches
/// the query substring, case-insensitively. Pure traversal; the result has
/// the same shape as the input.
pub fn search(tree: &FolderTree, member_names: &HashMap<Uuid, String>, query: &str) -> FolderTree {
    let needle = query.to_lowercase();
    let matches = |uuid: &Uuid| {
        member_names
            .get(uuid)
            .is_some_and(|name| name.to_lowercase().contains(&needle))
    };

    fn filter_node(node: &FolderNode, matches: &dyn Fn(&Uuid) -> bool) -> Option<FolderNode> {
        let content: Vec<Uuid> = node.content.iter().filter(|&u| matches(u)).copied().collect();
        let children: Vec<FolderNode> = node
            .children
            .iter()
            .filter_map(|c| filter_node(c, matches))
            .collect();
        if content.is_empty() && children.is_empty() {
            return None;
        }
        Some(FolderNode {
            content,
            children,
            ..node.clone()
        })
    }

    FolderTree {
        folders: tree
            .folders
            .iter()
            .filter_map(|n| filter_node(n, &matches))
            .collect(),
        no_folder: tree
            .no_folder
            .iter()
            .filter(|&u| matches(u))
            .copied()
            .collect(),
    }
}

/// The folder portion of the resource index: the canonical tree, the raw
/// per-folder UI metadata it was merged from, and the cached search filter.
#[derive(Debug, Clone, Default)]
pub struct FolderIndex {
    ui: HashMap<FolderId, FolderUiMeta>,
    query: Option<String>,
    tree: FolderTree,
    filtered: Option<FolderTree>,
}

impl FolderIndex {
    pub fn tree(&self) -> &FolderTree {
        &self.tree
    }

    /// The cached filtered tree; `None` when no search query is active.
    pub fn filtered(&self) -> Option<&FolderTree> {
        self.filtered.as_ref()
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn ui_meta(&self) -> &HashMap<FolderId, FolderUiMeta> {
        &self.ui
    }

    pub(crate) fn restore_ui(&mut self, ui: HashMap<FolderId, FolderUiMeta>) {
        self.ui = ui;
    }

    /// Returns true when the stored flag actually changed.
    pub(crate) fn set_open(&mut self, id: FolderId, open: bool) -> bool {
        let meta = self.ui.entry(id).or_default();
        let changed = meta.open != open;
        meta.open = open;
        changed
    }

    pub(crate) fn set_editing(&mut self, id: FolderId, editing: bool) -> bool {
        let meta = self.ui.entry(id).or_default();
        let changed = meta.editing != editing;
        meta.editing = editing;
        changed
    }

    /// Install a freshly-built tree; the filter cache is invalidated and
    /// recomputed against the new tree when a query is active.
    pub(crate) fn install(&mut self, tree: FolderTree, member_names: &HashMap<Uuid, String>) {
        self.tree = tree;
        self.filtered = self
            .query
            .as_deref()
            .map(|q| search(&self.tree, member_names, q));
    }

    pub(crate) fn apply_query(
        &mut self,
        query: Option<String>,
        member_names: &HashMap<Uuid, String>,
    ) {
        self.query = query.filter(|q| !q.is_empty());
        self.filtered = self
            .query
            .as_deref()
            .map(|q| search(&self.tree, member_names, q));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn folder(id: FolderId, parent_id: Option<FolderId>, name: &str) -> FlatFolder {
        FlatFolder {
            id,
            parent_id,
            name: name.to_string(),
            color: None,
        }
    }

    fn member(name: &str, folder_id: Option<FolderId>) -> FolderMember {
        FolderMember {
            uuid: Uuid::new_v4(),
            name: name.to_string(),
            folder_id,
        }
    }

    #[test]
    fn roots_sort_case_insensitively() {
        let folders = vec![
            folder(1, None, "beans"),
            folder(2, None, "Apples"),
            folder(3, None, "carrots"),
        ];
        let tree = ingest(&folders, &[], &HashMap::new());
        let names: Vec<_> = tree.folders.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["Apples", "beans", "carrots"]);
    }

    #[test]
    fn hierarchy_stops_at_three_levels() {
        let folders = vec![
            folder(1, None, "root"),
            folder(2, Some(1), "medial"),
            folder(3, Some(2), "terminal"),
            folder(4, Some(3), "too deep"),
        ];
        let tree = ingest(&folders, &[], &HashMap::new());
        let root = &tree.folders[0];
        let medial = &root.children[0];
        let terminal = &medial.children[0];
        assert_eq!(terminal.name, "terminal");
        assert!(terminal.children.is_empty(), "depth is capped at three");
    }

    #[test]
    fn unassigned_members_collect_into_no_folder_bucket() {
        let folders = vec![folder(1, None, "root")];
        let members = vec![
            member("in folder", Some(1)),
            member("loose", None),
            member("dangling", Some(99)),
        ];
        let tree = ingest(&folders, &members, &HashMap::new());
        assert_eq!(tree.folders[0].content, vec![members[0].uuid]);
        assert_eq!(tree.no_folder, vec![members[2].uuid, members[1].uuid]);
    }

    #[test]
    fn member_content_sorts_by_name() {
        let folders = vec![folder(1, None, "root")];
        let members = vec![
            member("zucchini", Some(1)),
            member("Artichoke", Some(1)),
            member("melon", Some(1)),
        ];
        let tree = ingest(&folders, &members, &HashMap::new());
        assert_eq!(
            tree.folders[0].content,
            vec![members[1].uuid, members[2].uuid, members[0].uuid]
        );
    }

    #[test]
    fn ui_meta_defaults_closed_and_merges_when_present() {
        let folders = vec![folder(1, None, "a"), folder(2, None, "b")];
        let mut ui = HashMap::new();
        ui.insert(
            1,
            FolderUiMeta {
                open: true,
                editing: true,
            },
        );
        let tree = ingest(&folders, &[], &ui);
        assert!(tree.folders[0].open);
        assert!(tree.folders[0].editing);
        assert!(!tree.folders[1].open);
        assert!(!tree.folders[1].editing);
    }

    #[test]
    fn ingest_is_pure() {
        let folders = vec![folder(1, None, "root"), folder(2, Some(1), "child")];
        let members = vec![member("m", Some(2))];
        let ui = HashMap::new();
        assert_eq!(
            ingest(&folders, &members, &ui),
            ingest(&folders, &members, &ui)
        );
    }

    #[test]
    fn flatten_ingest_roundtrip() {
        let folders = vec![
            folder(1, None, "root"),
            folder(2, Some(1), "medial"),
            folder(3, Some(2), "terminal"),
            folder(4, None, "other root"),
        ];
        let members = vec![member("a", Some(2)), member("b", None)];
        let ui = HashMap::new();
        let built = ingest(&folders, &members, &ui);
        let rebuilt = ingest(&flatten(&built), &members, &ui);
        assert_eq!(rebuilt, built);
    }

    #[test]
    fn search_keeps_matching_branches_only() {
        let folders = vec![
            folder(1, None, "root"),
            folder(2, Some(1), "medial"),
            folder(3, None, "empty root"),
        ];
        let carrot = member("Carrot plan", Some(2));
        let potato = member("potato plan", Some(1));
        let loose = member("loose carrot", None);
        let members = vec![carrot.clone(), potato.clone(), loose.clone()];
        let names: HashMap<Uuid, String> = members
            .iter()
            .map(|m| (m.uuid, m.name.clone()))
            .collect();

        let tree = ingest(&folders, &members, &HashMap::new());
        let filtered = search(&tree, &names, "carrot");

        assert_eq!(filtered.folders.len(), 1, "empty root is pruned");
        let root = &filtered.folders[0];
        assert!(root.content.is_empty(), "potato does not match");
        assert_eq!(root.children[0].content, vec![carrot.uuid]);
        assert_eq!(filtered.no_folder, vec![loose.uuid]);
    }

    #[test]
    fn filter_cache_follows_query_and_tree() {
        let folders = vec![folder(1, None, "root")];
        let m = member("carrot", Some(1));
        let names: HashMap<Uuid, String> = [(m.uuid, m.name.clone())].into();

        let mut fi = FolderIndex::default();
        fi.install(ingest(&folders, &[m.clone()], &HashMap::new()), &names);
        assert!(fi.filtered().is_none());

        fi.apply_query(Some("car".to_string()), &names);
        assert_eq!(fi.filtered().unwrap().folders[0].content, vec![m.uuid]);

        // rebuilding the canonical tree refreshes the cached filter
        fi.install(ingest(&folders, &[], &HashMap::new()), &names);
        assert!(fi.filtered().unwrap().folders.is_empty());

        fi.apply_query(None, &names);
        assert!(fi.filtered().is_none());
    }
}
