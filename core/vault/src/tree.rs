//! Hierarchical manifest of a vault's files and directories.
//!
//! The tree is owned top-down: directories hold their children by value and
//! nothing points back up, so cycles cannot be built. Parents are found by
//! searching from the root. The whole tree is serialized to JSON with a
//! `nodeType` discriminator and stored as one encrypted blob.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::blob::EncryptedBlobRef;
use lifechest_common::{Error, Result};
use lifechest_crypto::generate_id;

/// Mime type reported for directories.
pub const DIRECTORY_TYPE: &str = "directory";

/// A file backed by a content blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileNode {
    /// Content blob. Its id is the node id.
    pub attached_file: EncryptedBlobRef,
    /// Optional low-resolution preview, stored as its own blob.
    #[serde(default)]
    pub attached_thumbnail: Option<EncryptedBlobRef>,
    pub name: String,
    /// Mime type of the content.
    #[serde(rename = "type")]
    pub mime_type: String,
    pub creation_date: DateTime<Utc>,
    pub import_date: DateTime<Utc>,
    /// Plaintext size in bytes.
    pub size: u64,
}

impl FileNode {
    pub fn id(&self) -> &str {
        &self.attached_file.id
    }
}

/// A directory with ordered children.
///
/// Children stay in insertion order; sorting happens at display time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryNode {
    pub children: Vec<TreeNode>,
    pub name: String,
    pub id: String,
    pub creation_date: DateTime<Utc>,
    pub import_date: DateTime<Utc>,
}

impl DirectoryNode {
    /// Create an empty directory with a fresh id.
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            children: Vec::new(),
            name: name.into(),
            id: generate_id(),
            creation_date: now,
            import_date: now,
        }
    }

    /// Find the directory directly containing `id` in this subtree.
    pub fn resolve_parent(&self, id: &str) -> Option<&DirectoryNode> {
        if self.children.iter().any(|child| child.id() == id) {
            return Some(self);
        }
        self.children.iter().find_map(|child| match child {
            TreeNode::Directory(dir) => dir.resolve_parent(id),
            TreeNode::File(_) => None,
        })
    }

    /// Mutable variant of [`DirectoryNode::resolve_parent`].
    pub fn resolve_parent_mut(&mut self, id: &str) -> Option<&mut DirectoryNode> {
        if self.children.iter().any(|child| child.id() == id) {
            return Some(self);
        }
        self.children.iter_mut().find_map(|child| match child {
            TreeNode::Directory(dir) => dir.resolve_parent_mut(id),
            TreeNode::File(_) => None,
        })
    }

    /// Every file below this directory, depth first.
    pub fn list_files(&self) -> Vec<&FileNode> {
        let mut files = Vec::new();
        for child in &self.children {
            match child {
                TreeNode::File(file) => files.push(file),
                TreeNode::Directory(dir) => files.extend(dir.list_files()),
            }
        }
        files
    }

    /// Recursive sum of file sizes.
    pub fn size(&self) -> u64 {
        self.children.iter().map(TreeNode::size).sum()
    }

    /// Number of files below this directory.
    pub fn count(&self) -> usize {
        self.children.iter().map(TreeNode::count).sum()
    }
}

/// A node of the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "nodeType", rename_all = "lowercase")]
pub enum TreeNode {
    File(FileNode),
    Directory(DirectoryNode),
}

impl TreeNode {
    pub fn id(&self) -> &str {
        match self {
            TreeNode::File(file) => file.id(),
            TreeNode::Directory(dir) => &dir.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            TreeNode::File(file) => &file.name,
            TreeNode::Directory(dir) => &dir.name,
        }
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        match self {
            TreeNode::File(file) => file.name = name.into(),
            TreeNode::Directory(dir) => dir.name = name.into(),
        }
    }

    /// Mime type, or `"directory"`.
    pub fn mime_type(&self) -> &str {
        match self {
            TreeNode::File(file) => &file.mime_type,
            TreeNode::Directory(_) => DIRECTORY_TYPE,
        }
    }

    /// Logical size; recursive for directories, computed on every call.
    pub fn size(&self) -> u64 {
        match self {
            TreeNode::File(file) => file.size,
            TreeNode::Directory(dir) => dir.size(),
        }
    }

    /// Number of files this node stands for.
    pub fn count(&self) -> usize {
        match self {
            TreeNode::File(_) => 1,
            TreeNode::Directory(dir) => dir.count(),
        }
    }

    pub fn creation_date(&self) -> DateTime<Utc> {
        match self {
            TreeNode::File(file) => file.creation_date,
            TreeNode::Directory(dir) => dir.creation_date,
        }
    }

    pub fn import_date(&self) -> DateTime<Utc> {
        match self {
            TreeNode::File(file) => file.import_date,
            TreeNode::Directory(dir) => dir.import_date,
        }
    }

    pub fn is_directory(&self) -> bool {
        matches!(self, TreeNode::Directory(_))
    }

    pub fn as_file(&self) -> Option<&FileNode> {
        match self {
            TreeNode::File(file) => Some(file),
            TreeNode::Directory(_) => None,
        }
    }

    pub fn as_directory(&self) -> Option<&DirectoryNode> {
        match self {
            TreeNode::Directory(dir) => Some(dir),
            TreeNode::File(_) => None,
        }
    }

    pub fn as_directory_mut(&mut self) -> Option<&mut DirectoryNode> {
        match self {
            TreeNode::Directory(dir) => Some(dir),
            TreeNode::File(_) => None,
        }
    }

    /// Depth-first search of this subtree, including the node itself.
    pub fn resolve(&self, id: &str) -> Option<&TreeNode> {
        if self.id() == id {
            return Some(self);
        }
        match self {
            TreeNode::Directory(dir) => dir.children.iter().find_map(|child| child.resolve(id)),
            TreeNode::File(_) => None,
        }
    }

    /// Mutable variant of [`TreeNode::resolve`].
    pub fn resolve_mut(&mut self, id: &str) -> Option<&mut TreeNode> {
        if self.id() == id {
            return Some(self);
        }
        match self {
            TreeNode::Directory(dir) => dir
                .children
                .iter_mut()
                .find_map(|child| child.resolve_mut(id)),
            TreeNode::File(_) => None,
        }
    }

    /// Every file in this subtree.
    pub fn list_files(&self) -> Vec<&FileNode> {
        match self {
            TreeNode::File(file) => vec![file],
            TreeNode::Directory(dir) => dir.list_files(),
        }
    }

    /// Every blob owned by this subtree, thumbnails included.
    pub fn blobs(&self) -> Vec<&EncryptedBlobRef> {
        self.list_files()
            .into_iter()
            .flat_map(|file| std::iter::once(&file.attached_file).chain(&file.attached_thumbnail))
            .collect()
    }

    /// Ids of this node and all its descendants.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids = vec![self.id()];
        if let TreeNode::Directory(dir) = self {
            for child in &dir.children {
                ids.extend(child.ids());
            }
        }
        ids
    }
}

/// The in-memory manifest of one vault.
///
/// Mutations only touch memory; the session persists the tree afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTree {
    /// Always a directory.
    root: TreeNode,
}

impl FileTree {
    /// Create a tree rooted at `root`.
    pub fn new(root: DirectoryNode) -> Self {
        Self {
            root: TreeNode::Directory(root),
        }
    }

    pub fn root(&self) -> &TreeNode {
        &self.root
    }

    pub fn root_id(&self) -> &str {
        self.root.id()
    }

    /// Find any node, the root included.
    pub fn resolve(&self, id: &str) -> Option<&TreeNode> {
        self.root.resolve(id)
    }

    pub fn resolve_mut(&mut self, id: &str) -> Option<&mut TreeNode> {
        self.root.resolve_mut(id)
    }

    /// Directory directly containing `id`. None for the root itself.
    pub fn resolve_parent(&self, id: &str) -> Option<&DirectoryNode> {
        self.root.as_directory()?.resolve_parent(id)
    }

    pub fn resolve_parent_mut(&mut self, id: &str) -> Option<&mut DirectoryNode> {
        self.root.as_directory_mut()?.resolve_parent_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.resolve(id).is_some()
    }

    /// Look up a node or fail with `NotFound`.
    pub fn node(&self, id: &str) -> Result<&TreeNode> {
        self.resolve(id)
            .ok_or_else(|| Error::NotFound(format!("Node not found: {}", id)))
    }

    /// Look up a file.
    ///
    /// # Errors
    /// - `NotFound` if absent, `InvalidInput` if it is a directory
    pub fn file(&self, id: &str) -> Result<&FileNode> {
        self.node(id)?
            .as_file()
            .ok_or_else(|| Error::InvalidInput(format!("Not a file: {}", id)))
    }

    /// Look up a directory.
    ///
    /// # Errors
    /// - `NotFound` if absent, `InvalidInput` if it is a file
    pub fn directory(&self, id: &str) -> Result<&DirectoryNode> {
        self.node(id)?
            .as_directory()
            .ok_or_else(|| Error::InvalidInput(format!("Not a directory: {}", id)))
    }

    fn directory_mut(&mut self, id: &str) -> Result<&mut DirectoryNode> {
        self.resolve_mut(id)
            .ok_or_else(|| Error::NotFound(format!("Node not found: {}", id)))?
            .as_directory_mut()
            .ok_or_else(|| Error::InvalidInput(format!("Not a directory: {}", id)))
    }

    /// Append `node` to the children of `parent_id`.
    ///
    /// # Errors
    /// - Parent not found or not a directory
    /// - Any id in `node`'s subtree already present in the tree
    pub fn add(&mut self, parent_id: &str, node: TreeNode) -> Result<()> {
        let existing: HashSet<&str> = self.root.ids().into_iter().collect();
        if let Some(duplicate) = node.ids().into_iter().find(|id| existing.contains(id)) {
            return Err(Error::AlreadyExists(format!(
                "Node id already in tree: {}",
                duplicate
            )));
        }

        self.directory_mut(parent_id)?.children.push(node);
        Ok(())
    }

    /// Unlink a node from its parent and return it.
    ///
    /// Deleting the blobs of the returned subtree is up to the caller.
    ///
    /// # Errors
    /// - `NotPermitted` for the root
    /// - `NotFound` if no such node
    pub fn remove(&mut self, id: &str) -> Result<TreeNode> {
        if id == self.root_id() {
            return Err(Error::NotPermitted("Cannot remove the root directory".to_string()));
        }

        let parent = self
            .resolve_parent_mut(id)
            .ok_or_else(|| Error::NotFound(format!("Node not found: {}", id)))?;
        let index = parent
            .children
            .iter()
            .position(|child| child.id() == id)
            .ok_or_else(|| Error::NotFound(format!("Node not found: {}", id)))?;
        Ok(parent.children.remove(index))
    }

    /// Change the display name of a node.
    pub fn rename(&mut self, id: &str, name: impl Into<String>) -> Result<()> {
        self.resolve_mut(id)
            .ok_or_else(|| Error::NotFound(format!("Node not found: {}", id)))?
            .set_name(name);
        Ok(())
    }

    /// Move a node under another directory.
    ///
    /// # Errors
    /// - `NotPermitted` for the root
    /// - `InvalidInput` if the target is the node itself or inside it, or
    ///   is not a directory
    pub fn move_node(&mut self, id: &str, new_parent_id: &str) -> Result<()> {
        if id == self.root_id() {
            return Err(Error::NotPermitted("Cannot move the root directory".to_string()));
        }
        if self.node(id)?.resolve(new_parent_id).is_some() {
            return Err(Error::InvalidInput(
                "Cannot move a node into its own subtree".to_string(),
            ));
        }
        self.directory(new_parent_id)?;

        let node = self.remove(id)?;
        self.directory_mut(new_parent_id)?.children.push(node);
        Ok(())
    }

    /// Every file in the vault.
    pub fn list_files(&self) -> Vec<&FileNode> {
        self.root.list_files()
    }

    /// Total size of all files.
    pub fn size(&self) -> u64 {
        self.root.size()
    }

    /// Total number of files.
    pub fn count(&self) -> usize {
        self.root.count()
    }

    /// Serialize tree to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(&self.root).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize tree from JSON.
    ///
    /// # Errors
    /// - Malformed JSON or schema mismatch
    /// - `Corruption` if the root is not a directory or ids repeat
    pub fn from_json(json: &str) -> Result<Self> {
        let root: TreeNode =
            serde_json::from_str(json).map_err(|e| Error::Serialization(e.to_string()))?;
        if !root.is_directory() {
            return Err(Error::Corruption("Manifest root is not a directory".to_string()));
        }

        let ids = root.ids();
        let unique: HashSet<&str> = ids.iter().copied().collect();
        if unique.len() != ids.len() {
            return Err(Error::Corruption("Manifest contains duplicate ids".to_string()));
        }

        Ok(Self { root })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lifechest_common::VaultId;
    use lifechest_crypto::Iv;
    use proptest::prelude::*;

    fn file(name: &str, size: u64) -> TreeNode {
        let now = Utc::now();
        TreeNode::File(FileNode {
            attached_file: EncryptedBlobRef {
                id: generate_id(),
                vault_id: VaultId::new("aa").unwrap(),
                iv: Iv::generate(),
                creation_date: now,
                import_date: now,
            },
            attached_thumbnail: None,
            name: name.to_string(),
            mime_type: "text/plain".to_string(),
            creation_date: now,
            import_date: now,
            size,
        })
    }

    fn dir(name: &str) -> TreeNode {
        TreeNode::Directory(DirectoryNode::new(name))
    }

    #[test]
    fn test_resolve_and_parent() {
        let mut tree = FileTree::new(DirectoryNode::new("Test"));
        let root = tree.root_id().to_string();
        let photos = dir("photos");
        let photos_id = photos.id().to_string();
        let pic = file("pic.jpg", 100);
        let pic_id = pic.id().to_string();

        tree.add(&root, photos).unwrap();
        tree.add(&photos_id, pic).unwrap();

        assert_eq!(tree.resolve(&pic_id).unwrap().name(), "pic.jpg");
        assert_eq!(tree.resolve(&root).unwrap().id(), root);
        assert_eq!(tree.resolve_parent(&pic_id).unwrap().id, photos_id);
        assert_eq!(tree.resolve_parent(&photos_id).unwrap().id, root);
        assert!(tree.resolve_parent(&root).is_none());
        assert!(tree.resolve("missing").is_none());
    }

    #[test]
    fn test_size_and_count_are_recursive() {
        let mut tree = FileTree::new(DirectoryNode::new("Test"));
        let root = tree.root_id().to_string();
        let sub = dir("sub");
        let sub_id = sub.id().to_string();
        tree.add(&root, file("a", 10)).unwrap();
        tree.add(&root, sub).unwrap();
        tree.add(&sub_id, file("b", 32)).unwrap();

        assert_eq!(tree.size(), 42);
        assert_eq!(tree.count(), 2);
        assert_eq!(tree.node(&sub_id).unwrap().size(), 32);
        assert_eq!(tree.node(&sub_id).unwrap().mime_type(), DIRECTORY_TYPE);
    }

    #[test]
    fn test_add_rejects_bad_parent_and_duplicates() {
        let mut tree = FileTree::new(DirectoryNode::new("Test"));
        let root = tree.root_id().to_string();
        let a = file("a", 1);
        let a_id = a.id().to_string();
        tree.add(&root, a.clone()).unwrap();

        assert!(matches!(tree.add(&root, a), Err(Error::AlreadyExists(_))));
        assert!(matches!(
            tree.add(&a_id, file("b", 1)),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            tree.add("nope", file("c", 1)),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_remove() {
        let mut tree = FileTree::new(DirectoryNode::new("Test"));
        let root = tree.root_id().to_string();
        let a = file("a", 1);
        let a_id = a.id().to_string();
        tree.add(&root, a).unwrap();

        let removed = tree.remove(&a_id).unwrap();
        assert_eq!(removed.id(), a_id);
        assert!(!tree.contains(&a_id));
        assert!(matches!(tree.remove(&root), Err(Error::NotPermitted(_))));
    }

    #[test]
    fn test_move_node() {
        let mut tree = FileTree::new(DirectoryNode::new("Test"));
        let root = tree.root_id().to_string();
        let outer = dir("outer");
        let outer_id = outer.id().to_string();
        let inner = dir("inner");
        let inner_id = inner.id().to_string();
        let a = file("a", 1);
        let a_id = a.id().to_string();
        tree.add(&root, outer).unwrap();
        tree.add(&outer_id, inner).unwrap();
        tree.add(&root, a).unwrap();

        tree.move_node(&a_id, &inner_id).unwrap();
        assert_eq!(tree.resolve_parent(&a_id).unwrap().id, inner_id);

        assert!(matches!(
            tree.move_node(&outer_id, &inner_id),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            tree.move_node(&outer_id, &outer_id),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            tree.move_node(&outer_id, &a_id),
            Err(Error::InvalidInput(_))
        ));
        assert_eq!(tree.count(), 1);
    }

    #[test]
    fn test_manifest_roundtrip_three_levels() {
        let mut tree = FileTree::new(DirectoryNode::new("Test"));
        let root = tree.root_id().to_string();
        let l1 = dir("l1");
        let l1_id = l1.id().to_string();
        let l2 = dir("l2");
        let l2_id = l2.id().to_string();
        let l3 = dir("l3");
        let l3_id = l3.id().to_string();
        tree.add(&root, l1).unwrap();
        tree.add(&root, file("top.txt", 5)).unwrap();
        tree.add(&l1_id, l2).unwrap();
        tree.add(&l1_id, file("one.txt", 6)).unwrap();
        tree.add(&l2_id, l3).unwrap();
        tree.add(&l3_id, file("deep.bin", 7)).unwrap();

        let json = tree.to_json().unwrap();
        let restored = FileTree::from_json(&json).unwrap();

        assert_eq!(restored, tree);
        assert!(json.contains("\"nodeType\":\"directory\""));
        assert!(json.contains("\"nodeType\":\"file\""));
    }

    #[test]
    fn test_from_json_rejects_file_root() {
        let json = serde_json::to_string(&file("a", 1)).unwrap();
        assert!(matches!(
            FileTree::from_json(&json),
            Err(Error::Corruption(_))
        ));
        assert!(FileTree::from_json("{\"nodeType\":\"symlink\"}").is_err());
    }

    #[derive(Debug, Clone)]
    enum Op {
        AddFile(usize),
        AddDir(usize),
        Remove(usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            any::<usize>().prop_map(Op::AddFile),
            any::<usize>().prop_map(Op::AddDir),
            any::<usize>().prop_map(Op::Remove),
        ]
    }

    proptest! {
        #[test]
        fn prop_tree_ids_unique_and_resolvable(ops in proptest::collection::vec(op(), 0..60)) {
            let mut tree = FileTree::new(DirectoryNode::new("root"));

            for op in ops {
                let dirs: Vec<String> = {
                    let mut dirs = vec![tree.root_id().to_string()];
                    dirs.extend(
                        tree.root()
                            .ids()
                            .into_iter()
                            .filter(|id| tree.resolve(id).map_or(false, TreeNode::is_directory))
                            .filter(|id| *id != tree.root_id())
                            .map(str::to_string),
                    );
                    dirs
                };
                match op {
                    Op::AddFile(i) => tree.add(&dirs[i % dirs.len()], file("f", 1)).unwrap(),
                    Op::AddDir(i) => tree.add(&dirs[i % dirs.len()], dir("d")).unwrap(),
                    Op::Remove(i) => {
                        let ids: Vec<String> =
                            tree.root().ids().into_iter().skip(1).map(str::to_string).collect();
                        if !ids.is_empty() {
                            tree.remove(&ids[i % ids.len()]).unwrap();
                        }
                    }
                }
            }

            let ids = tree.root().ids();
            let unique: HashSet<&str> = ids.iter().copied().collect();
            prop_assert_eq!(unique.len(), ids.len());
            for id in ids {
                prop_assert_eq!(tree.resolve(id).unwrap().id(), id);
            }
        }
    }
}
