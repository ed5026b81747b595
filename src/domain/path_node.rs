//! The per-user path tree (§3 "Path Node", §9 "Cyclic ownership in the path
//! tree"). Nodes own their children by value in a map; parents are
//! referenced only by id, so the tree is a DAG of values rather than a
//! cyclic graph of handles. Ascending resolution goes through the
//! `id -> mapping` cache, never through a parent pointer held here.

use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct PathNode {
    pub file_id: u64,
    pub original_name: String,
    pub webdav_name: String,
    pub parent_id: Option<u64>,
    pub is_directory: bool,
    pub user_id: u64,
    pub children: HashMap<String, PathNode>,
}

impl PathNode {
    pub fn root(user_id: u64) -> Self {
        Self {
            file_id: 0,
            original_name: String::new(),
            webdav_name: String::new(),
            parent_id: None,
            is_directory: true,
            user_id,
            children: HashMap::new(),
        }
    }

    pub fn child(
        file_id: u64,
        original_name: impl Into<String>,
        webdav_name: impl Into<String>,
        parent_id: u64,
        is_directory: bool,
        user_id: u64,
    ) -> Self {
        Self {
            file_id,
            original_name: original_name.into(),
            webdav_name: webdav_name.into(),
            parent_id: Some(parent_id),
            is_directory,
            user_id,
            children: HashMap::new(),
        }
    }

    /// Walks `segments` from this node, returning the terminal node if every
    /// segment resolves through a `children` entry.
    pub fn walk(&self, segments: &[&str]) -> Option<&PathNode> {
        let mut current = self;
        for segment in segments {
            current = current.children.get(*segment)?;
        }
        Some(current)
    }

    pub fn walk_mut(&mut self, segments: &[&str]) -> Option<&mut PathNode> {
        let mut current = self;
        for segment in segments {
            current = current.children.get_mut(*segment)?;
        }
        Some(current)
    }

    /// Inserts or replaces a direct child keyed by its disambiguated
    /// webdav name. Within a single parent, webdav names must be unique
    /// (§3 invariant); this enforces it by construction (last write wins,
    /// callers are expected to have already disambiguated).
    pub fn insert_child(&mut self, node: PathNode) {
        self.children.insert(node.webdav_name.clone(), node);
    }

    pub fn remove_child(&mut self, webdav_name: &str) -> Option<PathNode> {
        self.children.remove(webdav_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walk_resolves_nested_children() {
        let mut root = PathNode::root(1);
        let mut docs = PathNode::child(10, "docs", "docs", 0, true, 1);
        docs.insert_child(PathNode::child(11, "a.txt", "a.txt", 10, false, 1));
        root.insert_child(docs);

        let found = root.walk(&["docs", "a.txt"]).unwrap();
        assert_eq!(found.file_id, 11);
        assert!(root.walk(&["docs", "missing.txt"]).is_none());
    }

    #[test]
    fn webdav_names_unique_within_parent() {
        let mut root = PathNode::root(1);
        root.insert_child(PathNode::child(1, "a", "a", 0, false, 1));
        root.insert_child(PathNode::child(2, "a (2)", "a (2)", 0, false, 1));
        assert_eq!(root.children.len(), 2);
    }
}
