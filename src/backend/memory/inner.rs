use std::collections::BTreeMap;

use slab::Slab;

use crate::backend::memory::{MemoryMetrics, NodeId};
use crate::backend::BackendError;

pub(crate) struct MemoryInner {
    pub(crate) nodes: Slab<MemoryNode>,
    pub(crate) root_id: NodeId,
    pub(crate) metrics: MemoryMetrics,
    pub(crate) quota: Option<usize>,
}

impl MemoryInner {
    pub(crate) fn initialize() -> Self {
        let mut nodes = Slab::with_capacity(32);

        let root_entry = nodes.vacant_entry();
        let root_id = root_entry.key();
        root_entry.insert(MemoryNode {
            name: String::new(),
            parent_id: None,
            kind: MemoryNodeKind::Directory {
                children: BTreeMap::new(),
            },
        });

        Self {
            nodes,
            root_id,
            metrics: MemoryMetrics::default(),
            quota: None,
        }
    }

    pub(crate) fn children(&self, node_id: NodeId) -> Result<&BTreeMap<String, NodeId>, BackendError> {
        match self.node(node_id)?.kind {
            MemoryNodeKind::Directory { ref children } => Ok(children),
            MemoryNodeKind::File { .. } => Err(BackendError::Implementation(format!(
                "node {node_id} is not a directory"
            ))),
        }
    }

    /// Look up `name` under `parent_id`, inserting a node built by `new_kind` when absent and
    /// creation was requested.
    pub(crate) fn child_or_insert(
        &mut self,
        parent_id: NodeId,
        name: &str,
        create: bool,
        new_kind: impl FnOnce() -> MemoryNodeKind,
    ) -> Result<NodeId, BackendError> {
        if let Some(child_id) = self.children(parent_id)?.get(name) {
            return Ok(*child_id);
        }

        if !create {
            return Err(BackendError::NotFound(name.to_string()));
        }

        let child_id = self.nodes.insert(MemoryNode {
            name: name.to_string(),
            parent_id: Some(parent_id),
            kind: new_kind(),
        });

        match self.nodes.get_mut(parent_id).map(|node| &mut node.kind) {
            Some(MemoryNodeKind::Directory { children }) => {
                children.insert(name.to_string(), child_id);
            }
            _ => {
                return Err(BackendError::Implementation(format!(
                    "parent node {parent_id} disappeared during insert"
                )))
            }
        }

        Ok(child_id)
    }

    pub(crate) fn node(&self, node_id: NodeId) -> Result<&MemoryNode, BackendError> {
        self.nodes
            .get(node_id)
            .ok_or_else(|| BackendError::Implementation(format!("missing node {node_id}")))
    }

    pub(crate) fn node_mut(&mut self, node_id: NodeId) -> Result<&mut MemoryNode, BackendError> {
        self.nodes
            .get_mut(node_id)
            .ok_or_else(|| BackendError::Implementation(format!("missing node {node_id}")))
    }

    /// Names from `ancestor_id` (exclusive) down to `node_id` (inclusive), `None` if
    /// `ancestor_id` isn't on the parent chain.
    pub(crate) fn path_between(&self, ancestor_id: NodeId, node_id: NodeId) -> Option<Vec<String>> {
        let mut names = Vec::new();
        let mut current_id = node_id;

        while current_id != ancestor_id {
            let node = self.nodes.get(current_id)?;
            names.push(node.name.clone());
            current_id = node.parent_id?;
        }

        names.reverse();
        Some(names)
    }
}

pub(crate) struct MemoryNode {
    pub(crate) name: String,
    pub(crate) parent_id: Option<NodeId>,
    pub(crate) kind: MemoryNodeKind,
}

pub(crate) enum MemoryNodeKind {
    Directory { children: BTreeMap<String, NodeId> },
    File { content: Vec<u8>, open_writables: usize },
}

impl MemoryNodeKind {
    pub(crate) fn empty_directory() -> Self {
        Self::Directory {
            children: BTreeMap::new(),
        }
    }

    pub(crate) fn empty_file() -> Self {
        Self::File {
            content: Vec::new(),
            open_writables: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialization() {
        let inner = MemoryInner::initialize();
        assert_eq!(inner.nodes.len(), 1);
        assert!(inner.children(inner.root_id).unwrap().is_empty());
    }

    #[test]
    fn test_child_insertion_and_paths() {
        let mut inner = MemoryInner::initialize();
        let root_id = inner.root_id;

        let missing = inner.child_or_insert(root_id, "dir_1", false, MemoryNodeKind::empty_directory);
        assert!(matches!(missing, Err(BackendError::NotFound(name)) if name == "dir_1"));

        let dir_1 = inner
            .child_or_insert(root_id, "dir_1", true, MemoryNodeKind::empty_directory)
            .unwrap();
        let again = inner
            .child_or_insert(root_id, "dir_1", true, MemoryNodeKind::empty_directory)
            .unwrap();
        assert_eq!(dir_1, again);

        let file_1 = inner
            .child_or_insert(dir_1, "file_1", true, MemoryNodeKind::empty_file)
            .unwrap();

        assert_eq!(
            inner.path_between(root_id, file_1).unwrap(),
            vec!["dir_1".to_string(), "file_1".to_string()]
        );
        assert_eq!(inner.path_between(dir_1, dir_1).unwrap(), Vec::<String>::new());
        assert!(inner.path_between(file_1, dir_1).is_none());
        assert!(inner.children(file_1).is_err());
    }
}
