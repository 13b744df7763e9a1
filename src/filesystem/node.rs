use std::collections::TryReserveError;
use std::ops::Index;

use derive_more::Display;
use snafu::{ResultExt, Snafu, ensure};
use tracing::trace;

use crate::filesystem::TreePath;

/// Handle to a node stored in a [`NodeArena`].
///
/// A handle does not own the node. Once the node is freed the handle is
/// stale and [`NodeArena::get`] returns `None` for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[display("#{_0}")]
pub struct NodeId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum NodeKind {
    #[display("file")]
    File,
    #[display("directory")]
    Directory,
}

#[derive(Debug, Clone)]
enum Payload {
    /// Children sorted by path, no duplicates.
    Directory { children: Vec<NodeId> },
    File { contents: Vec<u8> },
}

/// A vertex of the file tree: a directory with ordered children or a file
/// holding an opaque byte buffer.
#[derive(Debug, Clone)]
pub struct Node {
    path: TreePath,
    parent: Option<NodeId>,
    payload: Payload,
}

impl Node {
    pub fn path(&self) -> &TreePath {
        &self.path
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn kind(&self) -> NodeKind {
        match self.payload {
            Payload::Directory { .. } => NodeKind::Directory,
            Payload::File { .. } => NodeKind::File,
        }
    }

    pub fn is_file(&self) -> bool {
        self.kind() == NodeKind::File
    }

    pub fn is_directory(&self) -> bool {
        self.kind() == NodeKind::Directory
    }

    /// Children in path order. Files have none.
    pub fn children(&self) -> &[NodeId] {
        match &self.payload {
            Payload::Directory { children } => children,
            Payload::File { .. } => &[],
        }
    }

    pub fn num_children(&self) -> usize {
        self.children().len()
    }

    pub fn child(&self, index: usize) -> Result<NodeId, ChildIndexError> {
        self.children()
            .get(index)
            .copied()
            .ok_or_else(|| ChildIndexError {
                index,
                count: self.num_children(),
            })
    }

    /// File contents, `None` for directories.
    pub fn data(&self) -> Option<&[u8]> {
        match &self.payload {
            Payload::File { contents } => Some(contents),
            Payload::Directory { .. } => None,
        }
    }

    pub fn size(&self) -> Option<usize> {
        self.data().map(<[u8]>::len)
    }
}

/// Owns every node of a tree. The only ownership edge between nodes is
/// directory to children; parent handles are plain lookups.
#[derive(Debug, Default)]
pub struct NodeArena {
    slots: Vec<Option<Node>>,
    vacant: Vec<usize>,
    live: usize,
    limit: Option<usize>,
}

impl NodeArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// An arena that refuses to hold more than `limit` live nodes.
    pub fn with_limit(limit: usize) -> Self {
        NodeArena {
            limit: Some(limit),
            ..Self::default()
        }
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Number of nodes currently allocated.
    pub fn live(&self) -> usize {
        self.live
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    /// Allocates a directory and links it under `parent` in path order.
    ///
    /// The caller guarantees that `path` is a direct child of the parent's
    /// path and is not already present among its children.
    pub fn new_directory(
        &mut self,
        path: TreePath,
        parent: Option<NodeId>,
    ) -> Result<NodeId, AllocationError> {
        self.allocate(
            path,
            parent,
            Payload::Directory {
                children: Vec::new(),
            },
        )
    }

    /// Allocates a file holding a copy of `contents`. Same contract as
    /// [`NodeArena::new_directory`].
    pub fn new_file(
        &mut self,
        path: TreePath,
        parent: Option<NodeId>,
        contents: &[u8],
    ) -> Result<NodeId, AllocationError> {
        let mut buffer = Vec::new();
        buffer
            .try_reserve_exact(contents.len())
            .context(ReserveSnafu)?;
        buffer.extend_from_slice(contents);

        self.allocate(path, parent, Payload::File { contents: buffer })
    }

    /// Binary search of `id`'s children for `path`: `Ok(index)` if present,
    /// otherwise `Err(index)` where it would be inserted.
    pub fn has_child(&self, id: NodeId, path: &TreePath) -> Result<usize, usize> {
        self[id]
            .children()
            .binary_search_by(|child| self[*child].path().cmp(path))
    }

    /// Frees `id` together with its whole subtree and unlinks it from its
    /// parent. Returns the number of nodes freed.
    pub fn free(&mut self, id: NodeId) -> usize {
        if let Some(parent) = self.get(id).and_then(Node::parent) {
            let siblings = self.children_mut(parent);
            if let Some(position) = siblings.iter().position(|sibling| *sibling == id) {
                siblings.remove(position);
            }
        }

        let mut freed = 0;
        let mut pending = vec![id];
        while let Some(current) = pending.pop() {
            let Some(node) = self.slots.get_mut(current.0).and_then(Option::take) else {
                continue;
            };
            if let Payload::Directory { children } = node.payload {
                pending.extend(children);
            }
            self.vacant.push(current.0);
            freed += 1;
        }

        self.live -= freed;
        trace!("Freed {} nodes starting at {}", freed, id);
        freed
    }

    /// Replaces a file's contents, handing back the previous buffer.
    /// Returns `None` and leaves the node untouched for directories.
    pub fn change_data(&mut self, id: NodeId, contents: Vec<u8>) -> Option<Vec<u8>> {
        match &mut self.slots.get_mut(id.0)?.as_mut()?.payload {
            Payload::File { contents: current } => Some(std::mem::replace(current, contents)),
            Payload::Directory { .. } => None,
        }
    }

    fn allocate(
        &mut self,
        path: TreePath,
        parent: Option<NodeId>,
        payload: Payload,
    ) -> Result<NodeId, AllocationError> {
        if let Some(limit) = self.limit {
            ensure!(self.live < limit, LimitReachedSnafu { limit });
        }

        // Reserve everything up front so a failure leaves the arena untouched.
        let position = match parent {
            Some(parent) => {
                let position = match self.has_child(parent, &path) {
                    Ok(position) | Err(position) => position,
                };
                self.children_mut(parent)
                    .try_reserve(1)
                    .context(ReserveSnafu)?;
                Some((parent, position))
            }
            None => None,
        };
        if self.vacant.is_empty() {
            self.slots.try_reserve(1).context(ReserveSnafu)?;
        }

        let node = Node {
            path,
            parent,
            payload,
        };
        let id = match self.vacant.pop() {
            Some(slot) => {
                self.slots[slot] = Some(node);
                NodeId(slot)
            }
            None => {
                self.slots.push(Some(node));
                NodeId(self.slots.len() - 1)
            }
        };

        if let Some((parent, position)) = position {
            self.children_mut(parent).insert(position, id);
        }
        self.live += 1;
        trace!("Allocated node {} for {}", id, self[id].path());
        Ok(id)
    }

    fn children_mut(&mut self, id: NodeId) -> &mut Vec<NodeId> {
        let node = self
            .slots
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .unwrap_or_else(|| panic!("node {id} is not allocated"));
        match &mut node.payload {
            Payload::Directory { children } => children,
            Payload::File { .. } => panic!("node {id} is a file and cannot hold children"),
        }
    }

    #[cfg(test)]
    pub(crate) fn reverse_children(&mut self, id: NodeId) {
        self.children_mut(id).reverse();
    }

    #[cfg(test)]
    pub(crate) fn set_parent(&mut self, id: NodeId, parent: Option<NodeId>) {
        if let Some(node) = self.slots.get_mut(id.0).and_then(Option::as_mut) {
            node.parent = parent;
        }
    }
}

impl Index<NodeId> for NodeArena {
    type Output = Node;

    fn index(&self, id: NodeId) -> &Self::Output {
        self.get(id)
            .unwrap_or_else(|| panic!("node {id} is not allocated"))
    }
}

#[derive(Debug, Snafu)]
pub enum AllocationError {
    #[snafu(display("Node limit of {} reached", limit))]
    LimitReached { limit: usize },
    #[snafu(display("Failed to reserve memory for a new node"))]
    ReserveError { source: TryReserveError },
}

#[derive(Debug, Snafu)]
#[snafu(display("Child index {} is out of range for a node with {} children", index, count))]
pub struct ChildIndexError {
    index: usize,
    count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(text: &str) -> TreePath {
        TreePath::parse(text).expect("Failed to parse test path")
    }

    fn child_paths(arena: &NodeArena, id: NodeId) -> Vec<String> {
        arena[id]
            .children()
            .iter()
            .map(|child| arena[*child].path().to_string())
            .collect()
    }

    #[test]
    fn new_directory_without_parent_is_a_root() {
        let mut arena = NodeArena::new();
        let root = arena.new_directory(path("/r"), None).unwrap();

        assert_eq!(arena[root].kind(), NodeKind::Directory);
        assert_eq!(arena[root].parent(), None);
        assert_eq!(arena[root].num_children(), 0);
        assert_eq!(arena[root].data(), None);
        assert_eq!(arena.live(), 1);
    }

    #[test]
    fn children_are_kept_in_path_order() {
        let mut arena = NodeArena::new();
        let root = arena.new_directory(path("/r"), None).unwrap();
        for name in ["/r/m", "/r/b", "/r/z", "/r/a"] {
            arena.new_directory(path(name), Some(root)).unwrap();
        }
        arena.new_file(path("/r/c"), Some(root), b"data").unwrap();

        assert_eq!(
            child_paths(&arena, root),
            vec!["/r/a", "/r/b", "/r/c", "/r/m", "/r/z"]
        );
        for child in arena[root].children() {
            assert_eq!(arena[*child].parent(), Some(root));
        }
    }

    #[test]
    fn has_child_reports_position_or_insertion_point() {
        let mut arena = NodeArena::new();
        let root = arena.new_directory(path("/r"), None).unwrap();
        arena.new_directory(path("/r/b"), Some(root)).unwrap();
        arena.new_directory(path("/r/d"), Some(root)).unwrap();

        assert_eq!(arena.has_child(root, &path("/r/b")), Ok(0));
        assert_eq!(arena.has_child(root, &path("/r/d")), Ok(1));
        assert_eq!(arena.has_child(root, &path("/r/a")), Err(0));
        assert_eq!(arena.has_child(root, &path("/r/c")), Err(1));
        assert_eq!(arena.has_child(root, &path("/r/e")), Err(2));
    }

    #[test]
    fn child_index_out_of_range() {
        let mut arena = NodeArena::new();
        let root = arena.new_directory(path("/r"), None).unwrap();
        let only = arena.new_directory(path("/r/a"), Some(root)).unwrap();

        assert_eq!(arena[root].child(0).unwrap(), only);
        let error = arena[root].child(1).unwrap_err();
        assert!(error.to_string().contains("out of range"));
    }

    #[test]
    fn file_copies_contents() {
        let mut arena = NodeArena::new();
        let root = arena.new_directory(path("/r"), None).unwrap();
        let mut source = b"hello".to_vec();
        let file = arena.new_file(path("/r/f"), Some(root), &source).unwrap();
        source.clear();

        assert_eq!(arena[file].data(), Some(&b"hello"[..]));
        assert_eq!(arena[file].size(), Some(5));
        assert_eq!(arena[file].num_children(), 0);
    }

    #[test]
    fn change_data_hands_back_previous_buffer() {
        let mut arena = NodeArena::new();
        let root = arena.new_directory(path("/r"), None).unwrap();
        let file = arena.new_file(path("/r/f"), Some(root), b"old").unwrap();

        let previous = arena.change_data(file, b"new".to_vec());
        assert_eq!(previous, Some(b"old".to_vec()));
        assert_eq!(arena[file].data(), Some(&b"new"[..]));
        assert_eq!(arena.change_data(root, b"ignored".to_vec()), None);
    }

    #[test]
    fn free_leaf_frees_exactly_one() {
        let mut arena = NodeArena::new();
        let root = arena.new_directory(path("/r"), None).unwrap();
        let leaf = arena.new_directory(path("/r/a"), Some(root)).unwrap();

        assert_eq!(arena.free(leaf), 1);
        assert!(arena.get(leaf).is_none());
        assert_eq!(arena[root].num_children(), 0);
        assert_eq!(arena.live(), 1);
    }

    #[test]
    fn free_subtree_counts_all_descendants() {
        let mut arena = NodeArena::new();
        let root = arena.new_directory(path("/r"), None).unwrap();
        let a = arena.new_directory(path("/r/a"), Some(root)).unwrap();
        let ab = arena.new_directory(path("/r/a/b"), Some(a)).unwrap();
        arena.new_file(path("/r/a/b/f"), Some(ab), b"x").unwrap();
        arena.new_file(path("/r/a/g"), Some(a), b"y").unwrap();
        let keep = arena.new_directory(path("/r/k"), Some(root)).unwrap();

        assert_eq!(arena.free(a), 4);
        assert_eq!(arena.live(), 2);
        assert_eq!(arena[root].children(), &[keep]);

        assert_eq!(arena.free(root), 2);
        assert_eq!(arena.live(), 0);
    }

    #[test]
    fn freed_slots_are_reused() {
        let mut arena = NodeArena::new();
        let root = arena.new_directory(path("/r"), None).unwrap();
        let a = arena.new_directory(path("/r/a"), Some(root)).unwrap();
        arena.free(a);

        let b = arena.new_directory(path("/r/b"), Some(root)).unwrap();
        assert_eq!(a, b);
        assert_eq!(arena[b].path().as_str(), "/r/b");
    }

    #[test]
    fn limit_rejects_allocation_without_side_effects() {
        let mut arena = NodeArena::with_limit(2);
        let root = arena.new_directory(path("/r"), None).unwrap();
        arena.new_directory(path("/r/a"), Some(root)).unwrap();

        let result = arena.new_file(path("/r/b"), Some(root), b"x");
        assert!(matches!(
            result,
            Err(AllocationError::LimitReached { limit: 2 })
        ));
        assert_eq!(arena.live(), 2);
        assert_eq!(arena[root].num_children(), 1);
        assert_eq!(arena.limit(), Some(2));
    }
}
