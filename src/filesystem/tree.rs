use derive_more::Display;
use snafu::{ResultExt, Snafu, ensure};
use tracing::{debug, trace};

use crate::filesystem::{AllocationError, NodeArena, NodeId, NodeKind, PathError, TreePath};

/// An in-memory hierarchy of directories and files rooted at a single
/// directory.
///
/// The tree starts uninitialized; every operation other than [`FileTree::init`]
/// fails with [`TreeError::InitializationError`] until `init` is called.
#[derive(Debug, Default)]
pub struct FileTree {
    initialized: bool,
    root: Option<NodeId>,
    count: usize,
    nodes: NodeArena,
}

/// What [`FileTree::stat`] reports about a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum NodeStat {
    #[display("directory")]
    Directory,
    #[display("file, {size} bytes")]
    File { size: usize },
}

/// Outcome kinds shared by every strict tree operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Status {
    Success,
    InitializationError,
    AlreadyInTree,
    NoSuchPath,
    ConflictingPath,
    BadPath,
    NotADirectory,
    NotAFile,
    MemoryError,
}

enum Terminal<'a> {
    Directory,
    File { contents: &'a [u8] },
}

impl FileTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// A tree whose arena holds at most `limit` nodes at a time.
    pub fn with_node_limit(limit: usize) -> Self {
        FileTree {
            nodes: NodeArena::with_limit(limit),
            ..Self::default()
        }
    }

    pub fn init(&mut self) -> Result<(), TreeError> {
        ensure!(
            !self.initialized,
            InitializationSnafu {
                reason: "already initialized"
            }
        );

        self.initialized = true;
        self.root = None;
        self.count = 0;
        debug!("Initialized file tree");
        Ok(())
    }

    /// Frees every node and returns the tree to its uninitialized state.
    pub fn destroy(&mut self) -> Result<(), TreeError> {
        self.ensure_initialized()?;

        if let Some(root) = self.root.take() {
            let freed = self.nodes.free(root);
            self.count -= freed;
            debug!("Destroyed file tree, freed {} nodes", freed);
        }
        self.initialized = false;
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Number of live nodes according to the tree's own bookkeeping.
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn nodes(&self) -> &NodeArena {
        &self.nodes
    }

    /// Inserts a directory at `path`, creating any missing intermediate
    /// directories. On failure nothing created by this call survives.
    pub fn insert_directory(&mut self, path: &str) -> Result<(), TreeError> {
        self.insert(path, Terminal::Directory)
    }

    /// Inserts a file holding a copy of `contents` at `path`, creating any
    /// missing intermediate directories. A file can never be the root.
    pub fn insert_file(&mut self, path: &str, contents: &[u8]) -> Result<(), TreeError> {
        self.insert(path, Terminal::File { contents })
    }

    pub fn contains_directory(&self, path: &str) -> bool {
        self.locate_exact(path)
            .is_ok_and(|id| self.nodes[id].is_directory())
    }

    pub fn contains_file(&self, path: &str) -> bool {
        self.locate_exact(path)
            .is_ok_and(|id| self.nodes[id].is_file())
    }

    /// Removes the directory at `path` along with everything below it.
    pub fn remove_directory(&mut self, path: &str) -> Result<(), TreeError> {
        self.remove(path, NodeKind::Directory)
    }

    pub fn remove_file(&mut self, path: &str) -> Result<(), TreeError> {
        self.remove(path, NodeKind::File)
    }

    pub fn stat(&self, path: &str) -> Result<NodeStat, TreeError> {
        let id = self.locate_exact(path)?;
        Ok(match self.nodes[id].size() {
            Some(size) => NodeStat::File { size },
            None => NodeStat::Directory,
        })
    }

    /// Contents of the file at `path`, distinguishing why a lookup failed.
    pub fn read_file(&self, path: &str) -> Result<&[u8], TreeError> {
        let id = self.locate_exact(path)?;
        self.nodes[id]
            .data()
            .ok_or_else(|| NotAFileSnafu { path }.build())
    }

    /// Contents of the file at `path`, or `None` for any kind of failure.
    /// Use [`FileTree::read_file`] to learn why a lookup failed.
    pub fn file_contents(&self, path: &str) -> Option<&[u8]> {
        self.read_file(path).ok()
    }

    /// Swaps the contents of the file at `path` and hands back the previous
    /// buffer. Returns `None` for any kind of failure, in which case
    /// `contents` is dropped and the tree is unchanged.
    pub fn replace_file_contents(&mut self, path: &str, contents: Vec<u8>) -> Option<Vec<u8>> {
        let id = self.locate_exact(path).ok()?;
        self.nodes.change_data(id, contents)
    }

    /// Lists every path, one per line. At each directory the file children
    /// come first, then the subdirectories, each group in path order.
    /// Returns `None` while uninitialized.
    pub fn serialize(&self) -> Option<String> {
        if !self.initialized {
            return None;
        }

        let mut listing = String::new();
        let mut pending = Vec::from_iter(self.root);
        while let Some(id) = pending.pop() {
            let node = &self.nodes[id];
            listing.push_str(node.path().as_str());
            listing.push('\n');

            // Pushed in reverse so files pop first, each group in path order.
            for kind in [NodeKind::Directory, NodeKind::File] {
                pending.extend(
                    node.children()
                        .iter()
                        .rev()
                        .filter(|child| self.nodes[**child].kind() == kind),
                );
            }
        }
        Some(listing)
    }

    fn ensure_initialized(&self) -> Result<(), TreeError> {
        ensure!(
            self.initialized,
            InitializationSnafu {
                reason: "not initialized"
            }
        );
        Ok(())
    }

    /// Walks from the root towards `path` as far as existing nodes allow and
    /// returns the deepest node reached, or `None` for an empty tree.
    fn descend_towards(&self, path: &TreePath) -> Result<Option<NodeId>, TreeError> {
        let Some(root) = self.root else {
            return Ok(None);
        };

        let top = path.prefix(1).context(BadPathSnafu)?;
        ensure!(
            self.nodes[root].path() == &top,
            ConflictingPathSnafu {
                path: path.as_str()
            }
        );

        let mut current = root;
        for depth in 2..=path.depth() {
            let prefix = path.prefix(depth).context(BadPathSnafu)?;
            match self.nodes.has_child(current, &prefix) {
                Ok(index) => {
                    current = self.nodes[current].children()[index];
                    trace!("Descended to {}", prefix);
                }
                Err(_) => break,
            }
        }
        Ok(Some(current))
    }

    fn locate_exact(&self, path: &str) -> Result<NodeId, TreeError> {
        self.ensure_initialized()?;
        let target = TreePath::parse(path).context(BadPathSnafu)?;

        match self.descend_towards(&target)? {
            Some(id) if self.nodes[id].path() == &target => Ok(id),
            _ => NoSuchPathSnafu { path }.fail(),
        }
    }

    fn insert(&mut self, path: &str, terminal: Terminal<'_>) -> Result<(), TreeError> {
        self.ensure_initialized()?;
        let target = TreePath::parse(path).context(BadPathSnafu)?;
        if let Terminal::File { .. } = terminal {
            ensure!(self.root.is_some(), ConflictingPathSnafu { path });
        }

        let furthest = self.descend_towards(&target)?;
        let first_depth = match furthest {
            Some(id) => {
                let node = &self.nodes[id];
                ensure!(node.path() != &target, AlreadyInTreeSnafu { path });
                ensure!(
                    node.is_directory(),
                    NotADirectorySnafu {
                        path: node.path().as_str()
                    }
                );
                node.path().depth() + 1
            }
            None => {
                ensure!(self.root.is_none(), ConflictingPathSnafu { path });
                1
            }
        };

        let mut parent = furthest;
        let mut first_new = None;
        let mut created = 0;
        for depth in first_depth..=target.depth() {
            match self.create_level(&target, depth, parent, &terminal) {
                Ok(id) => {
                    first_new.get_or_insert(id);
                    parent = Some(id);
                    created += 1;
                }
                Err(error) => {
                    if let Some(first) = first_new {
                        let freed = self.nodes.free(first);
                        debug!("Rolled back {} nodes after failing to insert {}", freed, path);
                    }
                    return Err(error);
                }
            }
        }

        if self.root.is_none() {
            self.root = first_new;
        }
        self.count += created;
        debug!("Inserted {} ({} new nodes)", path, created);
        Ok(())
    }

    fn create_level(
        &mut self,
        target: &TreePath,
        depth: usize,
        parent: Option<NodeId>,
        terminal: &Terminal<'_>,
    ) -> Result<NodeId, TreeError> {
        let prefix = target.prefix(depth).context(BadPathSnafu)?;
        let created = match terminal {
            Terminal::File { contents } if depth == target.depth() => {
                self.nodes.new_file(prefix, parent, contents)
            }
            _ => self.nodes.new_directory(prefix, parent),
        };
        created.context(MemorySnafu)
    }

    fn remove(&mut self, path: &str, expected: NodeKind) -> Result<(), TreeError> {
        let id = self.locate_exact(path)?;
        match (expected, self.nodes[id].kind()) {
            (NodeKind::Directory, NodeKind::File) => return NotADirectorySnafu { path }.fail(),
            (NodeKind::File, NodeKind::Directory) => return NotAFileSnafu { path }.fail(),
            _ => {}
        }

        let freed = self.nodes.free(id);
        self.count -= freed;
        if self.count == 0 || self.root == Some(id) {
            self.root = None;
        }
        debug!("Removed {} {} ({} nodes freed)", expected, path, freed);
        Ok(())
    }
}

#[derive(Debug, Snafu)]
pub enum TreeError {
    #[snafu(display("File tree is {}", reason))]
    InitializationError { reason: &'static str },
    #[snafu(display("'{}' is already in the tree", path))]
    AlreadyInTree { path: String },
    #[snafu(display("No node at '{}'", path))]
    NoSuchPath { path: String },
    #[snafu(display("'{}' is not rooted under the tree's root", path))]
    ConflictingPath { path: String },
    #[snafu(display("Malformed path"))]
    BadPathError { source: PathError },
    #[snafu(display("'{}' is not a directory", path))]
    NotADirectory { path: String },
    #[snafu(display("'{}' is not a file", path))]
    NotAFile { path: String },
    #[snafu(display("Ran out of memory while inserting nodes"))]
    MemoryError { source: AllocationError },
}

impl TreeError {
    pub fn status(&self) -> Status {
        match self {
            TreeError::InitializationError { .. } => Status::InitializationError,
            TreeError::AlreadyInTree { .. } => Status::AlreadyInTree,
            TreeError::NoSuchPath { .. } => Status::NoSuchPath,
            TreeError::ConflictingPath { .. } => Status::ConflictingPath,
            TreeError::BadPathError { .. } => Status::BadPath,
            TreeError::NotADirectory { .. } => Status::NotADirectory,
            TreeError::NotAFile { .. } => Status::NotAFile,
            TreeError::MemoryError { .. } => Status::MemoryError,
        }
    }
}
