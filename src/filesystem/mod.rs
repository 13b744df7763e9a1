//! In-memory filesystem tree.
//!
//! Directories and files are addressed by absolute, slash-delimited
//! [`TreePath`]s. Nodes live in a [`NodeArena`]; a [`FileTree`] keeps the
//! root, the node count and the initialization state on top of it.

mod node;
mod path;
mod tree;

pub use node::{AllocationError, ChildIndexError, Node, NodeArena, NodeId, NodeKind};
pub use path::{PathError, TreePath};
pub use tree::{FileTree, NodeStat, Status, TreeError};
