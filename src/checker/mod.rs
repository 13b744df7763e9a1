//! Read-only invariant checks for a [`FileTree`](crate::filesystem::FileTree).
//!
//! The checker re-derives everything from the node arena instead of trusting
//! the tree's own counters, so bookkeeping bugs in the tree show up here.

mod checker;

pub use checker::{check, is_valid, node_is_valid, tree_check};
