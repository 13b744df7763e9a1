use std::cmp::Ordering;

use tracing::error;

use crate::filesystem::{FileTree, NodeArena, NodeId};

/// Checks a single node against its parent: the parent's path must be the
/// longest proper prefix of the node's path.
pub fn node_is_valid(nodes: &NodeArena, id: NodeId) -> bool {
    let Some(node) = nodes.get(id) else {
        error!("Node {} is not allocated", id);
        return false;
    };

    if let Some(parent_id) = node.parent() {
        let Some(parent) = nodes.get(parent_id) else {
            error!("Parent {} of {} is not allocated", parent_id, node.path());
            return false;
        };

        let depth = node.path().depth();
        if node.path().shared_prefix_depth(parent.path()) != depth - 1
            || parent.path().depth() != depth - 1
        {
            error!(
                "P-C nodes don't have P-C paths: ({}) ({})",
                parent.path(),
                node.path()
            );
            return false;
        }
    }

    true
}

/// Pre-order walk of the subtree under `id`, validating every node and the
/// ordering of every child list. Adds the number of nodes visited to
/// `visited`.
pub fn tree_check(nodes: &NodeArena, id: NodeId, visited: &mut usize) -> bool {
    let mut pending = vec![id];

    while let Some(current) = pending.pop() {
        if !node_is_valid(nodes, current) {
            return false;
        }
        *visited += 1;
        if *visited > nodes.live() {
            error!("Visited more nodes than are allocated; the tree has a cycle");
            return false;
        }

        let node = &nodes[current];
        let children = node.children();
        for pair in children.windows(2) {
            let (Some(previous), Some(next)) = (nodes.get(pair[0]), nodes.get(pair[1])) else {
                error!("{} lists a child that is not allocated", node.path());
                return false;
            };
            match previous.path().cmp(next.path()) {
                Ordering::Less => {}
                Ordering::Equal => {
                    error!("Two children with same name in directory {}", node.path());
                    return false;
                }
                Ordering::Greater => {
                    error!(
                        "Children of {} are not in lexicographic order: {} before {}",
                        node.path(),
                        previous.path(),
                        next.path()
                    );
                    return false;
                }
            }
        }

        for child in children {
            let parent = nodes.get(*child).and_then(|child| child.parent());
            if parent != Some(current) {
                error!(
                    "{} lists child {} whose parent link does not point back",
                    node.path(),
                    child
                );
                return false;
            }
        }

        pending.extend(children.iter().rev());
    }

    true
}

/// Verifies a tree from its raw state, without trusting any bookkeeping
/// beyond what is passed in.
pub fn is_valid(initialized: bool, root: Option<NodeId>, count: usize, nodes: &NodeArena) -> bool {
    if !initialized {
        if count != 0 {
            error!("Not initialized, but count is {}", count);
            return false;
        }
        if root.is_some() {
            error!("Not initialized, but root is set");
            return false;
        }
    } else {
        if root.is_none() && count > 0 {
            error!("Root is absent, but count is {}", count);
            return false;
        }
        if root.is_some() && count == 0 {
            error!("Tree has a root, but count is 0");
            return false;
        }
    }

    let mut visited = 0;
    if let Some(root) = root {
        if nodes.get(root).is_some_and(|node| node.parent().is_some()) {
            error!("Root {} has a parent", root);
            return false;
        }
        if !tree_check(nodes, root, &mut visited) {
            return false;
        }
    }

    if visited != count {
        error!(
            "Traversal reached {} nodes, but the tree claims {}",
            visited, count
        );
        return false;
    }

    true
}

pub fn check(tree: &FileTree) -> bool {
    is_valid(
        tree.is_initialized(),
        tree.root(),
        tree.count(),
        tree.nodes(),
    )
}
