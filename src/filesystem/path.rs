use std::cmp::Ordering;
use std::str::FromStr;

use derive_more::Display;
use snafu::{Snafu, ensure};

const SEPARATOR: char = '/';

/// A validated absolute path inside the file tree, e.g. `/root/docs/readme`.
///
/// Paths are immutable. Ordering compares components one by one, so
/// `/a/b` sorts before `/a-b` even though `'/' > '-'` bytewise.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display)]
#[display("{text}")]
pub struct TreePath {
    text: String,
    /// Byte offset of the separator that opens each component.
    starts: Vec<usize>,
}

impl TreePath {
    pub fn parse(text: &str) -> Result<Self, PathError> {
        ensure!(!text.is_empty(), EmptySnafu);
        ensure!(
            text.starts_with(SEPARATOR),
            NotAbsoluteSnafu { path: text }
        );

        let starts = text
            .char_indices()
            .filter(|(_, c)| *c == SEPARATOR)
            .map(|(offset, _)| offset)
            .collect::<Vec<_>>();

        let path = TreePath {
            text: text.to_string(),
            starts,
        };
        ensure!(
            path.components().all(|component| !component.is_empty()),
            EmptyComponentSnafu { path: text }
        );

        Ok(path)
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Number of components; always at least one.
    pub fn depth(&self) -> usize {
        self.starts.len()
    }

    pub fn components(&self) -> impl Iterator<Item = &str> {
        (0..self.depth()).map(|index| self.component(index))
    }

    /// The last component.
    pub fn name(&self) -> &str {
        self.component(self.depth() - 1)
    }

    /// The path made of the first `depth` components.
    pub fn prefix(&self, depth: usize) -> Result<TreePath, PathError> {
        ensure!(
            (1..=self.depth()).contains(&depth),
            PrefixOutOfRangeSnafu {
                path: self.text.as_str(),
                depth: self.depth(),
                requested: depth,
            }
        );

        Ok(TreePath {
            text: self.text[..self.end_of(depth - 1)].to_string(),
            starts: self.starts[..depth].to_vec(),
        })
    }

    /// How many leading components `self` and `other` have in common.
    pub fn shared_prefix_depth(&self, other: &TreePath) -> usize {
        self.components()
            .zip(other.components())
            .take_while(|(ours, theirs)| ours == theirs)
            .count()
    }

    fn component(&self, index: usize) -> &str {
        &self.text[self.starts[index] + 1..self.end_of(index)]
    }

    fn end_of(&self, index: usize) -> usize {
        self.starts
            .get(index + 1)
            .copied()
            .unwrap_or(self.text.len())
    }
}

impl Ord for TreePath {
    fn cmp(&self, other: &Self) -> Ordering {
        self.components().cmp(other.components())
    }
}

impl PartialOrd for TreePath {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl TryFrom<&str> for TreePath {
    type Error = PathError;

    fn try_from(text: &str) -> Result<Self, Self::Error> {
        TreePath::parse(text)
    }
}

impl FromStr for TreePath {
    type Err = PathError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        TreePath::parse(text)
    }
}

#[derive(Debug, Snafu)]
pub enum PathError {
    #[snafu(display("Path is empty"))]
    Empty,
    #[snafu(display("Path '{}' does not start with '{}'", path, SEPARATOR))]
    NotAbsolute { path: String },
    #[snafu(display("Path '{}' contains an empty component", path))]
    EmptyComponent { path: String },
    #[snafu(display(
        "Cannot take a prefix of depth {} from '{}' (depth {})",
        requested,
        path,
        depth
    ))]
    PrefixOutOfRange {
        path: String,
        depth: usize,
        requested: usize,
    },
}
