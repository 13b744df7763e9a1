use derive_more::Display;
use hashlink::LinkedHashMap;
use saphyr::{Scalar, Yaml};
use snafu::{OptionExt, ResultExt, Snafu};
use tracing::{debug, warn};

use crate::filesystem::{FileTree, NodeStat, TreeError};

/// One step of a manifest, applied to a [`FileTree`].
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum Operation {
    #[display("mkdir {path}")]
    MakeDirectory { path: String },
    #[display("file {path}")]
    WriteFile { path: String, contents: Vec<u8> },
    #[display("rmdir {path}")]
    RemoveDirectory { path: String },
    #[display("rm {path}")]
    RemoveFile { path: String },
    #[display("replace {path}")]
    ReplaceContents { path: String, contents: Vec<u8> },
    #[display("stat {path}")]
    Stat { path: String },
    #[display("cat {path}")]
    Read { path: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Done,
    Stat { path: String, stat: NodeStat },
    Contents { path: String, contents: Vec<u8> },
    Replaced { path: String, previous: Vec<u8> },
}

fn yaml_get<'a>(data: &'a LinkedHashMap<Yaml, Yaml>, key: &'static str) -> Option<&'a Yaml<'a>> {
    data.get(&Yaml::Value(Scalar::String(key.into())))
}

fn yaml_str<'a>(data: &'a LinkedHashMap<Yaml, Yaml>, key: &'static str) -> Option<&'a str> {
    yaml_get(data, key).and_then(|value| value.as_str())
}

/// Renders a scalar as the text it was written as, so `contents: 42` stores
/// the bytes `42`. Null and non-scalar values have no text.
fn scalar_text(value: &Yaml) -> Option<String> {
    match value {
        Yaml::Value(Scalar::String(text)) => Some(text.to_string()),
        Yaml::Value(Scalar::Integer(number)) => Some(number.to_string()),
        Yaml::Value(Scalar::FloatingPoint(number)) => Some(number.to_string()),
        Yaml::Value(Scalar::Boolean(flag)) => Some(flag.to_string()),
        _ => None,
    }
}

impl Operation {
    /// Builds an operation from a manifest entry such as
    /// `{ type: file, path: /a/b, contents: "hello" }`. Returns `None` for
    /// entries that cannot be understood.
    pub fn from_operation_yaml(index: usize, data: &LinkedHashMap<Yaml, Yaml>) -> Option<Self> {
        let operation_type = yaml_str(data, "type");
        let Some(path) = yaml_str(data, "path").map(str::to_string) else {
            warn!("Operation #{} has no path. Skipping.", index);
            return None;
        };
        let contents = match yaml_get(data, "contents") {
            None | Some(Yaml::Value(Scalar::Null)) => None,
            Some(value) => match scalar_text(value) {
                Some(text) => Some(text.into_bytes()),
                None => {
                    warn!(
                        "Operation #{} has contents that are not text: {:?}. Skipping.",
                        index, value
                    );
                    return None;
                }
            },
        };
        debug!(
            "Parsing operation #{} of type {:?} for '{}'",
            index, operation_type, path
        );

        match operation_type {
            Some("mkdir") => Some(Operation::MakeDirectory { path }),
            Some("file") => Some(Operation::WriteFile {
                path,
                contents: contents.unwrap_or_default(),
            }),
            Some("rmdir") => Some(Operation::RemoveDirectory { path }),
            Some("rm") => Some(Operation::RemoveFile { path }),
            Some("replace") => match contents {
                Some(contents) => Some(Operation::ReplaceContents { path, contents }),
                None => {
                    warn!(
                        "Operation #{} replaces '{}' without contents. Skipping.",
                        index, path
                    );
                    None
                }
            },
            Some("stat") => Some(Operation::Stat { path }),
            Some("cat") => Some(Operation::Read { path }),
            _ => {
                warn!(
                    "Unknown operation type for operation #{}: {:?}. Skipping.",
                    index, operation_type
                );
                None
            }
        }
    }

    pub fn path(&self) -> &str {
        match self {
            Operation::MakeDirectory { path }
            | Operation::WriteFile { path, .. }
            | Operation::RemoveDirectory { path }
            | Operation::RemoveFile { path }
            | Operation::ReplaceContents { path, .. }
            | Operation::Stat { path }
            | Operation::Read { path } => path,
        }
    }

    /// Whether applying the operation can change the tree.
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Operation::Stat { .. } | Operation::Read { .. })
    }

    pub fn apply(&self, tree: &mut FileTree) -> Result<Outcome, OperationError> {
        let result = match self {
            Operation::MakeDirectory { path } => tree.insert_directory(path).map(|()| Outcome::Done),
            Operation::WriteFile { path, contents } => {
                tree.insert_file(path, contents).map(|()| Outcome::Done)
            }
            Operation::RemoveDirectory { path } => tree.remove_directory(path).map(|()| Outcome::Done),
            Operation::RemoveFile { path } => tree.remove_file(path).map(|()| Outcome::Done),
            Operation::Stat { path } => tree.stat(path).map(|stat| Outcome::Stat {
                path: path.clone(),
                stat,
            }),
            Operation::Read { path } => tree.read_file(path).map(|contents| Outcome::Contents {
                path: path.clone(),
                contents: contents.to_vec(),
            }),
            Operation::ReplaceContents { path, contents } => {
                return tree
                    .replace_file_contents(path, contents.clone())
                    .map(|previous| Outcome::Replaced {
                        path: path.clone(),
                        previous,
                    })
                    .context(NoFileToReplaceSnafu { path: path.as_str() });
            }
        };

        result.context(TreeOperationSnafu {
            operation: self.to_string(),
        })
    }
}

impl Outcome {
    /// A line worth printing for the operation, if any.
    pub fn report(&self) -> Option<String> {
        match self {
            Outcome::Done => None,
            Outcome::Stat { path, stat } => Some(format!("{path}: {stat}")),
            Outcome::Contents { path, contents } => {
                Some(format!("{path}: {}", String::from_utf8_lossy(contents)))
            }
            Outcome::Replaced { path, previous } => {
                Some(format!("{path}: replaced {} bytes", previous.len()))
            }
        }
    }
}

#[derive(Debug, Snafu)]
pub enum OperationError {
    #[snafu(display("Operation '{}' failed", operation))]
    TreeOperationError { operation: String, source: TreeError },
    #[snafu(display("No file at '{}' to replace", path))]
    NoFileToReplace { path: String },
}
