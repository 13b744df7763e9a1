use std::borrow::Cow;
use std::path::{Path, PathBuf};

use compio::fs;
use hashlink::LinkedHashMap;
use saphyr::{LoadableYamlNode, Scalar, Yaml};
use snafu::prelude::*;
use tracing::{debug, warn};

use crate::operations::Operation;

/// A YAML description of a tree to build:
///
/// ```yaml
/// node_limit: 64
/// operations:
///   - type: mkdir
///     path: /root/docs
///   - type: file
///     path: /root/docs/readme
///     contents: "hello"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    pub node_limit: Option<usize>,
    pub operations: Vec<Operation>,
}

fn key(name: &'static str) -> Yaml<'static> {
    Yaml::Value(Scalar::String(Cow::Borrowed(name)))
}

impl Manifest {
    pub async fn read(path: &Path) -> Result<Self, ManifestError> {
        debug!("Reading manifest file: {}", path.display());
        let bytes = fs::read(path).await.context(ReadSnafu {
            file_path: path.to_path_buf(),
        })?;
        debug!("Successfully read manifest file: {} bytes", bytes.len());

        let contents = String::from_utf8(bytes).context(EncodingSnafu {
            file_path: path.to_path_buf(),
        })?;
        contents.as_str().try_into()
    }

    fn parse_node_limit(
        top_level: &LinkedHashMap<Yaml, Yaml>,
    ) -> Result<Option<usize>, ManifestError> {
        match top_level.get(&key("node_limit")) {
            None | Some(Yaml::Value(Scalar::Null)) => Ok(None),
            Some(Yaml::Value(Scalar::Integer(limit))) => usize::try_from(*limit)
                .ok()
                .context(InvalidNodeLimitSnafu)
                .map(Some),
            Some(_) => InvalidNodeLimitSnafu.fail(),
        }
    }

    fn parse_operations(
        top_level: &LinkedHashMap<Yaml, Yaml>,
    ) -> Result<Vec<Operation>, ManifestError> {
        let operations = top_level
            .get(&key("operations"))
            .unwrap_or(&Yaml::Sequence(Vec::new()))
            .as_sequence()
            .context(OperationsNotSequenceSnafu)?
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| {
                if let Yaml::Mapping(data) = entry {
                    return Some((index, data));
                }
                warn!("Skipping operation #{}: expected a map, got {:?}", index, entry);
                None
            })
            .filter_map(|(index, data)| Operation::from_operation_yaml(index, data))
            .collect::<Vec<_>>();

        Ok(operations)
    }
}

impl TryFrom<&str> for Manifest {
    type Error = ManifestError;

    fn try_from(contents: &str) -> Result<Self, Self::Error> {
        let documents = Yaml::load_from_str(contents).context(ParseSnafu)?;
        let document = documents.first().context(MalformedManifestSnafu)?;
        let top_level = document.as_mapping().context(TopLevelNotMapSnafu)?;

        let manifest = Manifest {
            node_limit: Self::parse_node_limit(top_level)?,
            operations: Self::parse_operations(top_level)?,
        };
        debug!(
            "Parsed manifest with {} operations",
            manifest.operations.len()
        );
        Ok(manifest)
    }
}

#[derive(Debug, Snafu)]
pub enum ManifestError {
    #[snafu(display("Failed to read the manifest file: {}", file_path.display()))]
    ReadError {
        file_path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("Manifest file {} is not valid UTF-8", file_path.display()))]
    EncodingError {
        file_path: PathBuf,
        source: std::string::FromUtf8Error,
    },
    #[snafu(display("Failed to parse the manifest"))]
    ParseError { source: saphyr::ScanError },
    #[snafu(display("Improperly formatted manifest"))]
    MalformedManifest,
    #[snafu(display("Top level of the manifest should be a map"))]
    TopLevelNotMap,
    #[snafu(display("Operations section should be a sequence"))]
    OperationsNotSequence,
    #[snafu(display("node_limit should be a non-negative integer"))]
    InvalidNodeLimit,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[compio::test]
    async fn manifest_returns_error_on_nonexistent_file() {
        let result = Manifest::read(Path::new("nonexistent.yaml")).await;
        assert!(matches!(result, Err(ManifestError::ReadError { .. })));
    }

    #[compio::test]
    async fn manifest_reads_from_file() {
        let mut file = NamedTempFile::new().expect("Failed to create temp file");
        write!(
            file,
            "node_limit: 8\noperations:\n  - type: mkdir\n    path: /a\n"
        )
        .expect("Failed to write manifest");

        let manifest = Manifest::read(file.path())
            .await
            .expect("Failed to read manifest");
        assert_eq!(manifest.node_limit, Some(8));
        assert_eq!(
            manifest.operations,
            vec![Operation::MakeDirectory { path: "/a".into() }]
        );
    }

    #[compio::test]
    async fn manifest_rejects_invalid_utf8() {
        let mut file = NamedTempFile::new().expect("Failed to create temp file");
        file.write_all(&[0xff, 0xfe, 0x00])
            .expect("Failed to write manifest");

        let result = Manifest::read(file.path()).await;
        assert!(matches!(result, Err(ManifestError::EncodingError { .. })));
    }

    #[test]
    fn manifest_returns_error_on_invalid_yaml() {
        let result: Result<Manifest, _> = "invalid: yaml: content: [unclosed".try_into();
        assert!(matches!(result, Err(ManifestError::ParseError { .. })));
    }

    #[test]
    fn manifest_returns_error_on_empty_file() {
        let result: Result<Manifest, _> = "".try_into();
        assert!(matches!(result, Err(ManifestError::MalformedManifest)));
    }

    #[test]
    fn manifest_returns_error_when_top_level_is_not_map() {
        let result: Result<Manifest, _> = "- item1\n- item2".try_into();
        assert!(matches!(result, Err(ManifestError::TopLevelNotMap)));
    }

    #[test]
    fn manifest_returns_error_when_operations_is_not_sequence() {
        let result: Result<Manifest, _> = "operations:\n  mkdir: /a".try_into();
        assert!(matches!(result, Err(ManifestError::OperationsNotSequence)));
    }

    #[test]
    fn manifest_rejects_negative_node_limit() {
        let result: Result<Manifest, _> = "node_limit: -1".try_into();
        assert!(matches!(result, Err(ManifestError::InvalidNodeLimit)));

        let result: Result<Manifest, _> = "node_limit: lots".try_into();
        assert!(matches!(result, Err(ManifestError::InvalidNodeLimit)));
    }

    #[test]
    fn manifest_handles_missing_sections() {
        let manifest: Manifest = "other: value".try_into().expect("Valid manifest");
        assert_eq!(manifest, Manifest::default());
    }

    #[test]
    fn manifest_skips_invalid_operations_and_keeps_order() {
        let yaml = r#"
operations:
  - type: mkdir
    path: /root
  - "not a map"
  - type: teleport
    path: /root/x
  - type: file
    path: /root/readme
    contents: "hello"
  - type: rmdir
    path: /root
"#;
        let manifest: Manifest = yaml.try_into().expect("Valid manifest");
        assert_eq!(
            manifest.operations,
            vec![
                Operation::MakeDirectory {
                    path: "/root".into()
                },
                Operation::WriteFile {
                    path: "/root/readme".into(),
                    contents: b"hello".to_vec()
                },
                Operation::RemoveDirectory {
                    path: "/root".into()
                },
            ]
        );
    }

    #[test]
    fn manifest_handles_unicode_paths() {
        let yaml = "operations:\n  - type: mkdir\n    path: \"/тест/🚀\"\n";
        let manifest: Manifest = yaml.try_into().expect("Valid manifest");
        assert_eq!(manifest.operations[0].path(), "/тест/🚀");
    }
}
