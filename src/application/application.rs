use snafu::Report;
use snafu::prelude::*;
use tracing::{debug, info, warn};

use crate::application::RuntimeConfig;
use crate::checker;
use crate::config::{Manifest, ManifestError};
use crate::filesystem::{FileTree, TreeError};
use crate::operations::OperationError;

pub struct Application;

impl Application {
    pub async fn run(app_config: impl Into<RuntimeConfig>) -> Result<(), ApplicationError> {
        let app_config: RuntimeConfig = app_config.into();
        let manifest = Manifest::read(&app_config.manifest)
            .await
            .context(ManifestLoadSnafu)?;
        debug!("Loaded manifest: {:?}", manifest);

        let report = Self::execute(&manifest, &app_config)?;
        print!("{report}");

        Ok(())
    }

    /// Applies the manifest to a fresh tree. Returns one line per operation
    /// that reports something, followed by the final tree listing.
    pub fn execute(
        manifest: &Manifest,
        app_config: &RuntimeConfig,
    ) -> Result<String, ApplicationError> {
        let mut tree = match app_config.node_limit.or(manifest.node_limit) {
            Some(limit) => {
                debug!("Limiting the tree to {} nodes", limit);
                FileTree::with_node_limit(limit)
            }
            None => FileTree::new(),
        };
        tree.init().context(TreeLifecycleSnafu)?;

        let mut report = String::new();
        for operation in &manifest.operations {
            match operation.apply(&mut tree) {
                Ok(outcome) => {
                    debug!("Applied '{}'", operation);
                    if let Some(line) = outcome.report() {
                        report.push_str(&line);
                        report.push('\n');
                    }
                }
                Err(error) if app_config.strict => return Err(error).context(ApplySnafu),
                Err(error) => warn!("Skipping: {}", Report::from_error(&error)),
            }

            if app_config.check && operation.is_mutation() {
                ensure!(
                    checker::check(&tree),
                    CheckFailedSnafu {
                        operation: operation.to_string()
                    }
                );
            }
        }

        report.push_str(&tree.serialize().unwrap_or_default());
        info!("Final tree holds {} nodes", tree.count());
        tree.destroy().context(TreeLifecycleSnafu)?;

        Ok(report)
    }
}

#[derive(Debug, Snafu)]
pub enum ApplicationError {
    #[snafu(display("Critical failure encountered while loading the manifest"))]
    ManifestLoadError { source: ManifestError },
    #[snafu(display("Critical failure encountered while setting up the tree"))]
    TreeLifecycleError { source: TreeError },
    #[snafu(display("Critical failure encountered while applying operations"))]
    ApplyError { source: OperationError },
    #[snafu(display("Tree invariants are broken after '{}'", operation))]
    CheckFailed { operation: String },
}
