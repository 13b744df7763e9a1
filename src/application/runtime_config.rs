use std::path::PathBuf;

use crate::cli::Cli;

#[derive(Debug, Clone, Default)]
pub struct RuntimeConfig {
    pub manifest: PathBuf,
    /// Overrides the manifest's `node_limit` when set.
    pub node_limit: Option<usize>,
    pub check: bool,
    pub strict: bool,
}

impl From<Cli> for RuntimeConfig {
    fn from(cli: Cli) -> Self {
        Self {
            manifest: cli.manifest,
            node_limit: cli.node_limit,
            check: cli.check,
            strict: cli.strict,
        }
    }
}
