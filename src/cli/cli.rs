use std::path::PathBuf;

use clap::Parser;

use crate::application::data::LogLevel;

/// Builds an in-memory file tree from a YAML manifest and prints its listing.
#[derive(Parser, Debug, Clone)]
#[command(version)]
pub struct Cli {
    /// The YAML manifest listing the operations to apply
    pub manifest: PathBuf,
    #[clap(long, short, default_value = "warn", value_enum)]
    pub log_level: LogLevel,

    /// Maximum number of nodes the tree may hold; overrides the manifest
    #[clap(long)]
    pub node_limit: Option<usize>,

    /// Verify the tree's invariants after every mutating operation
    #[clap(long)]
    pub check: bool,

    /// Stop at the first failing operation instead of skipping it
    #[clap(long)]
    pub strict: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::RuntimeConfig;

    #[test]
    fn parses_flags_into_runtime_config() {
        let cli = Cli::try_parse_from([
            "filetree",
            "tree.yaml",
            "--node-limit",
            "16",
            "--check",
            "-l",
            "debug",
        ])
        .expect("Valid arguments");
        assert!(matches!(cli.log_level, LogLevel::Debug));

        let config: RuntimeConfig = cli.into();
        assert_eq!(config.manifest, PathBuf::from("tree.yaml"));
        assert_eq!(config.node_limit, Some(16));
        assert!(config.check);
        assert!(!config.strict);
    }

    #[test]
    fn manifest_is_required() {
        assert!(Cli::try_parse_from(["filetree"]).is_err());
    }
}
