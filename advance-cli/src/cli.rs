use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Scout advancement checklist tracker")]
pub struct Cli {
    /// Path to the settings file (defaults to $ADVANCE_CONFIG or ~/.advance.config)
    #[clap(long)]
    pub config: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show how requirement numbers are parsed and ordered
    Number {
        /// One or more raw requirement numbers, e.g. 4a or 6A(a)(1)
        #[clap(required = true)]
        raw: Vec<String>,
    },

    /// Print a checklist as a tree with completion counts
    Tree {
        /// Checklist version file (YAML or JSON)
        checklist: PathBuf,

        /// Progress file to overlay on the tree
        #[clap(long)]
        progress: Option<PathBuf>,

        /// Collapse groups whose requirements are all complete
        #[clap(long, overrides_with = "no_collapse_completed")]
        collapse_completed: bool,

        /// Expand every group, even when the config collapses completed ones
        #[clap(long, overrides_with = "collapse_completed")]
        no_collapse_completed: bool,
    },

    /// Map completed requirements from one checklist version to another
    Reconcile {
        /// Checklist version the progress was recorded against
        from: PathBuf,

        /// Checklist version to map onto
        to: PathBuf,

        /// Progress file holding the completed requirements
        #[clap(long)]
        progress: Option<PathBuf>,

        /// Similarity a description match must exceed (0.0 - 1.0)
        #[clap(long)]
        threshold: Option<f64>,

        /// Output format
        #[clap(long, default_value = "table", value_parser = ["table", "json"])]
        format: String,
    },

    /// Reconcile, then rewrite the progress file against the new version
    Migrate {
        /// Checklist version the progress was recorded against
        from: PathBuf,

        /// Checklist version to migrate to
        to: PathBuf,

        /// Progress file to rewrite
        #[clap(long)]
        progress: Option<PathBuf>,

        /// Similarity a description match must exceed (0.0 - 1.0)
        #[clap(long)]
        threshold: Option<f64>,

        /// Skip confirmation prompt
        #[clap(long, short = 'y')]
        yes: bool,
    },

    /// Parse a plain-text scout history export
    Import {
        /// The exported history file
        file: PathBuf,

        /// Output format for the parsed data
        #[clap(long, default_value = "yaml", value_parser = ["yaml", "json"])]
        format: String,

        /// Print one rank or partial merit badge as a checklist and progress file
        #[clap(long)]
        checklist: Option<String>,
    },
}

/// Resolves a `--flag` / `--no-flag` pair against the configured value
pub fn flag_override(enable: bool, disable: bool, configured: bool) -> bool {
    match (enable, disable) {
        (true, _) => true,
        (_, true) => false,
        _ => configured,
    }
}
