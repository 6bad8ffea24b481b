use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

pub const DEFAULT_DATA_DIR: &str = "data";

#[derive(Parser, Debug)]
#[command(
    name = "nucc",
    version,
    about = "NUCC provider taxonomy hierarchy builder and lineage verifier"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Flatten a saved taxonomy tree into the ancestor closure table.
    Closure(ClosureArgs),
    /// Outer-join scraped and reference node tables into the unified table.
    Merge(MergeArgs),
    /// Check the built-in lineages against the closure and merged tables.
    Verify(VerifyArgs),
    /// Report which pipeline files exist and summarize the last merge.
    Status(StatusArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ClosureArgs {
    #[arg(long, default_value = DEFAULT_DATA_DIR)]
    pub data_dir: PathBuf,

    /// Saved taxonomy page (HTML) or treenodes JSON document.
    #[arg(long)]
    pub tree_path: PathBuf,

    #[arg(long)]
    pub output_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct MergeArgs {
    #[arg(long, default_value = DEFAULT_DATA_DIR)]
    pub data_dir: PathBuf,

    #[arg(long)]
    pub scraped_path: Option<PathBuf>,

    #[arg(long)]
    pub reference_path: Option<PathBuf>,

    #[arg(long)]
    pub closure_path: Option<PathBuf>,

    #[arg(long)]
    pub output_path: Option<PathBuf>,

    #[arg(long)]
    pub manifest_path: Option<PathBuf>,

    /// Directory for the per-status subset tables.
    #[arg(long)]
    pub subsets_dir: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct VerifyArgs {
    #[arg(long, default_value = DEFAULT_DATA_DIR)]
    pub data_dir: PathBuf,

    #[arg(long)]
    pub closure_path: Option<PathBuf>,

    #[arg(long)]
    pub merged_path: Option<PathBuf>,

    /// JSON array of lineages (child first) replacing the built-in set.
    #[arg(long)]
    pub lineages_path: Option<PathBuf>,
}

impl Default for VerifyArgs {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            closure_path: None,
            merged_path: None,
            lineages_path: None,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, default_value = DEFAULT_DATA_DIR)]
    pub data_dir: PathBuf,
}
