use std::fs;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cli::ClosureArgs;
use crate::model::CLOSURE_FILE_NAME;
use crate::table::write_records;

mod extract;
mod tree;

use extract::{build_closure, default_ignored_ids};
use tree::parse_tree_source;

pub fn run(args: ClosureArgs) -> Result<()> {
    let output_path = args
        .output_path
        .clone()
        .unwrap_or_else(|| args.data_dir.join(CLOSURE_FILE_NAME));

    info!(tree = %args.tree_path.display(), "reading taxonomy tree");
    let raw = fs::read_to_string(&args.tree_path)
        .with_context(|| format!("failed to read {}", args.tree_path.display()))?;
    let records = parse_tree_source(&raw)
        .with_context(|| format!("failed to parse tree source {}", args.tree_path.display()))?;
    info!(records = records.len(), "parsed tree nodes");

    let outcome = build_closure(&records, &default_ignored_ids())
        .context("taxonomy tree violates the tree invariant")?;

    if outcome.ignored_count > 0 {
        info!(ignored = outcome.ignored_count, "skipped commentary nodes");
    }
    for node_id in &outcome.detached {
        let name = records
            .iter()
            .find(|record| record.id == *node_id)
            .map(|record| record.name.as_str())
            .unwrap_or_default();
        warn!(node_id = %node_id, name, "parent not present in tree; treating node as top level");
    }

    write_records(&output_path, &outcome.edges)?;
    info!(
        path = %output_path.display(),
        nodes = outcome.node_count,
        edges = outcome.edges.len(),
        "wrote closure table"
    );

    Ok(())
}
