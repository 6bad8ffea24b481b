use std::io::{self, Write};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use tracing::{info, warn};

use crate::cli::VerifyArgs;
use crate::model::{AncestorEdge, CLOSURE_FILE_NAME, MERGED_FILE_NAME};
use crate::table::{Table, read_records};

mod check;
mod lineage;
mod report;
mod store;
mod structural_invariants;
#[cfg(test)]
mod tests;

use check::verify_lineages;
use lineage::{CodePattern, builtin_lineages, find_contradictions, load_lineages};
use report::write_report;
use store::LineageStore;
use structural_invariants::collect_structural_invariants;

pub fn run(args: VerifyArgs) -> Result<ExitCode> {
    let closure_path = args
        .closure_path
        .clone()
        .unwrap_or_else(|| args.data_dir.join(CLOSURE_FILE_NAME));
    let merged_path = args
        .merged_path
        .clone()
        .unwrap_or_else(|| args.data_dir.join(MERGED_FILE_NAME));

    let pattern = CodePattern::new()?;
    let lineages = match &args.lineages_path {
        Some(path) => load_lineages(path, &pattern)?,
        None => builtin_lineages(&pattern)?,
    };
    let contradictions = find_contradictions(&lineages);
    if let Some((first, second)) = contradictions.first() {
        bail!(
            "lineages contradict each other: {first} and {second} are each listed as the other's ancestor"
        );
    }

    let edges: Vec<AncestorEdge> = read_records(&closure_path)?;
    info!(path = %closure_path.display(), edges = edges.len(), "loaded closure table");
    let nodes = Table::read_csv(&merged_path)?;
    info!(path = %merged_path.display(), rows = nodes.len(), "loaded merged node table");
    if nodes.is_empty() {
        bail!("{} has no rows", merged_path.display());
    }

    let store = LineageStore::load(&edges, &nodes)?;
    drop(nodes);
    drop(edges);

    let invariants = collect_structural_invariants(store.connection())?;
    if !invariants.is_clean() {
        for (name, count) in invariants.entries() {
            if count > 0 {
                warn!(invariant = name, count, "structural invariant violated");
            }
        }
    }

    let report = verify_lineages(&store, &lineages)?;
    let mut output = io::BufWriter::new(io::stdout().lock());
    write_report(&mut output, &report, &invariants).context("failed to write verification report")?;
    output.flush()?;

    info!(
        lineages = report.lineages.len(),
        passed = report.passed_count(),
        failed = report.failed_count(),
        "verification complete"
    );

    if report.all_passed() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
