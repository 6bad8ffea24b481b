use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cli::MergeArgs;
use crate::model::{
    AncestorEdge, CLOSURE_FILE_NAME, IN_BOTH_FILE_NAME, InputFingerprint,
    MERGE_MANIFEST_FILE_NAME, MERGED_FILE_NAME, MISSING_IDS_FILE_NAME, MergeManifest,
    ONLY_IN_REFERENCE_FILE_NAME, ONLY_IN_SCRAPED_FILE_NAME, REFERENCE_FILE_NAME,
    SCRAPED_FILE_NAME, SUBSETS_DIR_NAME, SUMMARY_FILE_NAME, StructuralIssue,
};
use crate::table::{Table, read_records};
use crate::util::{create_text_file, now_utc_string, sha256_file, write_json_pretty};

mod join;
mod parents;
mod subsets;

use join::{MergeOutcome, merge_tables};
use parents::ClosureIndex;
use subsets::{split_subsets, write_missing_ids, write_summary};

pub fn run(args: MergeArgs) -> Result<()> {
    let scraped_path = args
        .scraped_path
        .clone()
        .unwrap_or_else(|| args.data_dir.join(SCRAPED_FILE_NAME));
    let reference_path = args
        .reference_path
        .clone()
        .unwrap_or_else(|| args.data_dir.join(REFERENCE_FILE_NAME));
    let closure_path = args
        .closure_path
        .clone()
        .unwrap_or_else(|| args.data_dir.join(CLOSURE_FILE_NAME));
    let output_path = args
        .output_path
        .clone()
        .unwrap_or_else(|| args.data_dir.join(MERGED_FILE_NAME));
    let manifest_path = args
        .manifest_path
        .clone()
        .unwrap_or_else(|| args.data_dir.join(MERGE_MANIFEST_FILE_NAME));
    let subsets_dir = args
        .subsets_dir
        .clone()
        .unwrap_or_else(|| args.data_dir.join(SUBSETS_DIR_NAME));
    let summary_path = args.data_dir.join(SUMMARY_FILE_NAME);
    let missing_ids_path = args.data_dir.join(MISSING_IDS_FILE_NAME);

    let scraped = Table::read_csv(&scraped_path)?;
    info!(path = %scraped_path.display(), rows = scraped.len(), "loaded scraped node table");
    let reference = Table::read_csv(&reference_path)?;
    info!(path = %reference_path.display(), rows = reference.len(), "loaded reference node table");
    let edges: Vec<AncestorEdge> = read_records(&closure_path)?;
    let closure = ClosureIndex::from_edges(&edges);
    info!(
        path = %closure_path.display(),
        edges = edges.len(),
        nodes = closure.len(),
        "loaded closure table"
    );

    let outcome = merge_tables(&scraped, &reference, &closure)?;
    log_outcome(&outcome);

    outcome.table.write_csv(&output_path)?;
    info!(path = %output_path.display(), rows = outcome.table.len(), "wrote merged node table");

    let subsets = split_subsets(&outcome, &scraped, &reference)?;
    let mut subset_fingerprints = Vec::with_capacity(3);
    for (file_name, subset) in [
        (IN_BOTH_FILE_NAME, &subsets.in_both),
        (ONLY_IN_REFERENCE_FILE_NAME, &subsets.only_in_reference),
        (ONLY_IN_SCRAPED_FILE_NAME, &subsets.only_in_scraped),
    ] {
        let path = subsets_dir.join(file_name);
        subset.write_csv(&path)?;
        info!(path = %path.display(), rows = subset.len(), "wrote merge subset");
        subset_fingerprints.push(fingerprint(&path, subset.len())?);
    }

    let mut summary = create_text_file(&summary_path)?;
    write_summary(&mut summary, &outcome, &scraped_path, &reference_path)
        .and_then(|()| summary.flush())
        .with_context(|| format!("failed to write {}", summary_path.display()))?;
    info!(path = %summary_path.display(), "wrote comparison summary");

    let mut missing_ids = create_text_file(&missing_ids_path)?;
    write_missing_ids(&mut missing_ids, &outcome.closure_ids_missing_from_merge)
        .and_then(|()| missing_ids.flush())
        .with_context(|| format!("failed to write {}", missing_ids_path.display()))?;
    info!(
        path = %missing_ids_path.display(),
        ids = outcome.closure_ids_missing_from_merge.len(),
        "wrote closure ids missing from merge"
    );

    let manifest = MergeManifest {
        manifest_version: 1,
        generated_at: now_utc_string(),
        scraped: fingerprint(&scraped_path, scraped.len())?,
        reference: fingerprint(&reference_path, reference.len())?,
        closure: fingerprint(&closure_path, edges.len())?,
        output: fingerprint(&output_path, outcome.table.len())?,
        subsets: subset_fingerprints,
        counts: outcome.counts,
        structural_issues: outcome.issues,
        sample_reference_only_codes: outcome.sample_reference_only_codes,
        sample_scraped_only_ids: outcome.sample_scraped_only_ids,
        closure_ids_missing_from_merge: outcome.closure_ids_missing_from_merge,
    };
    write_json_pretty(&manifest_path, &manifest)?;
    info!(path = %manifest_path.display(), "wrote merge manifest");

    Ok(())
}

fn fingerprint(path: &Path, rows: usize) -> Result<InputFingerprint> {
    Ok(InputFingerprint {
        path: path.display().to_string(),
        sha256: sha256_file(path).with_context(|| format!("failed to fingerprint {}", path.display()))?,
        rows,
    })
}

fn log_outcome(outcome: &MergeOutcome) {
    info!(
        total = outcome.counts.total,
        matched = outcome.counts.matched,
        scraped_only = outcome.counts.scraped_only,
        reference_only = outcome.counts.reference_only,
        "merge results"
    );

    for issue in &outcome.issues {
        match issue {
            StructuralIssue::Root { node_id } => info!(node_id = %node_id, "root node"),
            StructuralIssue::AmbiguousParent { .. } | StructuralIssue::MissingFromClosure { .. } => {
                warn!(issue = %issue, "structural issue")
            }
        }
    }

    if outcome.closure_ids_missing_from_merge.is_empty() {
        info!("every closure node is present in the merged table");
    } else {
        warn!(
            missing = outcome.closure_ids_missing_from_merge.len(),
            sample = ?outcome.closure_ids_missing_from_merge.iter().take(20).collect::<Vec<_>>(),
            "closure nodes missing from merged table"
        );
    }
}
