use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::model::{
    CLOSURE_FILE_NAME, MERGE_MANIFEST_FILE_NAME, MERGED_FILE_NAME, MergeManifestSummary,
    REFERENCE_FILE_NAME, SCRAPED_FILE_NAME,
};
use crate::table::Table;

const PIPELINE_TABLES: [(&str, &str); 4] = [
    ("closure", CLOSURE_FILE_NAME),
    ("scraped", SCRAPED_FILE_NAME),
    ("reference", REFERENCE_FILE_NAME),
    ("merged", MERGED_FILE_NAME),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableStatus {
    pub label: &'static str,
    pub path: PathBuf,
    pub rows: Option<usize>,
}

pub fn run(args: StatusArgs) -> Result<()> {
    info!(data_dir = %args.data_dir.display(), "status requested");

    for status in collect_table_status(&args.data_dir)? {
        match status.rows {
            Some(rows) => info!(
                table = status.label,
                path = %status.path.display(),
                rows,
                "table present"
            ),
            None => warn!(table = status.label, path = %status.path.display(), "table missing"),
        }
    }

    let manifest_path = args.data_dir.join(MERGE_MANIFEST_FILE_NAME);
    match read_merge_manifest(&manifest_path)? {
        Some(manifest) => info!(
            generated_at = %manifest.generated_at,
            total = manifest.counts.total,
            matched = manifest.counts.matched,
            scraped_only = manifest.counts.scraped_only,
            reference_only = manifest.counts.reference_only,
            roots = manifest.counts.roots,
            ambiguous_parents = manifest.counts.ambiguous_parents,
            missing_from_closure = manifest.counts.missing_from_closure,
            closure_ids_missing_from_merge = manifest.closure_ids_missing_from_merge.len(),
            "loaded merge manifest"
        ),
        None => warn!(path = %manifest_path.display(), "merge manifest missing"),
    }

    Ok(())
}

pub fn collect_table_status(data_dir: &Path) -> Result<Vec<TableStatus>> {
    PIPELINE_TABLES
        .iter()
        .map(|(label, file_name)| {
            let path = data_dir.join(file_name);
            let rows = if path.exists() {
                Some(Table::read_csv(&path)?.len())
            } else {
                None
            };
            Ok(TableStatus {
                label: *label,
                path,
                rows,
            })
        })
        .collect()
}

fn read_merge_manifest(path: &Path) -> Result<Option<MergeManifestSummary>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let manifest = serde_json::from_slice(&raw)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(Some(manifest))
}
