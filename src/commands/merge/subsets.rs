use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};

use crate::model::{
    MERGE_STATUS_COLUMN, MergeStatus, NodeId, REFERENCE_CODE_COLUMN, SCRAPED_CODE_COLUMN,
};
use crate::table::Table;

use super::join::{MergeOutcome, REFERENCE_PREFIX, SCRAPED_PREFIX};

/// Per-status slices of one merge. Single-source subsets carry the unmodified
/// source rows, prefixed the same way as the merged table.
#[derive(Debug, Clone)]
pub struct MergeSubsets {
    pub in_both: Table,
    pub only_in_reference: Table,
    pub only_in_scraped: Table,
}

pub fn split_subsets(
    outcome: &MergeOutcome,
    scraped: &Table,
    reference: &Table,
) -> Result<MergeSubsets> {
    let merged = &outcome.table;
    let status_column = merged
        .require_column(MERGE_STATUS_COLUMN)
        .context("merged table has no merge status")?;

    let mut in_both = Table::new(merged.headers().to_vec());
    for row in merged.rows() {
        if merged.cell(row, status_column) == Some(MergeStatus::Matched.as_str()) {
            in_both.push_row(row.clone())?;
        }
    }

    Ok(MergeSubsets {
        in_both,
        only_in_reference: source_subset(
            reference,
            &outcome.reference_only_rows,
            REFERENCE_PREFIX,
            REFERENCE_CODE_COLUMN,
        )?,
        only_in_scraped: source_subset(
            scraped,
            &outcome.scraped_only_rows,
            SCRAPED_PREFIX,
            SCRAPED_CODE_COLUMN,
        )?,
    })
}

fn source_subset(
    source: &Table,
    rows: &[usize],
    prefix: &str,
    join_column: &str,
) -> Result<Table> {
    let headers = source
        .headers()
        .iter()
        .map(|header| {
            if header == join_column {
                header.clone()
            } else {
                format!("{prefix}{header}")
            }
        })
        .collect();

    let mut subset = Table::new(headers);
    for index in rows {
        let row = source
            .rows()
            .get(*index)
            .with_context(|| format!("source row {index} out of range"))?;
        subset.push_row(row.clone())?;
    }
    Ok(subset)
}

pub fn write_summary<W: Write>(
    output: &mut W,
    outcome: &MergeOutcome,
    scraped_path: &Path,
    reference_path: &Path,
) -> io::Result<()> {
    let counts = &outcome.counts;

    writeln!(output, "NUCC Data Comparison Summary")?;
    writeln!(output, "{}", "=".repeat(40))?;
    writeln!(output)?;
    writeln!(output, "Downloaded dataset: {}", reference_path.display())?;
    writeln!(output, "Scraped dataset: {}", scraped_path.display())?;
    writeln!(output)?;
    writeln!(output, "Total records in merged dataset: {}", counts.total)?;
    writeln!(output, "Records in both datasets: {}", counts.matched)?;
    writeln!(output, "Records only in downloaded dataset: {}", counts.reference_only)?;
    writeln!(output, "Records only in scraped dataset: {}", counts.scraped_only)?;
    writeln!(output)?;
    writeln!(output, "Root nodes: {}", counts.roots)?;
    writeln!(output, "Ambiguous parents: {}", counts.ambiguous_parents)?;
    writeln!(output, "Scraped nodes missing from closure: {}", counts.missing_from_closure)?;
    writeln!(
        output,
        "Closure ids missing from merged data: {}",
        outcome.closure_ids_missing_from_merge.len()
    )?;

    if !outcome.sample_reference_only_codes.is_empty() {
        writeln!(output)?;
        writeln!(output, "Sample codes only in downloaded dataset:")?;
        for code in &outcome.sample_reference_only_codes {
            writeln!(output, "  - {code}")?;
        }
    }

    if !outcome.sample_scraped_only_ids.is_empty() {
        writeln!(output)?;
        writeln!(output, "Sample codes only in scraped dataset:")?;
        for id in &outcome.sample_scraped_only_ids {
            writeln!(output, "  - {id}")?;
        }
    }

    Ok(())
}

/// Complete list, one id per line. Written even when empty.
pub fn write_missing_ids<W: Write>(output: &mut W, ids: &[NodeId]) -> io::Result<()> {
    writeln!(output, "Closure ids missing from merged data:")?;
    writeln!(output, "{}", "=".repeat(50))?;
    writeln!(output)?;
    for id in ids {
        writeln!(output, "{id}")?;
    }
    Ok(())
}
