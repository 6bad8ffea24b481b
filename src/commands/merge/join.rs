use std::collections::{BTreeMap, BTreeSet};

use anyhow::{Context, Result, bail};

use crate::model::{
    COMBINED_CODE_COLUMN, IMMEDIATE_PARENT_COLUMN, MERGE_STATUS_COLUMN, MergeCounts, MergeStatus,
    NodeId, REFERENCE_CODE_COLUMN, SCRAPED_CODE_COLUMN, StructuralIssue, normalize_node_id,
};
use crate::table::Table;

use super::parents::{ClosureIndex, ParentLookup};

pub const REFERENCE_PREFIX: &str = "download_";
pub const SCRAPED_PREFIX: &str = "scraped_";
pub const SCRAPED_ID_SOURCE_COLUMN: &str = "code_id";
/// Parent column some scraper runs already carry; always recomputed here.
pub const STALE_PARENT_SOURCE_COLUMN: &str = "immediate_parent_code_id";

const SAMPLE_LIMIT: usize = 10;

#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub table: Table,
    pub counts: MergeCounts,
    pub issues: Vec<StructuralIssue>,
    pub sample_reference_only_codes: Vec<String>,
    pub sample_scraped_only_ids: Vec<String>,
    /// Source row indices of reference rows with no scraped counterpart.
    pub reference_only_rows: Vec<usize>,
    /// Source row indices of scraped rows with no reference counterpart.
    pub scraped_only_rows: Vec<usize>,
    /// Sorted numerically where the ids are integers.
    pub closure_ids_missing_from_merge: Vec<NodeId>,
}

#[derive(Debug)]
struct JoinedRow {
    combined_code: String,
    scraped_id: String,
    status: MergeStatus,
    reference_row: Option<usize>,
    scraped_row: Option<usize>,
}

pub fn merge_tables(scraped: &Table, reference: &Table, closure: &ClosureIndex) -> Result<MergeOutcome> {
    let reference_code = reference
        .require_column(REFERENCE_CODE_COLUMN)
        .context("reference table is missing its join column")?;
    let scraped_code = scraped
        .require_column(SCRAPED_CODE_COLUMN)
        .context("scraped table is missing its join column")?;
    let scraped_id = scraped
        .require_column(SCRAPED_ID_SOURCE_COLUMN)
        .context("scraped table is missing its node id column")?;

    let reference_columns = (0..reference.headers().len())
        .filter(|index| *index != reference_code)
        .collect::<Vec<usize>>();
    let scraped_columns = (0..scraped.headers().len())
        .filter(|index| *index != scraped_code)
        .filter(|index| scraped.headers()[*index] != STALE_PARENT_SOURCE_COLUMN)
        .collect::<Vec<usize>>();

    let mut reference_by_code: BTreeMap<&str, usize> = BTreeMap::new();
    for (index, row) in reference.rows().iter().enumerate() {
        let Some(code) = reference.cell(row, reference_code) else {
            continue;
        };
        if reference_by_code.insert(code, index).is_some() {
            bail!("reference table lists code {code} more than once");
        }
    }

    let mut joined = Vec::with_capacity(scraped.len() + reference.len());
    let mut matched_reference_rows = BTreeSet::new();
    let mut seen_scraped_codes = BTreeSet::new();
    let mut seen_scraped_ids = BTreeSet::new();

    for (index, row) in scraped.rows().iter().enumerate() {
        let id = scraped
            .cell(row, scraped_id)
            .map(normalize_node_id)
            .with_context(|| format!("scraped row {} has no {SCRAPED_ID_SOURCE_COLUMN}", index + 1))?;
        if !seen_scraped_ids.insert(id.clone()) {
            bail!("scraped table lists node id {id} more than once");
        }

        let code = scraped.cell(row, scraped_code);
        if let Some(code) = code {
            if !seen_scraped_codes.insert(code) {
                bail!("scraped table lists code {code} more than once");
            }
        }

        let reference_row = code.and_then(|code| reference_by_code.get(code).copied());
        if let Some(reference_row) = reference_row {
            matched_reference_rows.insert(reference_row);
        }

        joined.push(JoinedRow {
            combined_code: code.unwrap_or_default().to_string(),
            scraped_id: id,
            status: if reference_row.is_some() {
                MergeStatus::Matched
            } else {
                MergeStatus::ScrapedOnly
            },
            reference_row,
            scraped_row: Some(index),
        });
    }

    for (index, row) in reference.rows().iter().enumerate() {
        if matched_reference_rows.contains(&index) {
            continue;
        }
        joined.push(JoinedRow {
            combined_code: reference
                .cell(row, reference_code)
                .unwrap_or_default()
                .to_string(),
            scraped_id: String::new(),
            status: MergeStatus::ReferenceOnly,
            reference_row: Some(index),
            scraped_row: None,
        });
    }

    joined.sort_by(|a, b| {
        a.combined_code
            .cmp(&b.combined_code)
            .then_with(|| a.scraped_id.cmp(&b.scraped_id))
            .then_with(|| a.reference_row.cmp(&b.reference_row))
    });

    let mut headers = vec![
        COMBINED_CODE_COLUMN.to_string(),
        MERGE_STATUS_COLUMN.to_string(),
    ];
    headers.extend(
        reference_columns
            .iter()
            .map(|index| format!("{REFERENCE_PREFIX}{}", reference.headers()[*index])),
    );
    headers.extend(
        scraped_columns
            .iter()
            .map(|index| format!("{SCRAPED_PREFIX}{}", scraped.headers()[*index])),
    );
    headers.push(IMMEDIATE_PARENT_COLUMN.to_string());
    headers.push(REFERENCE_CODE_COLUMN.to_string());
    headers.push(SCRAPED_CODE_COLUMN.to_string());

    let mut table = Table::new(headers);
    let mut counts = MergeCounts::default();
    let mut issues = Vec::new();
    let mut sample_reference_only_codes = Vec::new();
    let mut sample_scraped_only_ids = Vec::new();
    let mut reference_only_rows = Vec::new();
    let mut scraped_only_rows = Vec::new();

    for row in &joined {
        let reference_values = row.reference_row.map(|index| &reference.rows()[index]);
        let scraped_values = row.scraped_row.map(|index| &scraped.rows()[index]);

        let parent = if row.scraped_id.is_empty() {
            String::new()
        } else {
            let node_id = NodeId::new(row.scraped_id.as_str());
            match closure.immediate_parent(&node_id) {
                ParentLookup::Parent(parent) => parent.0,
                ParentLookup::Root => {
                    counts.roots += 1;
                    issues.push(StructuralIssue::Root { node_id });
                    String::new()
                }
                ParentLookup::Ambiguous(candidates) => {
                    counts.ambiguous_parents += 1;
                    issues.push(StructuralIssue::AmbiguousParent {
                        node_id,
                        candidates,
                    });
                    String::new()
                }
                ParentLookup::Unknown => {
                    counts.missing_from_closure += 1;
                    issues.push(StructuralIssue::MissingFromClosure { node_id });
                    String::new()
                }
            }
        };

        let mut values = Vec::with_capacity(table.headers().len());
        values.push(row.combined_code.clone());
        values.push(row.status.as_str().to_string());
        values.extend(
            reference_columns
                .iter()
                .map(|index| reference_values.map(|r| r[*index].clone()).unwrap_or_default()),
        );
        values.extend(scraped_columns.iter().map(|index| {
            if *index == scraped_id {
                row.scraped_id.clone()
            } else {
                scraped_values.map(|r| r[*index].clone()).unwrap_or_default()
            }
        }));
        values.push(parent);
        values.push(
            reference_values
                .and_then(|r| reference.cell(r, reference_code))
                .unwrap_or_default()
                .to_string(),
        );
        values.push(
            scraped_values
                .and_then(|r| scraped.cell(r, scraped_code))
                .unwrap_or_default()
                .to_string(),
        );
        table.push_row(values)?;

        match row.status {
            MergeStatus::Matched => counts.matched += 1,
            MergeStatus::ScrapedOnly => {
                counts.scraped_only += 1;
                scraped_only_rows.extend(row.scraped_row);
                if sample_scraped_only_ids.len() < SAMPLE_LIMIT {
                    sample_scraped_only_ids.push(row.scraped_id.clone());
                }
            }
            MergeStatus::ReferenceOnly => {
                counts.reference_only += 1;
                reference_only_rows.extend(row.reference_row);
                if sample_reference_only_codes.len() < SAMPLE_LIMIT {
                    sample_reference_only_codes.push(row.combined_code.clone());
                }
            }
        }
    }
    counts.total = table.len();

    let merged_ids = joined
        .iter()
        .filter(|row| !row.scraped_id.is_empty())
        .map(|row| row.scraped_id.as_str())
        .collect::<BTreeSet<&str>>();
    let mut closure_ids_missing_from_merge = closure
        .node_ids()
        .filter(|id| !merged_ids.contains(id.as_str()))
        .cloned()
        .collect::<Vec<NodeId>>();
    closure_ids_missing_from_merge.sort_by_key(numeric_order);
    reference_only_rows.sort_unstable();
    scraped_only_rows.sort_unstable();

    Ok(MergeOutcome {
        table,
        counts,
        issues,
        sample_reference_only_codes,
        sample_scraped_only_ids,
        reference_only_rows,
        scraped_only_rows,
        closure_ids_missing_from_merge,
    })
}

/// Integer ids first in numeric order, then everything else by text.
fn numeric_order(id: &NodeId) -> (bool, u64, String) {
    match id.as_str().parse::<u64>() {
        Ok(number) => (false, number, String::new()),
        Err(_) => (true, 0, id.0.clone()),
    }
}
