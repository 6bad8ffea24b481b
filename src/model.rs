use std::fmt;

use serde::{Deserialize, Serialize};

pub const CLOSURE_FILE_NAME: &str = "nucc_parent_code.csv";
pub const SCRAPED_FILE_NAME: &str = "nucc_codes.csv";
pub const REFERENCE_FILE_NAME: &str = "nucc_taxonomy.csv";
pub const MERGED_FILE_NAME: &str = "merged_nucc_data.csv";
pub const MERGE_MANIFEST_FILE_NAME: &str = "merge_manifest.json";

pub const COMBINED_CODE_COLUMN: &str = "combined_code";
pub const MERGE_STATUS_COLUMN: &str = "merge_status";
pub const SCRAPED_ID_COLUMN: &str = "scraped_code_id";
pub const SCRAPED_SHORT_NAME_COLUMN: &str = "scraped_code_short_name";
pub const IMMEDIATE_PARENT_COLUMN: &str = "scraped_immediate_parent_code_id";
pub const REFERENCE_CODE_COLUMN: &str = "Code";
pub const SCRAPED_CODE_COLUMN: &str = "code_text";

pub const SUBSETS_DIR_NAME: &str = "subsets_from_merge";
pub const IN_BOTH_FILE_NAME: &str = "in_both_datasets.csv";
pub const ONLY_IN_REFERENCE_FILE_NAME: &str = "only_in_downloaded.csv";
pub const ONLY_IN_SCRAPED_FILE_NAME: &str = "only_in_scrapped.csv";
pub const SUMMARY_FILE_NAME: &str = "nucc_comparison_summary.txt";
pub const MISSING_IDS_FILE_NAME: &str = "missing_codes.txt";

/// Identifier of a node in the scraped tree (the site's `nid`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Builds an id from a raw cell, folding float formatting.
    pub fn parse(raw: &str) -> Self {
        Self(normalize_node_id(raw))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Spreadsheet round-trips turn integer ids into `2496.0`; fold those back.
pub fn normalize_node_id(raw: &str) -> String {
    let value = raw.trim();
    match value.strip_suffix(".0") {
        Some(integer) if !integer.is_empty() && integer.bytes().all(|b| b.is_ascii_digit()) => {
            integer.to_string()
        }
        _ => value.to_string(),
    }
}

/// One row of the closure table. Every node is its own ancestor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AncestorEdge {
    #[serde(rename = "ancestor_nucc_code_id")]
    pub ancestor: NodeId,
    #[serde(rename = "child_nucc_code_id")]
    pub descendant: NodeId,
}

impl AncestorEdge {
    pub fn new(ancestor: NodeId, descendant: NodeId) -> Self {
        Self {
            ancestor,
            descendant,
        }
    }

    pub fn is_reflexive(&self) -> bool {
        self.ancestor == self.descendant
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStatus {
    Matched,
    ScrapedOnly,
    ReferenceOnly,
}

impl MergeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Matched => "matched",
            Self::ScrapedOnly => "scraped_only",
            Self::ReferenceOnly => "reference_only",
        }
    }
}

/// Tree-shape problem found while deriving immediate parents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StructuralIssue {
    Root {
        node_id: NodeId,
    },
    AmbiguousParent {
        node_id: NodeId,
        candidates: Vec<NodeId>,
    },
    MissingFromClosure {
        node_id: NodeId,
    },
}

impl fmt::Display for StructuralIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root { node_id } => write!(f, "node {node_id} has no strict ancestor (root)"),
            Self::AmbiguousParent {
                node_id,
                candidates,
            } => {
                write!(f, "node {node_id} has several nearest ancestors: ")?;
                for (i, candidate) in candidates.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{candidate}")?;
                }
                Ok(())
            }
            Self::MissingFromClosure { node_id } => {
                write!(f, "node {node_id} does not appear in the closure table")
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputFingerprint {
    pub path: String,
    pub sha256: String,
    pub rows: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MergeCounts {
    pub total: usize,
    pub matched: usize,
    pub scraped_only: usize,
    pub reference_only: usize,
    pub roots: usize,
    pub ambiguous_parents: usize,
    pub missing_from_closure: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct MergeManifest {
    pub manifest_version: u32,
    pub generated_at: String,
    pub scraped: InputFingerprint,
    pub reference: InputFingerprint,
    pub closure: InputFingerprint,
    pub output: InputFingerprint,
    pub subsets: Vec<InputFingerprint>,
    pub counts: MergeCounts,
    pub structural_issues: Vec<StructuralIssue>,
    pub sample_reference_only_codes: Vec<String>,
    pub sample_scraped_only_ids: Vec<String>,
    pub closure_ids_missing_from_merge: Vec<NodeId>,
}

/// Subset of the merge manifest read back by `status`.
#[derive(Debug, Clone, Deserialize)]
pub struct MergeManifestSummary {
    pub generated_at: String,
    pub counts: MergeCounts,
    #[serde(default)]
    pub closure_ids_missing_from_merge: Vec<NodeId>,
}
