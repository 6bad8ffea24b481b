use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use regex::Regex;

/// Ten characters: three digits, six alphanumerics, trailing `X`.
pub const TAXONOMY_CODE_PATTERN: &str = r"^[0-9]{3}[0-9A-Z]{6}X$";

/// Known-correct ancestry, child first. Labels are resolved by name at run
/// time so the lookup path is exercised rather than assumed.
pub const BUILTIN_LINEAGES: [&[&str]; 5] = [
    &[
        "261QA1903X",
        "261Q00000X",
        "Ambulatory Health Care Facilities",
        "Non-individual",
    ],
    &["273100000X", "Hospital Units", "Non-individual"],
    &["281PC2000X", "281P00000X", "Hospitals", "Non-individual"],
    &[
        "207NP0225X",
        "207N00000X",
        "Allopathic & Osteopathic Physicians",
        "Individual or Groups (of Individuals)",
    ],
    &[
        "101YM0800X",
        "101Y00000X",
        "Behavioral Health & Social Service Providers",
        "Individual or Groups (of Individuals)",
    ],
];

pub struct CodePattern(Regex);

impl CodePattern {
    pub fn new() -> Result<Self> {
        Regex::new(TAXONOMY_CODE_PATTERN)
            .map(Self)
            .context("failed to compile taxonomy code regex")
    }

    pub fn is_code(&self, value: &str) -> bool {
        self.0.is_match(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LineageElement {
    Code(String),
    Label(String),
}

impl LineageElement {
    pub fn classify(raw: &str, pattern: &CodePattern) -> Self {
        let value = raw.trim();
        if pattern.is_code(value) {
            Self::Code(value.to_string())
        } else {
            Self::Label(value.to_string())
        }
    }
}

impl fmt::Display for LineageElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Code(code) => f.write_str(code),
            Self::Label(label) => write!(f, "\"{label}\""),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineageAssertion {
    pub elements: Vec<LineageElement>,
}

impl LineageAssertion {
    pub fn parse<S: AsRef<str>>(raw: &[S], pattern: &CodePattern) -> Result<Self> {
        if raw.len() < 2 {
            bail!("a lineage needs at least a child and a parent, got {} element(s)", raw.len());
        }
        if let Some(blank) = raw.iter().position(|value| value.as_ref().trim().is_empty()) {
            bail!("lineage element {} is blank", blank + 1);
        }

        Ok(Self {
            elements: raw
                .iter()
                .map(|value| LineageElement::classify(value.as_ref(), pattern))
                .collect(),
        })
    }

    /// Adjacent (child, parent) positions, child first.
    pub fn pairs(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (1..self.elements.len()).map(|parent| (parent - 1, parent))
    }

    /// Parent-pointer hops allowed for the pair starting at `child`.
    pub fn remaining_hops(&self, child: usize) -> usize {
        self.elements.len().saturating_sub(child + 1)
    }
}

impl fmt::Display for LineageAssertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, element) in self.elements.iter().enumerate() {
            if i > 0 {
                write!(f, " -> ")?;
            }
            write!(f, "{element}")?;
        }
        Ok(())
    }
}

pub fn builtin_lineages(pattern: &CodePattern) -> Result<Vec<LineageAssertion>> {
    BUILTIN_LINEAGES
        .iter()
        .map(|raw| LineageAssertion::parse(*raw, pattern))
        .collect()
}

pub fn load_lineages(path: &Path, pattern: &CodePattern) -> Result<Vec<LineageAssertion>> {
    let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let chains: Vec<Vec<String>> = serde_json::from_slice(&raw)
        .with_context(|| format!("failed to parse {}", path.display()))?;

    if chains.is_empty() {
        bail!("{} defines no lineages", path.display());
    }

    chains
        .iter()
        .enumerate()
        .map(|(index, chain)| {
            LineageAssertion::parse(chain.as_slice(), pattern)
                .with_context(|| format!("invalid lineage {} in {}", index + 1, path.display()))
        })
        .collect()
}

/// Element pairs that one assertion places as descendant-of and another as
/// ancestor-of. Any hit means the fixtures contradict each other.
pub fn find_contradictions(
    lineages: &[LineageAssertion],
) -> Vec<(LineageElement, LineageElement)> {
    let mut ordered = BTreeSet::new();
    for lineage in lineages {
        for (i, descendant) in lineage.elements.iter().enumerate() {
            for ancestor in &lineage.elements[i + 1..] {
                if descendant != ancestor {
                    ordered.insert((descendant, ancestor));
                }
            }
        }
    }

    ordered
        .iter()
        .filter(|(descendant, ancestor)| {
            descendant < ancestor && ordered.contains(&(*ancestor, *descendant))
        })
        .map(|(descendant, ancestor)| ((*descendant).clone(), (*ancestor).clone()))
        .collect()
}
