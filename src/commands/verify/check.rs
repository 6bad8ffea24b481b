use std::fmt;

use anyhow::Result;

use crate::model::NodeId;

use super::lineage::{LineageAssertion, LineageElement};
use super::store::{LineageStore, NodeMatch};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionProblem {
    NoMatch,
    MultipleMatches(Vec<NodeMatch>),
    /// The row exists but only on the reference side, so it has no tree node.
    NotInTree(NodeMatch),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedElement {
    pub element: LineageElement,
    pub node_id: NodeId,
    pub row_number: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairCheck {
    pub child: ResolvedElement,
    pub parent: ResolvedElement,
    pub max_hops: usize,
    pub closure: bool,
    pub parent_pointer: bool,
}

impl PairCheck {
    pub fn passed(&self) -> bool {
        self.closure && self.parent_pointer
    }

    pub fn methods_agree(&self) -> bool {
        self.closure == self.parent_pointer
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairOutcome {
    Checked(PairCheck),
    Unresolved {
        child: LineageElement,
        parent: LineageElement,
    },
}

impl PairOutcome {
    pub fn passed(&self) -> bool {
        matches!(self, Self::Checked(check) if check.passed())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineageOutcome {
    pub number: usize,
    pub assertion: LineageAssertion,
    pub resolved: Vec<Result<ResolvedElement, ResolutionProblem>>,
    pub pairs: Vec<PairOutcome>,
}

impl LineageOutcome {
    pub fn passed(&self) -> bool {
        self.resolved.iter().all(Result::is_ok) && self.pairs.iter().all(PairOutcome::passed)
    }
}

/// Non-fatal failures, gathered across every lineage and reported together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationError {
    Resolution {
        lineage: usize,
        element: LineageElement,
        problem: ResolutionProblem,
    },
    Disagreement {
        lineage: usize,
        child: LineageElement,
        parent: LineageElement,
        closure: bool,
        parent_pointer: bool,
    },
    NotAncestor {
        lineage: usize,
        child: LineageElement,
        parent: LineageElement,
    },
}

impl fmt::Display for VerificationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resolution {
                lineage,
                element,
                problem,
            } => match problem {
                ResolutionProblem::NoMatch => {
                    write!(f, "lineage {lineage}: {element} matches no row")
                }
                ResolutionProblem::MultipleMatches(matches) => {
                    write!(f, "lineage {lineage}: {element} matches {} rows (", matches.len())?;
                    for (i, candidate) in matches.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "row {}", candidate.row_number)?;
                        if let Some(node_id) = &candidate.node_id {
                            write!(f, " node {node_id}")?;
                        }
                        if let Some(code) = &candidate.code {
                            write!(f, " code {code}")?;
                        }
                        if let Some(short_name) = &candidate.short_name {
                            write!(f, " \"{short_name}\"")?;
                        }
                    }
                    write!(f, ")")
                }
                ResolutionProblem::NotInTree(candidate) => write!(
                    f,
                    "lineage {lineage}: {element} matches row {} which has no scraped node id",
                    candidate.row_number
                ),
            },
            Self::Disagreement {
                lineage,
                child,
                parent,
                closure,
                parent_pointer,
            } => write!(
                f,
                "lineage {lineage}: methods disagree on {child} -> {parent} (closure={}, parent_pointer={})",
                pass_label(*closure),
                pass_label(*parent_pointer)
            ),
            Self::NotAncestor {
                lineage,
                child,
                parent,
            } => write!(
                f,
                "lineage {lineage}: {parent} is not an ancestor of {child} by either method"
            ),
        }
    }
}

pub fn pass_label(value: bool) -> &'static str {
    if value { "pass" } else { "fail" }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerificationReport {
    pub lineages: Vec<LineageOutcome>,
    pub errors: Vec<VerificationError>,
}

impl VerificationReport {
    pub fn passed_count(&self) -> usize {
        self.lineages.iter().filter(|lineage| lineage.passed()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.lineages.len() - self.passed_count()
    }

    pub fn all_passed(&self) -> bool {
        self.failed_count() == 0
    }
}

pub fn resolve_element(
    store: &LineageStore,
    element: &LineageElement,
) -> Result<Result<ResolvedElement, ResolutionProblem>> {
    let mut matches = match element {
        LineageElement::Code(code) => store.rows_with_code(code)?,
        LineageElement::Label(label) => store.rows_with_short_name(label)?,
    };

    let resolved = match matches.len() {
        0 => Err(ResolutionProblem::NoMatch),
        1 => {
            let candidate = matches.remove(0);
            match candidate.node_id.clone() {
                Some(node_id) => Ok(ResolvedElement {
                    element: element.clone(),
                    node_id,
                    row_number: candidate.row_number,
                }),
                None => Err(ResolutionProblem::NotInTree(candidate)),
            }
        }
        _ => Err(ResolutionProblem::MultipleMatches(matches)),
    };

    Ok(resolved)
}

/// Runs every lineage; a failing lineage never stops the others. Only
/// database errors propagate.
pub fn verify_lineages(
    store: &LineageStore,
    lineages: &[LineageAssertion],
) -> Result<VerificationReport> {
    let mut report = VerificationReport::default();

    for (index, assertion) in lineages.iter().enumerate() {
        let number = index + 1;

        let mut resolved = Vec::with_capacity(assertion.elements.len());
        for element in &assertion.elements {
            let resolution = resolve_element(store, element)?;
            if let Err(problem) = &resolution {
                report.errors.push(VerificationError::Resolution {
                    lineage: number,
                    element: element.clone(),
                    problem: problem.clone(),
                });
            }
            resolved.push(resolution);
        }

        let mut pairs = Vec::with_capacity(assertion.elements.len().saturating_sub(1));
        for (child_index, parent_index) in assertion.pairs() {
            let (Ok(child), Ok(parent)) = (&resolved[child_index], &resolved[parent_index]) else {
                pairs.push(PairOutcome::Unresolved {
                    child: assertion.elements[child_index].clone(),
                    parent: assertion.elements[parent_index].clone(),
                });
                continue;
            };

            let max_hops = assertion.remaining_hops(child_index);
            let check = PairCheck {
                closure: store.closure_contains(&parent.node_id, &child.node_id)?,
                parent_pointer: store.parent_chain_reaches(
                    &child.node_id,
                    &parent.node_id,
                    max_hops,
                )?,
                child: child.clone(),
                parent: parent.clone(),
                max_hops,
            };

            if !check.methods_agree() {
                report.errors.push(VerificationError::Disagreement {
                    lineage: number,
                    child: child.element.clone(),
                    parent: parent.element.clone(),
                    closure: check.closure,
                    parent_pointer: check.parent_pointer,
                });
            } else if !check.passed() {
                report.errors.push(VerificationError::NotAncestor {
                    lineage: number,
                    child: child.element.clone(),
                    parent: parent.element.clone(),
                });
            }
            pairs.push(PairOutcome::Checked(check));
        }

        report.lineages.push(LineageOutcome {
            number,
            assertion: assertion.clone(),
            resolved,
            pairs,
        });
    }

    Ok(report)
}
