use std::io::{self, Write};

use super::check::{PairOutcome, VerificationReport, pass_label};
use super::structural_invariants::StructuralInvariantSummary;

pub fn write_report<W: Write>(
    output: &mut W,
    report: &VerificationReport,
    invariants: &StructuralInvariantSummary,
) -> io::Result<()> {
    for lineage in &report.lineages {
        writeln!(output, "Lineage {}: {}", lineage.number, lineage.assertion)?;

        for (element, resolution) in lineage.assertion.elements.iter().zip(&lineage.resolved) {
            match resolution {
                Ok(resolved) => {
                    writeln!(
                        output,
                        "  resolve {element}: node {} (row {})",
                        resolved.node_id, resolved.row_number
                    )?;
                }
                Err(_) => {
                    writeln!(output, "  resolve {element}: unresolved")?;
                }
            }
        }

        for pair in &lineage.pairs {
            match pair {
                PairOutcome::Checked(check) => {
                    writeln!(
                        output,
                        "  {} -> {}: closure={} parent_pointer={} (max {} hops){}",
                        check.child.element,
                        check.parent.element,
                        pass_label(check.closure),
                        pass_label(check.parent_pointer),
                        check.max_hops,
                        if check.methods_agree() { "" } else { " DISAGREE" }
                    )?;
                }
                PairOutcome::Unresolved { child, parent } => {
                    writeln!(output, "  {child} -> {parent}: skipped (unresolved element)")?;
                }
            }
        }

        let verdict = if lineage.passed() { "PASS" } else { "FAIL" };
        writeln!(output, "  result: {verdict}")?;
        writeln!(output)?;
    }

    writeln!(output, "Structural invariants:")?;
    for (name, count) in invariants.entries() {
        writeln!(output, "  {name}: {count}")?;
    }
    writeln!(output)?;

    if !report.errors.is_empty() {
        writeln!(output, "Errors:")?;
        for error in &report.errors {
            writeln!(output, "  {error}")?;
        }
        writeln!(output)?;
    }

    writeln!(
        output,
        "Summary: {} passed, {} failed",
        report.passed_count(),
        report.failed_count()
    )?;

    Ok(())
}
