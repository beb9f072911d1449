//! Plain-text report cards for flatten and reconcile.
//!
//! Sections are skipped when they have nothing to show, so a clean
//! submission prints only its totals and score table.

use arrow::record_batch::RecordBatch;
use arrow::util::pretty::pretty_format_batches;
use gradekey_core::{FlattenedSchema, Finding, GradeOutcome};

const MAX_LIST_ITEMS: usize = 20;

// ── Public API ──

/// Print a flattened rubric: every leaf with its canonical key, then collisions.
pub fn print_schema_card(schema: &FlattenedSchema) {
    println!("=== Rubric ===");
    println!();

    println!("Summary");
    println!("  {:<26} {}", "leaves", schema.leaves.len());
    println!("  {:<26} {}", "canonical keys", schema.keys.len());
    println!("  {:<26} {}", "total possible", fmt_score(schema.total_possible()));
    println!();

    if !schema.leaves.is_empty() {
        println!("Leaves");
        for leaf in &schema.leaves {
            let max = leaf.max_score.map(fmt_score).unwrap_or_else(|| "-".into());
            println!("  {:<26} {:<12} {}", leaf.raw_id, leaf.key.to_string(), max);
        }
        println!();
    }

    if !schema.duplicates.is_empty() {
        println!("Collisions");
        for dup in &schema.duplicates {
            println!("  {:<26} {:?} and {:?}", dup.key.to_string(), dup.first_id, dup.second_id);
        }
        println!();
    }

    if !schema.unkeyed.is_empty() {
        println!("Unkeyed leaves");
        for leaf in &schema.unkeyed {
            let max = leaf.max_score.map(fmt_score).unwrap_or_else(|| "-".into());
            println!("  {:<26} {}", leaf.raw_id, max);
        }
        println!();
    }
}

/// Print a graded submission as a vertical card followed by the score table.
pub fn print_report_card(outcome: &GradeOutcome, batch: &RecordBatch) -> anyhow::Result<()> {
    let status = if outcome.is_clean() {
        "clean"
    } else {
        "needs review"
    };
    println!("=== Reconciliation: {status} ===");
    println!();

    println!("Totals");
    println!("  {:<26} {}", "computed", fmt_score(outcome.computed_total));
    println!("  {:<26} {}", "reported", fmt_score(outcome.reported_overall));
    println!("  {:<26} {}", "possible", fmt_score(outcome.total_possible));
    println!("  {:<26} {}/{}", "keys scored", outcome.scores.len(), outcome.keys.len());
    println!();

    print_findings(&outcome.findings);

    if batch.num_rows() > 0 {
        println!("Scores");
        println!("{}", pretty_format_batches(std::slice::from_ref(batch))?);
        println!();
    }
    Ok(())
}

// ── Findings ──

fn print_findings(findings: &[Finding]) {
    if findings.is_empty() {
        return;
    }

    println!("Findings ({})", findings.len());
    for finding in findings.iter().take(MAX_LIST_ITEMS) {
        println!("  {:<26} {}", finding.kind(), describe(finding));
    }
    if findings.len() > MAX_LIST_ITEMS {
        println!("  ... and {} more", findings.len() - MAX_LIST_ITEMS);
    }
    println!();
}

fn describe(finding: &Finding) -> String {
    match finding {
        Finding::DuplicateCanonicalKey {
            key,
            first_id,
            second_id,
        } => format!("{key}: {first_id:?} and {second_id:?}"),
        Finding::UnkeyableLeaf { id, max_score } => match max_score {
            Some(max) => format!("{id:?} (worth {})", fmt_score(*max)),
            None => format!("{id:?}"),
        },
        Finding::MissingScore { key, expected_max } => match expected_max {
            Some(max) => format!("{key} (worth {})", fmt_score(*max)),
            None => key.to_string(),
        },
        Finding::GradeMismatch {
            computed,
            reported,
            delta,
        } => format!(
            "computed {} vs reported {} ({:+})",
            fmt_score(*computed),
            fmt_score(*reported),
            round(*delta)
        ),
        Finding::UnmatchedEntry {
            question_number,
            subsection_number,
            keys,
        } => {
            let label = match subsection_number {
                Some(sub) => format!("{question_number}/{sub}"),
                None => question_number.clone(),
            };
            if keys.is_empty() {
                format!("{label} (no key)")
            } else {
                let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
                format!("{label} -> {}", keys.join(", "))
            }
        }
        Finding::TotalPossibleMismatch { schema, reported } => format!(
            "rubric {} vs reported {}",
            fmt_score(*schema),
            fmt_score(*reported)
        ),
    }
}

// ── Helpers ──

/// Scores rounded to four places with trailing zeros dropped.
fn fmt_score(v: f64) -> String {
    round(v).to_string()
}

fn round(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}
