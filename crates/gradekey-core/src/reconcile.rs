//! Consistency checks between a flattened rubric, mapped scores, and the
//! grader's reported totals.
//!
//! Findings are informational. Nothing here rewrites a score; callers decide
//! whether to re-grade, trust the computed total, or queue a manual review.

use serde::Serialize;
use tracing::info;

use crate::{CanonicalKey, FlattenedSchema, GradingConfig, ScoreTable};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Finding {
    /// Two rubric ids collapsed onto one key.
    #[serde(rename_all = "camelCase")]
    DuplicateCanonicalKey {
        key: CanonicalKey,
        first_id: String,
        second_id: String,
    },
    /// A rubric leaf with no key of its own and no keyed ancestor. Its weight
    /// is not counted in the rubric's total possible score.
    #[serde(rename_all = "camelCase")]
    UnkeyableLeaf { id: String, max_score: Option<f64> },
    /// A rubric leaf received no score.
    #[serde(rename_all = "camelCase")]
    MissingScore {
        key: CanonicalKey,
        expected_max: Option<f64>,
    },
    /// Sum of per-key scores disagrees with the reported overall grade.
    /// `delta` is `reported - computed`.
    GradeMismatch {
        computed: f64,
        reported: f64,
        delta: f64,
    },
    /// An evaluation entry whose keys are all absent from the rubric.
    #[serde(rename_all = "camelCase")]
    UnmatchedEntry {
        question_number: String,
        subsection_number: Option<String>,
        keys: Vec<CanonicalKey>,
    },
    /// The grader's total possible score disagrees with the rubric's.
    TotalPossibleMismatch { schema: f64, reported: f64 },
}

impl Finding {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DuplicateCanonicalKey { .. } => "duplicate_canonical_key",
            Self::UnkeyableLeaf { .. } => "unkeyable_leaf",
            Self::MissingScore { .. } => "missing_score",
            Self::GradeMismatch { .. } => "grade_mismatch",
            Self::UnmatchedEntry { .. } => "unmatched_entry",
            Self::TotalPossibleMismatch { .. } => "total_possible_mismatch",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationReport {
    /// Sum of earned scores over rubric keys that have a score.
    pub computed_total: f64,
    pub reported_overall: f64,
    pub total_possible: f64,
    pub findings: Vec<Finding>,
}

impl ReconciliationReport {
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn missing_keys(&self) -> impl Iterator<Item = &CanonicalKey> {
        self.findings.iter().filter_map(|f| match f {
            Finding::MissingScore { key, .. } => Some(key),
            _ => None,
        })
    }

    pub fn grade_mismatch(&self) -> Option<&Finding> {
        self.findings
            .iter()
            .find(|f| matches!(f, Finding::GradeMismatch { .. }))
    }
}

/// Check that every rubric key was scored and that the scores add up.
pub fn reconcile(
    schema: &FlattenedSchema,
    table: &ScoreTable,
    reported_overall: f64,
    config: &GradingConfig,
) -> ReconciliationReport {
    let mut findings: Vec<Finding> = schema
        .duplicates
        .iter()
        .map(|d| Finding::DuplicateCanonicalKey {
            key: d.key.clone(),
            first_id: d.first_id.clone(),
            second_id: d.second_id.clone(),
        })
        .collect();
    findings.extend(schema.unkeyed.iter().map(|u| Finding::UnkeyableLeaf {
        id: u.raw_id.clone(),
        max_score: u.max_score,
    }));

    let mut computed_total = 0.0;
    for key in &schema.keys {
        match table.get(key) {
            Some(score) => computed_total += score.earned,
            None => findings.push(Finding::MissingScore {
                key: key.clone(),
                expected_max: schema.max_score(key),
            }),
        }
    }

    for entry in &table.entries {
        if !entry.keys.iter().any(|k| schema.contains(k)) {
            findings.push(Finding::UnmatchedEntry {
                question_number: entry.question_number.clone(),
                subsection_number: entry.subsection_number.clone(),
                keys: entry.keys.clone(),
            });
        }
    }

    if !config.within_tolerance(computed_total, reported_overall) {
        findings.push(Finding::GradeMismatch {
            computed: computed_total,
            reported: reported_overall,
            delta: reported_overall - computed_total,
        });
    }

    info!(
        computed_total,
        reported_overall,
        findings = findings.len(),
        "reconciled scores"
    );

    ReconciliationReport {
        computed_total,
        reported_overall,
        total_possible: schema.total_possible(),
        findings,
    }
}

/// Compare the grader's `totalPossible` with the rubric's summed weights.
pub fn check_total_possible(
    schema: &FlattenedSchema,
    reported_possible: f64,
    config: &GradingConfig,
) -> Option<Finding> {
    let total = schema.total_possible();
    (!config.within_tolerance(total, reported_possible)).then_some(Finding::TotalPossibleMismatch {
        schema: total,
        reported: reported_possible,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EvaluationEntry, RubricNode, flatten, map_evaluation};

    fn key(s: &str) -> CanonicalKey {
        CanonicalKey::parse(s).unwrap()
    }

    fn scenario_schema() -> FlattenedSchema {
        flatten(&RubricNode::root(vec![RubricNode::branch(
            "1",
            vec![RubricNode::leaf("1.1", 1.0), RubricNode::leaf("1.2", 0.5)],
        )]))
        .unwrap()
    }

    fn scenario_table() -> ScoreTable {
        map_evaluation(
            &[
                EvaluationEntry::new("1", Some("1"), 0.8, 1.0),
                EvaluationEntry::new("1", Some("2"), 0.4, 0.5),
            ],
            &GradingConfig::default(),
        )
    }

    #[test]
    fn clean_scenario() {
        let report = reconcile(
            &scenario_schema(),
            &scenario_table(),
            1.2,
            &GradingConfig::default(),
        );
        assert!(report.is_clean(), "unexpected findings: {:?}", report.findings);
        assert!((report.computed_total - 1.2).abs() < 1e-9);
        assert_eq!(report.total_possible, 1.5);
    }

    #[test]
    fn mismatch_scenario() {
        let report = reconcile(
            &scenario_schema(),
            &scenario_table(),
            1.5,
            &GradingConfig::default(),
        );
        assert_eq!(report.findings.len(), 1);
        match report.grade_mismatch() {
            Some(Finding::GradeMismatch {
                computed,
                reported,
                delta,
            }) => {
                assert!((computed - 1.2).abs() < 1e-9);
                assert_eq!(*reported, 1.5);
                assert!((delta - 0.3).abs() < 1e-9);
            }
            other => panic!("expected grade mismatch, got {other:?}"),
        }
    }

    #[test]
    fn mismatch_iff_outside_tolerance() {
        let config = GradingConfig::default();
        let cases = [
            (1.2, false),
            (1.205, false),
            (1.195, false),
            (1.22, true),
            (1.0, true),
        ];
        for (reported, expect_mismatch) in cases {
            let report = reconcile(&scenario_schema(), &scenario_table(), reported, &config);
            assert_eq!(
                report.grade_mismatch().is_some(),
                expect_mismatch,
                "reported {reported}"
            );
        }
    }

    #[test]
    fn missing_score_carries_expected_max() {
        let table = map_evaluation(
            &[EvaluationEntry::new("1", Some("1"), 0.8, 1.0)],
            &GradingConfig::default(),
        );
        let report = reconcile(&scenario_schema(), &table, 0.8, &GradingConfig::default());
        assert_eq!(
            report.findings,
            vec![Finding::MissingScore {
                key: key("1.2"),
                expected_max: Some(0.5),
            }]
        );
        assert_eq!(report.missing_keys().count(), 1);
    }

    #[test]
    fn unmatched_entry_reported() {
        let table = map_evaluation(
            &[
                EvaluationEntry::new("1", Some("1"), 0.8, 1.0),
                EvaluationEntry::new("1", Some("2"), 0.4, 0.5),
                EvaluationEntry::new("1", Some("c"), 0.0, 1.0),
            ],
            &GradingConfig::default(),
        );
        let report = reconcile(&scenario_schema(), &table, 1.2, &GradingConfig::default());
        assert_eq!(report.findings.len(), 1);
        assert!(matches!(
            &report.findings[0],
            Finding::UnmatchedEntry { subsection_number: Some(s), .. } if s == "c"
        ));
    }

    #[test]
    fn alias_match_is_not_unmatched() {
        let schema = flatten(&RubricNode::root(vec![RubricNode::leaf("3.2.1", 2.0)])).unwrap();
        let table = map_evaluation(
            &[EvaluationEntry::new("3", Some("3.2.1"), 2.0, 2.0)],
            &GradingConfig::default(),
        );
        let report = reconcile(&schema, &table, 2.0, &GradingConfig::default());
        assert!(report.is_clean(), "unexpected findings: {:?}", report.findings);
    }

    #[test]
    fn duplicates_surface_as_findings() {
        let schema = flatten(&RubricNode::root(vec![
            RubricNode::leaf("1a", 1.0),
            RubricNode::leaf("1(a)", 1.0),
        ]))
        .unwrap();
        let table = map_evaluation(
            &[EvaluationEntry::new("1", Some("a"), 1.0, 1.0)],
            &GradingConfig::default(),
        );
        let report = reconcile(&schema, &table, 1.0, &GradingConfig::default());
        assert_eq!(report.findings.len(), 1);
        assert_eq!(report.findings[0].kind(), "duplicate_canonical_key");
        assert_eq!(report.total_possible, 2.0);
    }

    #[test]
    fn unkeyable_leaf_surfaces_as_finding() {
        let schema = flatten(&RubricNode::root(vec![
            RubricNode::leaf("1", 1.0),
            RubricNode::leaf("Bonus", 0.5),
        ]))
        .unwrap();
        let table = map_evaluation(
            &[EvaluationEntry::new("1", None, 1.0, 1.0)],
            &GradingConfig::default(),
        );
        let report = reconcile(&schema, &table, 1.0, &GradingConfig::default());
        assert_eq!(
            report.findings,
            vec![Finding::UnkeyableLeaf {
                id: "Bonus".into(),
                max_score: Some(0.5),
            }]
        );
        assert_eq!(report.total_possible, 1.0);
        let json = serde_json::to_value(&report.findings[0]).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"kind": "unkeyableLeaf", "id": "Bonus", "maxScore": 0.5})
        );
    }

    #[test]
    fn total_possible_check() {
        let schema = scenario_schema();
        let config = GradingConfig::default();
        assert!(check_total_possible(&schema, 1.5, &config).is_none());
        assert_eq!(
            check_total_possible(&schema, 2.0, &config),
            Some(Finding::TotalPossibleMismatch {
                schema: 1.5,
                reported: 2.0,
            })
        );
    }

    #[test]
    fn finding_json_is_tagged() {
        let finding = Finding::MissingScore {
            key: key("2.1"),
            expected_max: Some(1.0),
        };
        let json = serde_json::to_value(&finding).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"kind": "missingScore", "key": "2.1", "expectedMax": 1.0})
        );
    }
}
