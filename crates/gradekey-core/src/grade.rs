//! One-call grading pipeline: flatten, map, reconcile.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::info;

use crate::reconcile::check_total_possible;
use crate::{
    CanonicalKey, CoreError, Evaluation, Finding, FlattenedSchema, GradingConfig, RubricNode,
    Score, ScoreTable, flatten, map_evaluation, reconcile,
};

/// Everything a caller needs after grading one submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeOutcome {
    /// Rubric keys in canonical order.
    pub keys: Vec<CanonicalKey>,
    pub scores: BTreeMap<CanonicalKey, Score>,
    pub findings: Vec<Finding>,
    pub computed_total: f64,
    pub reported_overall: f64,
    pub total_possible: f64,
    #[serde(skip)]
    pub schema: FlattenedSchema,
    #[serde(skip)]
    pub table: ScoreTable,
}

impl GradeOutcome {
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }
}

/// Grade `evaluation` against `rubric`.
///
/// The reported overall grade is the evaluation's `overall_grade`, or the sum
/// of its entries' earned scores when the grader reported none.
pub fn grade_submission(
    rubric: &RubricNode,
    evaluation: &Evaluation,
    config: &GradingConfig,
) -> Result<GradeOutcome, CoreError> {
    config.validate()?;

    let schema = flatten(rubric)?;
    let mut table = map_evaluation(&evaluation.entries, config);
    fill_missing_max(&mut table, &schema);
    let reported = evaluation
        .overall_grade
        .unwrap_or_else(|| evaluation.entry_total());

    let mut report = reconcile(&schema, &table, reported, config);
    if let Some(reported_possible) = evaluation.total_possible
        && let Some(finding) = check_total_possible(&schema, reported_possible, config)
    {
        report.findings.push(finding);
    }

    info!(
        keys = schema.keys.len(),
        scored = table.len(),
        findings = report.findings.len(),
        "graded submission"
    );

    Ok(GradeOutcome {
        keys: schema.keys.iter().cloned().collect(),
        scores: table.scores.clone(),
        findings: report.findings,
        computed_total: report.computed_total,
        reported_overall: report.reported_overall,
        total_possible: report.total_possible,
        schema,
        table,
    })
}

/// Graders often omit per-subsection maxima; take them from the rubric.
fn fill_missing_max(table: &mut ScoreTable, schema: &FlattenedSchema) {
    for (key, score) in table.scores.iter_mut() {
        if score.max <= 0.0
            && let Some(max) = schema.max_score(key)
        {
            score.max = max;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EvaluationEntry;
    use crate::ingest::{parse_evaluation, parse_rubric};
    use serde_json::json;

    fn scenario_rubric() -> RubricNode {
        RubricNode::root(vec![RubricNode::branch(
            "1",
            vec![RubricNode::leaf("1.1", 1.0), RubricNode::leaf("1.2", 0.5)],
        )])
    }

    fn scenario_evaluation(overall: f64) -> Evaluation {
        Evaluation {
            entries: vec![
                EvaluationEntry::new("1", Some("1"), 0.8, 1.0),
                EvaluationEntry::new("1", Some("2"), 0.4, 0.5),
            ],
            overall_grade: Some(overall),
            total_possible: Some(1.5),
        }
    }

    #[test]
    fn concrete_scenario() {
        let outcome =
            grade_submission(&scenario_rubric(), &scenario_evaluation(1.2), &GradingConfig::default())
                .unwrap();
        assert!(outcome.is_clean(), "unexpected findings: {:?}", outcome.findings);
        let keys: Vec<String> = outcome.keys.iter().map(|k| k.to_string()).collect();
        assert_eq!(keys, ["1.1", "1.2"]);
        assert_eq!(outcome.total_possible, 1.5);
    }

    #[test]
    fn scenario_from_grader_json() {
        let rubric = parse_rubric(&json!({"tasks": [
            {"id": "1", "children": [{"id": "1.1", "maxScore": 1}, {"id": "1.2", "maxScore": 0.5}]}
        ]}))
        .unwrap();
        let evaluation = parse_evaluation(&json!({
            "overallGrade": 1.2,
            "questionScores": [{"questionNumber": "1", "subsections": [
                {"subsectionNumber": "1", "earnedScore": 0.8},
                {"subsectionNumber": "2", "earnedScore": 0.4}
            ]}]
        }))
        .unwrap();

        let outcome = grade_submission(&rubric, &evaluation, &GradingConfig::default()).unwrap();
        assert!(outcome.is_clean(), "unexpected findings: {:?}", outcome.findings);
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(
            json["scores"],
            json!({"1.1": {"earned": 0.8, "max": 1.0}, "1.2": {"earned": 0.4, "max": 0.5}})
        );
    }

    #[test]
    fn mismatch_scenario() {
        let outcome =
            grade_submission(&scenario_rubric(), &scenario_evaluation(1.5), &GradingConfig::default())
                .unwrap();
        assert_eq!(outcome.findings.len(), 1);
        match &outcome.findings[0] {
            Finding::GradeMismatch { delta, .. } => assert!((delta - 0.3).abs() < 1e-9),
            other => panic!("expected grade mismatch, got {other:?}"),
        }
    }

    #[test]
    fn overall_defaults_to_entry_total() {
        let mut evaluation = scenario_evaluation(0.0);
        evaluation.overall_grade = None;
        let outcome =
            grade_submission(&scenario_rubric(), &evaluation, &GradingConfig::default()).unwrap();
        assert!((outcome.reported_overall - 1.2).abs() < 1e-9);
        assert!(outcome.is_clean());
    }

    #[test]
    fn total_possible_mismatch_appended() {
        let mut evaluation = scenario_evaluation(1.2);
        evaluation.total_possible = Some(2.0);
        let outcome =
            grade_submission(&scenario_rubric(), &evaluation, &GradingConfig::default()).unwrap();
        assert_eq!(outcome.findings.len(), 1);
        assert_eq!(outcome.findings[0].kind(), "total_possible_mismatch");
    }

    #[test]
    fn invalid_config_rejected() {
        let config = GradingConfig {
            tolerance: -1.0,
            ..Default::default()
        };
        assert!(matches!(
            grade_submission(&scenario_rubric(), &scenario_evaluation(1.2), &config),
            Err(CoreError::InvalidConfig(_))
        ));
    }

    /// Scoring every rubric leaf under its own id, split into question and
    /// remainder, always lands on the rubric's keys.
    #[test]
    fn rubric_ids_round_trip_through_evaluation() {
        let ids = ["1a", "1(ii)", "2 i", "3.2.1a", "3.2.2(i)", "4", "5.1", "6(a)(iii)"];
        let rubric = RubricNode::root(ids.iter().map(|id| RubricNode::leaf(*id, 1.0)).collect());

        let entries = ids
            .iter()
            .map(|id| {
                let digits = id.find(|c: char| !c.is_ascii_digit()).unwrap_or(id.len());
                let (question, rest) = id.split_at(digits);
                let rest = rest.trim_start_matches('.').trim();
                let subsection = if rest.is_empty() {
                    None
                } else if rest.starts_with('(') {
                    Some(*id)
                } else {
                    Some(rest)
                };
                EvaluationEntry::new(question, subsection, 1.0, 1.0)
            })
            .collect();
        let evaluation = Evaluation {
            entries,
            overall_grade: Some(ids.len() as f64),
            total_possible: Some(ids.len() as f64),
        };

        let outcome = grade_submission(&rubric, &evaluation, &GradingConfig::default()).unwrap();
        assert!(outcome.is_clean(), "unexpected findings: {:?}", outcome.findings);
    }

    #[test]
    fn unresolved_sub_label_does_not_overwrite_question_score() {
        let rubric = RubricNode::root(vec![RubricNode::leaf("1", 5.0)]);
        let evaluation = Evaluation {
            entries: vec![
                EvaluationEntry::new("1", None, 5.0, 5.0),
                EvaluationEntry::new("1", Some("1ab"), 0.0, 1.0),
            ],
            overall_grade: Some(5.0),
            total_possible: Some(5.0),
        };

        let outcome = grade_submission(&rubric, &evaluation, &GradingConfig::default()).unwrap();
        let q1 = CanonicalKey::parse("1").unwrap();
        assert_eq!(outcome.scores[&q1].earned, 5.0);
        assert_eq!(outcome.computed_total, 5.0);
        assert_eq!(outcome.findings.len(), 1, "findings: {:?}", outcome.findings);
        assert!(matches!(
            &outcome.findings[0],
            Finding::UnmatchedEntry { keys, .. } if keys.iter().all(|k| k.to_string() == "1.1")
        ));
    }

    #[test]
    fn unkeyable_leaf_reported_not_rejected() {
        let rubric = RubricNode::root(vec![
            RubricNode::branch(
                "1",
                vec![RubricNode::leaf("1.1", 1.0), RubricNode::leaf("1.2", 0.5)],
            ),
            RubricNode::leaf("Bonus", 2.0),
        ]);
        let outcome =
            grade_submission(&rubric, &scenario_evaluation(1.2), &GradingConfig::default())
                .unwrap();
        assert_eq!(outcome.total_possible, 1.5);
        assert_eq!(outcome.findings.len(), 1);
        assert_eq!(outcome.findings[0].kind(), "unkeyable_leaf");
    }

    #[test]
    fn loose_json_end_to_end() {
        let rubric = parse_rubric(&json!({"tasks": [
            {"task_id": "1", "sub_tasks": [
                {"sub_task_id": "1a", "marks": 2},
                {"sub_task_id": "1b", "marks": 3}
            ]},
            {"task_id": "2", "sub_tasks": "[{\"sub_task_id\": \"2(i)\", \"marks\": 5}]"}
        ]}))
        .unwrap();
        let evaluation = parse_evaluation(&json!({
            "overallGrade": 8,
            "totalPossible": 10,
            "questionScores": [
                {"questionNumber": "Task 1", "earnedScore": 4, "maxScore": 5, "subsections": [
                    {"subsectionNumber": "a", "earnedScore": 2, "maxScore": 2},
                    {"subsectionNumber": "1b", "earnedScore": 2, "maxScore": 3}
                ]},
                {"questionNumber": "2", "earnedScore": 4, "maxScore": 5, "subsections": [
                    {"subsectionNumber": "i", "earnedScore": 4, "maxScore": 5}
                ]}
            ]
        }))
        .unwrap();

        let outcome = grade_submission(&rubric, &evaluation, &GradingConfig::default()).unwrap();
        assert!(outcome.is_clean(), "unexpected findings: {:?}", outcome.findings);
        assert_eq!(outcome.computed_total, 8.0);

        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["keys"], json!(["1.1", "1.2", "2.1"]));
        assert_eq!(json["scores"]["2.1"]["earned"], json!(4.0));
        assert_eq!(json["findings"], json!([]));
        assert!(json.get("schema").is_none());
    }
}
