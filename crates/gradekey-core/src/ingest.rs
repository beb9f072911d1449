//! Adapters from the loose JSON emitted by extraction and grading models to
//! the strict [`RubricNode`] and [`EvaluationEntry`] records.
//!
//! Everything shape-tolerant lives here. Field names vary between model runs
//! (`sub_task_id` vs `taskId`, `marks` vs `maxMarks`), child lists sometimes
//! arrive JSON-encoded inside a string, and grader output may be wrapped in a
//! markdown code fence.

use serde_json::{Map, Value};
use tracing::debug;

use crate::normalize::clean_question_number;
use crate::rubric::MAX_DEPTH;
use crate::{CoreError, Evaluation, EvaluationEntry, RubricNode};

const ID_FIELDS: &[&str] = &["sub_task_id", "subTaskId", "task_id", "taskId", "id"];
const CHILD_FIELDS: &[&str] = &["sub_tasks", "subTasks", "children"];
const WEIGHT_FIELDS: &[&str] = &["marks", "max_marks", "maxMarks", "maxScore", "max_score"];

/// Remove a surrounding markdown code fence (```` ```json ```` or ```` ``` ````).
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

pub fn parse_rubric_str(text: &str) -> Result<RubricNode, CoreError> {
    let value: Value = serde_json::from_str(strip_code_fence(text))?;
    parse_rubric(&value)
}

pub fn parse_evaluation_str(text: &str) -> Result<Evaluation, CoreError> {
    let value: Value = serde_json::from_str(strip_code_fence(text))?;
    parse_evaluation(&value)
}

/// Build a rubric tree from `{ "tasks": [...] }`, a bare task array, or one task.
///
/// The result is always a synthetic root whose children are the top-level tasks.
pub fn parse_rubric(value: &Value) -> Result<RubricNode, CoreError> {
    match value {
        Value::Array(tasks) => Ok(RubricNode::root(parse_tasks(tasks, "$", 0)?)),
        Value::Object(obj) => match obj.get("tasks") {
            Some(tasks) => {
                let tasks = decode_list(tasks, "$.tasks")?.unwrap_or_default();
                Ok(RubricNode::root(parse_tasks(&tasks, "$.tasks", 0)?))
            }
            None => Ok(RubricNode::root(vec![parse_task(value, "$", 0)?])),
        },
        _ => Err(CoreError::shape("$", "expected a rubric object or array")),
    }
}

fn parse_tasks(tasks: &[Value], path: &str, depth: usize) -> Result<Vec<RubricNode>, CoreError> {
    tasks
        .iter()
        .enumerate()
        .map(|(i, task)| parse_task(task, &format!("{path}[{i}]"), depth))
        .collect()
}

fn parse_task(value: &Value, path: &str, depth: usize) -> Result<RubricNode, CoreError> {
    let obj = value
        .as_object()
        .ok_or_else(|| CoreError::shape(path, "expected a task object"))?;
    let id = first_label(obj, ID_FIELDS).unwrap_or_default();
    if depth > MAX_DEPTH {
        return Err(CoreError::TooDeep { id, max: MAX_DEPTH });
    }

    let children = match CHILD_FIELDS.iter().find_map(|f| obj.get(*f).map(|v| (*f, v))) {
        Some((field, raw)) => {
            let child_path = format!("{path}.{field}");
            match decode_list(raw, &child_path)? {
                Some(list) => parse_tasks(&list, &child_path, depth + 1)?,
                None => Vec::new(),
            }
        }
        None => Vec::new(),
    };

    let max_score = WEIGHT_FIELDS
        .iter()
        .filter_map(|f| obj.get(*f).and_then(number))
        .find(|m| *m > 0.0);

    Ok(RubricNode {
        id,
        max_score,
        children,
    })
}

/// An array, a JSON-encoded array inside a string, or nothing.
///
/// A string that does not decode to an array is treated as no list at all.
fn decode_list(value: &Value, path: &str) -> Result<Option<Vec<Value>>, CoreError> {
    match value {
        Value::Null => Ok(None),
        Value::Array(items) => Ok(Some(items.clone())),
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Array(items)) => Ok(Some(items)),
            _ => {
                debug!(path, "string-encoded list did not decode, treating as empty");
                Ok(None)
            }
        },
        _ => Err(CoreError::shape(path, "expected an array")),
    }
}

/// Parse a grader result.
///
/// Accepts the grader object (`overallGrade`, `totalPossible`,
/// `questionScores`, `criteriaGrades`), the same object wrapped as
/// `{ "evaluationResult": ... }`, or a bare array of question scores. When
/// `questionScores` is missing or empty, `criteriaGrades` are used instead.
pub fn parse_evaluation(value: &Value) -> Result<Evaluation, CoreError> {
    match value {
        Value::Array(questions) => Ok(Evaluation::from_entries(question_entries(questions, "$")?)),
        Value::Object(obj) => {
            if let Some(inner) = obj.get("evaluationResult").filter(|v| v.is_object()) {
                return parse_evaluation(inner);
            }

            let mut entries = match obj.get("questionScores") {
                Some(v) => {
                    let list = expect_array(v, "$.questionScores")?;
                    question_entries(list, "$.questionScores")?
                }
                None => Vec::new(),
            };
            if entries.is_empty()
                && let Some(criteria) = obj.get("criteriaGrades").filter(|v| !v.is_null())
            {
                let list = expect_array(criteria, "$.criteriaGrades")?;
                entries = criteria_entries(list, "$.criteriaGrades")?;
            }

            Ok(Evaluation {
                entries,
                overall_grade: obj.get("overallGrade").and_then(number),
                total_possible: obj.get("totalPossible").and_then(number),
            })
        }
        _ => Err(CoreError::shape("$", "expected an evaluation object or array")),
    }
}

fn expect_array<'a>(value: &'a Value, path: &str) -> Result<&'a [Value], CoreError> {
    match value {
        Value::Array(items) => Ok(items.as_slice()),
        Value::Null => Ok(&[][..]),
        _ => Err(CoreError::shape(path, "expected an array")),
    }
}

/// One entry per subsection, or one per question when it has none.
fn question_entries(questions: &[Value], path: &str) -> Result<Vec<EvaluationEntry>, CoreError> {
    let mut entries = Vec::new();
    for (i, question) in questions.iter().enumerate() {
        let q_path = format!("{path}[{i}]");
        let obj = question
            .as_object()
            .ok_or_else(|| CoreError::shape(&q_path, "expected a question object"))?;
        let question_number = first_label(obj, &["questionNumber"]).unwrap_or_default();

        let subsections: &[Value] = match obj.get("subsections") {
            Some(v) => expect_array(v, &format!("{q_path}.subsections"))?,
            None => &[],
        };

        if subsections.is_empty() {
            entries.push(entry_from(obj, &question_number, "subsectionNumber", "earnedScore"));
            continue;
        }
        for (j, sub) in subsections.iter().enumerate() {
            let sub = sub.as_object().ok_or_else(|| {
                CoreError::shape(format!("{q_path}.subsections[{j}]"), "expected a subsection object")
            })?;
            entries.push(entry_from(sub, &question_number, "subsectionNumber", "earnedScore"));
        }
    }
    Ok(entries)
}

/// Flat `criteriaGrades` items labelled like `"2a"`, `"1.3"` or `"3(ii)"`.
fn criteria_entries(criteria: &[Value], path: &str) -> Result<Vec<EvaluationEntry>, CoreError> {
    criteria
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let obj = item
                .as_object()
                .ok_or_else(|| CoreError::shape(format!("{path}[{i}]"), "expected a criterion object"))?;
            let label = first_label(obj, &["questionNumber"]).unwrap_or_default();
            let (question, subsection) = split_criterion_label(&label);
            let mut entry = entry_from(obj, &question, "", "score");
            entry.subsection_number = subsection;
            Ok(entry)
        })
        .collect()
}

/// Split `"2a"` into `("2", "a")`, `"3.2.1"` into `("3", "2.1")`.
///
/// Labels with a parenthetical part keep their full text as the subsection so
/// the normaliser sees the head and every group together.
fn split_criterion_label(label: &str) -> (String, Option<String>) {
    let label = clean_question_number(label);
    let digits_end = label
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(label.len());
    if digits_end == 0 {
        return (label.to_string(), None);
    }

    let (question, rest) = label.split_at(digits_end);
    let rest = rest.trim_start_matches(|c: char| c == '.' || c.is_whitespace());
    let subsection = if rest.is_empty() {
        None
    } else if rest.starts_with('(') {
        Some(label.to_string())
    } else {
        Some(rest.to_string())
    };
    (question.to_string(), subsection)
}

fn entry_from(
    obj: &Map<String, Value>,
    question_number: &str,
    subsection_field: &str,
    earned_field: &str,
) -> EvaluationEntry {
    EvaluationEntry {
        question_number: question_number.to_string(),
        subsection_number: first_label(obj, &[subsection_field]),
        earned_score: obj.get(earned_field).and_then(number).unwrap_or(0.0),
        max_score: obj.get("maxScore").and_then(number).unwrap_or(0.0),
        feedback: obj
            .get("feedback")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string),
    }
}

/// First non-empty string or number among `fields`, as text.
fn first_label(obj: &Map<String, Value>, fields: &[&str]) -> Option<String> {
    fields.iter().find_map(|f| match obj.get(*f)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// A finite number, accepting numeric strings.
fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .filter(|v: &f64| v.is_finite())
}
