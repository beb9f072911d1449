//! Mapping grader output onto canonical keys.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::normalize::{canonical_key, canonicalize_id, clean_question_number};
use crate::{CanonicalKey, GradingConfig};

/// One scored item from the grader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationEntry {
    pub question_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subsection_number: Option<String>,
    pub earned_score: f64,
    #[serde(default)]
    pub max_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

impl EvaluationEntry {
    pub fn new(question: impl Into<String>, subsection: Option<&str>, earned: f64, max: f64) -> Self {
        Self {
            question_number: question.into(),
            subsection_number: subsection.map(str::to_string),
            earned_score: earned,
            max_score: max,
            feedback: None,
        }
    }

    fn subsection(&self) -> Option<&str> {
        self.subsection_number
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// A grader result: flat entries plus whatever totals the grader reported.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    pub entries: Vec<EvaluationEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overall_grade: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_possible: Option<f64>,
}

impl Evaluation {
    pub fn from_entries(entries: Vec<EvaluationEntry>) -> Self {
        Self {
            entries,
            ..Default::default()
        }
    }

    /// Sum of earned scores over all entries.
    pub fn entry_total(&self) -> f64 {
        self.entries.iter().map(|e| e.earned_score).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub earned: f64,
    pub max: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

/// Where one evaluation entry ended up.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MappedEntry {
    pub question_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subsection_number: Option<String>,
    /// Primary key first, then the qualified alias if one was registered.
    pub keys: Vec<CanonicalKey>,
}

/// Earned and maximum score per canonical key.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreTable {
    pub scores: BTreeMap<CanonicalKey, Score>,
    pub entries: Vec<MappedEntry>,
}

impl ScoreTable {
    pub fn get(&self, key: &CanonicalKey) -> Option<&Score> {
        self.scores.get(key)
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

/// Key every entry canonically; later entries overwrite earlier ones per key.
pub fn map_evaluation(entries: &[EvaluationEntry], config: &GradingConfig) -> ScoreTable {
    let mut table = ScoreTable::default();

    for entry in entries {
        let keys = entry_keys(entry, config);
        if keys.is_empty() {
            warn!(
                question = %entry.question_number,
                subsection = ?entry.subsection_number,
                "evaluation entry has no resolvable key"
            );
        }

        let score = Score {
            earned: entry.earned_score,
            max: entry.max_score,
            feedback: entry.feedback.clone(),
        };
        for key in &keys {
            table.scores.insert(key.clone(), score.clone());
        }
        table.entries.push(MappedEntry {
            question_number: entry.question_number.clone(),
            subsection_number: entry.subsection_number.clone(),
            keys,
        });
    }

    info!(
        entries = entries.len(),
        keys = table.scores.len(),
        "mapped evaluation"
    );
    table
}

fn entry_keys(entry: &EvaluationEntry, config: &GradingConfig) -> Vec<CanonicalKey> {
    let question = clean_question_number(&entry.question_number);
    let Some(base) = canonicalize_id(question) else {
        return Vec::new();
    };

    let Some(subsection) = entry.subsection() else {
        return vec![base];
    };

    let mut keys = Vec::with_capacity(2);
    if let Some(primary) = canonical_key(&base.to_string(), Some(subsection)) {
        keys.push(primary);
    }

    let literal = clean_question_number(subsection);
    if config.qualified_alias
        && literal.starts_with(&format!("{question}."))
        && let Some(alias) = canonicalize_id(literal)
        && !keys.contains(&alias)
    {
        keys.push(alias);
    }
    keys
}
