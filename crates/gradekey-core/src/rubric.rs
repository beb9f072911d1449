//! Rubric trees and their flattening into canonical leaf keys.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::normalize::canonicalize_id;
use crate::{CanonicalKey, CoreError};

/// Nesting limit for rubric trees.
pub const MAX_DEPTH: usize = 64;

/// A node in a rubric tree.
///
/// Only leaves carry weight; a `max_score` on a node with children is ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RubricNode {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<RubricNode>,
}

impl RubricNode {
    pub fn leaf(id: impl Into<String>, max_score: f64) -> Self {
        Self {
            id: id.into(),
            max_score: Some(max_score),
            children: Vec::new(),
        }
    }

    pub fn branch(id: impl Into<String>, children: Vec<RubricNode>) -> Self {
        Self {
            id: id.into(),
            max_score: None,
            children,
        }
    }

    /// Synthetic unlabelled root holding a rubric's top-level tasks.
    pub fn root(tasks: Vec<RubricNode>) -> Self {
        Self::branch("", tasks)
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn leaf_count(&self) -> usize {
        if self.is_leaf() {
            1
        } else {
            self.children.iter().map(RubricNode::leaf_count).sum()
        }
    }
}

/// A rubric leaf after normalisation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaLeaf {
    pub raw_id: String,
    pub key: CanonicalKey,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_score: Option<f64>,
}

/// Two distinct rubric leaves that normalised to the same key.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateKey {
    pub key: CanonicalKey,
    pub first_id: String,
    pub second_id: String,
}

/// A rubric leaf whose id yields no key and that has no keyed ancestor.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnkeyedLeaf {
    pub raw_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_score: Option<f64>,
}

/// Flattened rubric: canonical leaf keys with their weights.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlattenedSchema {
    /// Leaves in document order, one per rubric leaf.
    pub leaves: Vec<SchemaLeaf>,
    pub keys: BTreeSet<CanonicalKey>,
    /// Only leaves with a positive weight appear here. Colliding leaves add up.
    pub max_scores: BTreeMap<CanonicalKey, f64>,
    pub duplicates: Vec<DuplicateKey>,
    /// Leaves left out of the key space; their weight is not in `max_scores`.
    pub unkeyed: Vec<UnkeyedLeaf>,
}

impl FlattenedSchema {
    pub fn total_possible(&self) -> f64 {
        self.max_scores.values().sum()
    }

    pub fn max_score(&self, key: &CanonicalKey) -> Option<f64> {
        self.max_scores.get(key).copied()
    }

    pub fn contains(&self, key: &CanonicalKey) -> bool {
        self.keys.contains(key)
    }

    fn insert(&mut self, raw_id: &str, key: CanonicalKey, max_score: Option<f64>) {
        if !self.keys.insert(key.clone()) {
            let first_id = self
                .leaves
                .iter()
                .find(|leaf| leaf.key == key)
                .map(|leaf| leaf.raw_id.clone())
                .unwrap_or_default();
            self.duplicates.push(DuplicateKey {
                key: key.clone(),
                first_id,
                second_id: raw_id.to_string(),
            });
        }
        if let Some(max) = max_score {
            *self.max_scores.entry(key.clone()).or_insert(0.0) += max;
        }
        self.leaves.push(SchemaLeaf {
            raw_id: raw_id.to_string(),
            key,
            max_score,
        });
    }
}

/// Walk `root` depth-first and collect every leaf under its canonical key.
///
/// A leaf whose id yields no key (blank, nothing numeric in it, or a segment
/// too large for `u32`) inherits the key of its nearest keyed ancestor. With
/// no such ancestor it is recorded in `unkeyed` and left out of the key space.
/// Only a tree nested deeper than [`MAX_DEPTH`] is rejected.
pub fn flatten(root: &RubricNode) -> Result<FlattenedSchema, CoreError> {
    let mut schema = FlattenedSchema::default();
    if root.is_leaf() && root.id.trim().is_empty() {
        return Ok(schema);
    }
    walk(root, None, 0, &mut schema)?;
    info!(
        leaves = schema.leaves.len(),
        keys = schema.keys.len(),
        duplicates = schema.duplicates.len(),
        unkeyed = schema.unkeyed.len(),
        "flattened rubric"
    );
    Ok(schema)
}

fn walk(
    node: &RubricNode,
    inherited: Option<&CanonicalKey>,
    depth: usize,
    schema: &mut FlattenedSchema,
) -> Result<(), CoreError> {
    if depth > MAX_DEPTH {
        return Err(CoreError::TooDeep {
            id: node.id.clone(),
            max: MAX_DEPTH,
        });
    }

    let own = canonicalize_id(&node.id);
    let key = own.as_ref().or(inherited);

    if node.is_leaf() {
        let weight = node.max_score.filter(|m| m.is_finite() && *m > 0.0);
        let Some(key) = key else {
            warn!(id = %node.id, "leaf has no resolvable key and no keyed ancestor");
            schema.unkeyed.push(UnkeyedLeaf {
                raw_id: node.id.clone(),
                max_score: weight,
            });
            return Ok(());
        };
        if own.is_none() {
            debug!(id = %node.id, inherited = %key, "leaf id unresolved, using ancestor key");
        }
        schema.insert(&node.id, key.clone(), weight);
        return Ok(());
    }

    for child in &node.children {
        walk(child, key, depth + 1, schema)?;
    }
    Ok(())
}
