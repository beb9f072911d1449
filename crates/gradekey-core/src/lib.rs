pub mod config;
pub mod error;
pub mod evaluation;
pub mod grade;
pub mod ingest;
pub mod key;
pub mod normalize;
pub mod reconcile;
pub mod rubric;
pub mod schema;

pub use config::{DEFAULT_TOLERANCE, GradingConfig};
pub use error::CoreError;
pub use evaluation::{Evaluation, EvaluationEntry, MappedEntry, Score, ScoreTable, map_evaluation};
pub use grade::{GradeOutcome, grade_submission};
pub use ingest::{parse_evaluation, parse_evaluation_str, parse_rubric, parse_rubric_str};
pub use key::CanonicalKey;
pub use normalize::{canonical_key, canonicalize_id, normalize, normalize_id};
pub use reconcile::{Finding, ReconciliationReport, check_total_possible, reconcile};
pub use rubric::{
    DuplicateKey, FlattenedSchema, MAX_DEPTH, RubricNode, SchemaLeaf, UnkeyedLeaf, flatten,
};
pub use schema::{score_table_batch, score_table_schema};
