//! Arrow layout for a reconciled score table.

use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, StringArray, UInt32Array};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;

use crate::{CoreError, FlattenedSchema, ScoreTable};

/// One row per rubric key.
///
/// `max` is the rubric weight, not the grader's; `earned` and `feedback` are
/// null for keys the grader never scored.
pub fn score_table_schema() -> Schema {
    Schema::new(vec![
        Field::new("key", DataType::Utf8, false),
        Field::new("question", DataType::UInt32, false),
        Field::new("earned", DataType::Float64, true),
        Field::new("max", DataType::Float64, true),
        Field::new("feedback", DataType::Utf8, true),
    ])
}

pub fn score_table_batch(
    schema: &FlattenedSchema,
    table: &ScoreTable,
) -> Result<RecordBatch, CoreError> {
    let keys: Vec<String> = schema.keys.iter().map(|k| k.to_string()).collect();
    let questions: Vec<u32> = schema.keys.iter().map(|k| k.question()).collect();
    let earned: Vec<Option<f64>> = schema
        .keys
        .iter()
        .map(|k| table.get(k).map(|s| s.earned))
        .collect();
    let max: Vec<Option<f64>> = schema.keys.iter().map(|k| schema.max_score(k)).collect();
    let feedback: Vec<Option<String>> = schema
        .keys
        .iter()
        .map(|k| table.get(k).and_then(|s| s.feedback.clone()))
        .collect();

    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from(keys)),
        Arc::new(UInt32Array::from(questions)),
        Arc::new(Float64Array::from(earned)),
        Arc::new(Float64Array::from(max)),
        Arc::new(StringArray::from(feedback)),
    ];
    let arrow_schema: SchemaRef = Arc::new(score_table_schema());
    Ok(RecordBatch::try_new(arrow_schema, columns)?)
}
