// src/schema.rs

use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use once_cell::sync::Lazy;
use std::sync::Arc;

pub const FACILITY_ID: &str = "facility_id";
pub const FACILITY_NAME: &str = "facility_name";
pub const STATE: &str = "state";
pub const CONDITION_NAME: &str = "condition_name";
pub const SCORE: &str = "score";
pub const SAMPLE: &str = "sample";
pub const START_DATE: &str = "start_date";
pub const END_DATE: &str = "end_date";

/// Positional column names of the input file, in file order.
pub const RAW_COLUMNS: [&str; 16] = [
    FACILITY_ID,
    FACILITY_NAME,
    "address",
    "city",
    STATE,
    "zip_code",
    "county_name",
    "phone_number",
    CONDITION_NAME,
    "measure_id",
    "measure_name",
    SCORE,
    SAMPLE,
    "footnote",
    START_DATE,
    END_DATE,
];

pub const RAW_COLUMN_COUNT: usize = RAW_COLUMNS.len();

/// Bronze layout: every column kept as text, exactly as read.
pub static RAW_SCHEMA: Lazy<SchemaRef> = Lazy::new(|| {
    let fields: Vec<Field> = RAW_COLUMNS
        .iter()
        .map(|name| Field::new(*name, DataType::Utf8, false))
        .collect();
    Arc::new(Schema::new(fields))
});

/// Silver layout: same columns, with the numeric and date fields typed.
pub static CLEANED_SCHEMA: Lazy<SchemaRef> = Lazy::new(|| {
    let fields: Vec<Field> = RAW_COLUMNS
        .iter()
        .map(|name| Field::new(*name, cleaned_type(name), is_nullable(name)))
        .collect();
    Arc::new(Schema::new(fields))
});

/// Target type of a column once the cleaner has run.
pub fn cleaned_type(name: &str) -> DataType {
    match name {
        SCORE | SAMPLE => DataType::Int32,
        START_DATE | END_DATE => DataType::Date32,
        _ => DataType::Utf8,
    }
}

fn is_nullable(name: &str) -> bool {
    !matches!(cleaned_type(name), DataType::Utf8)
}

pub static FACILITY_SUMMARY_SCHEMA: Lazy<SchemaRef> = Lazy::new(|| {
    Arc::new(Schema::new(vec![
        Field::new(FACILITY_ID, DataType::Utf8, false),
        Field::new(FACILITY_NAME, DataType::Utf8, false),
        Field::new(STATE, DataType::Utf8, false),
        Field::new(CONDITION_NAME, DataType::Utf8, false),
        Field::new("avg_score", DataType::Float64, true),
        Field::new("record_count", DataType::Int64, false),
        Field::new("scored_count", DataType::Int64, false),
    ]))
});

pub static TOP_FACILITIES_SCHEMA: Lazy<SchemaRef> = Lazy::new(|| {
    Arc::new(Schema::new(vec![
        Field::new(FACILITY_NAME, DataType::Utf8, false),
        Field::new(STATE, DataType::Utf8, false),
        Field::new(CONDITION_NAME, DataType::Utf8, false),
        Field::new("avg_score", DataType::Float64, false),
    ]))
});

pub static BOTTOM_FACILITIES_SCHEMA: Lazy<SchemaRef> = Lazy::new(|| {
    Arc::new(Schema::new(vec![
        Field::new(FACILITY_NAME, DataType::Utf8, false),
        Field::new("avg_score", DataType::Float64, false),
    ]))
});

pub static REGION_COMPARISON_SCHEMA: Lazy<SchemaRef> = Lazy::new(|| {
    Arc::new(Schema::new(vec![
        Field::new(STATE, DataType::Utf8, false),
        Field::new("avg_state_score", DataType::Float64, false),
    ]))
});

pub static CONDITION_COMPARISON_SCHEMA: Lazy<SchemaRef> = Lazy::new(|| {
    Arc::new(Schema::new(vec![
        Field::new(CONDITION_NAME, DataType::Utf8, false),
        Field::new("avg_condition_score", DataType::Float64, false),
    ]))
});

/// Index of `name` within the positional layout.
pub fn column_index(name: &str) -> Option<usize> {
    RAW_COLUMNS.iter().position(|c| *c == name)
}
