// src/clean/mod.rs

pub mod cast;
pub mod partition;

use anyhow::{anyhow, Context, Result};
use arrow::{
    array::{Array, ArrayRef, Date32Builder, Int32Builder, StringArray, StringBuilder},
    datatypes::{DataType, Date32Type},
    record_batch::RecordBatch,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::schema::{
    cleaned_type, CLEANED_SCHEMA, END_DATE, FACILITY_ID, RAW_COLUMNS, RAW_COLUMN_COUNT, SAMPLE,
    SCORE, START_DATE,
};
use cast::{cast_int, parse_date};

pub use partition::{partition_by_region, partition_dir_name};

/// Data-quality counters for one cleaner run. A cast failure is a non-empty
/// value, on a retained row, that degraded to null.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanStats {
    pub input_rows: usize,
    pub output_rows: usize,
    pub dropped_missing_id: usize,
    pub score_failures: usize,
    pub sample_failures: usize,
    pub start_date_failures: usize,
    pub end_date_failures: usize,
}

impl CleanStats {
    fn record_failure(&mut self, column: &str) {
        match column {
            SCORE => self.score_failures += 1,
            SAMPLE => self.sample_failures += 1,
            START_DATE => self.start_date_failures += 1,
            END_DATE => self.end_date_failures += 1,
            _ => {}
        }
    }
}

#[derive(Debug)]
pub struct Cleaned {
    pub batch: RecordBatch,
    pub stats: CleanStats,
}

fn string_column<'a>(batch: &'a RecordBatch, idx: usize) -> Result<&'a StringArray> {
    batch
        .column(idx)
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| {
            anyhow!(
                "raw column {} ({}) is {:?}, expected Utf8",
                idx,
                RAW_COLUMNS[idx],
                batch.column(idx).data_type()
            )
        })
}

fn text(arr: &StringArray, row: usize) -> &str {
    if arr.is_null(row) {
        ""
    } else {
        arr.value(row)
    }
}

/// Turn a raw batch into its cleaned form.
///
/// - every string field is trimmed
/// - `score` / `sample` become Int32, null when uncastable
/// - `start_date` / `end_date` become Date32 via `date_format`, null when unparseable
/// - rows whose trimmed `facility_id` is empty are dropped
///
/// Pure: the same input always yields the same output.
#[tracing::instrument(level = "info", skip(raw), fields(rows = raw.num_rows()))]
pub fn clean(raw: &RecordBatch, date_format: &str) -> Result<Cleaned> {
    if raw.num_columns() != RAW_COLUMN_COUNT {
        anyhow::bail!(
            "raw batch has {} columns, expected {}",
            raw.num_columns(),
            RAW_COLUMN_COUNT
        );
    }

    let ids = string_column(raw, 0)?;
    let keep: Vec<usize> = (0..raw.num_rows())
        .filter(|&row| !text(ids, row).trim().is_empty())
        .collect();

    let mut stats = CleanStats {
        input_rows: raw.num_rows(),
        output_rows: keep.len(),
        dropped_missing_id: raw.num_rows() - keep.len(),
        ..Default::default()
    };

    let mut columns: Vec<ArrayRef> = Vec::with_capacity(RAW_COLUMN_COUNT);
    for (idx, name) in RAW_COLUMNS.iter().enumerate() {
        let src = string_column(raw, idx)?;
        let col: ArrayRef = match cleaned_type(name) {
            DataType::Int32 => {
                let mut b = Int32Builder::with_capacity(keep.len());
                for &row in &keep {
                    let v = text(src, row);
                    let cast = cast_int(v);
                    if cast.is_none() && !v.trim().is_empty() {
                        stats.record_failure(name);
                    }
                    b.append_option(cast);
                }
                Arc::new(b.finish())
            }
            DataType::Date32 => {
                let mut b = Date32Builder::with_capacity(keep.len());
                for &row in &keep {
                    let v = text(src, row);
                    let parsed = parse_date(v, date_format);
                    if parsed.is_none() && !v.trim().is_empty() {
                        stats.record_failure(name);
                    }
                    b.append_option(parsed.map(Date32Type::from_naive_date));
                }
                Arc::new(b.finish())
            }
            _ => {
                let mut b = StringBuilder::with_capacity(keep.len(), 0);
                for &row in &keep {
                    b.append_value(text(src, row).trim());
                }
                Arc::new(b.finish())
            }
        };
        columns.push(col);
    }

    let batch = RecordBatch::try_new(CLEANED_SCHEMA.clone(), columns)
        .context("building cleaned record batch")?;

    if stats.dropped_missing_id > 0 {
        warn!(
            dropped = stats.dropped_missing_id,
            column = FACILITY_ID,
            "dropped rows without facility id"
        );
    }
    info!(
        input = stats.input_rows,
        output = stats.output_rows,
        score_failures = stats.score_failures,
        sample_failures = stats.sample_failures,
        start_date_failures = stats.start_date_failures,
        end_date_failures = stats.end_date_failures,
        "cleaned raw records"
    );

    Ok(Cleaned { batch, stats })
}
