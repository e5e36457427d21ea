// src/aggregate/mod.rs

pub mod views;

use anyhow::{anyhow, Context, Result};
use arrow::{
    array::{Array, ArrayRef, Float64Array, Int32Array, Int64Array, StringArray},
    record_batch::RecordBatch,
};
use serde::Serialize;
use std::{collections::BTreeMap, sync::Arc};
use tracing::info;

use crate::schema::{
    CONDITION_NAME, FACILITY_ID, FACILITY_NAME, FACILITY_SUMMARY_SCHEMA, SCORE, STATE,
};

pub use views::{
    bottom_n, condition_comparison, region_comparison, top_n, ConditionScore, FacilityScore,
    RegionScore, Reports,
};

/// Average score of one facility for one condition in one region.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FacilitySummary {
    pub facility_id: String,
    pub facility_name: String,
    pub state: String,
    pub condition_name: String,
    /// Mean of the non-null scores; `None` when no row had a score.
    pub avg_score: Option<f64>,
    pub record_count: i64,
    pub scored_count: i64,
}

#[derive(Default)]
struct ScoreAcc {
    sum: i64,
    scored: i64,
    records: i64,
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    let idx = batch
        .schema()
        .index_of(name)
        .with_context(|| format!("cleaned batch has no column {name}"))?;
    batch
        .column(idx)
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| {
            anyhow!(
                "column {name} has unexpected type {:?}",
                batch.column(idx).data_type()
            )
        })
}

fn text(arr: &StringArray, row: usize) -> String {
    if arr.is_null(row) {
        String::new()
    } else {
        arr.value(row).to_string()
    }
}

/// Group cleaned rows by (facility, region, condition) and average their
/// scores, ignoring null scores.
///
/// Output is ordered by facility id, region, condition, facility name.
#[tracing::instrument(level = "info", skip(batches), fields(inputs = batches.len()))]
pub fn facility_summary(batches: &[RecordBatch]) -> Result<Vec<FacilitySummary>> {
    // key order gives the output order
    let mut groups: BTreeMap<(String, String, String, String), ScoreAcc> = BTreeMap::new();

    for batch in batches {
        let ids = column::<StringArray>(batch, FACILITY_ID)?;
        let names = column::<StringArray>(batch, FACILITY_NAME)?;
        let states = column::<StringArray>(batch, STATE)?;
        let conditions = column::<StringArray>(batch, CONDITION_NAME)?;
        let scores = column::<Int32Array>(batch, SCORE)?;

        for row in 0..batch.num_rows() {
            let key = (
                text(ids, row),
                text(states, row),
                text(conditions, row),
                text(names, row),
            );
            let acc = groups.entry(key).or_default();
            acc.records += 1;
            if scores.is_valid(row) {
                acc.sum += i64::from(scores.value(row));
                acc.scored += 1;
            }
        }
    }

    let summaries: Vec<FacilitySummary> = groups
        .into_iter()
        .map(|((facility_id, state, condition_name, facility_name), acc)| FacilitySummary {
            facility_id,
            facility_name,
            state,
            condition_name,
            avg_score: (acc.scored > 0).then(|| acc.sum as f64 / acc.scored as f64),
            record_count: acc.records,
            scored_count: acc.scored,
        })
        .collect();

    info!(groups = summaries.len(), "summarised facilities");
    Ok(summaries)
}

/// Gold layout of the facility summaries.
pub fn facility_summary_batch(rows: &[FacilitySummary]) -> Result<RecordBatch> {
    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.facility_id.as_str()))),
        Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.facility_name.as_str()))),
        Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.state.as_str()))),
        Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.condition_name.as_str()))),
        Arc::new(rows.iter().map(|r| r.avg_score).collect::<Float64Array>()),
        Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.record_count))),
        Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.scored_count))),
    ];
    RecordBatch::try_new(FACILITY_SUMMARY_SCHEMA.clone(), columns)
        .context("building facility summary batch")
}
