// src/aggregate/views.rs

use anyhow::{Context, Result};
use arrow::{
    array::{ArrayRef, Float64Array, StringArray},
    record_batch::RecordBatch,
};
use serde::Serialize;
use std::{cmp::Ordering, collections::BTreeMap, sync::Arc};

use super::FacilitySummary;
use crate::schema::{
    BOTTOM_FACILITIES_SCHEMA, CONDITION_COMPARISON_SCHEMA, REGION_COMPARISON_SCHEMA,
    TOP_FACILITIES_SCHEMA,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FacilityScore {
    pub facility_id: String,
    pub facility_name: String,
    pub state: String,
    pub condition_name: String,
    pub avg_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionScore {
    pub state: String,
    pub avg_state_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConditionScore {
    pub condition_name: String,
    pub avg_condition_score: f64,
}

fn ranked(
    summaries: &[FacilitySummary],
    region: &str,
    n: usize,
    descending: bool,
) -> Vec<FacilityScore> {
    let mut rows: Vec<FacilityScore> = summaries
        .iter()
        .filter(|s| s.state == region)
        .filter_map(|s| {
            s.avg_score.map(|avg_score| FacilityScore {
                facility_id: s.facility_id.clone(),
                facility_name: s.facility_name.clone(),
                state: s.state.clone(),
                condition_name: s.condition_name.clone(),
                avg_score,
            })
        })
        .collect();

    rows.sort_by(|a, b| {
        let by_score = a.avg_score.total_cmp(&b.avg_score);
        let by_score = if descending { by_score.reverse() } else { by_score };
        by_score
            .then_with(|| a.facility_id.cmp(&b.facility_id))
            .then_with(|| a.condition_name.cmp(&b.condition_name))
    });
    rows.truncate(n);
    rows
}

/// Highest `n` averages in `region`. Groups without any score are skipped;
/// ties go to the lower facility id, then condition name.
pub fn top_n(summaries: &[FacilitySummary], region: &str, n: usize) -> Vec<FacilityScore> {
    ranked(summaries, region, n, true)
}

/// Lowest `n` averages in `region`, same tie-break as [`top_n`].
pub fn bottom_n(summaries: &[FacilitySummary], region: &str, n: usize) -> Vec<FacilityScore> {
    ranked(summaries, region, n, false)
}

/// Round half away from zero to 2 decimals, going by the shortest decimal
/// text of `v` rather than its binary value: 1.005 becomes 1.01.
fn round2(v: f64) -> f64 {
    let text = v.abs().to_string();
    let Some((whole, frac)) = text.split_once('.') else {
        return v;
    };
    if frac.len() <= 2 {
        return v;
    }
    let Ok(mut cents) = format!("{whole}{}", &frac[..2]).parse::<f64>() else {
        return (v * 100.0).round() / 100.0;
    };
    if frac.as_bytes()[2] >= b'5' {
        cents += 1.0;
    }
    (cents / 100.0).copysign(v)
}

fn descending_then_key(a: (f64, &str), b: (f64, &str)) -> Ordering {
    b.0.total_cmp(&a.0).then_with(|| a.1.cmp(b.1))
}

/// Mean of the facility averages per region, rounded to 2 decimals.
pub fn region_comparison(summaries: &[FacilitySummary]) -> Vec<RegionScore> {
    let mut acc: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
    for s in summaries {
        if let Some(avg) = s.avg_score {
            let e = acc.entry(s.state.as_str()).or_insert((0.0, 0));
            e.0 += avg;
            e.1 += 1;
        }
    }

    let mut rows: Vec<RegionScore> = acc
        .into_iter()
        .map(|(state, (sum, count))| RegionScore {
            state: state.to_string(),
            avg_state_score: round2(sum / count as f64),
        })
        .collect();
    rows.sort_by(|a, b| {
        descending_then_key(
            (a.avg_state_score, a.state.as_str()),
            (b.avg_state_score, b.state.as_str()),
        )
    });
    rows
}

/// Mean number of records per facility summary, per condition.
pub fn condition_comparison(summaries: &[FacilitySummary]) -> Vec<ConditionScore> {
    let mut acc: BTreeMap<&str, (i64, usize)> = BTreeMap::new();
    for s in summaries {
        let e = acc.entry(s.condition_name.as_str()).or_insert((0, 0));
        e.0 += s.record_count;
        e.1 += 1;
    }

    let mut rows: Vec<ConditionScore> = acc
        .into_iter()
        .map(|(condition_name, (records, groups))| ConditionScore {
            condition_name: condition_name.to_string(),
            avg_condition_score: records as f64 / groups as f64,
        })
        .collect();
    rows.sort_by(|a, b| {
        descending_then_key(
            (a.avg_condition_score, a.condition_name.as_str()),
            (b.avg_condition_score, b.condition_name.as_str()),
        )
    });
    rows
}

/// The four reporting views over one set of facility summaries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reports {
    pub region: String,
    pub top: Vec<FacilityScore>,
    pub bottom: Vec<FacilityScore>,
    pub regions: Vec<RegionScore>,
    pub conditions: Vec<ConditionScore>,
}

impl Reports {
    pub fn compute(summaries: &[FacilitySummary], region: &str, n: usize) -> Self {
        Self {
            region: region.to_string(),
            top: top_n(summaries, region, n),
            bottom: bottom_n(summaries, region, n),
            regions: region_comparison(summaries),
            conditions: condition_comparison(summaries),
        }
    }

    pub fn top_batch(&self) -> Result<RecordBatch> {
        let top = &self.top;
        let columns: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from_iter_values(top.iter().map(|r| r.facility_name.as_str()))),
            Arc::new(StringArray::from_iter_values(top.iter().map(|r| r.state.as_str()))),
            Arc::new(StringArray::from_iter_values(top.iter().map(|r| r.condition_name.as_str()))),
            Arc::new(Float64Array::from_iter_values(top.iter().map(|r| r.avg_score))),
        ];
        RecordBatch::try_new(TOP_FACILITIES_SCHEMA.clone(), columns)
            .context("building top facilities batch")
    }

    pub fn bottom_batch(&self) -> Result<RecordBatch> {
        let bottom = &self.bottom;
        let columns: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from_iter_values(
                bottom.iter().map(|r| r.facility_name.as_str()),
            )),
            Arc::new(Float64Array::from_iter_values(bottom.iter().map(|r| r.avg_score))),
        ];
        RecordBatch::try_new(BOTTOM_FACILITIES_SCHEMA.clone(), columns)
            .context("building bottom facilities batch")
    }

    pub fn regions_batch(&self) -> Result<RecordBatch> {
        let regions = &self.regions;
        let columns: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from_iter_values(regions.iter().map(|r| r.state.as_str()))),
            Arc::new(Float64Array::from_iter_values(regions.iter().map(|r| r.avg_state_score))),
        ];
        RecordBatch::try_new(REGION_COMPARISON_SCHEMA.clone(), columns)
            .context("building region comparison batch")
    }

    pub fn conditions_batch(&self) -> Result<RecordBatch> {
        let conditions = &self.conditions;
        let columns: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from_iter_values(
                conditions.iter().map(|r| r.condition_name.as_str()),
            )),
            Arc::new(Float64Array::from_iter_values(
                conditions.iter().map(|r| r.avg_condition_score),
            )),
        ];
        RecordBatch::try_new(CONDITION_COMPARISON_SCHEMA.clone(), columns)
            .context("building condition comparison batch")
    }
}
