// src/pipeline.rs

use anyhow::{Context, Result};
use arrow::compute::concat_batches;
use std::{path::Path, time::Instant};
use tracing::info;

use crate::{
    aggregate::{facility_summary, facility_summary_batch, FacilitySummary, Reports},
    clean::{clean, partition_by_region, CleanStats},
    config::PipelineConfig,
    load::load_raw,
    schema::{CLEANED_SCHEMA, RAW_SCHEMA},
    store::{Layer, Manifest, Warehouse},
};

pub const RAW_TABLE: &str = "hospital_raw";
pub const CLEAN_TABLE: &str = "hospital_clean";
pub const FACILITY_SUMMARY_TABLE: &str = "facility_summary";
pub const TOP_TABLE: &str = "top_facilities";
pub const BOTTOM_TABLE: &str = "bottom_facilities";
pub const REGION_TABLE: &str = "region_comparison";
pub const CONDITION_TABLE: &str = "condition_comparison";

/// Everything one full run produced.
#[derive(Debug)]
pub struct RunSummary {
    pub bronze: Manifest,
    pub silver: Manifest,
    pub stats: CleanStats,
    pub reports: Reports,
}

/// Load → clean → aggregate over one warehouse. Each stage reads what the
/// previous one persisted and replaces its own output tables wholesale.
pub struct Pipeline {
    config: PipelineConfig,
    warehouse: Warehouse,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let warehouse = Warehouse::new(&config.warehouse, config.compression_level)?;
        Ok(Self { config, warehouse })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn warehouse(&self) -> &Warehouse {
        &self.warehouse
    }

    /// Bronze: materialise the input file unchanged.
    #[tracing::instrument(level = "info", skip(self, input), fields(file = %input.display()))]
    pub fn load(&self, input: &Path) -> Result<Manifest> {
        let raw = load_raw(input, &self.config.load_options())?;
        self.warehouse.replace_table(Layer::Bronze, RAW_TABLE, &raw)
    }

    /// Silver: clean the bronze table and write it partitioned by region.
    #[tracing::instrument(level = "info", skip(self))]
    pub fn clean(&self) -> Result<(Manifest, CleanStats)> {
        let batches = self.warehouse.read_table(Layer::Bronze, RAW_TABLE)?;
        let raw = concat_batches(&RAW_SCHEMA, &batches).context("combining bronze batches")?;

        let cleaned = clean(&raw, &self.config.date_format)?;
        let parts = partition_by_region(&cleaned.batch)?;
        let manifest = self.warehouse.replace_partitioned(
            Layer::Silver,
            CLEAN_TABLE,
            CLEANED_SCHEMA.clone(),
            &parts,
        )?;
        Ok((manifest, cleaned.stats))
    }

    fn summaries(&self) -> Result<Vec<FacilitySummary>> {
        let batches = self.warehouse.read_table(Layer::Silver, CLEAN_TABLE)?;
        facility_summary(&batches)
    }

    /// Gold: facility summaries plus the four reporting views, all persisted.
    #[tracing::instrument(level = "info", skip(self))]
    pub fn aggregate(&self) -> Result<Reports> {
        let summaries = self.summaries()?;
        self.warehouse.replace_table(
            Layer::Gold,
            FACILITY_SUMMARY_TABLE,
            &facility_summary_batch(&summaries)?,
        )?;

        let reports = Reports::compute(&summaries, &self.config.report_region, self.config.top_n);
        self.warehouse.replace_table(Layer::Gold, TOP_TABLE, &reports.top_batch()?)?;
        self.warehouse.replace_table(Layer::Gold, BOTTOM_TABLE, &reports.bottom_batch()?)?;
        self.warehouse.replace_table(Layer::Gold, REGION_TABLE, &reports.regions_batch()?)?;
        self.warehouse.replace_table(Layer::Gold, CONDITION_TABLE, &reports.conditions_batch()?)?;
        Ok(reports)
    }

    /// Recompute the views from the silver table without writing anything.
    pub fn report(&self, region: &str, n: usize) -> Result<Reports> {
        let summaries = self.summaries()?;
        Ok(Reports::compute(&summaries, region, n))
    }

    /// All three stages in order; stops at the first failing stage.
    pub fn run(&self, input: &Path) -> Result<RunSummary> {
        let start = Instant::now();
        let bronze = self.load(input)?;
        let (silver, stats) = self.clean()?;
        let reports = self.aggregate()?;
        info!(
            bronze_rows = bronze.rows,
            silver_rows = silver.rows,
            elapsed = ?start.elapsed(),
            "pipeline finished"
        );
        Ok(RunSummary {
            bronze,
            silver,
            stats,
            reports,
        })
    }
}
