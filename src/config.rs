// src/config.rs

use anyhow::{Context, Result};
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::load::LoadOptions;

pub const DEFAULT_DATE_FORMAT: &str = "%m/%d/%Y";
pub const DEFAULT_TOP_N: usize = 20;

/// Pipeline settings, read from a YAML file. Every field has a default so an
/// empty file (or no file) is a valid configuration.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Root directory holding the bronze/silver/gold tables.
    pub warehouse: PathBuf,
    /// Input file for the raw loader.
    pub input: Option<PathBuf>,
    /// Skip the first line of the input.
    pub has_header: bool,
    pub delimiter: char,
    /// chrono pattern used for `start_date` / `end_date`.
    pub date_format: String,
    /// Region the top/bottom facility lists are filtered to.
    pub report_region: String,
    pub top_n: usize,
    /// Brotli level for every parquet file written.
    pub compression_level: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            warehouse: PathBuf::from("warehouse"),
            input: None,
            has_header: false,
            delimiter: ',',
            date_format: DEFAULT_DATE_FORMAT.to_string(),
            report_region: "NY".to_string(),
            top_n: DEFAULT_TOP_N,
            compression_level: 5,
        }
    }
}

impl PipelineConfig {
    /// Read a YAML config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_yaml(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        // serde_yaml rejects an empty document for a struct
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let cfg: Self = serde_yaml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.delimiter.is_ascii() {
            anyhow::bail!("delimiter must be a single ASCII character, got {:?}", self.delimiter);
        }
        if self.top_n == 0 {
            anyhow::bail!("top_n must be at least 1");
        }
        if !(1..=11).contains(&self.compression_level) {
            anyhow::bail!(
                "compression_level must be between 1 and 11, got {}",
                self.compression_level
            );
        }
        Ok(())
    }

    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            has_header: self.has_header,
            delimiter: self.delimiter as u8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_yaml_gives_defaults() -> Result<()> {
        let cfg = PipelineConfig::from_yaml("")?;
        assert_eq!(cfg, PipelineConfig::default());
        assert_eq!(cfg.top_n, 20);
        assert_eq!(cfg.date_format, "%m/%d/%Y");
        Ok(())
    }

    #[test]
    fn partial_yaml_overrides_only_given_fields() -> Result<()> {
        let cfg = PipelineConfig::from_yaml(
            "warehouse: /tmp/lake\nhas_header: true\nreport_region: CA\ntop_n: 5\n",
        )?;
        assert_eq!(cfg.warehouse, PathBuf::from("/tmp/lake"));
        assert!(cfg.has_header);
        assert_eq!(cfg.report_region, "CA");
        assert_eq!(cfg.top_n, 5);
        assert_eq!(cfg.delimiter, ',');
        Ok(())
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(PipelineConfig::from_yaml("top_n: 0").is_err());
        assert!(PipelineConfig::from_yaml("compression_level: 40").is_err());
        assert!(PipelineConfig::from_yaml("no_such_field: 1").is_err());
    }
}
