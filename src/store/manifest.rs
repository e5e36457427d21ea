// src/store/manifest.rs

use anyhow::{Context, Result};
use arrow::datatypes::Schema;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    io::Write,
    path::Path,
};

use super::Layer;

pub const MANIFEST_FILE: &str = "_manifest.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
}

/// Catalog entry stored next to a table's data files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub name: String,
    pub layer: Layer,
    pub rows: usize,
    /// Region codes, for partitioned tables; empty otherwise.
    pub partitions: Vec<String>,
    pub columns: Vec<ColumnInfo>,
    pub created_at: DateTime<Utc>,
}

impl Manifest {
    pub fn new(
        layer: Layer,
        name: &str,
        schema: &Schema,
        rows: usize,
        partitions: Vec<String>,
    ) -> Self {
        let columns = schema
            .fields()
            .iter()
            .map(|f| ColumnInfo {
                name: f.name().clone(),
                data_type: f.data_type().to_string(),
                nullable: f.is_nullable(),
            })
            .collect();
        Self {
            name: name.to_string(),
            layer,
            rows,
            partitions,
            columns,
            created_at: Utc::now(),
        }
    }

    /// Write `_manifest.json` into `dir` through a temporary file and rename.
    pub fn write_to(&self, dir: &Path) -> Result<()> {
        let path = dir.join(MANIFEST_FILE);
        let tmp_path = dir.join(format!(".{MANIFEST_FILE}.tmp"));

        let mut tmp = fs::File::create(&tmp_path)
            .with_context(|| format!("creating {}", tmp_path.display()))?;
        serde_json::to_writer_pretty(&mut tmp, self).context("serializing manifest")?;
        tmp.write_all(b"\n")?;

        fs::rename(&tmp_path, &path)
            .with_context(|| format!("renaming {} -> {}", tmp_path.display(), path.display()))?;
        Ok(())
    }

    pub fn read_from(dir: &Path) -> Result<Self> {
        let path = dir.join(MANIFEST_FILE);
        let f = fs::File::open(&path).with_context(|| format!("opening {}", path.display()))?;
        serde_json::from_reader(f).with_context(|| format!("parsing {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::CLEANED_SCHEMA;
    use tempfile::tempdir;

    #[test]
    fn manifest_survives_disk() -> Result<()> {
        let dir = tempdir()?;
        let m = Manifest::new(
            Layer::Silver,
            "hospital_clean",
            &CLEANED_SCHEMA,
            42,
            vec!["CA".into(), "NY".into()],
        );
        m.write_to(dir.path())?;
        let back = Manifest::read_from(dir.path())?;
        assert_eq!(back, m);
        assert_eq!(back.columns.len(), 16);
        assert_eq!(back.columns[11].data_type, "Int32");

        let text = fs::read_to_string(dir.path().join(MANIFEST_FILE))?;
        assert!(text.contains("\"layer\": \"silver\""));
        Ok(())
    }
}
