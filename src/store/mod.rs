// src/store/mod.rs

pub mod manifest;

use anyhow::{bail, Context, Result};
use arrow::{datatypes::SchemaRef, record_batch::RecordBatch};
use chrono::Utc;
use glob::{glob_with, MatchOptions};
use parquet::{
    arrow::{arrow_reader::ParquetRecordBatchReaderBuilder, ArrowWriter},
    basic::{BrotliLevel, Compression},
    file::properties::WriterProperties,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    fmt,
    fs::{self, File},
    io::BufWriter,
    path::{Path, PathBuf},
};
use tracing::{debug, info, warn};

use crate::clean::partition_dir_name;
pub use manifest::Manifest;
use manifest::MANIFEST_FILE;

/// Medallion layer a table belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    Bronze,
    Silver,
    Gold,
}

impl Layer {
    pub fn as_str(&self) -> &str {
        match self {
            Layer::Bronze => "bronze",
            Layer::Silver => "silver",
            Layer::Gold => "gold",
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A directory of Parquet tables, `<root>/<layer>/<table>/`.
///
/// Every write replaces the whole table: files go to a hidden staging
/// directory next to the table, which is then renamed over the old one.
/// Readers never see a half-written table.
pub struct Warehouse {
    root: PathBuf,
    compression_level: u32,
}

const PART_FILE: &str = "part-00000.parquet";

impl Warehouse {
    /// Open (creating if needed) the warehouse rooted at `root`.
    pub fn new(root: impl Into<PathBuf>, compression_level: u32) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("creating warehouse directory {}", root.display()))?;
        Ok(Self {
            root,
            compression_level,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn table_dir(&self, layer: Layer, name: &str) -> PathBuf {
        self.root.join(layer.as_str()).join(name)
    }

    /// Replace `layer/name` with a single-file table holding `batch`.
    #[tracing::instrument(level = "debug", skip(self, batch), fields(rows = batch.num_rows()))]
    pub fn replace_table(
        &self,
        layer: Layer,
        name: &str,
        batch: &RecordBatch,
    ) -> Result<Manifest> {
        self.replace_with(layer, name, batch.schema(), |staging| {
            self.write_parquet(&staging.join(PART_FILE), batch)?;
            Ok(Vec::new())
        })
    }

    /// Replace `layer/name` with one `region=<code>/` directory per partition.
    /// Partition files are written in parallel. Two partitions that resolve to
    /// the same directory are an error and leave the old table in place.
    #[tracing::instrument(
        level = "debug",
        skip(self, schema, parts),
        fields(partitions = parts.len())
    )]
    pub fn replace_partitioned(
        &self,
        layer: Layer,
        name: &str,
        schema: SchemaRef,
        parts: &[(String, RecordBatch)],
    ) -> Result<Manifest> {
        let mut dirs = HashSet::with_capacity(parts.len());
        for (region, _) in parts {
            if !dirs.insert(partition_dir_name(region)) {
                bail!("partition {region:?} of {layer}/{name} collides with another region");
            }
        }

        self.replace_with(layer, name, schema, |staging| {
            parts
                .par_iter()
                .map(|(region, batch)| {
                    let dir = staging.join(partition_dir_name(region));
                    fs::create_dir_all(&dir)
                        .with_context(|| format!("creating partition {}", dir.display()))?;
                    self.write_parquet(&dir.join(PART_FILE), batch)?;
                    debug!(region = %region, rows = batch.num_rows(), "wrote partition");
                    Ok(region.clone())
                })
                .collect::<Result<Vec<String>>>()
        })
    }

    fn replace_with<F>(
        &self,
        layer: Layer,
        name: &str,
        schema: SchemaRef,
        write: F,
    ) -> Result<Manifest>
    where
        F: FnOnce(&Path) -> Result<Vec<String>>,
    {
        let layer_dir = self.root.join(layer.as_str());
        fs::create_dir_all(&layer_dir)
            .with_context(|| format!("creating layer directory {}", layer_dir.display()))?;

        let ts = Utc::now().timestamp_micros();
        let staging = layer_dir.join(format!(".{name}.tmp-{ts}"));
        fs::create_dir_all(&staging)
            .with_context(|| format!("creating staging directory {}", staging.display()))?;

        let written = write(&staging).and_then(|partitions| {
            let rows = count_rows(&staging)?;
            let manifest = Manifest::new(layer, name, &schema, rows, partitions);
            manifest.write_to(&staging)?;
            Ok(manifest)
        });

        let manifest = match written {
            Ok(m) => m,
            Err(e) => {
                if let Err(rm) = fs::remove_dir_all(&staging) {
                    warn!(staging = %staging.display(), "failed to remove staging dir: {}", rm);
                }
                return Err(e);
            }
        };

        let final_dir = layer_dir.join(name);
        swap_in(&staging, &final_dir, &layer_dir.join(format!(".{name}.old-{ts}")))?;
        info!(
            table = %format!("{layer}/{name}"),
            rows = manifest.rows,
            partitions = manifest.partitions.len(),
            "replaced table"
        );
        Ok(manifest)
    }

    fn write_parquet(&self, path: &Path, batch: &RecordBatch) -> Result<()> {
        let props = WriterProperties::builder()
            .set_compression(Compression::BROTLI(BrotliLevel::try_new(
                self.compression_level,
            )?))
            .set_dictionary_enabled(true)
            .build();

        let file = File::create(path).with_context(|| format!("creating file {}", path.display()))?;
        let mut writer = ArrowWriter::try_new(BufWriter::new(file), batch.schema(), Some(props))
            .context("creating parquet writer")?;
        writer.write(batch).context("writing batch to parquet")?;
        writer.close().context("closing parquet writer")?;
        Ok(())
    }

    /// Read every batch of `layer/name`, partitions in directory order.
    pub fn read_table(&self, layer: Layer, name: &str) -> Result<Vec<RecordBatch>> {
        let dir = self.table_dir(layer, name);
        if !dir.is_dir() {
            bail!(
                "table {}/{} does not exist in {}; run the stage that produces it first",
                layer,
                name,
                self.root.display()
            );
        }
        let mut batches = Vec::new();
        for path in parquet_files(&dir)? {
            batches.extend(read_parquet(&path)?);
        }
        debug!(table = %format!("{layer}/{name}"), batches = batches.len(), "read table");
        Ok(batches)
    }

    pub fn read_manifest(&self, layer: Layer, name: &str) -> Result<Manifest> {
        Manifest::read_from(&self.table_dir(layer, name))
    }

    /// Manifests of every table in the warehouse, ordered by layer then name.
    pub fn list_tables(&self) -> Result<Vec<Manifest>> {
        let pattern = format!("{}/*/*/{}", self.root.display(), MANIFEST_FILE);
        let mut manifests = Vec::new();
        for entry in glob_with(&pattern, visible_only()).context("invalid manifest glob")? {
            let path = entry.context("reading manifest glob entry")?;
            if let Some(dir) = path.parent() {
                manifests.push(Manifest::read_from(dir)?);
            }
        }
        manifests.sort_by(|a, b| (a.layer, &a.name).cmp(&(b.layer, &b.name)));
        Ok(manifests)
    }
}

fn visible_only() -> MatchOptions {
    MatchOptions {
        require_literal_leading_dot: true,
        ..MatchOptions::new()
    }
}

fn parquet_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let pattern = format!("{}/**/*.parquet", dir.display());
    let mut files = Vec::new();
    for entry in glob_with(&pattern, visible_only()).context("invalid parquet glob")? {
        files.push(entry.context("reading parquet glob entry")?);
    }
    files.sort();
    Ok(files)
}

fn read_parquet(path: &Path) -> Result<Vec<RecordBatch>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)
        .with_context(|| format!("reading parquet metadata of {}", path.display()))?
        .build()
        .context("building parquet reader")?;
    reader
        .map(|b| b.with_context(|| format!("decoding {}", path.display())))
        .collect()
}

fn count_rows(dir: &Path) -> Result<usize> {
    let mut rows = 0;
    for path in parquet_files(dir)? {
        let file = File::open(&path).with_context(|| format!("opening {}", path.display()))?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)
            .with_context(|| format!("reading parquet metadata of {}", path.display()))?;
        rows += builder.metadata().file_metadata().num_rows() as usize;
    }
    Ok(rows)
}

/// Move `staging` to `final_dir`, parking any existing table at `old` until
/// the rename succeeded.
fn swap_in(staging: &Path, final_dir: &Path, old: &Path) -> Result<()> {
    let had_old = final_dir.exists();
    if had_old {
        fs::rename(final_dir, old).with_context(|| {
            format!("moving {} aside to {}", final_dir.display(), old.display())
        })?;
    }

    if let Err(e) = fs::rename(staging, final_dir) {
        if had_old {
            if let Err(restore) = fs::rename(old, final_dir) {
                warn!(old = %old.display(), "failed to restore previous table: {}", restore);
            }
        }
        return Err(e).with_context(|| {
            format!("renaming {} to {}", staging.display(), final_dir.display())
        });
    }

    if had_old {
        fs::remove_dir_all(old)
            .with_context(|| format!("removing previous table {}", old.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::{
        array::{ArrayRef, Int32Array, StringArray},
        datatypes::{DataType, Field, Schema},
    };
    use std::sync::Arc;
    use tempfile::tempdir;

    fn batch(names: &[&str], values: &[i32]) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("name", DataType::Utf8, false),
            Field::new("value", DataType::Int32, true),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(names.to_vec())) as ArrayRef,
                Arc::new(Int32Array::from(values.to_vec())) as ArrayRef,
            ],
        )
        .unwrap()
    }

    #[test]
    fn replace_overwrites_and_leaves_no_staging() -> Result<()> {
        let dir = tempdir()?;
        let wh = Warehouse::new(dir.path(), 5)?;

        wh.replace_table(Layer::Gold, "scores", &batch(&["a", "b"], &[1, 2]))?;
        let m = wh.replace_table(Layer::Gold, "scores", &batch(&["c"], &[3]))?;
        assert_eq!(m.rows, 1);

        let read = wh.read_table(Layer::Gold, "scores")?;
        let total: usize = read.iter().map(|b| b.num_rows()).sum();
        assert_eq!(total, 1);
        assert_eq!(read[0], batch(&["c"], &[3]));

        let leftovers: Vec<_> = fs::read_dir(dir.path().join("gold"))?
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(leftovers, vec!["scores".to_string()]);
        Ok(())
    }

    #[test]
    fn failed_write_keeps_previous_table() -> Result<()> {
        let dir = tempdir()?;
        let wh = Warehouse::new(dir.path(), 5)?;
        let first = batch(&["a"], &[1]);
        wh.replace_table(Layer::Silver, "t", &first)?;

        let schema = first.schema();
        let res = wh.replace_with(Layer::Silver, "t", schema, |_| anyhow::bail!("disk full"));
        assert!(res.is_err());

        let read = wh.read_table(Layer::Silver, "t")?;
        assert_eq!(read, vec![first]);
        assert_eq!(fs::read_dir(dir.path().join("silver"))?.count(), 1);
        Ok(())
    }

    #[test]
    fn partitioned_tables_round_trip_in_region_order() -> Result<()> {
        let dir = tempdir()?;
        let wh = Warehouse::new(dir.path(), 1)?;
        let parts = vec![
            ("CA".to_string(), batch(&["x"], &[1])),
            ("NY".to_string(), batch(&["y", "z"], &[2, 3])),
        ];
        let m = wh.replace_partitioned(Layer::Silver, "p", parts[0].1.schema(), &parts)?;
        assert_eq!(m.rows, 3);
        assert_eq!(m.partitions, vec!["CA".to_string(), "NY".to_string()]);
        assert!(dir.path().join("silver/p/region=NY").join(PART_FILE).is_file());

        let read = wh.read_table(Layer::Silver, "p")?;
        assert_eq!(read, vec![parts[0].1.clone(), parts[1].1.clone()]);
        Ok(())
    }

    #[test]
    fn empty_and_literal_default_regions_keep_all_rows() -> Result<()> {
        let dir = tempdir()?;
        let wh = Warehouse::new(dir.path(), 1)?;
        let parts = vec![
            (String::new(), batch(&["blank"], &[1])),
            ("__DEFAULT_PARTITION__".to_string(), batch(&["literal"], &[2])),
        ];
        let m = wh.replace_partitioned(Layer::Silver, "p", parts[0].1.schema(), &parts)?;
        assert_eq!(m.rows, 2);

        let read = wh.read_table(Layer::Silver, "p")?;
        let total: usize = read.iter().map(|b| b.num_rows()).sum();
        assert_eq!(total, 2);
        Ok(())
    }

    #[test]
    fn colliding_partitions_are_rejected() -> Result<()> {
        let dir = tempdir()?;
        let wh = Warehouse::new(dir.path(), 1)?;
        let parts = vec![
            ("NY".to_string(), batch(&["a"], &[1])),
            ("NY".to_string(), batch(&["b"], &[2])),
        ];
        assert!(wh
            .replace_partitioned(Layer::Silver, "p", parts[0].1.schema(), &parts)
            .is_err());
        assert!(!wh.table_dir(Layer::Silver, "p").exists());
        Ok(())
    }

    #[test]
    fn missing_table_is_an_error_and_listing_is_sorted() -> Result<()> {
        let dir = tempdir()?;
        let wh = Warehouse::new(dir.path(), 5)?;
        assert!(wh.read_table(Layer::Bronze, "nope").is_err());

        wh.replace_table(Layer::Gold, "b", &batch(&["a"], &[1]))?;
        wh.replace_table(Layer::Bronze, "z", &batch(&["a", "b"], &[1, 2]))?;
        let tables = wh.list_tables()?;
        let names: Vec<(Layer, &str)> = tables.iter().map(|m| (m.layer, m.name.as_str())).collect();
        assert_eq!(names, vec![(Layer::Bronze, "z"), (Layer::Gold, "b")]);
        assert_eq!(wh.read_manifest(Layer::Bronze, "z")?.rows, 2);
        Ok(())
    }
}
