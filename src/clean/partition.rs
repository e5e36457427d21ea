// src/clean/partition.rs

use anyhow::{anyhow, Context, Result};
use arrow::{
    array::{Array, StringArray, UInt32Array},
    compute::take_record_batch,
    record_batch::RecordBatch,
};
use std::collections::BTreeMap;

use crate::schema::STATE;

/// Directory used for rows with an empty region code.
pub const DEFAULT_PARTITION: &str = "__DEFAULT_PARTITION__";

/// Split a cleaned batch into one batch per region code.
///
/// Partitions come back ordered by region code and keep the input row order
/// inside each partition. Layout only: concatenating the partitions gives the
/// same multiset of rows.
pub fn partition_by_region(batch: &RecordBatch) -> Result<Vec<(String, RecordBatch)>> {
    let idx = batch
        .schema()
        .index_of(STATE)
        .context("cleaned batch has no region column")?;
    let regions = batch
        .column(idx)
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| anyhow!("region column must be Utf8"))?;

    let mut rows_by_region: BTreeMap<&str, Vec<u32>> = BTreeMap::new();
    for row in 0..regions.len() {
        let region = if regions.is_null(row) {
            ""
        } else {
            regions.value(row)
        };
        rows_by_region.entry(region).or_default().push(row as u32);
    }

    rows_by_region
        .into_iter()
        .map(|(region, rows)| {
            let part = take_record_batch(batch, &UInt32Array::from(rows))
                .with_context(|| format!("selecting rows for region {region:?}"))?;
            Ok((region.to_string(), part))
        })
        .collect()
}

/// `region=<code>` with the code escaped for use as a path component.
///
/// Distinct codes always get distinct names. A leading `_` is escaped, so no
/// real code can land on the [`DEFAULT_PARTITION`] directory.
pub fn partition_dir_name(region: &str) -> String {
    if region.is_empty() {
        return format!("region={DEFAULT_PARTITION}");
    }
    let mut escaped = String::with_capacity(region.len());
    for (i, b) in region.bytes().enumerate() {
        let keep = b.is_ascii_alphanumeric() || b == b'-' || (b == b'_' && i > 0);
        if keep {
            escaped.push(b as char);
        } else {
            escaped.push_str(&format!("%{b:02X}"));
        }
    }
    format!("region={escaped}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clean::clean;
    use crate::load::{read_raw, LoadOptions};
    use std::io::Cursor;

    #[test]
    fn groups_rows_by_region_in_order() -> Result<()> {
        let raw = read_raw(
            Cursor::new(
                "\
F1,A,x,x,NY,x,x,x,Sepsis,x,x,90,1,,01/01/2023,01/31/2023
F2,B,x,x,CA,x,x,x,Sepsis,x,x,80,1,,01/01/2023,01/31/2023
F3,C,x,x,NY,x,x,x,Sepsis,x,x,70,1,,01/01/2023,01/31/2023
F4,D,x,x,,x,x,x,Sepsis,x,x,60,1,,01/01/2023,01/31/2023
",
            ),
            &LoadOptions::default(),
        )?;
        let cleaned = clean(&raw, "%m/%d/%Y")?.batch;
        let parts = partition_by_region(&cleaned)?;

        let names: Vec<&str> = parts.iter().map(|(r, _)| r.as_str()).collect();
        assert_eq!(names, vec!["", "CA", "NY"]);
        let total: usize = parts.iter().map(|(_, b)| b.num_rows()).sum();
        assert_eq!(total, cleaned.num_rows());

        let ny = &parts[2].1;
        let ids: &StringArray = ny.column(0).as_any().downcast_ref().unwrap();
        assert_eq!(ids.value(0), "F1");
        assert_eq!(ids.value(1), "F3");
        Ok(())
    }

    #[test]
    fn directory_names_are_path_safe() {
        assert_eq!(partition_dir_name("NY"), "region=NY");
        assert_eq!(partition_dir_name(""), "region=__DEFAULT_PARTITION__");
        assert_eq!(partition_dir_name("A/B"), "region=A%2FB");
        assert_eq!(partition_dir_name(".."), "region=%2E%2E");
        assert_eq!(partition_dir_name("A_B"), "region=A_B");
    }

    #[test]
    fn literal_default_code_does_not_share_the_empty_region_directory() {
        let empty = partition_dir_name("");
        let literal = partition_dir_name(DEFAULT_PARTITION);
        assert_ne!(empty, literal);
        assert_eq!(literal, "region=%5F_DEFAULT_PARTITION__");
        assert_ne!(partition_dir_name("_x"), partition_dir_name("%5Fx"));
    }
}
