// src/load/mod.rs

use anyhow::{Context, Result};
use arrow::{
    array::{ArrayRef, StringBuilder},
    record_batch::RecordBatch,
};
use csv::ReaderBuilder;
use std::{
    fs::File,
    io::{BufReader, ErrorKind, Read},
    path::Path,
    sync::Arc,
};
use tracing::{debug, info};

use crate::error::LoadError;
use crate::schema::{RAW_COLUMN_COUNT, RAW_SCHEMA};

/// How the delimited input is laid out.
#[derive(Debug, Clone, Copy)]
pub struct LoadOptions {
    /// Treat the first line as a header and skip it.
    pub has_header: bool,
    pub delimiter: u8,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            has_header: false,
            delimiter: b',',
        }
    }
}

/// Read the positional 16-column file at `path` into a single all-text batch.
///
/// Row order and row count are preserved and values are kept verbatim. The
/// whole file is parsed before returning, so a failure anywhere yields no
/// batch at all. Failures are [`LoadError`]s.
#[tracing::instrument(level = "info", skip(path, opts), fields(file = %path.as_ref().display()))]
pub fn load_raw<P: AsRef<Path>>(path: P, opts: &LoadOptions) -> Result<RecordBatch> {
    let path = path.as_ref();
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(LoadError::NotFound(path.to_path_buf()).into())
        }
        Err(e) => {
            return Err(LoadError::Unreadable {
                path: path.to_path_buf(),
                source: e,
            }
            .into())
        }
    };

    let batch = read_raw(BufReader::new(file), opts)?;
    info!(rows = batch.num_rows(), "loaded raw records");
    Ok(batch)
}

/// Parse delimited text from any reader. See [`load_raw`].
pub fn read_raw<R: Read>(reader: R, opts: &LoadOptions) -> Result<RecordBatch> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(opts.has_header)
        .delimiter(opts.delimiter)
        // field counts are checked below so the error names the line
        .flexible(true)
        .from_reader(reader);

    let mut builders: Vec<StringBuilder> =
        (0..RAW_COLUMN_COUNT).map(|_| StringBuilder::new()).collect();

    let mut rows = 0usize;
    for result in rdr.records() {
        let record = result.map_err(|source| LoadError::Malformed {
            line: source.position().map(|p| p.line()).unwrap_or(0),
            source,
        })?;

        if record.len() != RAW_COLUMN_COUNT {
            return Err(LoadError::ColumnCount {
                line: record.position().map(|p| p.line()).unwrap_or(0),
                expected: RAW_COLUMN_COUNT,
                found: record.len(),
            }
            .into());
        }

        for (builder, field) in builders.iter_mut().zip(record.iter()) {
            builder.append_value(field);
        }
        rows += 1;
    }
    debug!(rows, "parsed delimited input");

    let columns: Vec<ArrayRef> = builders
        .iter_mut()
        .map(|b| Arc::new(b.finish()) as ArrayRef)
        .collect();
    RecordBatch::try_new(RAW_SCHEMA.clone(), columns).context("building raw record batch")
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, StringArray};
    use std::io::Cursor;

    const ROWS: &str = "\
F1,General Hosp,1 Main St,Anytown,NY,10001,County,555-1234,Sepsis,M1,Measure One,85,120,,01/01/2023,01/31/2023
F2, Other Hosp ,2 Side St,Othertown,CA,90001,County,555-9999,Stroke,M2,Measure Two,N/A,40,note,02/01/2023,02/28/2023
";

    fn column<'a>(batch: &'a RecordBatch, idx: usize) -> &'a StringArray {
        batch
            .column(idx)
            .as_any()
            .downcast_ref::<StringArray>()
            .expect("raw columns are utf8")
    }

    #[test]
    fn preserves_rows_and_values_verbatim() -> Result<()> {
        let batch = read_raw(Cursor::new(ROWS), &LoadOptions::default())?;
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.num_columns(), 16);
        assert_eq!(column(&batch, 0).value(0), "F1");
        assert_eq!(column(&batch, 0).value(1), "F2");
        // no trimming at this stage
        assert_eq!(column(&batch, 1).value(1), " Other Hosp ");
        // empty fields stay empty strings
        assert_eq!(column(&batch, 13).value(0), "");
        assert_eq!(column(&batch, 13).null_count(), 0);
        assert_eq!(column(&batch, 11).value(1), "N/A");
        Ok(())
    }

    #[test]
    fn header_line_is_skipped_when_configured() -> Result<()> {
        let header = "a,b,c,d,e,f,g,h,i,j,k,l,m,n,o,p\n";
        let text = format!("{header}{ROWS}");
        let opts = LoadOptions {
            has_header: true,
            ..Default::default()
        };
        let batch = read_raw(Cursor::new(text), &opts)?;
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(column(&batch, 0).value(0), "F1");
        Ok(())
    }

    #[test]
    fn wrong_column_count_is_a_load_error() {
        let text = format!("{ROWS}F3,Short Row,only,four\n");
        let err = read_raw(Cursor::new(text), &LoadOptions::default()).unwrap_err();
        match err.downcast_ref::<LoadError>() {
            Some(LoadError::ColumnCount {
                line,
                expected,
                found,
            }) => {
                assert_eq!(*line, 3);
                assert_eq!(*expected, 16);
                assert_eq!(*found, 4);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn missing_file_is_a_load_error() {
        let err = load_raw("/definitely/not/here.csv", &LoadOptions::default()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LoadError>(),
            Some(LoadError::NotFound(_))
        ));
    }

    #[test]
    fn other_delimiters_are_supported() -> Result<()> {
        let text = ROWS.replace(',', "|");
        let opts = LoadOptions {
            delimiter: b'|',
            ..Default::default()
        };
        let batch = read_raw(Cursor::new(text), &opts)?;
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(column(&batch, 4).value(0), "NY");
        Ok(())
    }
}
