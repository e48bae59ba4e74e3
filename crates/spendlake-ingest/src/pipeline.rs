//! Load runner: delimited lines in, typed records out
//!
//! The first line of every source is its header and is never coerced.
//! Records reach the sink in exactly the order their lines were read.

use flate2::read::MultiGzDecoder;
use spendlake_common::Result;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use crate::coerce::{coerce, RawLine};
use crate::schema::{Schema, SchemaDefinition};
use crate::sink::RecordSink;

/// Counts for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadSummary {
    /// Sources read to the end
    pub sources: usize,
    pub records: u64,
    pub blank_lines: u64,
}

pub struct PipelineRunner {
    schema: Schema,
}

impl PipelineRunner {
    /// Normalize the declared schema once, before any line is read
    pub fn new(definition: SchemaDefinition) -> Result<Self> {
        let schema = definition.normalize()?;
        info!(columns = schema.len(), "Active schema ready");
        Ok(Self { schema })
    }

    /// Use an already-normalized schema as is
    pub fn with_schema(schema: Schema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Run a single line source into the sink
    pub fn run<R, S>(&self, source: R, sink: &mut S) -> Result<LoadSummary>
    where
        R: BufRead,
        S: RecordSink + ?Sized,
    {
        let mut summary = LoadSummary::default();
        sink.begin(&self.schema)?;
        self.consume("<input>", source, sink, &mut summary)?;
        sink.finish()?;
        Ok(summary)
    }

    /// Run several files, in the given order, into one sink
    ///
    /// The sink is replaced once at the start, not per file.
    pub fn run_files<S>(&self, files: &[PathBuf], sink: &mut S) -> Result<LoadSummary>
    where
        S: RecordSink + ?Sized,
    {
        let mut summary = LoadSummary::default();
        sink.begin(&self.schema)?;
        for path in files {
            info!(file = %path.display(), "Loading file");
            let source = open_source(path)?;
            self.consume(&path.display().to_string(), source, sink, &mut summary)?;
        }
        sink.finish()?;

        info!(
            sources = summary.sources,
            records = summary.records,
            "Load complete"
        );
        Ok(summary)
    }

    fn consume<R, S>(
        &self,
        source_name: &str,
        source: R,
        sink: &mut S,
        summary: &mut LoadSummary,
    ) -> Result<()>
    where
        R: BufRead,
        S: RecordSink + ?Sized,
    {
        let mut lines = source.lines();

        match lines.next() {
            Some(header) => self.check_header(source_name, &header?),
            None => {
                debug!(source = source_name, "Source is empty");
                summary.sources += 1;
                return Ok(());
            },
        }

        for (offset, line) in lines.enumerate() {
            let line = line?;
            // Header is line 1
            let index = offset + 2;

            // Only truly empty lines; whitespace is data
            if line.is_empty() {
                summary.blank_lines += 1;
                continue;
            }

            let record = coerce(&self.schema, RawLine::new(index, &line)).inspect_err(|e| {
                error!(source = source_name, line = index, error = %e, "Record conversion failed");
            })?;
            sink.write(&record)?;
            summary.records += 1;
        }

        summary.sources += 1;
        Ok(())
    }

    /// Warn when the file's columns cannot line up with the active schema
    ///
    /// Positional mapping is kept either way.
    fn check_header(&self, source_name: &str, header: &str) {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(header.as_bytes());
        let mut columns = csv::StringRecord::new();
        if reader.read_record(&mut columns).is_err() {
            warn!(source = source_name, "Header line is not valid delimited text");
            return;
        }

        if columns.len() != self.schema.len() {
            warn!(
                source = source_name,
                file_columns = columns.len(),
                schema_columns = self.schema.len(),
                "Column count differs from schema; values will be paired by position"
            );
        }

        for (position, name) in columns.iter().enumerate() {
            if self.schema.field_type(name).is_none() {
                debug!(source = source_name, position, column = name, "Column not in schema");
            }
        }
    }
}

/// Open a data file, transparently decompressing `.gz`
pub fn open_source(path: &Path) -> Result<Box<dyn BufRead>> {
    let file = File::open(path)?;
    let gzipped = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gz"));

    if gzipped {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coerce::FieldValue;
    use crate::schema::SchemaField;
    use crate::sink::MemorySink;
    use spendlake_common::SpendlakeError;
    use std::io::Cursor;

    fn runner() -> PipelineRunner {
        PipelineRunner::new(SchemaDefinition::new(vec![
            SchemaField::new("id", "STRING"),
            SchemaField::new("amount", "FLOAT"),
            SchemaField::new("amount_log1p", "FLOAT"),
            SchemaField::new("is_active", "BOOLEAN"),
        ]))
        .unwrap()
    }

    fn value(sink: &MemorySink, row: usize, column: usize) -> &FieldValue {
        &sink.records()[row][column].1
    }

    #[test]
    fn test_header_is_skipped_and_rows_coerced() {
        let runner = runner();
        let mut sink = MemorySink::new();
        let input = "id,amount,is_active\n\"1\",12.5,t\n2,,maybe\n";

        let summary = runner.run(Cursor::new(input), &mut sink).unwrap();

        assert_eq!(summary.records, 2);
        assert_eq!(summary.sources, 1);
        assert!(sink.is_finished());
        assert_eq!(sink.columns().len(), 3);
        assert_eq!(value(&sink, 0, 0), &FieldValue::Text("1".to_string()));
        assert_eq!(value(&sink, 0, 1), &FieldValue::Float(12.5));
        assert_eq!(value(&sink, 0, 2), &FieldValue::Bool(true));
        assert_eq!(value(&sink, 1, 1), &FieldValue::Null);
        assert_eq!(value(&sink, 1, 2), &FieldValue::Text("maybe".to_string()));
    }

    #[test]
    fn test_header_only_and_empty_sources() {
        let runner = runner();
        let mut sink = MemorySink::new();

        let summary = runner.run(Cursor::new("id,amount,is_active\n"), &mut sink).unwrap();
        assert_eq!(summary.records, 0);

        let summary = runner.run(Cursor::new(""), &mut sink).unwrap();
        assert_eq!(summary.records, 0);
        assert!(sink.is_finished());
    }

    #[test]
    fn test_blank_lines_and_crlf() {
        let runner = runner();
        let mut sink = MemorySink::new();
        let input = "id,amount,is_active\r\n1,1,N\r\n\r\n2,2,Y\r\n";

        let summary = runner.run(Cursor::new(input), &mut sink).unwrap();
        assert_eq!(summary.records, 2);
        assert_eq!(summary.blank_lines, 1);
        assert_eq!(value(&sink, 0, 2), &FieldValue::Bool(false));
        assert_eq!(value(&sink, 1, 2), &FieldValue::Bool(true));
    }

    #[test]
    fn test_whitespace_line_is_coerced_not_skipped() {
        let runner = runner();
        let mut sink = MemorySink::new();
        let input = "id,amount,is_active\n1,1,N\n   \n\n2,2,Y\n";

        let summary = runner.run(Cursor::new(input), &mut sink).unwrap();
        assert_eq!(summary.records, 3);
        assert_eq!(summary.blank_lines, 1);
        assert_eq!(sink.records()[1].len(), 1);
        assert_eq!(value(&sink, 1, 0), &FieldValue::Text("   ".to_string()));
        assert_eq!(value(&sink, 2, 2), &FieldValue::Bool(true));
    }

    #[test]
    fn test_conversion_error_aborts_run() {
        let runner = runner();
        let mut sink = MemorySink::new();
        let input = "id,amount,is_active\n1,1.0,t\n2,lots,t\n3,3.0,t\n";

        let err = runner.run(Cursor::new(input), &mut sink).unwrap_err();
        assert!(matches!(err, SpendlakeError::Conversion { line: 3, .. }));
        assert_eq!(sink.records().len(), 1);
        assert!(!sink.is_finished());
    }
}
