//! Destinations for typed records
//!
//! Every sink works in replace mode: [`RecordSink::begin`] discards whatever
//! an earlier run left behind, then records are appended strictly in the
//! order they are produced.

use serde_jsonlines::JsonLinesWriter;
use spendlake_common::{Result, SpendlakeError};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::coerce::{FieldValue, TypedRecord};
use crate::schema::{Schema, SchemaField};

/// Receives the records of one load run
pub trait RecordSink {
    /// Start a run with the declared columns, replacing existing contents
    fn begin(&mut self, schema: &Schema) -> Result<()>;

    fn write(&mut self, record: &TypedRecord<'_>) -> Result<()>;

    /// Make everything written durable
    fn finish(&mut self) -> Result<()>;
}

/// Newline-delimited JSON table, the warehouse's native load format
///
/// Next to the data file a `<stem>.schema.json` sidecar holds the declared
/// column list for the load job.
pub struct JsonLinesSink {
    path: PathBuf,
    writer: Option<JsonLinesWriter<BufWriter<File>>>,
    written: u64,
}

impl JsonLinesSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: None,
            written: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn schema_path(&self) -> PathBuf {
        self.path.with_extension("schema.json")
    }

    /// Records written since the last `begin`
    pub fn written(&self) -> u64 {
        self.written
    }
}

impl RecordSink for JsonLinesSink {
    fn begin(&mut self, schema: &Schema) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut schema_file = BufWriter::new(File::create(self.schema_path())?);
        serde_json::to_writer_pretty(&mut schema_file, schema.fields())?;
        schema_file.flush()?;

        // File::create truncates: this is the replace
        let file = File::create(&self.path)?;
        self.writer = Some(JsonLinesWriter::new(BufWriter::new(file)));
        self.written = 0;

        info!(
            path = %self.path.display(),
            columns = schema.len(),
            "Replacing table contents"
        );
        debug!(schema = %schema.type_list(), "Declared columns");
        Ok(())
    }

    fn write(&mut self, record: &TypedRecord<'_>) -> Result<()> {
        let writer = self.writer.as_mut().ok_or_else(|| {
            SpendlakeError::Storage(format!("Sink {} was not started", self.path.display()))
        })?;
        writer.write(record)?;
        self.written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        info!(path = %self.path.display(), records = self.written, "Table written");
        Ok(())
    }
}

/// Keeps records in memory, in arrival order
#[derive(Debug, Default)]
pub struct MemorySink {
    columns: Vec<SchemaField>,
    records: Vec<Vec<(String, FieldValue)>>,
    finished: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn columns(&self) -> &[SchemaField] {
        &self.columns
    }

    pub fn records(&self) -> &[Vec<(String, FieldValue)>] {
        &self.records
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl RecordSink for MemorySink {
    fn begin(&mut self, schema: &Schema) -> Result<()> {
        self.columns = schema.fields().to_vec();
        self.records.clear();
        self.finished = false;
        Ok(())
    }

    fn write(&mut self, record: &TypedRecord<'_>) -> Result<()> {
        self.records.push(
            record
                .iter()
                .map(|(name, value)| (name.to_string(), value.clone()))
                .collect(),
        );
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coerce::{coerce, RawLine};
    use tempfile::TempDir;

    fn schema() -> Schema {
        Schema::new(vec![
            SchemaField::new("id", "STRING"),
            SchemaField::new("amount", "FLOAT"),
        ])
        .unwrap()
    }

    #[test]
    fn test_json_lines_sink_replaces_contents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out").join("transactions.jsonl");
        let schema = schema();

        let mut sink = JsonLinesSink::new(&path);
        sink.begin(&schema).unwrap();
        sink.write(&coerce(&schema, RawLine::new(2, "a,1.5")).unwrap()).unwrap();
        sink.write(&coerce(&schema, RawLine::new(3, "b,")).unwrap()).unwrap();
        sink.finish().unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "{\"id\":\"a\",\"amount\":1.5}\n{\"id\":\"b\",\"amount\":null}\n");

        let mut sink = JsonLinesSink::new(&path);
        sink.begin(&schema).unwrap();
        sink.write(&coerce(&schema, RawLine::new(2, "c,2")).unwrap()).unwrap();
        sink.finish().unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "{\"id\":\"c\",\"amount\":2.0}\n");
        assert_eq!(sink.written(), 1);
    }

    #[test]
    fn test_json_lines_sink_writes_schema_sidecar() {
        let dir = TempDir::new().unwrap();
        let mut sink = JsonLinesSink::new(dir.path().join("table.jsonl"));
        sink.begin(&schema()).unwrap();
        sink.finish().unwrap();

        assert_eq!(sink.schema_path(), dir.path().join("table.schema.json"));
        let columns: Vec<SchemaField> =
            serde_json::from_str(&std::fs::read_to_string(sink.schema_path()).unwrap()).unwrap();
        assert_eq!(columns, schema().fields().to_vec());
    }

    #[test]
    fn test_write_before_begin_fails() {
        let dir = TempDir::new().unwrap();
        let schema = schema();
        let mut sink = JsonLinesSink::new(dir.path().join("table.jsonl"));
        let record = coerce(&schema, RawLine::new(2, "a,1")).unwrap();
        assert!(matches!(sink.write(&record), Err(SpendlakeError::Storage(_))));
    }

    #[test]
    fn test_memory_sink_begin_clears() {
        let schema = schema();
        let mut sink = MemorySink::new();
        sink.begin(&schema).unwrap();
        sink.write(&coerce(&schema, RawLine::new(2, "a,1")).unwrap()).unwrap();
        sink.begin(&schema).unwrap();
        assert!(sink.records().is_empty());
        assert_eq!(sink.columns().len(), 2);
    }
}
