//! Spendlake Ingest Library
//!
//! Builds a data lake of federal contract transactions and loads it into
//! typed records.
//!
//! # Components
//!
//! - **Archive sync** ([`archive`]): walks fiscal years backward, downloading
//!   each year's full archive, unpacking and year-tagging its files, uploading
//!   them to object storage and clearing the staging directory
//! - **Record coercion** ([`coerce`]): one delimited line plus a schema in,
//!   one typed record out
//! - **Load pipeline** ([`pipeline`]): header-skipping line loop feeding a
//!   [`sink::RecordSink`]
//!
//! # Example
//!
//! ```no_run
//! use spendlake_ingest::pipeline::PipelineRunner;
//! use spendlake_ingest::schema::SchemaDefinition;
//! use spendlake_ingest::sink::JsonLinesSink;
//!
//! fn main() -> anyhow::Result<()> {
//!     let runner = PipelineRunner::new(SchemaDefinition::load("schema.json")?)?;
//!     let mut sink = JsonLinesSink::new("output/transactions.jsonl");
//!     let summary = runner.run_files(&["data/test.csv".into()], &mut sink)?;
//!     println!("{} records", summary.records);
//!     Ok(())
//! }
//! ```

pub mod archive;
pub mod coerce;
pub mod config;
pub mod files;
pub mod pipeline;
pub mod schema;
pub mod sink;
pub mod storage;
