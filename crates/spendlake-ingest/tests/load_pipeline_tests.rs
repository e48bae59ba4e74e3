//! Load pipeline over real files: schema file in, JSON lines out

use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::{json, Value};
use spendlake_common::SpendlakeError;
use spendlake_ingest::files::FilePattern;
use spendlake_ingest::pipeline::PipelineRunner;
use spendlake_ingest::schema::SchemaDefinition;
use spendlake_ingest::sink::JsonLinesSink;
use std::io::Write;
use std::path::Path;
use tempfile::TempDir;

const SCHEMA: &str = r#"{
  "schema": {
    "fields": [
      {"name": "contract_transaction_unique_key", "type": "STRING", "mode": "NULLABLE"},
      {"name": "federal_action_obligation", "type": "FLOAT"},
      {"name": "federal_action_obligation_log1p", "type": "FLOAT"},
      {"name": "number_of_offers_received", "type": "INTEGER"},
      {"name": "action_date", "type": "DATE"},
      {"name": "last_modified_date", "type": "DATETIME"},
      {"name": "1862_land_grant_college", "type": "BOOLEAN"}
    ]
  }
}"#;

const HEADER: &str = "contract_transaction_unique_key,federal_action_obligation,number_of_offers_received,action_date,last_modified_date,x1862_land_grant_college";

fn write_schema(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("schema.json");
    std::fs::write(&path, SCHEMA).unwrap();
    path
}

fn read_lines(path: &Path) -> Vec<Value> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[test]
fn test_schema_file_drives_conversion() {
    let dir = TempDir::new().unwrap();
    let schema = write_schema(dir.path());
    let input = dir.path().join("2019_all_contracts_prime_transactions_1.csv");
    std::fs::write(
        &input,
        format!(
            "{HEADER}\n\
             K1,1500.25,3,2018-10-01,2018-10-02 11:00:00,t\n\
             \"K2, amended\",-20,,2018-11-01,,NO\n\
             K3,,12,2018-12-01,2018-12-05 09:30:00,maybe\n"
        ),
    )
    .unwrap();

    let runner = PipelineRunner::new(SchemaDefinition::load(&schema).unwrap()).unwrap();
    assert_eq!(runner.schema().len(), 6);

    let output = dir.path().join("out").join("transactions.jsonl");
    let mut sink = JsonLinesSink::new(&output);
    let summary = runner.run_files(&[input], &mut sink).unwrap();
    assert_eq!(summary.records, 3);
    assert_eq!(summary.sources, 1);

    let rows = read_lines(&output);
    assert_eq!(
        rows[0],
        json!({
            "contract_transaction_unique_key": "K1",
            "federal_action_obligation": 1500.25,
            "number_of_offers_received": 3,
            "action_date": "2018-10-01",
            "last_modified_date": "2018-10-02 11:00:00",
            "x1862_land_grant_college": true
        })
    );
    assert_eq!(rows[1]["contract_transaction_unique_key"], "K2, amended");
    assert_eq!(rows[1]["federal_action_obligation"], -20.0);
    assert_eq!(rows[1]["number_of_offers_received"], Value::Null);
    assert_eq!(rows[1]["last_modified_date"], Value::Null);
    assert_eq!(rows[1]["x1862_land_grant_college"], false);
    assert_eq!(rows[2]["federal_action_obligation"], Value::Null);
    assert_eq!(rows[2]["x1862_land_grant_college"], "maybe");

    let sidecar: Value =
        serde_json::from_str(&std::fs::read_to_string(sink.schema_path()).unwrap()).unwrap();
    assert_eq!(sidecar.as_array().unwrap().len(), 6);
    assert_eq!(sidecar[5]["name"], "x1862_land_grant_college");
}

#[test]
fn test_matched_files_load_in_name_order_including_gzip() {
    let dir = TempDir::new().unwrap();
    let schema = write_schema(dir.path());
    let data = dir.path().join("data");
    std::fs::create_dir(&data).unwrap();

    std::fs::write(
        data.join("2018_part.csv"),
        format!("{HEADER}\nB1,1,1,2017-10-01,,Y\n"),
    )
    .unwrap();

    let mut gz = GzEncoder::new(
        std::fs::File::create(data.join("2017_part.csv.gz")).unwrap(),
        Compression::default(),
    );
    gz.write_all(format!("{HEADER}\r\nA1,2,2,2016-10-01,,N\r\n").as_bytes())
        .unwrap();
    gz.finish().unwrap();

    let files = FilePattern::in_dir(&data, "20??_part.csv*")
        .unwrap()
        .matching_files()
        .unwrap();
    assert_eq!(files.len(), 2);

    let runner = PipelineRunner::new(SchemaDefinition::load(&schema).unwrap()).unwrap();
    let output = dir.path().join("transactions.jsonl");
    let summary = runner
        .run_files(&files, &mut JsonLinesSink::new(&output))
        .unwrap();
    assert_eq!(summary.sources, 2);

    let keys: Vec<_> = read_lines(&output)
        .iter()
        .map(|row| row["contract_transaction_unique_key"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(keys, vec!["A1", "B1"]);
}

#[test]
fn test_malformed_number_reports_line_and_field() {
    let dir = TempDir::new().unwrap();
    let schema = write_schema(dir.path());
    let input = dir.path().join("bad.csv");
    std::fs::write(
        &input,
        format!("{HEADER}\nK1,1,1,2018-10-01,,t\nK2,1,three,2018-10-01,,t\n"),
    )
    .unwrap();

    let runner = PipelineRunner::new(SchemaDefinition::load(&schema).unwrap()).unwrap();
    let err = runner
        .run_files(&[input], &mut JsonLinesSink::new(dir.path().join("out.jsonl")))
        .unwrap_err();

    match err {
        SpendlakeError::Conversion { line, field, value, .. } => {
            assert_eq!(line, 3);
            assert_eq!(field, "number_of_offers_received");
            assert_eq!(value, "three");
        },
        other => panic!("expected conversion error, got {other:?}"),
    }
}

#[test]
fn test_rerun_replaces_previous_output() {
    let dir = TempDir::new().unwrap();
    let schema = write_schema(dir.path());
    let input = dir.path().join("in.csv");
    std::fs::write(&input, format!("{HEADER}\nK1,1,1,2018-10-01,,t\n")).unwrap();
    let output = dir.path().join("out.jsonl");

    let runner = PipelineRunner::new(SchemaDefinition::load(&schema).unwrap()).unwrap();
    for _ in 0..2 {
        runner
            .run_files(std::slice::from_ref(&input), &mut JsonLinesSink::new(&output))
            .unwrap();
    }

    assert_eq!(read_lines(&output).len(), 1);
}
