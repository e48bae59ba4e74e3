//! Spendlake - contract archive sync and schema-driven loading

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use spendlake_common::logging::{init_logging, LogConfig, LogLevel};
use spendlake_ingest::archive::{
    ArchiveSync, BulkUploader, HttpArchiveIndex, HttpFetcher, SyncCollaborators, ZipExtractor,
};
use spendlake_ingest::config::{LoadConfig, SyncConfig, DEFAULT_UPLOAD_PATTERN};
use spendlake_ingest::files::FilePattern;
use spendlake_ingest::pipeline::PipelineRunner;
use spendlake_ingest::schema::SchemaDefinition;
use spendlake_ingest::sink::JsonLinesSink;
use spendlake_ingest::storage::{ObjectStore, StorageConfig};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "spendlake")]
#[command(author, version, about = "Federal contract data lake tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download yearly archives, walking backward, and upload their files
    Sync {
        /// First fiscal year to fetch (default: the current fiscal year)
        #[arg(short = 'y', long)]
        start_year: Option<i32>,

        /// Local directory for downloads and extracted files
        #[arg(short, long)]
        staging_dir: Option<PathBuf>,

        /// Target bucket
        #[arg(short, long)]
        bucket: Option<String>,

        /// Archive listing endpoint
        #[arg(long)]
        index_url: Option<String>,

        /// Keep staged files unless every upload is confirmed
        #[arg(long)]
        verify: bool,

        /// Hide download progress bars
        #[arg(long)]
        no_progress: bool,
    },

    /// Upload every file matching a pattern
    Upload {
        /// File pattern, wildcards allowed in the file name
        #[arg(short, long, default_value = DEFAULT_UPLOAD_PATTERN)]
        pattern: String,

        /// Target bucket
        #[arg(short, long)]
        bucket: Option<String>,
    },

    /// Convert delimited files to typed JSON lines
    Load {
        /// Schema JSON file
        #[arg(short, long)]
        schema: Option<PathBuf>,

        /// Input file pattern
        #[arg(short, long)]
        input: Option<String>,

        /// Output JSON-lines file, replaced on every run
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // Environment variables take precedence over the flag
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("spendlake")
        .build()
        .merge_env()?;

    let _log_guard = init_logging(&log_config)?;

    match cli.command {
        Command::Sync {
            start_year,
            staging_dir,
            bucket,
            index_url,
            verify,
            no_progress,
        } => {
            let mut config = SyncConfig::from_env()?;
            if let Some(year) = start_year {
                config.start_year = year;
            }
            if let Some(dir) = staging_dir {
                config.staging_dir = dir;
            }
            if let Some(url) = index_url {
                config.index_url = url;
            }
            config.verify_uploads |= verify;
            config.show_progress &= !no_progress;
            config.validate()?;

            let store = object_store(bucket).await?;
            sync(&config, store).await?;
        },
        Command::Upload { pattern, bucket } => {
            let pattern = FilePattern::new(&pattern)?;
            let store = object_store(bucket).await?;
            let report = store.upload(&pattern).await?;
            println!(
                "Uploaded {} files ({} bytes) to {}",
                report.len(),
                report.bytes(),
                store.bucket()
            );
        },
        Command::Load {
            schema,
            input,
            output,
        } => {
            let mut config = LoadConfig::from_env();
            if let Some(schema) = schema {
                config.schema_path = schema;
            }
            if let Some(input) = input {
                config.input_pattern = input;
            }
            if let Some(output) = output {
                config.output_path = output;
            }
            config.validate()?;
            load(&config)?;
        },
    }

    info!("Done");
    Ok(())
}

async fn object_store(bucket: Option<String>) -> Result<ObjectStore> {
    let mut config = StorageConfig::from_env();
    if let Some(bucket) = bucket {
        config = config.with_bucket(bucket);
    }
    Ok(ObjectStore::new(config).await?)
}

async fn sync(config: &SyncConfig, store: ObjectStore) -> Result<()> {
    let collaborators = SyncCollaborators {
        index: Box::new(HttpArchiveIndex::new(config.index_url.clone())?),
        fetcher: Box::new(HttpFetcher::new(config.show_progress)),
        extractor: Box::new(ZipExtractor::new()),
        uploader: Box::new(store.clone()),
    };
    let archive_sync = ArchiveSync::new(collaborators, &config.staging_dir)
        .with_upload_verification(config.verify_uploads);

    let mut run = archive_sync.synchronize(config.start_year);
    let mut years = 0;
    while let Some(outcome) = run.next().await {
        let outcome = outcome.with_context(|| {
            format!("Sync stopped after {} completed fiscal years", years)
        })?;
        println!(
            "FY{}: {} -> {} files, {} uploaded ({} bytes)",
            outcome.fiscal_year,
            outcome.archive_name,
            outcome.renamed_files.len(),
            outcome.upload.len(),
            outcome.upload.bytes()
        );
        years += 1;
    }

    // Anything still staged from an earlier interrupted run
    let sweep = FilePattern::in_dir(&config.staging_dir, "*.csv")?;
    let report = store.upload(&sweep).await?;

    println!(
        "Synchronized {} fiscal years into {}; final sweep uploaded {} files",
        years,
        store.bucket(),
        report.len()
    );
    Ok(())
}

fn load(config: &LoadConfig) -> Result<()> {
    let definition = SchemaDefinition::load(&config.schema_path)
        .with_context(|| format!("Failed to load schema {}", config.schema_path.display()))?;
    let runner = PipelineRunner::new(definition)?;

    let files = FilePattern::new(&config.input_pattern)?.matching_files()?;
    if files.is_empty() {
        bail!("No input files match {}", config.input_pattern);
    }

    let mut sink = JsonLinesSink::new(config.output_path.clone());
    let summary = runner.run_files(&files, &mut sink)?;

    println!(
        "Loaded {} records from {} files into {}",
        summary.records,
        summary.sources,
        sink.path().display()
    );
    Ok(())
}
