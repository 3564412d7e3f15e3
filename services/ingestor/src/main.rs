//! Ingestor CLI - Loads a lab spreadsheet into pending analysis records
//!
//! Responsibilities:
//! - Resolve the owning user by email
//! - Load the municipality table for id lookups
//! - Run the file through the ingestion pipeline
//! - Print the report (human summary + JSON)
//!
//! With --dry-run nothing touches the database.

use anyhow::{Context, Result};
use clap::Parser;
use ingestor::mapping::MappingStrategy;
use ingestor::store::{AnalysisStore, MemoryStore, PgStore};
use ingestor::{IngestSettings, IngestionReport, Ingestor};
use sqlx::postgres::PgPoolOptions;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "ingestor", about = "Loads soil lab spreadsheets as pending analyses")]
struct Args {
    /// Spreadsheet to ingest (xlsx, xls, ods or csv)
    #[arg(long)]
    file: PathBuf,

    /// Email of the user who owns the uploaded records
    #[arg(long, required_unless_present = "dry_run")]
    user: Option<String>,

    /// Dry run - parse and report without a database
    #[arg(long, default_value = "false")]
    dry_run: bool,

    /// Rows scanned when looking for the header row
    #[arg(long, default_value_t = 50)]
    header_scan_rows: usize,

    /// Row errors listed in the report
    #[arg(long, default_value_t = 10)]
    max_errors: usize,

    /// Resolve all exact header matches before partial ones
    #[arg(long, default_value = "false")]
    exact_first_mapping: bool,
}

impl Args {
    fn settings(&self) -> IngestSettings {
        IngestSettings {
            header_scan_rows: self.header_scan_rows,
            max_errors: self.max_errors,
            mapping: if self.exact_first_mapping {
                MappingStrategy::ExactFirst
            } else {
                MappingStrategy::PerField
            },
            ..Default::default()
        }
    }
}

fn print_report(report: &IngestionReport) -> Result<()> {
    println!("\n=== Ingestion Summary ===");
    match report.header_row {
        Some(row) => println!("Header row: {}", row + 1),
        None => println!("Header row: -"),
    }
    println!("Mapped fields: {}", report.mapping_success);
    if !report.unmapped_columns.is_empty() {
        println!("Unmapped columns: {}", report.unmapped_columns.join(", "));
    }
    println!("Rows: {}", report.total_rows);
    println!("Inserted: {}", report.inserted);
    println!("Skipped: {}", report.skipped);
    for issue in &report.errors {
        match issue.row {
            Some(row) => println!("  row {}: {}", row, issue.message),
            None => println!("  {}", issue.message),
        }
    }
    if report.failed > report.errors.len() {
        println!("  ... and {} more", report.failed - report.errors.len());
    }

    println!("\n{}", serde_json::to_string_pretty(report).context("Failed to serialize report")?);
    Ok(())
}

async fn run(
    store: &dyn AnalysisStore,
    settings: IngestSettings,
    path: &Path,
    owner: Uuid,
) -> Result<IngestionReport> {
    let bytes = fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    println!("Content size: {} bytes", bytes.len());

    let municipalities = store.load_municipalities().await?;
    println!("Municipalities loaded: {}", municipalities.len());

    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let ingestor = Ingestor::new(store)
        .with_settings(settings)
        .with_municipalities(municipalities);
    Ok(ingestor.process(&bytes, &filename, owner).await)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let settings = args.settings();

    println!("=== Soil Lab Ingestor ===");
    println!("File: {}", args.file.display());
    println!("Mode: {}", if args.dry_run { "dry-run" } else { "live" });

    let report = if args.dry_run {
        let store = MemoryStore::new();
        let report = run(&store, settings, &args.file, Uuid::nil()).await?;
        println!("\nDry run - {} records kept in memory only", store.records().len());
        report
    } else {
        let db_url = std::env::var("DB_URL").context("DB_URL env var missing")?;
        let email = args.user.as_deref().context("--user is required")?;

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await
            .context("Failed to connect to database")?;
        let store = PgStore::new(pool).with_insert_chunk(settings.insert_chunk);

        let user = store
            .find_user_by_email(email)
            .await?
            .with_context(|| format!("No user with email {}", email))?;
        println!("Owner: {} <{}>", user.nombre, user.email);

        run(&store, settings, &args.file, user.id).await?
    };

    print_report(&report)?;

    if report.is_failure() {
        anyhow::bail!("Ingestion failed for {}", args.file.display());
    }
    Ok(())
}
