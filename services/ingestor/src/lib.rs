//! Ingestion of soil laboratory spreadsheets into pending analysis records.

pub mod config;
pub mod fields;
pub mod fill;
pub mod header;
pub mod ingest;
pub mod mapping;
pub mod normalize;
pub mod record;
pub mod report;
pub mod sheet;
pub mod store;

pub use config::IngestSettings;
pub use fields::Field;
pub use header::find_header_row;
pub use ingest::{Ingestor, RowOutcome};
pub use mapping::{build_column_map, FieldMap};
pub use normalize::{normalize_number, normalize_text};
pub use record::{AnalysisValues, PendingRecord, RecordStatus};
pub use report::IngestionReport;
pub use store::{AnalysisStore, MemoryStore, PgStore};
