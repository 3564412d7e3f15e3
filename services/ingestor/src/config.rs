use crate::header::{DEFAULT_SCAN_ROWS, EARLY_EXIT_SCORE};
use crate::mapping::MappingStrategy;
use crate::store::DEFAULT_INSERT_CHUNK;

/// Errors listed in a report before the rest are only counted.
pub const DEFAULT_MAX_ERRORS: usize = 10;

/// Knobs of one ingestion run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestSettings {
    pub header_scan_rows: usize,
    pub early_exit_score: u32,
    pub max_errors: usize,
    pub insert_chunk: usize,
    /// Field-by-field mapping unless set to `ExactFirst`.
    pub mapping: MappingStrategy,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            header_scan_rows: DEFAULT_SCAN_ROWS,
            early_exit_score: EARLY_EXIT_SCORE,
            max_errors: DEFAULT_MAX_ERRORS,
            insert_chunk: DEFAULT_INSERT_CHUNK,
            mapping: MappingStrategy::PerField,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = IngestSettings::default();
        assert_eq!(settings.header_scan_rows, 50);
        assert_eq!(settings.early_exit_score, 8);
        assert_eq!(settings.max_errors, 10);
        assert_eq!(settings.mapping, MappingStrategy::PerField);
    }
}
