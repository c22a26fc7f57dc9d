// 🚨 Error Model - Hard failures of the import/simulation pipeline
//
// Anything in here aborts the whole call: the document, simulation or
// optimization run produces no partial result. Expected data-quality problems
// are NOT errors - they are DataWarnings attached to their interval.

use thiserror::Error;

/// Hard failure raised by parsing, grouping, simulation or optimization
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EdcError {
    /// Header line is malformed (wrong field count, unknown column names, ...)
    #[error("invalid CSV header: {0}")]
    InvalidHeader(String),

    /// Input could not be tokenised as CSV at all
    #[error("malformed CSV input: {0}")]
    Malformed(String),

    /// Data line does not have the field count announced by the header
    #[error("wrong number of items on line {line}: {found}, expected {expected}. Last item on line is \"{last}\"")]
    FieldCount {
        line: usize,
        found: usize,
        expected: usize,
        last: String,
    },

    /// Date or time field could not be parsed
    #[error("cannot parse timestamp on line {line}: \"{value}\"")]
    InvalidTimestamp { line: usize, value: String },

    /// Numeric cell could not be parsed
    #[error("cannot parse number on line {line}: \"{value}\"")]
    InvalidNumber { line: usize, value: String },

    /// Two consecutive rows are not 15 minutes apart (and not a DST transition)
    #[error("unexpected time difference: {minutes} minutes at line {line} ({at})")]
    UnexpectedTimeGap {
        line: usize,
        minutes: i64,
        at: chrono::NaiveDateTime,
    },

    /// Producers report negative total sharing
    #[error("negative sharing {shared} on line {line}")]
    NegativeSharing { line: usize, shared: f64 },

    /// Proportional correction factor outside [0, 1]
    #[error("reconciliation factor {factor} out of range on line {line}")]
    ReconciliationFactor { line: usize, factor: f64 },

    /// Document contains no data rows
    #[error("CSV file contains no intervals")]
    NoIntervals,

    /// Two intervals with different measurement counts were merged
    #[error("cannot merge intervals with mismatched measurements ({0})")]
    MisalignedInterval(String),

    /// Caller violated a simulation/optimization contract
    #[error("precondition violated: {0}")]
    Precondition(String),

    /// Fixed-point sharing arithmetic went negative
    #[error("fixed-point sharing went negative: {0}")]
    NegativeFixedPoint(String),

    /// Full and fast simulation disagree on total profit
    #[error("simulation paths disagree: full {full} vs fast {fast}")]
    CrossValidation { full: f64, fast: f64 },

    /// Export requested but every consumer EAN is hidden
    #[error("at least one consumer EAN must be visible for the CSV export")]
    NothingToExport,

    /// Output text could not be assembled
    #[error("failed to build CSV output: {0}")]
    Output(String),

    /// Value passed to a formatter is not a number
    #[error("cannot format {0} as energy")]
    InvalidValue(f64),
}

/// Result alias used across the library
pub type Result<T> = std::result::Result<T, EdcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_are_human_readable() {
        let err = EdcError::FieldCount {
            line: 4,
            found: 5,
            expected: 7,
            last: "1,0".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "wrong number of items on line 4: 5, expected 7. Last item on line is \"1,0\""
        );

        let err = EdcError::InvalidHeader("expected odd field count".to_string());
        assert!(err.to_string().starts_with("invalid CSV header"));
    }
}
