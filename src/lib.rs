// EDC Sharing - Core Library
// Import, reconciliation, grouping, sharing simulation and allocation
// optimization for EDC energy-sharing exports. Used by the CLI and the tests.

pub mod error;
pub mod entities;
pub mod temporal;
pub mod data_quality;
pub mod reconciliation;
pub mod parser;
pub mod document;
pub mod grouping;
pub mod summary;
pub mod config;
pub mod export;
pub mod simulation;
pub mod optimizer;

// Re-export commonly used types
pub use error::{EdcError, Result};
pub use entities::{Ean, EanSide, Interval, Measurement};
pub use data_quality::{DataWarning, WarningKind, WarningSummary};
pub use reconciliation::{ReconciliationEngine, SlotTotals};
pub use parser::{parse_csv, EdcParser};
pub use document::CsvDocument;
pub use grouping::{group_intervals, Grouping};
pub use summary::{EanStats, Summary, SummaryRow};
pub use config::{DisplaySettings, DisplayUnit, KwhFormat};
pub use export::{
    filtered_csv, statistics_csv, statistics_exports,
    ExportMetric, StatisticsExport,
};
pub use simulation::{SharingSimulationResult, SharingSimulator};
pub use optimizer::{
    bump_consumer, AllocationOptimizer, CancellationToken, NoProgress,
    OptimizationAlgorithm, OptimizationOutcome, OptimizedAllocation,
    OptimizerConfig, ProgressHook,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
