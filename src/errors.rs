// Error types for laptrace

use serde::{Deserialize, Serialize};
use snafu::Snafu;
use std::io;

#[derive(Debug, Snafu)]
pub enum LapTraceError {
    // Errors while reading recordings
    #[snafu(display("Recording not found: {path}"))]
    SourceNotFound { path: String },
    #[snafu(display("Error reading recording {source_id}"))]
    SourceIo {
        source_id: String,
        source: io::Error,
    },
    #[snafu(display("Error parsing CSV recording {source_id}"))]
    CsvRead {
        source_id: String,
        source: csv::Error,
    },
    #[snafu(display("Recording {source_id} is missing required columns: {missing}"))]
    MissingColumns { source_id: String, missing: String },
    #[snafu(display("Malformed record at line {line}: {reason}"))]
    MalformedRecord { line: usize, reason: String },
    #[snafu(display("Unsupported recording format: {path}"))]
    UnsupportedFormat { path: String },

    // Lap extraction errors
    #[snafu(display("Insufficient GPS data ({found} valid fixes, minimum {required})"))]
    InsufficientData { found: usize, required: usize },
    #[snafu(display("No complete lap found (no fix within {relaxed_threshold_m}m of start)"))]
    NoClosureFound { relaxed_threshold_m: f64 },
    #[snafu(display("No valid lap meeting quality criteria ({candidates} candidates rejected)"))]
    NoValidLap { candidates: usize },
    #[snafu(display("No valid laps found in any recording"))]
    NoValidLapsInBatch,

    // Config management errors
    #[snafu(display("Could not find application config directory"))]
    NoConfigDir,
    #[snafu(display("Error accessing config file"))]
    ConfigIo { source: io::Error },
    #[snafu(display("Error (de)serializing config file"))]
    ConfigSerialize { source: serde_json::Error },

    // Output errors
    #[snafu(display("Error writing output file"))]
    WriterError { source: io::Error },
    #[snafu(display("Error serializing lap export"))]
    ExportSerialize { source: serde_json::Error },
}

/// Reason a single recording produced no lap, as reported in batch results
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    InsufficientData,
    NoClosureFound,
    NoValidLap,
    MissingColumns,
    UnreadableSource,
}

impl LapTraceError {
    /// Classify a per-recording error for the batch report
    pub fn failure_reason(&self) -> FailureReason {
        match self {
            Self::InsufficientData { .. } => FailureReason::InsufficientData,
            Self::NoClosureFound { .. } => FailureReason::NoClosureFound,
            Self::NoValidLap { .. } | Self::NoValidLapsInBatch => FailureReason::NoValidLap,
            Self::MissingColumns { .. } => FailureReason::MissingColumns,
            _ => FailureReason::UnreadableSource,
        }
    }
}
