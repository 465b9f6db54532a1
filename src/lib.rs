// Library interface for laptrace
// This allows integration tests and benchmarks to access internal modules

pub mod config;
pub mod errors;
pub mod geo;
pub mod lap;
pub mod ranking;
pub mod trace;
pub mod writer;

// Re-export commonly used types
pub use config::AnalysisConfig;
pub use errors::{FailureReason, LapTraceError};
pub use geo::{GeoPoint, haversine_distance};
pub use lap::{ExtractedLap, LapStats, LapStrategy, MultiCandidateScorer, SinglePassExtractor};
pub use ranking::{
    BatchReport, BestLapExport, CrossRecordingRanker, RecordingOutcome, analyze_batch,
    analyze_recording,
};
pub use trace::{FileSource, InMemorySource, RawRecord, RecordingSource, Trace};
