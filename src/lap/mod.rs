// Lap extraction: candidate laps, their quality statistics, and the strategies that pick one

pub mod multi_candidate;
pub mod resample;
pub mod single_pass;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

pub use multi_candidate::{CandidateVerdict, MultiCandidateScorer, ScoredCandidate};
pub use single_pass::SinglePassExtractor;

use crate::{
    LapTraceError,
    geo::GeoPoint,
    trace::{Fix, Trace},
};

/// Quality statistics of a lap, recomputed from its fixes whenever needed
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LapStats {
    pub point_count: usize,
    /// Distance between the first and last fix
    pub closure_distance_m: f64,
    pub avg_jump_m: f64,
    pub max_jump_m: f64,
    /// Population standard deviation of the jumps
    pub std_jump_m: f64,
    /// Mean of the available speed values, 0 when the recording has none
    pub avg_speed: f64,
}

impl LapStats {
    pub fn from_fixes(fixes: &[Fix]) -> Self {
        Self::from_parts(fixes, &jump_distances(fixes))
    }

    /// `jumps` must hold the distances between consecutive `fixes`
    pub(crate) fn from_parts(fixes: &[Fix], jumps: &[f64]) -> Self {
        let closure_distance_m = match (fixes.first(), fixes.last()) {
            (Some(first), Some(last)) => first.distance_to(last),
            _ => 0.0,
        };

        let avg_jump_m = mean(jumps.iter().copied()).unwrap_or(0.0);
        let max_jump_m = jumps.iter().copied().fold(0.0, f64::max);
        let std_jump_m = mean(jumps.iter().map(|jump| (jump - avg_jump_m).powi(2)))
            .map(f64::sqrt)
            .unwrap_or(0.0);
        let avg_speed = mean(fixes.iter().filter_map(|fix| fix.speed)).unwrap_or(0.0);

        Self {
            point_count: fixes.len(),
            closure_distance_m,
            avg_jump_m,
            max_jump_m,
            std_jump_m,
            avg_speed,
        }
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Distances between every pair of temporally consecutive fixes
pub fn jump_distances(fixes: &[Fix]) -> Vec<f64> {
    fixes
        .iter()
        .tuple_windows()
        .map(|(a, b)| a.distance_to(b))
        .collect()
}

/// A contiguous prefix of a trace, from its first fix through the closure fix
#[derive(Clone, Debug, PartialEq)]
pub struct CandidateLap {
    fixes: Vec<Fix>,
    /// Index in the trace where the lap closes; `None` when the trace ran out first
    closure_index: Option<usize>,
}

impl CandidateLap {
    /// Prefix of `trace` up to and including `end`
    pub fn prefix(trace: &Trace, end: usize, closed: bool) -> Self {
        let end = end.min(trace.len().saturating_sub(1));
        let fixes = trace.fixes().iter().take(end + 1).copied().collect();
        Self {
            fixes,
            closure_index: closed.then_some(end),
        }
    }

    pub fn fixes(&self) -> &[Fix] {
        &self.fixes
    }

    pub fn closure_index(&self) -> Option<usize> {
        self.closure_index
    }

    pub fn is_closed(&self) -> bool {
        self.closure_index.is_some()
    }

    pub fn len(&self) -> usize {
        self.fixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fixes.is_empty()
    }

    pub fn positions(&self) -> Vec<GeoPoint> {
        self.fixes.iter().map(Fix::position).collect()
    }

    pub fn stats(&self) -> LapStats {
        LapStats::from_fixes(&self.fixes)
    }
}

/// The lap a strategy selected for one recording
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ExtractedLap {
    /// Emitted coordinates: resampled and closed for the single-pass strategy,
    /// native density for the multi-candidate strategy
    #[serde(rename = "lap")]
    pub coordinates: Vec<GeoPoint>,
    /// Statistics of the underlying (not resampled) lap
    pub stats: LapStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub centroid: Option<GeoPoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closure_index: Option<usize>,
    #[serde(skip)]
    pub candidate: CandidateLap,
}

/// A way of picking one lap out of a validity-filtered trace
pub trait LapStrategy {
    fn name(&self) -> &'static str;

    fn extract(&self, trace: &Trace) -> Result<ExtractedLap, LapTraceError>;
}
