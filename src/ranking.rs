// Batch analysis of several recordings and selection of the single best lap

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::{
    LapTraceError,
    config::{PreprocessConfig, RankingWeights},
    errors::FailureReason,
    geo::GeoPoint,
    lap::{ExtractedLap, LapStats, LapStrategy},
    trace::{RecordingSource, Trace},
};

/// Result of analyzing one recording
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RecordingOutcome {
    Failed {
        reason: FailureReason,
        message: String,
    },
    Ok(ExtractedLap),
}

impl RecordingOutcome {
    pub fn lap(&self) -> Option<&ExtractedLap> {
        match self {
            Self::Ok(lap) => Some(lap),
            Self::Failed { .. } => None,
        }
    }
}

impl From<Result<ExtractedLap, LapTraceError>> for RecordingOutcome {
    fn from(result: Result<ExtractedLap, LapTraceError>) -> Self {
        match result {
            Ok(lap) => Self::Ok(lap),
            Err(e) => Self::Failed {
                reason: e.failure_reason(),
                message: e.to_string(),
            },
        }
    }
}

/// Outcomes keyed by recording id. Ordered so reports and tie-breaks are deterministic.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct BatchReport {
    outcomes: BTreeMap<String, RecordingOutcome>,
}

impl BatchReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of a recording. An id is only ever recorded once;
    /// returns `false` and keeps the first outcome on a duplicate id.
    pub fn insert(&mut self, source_id: impl Into<String>, outcome: RecordingOutcome) -> bool {
        match self.outcomes.entry(source_id.into()) {
            Entry::Vacant(entry) => {
                entry.insert(outcome);
                true
            }
            Entry::Occupied(entry) => {
                warn!("Ignoring duplicate result for recording {}", entry.key());
                false
            }
        }
    }

    pub fn get(&self, source_id: &str) -> Option<&RecordingOutcome> {
        self.outcomes.get(source_id)
    }

    pub fn outcomes(&self) -> impl Iterator<Item = (&str, &RecordingOutcome)> {
        self.outcomes.iter().map(|(id, outcome)| (id.as_str(), outcome))
    }

    pub fn successes(&self) -> impl Iterator<Item = (&str, &ExtractedLap)> {
        self.outcomes()
            .filter_map(|(id, outcome)| outcome.lap().map(|lap| (id, lap)))
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

/// Load, preprocess and extract a lap from one recording
pub fn analyze_recording(
    source: &dyn RecordingSource,
    strategy: &dyn LapStrategy,
    preprocess: &PreprocessConfig,
) -> Result<ExtractedLap, LapTraceError> {
    let loaded = source.load()?;
    let trace = Trace::from_records(&loaded.records, preprocess)?;
    info!(
        "Analyzing {} with {} strategy: {} valid fixes",
        source.id(),
        strategy.name(),
        trace.len()
    );
    strategy.extract(&trace)
}

/// Analyze every recording to completion. Failures are recorded, never fatal.
pub fn analyze_batch<'a>(
    sources: impl IntoIterator<Item = &'a dyn RecordingSource>,
    strategy: &dyn LapStrategy,
    preprocess: &PreprocessConfig,
) -> BatchReport {
    let mut report = BatchReport::new();
    for source in sources {
        let result = analyze_recording(source, strategy, preprocess);
        if let Err(e) = &result {
            warn!("No lap from {}: {}", source.id(), e);
        }
        report.insert(source.id(), result.into());
    }
    report
}

/// The globally best lap of a batch, ready to be written out
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BestLapExport {
    pub source_id: String,
    pub num_points: usize,
    pub closure_distance_m: f64,
    pub avg_jump_m: f64,
    pub max_jump_m: f64,
    pub std_jump_m: f64,
    pub avg_speed: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub centroid: Option<GeoPoint>,
    pub coordinates: Vec<GeoPoint>,
}

impl BestLapExport {
    pub fn new(source_id: &str, lap: &ExtractedLap) -> Self {
        Self {
            source_id: source_id.to_string(),
            num_points: lap.stats.point_count,
            closure_distance_m: lap.stats.closure_distance_m,
            avg_jump_m: lap.stats.avg_jump_m,
            max_jump_m: lap.stats.max_jump_m,
            std_jump_m: lap.stats.std_jump_m,
            avg_speed: lap.stats.avg_speed,
            centroid: lap.centroid,
            coordinates: lap.coordinates.clone(),
        }
    }
}

/// Differences between the winning lap and a baseline recording's lap
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LapComparison {
    /// Winner points minus baseline points
    pub extra_points: i64,
    /// Baseline closure minus winner closure, positive when the winner closes tighter
    pub closure_improvement_m: f64,
    pub baseline_std_jump_m: f64,
}

impl LapComparison {
    pub fn between(winner: &LapStats, baseline: &LapStats) -> Self {
        Self {
            extra_points: winner.point_count as i64 - baseline.point_count as i64,
            closure_improvement_m: baseline.closure_distance_m - winner.closure_distance_m,
            baseline_std_jump_m: baseline.std_jump_m,
        }
    }
}

/// Picks the best lap across recordings with a composite score
pub struct CrossRecordingRanker {
    weights: RankingWeights,
}

impl CrossRecordingRanker {
    pub fn new() -> Self {
        Self::with_weights(RankingWeights::default())
    }

    pub fn with_weights(weights: RankingWeights) -> Self {
        Self { weights }
    }

    /// Composite score, higher is better. Rewards points, penalizes poor closure,
    /// erratic spacing and spacing far from the expected jump length.
    pub fn composite_score(&self, stats: &LapStats) -> f64 {
        let w = &self.weights;
        let mut score = w.point_weight * stats.point_count as f64
            - w.closure_weight * stats.closure_distance_m
            - w.std_jump_weight * stats.std_jump_m
            - w.jump_spacing_weight * (stats.avg_jump_m - w.expected_jump_m).abs();

        if stats.max_jump_m > w.max_jump_penalty_threshold_m {
            score -= w.max_jump_penalty;
        }
        if stats.closure_distance_m > w.closure_penalty_threshold_m {
            score -= w.closure_penalty;
        }
        score
    }

    /// Id and score of the best successful recording. Ties go to the first id in order.
    pub fn best<'r>(&self, report: &'r BatchReport) -> Option<(&'r str, &'r ExtractedLap, f64)> {
        let mut best: Option<(&str, &ExtractedLap, f64)> = None;
        for (id, lap) in report.successes() {
            let score = self.composite_score(&lap.stats);
            info!("Composite score for {}: {:.2}", id, score);
            if best.is_none_or(|(_, _, best_score)| score > best_score) {
                best = Some((id, lap, score));
            }
        }
        best
    }

    pub fn rank(&self, report: &BatchReport) -> Result<BestLapExport, LapTraceError> {
        let (id, lap, score) = self.best(report).ok_or(LapTraceError::NoValidLapsInBatch)?;
        info!("Most accurate lap: {} (score {:.2})", id, score);
        Ok(BestLapExport::new(id, lap))
    }

    /// Compare the winner of `report` with the lap of `baseline_id`, if both exist
    pub fn compare_with_baseline(
        &self,
        report: &BatchReport,
        baseline_id: &str,
    ) -> Option<LapComparison> {
        let (_, winner, _) = self.best(report)?;
        let baseline = report.get(baseline_id)?.lap()?;
        Some(LapComparison::between(&winner.stats, &baseline.stats))
    }
}

impl Default for CrossRecordingRanker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lap::CandidateLap;

    fn lap_with(stats: LapStats) -> ExtractedLap {
        ExtractedLap {
            coordinates: vec![GeoPoint::new(26.0, 50.0), GeoPoint::new(26.001, 50.0)],
            stats,
            centroid: None,
            closure_index: Some(stats.point_count.saturating_sub(1)),
            candidate: CandidateLap::prefix(&Trace::default(), 0, true),
        }
    }

    fn stats(point_count: usize, closure: f64, std_jump: f64, max_jump: f64) -> LapStats {
        LapStats {
            point_count,
            closure_distance_m: closure,
            avg_jump_m: 20.0,
            max_jump_m: max_jump,
            std_jump_m: std_jump,
            avg_speed: 10.0,
        }
    }

    #[test]
    fn test_composite_score() {
        let ranker = CrossRecordingRanker::new();
        let mut s = stats(100, 10.0, 4.0, 30.0);
        s.avg_jump_m = 24.0;
        // 500 - 20 - 4 - 2
        assert_eq!(ranker.composite_score(&s), 474.0);

        let penalized = LapStats {
            max_jump_m: 151.0,
            closure_distance_m: 51.0,
            ..s
        };
        // 500 - 102 - 4 - 2 - 500 - 200
        assert_eq!(ranker.composite_score(&penalized), -308.0);
    }

    #[test]
    fn test_rank_prefers_longer_tighter_lap() {
        let mut report = BatchReport::new();
        report.insert("long.csv", RecordingOutcome::Ok(lap_with(stats(300, 2.0, 1.0, 25.0))));
        report.insert("short.csv", RecordingOutcome::Ok(lap_with(stats(60, 2.0, 30.0, 90.0))));
        report.insert(
            "broken.csv",
            RecordingOutcome::Failed {
                reason: FailureReason::InsufficientData,
                message: "Insufficient GPS data".to_string(),
            },
        );

        let export = CrossRecordingRanker::new().rank(&report).unwrap();
        assert_eq!(export.source_id, "long.csv");
        assert_eq!(export.num_points, 300);
        assert_eq!(export.coordinates.len(), 2);
    }

    #[test]
    fn test_rank_is_deterministic_on_ties() {
        let mut report = BatchReport::new();
        report.insert("b.csv", RecordingOutcome::Ok(lap_with(stats(100, 1.0, 1.0, 25.0))));
        report.insert("a.csv", RecordingOutcome::Ok(lap_with(stats(100, 1.0, 1.0, 25.0))));

        let ranker = CrossRecordingRanker::new();
        for _ in 0..5 {
            assert_eq!(ranker.rank(&report).unwrap().source_id, "a.csv");
        }
    }

    #[test]
    fn test_rank_without_successes() {
        let mut report = BatchReport::new();
        report.insert(
            "a.csv",
            RecordingOutcome::Failed {
                reason: FailureReason::NoClosureFound,
                message: String::new(),
            },
        );
        assert!(matches!(
            CrossRecordingRanker::new().rank(&report),
            Err(LapTraceError::NoValidLapsInBatch)
        ));
    }

    #[test]
    fn test_duplicate_ids_are_not_overwritten() {
        let mut report = BatchReport::new();
        assert!(report.insert("a.csv", RecordingOutcome::Ok(lap_with(stats(100, 1.0, 1.0, 25.0)))));
        assert!(!report.insert(
            "a.csv",
            RecordingOutcome::Failed {
                reason: FailureReason::NoValidLap,
                message: String::new(),
            },
        ));
        assert!(report.get("a.csv").unwrap().lap().is_some());
    }

    #[test]
    fn test_compare_with_baseline() {
        let mut report = BatchReport::new();
        report.insert("best.csv", RecordingOutcome::Ok(lap_with(stats(200, 2.0, 1.0, 25.0))));
        report.insert("current.csv", RecordingOutcome::Ok(lap_with(stats(126, 12.0, 3.0, 25.0))));

        let ranker = CrossRecordingRanker::new();
        let comparison = ranker.compare_with_baseline(&report, "current.csv").unwrap();
        assert_eq!(comparison.extra_points, 74);
        assert_eq!(comparison.closure_improvement_m, 10.0);
        assert!(ranker.compare_with_baseline(&report, "missing.csv").is_none());
    }

    #[test]
    fn test_outcome_serialization() {
        let failed: RecordingOutcome = Err(LapTraceError::NoClosureFound {
            relaxed_threshold_m: 100.0,
        })
        .into();
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["reason"], "no_closure_found");

        let ok = RecordingOutcome::Ok(lap_with(stats(100, 1.0, 1.0, 25.0)));
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["lap"][1][0], 26.001);
        assert_eq!(json["stats"]["point_count"], 100);
    }
}
