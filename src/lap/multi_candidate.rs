use log::{debug, info, warn};

use super::{CandidateLap, ExtractedLap, LapStats, LapStrategy, jump_distances};
use crate::{LapTraceError, config::MultiCandidateConfig, geo::centroid, trace::Trace};

/// Outcome of checking one candidate lap against the quality filters
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CandidateVerdict {
    Accepted { score: f64 },
    /// A step between consecutive fixes exceeds the jump limit (GPS glitch)
    ExcessiveJump,
    /// The ends of the candidate are too far apart to be a lap
    PoorClosure,
}

impl CandidateVerdict {
    pub fn score(&self) -> Option<f64> {
        match self {
            Self::Accepted { score } => Some(*score),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ScoredCandidate {
    pub closure_index: usize,
    pub stats: LapStats,
    pub verdict: CandidateVerdict,
}

/// Enumerates every fix that comes back near the start of the trace, scores the
/// prefix ending there, and keeps the best one.
pub struct MultiCandidateScorer {
    config: MultiCandidateConfig,
}

impl MultiCandidateScorer {
    pub fn new() -> Self {
        Self::with_config(MultiCandidateConfig::default())
    }

    pub fn with_config(config: MultiCandidateConfig) -> Self {
        Self { config }
    }

    /// Indices from `min_lap_points` onward that lie within `threshold_m` of the first fix
    pub fn closure_indices(&self, trace: &Trace, threshold_m: f64) -> Vec<usize> {
        let Some(start) = trace.first() else {
            return Vec::new();
        };
        trace
            .fixes()
            .iter()
            .enumerate()
            .skip(self.config.min_lap_points)
            .filter(|(_, fix)| fix.distance_to(start) < threshold_m)
            .map(|(index, _)| index)
            .collect()
    }

    /// Closure indices at the normal threshold, falling back to the relaxed one
    pub fn find_closures(&self, trace: &Trace) -> Result<Vec<usize>, LapTraceError> {
        if trace.len() < self.config.min_lap_points {
            return Err(LapTraceError::InsufficientData {
                found: trace.len(),
                required: self.config.min_lap_points,
            });
        }

        let closures = self.closure_indices(trace, self.config.closure_threshold_m);
        if !closures.is_empty() {
            return Ok(closures);
        }

        debug!(
            "No closure within {}m, retrying with {}m",
            self.config.closure_threshold_m, self.config.relaxed_closure_threshold_m
        );
        let closures = self.closure_indices(trace, self.config.relaxed_closure_threshold_m);
        if closures.is_empty() {
            return Err(LapTraceError::NoClosureFound {
                relaxed_threshold_m: self.config.relaxed_closure_threshold_m,
            });
        }
        Ok(closures)
    }

    /// Apply the rejection filters, then `point_weight * points - closure - std_jump`
    pub fn judge(&self, stats: &LapStats) -> CandidateVerdict {
        if stats.max_jump_m > self.config.max_jump_m {
            return CandidateVerdict::ExcessiveJump;
        }
        if stats.closure_distance_m > self.config.max_closure_m {
            return CandidateVerdict::PoorClosure;
        }
        CandidateVerdict::Accepted {
            score: self.config.point_weight * stats.point_count as f64
                - stats.closure_distance_m
                - stats.std_jump_m,
        }
    }

    /// Statistics and verdict for every candidate closure of the trace
    pub fn evaluate(&self, trace: &Trace) -> Result<Vec<ScoredCandidate>, LapTraceError> {
        let closures = self.find_closures(trace)?;
        info!("Found {} candidate closure points", closures.len());

        // jumps[i] is the step from fix i to fix i + 1, so the prefix ending at
        // index `end` owns jumps[..end]
        let jumps = jump_distances(trace.fixes());
        let candidates = closures
            .into_iter()
            .filter(|&end| end + 1 >= self.config.min_lap_points)
            .map(|end| {
                let stats = LapStats::from_parts(&trace.fixes()[..=end], &jumps[..end]);
                let verdict = self.judge(&stats);
                if verdict.score().is_none() {
                    debug!("Rejected candidate ending at {}: {:?}", end, verdict);
                }
                ScoredCandidate {
                    closure_index: end,
                    stats,
                    verdict,
                }
            })
            .collect();
        Ok(candidates)
    }
}

impl Default for MultiCandidateScorer {
    fn default() -> Self {
        Self::new()
    }
}

impl LapStrategy for MultiCandidateScorer {
    fn name(&self) -> &'static str {
        "multi-candidate"
    }

    fn extract(&self, trace: &Trace) -> Result<ExtractedLap, LapTraceError> {
        let candidates = self.evaluate(trace)?;

        let mut best: Option<(f64, &ScoredCandidate)> = None;
        for candidate in &candidates {
            if let Some(score) = candidate.verdict.score() {
                if best.is_none_or(|(best_score, _)| score > best_score) {
                    best = Some((score, candidate));
                }
            }
        }

        let Some((score, winner)) = best else {
            warn!(
                "All {} candidates failed the quality filters",
                candidates.len()
            );
            return Err(LapTraceError::NoValidLap {
                candidates: candidates.len(),
            });
        };
        info!(
            "Best lap closes at {} with {} points, score {:.2}",
            winner.closure_index, winner.stats.point_count, score
        );

        let lap = CandidateLap::prefix(trace, winner.closure_index, true);
        let coordinates = lap.positions();
        Ok(ExtractedLap {
            centroid: centroid(&coordinates),
            coordinates,
            stats: winner.stats,
            closure_index: lap.closure_index(),
            candidate: lap,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::PreprocessConfig, trace::RawRecord};
    use std::f64::consts::PI;

    const METERS_PER_DEGREE: f64 = 111_195.0;
    const ORIGIN: (f64, f64) = (26.0, 50.0);

    fn offset(north_m: f64, east_m: f64) -> (f64, f64) {
        (
            ORIGIN.0 + north_m / METERS_PER_DEGREE,
            ORIGIN.1 + east_m / (METERS_PER_DEGREE * ORIGIN.0.to_radians().cos()),
        )
    }

    /// `count` fixes around a circle whose first and last fix coincide
    fn closed_circle(count: usize, radius_m: f64) -> Vec<RawRecord> {
        (0..count)
            .map(|i| {
                let theta = 2.0 * PI * i as f64 / (count - 1) as f64;
                let (lat, lon) = offset(radius_m * theta.sin(), radius_m * theta.cos());
                RawRecord::new(lat, lon, Some(15.0))
            })
            .collect()
    }

    fn trace_from(records: &[RawRecord]) -> Trace {
        Trace::from_records(records, &PreprocessConfig::default()).unwrap()
    }

    #[test]
    fn test_circle_closes_at_last_point() {
        let lap = MultiCandidateScorer::new()
            .extract(&trace_from(&closed_circle(200, 50.0)))
            .unwrap();

        assert_eq!(lap.closure_index, Some(199));
        assert_eq!(lap.stats.point_count, 200);
        assert!(lap.stats.closure_distance_m < 0.01);
        let step = 2.0 * PI * 50.0 / 199.0;
        assert!((lap.stats.max_jump_m - step).abs() < 0.05);
        assert_eq!(lap.stats.avg_speed, 15.0);
        // native density, no resampling
        assert_eq!(lap.coordinates.len(), 200);
    }

    #[test]
    fn test_closure_indices_start_after_minimum() {
        let scorer = MultiCandidateScorer::new();
        let trace = trace_from(&closed_circle(200, 50.0));
        let closures = scorer.closure_indices(&trace, 50.0);
        assert!(!closures.is_empty());
        assert!(closures.iter().all(|&i| i >= 50));
        assert_eq!(closures.last(), Some(&199));
    }

    #[test]
    fn test_relaxed_threshold_fallback() {
        // out 295 m and back along a straight line, stopping about 80 m short of the start
        let mut records: Vec<RawRecord> = (0..60)
            .map(|i| {
                let (lat, lon) = offset(i as f64 * 5.0, 0.0);
                RawRecord::new(lat, lon, Some(5.0))
            })
            .collect();
        records.extend((0..40).map(|i| {
            let (lat, lon) = offset(295.0 - i as f64 * 5.5, 0.0);
            RawRecord::new(lat, lon, Some(5.0))
        }));
        let trace = trace_from(&records);
        let scorer = MultiCandidateScorer::new();

        assert!(scorer.closure_indices(&trace, 50.0).is_empty());
        let lap = scorer.extract(&trace).unwrap();
        assert_eq!(lap.closure_index, Some(99));
        assert!(lap.stats.closure_distance_m > 50.0 && lap.stats.closure_distance_m < 100.0);
    }

    #[test]
    fn test_no_closure_found() {
        let records: Vec<RawRecord> = (0..80)
            .map(|i| {
                let (lat, lon) = offset(i as f64 * 10.0, 0.0);
                RawRecord::new(lat, lon, None)
            })
            .collect();
        let result = MultiCandidateScorer::new().extract(&trace_from(&records));
        assert!(matches!(result, Err(LapTraceError::NoClosureFound { .. })));
    }

    #[test]
    fn test_glitch_inside_only_lap_rejects_everything() {
        let mut records = closed_circle(200, 50.0);
        let (lat, lon) = offset(500.0, 0.0);
        records[100] = RawRecord::new(lat, lon, Some(15.0));

        let scorer = MultiCandidateScorer::new();
        let trace = trace_from(&records);
        let candidates = scorer.evaluate(&trace).unwrap();
        assert!(!candidates.is_empty());
        assert!(
            candidates
                .iter()
                .all(|c| c.verdict == CandidateVerdict::ExcessiveJump)
        );
        assert!(matches!(
            scorer.extract(&trace),
            Err(LapTraceError::NoValidLap { .. })
        ));
    }

    #[test]
    fn test_glitch_after_lap_keeps_clean_candidate() {
        let mut records = closed_circle(200, 50.0);
        // teleport 1000 m away for a while, then drive the circle again
        records.extend((0..20).map(|i| {
            let (lat, lon) = offset(1000.0 + i as f64, 0.0);
            RawRecord::new(lat, lon, Some(15.0))
        }));
        records.extend(closed_circle(200, 50.0));

        let scorer = MultiCandidateScorer::new();
        let trace = trace_from(&records);
        let candidates = scorer.evaluate(&trace).unwrap();
        assert!(
            candidates
                .iter()
                .filter(|c| c.closure_index > 200)
                .all(|c| c.verdict == CandidateVerdict::ExcessiveJump)
        );

        let lap = scorer.extract(&trace).unwrap();
        assert_eq!(lap.closure_index, Some(199));
        assert!(lap.stats.max_jump_m <= 200.0);
    }

    #[test]
    fn test_judge_thresholds() {
        let scorer = MultiCandidateScorer::new();
        let stats = LapStats {
            point_count: 100,
            closure_distance_m: 10.0,
            avg_jump_m: 5.0,
            max_jump_m: 20.0,
            std_jump_m: 2.0,
            avg_speed: 0.0,
        };
        assert_eq!(
            scorer.judge(&stats),
            CandidateVerdict::Accepted { score: 988.0 }
        );
        assert_eq!(
            scorer.judge(&LapStats {
                max_jump_m: 200.5,
                ..stats
            }),
            CandidateVerdict::ExcessiveJump
        );
        assert_eq!(
            scorer.judge(&LapStats {
                closure_distance_m: 100.5,
                ..stats
            }),
            CandidateVerdict::PoorClosure
        );
    }

    #[test]
    fn test_insufficient_trace() {
        let trace = Trace::default();
        assert!(matches!(
            MultiCandidateScorer::new().extract(&trace),
            Err(LapTraceError::InsufficientData { found: 0, .. })
        ));
    }
}
