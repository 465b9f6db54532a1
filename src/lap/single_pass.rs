use log::{debug, info};

use super::{
    CandidateLap, ExtractedLap, LapStrategy,
    resample::{close_loop, downsample},
};
use crate::{LapTraceError, config::SinglePassConfig, geo::centroid, trace::Trace};

/// Walks a trace once from the first moving fix and cuts the lap at the first
/// return to the start point. The result is downsampled and explicitly closed.
pub struct SinglePassExtractor {
    config: SinglePassConfig,
}

impl SinglePassExtractor {
    pub fn new() -> Self {
        Self::with_config(SinglePassConfig::default())
    }

    pub fn with_config(config: SinglePassConfig) -> Self {
        Self { config }
    }

    /// Index of the first fix past the minimum lap size that is back near the start
    fn find_closure(&self, moving: &Trace) -> Option<usize> {
        let start = moving.first()?;
        moving
            .fixes()
            .iter()
            .enumerate()
            .skip(self.config.min_lap_points + 1)
            .find(|(_, fix)| fix.distance_to(start) < self.config.closure_threshold_m)
            .map(|(index, _)| index)
    }
}

impl Default for SinglePassExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl LapStrategy for SinglePassExtractor {
    fn name(&self) -> &'static str {
        "single-pass"
    }

    fn extract(&self, trace: &Trace) -> Result<ExtractedLap, LapTraceError> {
        let moving = trace.moving(self.config.speed_threshold);
        debug!(
            "{} of {} fixes above speed threshold {}",
            moving.len(),
            trace.len(),
            self.config.speed_threshold
        );
        if moving.is_empty() || moving.len() < self.config.min_lap_points {
            return Err(LapTraceError::InsufficientData {
                found: moving.len(),
                required: self.config.min_lap_points,
            });
        }

        let candidate = match self.find_closure(&moving) {
            Some(index) => {
                info!("Completed lap at moving point {}", index);
                CandidateLap::prefix(&moving, index, true)
            }
            None => {
                info!("Trace ended before returning to start, using all moving points");
                CandidateLap::prefix(&moving, moving.len() - 1, false)
            }
        };

        let mut outline = downsample(&candidate.positions(), self.config.target_points);
        close_loop(&mut outline);
        debug!(
            "Lap of {} points sampled to {} points",
            candidate.len(),
            outline.len()
        );

        Ok(ExtractedLap {
            centroid: centroid(&outline),
            coordinates: outline,
            stats: candidate.stats(),
            closure_index: candidate.closure_index(),
            candidate,
        })
    }
}
