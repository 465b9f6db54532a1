// Tunable thresholds and scoring weights for lap extraction and ranking

use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::LapTraceError;

const CONFIG_DIR_NAME: &str = "laptrace";
const CONFIG_FILE_NAME: &str = "config.json";

/// Minimum number of fixes for any lap-like structure to be meaningful
pub const MIN_LAP_POINTS: usize = 50;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Valid fixes required after sentinel and missing-value filtering
    pub min_valid_fixes: usize,
    /// Drop fixes without a speed value
    pub require_speed: bool,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            min_valid_fixes: MIN_LAP_POINTS,
            require_speed: false,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SinglePassConfig {
    /// Fixes at or below this speed are treated as stationary
    pub speed_threshold: f64,
    /// A fix closer than this to the start closes the lap (meters)
    pub closure_threshold_m: f64,
    pub min_lap_points: usize,
    /// Number of points emitted by downsampling, before the closing point
    pub target_points: usize,
}

impl Default for SinglePassConfig {
    fn default() -> Self {
        Self {
            speed_threshold: 1.0,
            closure_threshold_m: 25.0,
            min_lap_points: MIN_LAP_POINTS,
            target_points: 55,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct MultiCandidateConfig {
    pub min_lap_points: usize,
    /// First closure search radius around the start (meters)
    pub closure_threshold_m: f64,
    /// Fallback search radius used when the first one finds nothing (meters)
    pub relaxed_closure_threshold_m: f64,
    /// Candidates with any step longer than this are GPS glitches (meters)
    pub max_jump_m: f64,
    /// Candidates whose ends are further apart than this are not laps (meters)
    pub max_closure_m: f64,
    /// Score weight per point in the candidate
    pub point_weight: f64,
}

impl Default for MultiCandidateConfig {
    fn default() -> Self {
        Self {
            min_lap_points: MIN_LAP_POINTS,
            closure_threshold_m: 50.0,
            relaxed_closure_threshold_m: 100.0,
            max_jump_m: 200.0,
            max_closure_m: 100.0,
            point_weight: 10.0,
        }
    }
}

/// Weights of the composite score used to compare laps from different recordings.
///
/// `expected_jump_m` is a heuristic tuned to typical logger sampling density, not a
/// physical constant. Retune it for loggers with a different sample rate.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct RankingWeights {
    pub point_weight: f64,
    pub closure_weight: f64,
    pub std_jump_weight: f64,
    pub expected_jump_m: f64,
    pub jump_spacing_weight: f64,
    pub max_jump_penalty_threshold_m: f64,
    pub max_jump_penalty: f64,
    pub closure_penalty_threshold_m: f64,
    pub closure_penalty: f64,
}

impl Default for RankingWeights {
    fn default() -> Self {
        Self {
            point_weight: 5.0,
            closure_weight: 2.0,
            std_jump_weight: 1.0,
            expected_jump_m: 20.0,
            jump_spacing_weight: 0.5,
            max_jump_penalty_threshold_m: 150.0,
            max_jump_penalty: 500.0,
            closure_penalty_threshold_m: 50.0,
            closure_penalty: 200.0,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct AnalysisConfig {
    pub preprocess: PreprocessConfig,
    pub single_pass: SinglePassConfig,
    pub multi_candidate: MultiCandidateConfig,
    pub ranking: RankingWeights,
}

impl AnalysisConfig {
    /// Path of the per-user config file, if the platform has a config directory
    pub fn default_path() -> Option<PathBuf> {
        Some(
            dirs::config_dir()?
                .join(CONFIG_DIR_NAME)
                .join(CONFIG_FILE_NAME),
        )
    }

    pub fn from_file(path: &Path) -> Result<Self, LapTraceError> {
        let file = std::fs::File::open(path).map_err(|e| LapTraceError::ConfigIo { source: e })?;
        serde_json::from_reader(file).map_err(|e| LapTraceError::ConfigSerialize { source: e })
    }

    /// Load the per-user config file, or `None` when there is none
    pub fn from_local_file() -> Result<Option<Self>, LapTraceError> {
        match Self::default_path() {
            Some(path) if path.exists() => {
                debug!("Loading config from {:?}", path);
                Self::from_file(&path).map(Some)
            }
            _ => Ok(None),
        }
    }

    /// Explicit path first, then the per-user file, then defaults
    pub fn resolve(path: Option<&Path>) -> Result<Self, LapTraceError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::from_local_file()?.unwrap_or_default()),
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<(), LapTraceError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LapTraceError::ConfigIo { source: e })?;
        }
        let file =
            std::fs::File::create(path).map_err(|e| LapTraceError::ConfigIo { source: e })?;
        serde_json::to_writer_pretty(file, self)
            .map_err(|e| LapTraceError::ConfigSerialize { source: e })
    }

    /// Save to the per-user config directory and return the written path
    pub fn save(&self) -> Result<PathBuf, LapTraceError> {
        let path = Self::default_path().ok_or(LapTraceError::NoConfigDir)?;
        self.save_to(&path)?;
        Ok(path)
    }
}
