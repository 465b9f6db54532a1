pub mod loader;

use log::{debug, warn};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub use loader::{FileSource, InMemorySource, LoadedRecording, RecordingSource};

use crate::{LapTraceError, config::PreprocessConfig, geo::GeoPoint};

/// One record as handed over by the input layer, before validation
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient_speed")]
    pub speed: Option<f64>,
}

/// Accepts numbers and numeric strings, anything else is a missing speed
fn lenient_speed<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let speed = match Value::deserialize(deserializer)? {
        Value::Null => None,
        Value::Number(n) => n.as_f64(),
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => s.trim().parse().ok(),
        other => {
            warn!("Ignoring non-numeric speed {}", other);
            None
        }
    };
    Ok(speed)
}

impl RawRecord {
    pub fn new(latitude: f64, longitude: f64, speed: Option<f64>) -> Self {
        Self {
            latitude: Some(latitude),
            longitude: Some(longitude),
            speed,
        }
    }
}

/// A validated GPS fix
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Fix {
    /// Position of the record in the source recording
    pub index: usize,
    pub lat: f64,
    pub lon: f64,
    pub speed: Option<f64>,
}

impl Fix {
    pub fn position(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lon)
    }

    pub fn distance_to(&self, other: &Fix) -> f64 {
        self.position().distance_to(&other.position())
    }

    /// Turn a raw record into a fix, or `None` when it cannot be used
    fn from_record(index: usize, record: &RawRecord, require_speed: bool) -> Option<Self> {
        let lat = record.latitude.filter(|v| v.is_finite())?;
        let lon = record.longitude.filter(|v| v.is_finite())?;
        // (0, 0) is what loggers emit while the GPS has no fix
        if lat == 0.0 && lon == 0.0 {
            return None;
        }
        let speed = record.speed.filter(|v| v.is_finite());
        if require_speed && speed.is_none() {
            return None;
        }
        Some(Self {
            index,
            lat,
            lon,
            speed,
        })
    }
}

/// Ordered fixes of one recording. Filtering always produces a new trace.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Trace {
    fixes: Vec<Fix>,
}

impl Trace {
    pub fn new(fixes: Vec<Fix>) -> Self {
        Self { fixes }
    }

    /// Build a trace from raw records, dropping sentinel and incomplete fixes.
    ///
    /// Fails with [`LapTraceError::InsufficientData`] when fewer than
    /// `config.min_valid_fixes` fixes survive.
    pub fn from_records(
        records: &[RawRecord],
        config: &PreprocessConfig,
    ) -> Result<Self, LapTraceError> {
        let fixes: Vec<Fix> = records
            .iter()
            .enumerate()
            .filter_map(|(index, record)| Fix::from_record(index, record, config.require_speed))
            .collect();

        debug!(
            "Kept {} of {} records after validity filtering",
            fixes.len(),
            records.len()
        );

        if fixes.len() < config.min_valid_fixes {
            return Err(LapTraceError::InsufficientData {
                found: fixes.len(),
                required: config.min_valid_fixes,
            });
        }
        Ok(Self { fixes })
    }

    /// Fixes faster than `speed_threshold`. Fixes without speed count as stationary.
    pub fn moving(&self, speed_threshold: f64) -> Trace {
        Trace {
            fixes: self
                .fixes
                .iter()
                .filter(|fix| fix.speed.is_some_and(|speed| speed > speed_threshold))
                .copied()
                .collect(),
        }
    }

    pub fn fixes(&self) -> &[Fix] {
        &self.fixes
    }

    pub fn len(&self) -> usize {
        self.fixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fixes.is_empty()
    }

    pub fn first(&self) -> Option<&Fix> {
        self.fixes.first()
    }

    pub fn positions(&self) -> impl Iterator<Item = GeoPoint> + '_ {
        self.fixes.iter().map(Fix::position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn records(count: usize) -> Vec<RawRecord> {
        (0..count)
            .map(|i| RawRecord::new(26.0 + i as f64 * 1e-4, 50.0, Some(10.0)))
            .collect()
    }

    #[test]
    fn test_sentinel_and_missing_fixes_dropped() {
        let mut input = records(60);
        input[3] = RawRecord::new(0.0, 0.0, Some(5.0));
        input[7].longitude = None;
        input[9].latitude = Some(f64::NAN);

        let trace = Trace::from_records(&input, &PreprocessConfig::default()).unwrap();
        assert_eq!(trace.len(), 57);
        assert!(trace.fixes().iter().all(|f| !(f.lat == 0.0 && f.lon == 0.0)));
        // original order and indices are preserved
        assert_eq!(trace.fixes()[3].index, 4);
    }

    #[test]
    fn test_single_zero_coordinate_is_kept() {
        let mut input = records(50);
        input[0] = RawRecord::new(0.0, 50.0, None);
        let trace = Trace::from_records(&input, &PreprocessConfig::default()).unwrap();
        assert_eq!(trace.len(), 50);
    }

    #[test]
    fn test_duplicates_not_removed() {
        let input = vec![RawRecord::new(26.0, 50.0, Some(3.0)); 50];
        let trace = Trace::from_records(&input, &PreprocessConfig::default()).unwrap();
        assert_eq!(trace.len(), 50);
    }

    #[test]
    fn test_insufficient_data() {
        let result = Trace::from_records(&records(30), &PreprocessConfig::default());
        assert!(matches!(
            result,
            Err(LapTraceError::InsufficientData {
                found: 30,
                required: 50
            })
        ));
    }

    #[test]
    fn test_require_speed() {
        let mut input = records(55);
        for record in input.iter_mut().take(10) {
            record.speed = None;
        }
        let config = PreprocessConfig {
            require_speed: true,
            ..PreprocessConfig::default()
        };
        assert!(matches!(
            Trace::from_records(&input, &config),
            Err(LapTraceError::InsufficientData { found: 45, .. })
        ));
        assert_eq!(
            Trace::from_records(&input, &PreprocessConfig::default())
                .unwrap()
                .len(),
            55
        );
    }

    #[test]
    fn test_moving_filter() {
        let mut input = records(60);
        input[0].speed = Some(0.0);
        input[1].speed = Some(1.0);
        input[2].speed = None;
        let trace = Trace::from_records(&input, &PreprocessConfig::default()).unwrap();
        let moving = trace.moving(1.0);
        assert_eq!(moving.len(), 57);
        assert_eq!(moving.first().unwrap().index, 3);
        // the source trace is untouched
        assert_eq!(trace.len(), 60);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_sentinel_never_survives(
            sentinel_positions in proptest::collection::vec(0usize..80, 0..20),
        ) {
            let mut input = records(80);
            for &pos in &sentinel_positions {
                input[pos] = RawRecord::new(0.0, 0.0, Some(10.0));
            }
            let config = PreprocessConfig { min_valid_fixes: 0, ..PreprocessConfig::default() };
            let trace = Trace::from_records(&input, &config).unwrap();
            prop_assert!(trace.positions().all(|p| !(p.lat == 0.0 && p.lon == 0.0)));
        }
    }
}
