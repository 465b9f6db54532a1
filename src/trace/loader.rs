// Recording sources: turn CSV or JSON-lines telemetry logs into raw records

use std::path::{Path, PathBuf};

use csv::StringRecord;
use log::{info, warn};
use serde_jsonlines::JsonLinesReader;

use super::RawRecord;
use crate::LapTraceError;

const LATITUDE_COLUMN: &str = "latitude";
const LONGITUDE_COLUMN: &str = "longitude";
const SPEED_COLUMN: &str = "speed";

/// Raw records of one recording plus the count of records that could not be parsed
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LoadedRecording {
    pub records: Vec<RawRecord>,
    pub malformed: usize,
}

/// Something that can produce the records of one recording
pub trait RecordingSource {
    /// Identifier used to key results, unique within a batch
    fn id(&self) -> &str;

    fn load(&self) -> Result<LoadedRecording, LapTraceError>;
}

/// A recording stored on disk, read as CSV or JSON lines depending on its extension
#[derive(Clone, Debug)]
pub struct FileSource {
    id: String,
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let id = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self { id, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordingSource for FileSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn load(&self) -> Result<LoadedRecording, LapTraceError> {
        if !self.path.exists() {
            return Err(LapTraceError::SourceNotFound {
                path: self.path.display().to_string(),
            });
        }
        let bytes = std::fs::read(&self.path).map_err(|e| LapTraceError::SourceIo {
            source_id: self.id.clone(),
            source: e,
        })?;
        let text = decode_text(&self.id, bytes);

        let extension = self
            .path
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase());
        let loaded = match extension.as_deref() {
            Some("csv") | Some("txt") => parse_csv(&self.id, &text)?,
            Some("jsonl") | Some("json") => parse_json_lines(&self.id, &text)?,
            _ => {
                return Err(LapTraceError::UnsupportedFormat {
                    path: self.path.display().to_string(),
                });
            }
        };
        info!(
            "Loaded {} records from {} ({} malformed)",
            loaded.records.len(),
            self.id,
            loaded.malformed
        );
        Ok(loaded)
    }
}

/// Records already in memory, used by tests and embedding applications
#[derive(Clone, Debug)]
pub struct InMemorySource {
    id: String,
    records: Vec<RawRecord>,
}

impl InMemorySource {
    pub fn new(id: impl Into<String>, records: Vec<RawRecord>) -> Self {
        Self {
            id: id.into(),
            records,
        }
    }
}

impl RecordingSource for InMemorySource {
    fn id(&self) -> &str {
        &self.id
    }

    fn load(&self) -> Result<LoadedRecording, LapTraceError> {
        Ok(LoadedRecording {
            records: self.records.clone(),
            malformed: 0,
        })
    }
}

/// UTF-8 with a Latin-1 fallback, since logger exports are not consistent
fn decode_text(source_id: &str, bytes: Vec<u8>) -> String {
    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => {
            warn!("{} is not valid UTF-8, decoding as Latin-1", source_id);
            err.into_bytes().iter().map(|&b| b as char).collect()
        }
    };
    match text.strip_prefix('\u{feff}') {
        Some(stripped) => stripped.to_string(),
        None => text,
    }
}

/// Parse a CSV log with a header row. Latitude and longitude columns are required,
/// speed is optional.
pub fn parse_csv(source_id: &str, text: &str) -> Result<LoadedRecording, LapTraceError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(text.as_bytes());
    let headers = reader
        .headers()
        .map_err(|e| LapTraceError::CsvRead {
            source_id: source_id.to_string(),
            source: e,
        })?
        .clone();

    let column = |name: &str| headers.iter().position(|header| header == name);
    let (lat_idx, lon_idx) = match (column(LATITUDE_COLUMN), column(LONGITUDE_COLUMN)) {
        (Some(lat), Some(lon)) => (lat, lon),
        (lat, lon) => {
            let missing = [(LATITUDE_COLUMN, lat), (LONGITUDE_COLUMN, lon)]
                .iter()
                .filter(|(_, idx)| idx.is_none())
                .map(|(name, _)| *name)
                .collect::<Vec<_>>()
                .join(", ");
            return Err(LapTraceError::MissingColumns {
                source_id: source_id.to_string(),
                missing,
            });
        }
    };
    let speed_idx = column(SPEED_COLUMN);

    let mut loaded = LoadedRecording::default();
    for (row, result) in reader.records().enumerate() {
        // header is line 1
        let line = row + 2;
        let parsed = result
            .map_err(|e| LapTraceError::MalformedRecord {
                line,
                reason: e.to_string(),
            })
            .and_then(|record| {
                Ok(RawRecord {
                    latitude: parse_field(&record, Some(lat_idx), LATITUDE_COLUMN, line)?,
                    longitude: parse_field(&record, Some(lon_idx), LONGITUDE_COLUMN, line)?,
                    speed: parse_speed(source_id, &record, speed_idx, line),
                })
            });
        match parsed {
            Ok(record) => loaded.records.push(record),
            Err(e) => {
                warn!("Skipping record in {}: {}", source_id, e);
                loaded.malformed += 1;
            }
        }
    }
    Ok(loaded)
}

/// Empty or absent fields are missing values, anything else must be numeric
fn parse_field(
    record: &StringRecord,
    idx: Option<usize>,
    name: &str,
    line: usize,
) -> Result<Option<f64>, LapTraceError> {
    match idx.and_then(|i| record.get(i)) {
        None | Some("") => Ok(None),
        Some(value) => value
            .parse::<f64>()
            .map(Some)
            .map_err(|e| LapTraceError::MalformedRecord {
                line,
                reason: format!("{name} {value:?}: {e}"),
            }),
    }
}

/// Speed is optional, so a value that does not parse becomes a missing speed
/// and the position is kept
fn parse_speed(
    source_id: &str,
    record: &StringRecord,
    idx: Option<usize>,
    line: usize,
) -> Option<f64> {
    match parse_field(record, idx, SPEED_COLUMN, line) {
        Ok(speed) => speed,
        Err(e) => {
            warn!("Ignoring speed in {}: {}", source_id, e);
            None
        }
    }
}

/// Parse one `{"latitude": .., "longitude": .., "speed": ..}` object per line
pub fn parse_json_lines(source_id: &str, text: &str) -> Result<LoadedRecording, LapTraceError> {
    let mut loaded = LoadedRecording::default();
    let reader = JsonLinesReader::new(text.as_bytes());
    for (row, result) in reader.read_all::<RawRecord>().enumerate() {
        match result {
            Ok(record) => loaded.records.push(record),
            Err(e) => {
                warn!("Skipping record in {} at line {}: {}", source_id, row + 1, e);
                loaded.malformed += 1;
            }
        }
    }

    let has = |field: fn(&RawRecord) -> bool| loaded.records.iter().any(field);
    if !loaded.records.is_empty() {
        let missing = [
            (LATITUDE_COLUMN, has(|r| r.latitude.is_some())),
            (LONGITUDE_COLUMN, has(|r| r.longitude.is_some())),
        ]
        .iter()
        .filter(|(_, present)| !present)
        .map(|(name, _)| *name)
        .collect::<Vec<_>>();
        if !missing.is_empty() {
            return Err(LapTraceError::MissingColumns {
                source_id: source_id.to_string(),
                missing: missing.join(", "),
            });
        }
    }
    Ok(loaded)
}
