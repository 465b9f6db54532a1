use std::{
    fmt::Write as _,
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use crate::{LapTraceError, geo::GeoPoint, ranking::BestLapExport};

/// Write the best lap export as pretty-printed JSON
pub fn write_export(file: &Path, export: &BestLapExport) -> Result<(), LapTraceError> {
    let export_file = File::create(file).map_err(|e| LapTraceError::WriterError { source: e })?;
    let mut export_writer = BufWriter::new(export_file);
    serde_json::to_writer_pretty(&mut export_writer, export)
        .map_err(|e| LapTraceError::ExportSerialize { source: e })?;
    export_writer
        .flush()
        .map_err(|e| LapTraceError::WriterError { source: e })?;
    Ok(())
}

/// Render an outline block followed by its center:
///
/// ```text
/// outline: [
///     [26.1, 50.1],
/// ]
///
/// center: [26.1, 50.1]
/// ```
pub fn render_outline(points: &[GeoPoint], center: Option<GeoPoint>) -> String {
    let mut output = String::from("outline: [\n");
    for point in points {
        let _ = writeln!(output, "    [{}, {}],", point.lat, point.lon);
    }
    output.push_str("]\n");
    if let Some(center) = center {
        let _ = write!(output, "\ncenter: [{}, {}]\n", center.lat, center.lon);
    }
    output
}

/// Render the points as a JavaScript array constant named `name`
pub fn render_js_array(name: &str, points: &[GeoPoint]) -> String {
    let rows = points
        .iter()
        .map(|point| format!("  [{}, {}]", point.lat, point.lon))
        .collect::<Vec<_>>()
        .join(",\n");
    format!("const {name} = [\n{rows}\n];\n")
}

pub fn write_outline(
    file: &Path,
    points: &[GeoPoint],
    center: Option<GeoPoint>,
) -> Result<(), LapTraceError> {
    std::fs::write(file, render_outline(points, center))
        .map_err(|e| LapTraceError::WriterError { source: e })
}
