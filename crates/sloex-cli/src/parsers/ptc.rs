//! Parser for PTC `ptc_track` one-table output (`trackone`).
//!
//! ```text
//! @ NAME             %07s "TRACKONE"
//! * NUMBER TURN X PX Y PY T PT S E
//! $ %d %d %le %le %le %le %le %le %le %le
//! #segment 1 2 100 1 start
//!     1    0  1.0e-3  0.0  0.0  0.0  0.0  0.0  0.0  0.3
//! #segment 2 2 100 1 es
//!     1    1  9.8e-4  1e-5 0.0  0.0  0.0  0.0  60.0 0.3
//! ```
//!
//! Rows are grouped by the observation point named on the preceding
//! `#segment` line. Particle numbers are 1-based.

use std::collections::HashMap;
use std::path::Path;

use ndarray::Array3;
use sloex_core::types::CoordinateAxis;

use super::{field, parse_f64, split_fields, ParseError};

const DEFAULT_COLUMNS: [&str; 10] = ["NUMBER", "TURN", "X", "PX", "Y", "PY", "T", "PT", "S", "E"];
const COORDINATE_COLUMNS: [&str; CoordinateAxis::COUNT] = ["X", "PX", "Y", "PY", "T", "PT"];

/// Tracked coordinates at one observation point.
#[derive(Debug, Clone)]
pub struct TrackData {
    /// Observation point the rows were taken from.
    pub observation: String,
    /// First turn present in the file; `coordinates[.., .., 0]` belongs to it.
    pub first_turn: usize,
    /// Shape `[6, particles, turns]`. Entries for lost particles are NaN.
    pub coordinates: Array3<f64>,
}

impl TrackData {
    pub fn particle_count(&self) -> usize {
        self.coordinates.dim().1
    }

    pub fn turn_count(&self) -> usize {
        self.coordinates.dim().2
    }
}

struct TrackRow {
    segment: String,
    number: usize,
    turn: usize,
    coords: [f64; CoordinateAxis::COUNT],
}

/// Read and parse a PTC one-table file from disk.
pub fn read_trackone(path: &Path, observation: Option<&str>) -> Result<TrackData, ParseError> {
    let content = std::fs::read_to_string(path)?;
    parse_trackone(&content, observation)
}

/// Parse PTC one-table output.
///
/// With `observation = None` the first observation point after `start`
/// is used, falling back to `start` when it is the only one.
pub fn parse_trackone(content: &str, observation: Option<&str>) -> Result<TrackData, ParseError> {
    let mut columns: HashMap<String, usize> = DEFAULT_COLUMNS
        .iter()
        .enumerate()
        .map(|(i, name)| (name.to_string(), i))
        .collect();
    let mut segments: Vec<String> = Vec::new();
    let mut segment = String::from("start");
    let mut rows = Vec::new();

    for (idx, raw) in content.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('@') || line.starts_with('$') {
            continue;
        }
        if let Some(info) = line.strip_prefix("#segment") {
            segment = info
                .split_whitespace()
                .last()
                .unwrap_or("start")
                .to_ascii_lowercase();
            if !segments.contains(&segment) {
                segments.push(segment.clone());
            }
            continue;
        }
        if line.starts_with('#') {
            continue;
        }
        if let Some(names) = line.strip_prefix('*') {
            columns = names
                .split_whitespace()
                .enumerate()
                .map(|(i, name)| (name.to_ascii_uppercase(), i))
                .collect();
            continue;
        }

        let fields = split_fields(line);
        let number = parse_index(field(&fields, &columns, "NUMBER", line_no)?, line_no, "NUMBER")?;
        if number == 0 {
            return Err(ParseError::FormatError {
                line: line_no,
                message: "Particle numbers start at 1".into(),
            });
        }
        let turn = parse_index(field(&fields, &columns, "TURN", line_no)?, line_no, "TURN")?;
        let mut coords = [0.0; CoordinateAxis::COUNT];
        for (c, name) in coords.iter_mut().zip(COORDINATE_COLUMNS) {
            *c = parse_f64(field(&fields, &columns, name, line_no)?, line_no, name)?;
        }
        rows.push(TrackRow {
            segment: segment.clone(),
            number,
            turn,
            coords,
        });
    }

    let target = match observation {
        Some(name) => name.to_ascii_lowercase(),
        None => segments
            .iter()
            .find(|s| s.as_str() != "start")
            .cloned()
            .unwrap_or_else(|| "start".into()),
    };
    rows.retain(|row| row.segment == target);
    if rows.is_empty() {
        return Err(ParseError::FormatError {
            line: 0,
            message: format!("No tracking rows at observation point '{target}'"),
        });
    }

    let particles = rows.iter().map(|r| r.number).max().unwrap_or(0);
    let first_turn = rows.iter().map(|r| r.turn).min().unwrap_or(0);
    let last_turn = rows.iter().map(|r| r.turn).max().unwrap_or(0);

    let mut coordinates =
        Array3::from_elem((CoordinateAxis::COUNT, particles, last_turn - first_turn + 1), f64::NAN);
    for row in &rows {
        for (axis, &value) in row.coords.iter().enumerate() {
            coordinates[[axis, row.number - 1, row.turn - first_turn]] = value;
        }
    }

    log::debug!(
        "Read {} tracking rows at '{}' ({} particles, {} turns)",
        rows.len(),
        target,
        particles,
        last_turn - first_turn + 1
    );

    Ok(TrackData {
        observation: target,
        first_turn,
        coordinates,
    })
}

fn parse_index(token: &str, line: usize, column: &str) -> Result<usize, ParseError> {
    token.parse().map_err(|_| ParseError::FormatError {
        line,
        message: format!("Invalid value for {column}: '{token}'"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRACK: &str = "@ NAME %07s \"TRACKONE\"
* NUMBER TURN X PX Y PY T PT S E
$ %d %d %le %le %le %le %le %le %le %le
#segment 1 2 2 1 start
 1 0 1.0e-3 0 2.0e-3 0 0 0 0 0.3
 2 0 1.5e-3 0 2.5e-3 0 0 0 0 0.3
#segment 2 2 2 1 es
 1 1 0.9e-3 1e-5 1.9e-3 0 0 0 60 0.3
 2 1 1.4e-3 2e-5 2.4e-3 0 0 0 60 0.3
 1 2 0.8e-3 3e-5 1.8e-3 0 0 0 60 0.3
";

    #[test]
    fn test_defaults_to_first_observation_after_start() {
        let data = parse_trackone(TRACK, None).unwrap();
        assert_eq!(data.observation, "es");
        assert_eq!(data.first_turn, 1);
        assert_eq!(data.coordinates.dim(), (6, 2, 2));
        assert_eq!(data.coordinates[[0, 0, 0]], 0.9e-3);
        assert_eq!(data.coordinates[[1, 1, 0]], 2e-5);
        assert_eq!(data.coordinates[[2, 0, 1]], 1.8e-3);
        // Particle 2 is lost before turn 2.
        assert!(data.coordinates[[0, 1, 1]].is_nan());
    }

    #[test]
    fn test_explicit_observation_point() {
        let data = parse_trackone(TRACK, Some("START")).unwrap();
        assert_eq!(data.observation, "start");
        assert_eq!(data.coordinates.dim(), (6, 2, 1));
        assert_eq!(data.coordinates[[2, 1, 0]], 2.5e-3);
    }

    #[test]
    fn test_unknown_observation_point() {
        assert!(matches!(
            parse_trackone(TRACK, Some("xr")),
            Err(ParseError::FormatError { .. })
        ));
    }

    #[test]
    fn test_zero_particle_number_rejected() {
        let content = "#segment 1 1 1 1 start\n 0 0 0 0 0 0 0 0 0 0\n";
        match parse_trackone(content, None) {
            Err(ParseError::FormatError { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected format error, got {other:?}"),
        }
    }
}
