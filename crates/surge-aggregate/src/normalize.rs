//! Shape normalization for heterogeneous variable slices.
//!
//! Source files disagree on variable naming, units and time encodings.
//! The canonical form produced here is what the rest of the response
//! path works with: canonical field name, one documented unit per
//! quantity, and a single ascending time axis encoded as seconds since
//! the Unix epoch. Normalizing an already-canonical slice is the
//! identity.

use surge_common::time::TimeEncoding;
use surge_common::{AxisCoords, SurgeError, SurgeResult, VariableSlice};

/// Source variable name to canonical response field name.
const CANONICAL_NAMES: &[(&str, &str)] = &[
    ("zeta", "water_level"),
    ("zeta_max", "max_water_level"),
    ("swan_HS", "wave_height"),
    ("swan_HS_max", "max_wave_height"),
    ("swan_TPS", "peak_wave_period"),
];

/// Unit conversion table: source spelling, canonical unit, scale.
///
/// Lengths to meters, velocities to meters per second, periods to
/// seconds. Unknown units pass through unconverted.
const UNIT_TABLE: &[(&str, &str, f64)] = &[
    ("m", "m", 1.0),
    ("meter", "m", 1.0),
    ("meters", "m", 1.0),
    ("cm", "m", 0.01),
    ("mm", "m", 0.001),
    ("ft", "m", 0.3048),
    ("feet", "m", 0.3048),
    ("m s-1", "m s-1", 1.0),
    ("m/s", "m s-1", 1.0),
    ("mps", "m s-1", 1.0),
    ("kt", "m s-1", 0.514444),
    ("knots", "m s-1", 0.514444),
    ("mph", "m s-1", 0.44704),
    ("s", "s", 1.0),
    ("sec", "s", 1.0),
    ("seconds", "s", 1.0),
];

/// Canonical response field name for a source variable name.
///
/// Names already canonical (or unknown to the table) pass through.
pub fn canonical_name(name: &str) -> String {
    CANONICAL_NAMES
        .iter()
        .find(|(source, _)| *source == name)
        .map(|(_, canonical)| (*canonical).to_string())
        .unwrap_or_else(|| name.to_string())
}

/// Source names that may carry a requested canonical variable.
pub fn source_names(canonical: &str) -> Vec<String> {
    let mut names = vec![canonical.to_string()];
    for (source, target) in CANONICAL_NAMES {
        if *target == canonical {
            names.push((*source).to_string());
        }
    }
    names
}

/// Canonical unit and scale factor for a source unit string.
pub fn canonical_unit(unit: &str) -> (String, f64) {
    let trimmed = unit.trim();
    UNIT_TABLE
        .iter()
        .find(|(source, _, _)| source.eq_ignore_ascii_case(trimmed))
        .map(|(_, canonical, scale)| ((*canonical).to_string(), *scale))
        .unwrap_or_else(|| (trimmed.to_string(), 1.0))
}

/// Normalize one slice into canonical form.
///
/// Requirements on the input: a consistent shape, a leading time axis
/// with a parseable encoding and no more than one value per time step
/// (the read layer subsets down to a point), and a non-decreasing time
/// axis. Violations are `NormalizationError`; the caller drops the
/// slice and flags the source rather than failing the request.
pub fn normalize(slice: &VariableSlice) -> SurgeResult<VariableSlice> {
    slice
        .validate_shape()
        .map_err(SurgeError::NormalizationError)?;

    let time_axis = slice
        .time_axis()
        .ok_or_else(|| SurgeError::NormalizationError(format!(
            "variable '{}' has no time axis",
            slice.name
        )))?;

    if slice.axes.first().map(|a| a.label.as_str()) != Some("time") {
        return Err(SurgeError::NormalizationError(format!(
            "variable '{}' time axis is not leading",
            slice.name
        )));
    }

    let row_len: usize = slice.axes[1..].iter().map(AxisCoords::len).product();
    if row_len > 1 {
        return Err(SurgeError::NormalizationError(format!(
            "variable '{}' carries {} values per time step",
            slice.name, row_len
        )));
    }

    let unit_attr = time_axis.unit.as_deref().ok_or_else(|| {
        SurgeError::NormalizationError(format!(
            "variable '{}' time axis has no unit attribute",
            slice.name
        ))
    })?;
    let encoding = TimeEncoding::parse(unit_attr)
        .map_err(|e| SurgeError::NormalizationError(e.to_string()))?;

    let canonical = TimeEncoding::canonical();
    let mut times: Vec<f64> = Vec::with_capacity(time_axis.coords.len());
    for offset in &time_axis.coords {
        let dt = encoding.decode(*offset).ok_or_else(|| {
            SurgeError::NormalizationError(format!(
                "variable '{}' has an undecodable time value: {}",
                slice.name, offset
            ))
        })?;
        times.push(canonical.encode(&dt));
    }

    // The source writes its steps in order; a descending step means a
    // malformed axis, not a reordering to repair.
    if times.windows(2).any(|w| w[1] < w[0]) {
        return Err(SurgeError::NormalizationError(format!(
            "variable '{}' has a non-monotonic time axis",
            slice.name
        )));
    }

    let (unit, scale) = canonical_unit(&slice.unit);

    // Collapse equal consecutive steps, keeping the later value.
    let mut coords: Vec<f64> = Vec::with_capacity(times.len());
    let mut values: Vec<f64> = Vec::with_capacity(times.len());
    for (t, v) in times.iter().zip(slice.values.iter()) {
        if coords.last() == Some(t) {
            *values.last_mut().unwrap() = v * scale;
        } else {
            coords.push(*t);
            values.push(v * scale);
        }
    }

    Ok(VariableSlice {
        name: canonical_name(&slice.name),
        unit,
        axes: vec![AxisCoords::with_unit(
            "time",
            TimeEncoding::canonical_unit_string(),
            coords,
        )],
        values,
    })
}

/// Merge canonical slices of the same variable from several cycles into
/// one series: ascending time, later slices winning on overlap.
pub fn merge_canonical(slices: Vec<VariableSlice>) -> Option<VariableSlice> {
    let mut iter = slices.into_iter();
    let mut merged = iter.next()?;

    let mut pairs: Vec<(f64, f64)> = merged
        .axes[0]
        .coords
        .iter()
        .copied()
        .zip(merged.values.iter().copied())
        .collect();
    for slice in iter {
        pairs.extend(
            slice.axes[0]
                .coords
                .iter()
                .copied()
                .zip(slice.values.iter().copied()),
        );
    }

    // stable sort keeps later contributions after earlier ones at
    // equal timestamps, so keep-last wins
    pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

    let mut coords: Vec<f64> = Vec::with_capacity(pairs.len());
    let mut values: Vec<f64> = Vec::with_capacity(pairs.len());
    for (t, v) in pairs {
        if coords.last() == Some(&t) {
            *values.last_mut().unwrap() = v;
        } else {
            coords.push(t);
            values.push(v);
        }
    }

    merged.axes[0].coords = coords;
    merged.values = values;
    Some(merged)
}
