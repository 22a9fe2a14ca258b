//! Variable slices read from remote datasets.
//!
//! Remote formats are schema-less from our point of view, so a slice is
//! a tagged structure decided at read time: name, unit, one coordinate
//! array per axis, and a row-major value block.

use serde::{Deserialize, Serialize};

/// Coordinate values along one named axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisCoords {
    pub label: String,
    /// Unit attribute for the coordinates, when the source declares one
    /// (time axes carry their CF encoding here).
    pub unit: Option<String>,
    pub coords: Vec<f64>,
}

impl AxisCoords {
    pub fn new(label: impl Into<String>, coords: Vec<f64>) -> Self {
        Self {
            label: label.into(),
            unit: None,
            coords,
        }
    }

    pub fn with_unit(label: impl Into<String>, unit: impl Into<String>, coords: Vec<f64>) -> Self {
        Self {
            label: label.into(),
            unit: Some(unit.into()),
            coords,
        }
    }

    pub fn len(&self) -> usize {
        self.coords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }
}

/// One variable's values over a requested dimension window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableSlice {
    pub name: String,
    /// Unit attribute as read from the source ("m", "seconds since ...").
    pub unit: String,
    /// One coordinate array per axis, in storage order.
    pub axes: Vec<AxisCoords>,
    /// Row-major values; length equals the product of axis lengths.
    pub values: Vec<f64>,
}

impl VariableSlice {
    /// Check the shape invariant: one coordinate array per axis and a
    /// value count matching the product of axis lengths.
    pub fn validate_shape(&self) -> Result<(), String> {
        if self.axes.is_empty() {
            return Err(format!("variable '{}' has no axes", self.name));
        }

        let expected: usize = self.axes.iter().map(AxisCoords::len).product();
        if self.values.len() != expected {
            return Err(format!(
                "variable '{}' has {} values but axes imply {}",
                self.name,
                self.values.len(),
                expected
            ));
        }

        Ok(())
    }

    /// The time axis, if this slice carries one.
    pub fn time_axis(&self) -> Option<&AxisCoords> {
        self.axes.iter().find(|a| a.label == "time")
    }

    /// Shape as a list of axis lengths, storage order.
    pub fn shape(&self) -> Vec<usize> {
        self.axes.iter().map(AxisCoords::len).collect()
    }
}
