//! Parsing of OPeNDAP text responses.
//!
//! The data servers answer `<url>.ascii?<var>` with a dataset header,
//! a dashed separator and one section per variable:
//!
//! ```text
//! Dataset {
//!     Float64 zeta[time = 3][node = 1];
//! } fort.63.nc;
//! ---------------------------------------------
//! zeta[3][1]
//! [0], -0.18
//! [1], -0.15
//! [2], -0.11
//!
//! time[3]
//! 86400, 90000, 93600
//! ```
//!
//! and `<url>.das` with the attribute tree that carries units. Only the
//! small slice of both grammars that those servers actually emit is
//! handled here; a full DAP client is deliberately out of scope.

use std::collections::HashMap;

use regex::Regex;

use surge_common::{SurgeError, SurgeResult};

/// One variable section parsed out of a `.ascii` response.
#[derive(Debug, Clone, PartialEq)]
pub struct DodsVariable {
    pub name: String,
    /// Axis lengths, storage order.
    pub dims: Vec<usize>,
    /// Row-major values.
    pub values: Vec<f64>,
}

impl DodsVariable {
    /// Values count must match the declared shape.
    fn validate(&self) -> SurgeResult<()> {
        let expected: usize = self.dims.iter().product();
        if expected != self.values.len() {
            return Err(SurgeError::FormatError(format!(
                "variable '{}' declares {:?} but carries {} values",
                self.name,
                self.dims,
                self.values.len()
            )));
        }
        Ok(())
    }
}

/// Parse the body of a `.ascii` response into its variable sections.
pub fn parse_ascii(body: &str) -> SurgeResult<Vec<DodsVariable>> {
    // Values follow the dashed separator; everything before it is the
    // DDS echo.
    let data = match body.split_once("\n---") {
        Some((_, rest)) => rest
            .split_once('\n')
            .map(|(_, tail)| tail)
            .unwrap_or(""),
        None => body,
    };

    let header_re = Regex::new(r"^([A-Za-z_][\w.]*)((?:\[[^\]]+\])+)$").unwrap();
    let dim_re = Regex::new(r"\[(?:[^=\]]*=\s*)?(\d+)\]").unwrap();
    let index_prefix_re = Regex::new(r"^(?:\[\d+\])+\s*,?\s*").unwrap();

    let mut variables: Vec<DodsVariable> = Vec::new();
    let mut current: Option<DodsVariable> = None;

    for raw_line in data.lines() {
        let line = raw_line.trim();

        if line.is_empty() {
            if let Some(var) = current.take() {
                var.validate()?;
                variables.push(var);
            }
            continue;
        }

        if let Some(caps) = header_re.captures(line) {
            if let Some(var) = current.take() {
                var.validate()?;
                variables.push(var);
            }

            let full_name = caps.get(1).unwrap().as_str();
            // structure members print as "fort.zeta"
            let name = full_name.rsplit('.').next().unwrap_or(full_name);
            let dims = dim_re
                .captures_iter(caps.get(2).unwrap().as_str())
                .filter_map(|c| c[1].parse::<usize>().ok())
                .collect();

            current = Some(DodsVariable {
                name: name.to_string(),
                dims,
                values: Vec::new(),
            });
            continue;
        }

        // "time, 86400, 90000" single-line form
        if current.is_none() {
            if let Some((name, rest)) = line.split_once(',') {
                if is_identifier(name.trim()) {
                    let values = parse_values(rest)?;
                    let var = DodsVariable {
                        name: name.trim().to_string(),
                        dims: vec![values.len()],
                        values,
                    };
                    var.validate()?;
                    variables.push(var);
                    continue;
                }
            }
            return Err(SurgeError::FormatError(format!(
                "unexpected line outside variable section: '{}'",
                line
            )));
        }

        let stripped = index_prefix_re.replace(line, "");
        let mut values = parse_values(&stripped)?;
        if let Some(var) = current.as_mut() {
            var.values.append(&mut values);
        }
    }

    if let Some(var) = current.take() {
        var.validate()?;
        variables.push(var);
    }

    if variables.is_empty() {
        return Err(SurgeError::FormatError(
            "no variable sections in response".into(),
        ));
    }

    Ok(variables)
}

/// Pull per-variable `units` attributes out of a `.das` response.
pub fn parse_das_units(body: &str) -> HashMap<String, String> {
    let units_re = Regex::new(r#"units\s+"([^"]*)""#).unwrap();

    let mut units: HashMap<String, String> = HashMap::new();
    let mut stack: Vec<String> = Vec::new();

    for raw_line in body.lines() {
        let line = raw_line.trim();

        if let Some(block) = line.strip_suffix('{') {
            stack.push(block.trim().to_string());
            continue;
        }
        if line == "}" || line == "};" {
            stack.pop();
            continue;
        }

        if let Some(caps) = units_re.captures(line) {
            // stack is [Attributes, <var>] inside a variable block
            if let Some(var) = stack.last() {
                if stack.len() >= 2 {
                    units.insert(var.clone(), caps[1].to_string());
                }
            }
        }
    }

    units
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty()
        && s.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

fn parse_values(s: &str) -> SurgeResult<Vec<f64>> {
    s.split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| {
            if v.eq_ignore_ascii_case("nan") {
                Ok(f64::NAN)
            } else {
                v.parse::<f64>().map_err(|_| {
                    SurgeError::FormatError(format!("unparseable value: '{}'", v))
                })
            }
        })
        .collect()
}
