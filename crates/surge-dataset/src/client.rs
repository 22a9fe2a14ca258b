//! Remote dataset reads over the OPeNDAP text interface.
//!
//! One implementation serves all three retrieval strategies: direct
//! NetCDF URLs on the data servers are alternate spellings of the same
//! files their DAP endpoints serve, so direct handles are rewritten to
//! the DAP form rather than decoding binary NetCDF here. Retries are
//! never attempted at this layer; the aggregator owns failure policy.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use surge_common::time::{TimeEncoding, TimeWindow};
use surge_common::{AxisCoords, SurgeError, SurgeResult, VariableSlice};

use crate::dods::{self, DodsVariable};
use crate::handle::{DataSourceHandle, RetrievalStrategy};

/// Capability to read variables out of a resolved remote dataset.
#[async_trait]
pub trait DatasetReader: Send + Sync {
    /// Read one slice per requested variable present in the dataset.
    ///
    /// A missing variable is skipped, not an error for the handle; an
    /// unreachable server or unparseable payload fails the handle.
    async fn read_variables(
        &self,
        handle: &DataSourceHandle,
        window: Option<&TimeWindow>,
        variables: &[String],
    ) -> SurgeResult<Vec<VariableSlice>>;
}

/// Timeouts for remote dataset access.
#[derive(Debug, Clone)]
pub struct DapClientConfig {
    /// Per-open connection timeout.
    pub connect_timeout: Duration,
    /// Per-read timeout covering the response body.
    pub read_timeout: Duration,
}

impl Default for DapClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(5),
        }
    }
}

/// OPeNDAP reader used for all retrieval strategies.
pub struct DapClient {
    client: reqwest::Client,
    config: DapClientConfig,
}

impl DapClient {
    pub fn new(config: DapClientConfig) -> SurgeResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.read_timeout)
            .pool_max_idle_per_host(4)
            .build()
            .map_err(|e| SurgeError::InternalError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &DapClientConfig {
        &self.config
    }

    async fn get_text(&self, url: &str) -> SurgeResult<(reqwest::StatusCode, String)> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| SurgeError::SourceUnreachable(format!("{}: {}", url, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SurgeError::SourceUnreachable(format!("{}: {}", url, e)))?;

        Ok((status, body))
    }

    /// Units attributes for the dataset; missing attributes degrade the
    /// affected slices later, not the whole read.
    async fn fetch_units(&self, base: &str) -> HashMap<String, String> {
        match self.get_text(&format!("{}.das", base)).await {
            Ok((status, body)) if status.is_success() => dods::parse_das_units(&body),
            Ok((status, _)) => {
                warn!(url = %base, %status, "attribute fetch rejected");
                HashMap::new()
            }
            Err(e) => {
                warn!(url = %base, error = %e, "attribute fetch failed");
                HashMap::new()
            }
        }
    }

    /// The shared time axis; a dataset without one is unusable here.
    async fn fetch_time_axis(&self, base: &str) -> SurgeResult<DodsVariable> {
        let url = format!("{}.ascii?time", base);
        let (status, body) = self.get_text(&url).await?;

        if status.is_client_error() {
            return Err(SurgeError::FormatError(format!(
                "{}: no time axis (HTTP {})",
                base, status
            )));
        }
        if !status.is_success() {
            return Err(SurgeError::SourceUnreachable(format!(
                "{}: HTTP {}",
                url, status
            )));
        }

        dods::parse_ascii(&body)?
            .into_iter()
            .find(|v| v.name == "time")
            .ok_or_else(|| SurgeError::FormatError(format!("{}: no time axis in response", base)))
    }
}

#[async_trait]
impl DatasetReader for DapClient {
    async fn read_variables(
        &self,
        handle: &DataSourceHandle,
        window: Option<&TimeWindow>,
        variables: &[String],
    ) -> SurgeResult<Vec<VariableSlice>> {
        if variables.is_empty() {
            return Ok(Vec::new());
        }

        let base = dap_url(handle);
        let units = self.fetch_units(&base).await;
        let time = self.fetch_time_axis(&base).await?;

        let mut slices = Vec::with_capacity(variables.len());

        for name in variables {
            if name == "time" {
                continue;
            }

            let url = format!("{}.ascii?{}", base, name);
            let (status, body) = self.get_text(&url).await?;

            if status.is_client_error() {
                // that single variable is skipped, not the whole handle
                debug!(url = %base, variable = %name, "variable not present, skipping");
                continue;
            }
            if !status.is_success() {
                return Err(SurgeError::SourceUnreachable(format!(
                    "{}: HTTP {}",
                    url, status
                )));
            }

            let var = dods::parse_ascii(&body)?
                .into_iter()
                .find(|v| v.name == *name)
                .ok_or_else(|| {
                    SurgeError::FormatError(format!("{}: response lacks '{}'", base, name))
                })?;

            slices.push(build_slice(var, &time, &units, window));
        }

        Ok(slices)
    }
}

/// The DAP spelling of a handle's URL.
///
/// TDS serves the same file under `/fileServer/` (plain HTTP) and
/// `/dodsC/` (DAP); direct handles are rewritten so one reader covers
/// both. Servers without a DAP endpoint fail the read as a format
/// error downstream.
pub fn dap_url(handle: &DataSourceHandle) -> String {
    match handle.strategy {
        RetrievalStrategy::Opendap => handle.url.clone(),
        RetrievalStrategy::DirectUrl | RetrievalStrategy::Scraped => {
            handle.url.replace("/fileServer/", "/dodsC/")
        }
    }
}

/// Assemble a `VariableSlice` from a parsed variable and the dataset's
/// time axis, trimming rows to the requested window when the time
/// encoding allows it.
fn build_slice(
    var: DodsVariable,
    time: &DodsVariable,
    units: &HashMap<String, String>,
    window: Option<&TimeWindow>,
) -> VariableSlice {
    let time_len = time.values.len();
    let var_unit = units.get(&var.name).cloned().unwrap_or_default();
    let time_unit = units.get("time").cloned();

    let leads_with_time = var.dims.first() == Some(&time_len);

    let mut axes: Vec<AxisCoords> = Vec::with_capacity(var.dims.len());
    if leads_with_time {
        axes.push(AxisCoords {
            label: "time".to_string(),
            unit: time_unit.clone(),
            coords: time.values.clone(),
        });
        for (i, len) in var.dims.iter().skip(1).enumerate() {
            axes.push(AxisCoords::new(
                format!("dim{}", i + 1),
                (0..*len).map(|j| j as f64).collect(),
            ));
        }
    } else {
        for (i, len) in var.dims.iter().enumerate() {
            axes.push(AxisCoords::new(
                format!("dim{}", i),
                (0..*len).map(|j| j as f64).collect(),
            ));
        }
    }

    let mut slice = VariableSlice {
        name: var.name,
        unit: var_unit,
        axes,
        values: var.values,
    };

    if leads_with_time {
        if let (Some(window), Some(unit)) = (window, time_unit.as_deref()) {
            if let Ok(encoding) = TimeEncoding::parse(unit) {
                trim_to_window(&mut slice, &encoding, window);
            }
        }
    }

    slice
}

/// Drop time rows outside the window, in place.
fn trim_to_window(slice: &mut VariableSlice, encoding: &TimeEncoding, window: &TimeWindow) {
    let row_len: usize = slice.axes[1..].iter().map(|a| a.len()).product::<usize>().max(1);

    let keep: Vec<usize> = slice.axes[0]
        .coords
        .iter()
        .enumerate()
        .filter(|(_, offset)| {
            encoding
                .decode(**offset)
                .map(|dt| window.contains(&dt))
                .unwrap_or(false)
        })
        .map(|(i, _)| i)
        .collect();

    if keep.len() == slice.axes[0].coords.len() {
        return;
    }

    let coords: Vec<f64> = keep.iter().map(|i| slice.axes[0].coords[*i]).collect();
    let mut values: Vec<f64> = Vec::with_capacity(keep.len() * row_len);
    for i in &keep {
        let start = i * row_len;
        values.extend_from_slice(&slice.values[start..start + row_len]);
    }

    slice.axes[0].coords = coords;
    slice.values = values;
}
