//! The orchestrating core: catalog lookup, source resolution,
//! concurrent fetch, normalization and response assembly.
//!
//! Failure policy (per source taxonomy): only a missing/invalid filter
//! or an unreachable catalog abort a request. Everything downstream is
//! captured per source so the viewer can render partial data.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::{timeout_at, Duration, Instant};
use tracing::{debug, info, instrument, warn};

use surge_catalog::{CatalogSource, RunQuery, RunRecord, RunStatus};
use surge_common::time::{TimeEncoding, TimeWindow};
use surge_common::{ResponseStatus, SourceStatus, SurgeError, SurgeResult, VariableSlice};
use surge_dataset::expand::expand_lookback;
use surge_dataset::handle::ensemble_from_url;
use surge_dataset::{DataSourceHandle, DatasetReader, Resolver, RetrievalStrategy};

use crate::normalize::{merge_canonical, normalize, source_names};

/// Aggregator tuning.
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// One overall deadline per request; outstanding source fetches are
    /// abandoned and flagged when it elapses.
    pub request_deadline: Duration,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            request_deadline: Duration::from_secs(30),
        }
    }
}

/// Parameters of one aggregation request.
#[derive(Debug, Clone, Default)]
pub struct RequestParams {
    pub query: RunQuery,
    /// Requested canonical variable names; empty means "whatever each
    /// source is expected to carry".
    pub variables: Vec<String>,
    pub window: Option<TimeWindow>,
    /// Walk resolved source URLs back this many days over sibling
    /// cycles (negative = back in time). The merged series keeps the
    /// later cycle on overlapping steps.
    pub lookback_days: Option<i64>,
    /// Ensemble substituted into walked-back URLs; defaults to the
    /// nowcast members.
    pub ensemble: Option<String>,
}

/// Look-backs beyond this are contradictory for 6-hourly cycle data.
const MAX_LOOKBACK_DAYS: i64 = 30;

/// Run metadata echoed on the response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunInfo {
    pub run_id: String,
    pub label: String,
    pub cycle_time: DateTime<Utc>,
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ensemble: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl RunInfo {
    fn from_record(record: &RunRecord, handles: &[DataSourceHandle]) -> Self {
        Self {
            run_id: record.run_id.clone(),
            label: record.label.clone(),
            cycle_time: record.cycle_time,
            status: record.status,
            ensemble: handles.first().and_then(|h| ensemble_from_url(&h.url)),
            updated_at: record.updated_at,
        }
    }
}

/// One normalized variable in the response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableEntry {
    pub name: String,
    pub unit: String,
    pub timestamps: Vec<DateTime<Utc>>,
    pub values: Vec<f64>,
    pub source_status: SourceStatus,
}

/// Outcome of one resolved source, kept even when it contributed data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceOutcome {
    pub url: String,
    pub strategy: RetrievalStrategy,
    pub status: SourceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// The single response shape assembled per request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run: Option<RunInfo>,
    pub status: ResponseStatus,
    pub variables: Vec<VariableEntry>,
    pub sources: Vec<SourceOutcome>,
}

impl AggregatedResponse {
    fn not_found() -> Self {
        Self {
            run: None,
            status: ResponseStatus::NotFound,
            variables: Vec::new(),
            sources: Vec::new(),
        }
    }

    fn not_ready(run: RunInfo) -> Self {
        Self {
            run: Some(run),
            status: ResponseStatus::NotReady,
            variables: Vec::new(),
            sources: Vec::new(),
        }
    }
}

/// Drives the full pipeline and returns exactly one response.
pub struct Aggregator {
    catalog: Arc<dyn CatalogSource>,
    resolver: Resolver,
    reader: Arc<dyn DatasetReader>,
    config: AggregatorConfig,
}

impl Aggregator {
    pub fn new(
        catalog: Arc<dyn CatalogSource>,
        resolver: Resolver,
        reader: Arc<dyn DatasetReader>,
        config: AggregatorConfig,
    ) -> Self {
        Self {
            catalog,
            resolver,
            reader,
            config,
        }
    }

    /// Resolve a request into one `AggregatedResponse`.
    ///
    /// Errors out only on `InvalidFilter` and `RepositoryUnavailable`;
    /// every other failure degrades the response instead.
    #[instrument(skip(self, params), fields(run_id = ?params.query.run_id))]
    pub async fn fetch(&self, params: &RequestParams) -> SurgeResult<AggregatedResponse> {
        params.query.validate()?;
        if let Some(ndays) = params.lookback_days {
            if ndays.abs() > MAX_LOOKBACK_DAYS {
                return Err(SurgeError::InvalidFilter(format!(
                    "lookback of {} days exceeds the {}-day maximum",
                    ndays, MAX_LOOKBACK_DAYS
                )));
            }
        }

        let records = self.catalog.find_runs(&params.query).await?;

        let Some(record) = records.first() else {
            debug!("no matching runs");
            return Ok(AggregatedResponse::not_found());
        };

        let handles = match self.resolver.resolve(record).await {
            Ok(handles) => handles,
            Err(SurgeError::NoResolvableSource(detail)) => {
                warn!(detail = %detail, "record resolved to nothing fetchable");
                return Ok(AggregatedResponse {
                    run: Some(RunInfo::from_record(record, &[])),
                    status: ResponseStatus::Degraded,
                    variables: Vec::new(),
                    sources: vec![SourceOutcome {
                        url: record.locations.join(","),
                        strategy: RetrievalStrategy::DirectUrl,
                        status: SourceStatus::Unavailable,
                        detail: Some(detail),
                    }],
                });
            }
            Err(other) => return Err(other),
        };

        if handles.is_empty() {
            // run is known but has produced no data yet
            return Ok(AggregatedResponse::not_ready(RunInfo::from_record(
                record, &[],
            )));
        }

        let handles = match params.lookback_days {
            Some(ndays) if ndays != 0 => {
                let ensemble = params.ensemble.as_deref().unwrap_or("nowcast");
                expand_handles(handles, ensemble, ndays)
            }
            _ => handles,
        };

        info!(sources = handles.len(), "fetching resolved sources");

        let fetches = self.fetch_all(&handles, params).await;

        Ok(assemble(record, &handles, fetches, &params.variables))
    }

    /// Fan out one fetch task per handle and wait for all of them or the
    /// overall deadline, whichever comes first. Outstanding tasks are
    /// aborted at the deadline, which closes their connections.
    async fn fetch_all(
        &self,
        handles: &[DataSourceHandle],
        params: &RequestParams,
    ) -> Vec<SurgeResult<Vec<VariableSlice>>> {
        let deadline = Instant::now() + self.config.request_deadline;

        let tasks: Vec<_> = handles
            .iter()
            .map(|handle| {
                let reader = Arc::clone(&self.reader);
                let handle = handle.clone();
                let window = params.window;
                let variables = request_variables(&params.variables, &handle);
                tokio::spawn(async move {
                    reader
                        .read_variables(&handle, window.as_ref(), &variables)
                        .await
                })
            })
            .collect();

        let mut results = Vec::with_capacity(tasks.len());
        let mut deadline_hit = false;

        for task in tasks {
            let abort = task.abort_handle();

            if deadline_hit {
                abort.abort();
                results.push(Err(SurgeError::Timeout));
                continue;
            }

            match timeout_at(deadline, task).await {
                Ok(Ok(result)) => results.push(result),
                Ok(Err(join_err)) => {
                    results.push(Err(SurgeError::InternalError(format!(
                        "fetch task failed: {}",
                        join_err
                    ))));
                }
                Err(_) => {
                    abort.abort();
                    deadline_hit = true;
                    results.push(Err(SurgeError::Timeout));
                }
            }
        }

        if deadline_hit {
            warn!("request deadline elapsed with sources outstanding");
        }

        results
    }
}

/// Walk each handle's URL back over sibling cycles, preserving handle
/// order with the oldest cycle first so later cycles win the merge.
fn expand_handles(
    handles: Vec<DataSourceHandle>,
    ensemble: &str,
    ndays: i64,
) -> Vec<DataSourceHandle> {
    let mut expanded: Vec<DataSourceHandle> = Vec::new();
    for handle in handles {
        for url in expand_lookback(&handle.url, ensemble, ndays) {
            if !expanded.iter().any(|h| h.url == url) {
                expanded.push(DataSourceHandle::new(handle.strategy, url));
            }
        }
    }
    expanded
}

/// Source-level names worth requesting from one handle.
fn request_variables(requested: &[String], handle: &DataSourceHandle) -> Vec<String> {
    if requested.is_empty() {
        return handle.variable_hint.iter().cloned().collect();
    }

    let mut names: Vec<String> = Vec::new();
    for canonical in requested {
        for name in source_names(canonical) {
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }
    names
}

/// Fold per-source outcomes into the final response.
fn assemble(
    record: &RunRecord,
    handles: &[DataSourceHandle],
    fetches: Vec<SurgeResult<Vec<VariableSlice>>>,
    requested: &[String],
) -> AggregatedResponse {
    let mut sources: Vec<SourceOutcome> = Vec::with_capacity(handles.len());
    let mut by_name: BTreeMap<String, Vec<VariableSlice>> = BTreeMap::new();
    let mut failed_hints: Vec<(String, SourceStatus)> = Vec::new();

    for (handle, fetch) in handles.iter().zip(fetches) {
        let (status, detail) = match fetch {
            Ok(slices) => {
                let mut dropped: Option<String> = None;
                for slice in slices {
                    match normalize(&slice) {
                        Ok(canonical) => {
                            by_name.entry(canonical.name.clone()).or_default().push(canonical);
                        }
                        Err(e) => {
                            // malformed slice: dropped with a flag, not fatal
                            warn!(url = %handle.url, error = %e, "slice dropped");
                            dropped = Some(e.to_string());
                        }
                    }
                }
                match dropped {
                    Some(detail) => (SourceStatus::FormatError, Some(detail)),
                    None => (SourceStatus::Ok, None),
                }
            }
            Err(e) => (SourceStatus::from_error(&e), Some(e.to_string())),
        };

        if !status.is_ok() {
            if let Some(hint) = &handle.variable_hint {
                failed_hints.push((crate::normalize::canonical_name(hint), status));
            }
        }

        sources.push(SourceOutcome {
            url: handle.url.clone(),
            strategy: handle.strategy,
            status,
            detail,
        });
    }

    let wanted = |name: &str| requested.is_empty() || requested.iter().any(|r| r == name);

    let mut variables: Vec<VariableEntry> = Vec::new();
    for (name, slices) in by_name {
        if !wanted(&name) {
            continue;
        }
        if let Some(merged) = merge_canonical(slices) {
            variables.push(to_entry(merged));
        }
    }

    // A failed source whose expected variable arrived from nowhere else
    // still shows up as an entry carrying the failure flag.
    for (name, status) in failed_hints {
        if !wanted(&name) || variables.iter().any(|v| v.name == name) {
            continue;
        }
        variables.push(VariableEntry {
            name,
            unit: String::new(),
            timestamps: Vec::new(),
            values: Vec::new(),
            source_status: status,
        });
    }
    variables.sort_by(|a, b| a.name.cmp(&b.name));

    let all_ok = sources.iter().all(|s| s.status.is_ok());
    let status = if all_ok {
        ResponseStatus::Ok
    } else {
        ResponseStatus::Degraded
    };

    AggregatedResponse {
        run: Some(RunInfo::from_record(record, handles)),
        status,
        variables,
        sources,
    }
}

/// Render a merged canonical slice as a response entry.
fn to_entry(slice: VariableSlice) -> VariableEntry {
    let encoding = TimeEncoding::canonical();
    let timestamps = slice.axes[0]
        .coords
        .iter()
        .filter_map(|offset| encoding.decode(*offset))
        .collect();

    VariableEntry {
        name: slice.name,
        unit: slice.unit,
        timestamps,
        values: slice.values,
        source_status: SourceStatus::Ok,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_variables_maps_canonical_back_to_source() {
        let handle = DataSourceHandle::new(
            RetrievalStrategy::Opendap,
            "https://tds.example.org/dodsC/x/nowcast/fort.63.nc",
        );
        let names = request_variables(&["water_level".to_string()], &handle);
        assert!(names.contains(&"water_level".to_string()));
        assert!(names.contains(&"zeta".to_string()));
    }

    #[test]
    fn test_request_variables_falls_back_to_hint() {
        let handle = DataSourceHandle::new(
            RetrievalStrategy::Opendap,
            "https://tds.example.org/dodsC/x/nowcast/fort.63.nc",
        );
        assert_eq!(request_variables(&[], &handle), vec!["zeta".to_string()]);

        let bare = DataSourceHandle::new(
            RetrievalStrategy::DirectUrl,
            "https://tds.example.org/files/maxele.63.nc",
        );
        assert!(request_variables(&[], &bare).is_empty());
    }
}
