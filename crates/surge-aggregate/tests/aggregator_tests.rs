//! Scenario tests for the aggregation core, driven through stub
//! catalog/reader implementations so no database or network is needed.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use surge_aggregate::{AggregatedResponse, Aggregator, AggregatorConfig, RequestParams};
use surge_catalog::{CatalogSource, RunQuery, RunRecord, RunStatus};
use surge_common::time::TimeWindow;
use surge_common::{
    AxisCoords, ResponseStatus, SourceStatus, SurgeError, SurgeResult, VariableSlice,
};
use surge_dataset::{DataSourceHandle, DatasetReader, DirectoryLister, ListingEntry, Resolver};

// ============================================================================
// Stubs
// ============================================================================

struct StubCatalog {
    records: Vec<RunRecord>,
    unavailable: bool,
}

#[async_trait]
impl CatalogSource for StubCatalog {
    async fn find_runs(&self, _query: &RunQuery) -> SurgeResult<Vec<RunRecord>> {
        if self.unavailable {
            return Err(SurgeError::RepositoryUnavailable("connection refused".into()));
        }
        Ok(self.records.clone())
    }
}

struct NullLister;

#[async_trait]
impl DirectoryLister for NullLister {
    async fn list(&self, url: &str) -> SurgeResult<Vec<ListingEntry>> {
        Err(SurgeError::SourceUnreachable(url.to_string()))
    }
}

#[derive(Clone)]
enum Behavior {
    /// (source variable name, unit, values); time axis is hourly.
    Vars(Vec<(&'static str, &'static str, Vec<f64>)>),
    /// One variable with explicit (time offset secs, value) pairs.
    Series(&'static str, Vec<(f64, f64)>),
    Unreachable,
    Hang,
    Malformed,
}

struct StubReader {
    by_suffix: Vec<(&'static str, Behavior)>,
}

#[async_trait]
impl DatasetReader for StubReader {
    async fn read_variables(
        &self,
        handle: &DataSourceHandle,
        _window: Option<&TimeWindow>,
        variables: &[String],
    ) -> SurgeResult<Vec<VariableSlice>> {
        let behavior = self
            .by_suffix
            .iter()
            .find(|(fragment, _)| handle.url.contains(fragment))
            .map(|(_, b)| b.clone())
            .unwrap_or(Behavior::Unreachable);

        match behavior {
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(Vec::new())
            }
            Behavior::Unreachable => Err(SurgeError::SourceUnreachable(handle.url.clone())),
            Behavior::Malformed => Ok(vec![VariableSlice {
                name: "zeta".into(),
                unit: "m".into(),
                axes: vec![AxisCoords::with_unit(
                    "time",
                    "seconds since 2024-09-01 00:00:00",
                    vec![0.0, 3600.0],
                )],
                // one value too few for the declared axis
                values: vec![0.5],
            }]),
            Behavior::Vars(vars) => Ok(vars
                .into_iter()
                .filter(|(name, _, _)| variables.iter().any(|v| v == name))
                .map(|(name, unit, values)| hourly_slice(name, unit, values))
                .collect()),
            Behavior::Series(name, pairs) => {
                if !variables.iter().any(|v| v == name) {
                    return Ok(Vec::new());
                }
                let (coords, values): (Vec<f64>, Vec<f64>) = pairs.into_iter().unzip();
                Ok(vec![VariableSlice {
                    name: name.to_string(),
                    unit: "m".to_string(),
                    axes: vec![AxisCoords::with_unit(
                        "time",
                        "seconds since 2024-09-01 00:00:00",
                        coords,
                    )],
                    values,
                }])
            }
        }
    }
}

fn hourly_slice(name: &str, unit: &str, values: Vec<f64>) -> VariableSlice {
    let coords: Vec<f64> = (0..values.len()).map(|i| (i as f64) * 3600.0).collect();
    VariableSlice {
        name: name.to_string(),
        unit: unit.to_string(),
        axes: vec![
            AxisCoords::with_unit("time", "seconds since 2024-09-01 00:00:00", coords),
            AxisCoords::new("dim1", vec![0.0]),
        ],
        values,
    }
}

fn record(status: RunStatus, locations: Vec<&str>) -> RunRecord {
    RunRecord {
        run_id: "ABC123".into(),
        label: "hsofs".into(),
        cycle_time: Utc.with_ymd_and_hms(2024, 9, 1, 6, 0, 0).unwrap(),
        status,
        locations: locations.into_iter().map(String::from).collect(),
        updated_at: Utc.with_ymd_and_hms(2024, 9, 1, 7, 0, 0).unwrap(),
    }
}

fn aggregator(
    records: Vec<RunRecord>,
    unavailable: bool,
    reader: StubReader,
    deadline: Duration,
) -> Aggregator {
    Aggregator::new(
        Arc::new(StubCatalog {
            records,
            unavailable,
        }),
        Resolver::new(Arc::new(NullLister)),
        Arc::new(reader),
        AggregatorConfig {
            request_deadline: deadline,
        },
    )
}

fn params(run_id: &str, variables: &[&str]) -> RequestParams {
    RequestParams {
        query: RunQuery::by_run_id(run_id),
        variables: variables.iter().map(|v| v.to_string()).collect(),
        ..Default::default()
    }
}

async fn fetch(agg: &Aggregator, params: &RequestParams) -> AggregatedResponse {
    agg.fetch(params).await.expect("request should not abort")
}

const FORT_URL: &str =
    "https://tds.renci.org/thredds/dodsC/2024/nam/2024090106/hsofs/ht/inst/nowcast/fort.63.nc";
const SWAN_URL: &str =
    "https://tds.renci.org/thredds/dodsC/2024/nam/2024090106/hsofs/ht/inst/nowcast/swan_HS.63.nc";

// ============================================================================
// Fatal vs empty outcomes
// ============================================================================

#[tokio::test]
async fn test_no_matching_runs_is_not_found_not_an_error() {
    let agg = aggregator(
        vec![],
        false,
        StubReader { by_suffix: vec![] },
        Duration::from_secs(5),
    );
    let response = fetch(&agg, &params("NOPE", &[])).await;

    assert_eq!(response.status, ResponseStatus::NotFound);
    assert!(response.run.is_none());
    assert!(response.variables.is_empty());
}

#[tokio::test]
async fn test_repository_unavailable_propagates() {
    let agg = aggregator(
        vec![],
        true,
        StubReader { by_suffix: vec![] },
        Duration::from_secs(5),
    );
    let err = agg.fetch(&params("ABC123", &[])).await.unwrap_err();
    assert!(matches!(err, SurgeError::RepositoryUnavailable(_)));
}

#[tokio::test]
async fn test_invalid_filter_propagates() {
    let agg = aggregator(
        vec![],
        false,
        StubReader { by_suffix: vec![] },
        Duration::from_secs(5),
    );
    let bad = RequestParams {
        query: RunQuery {
            limit: Some(-3),
            ..Default::default()
        },
        ..Default::default()
    };
    let err = agg.fetch(&bad).await.unwrap_err();
    assert!(matches!(err, SurgeError::InvalidFilter(_)));
}

#[tokio::test]
async fn test_pending_run_without_locations_is_not_ready() {
    let agg = aggregator(
        vec![record(RunStatus::Pending, vec![])],
        false,
        StubReader { by_suffix: vec![] },
        Duration::from_secs(5),
    );
    let response = fetch(&agg, &params("ABC123", &[])).await;

    // distinct from "run does not exist"
    assert_eq!(response.status, ResponseStatus::NotReady);
    let run = response.run.expect("run metadata should be echoed");
    assert_eq!(run.run_id, "ABC123");
    assert_eq!(run.status, RunStatus::Pending);
}

// ============================================================================
// Happy path
// ============================================================================

#[tokio::test]
async fn test_single_source_ok() {
    let reader = StubReader {
        by_suffix: vec![(
            "fort.63.nc",
            Behavior::Vars(vec![("zeta", "m", vec![0.4, 0.6, 0.5])]),
        )],
    };
    let agg = aggregator(
        vec![record(RunStatus::Complete, vec![FORT_URL])],
        false,
        reader,
        Duration::from_secs(5),
    );

    let response = fetch(&agg, &params("ABC123", &["water_level"])).await;

    assert_eq!(response.status, ResponseStatus::Ok);
    assert_eq!(response.variables.len(), 1);

    let entry = &response.variables[0];
    assert_eq!(entry.name, "water_level");
    assert_eq!(entry.unit, "m");
    assert_eq!(entry.source_status, SourceStatus::Ok);
    assert_eq!(entry.values, vec![0.4, 0.6, 0.5]);

    // ascending UTC timestamps
    assert_eq!(
        entry.timestamps.first().copied(),
        Some(Utc.with_ymd_and_hms(2024, 9, 1, 0, 0, 0).unwrap())
    );
    assert!(entry.timestamps.windows(2).all(|w| w[0] < w[1]));

    assert_eq!(response.sources.len(), 1);
    assert_eq!(response.sources[0].status, SourceStatus::Ok);

    let run = response.run.unwrap();
    assert_eq!(run.ensemble.as_deref(), Some("nowcast"));
}

#[tokio::test]
async fn test_variables_ordered_by_canonical_name() {
    let reader = StubReader {
        by_suffix: vec![
            (
                "swan_HS.63.nc",
                Behavior::Vars(vec![("swan_HS", "m", vec![1.1, 1.3])]),
            ),
            (
                "fort.63.nc",
                Behavior::Vars(vec![("zeta", "m", vec![0.4, 0.6])]),
            ),
        ],
    };
    // swan listed first; output ordering must not follow handle order
    let agg = aggregator(
        vec![record(RunStatus::Complete, vec![SWAN_URL, FORT_URL])],
        false,
        reader,
        Duration::from_secs(5),
    );

    let response = fetch(&agg, &params("ABC123", &["water_level", "wave_height"])).await;

    assert_eq!(response.status, ResponseStatus::Ok);
    let names: Vec<&str> = response.variables.iter().map(|v| v.name.as_str()).collect();
    assert_eq!(names, vec!["water_level", "wave_height"]);
}

// ============================================================================
// Partial failure
// ============================================================================

#[tokio::test]
async fn test_one_of_two_sources_failing_degrades() {
    let reader = StubReader {
        by_suffix: vec![
            (
                "fort.63.nc",
                Behavior::Vars(vec![("zeta", "m", vec![0.4, 0.6])]),
            ),
            ("swan_HS.63.nc", Behavior::Unreachable),
        ],
    };
    let agg = aggregator(
        vec![record(RunStatus::Complete, vec![FORT_URL, SWAN_URL])],
        false,
        reader,
        Duration::from_secs(5),
    );

    let response = fetch(&agg, &params("ABC123", &["water_level", "wave_height"])).await;

    assert_eq!(response.status, ResponseStatus::Degraded);

    // N-1 successful entries plus one flagged with the failure reason
    assert_eq!(response.variables.len(), 2);
    let ok = response
        .variables
        .iter()
        .find(|v| v.name == "water_level")
        .unwrap();
    assert_eq!(ok.source_status, SourceStatus::Ok);
    assert!(!ok.values.is_empty());

    let failed = response
        .variables
        .iter()
        .find(|v| v.name == "wave_height")
        .unwrap();
    assert_eq!(failed.source_status, SourceStatus::Unavailable);
    assert!(failed.values.is_empty());

    let bad_source = response
        .sources
        .iter()
        .find(|s| s.url.ends_with("swan_HS.63.nc"))
        .unwrap();
    assert_eq!(bad_source.status, SourceStatus::Unavailable);
    assert!(bad_source.detail.is_some());
}

#[tokio::test]
async fn test_malformed_slice_dropped_and_flagged() {
    let reader = StubReader {
        by_suffix: vec![("fort.63.nc", Behavior::Malformed)],
    };
    let agg = aggregator(
        vec![record(RunStatus::Complete, vec![FORT_URL])],
        false,
        reader,
        Duration::from_secs(5),
    );

    let response = fetch(&agg, &params("ABC123", &["water_level"])).await;

    assert_eq!(response.status, ResponseStatus::Degraded);
    assert_eq!(response.sources[0].status, SourceStatus::FormatError);
    // the malformed slice itself does not surface as data
    assert!(response.variables.iter().all(|v| v.values.is_empty()));
}

// ============================================================================
// Cycle walk-back
// ============================================================================

#[tokio::test]
async fn test_lookback_merges_cycles_keeping_later_values() {
    // the 00Z and 06Z nowcast cycles overlap at 01:00; the later
    // cycle's value must win in the merged series
    let reader = StubReader {
        by_suffix: vec![
            (
                "/2024090100/",
                Behavior::Series("zeta", vec![(0.0, 0.1), (3600.0, 0.2)]),
            ),
            (
                "/2024090106/",
                Behavior::Series("zeta", vec![(3600.0, 0.9), (7200.0, 0.3)]),
            ),
            ("fort.63.nc", Behavior::Series("zeta", vec![])),
        ],
    };
    let agg = aggregator(
        vec![record(RunStatus::Complete, vec![FORT_URL])],
        false,
        reader,
        Duration::from_secs(5),
    );

    let mut request = params("ABC123", &["water_level"]);
    request.lookback_days = Some(-1);

    let response = fetch(&agg, &request).await;

    assert_eq!(response.status, ResponseStatus::Ok);
    // five 6-hourly cycles resolved for a one-day walk-back
    assert_eq!(response.sources.len(), 5);
    assert!(response
        .sources
        .iter()
        .all(|s| s.url.contains("/nowcast/")));

    let entry = response
        .variables
        .iter()
        .find(|v| v.name == "water_level")
        .unwrap();
    assert_eq!(entry.values, vec![0.1, 0.9, 0.3]);
    assert!(entry.timestamps.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test]
async fn test_excessive_lookback_is_invalid_filter() {
    let agg = aggregator(
        vec![],
        false,
        StubReader { by_suffix: vec![] },
        Duration::from_secs(5),
    );
    let mut request = params("ABC123", &[]);
    request.lookback_days = Some(-365);

    let err = agg.fetch(&request).await.unwrap_err();
    assert!(matches!(err, SurgeError::InvalidFilter(_)));
}

// ============================================================================
// Deadline
// ============================================================================

#[tokio::test]
async fn test_hanging_source_is_bounded_by_deadline() {
    let reader = StubReader {
        by_suffix: vec![
            (
                "fort.63.nc",
                Behavior::Vars(vec![("zeta", "m", vec![0.4, 0.6])]),
            ),
            ("swan_HS.63.nc", Behavior::Hang),
        ],
    };
    let agg = aggregator(
        vec![record(RunStatus::Complete, vec![FORT_URL, SWAN_URL])],
        false,
        reader,
        Duration::from_millis(200),
    );

    let started = std::time::Instant::now();
    let response = fetch(&agg, &params("ABC123", &["water_level", "wave_height"])).await;
    let elapsed = started.elapsed();

    // bounded by deadline plus a small epsilon, not by the hang
    assert!(
        elapsed < Duration::from_secs(5),
        "request took {:?}",
        elapsed
    );

    assert_eq!(response.status, ResponseStatus::Degraded);
    let hung = response
        .sources
        .iter()
        .find(|s| s.url.ends_with("swan_HS.63.nc"))
        .unwrap();
    assert_eq!(hung.status, SourceStatus::TimedOut);

    // the healthy source still delivered
    let ok = response
        .variables
        .iter()
        .find(|v| v.name == "water_level")
        .unwrap();
    assert_eq!(ok.values, vec![0.4, 0.6]);
}

#[tokio::test]
async fn test_every_source_hanging_still_returns() {
    let reader = StubReader {
        by_suffix: vec![
            ("fort.63.nc", Behavior::Hang),
            ("swan_HS.63.nc", Behavior::Hang),
        ],
    };
    let agg = aggregator(
        vec![record(RunStatus::Complete, vec![FORT_URL, SWAN_URL])],
        false,
        reader,
        Duration::from_millis(200),
    );

    let response = fetch(&agg, &params("ABC123", &[])).await;

    assert_eq!(response.status, ResponseStatus::Degraded);
    assert!(response
        .sources
        .iter()
        .all(|s| s.status == SourceStatus::TimedOut));
}
