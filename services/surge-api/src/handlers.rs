//! HTTP handlers: catalog listing and aggregated run data.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;

use surge_aggregate::RequestParams;
use surge_catalog::{CatalogSource, RunQuery, RunStatus};
use surge_common::time::{parse_iso8601, TimeWindow};
use surge_common::SurgeError;

use crate::state::AppState;

/// GET /health
pub async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "surge-api",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Query parameters for the catalog listing.
#[derive(Debug, Default, Deserialize)]
pub struct RunsQueryParams {
    /// Storm or grid label filter.
    pub label: Option<String>,
    /// Window start, ISO 8601.
    pub start: Option<String>,
    /// Window end, ISO 8601.
    pub end: Option<String>,
    /// Processing status filter: pending | complete | failed.
    pub status: Option<String>,
    /// Maximum records returned.
    pub limit: Option<i64>,
}

/// GET /runs
pub async fn list_runs(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<RunsQueryParams>,
) -> Response {
    let query = match runs_query(&params) {
        Ok(query) => query,
        Err(e) => return error_response(&e),
    };

    match state.catalog.find_runs(&query).await {
        Ok(records) => Json(json!({ "runs": records })).into_response(),
        Err(e) => error_response(&e),
    }
}

/// Query parameters for the aggregated data endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct DataQueryParams {
    /// Comma-separated canonical variable names; empty means all the
    /// run's sources carry.
    pub variables: Option<String>,
    /// Window start, ISO 8601.
    pub start: Option<String>,
    /// Window end, ISO 8601.
    pub end: Option<String>,
    /// Days to walk back over sibling cycles (negative = back).
    pub ndays: Option<i64>,
    /// Ensemble substituted into walked-back URLs.
    pub ensemble: Option<String>,
}

/// GET /runs/:run_id/data
pub async fn run_data(
    Extension(state): Extension<Arc<AppState>>,
    Path(run_id): Path<String>,
    Query(params): Query<DataQueryParams>,
) -> Response {
    let window = match parse_window(params.start.as_deref(), params.end.as_deref()) {
        Ok(window) => window,
        Err(e) => return error_response(&e),
    };

    let request = RequestParams {
        query: RunQuery::by_run_id(run_id),
        variables: split_variables(params.variables.as_deref()),
        window,
        lookback_days: params.ndays,
        ensemble: params.ensemble.clone(),
    };

    match state.aggregator.fetch(&request).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => error_response(&e),
    }
}

fn runs_query(params: &RunsQueryParams) -> Result<RunQuery, SurgeError> {
    let status = match params.status.as_deref() {
        None => None,
        Some(s) => Some(RunStatus::parse(s).ok_or_else(|| {
            SurgeError::InvalidFilter(format!("unknown status: '{}'", s))
        })?),
    };

    Ok(RunQuery {
        run_id: None,
        label: params.label.clone(),
        window: parse_window(params.start.as_deref(), params.end.as_deref())?,
        status,
        limit: params.limit,
    })
}

fn parse_window(start: Option<&str>, end: Option<&str>) -> Result<Option<TimeWindow>, SurgeError> {
    let (Some(start), Some(end)) = (start, end) else {
        if start.is_some() || end.is_some() {
            return Err(SurgeError::InvalidFilter(
                "start and end must be given together".into(),
            ));
        }
        return Ok(None);
    };

    let start = parse_iso8601(start).map_err(|e| SurgeError::InvalidFilter(e.to_string()))?;
    let end = parse_iso8601(end).map_err(|e| SurgeError::InvalidFilter(e.to_string()))?;

    TimeWindow::new(start, end)
        .map(Some)
        .map_err(|e| SurgeError::InvalidFilter(e.to_string()))
}

fn split_variables(variables: Option<&str>) -> Vec<String> {
    variables
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

fn error_response(err: &SurgeError) -> Response {
    let status = StatusCode::from_u16(err.http_status_code())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(json!({"error": err.to_string()}))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_variables() {
        assert_eq!(
            split_variables(Some("water_level, wave_height")),
            vec!["water_level".to_string(), "wave_height".to_string()]
        );
        assert!(split_variables(Some("")).is_empty());
        assert!(split_variables(None).is_empty());
    }

    #[test]
    fn test_parse_window_requires_both_bounds() {
        assert!(parse_window(Some("2024-09-01"), None).is_err());
        assert!(parse_window(None, None).unwrap().is_none());
        assert!(parse_window(Some("2024-09-01"), Some("2024-09-03"))
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_parse_window_rejects_inverted() {
        let err = parse_window(Some("2024-09-03"), Some("2024-09-01")).unwrap_err();
        assert!(matches!(err, SurgeError::InvalidFilter(_)));
    }

    #[test]
    fn test_runs_query_rejects_unknown_status() {
        let params = RunsQueryParams {
            status: Some("archived".into()),
            ..Default::default()
        };
        assert!(matches!(
            runs_query(&params),
            Err(SurgeError::InvalidFilter(_))
        ));
    }

    #[test]
    fn test_runs_query_passes_filters_through() {
        let params = RunsQueryParams {
            label: Some("hsofs".into()),
            status: Some("complete".into()),
            limit: Some(10),
            ..Default::default()
        };
        let query = runs_query(&params).unwrap();
        assert_eq!(query.label.as_deref(), Some("hsofs"));
        assert_eq!(query.status, Some(RunStatus::Complete));
        assert_eq!(query.limit, Some(10));
    }
}
