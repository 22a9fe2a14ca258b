//! Run metadata catalog using PostgreSQL.
//!
//! The catalog schema is created and written by the external ingestion
//! pipeline; everything here is read-only.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool, Postgres, QueryBuilder};

use surge_common::time::TimeWindow;
use surge_common::{SurgeError, SurgeResult};

/// Processing status of a model run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Complete,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Complete => "complete",
            RunStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(RunStatus::Pending),
            "complete" => Some(RunStatus::Complete),
            "failed" => Some(RunStatus::Failed),
            _ => None,
        }
    }
}

/// One model run as recorded by the ingestion pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    /// Globally unique run identifier.
    pub run_id: String,
    /// Storm or grid label ("al09", "hsofs", ...).
    pub label: String,
    /// Advisory or model cycle timestamp.
    pub cycle_time: DateTime<Utc>,
    pub status: RunStatus,
    /// Storage location URIs; non-empty once status is Complete.
    pub locations: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

/// Filter criteria for catalog lookups.
#[derive(Debug, Clone, Default)]
pub struct RunQuery {
    pub run_id: Option<String>,
    pub label: Option<String>,
    pub window: Option<TimeWindow>,
    pub status: Option<RunStatus>,
    pub limit: Option<i64>,
}

impl RunQuery {
    pub fn by_run_id(run_id: impl Into<String>) -> Self {
        Self {
            run_id: Some(run_id.into()),
            ..Default::default()
        }
    }

    /// Reject contradictory criteria before touching the store.
    ///
    /// A `TimeWindow` is validated at construction, so the remaining
    /// contradictions are degenerate values that would otherwise produce
    /// confusing empty results.
    pub fn validate(&self) -> SurgeResult<()> {
        if let Some(run_id) = &self.run_id {
            if run_id.trim().is_empty() {
                return Err(SurgeError::InvalidFilter("empty run identifier".into()));
            }
        }
        if let Some(limit) = self.limit {
            if limit <= 0 {
                return Err(SurgeError::InvalidFilter(format!(
                    "non-positive limit: {}",
                    limit
                )));
            }
        }
        Ok(())
    }

    fn effective_limit(&self) -> i64 {
        self.limit.unwrap_or(100)
    }
}

/// Read access to the run catalog, as needed by the aggregation core.
///
/// A trait seam so the orchestration layer can be driven without a live
/// database.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Runs matching the filter, most recent cycle first.
    async fn find_runs(&self, query: &RunQuery) -> SurgeResult<Vec<RunRecord>>;
}

/// Database connection pool and catalog queries.
pub struct Catalog {
    pool: PgPool,
}

impl Catalog {
    /// Connect with a bounded acquire timeout so an unreachable store
    /// surfaces as `RepositoryUnavailable` instead of a stalled request.
    pub async fn connect(database_url: &str) -> SurgeResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await
            .map_err(|e| SurgeError::RepositoryUnavailable(format!("Connection failed: {}", e)))?;

        Ok(Self { pool })
    }

    /// Wrap an existing pool (shared across services).
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Look up a single run by its identifier.
    pub async fn find_by_run_id(&self, run_id: &str) -> SurgeResult<Option<RunRecord>> {
        let row = sqlx::query_as::<_, RunRow>(
            "SELECT run_id, label, cycle_time, status, locations, updated_at \
             FROM model_runs WHERE run_id = $1",
        )
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(row.map(RunRecord::from))
    }

    /// Distinct storm/grid labels, for the viewer pull-downs.
    pub async fn list_labels(&self) -> SurgeResult<Vec<String>> {
        let rows = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT label FROM model_runs ORDER BY label",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(rows)
    }
}

#[async_trait]
impl CatalogSource for Catalog {
    async fn find_runs(&self, query: &RunQuery) -> SurgeResult<Vec<RunRecord>> {
        query.validate()?;

        let mut builder = build_find_runs(query);
        let rows: Vec<RunRow> = builder
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_error)?;

        tracing::debug!(matches = rows.len(), "catalog query complete");

        Ok(rows.into_iter().map(RunRecord::from).collect())
    }
}

/// Assemble the filtered lookup, most recent cycle first.
fn build_find_runs(query: &RunQuery) -> QueryBuilder<'_, Postgres> {
    let mut builder = QueryBuilder::new(
        "SELECT run_id, label, cycle_time, status, locations, updated_at \
         FROM model_runs WHERE 1 = 1",
    );

    if let Some(run_id) = &query.run_id {
        builder.push(" AND run_id = ").push_bind(run_id);
    }
    if let Some(label) = &query.label {
        builder.push(" AND label = ").push_bind(label);
    }
    if let Some(window) = &query.window {
        builder.push(" AND cycle_time >= ").push_bind(window.start);
        builder.push(" AND cycle_time <= ").push_bind(window.end);
    }
    if let Some(status) = query.status {
        builder.push(" AND status = ").push_bind(status.as_str());
    }

    builder.push(" ORDER BY cycle_time DESC LIMIT ");
    builder.push_bind(query.effective_limit());

    builder
}

fn map_db_error(err: sqlx::Error) -> SurgeError {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            SurgeError::RepositoryUnavailable(err.to_string())
        }
        other => SurgeError::RepositoryUnavailable(format!("Query failed: {}", other)),
    }
}

/// Internal row type for database queries.
#[derive(FromRow)]
struct RunRow {
    run_id: String,
    label: String,
    cycle_time: DateTime<Utc>,
    status: String,
    locations: Vec<String>,
    updated_at: DateTime<Utc>,
}

impl From<RunRow> for RunRecord {
    fn from(row: RunRow) -> Self {
        // Unknown status strings written by newer ingesters read as
        // pending: the run exists but is not served from here yet.
        let status = RunStatus::parse(&row.status).unwrap_or(RunStatus::Pending);

        RunRecord {
            run_id: row.run_id,
            label: row.label,
            cycle_time: row.cycle_time,
            status,
            locations: row.locations,
            updated_at: row.updated_at,
        }
    }
}

/// Catalog schema, for reference. The table is created and maintained by
/// the ingestion pipeline, never from this crate.
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS model_runs (
    id UUID PRIMARY KEY,
    run_id VARCHAR(100) NOT NULL UNIQUE,
    label VARCHAR(100) NOT NULL,
    cycle_time TIMESTAMPTZ NOT NULL,
    status VARCHAR(20) NOT NULL DEFAULT 'pending',
    locations TEXT[] NOT NULL DEFAULT '{}',
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_model_runs_label ON model_runs(label);
CREATE INDEX IF NOT EXISTS idx_model_runs_cycle_time ON model_runs(cycle_time DESC);
CREATE INDEX IF NOT EXISTS idx_model_runs_status ON model_runs(status);
"#;
