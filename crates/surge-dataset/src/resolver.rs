//! Dataset resolution: catalog record to retrieval-ready handles.

use std::sync::Arc;

use regex::Regex;
use tracing::{debug, instrument, warn};

use surge_catalog::RunRecord;
use surge_common::{SurgeError, SurgeResult};

use crate::handle::{classify_location, DataSourceHandle, LocationKind, RetrievalStrategy};
use crate::listing::DirectoryLister;

/// Filename filter applied to scraped listings: the variable-bearing
/// model outputs (`fort.63.nc`, `swan_HS.63.nc`, ...). Confirm against
/// the catalog's naming convention before widening.
pub const DEFAULT_FILE_PATTERN: &str = r"^(fort|swan_[A-Za-z0-9]+)\.\d+\.nc$";

/// Produces `DataSourceHandle`s for a catalog record, scraping listing
/// pages where the record only names a directory.
pub struct Resolver {
    lister: Arc<dyn DirectoryLister>,
    file_pattern: Regex,
}

impl Resolver {
    pub fn new(lister: Arc<dyn DirectoryLister>) -> Self {
        Self {
            lister,
            // the default pattern is a valid regex
            file_pattern: Regex::new(DEFAULT_FILE_PATTERN).unwrap(),
        }
    }

    pub fn with_pattern(lister: Arc<dyn DirectoryLister>, pattern: Regex) -> Self {
        Self {
            lister,
            file_pattern: pattern,
        }
    }

    /// Resolve one record into handles, one per discoverable
    /// variable-bearing file.
    ///
    /// A record with no storage locations (not yet ready) resolves to
    /// zero handles. A record whose locations yield nothing fetchable
    /// fails with `NoResolvableSource`; the aggregator degrades rather
    /// than aborts on that.
    #[instrument(skip(self, record), fields(run_id = %record.run_id))]
    pub async fn resolve(&self, record: &RunRecord) -> SurgeResult<Vec<DataSourceHandle>> {
        if record.locations.is_empty() {
            debug!("record has no storage locations yet");
            return Ok(Vec::new());
        }

        let mut handles: Vec<DataSourceHandle> = Vec::new();

        for uri in &record.locations {
            match classify_location(uri) {
                LocationKind::File(strategy) => {
                    push_unique(&mut handles, DataSourceHandle::new(strategy, uri.clone()));
                }
                LocationKind::Directory => match self.scrape(uri).await {
                    Ok(scraped) => {
                        for handle in scraped {
                            push_unique(&mut handles, handle);
                        }
                    }
                    Err(e) => {
                        // one unreachable listing must not sink the
                        // record's other locations
                        warn!(uri = %uri, error = %e, "listing scrape failed");
                    }
                },
                LocationKind::Unknown => {
                    debug!(uri = %uri, "unrecognized storage location, skipping");
                }
            }
        }

        if handles.is_empty() {
            return Err(SurgeError::NoResolvableSource(format!(
                "run {}: {} storage location(s), none fetchable",
                record.run_id,
                record.locations.len()
            )));
        }

        Ok(handles)
    }

    /// Enumerate a listing page and keep the files matching the
    /// documented pattern, in lexicographic filename order.
    async fn scrape(&self, uri: &str) -> SurgeResult<Vec<DataSourceHandle>> {
        let entries = self.lister.list(uri).await?;

        let mut matches: Vec<_> = entries
            .into_iter()
            .filter(|e| self.file_pattern.is_match(&e.name))
            .collect();
        matches.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(matches
            .into_iter()
            .map(|e| DataSourceHandle::new(RetrievalStrategy::Scraped, e.url))
            .collect())
    }
}

fn push_unique(handles: &mut Vec<DataSourceHandle>, handle: DataSourceHandle) {
    if !handles.iter().any(|h| h.url == handle.url) {
        handles.push(handle);
    }
}
