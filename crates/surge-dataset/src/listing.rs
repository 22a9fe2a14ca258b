//! Directory-listing scrape for data servers without catalog entries.
//!
//! Some data servers expose only a browsable HTML index of run files.
//! The lister pulls that page and extracts the anchor entries; the
//! resolver decides which of them are worth fetching. Third-party page
//! structure is volatile, so this stays behind the `DirectoryLister`
//! capability trait and can be swapped without touching the aggregator.

use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;

use surge_common::{SurgeError, SurgeResult};

/// One entry scraped from a listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    /// Bare entry name (file or subdirectory, no path).
    pub name: String,
    /// Absolute URL of the entry.
    pub url: String,
}

/// Capability to enumerate the entries of a remote directory.
#[async_trait]
pub trait DirectoryLister: Send + Sync {
    async fn list(&self, url: &str) -> SurgeResult<Vec<ListingEntry>>;
}

/// Lister for Apache/TDS style HTML index pages.
pub struct HtmlDirectoryLister {
    client: reqwest::Client,
}

impl HtmlDirectoryLister {
    pub fn new(connect_timeout: Duration, read_timeout: Duration) -> SurgeResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(read_timeout)
            .build()
            .map_err(|e| SurgeError::InternalError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl DirectoryLister for HtmlDirectoryLister {
    async fn list(&self, url: &str) -> SurgeResult<Vec<ListingEntry>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| SurgeError::SourceUnreachable(format!("{}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(SurgeError::SourceUnreachable(format!(
                "{}: HTTP {}",
                url,
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| SurgeError::SourceUnreachable(format!("{}: {}", url, e)))?;

        let mut entries = parse_listing(url, &body);
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        tracing::debug!(url = %url, entries = entries.len(), "scraped directory listing");

        Ok(entries)
    }
}

/// Extract entry links from a listing page body.
///
/// Matches the anchor rows both Apache `mod_autoindex` and THREDDS
/// catalog pages emit:
/// `<tr><td><a href="fort.63.nc">fort.63.nc</a></td>...`
/// Parent links, absolute paths to elsewhere and query links are
/// skipped.
pub fn parse_listing(base_url: &str, body: &str) -> Vec<ListingEntry> {
    let re = Regex::new(r#"<a\s+[^>]*href="([^"?]+)"[^>]*>"#).unwrap();
    let base = base_url.trim_end_matches("catalog.html");
    let base = base.strip_suffix('/').unwrap_or(base);

    let mut entries = Vec::new();
    for cap in re.captures_iter(body) {
        let href = &cap[1];

        // navigation and cross-site links are not directory entries
        if href.starts_with("..") || href.starts_with('/') || href.contains("://") {
            continue;
        }

        let name = href.trim_end_matches('/').to_string();
        if name.is_empty() {
            continue;
        }

        entries.push(ListingEntry {
            url: format!("{}/{}", base, href),
            name,
        });
    }
    entries
}
