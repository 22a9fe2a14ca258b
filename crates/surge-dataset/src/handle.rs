//! Resolved data-source handles and storage-URI classification.

use serde::{Deserialize, Serialize};

/// How a handle's URL is to be retrieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RetrievalStrategy {
    DirectUrl,
    Opendap,
    Scraped,
}

/// A retrieval-ready reference to one variable-bearing remote file.
///
/// Ephemeral: produced per request by the resolver, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSourceHandle {
    pub strategy: RetrievalStrategy,
    pub url: String,
    /// Variable the file is expected to carry, guessed from its name.
    pub variable_hint: Option<String>,
}

impl DataSourceHandle {
    pub fn new(strategy: RetrievalStrategy, url: impl Into<String>) -> Self {
        let url = url.into();
        let variable_hint = variable_hint(&url);
        Self {
            strategy,
            url,
            variable_hint,
        }
    }
}

/// What a catalog storage URI points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationKind {
    /// A concrete file, retrievable with the given strategy.
    File(RetrievalStrategy),
    /// A browsable directory listing to scrape.
    Directory,
    /// Not recognizably either; skipped by the resolver.
    Unknown,
}

/// Classify a storage URI by scheme and suffix.
///
/// TDS DAP endpoints live under `/dodsC/`; plain `.nc` URLs are served
/// over HTTP; anything ending in `/` or in a `catalog.html` page is a
/// listing to scrape.
pub fn classify_location(uri: &str) -> LocationKind {
    if !uri.starts_with("http://") && !uri.starts_with("https://") {
        return LocationKind::Unknown;
    }

    if uri.ends_with('/') || uri.ends_with("catalog.html") {
        return LocationKind::Directory;
    }

    if uri.ends_with(".nc") {
        if uri.contains("/dodsC/") {
            return LocationKind::File(RetrievalStrategy::Opendap);
        }
        return LocationKind::File(RetrievalStrategy::DirectUrl);
    }

    LocationKind::Unknown
}

/// Mappings from URL nomenclature to the variable the file carries.
/// Callers may always override with an explicit variable list.
const VAR_MAPPER: &[(&str, &str)] = &[("fort", "zeta"), ("swan", "swan_HS")];

/// Guess the variable name carried by a file from its URL.
pub fn variable_hint(url: &str) -> Option<String> {
    let lower = url.to_ascii_lowercase();
    VAR_MAPPER
        .iter()
        .find(|(key, _)| lower.contains(key))
        .map(|(_, var)| (*var).to_string())
}

/// Extract the ensemble word from a storage URL.
///
/// TDS run URLs carry the ensemble (`nowcast`, `namforecast`, ...) in
/// the second-to-last path segment:
/// `.../2021052318/hsofs/.../hsofs-nam-bob-2021/nowcast/fort.63.nc`
pub fn ensemble_from_url(url: &str) -> Option<String> {
    let words: Vec<&str> = url.split('/').collect();
    if words.len() < 2 {
        return None;
    }
    let ensemble = words[words.len() - 2];
    if ensemble.is_empty() {
        return None;
    }
    Some(ensemble.to_string())
}
