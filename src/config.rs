//! Run configuration
//!
//! One immutable `Config` value is built at startup and passed by reference
//! into every component constructor. Invalid configuration is the only
//! fatal error class in the whole program.

use crate::Result;
use anyhow::ensure;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::PathBuf;
use std::time::Duration;

/// Endpoint every probe must reach through the candidate proxy
pub const DEFAULT_TEST_URL: &str = "https://www.gstatic.com/generate_204";

/// Default geolocation endpoint; `{endpoint}/{address}` must answer JSON
/// with a `countryCode` field
pub const DEFAULT_GEO_ENDPOINT: &str = "http://ip-api.com/json";

/// Source lists come newline-, comma-, or semicolon-separated
static SOURCE_SEPARATORS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[\r\n,;]+").expect("invalid source separator regex")
});

/// Remote store coordinates and credential
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub owner: String,
    pub repo: String,
    pub branch: String,
    pub token: String,
    /// API base URL, overridable for tests
    pub api_base: String,
}

/// Immutable configuration for one pipeline run
#[derive(Debug, Clone)]
pub struct Config {
    pub sources: Vec<String>,
    pub fetch_concurrency: usize,
    pub probe_concurrency: usize,
    pub download_timeout: Duration,
    pub probe_timeout: Duration,
    pub test_url: String,
    /// External tester binary invoked once per probe
    pub tester_path: PathBuf,
    pub geo_endpoint: String,
    pub store: StoreConfig,
    /// Destination path of the plain-text artifact
    pub plain_artifact_path: String,
    /// Destination path of the structured artifact
    pub singbox_artifact_path: String,
    pub dry_run: bool,
}

impl Config {
    /// Split a raw source setting into trimmed, non-empty URLs.
    /// At least one source is required.
    pub fn parse_sources(raw: &str) -> Result<Vec<String>> {
        let sources: Vec<String> = SOURCE_SEPARATORS
            .split(raw)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        ensure!(
            !sources.is_empty(),
            "no subscription sources configured after parsing the source list"
        );
        Ok(sources)
    }

    #[cfg(test)]
    pub(crate) fn for_tests() -> Self {
        Self {
            sources: Vec::new(),
            fetch_concurrency: 5,
            probe_concurrency: 10,
            download_timeout: Duration::from_secs(8),
            probe_timeout: Duration::from_secs(10),
            test_url: DEFAULT_TEST_URL.to_string(),
            tester_path: PathBuf::from("proxy-probe"),
            geo_endpoint: DEFAULT_GEO_ENDPOINT.to_string(),
            store: StoreConfig {
                owner: "owner".to_string(),
                repo: "repo".to_string(),
                branch: "main".to_string(),
                token: "token".to_string(),
                api_base: "http://127.0.0.1:1".to_string(),
            },
            plain_artifact_path: "subs/plain.txt".to_string(),
            singbox_artifact_path: "subs/singbox.json".to_string(),
            dry_run: false,
        }
    }
}
