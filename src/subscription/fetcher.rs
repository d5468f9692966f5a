//! Subscription source fetching
//!
//! Fetches every configured source with bounded concurrency and runs the
//! decoder over each successful response. A failing source contributes zero
//! descriptors and never blocks the others.

use crate::config::Config;
use crate::subscription::decoder::ProfileDecoder;
use crate::subscription::models::Descriptor;
use crate::Result;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use tracing::{debug, warn};

const USER_AGENT: &str = concat!("subfresh/", env!("CARGO_PKG_VERSION"));

/// Outcome of fetching a single source
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub source: String,
    pub descriptors: Vec<Descriptor>,
    pub error: Option<String>,
}

impl FetchOutcome {
    pub fn success(source: String, descriptors: Vec<Descriptor>) -> Self {
        Self {
            source,
            descriptors,
            error: None,
        }
    }

    pub fn failure(source: String, error: String) -> Self {
        Self {
            source,
            descriptors: Vec::new(),
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Fetches raw subscription text from each configured source URL
pub struct SourceFetcher {
    client: Client,
    concurrency: usize,
}

impl SourceFetcher {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.download_timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            concurrency: config.fetch_concurrency.max(1),
        })
    }

    /// Fetch and decode every source, at most `fetch_concurrency` in flight.
    /// Returns the union of all decoded descriptors, not yet deduplicated.
    pub async fn fetch_all(&self, sources: &[String]) -> Vec<Descriptor> {
        let outcomes: Vec<FetchOutcome> = stream::iter(sources.iter().cloned())
            .map(|source| self.fetch_source(source))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut descriptors = Vec::new();
        for outcome in outcomes {
            match &outcome.error {
                Some(error) => {
                    warn!(source = %outcome.source, %error, "source fetch failed");
                }
                None => {
                    debug!(
                        source = %outcome.source,
                        count = outcome.descriptors.len(),
                        "source fetched"
                    );
                    descriptors.extend(outcome.descriptors);
                }
            }
        }
        descriptors
    }

    async fn fetch_source(&self, source: String) -> FetchOutcome {
        match self.fetch_text(&source).await {
            Ok(text) => {
                let descriptors = ProfileDecoder::decode(&text, &source);
                FetchOutcome::success(source, descriptors)
            }
            Err(error) => FetchOutcome::failure(source, error.to_string()),
        }
    }

    async fn fetch_text(&self, source: &str) -> Result<String> {
        let response = self.client.get(source).send().await?.error_for_status()?;
        Ok(response.text().await?)
    }
}
