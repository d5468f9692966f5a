//! Probe orchestration
//!
//! Drives the backend over the unique descriptor set with bounded worker
//! concurrency. Results surface incrementally through a callback; only the
//! working ones are kept.

use crate::config::Config;
use crate::probe::backend::ProbeBackend;
use crate::subscription::models::{Descriptor, ProbeReport};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info};

pub struct ProbeOrchestrator {
    backend: Arc<dyn ProbeBackend>,
    concurrency: usize,
    timeout: Duration,
    test_url: String,
}

impl ProbeOrchestrator {
    pub fn new(config: &Config, backend: Arc<dyn ProbeBackend>) -> Self {
        Self {
            backend,
            concurrency: config.probe_concurrency.max(1),
            timeout: config.probe_timeout,
            test_url: config.test_url.clone(),
        }
    }

    /// Probe every descriptor, at most `probe_concurrency` in flight.
    /// `on_report` fires once per completed probe, in completion order.
    /// Returns only the working reports; failures are logged and dropped.
    pub async fn probe_all<F>(&self, descriptors: Vec<Descriptor>, mut on_report: F) -> Vec<ProbeReport>
    where
        F: FnMut(&ProbeReport),
    {
        let total = descriptors.len();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));

        let mut reports = stream::iter(descriptors)
            .map(|descriptor| {
                let semaphore = Arc::clone(&semaphore);
                let backend = Arc::clone(&self.backend);
                let timeout = self.timeout;
                let test_url = self.test_url.clone();
                async move {
                    match semaphore.acquire().await {
                        Ok(_permit) => backend.probe(&descriptor, timeout, &test_url).await,
                        // Closed semaphore means the pool is gone; degrade to
                        // a failed report instead of aborting the run.
                        Err(_) => ProbeReport::failed(descriptor, "probe pool closed".to_string()),
                    }
                }
            })
            .buffer_unordered(self.concurrency);

        let mut working = Vec::new();
        while let Some(report) = reports.next().await {
            on_report(&report);
            if report.is_working() {
                working.push(report);
            } else if let Some(error) = report.error() {
                debug!(endpoint = %report.descriptor, error, "probe failed");
            }
        }

        info!(total, working = working.len(), "probing finished");
        working
    }
}
