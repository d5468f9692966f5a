//! Probe backend seam
//!
//! The protocol-level liveness test lives in an external tester process.
//! This module only knows its request/response contract: hand it one
//! descriptor URI, a timeout, and the test target, and get back a verdict.

use crate::subscription::models::{Descriptor, ProbeReport};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Extra headroom over the per-probe timeout before the tester process
/// itself is considered hung.
const PROCESS_GRACE: Duration = Duration::from_secs(2);

/// One liveness check through a candidate proxy
#[async_trait]
pub trait ProbeBackend: Send + Sync {
    /// Never returns an error: every internal failure becomes a report with
    /// a failure status.
    async fn probe(&self, descriptor: &Descriptor, timeout: Duration, test_url: &str)
        -> ProbeReport;
}

/// Verdict line printed by the tester on stdout
#[derive(Debug, Deserialize)]
struct Verdict {
    success: bool,
    #[serde(default)]
    latency_ms: Option<u64>,
    #[serde(default)]
    error: Option<String>,
}

/// Backend that spawns the configured tester binary once per probe
pub struct CommandProbeBackend {
    program: PathBuf,
}

impl CommandProbeBackend {
    pub fn new(program: PathBuf) -> Self {
        Self { program }
    }

    async fn run_tester(
        &self,
        descriptor: &Descriptor,
        timeout: Duration,
        test_url: &str,
    ) -> std::result::Result<Verdict, String> {
        let output = Command::new(&self.program)
            .arg("--uri")
            .arg(descriptor.to_uri())
            .arg("--target")
            .arg(test_url)
            .arg("--timeout-ms")
            .arg(timeout.as_millis().to_string())
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output();

        let output = tokio::time::timeout(timeout + PROCESS_GRACE, output)
            .await
            .map_err(|_| "tester process timed out".to_string())?
            .map_err(|e| format!("failed to start tester: {e}"))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let line = stdout
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .ok_or_else(|| "tester produced no output".to_string())?;
        serde_json::from_str(line.trim()).map_err(|e| format!("unreadable tester verdict: {e}"))
    }
}

#[async_trait]
impl ProbeBackend for CommandProbeBackend {
    async fn probe(
        &self,
        descriptor: &Descriptor,
        timeout: Duration,
        test_url: &str,
    ) -> ProbeReport {
        match self.run_tester(descriptor, timeout, test_url).await {
            Ok(verdict) if verdict.success => match verdict.latency_ms {
                Some(latency) => ProbeReport::working(descriptor.clone(), latency),
                None => ProbeReport::failed(
                    descriptor.clone(),
                    "tester reported success without a latency".to_string(),
                ),
            },
            Ok(verdict) => {
                let reason = verdict.error.unwrap_or_else(|| "unspecified failure".to_string());
                if reason.contains("timeout") {
                    ProbeReport::timeout(descriptor.clone())
                } else {
                    ProbeReport::failed(descriptor.clone(), reason)
                }
            }
            Err(error) => {
                debug!(endpoint = %descriptor, %error, "probe backend error");
                ProbeReport::failed(descriptor.clone(), error)
            }
        }
    }
}
