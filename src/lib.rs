//! Subfresh - Subscription Aggregator and Verifier
//!
//! Collects proxy endpoint descriptors from published subscription sources,
//! verifies which endpoints are actually reachable, ranks the survivors by
//! country and latency, and republishes two derived subscription artifacts
//! to a versioned remote store. Runs as a periodic batch job.

pub mod aggregate;
pub mod config;
pub mod geo;
pub mod pipeline;
pub mod probe;
pub mod publish;
pub mod subscription;

pub use aggregate::ResultAggregator;
pub use config::{Config, StoreConfig};
pub use pipeline::{Pipeline, RunSummary};
pub use probe::{CommandProbeBackend, ProbeOrchestrator};
pub use publish::{ArtifactPublisher, GithubStore};
pub use subscription::{
    CompiledProfile, CountryInfo, Deduplicator, Descriptor, ProbeReport, ProbeStatus,
    ProfileDecoder, Protocol, SourceFetcher,
};

/// Application result type
pub type Result<T> = anyhow::Result<T>;
