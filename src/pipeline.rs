//! Pipeline orchestration
//!
//! One linear run: fetch sources, dedupe, probe, aggregate, publish. Any
//! stage can come up empty; that short-circuits the rest of the run with a
//! warning, never an error. Only startup configuration failures abort.

use crate::aggregate::ResultAggregator;
use crate::config::Config;
use crate::probe::ProbeOrchestrator;
use crate::publish::ArtifactPublisher;
use crate::subscription::{Deduplicator, SourceFetcher};
use crate::Result;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Counters for one completed run
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub fetched: usize,
    pub unique: usize,
    pub working: usize,
    pub compiled: usize,
    pub published: usize,
    pub elapsed: Duration,
}

pub struct Pipeline {
    config: Config,
    fetcher: SourceFetcher,
    orchestrator: ProbeOrchestrator,
    aggregator: ResultAggregator,
    publisher: ArtifactPublisher,
}

impl Pipeline {
    pub fn new(
        config: Config,
        fetcher: SourceFetcher,
        orchestrator: ProbeOrchestrator,
        aggregator: ResultAggregator,
        publisher: ArtifactPublisher,
    ) -> Self {
        Self {
            config,
            fetcher,
            orchestrator,
            aggregator,
            publisher,
        }
    }

    pub async fn run(&self) -> Result<RunSummary> {
        let started = Instant::now();
        let mut summary = RunSummary::default();

        info!(sources = self.config.sources.len(), "collecting subscription sources");
        let fetched = self.fetcher.fetch_all(&self.config.sources).await;
        summary.fetched = fetched.len();

        let unique = Deduplicator::dedupe(fetched);
        summary.unique = unique.len();
        info!(fetched = summary.fetched, unique = summary.unique, "collection finished");

        if unique.is_empty() {
            warn!("no descriptors survived collection, nothing to publish");
            summary.elapsed = started.elapsed();
            return Ok(summary);
        }

        let total = unique.len();
        let working = self
            .orchestrator
            .probe_all(unique, |report| {
                debug!(
                    endpoint = %report.descriptor,
                    working = report.is_working(),
                    "probe completed"
                );
            })
            .await;
        summary.working = working.len();

        if working.is_empty() {
            warn!(probed = total, "no endpoint passed probing, nothing to publish");
            summary.elapsed = started.elapsed();
            return Ok(summary);
        }

        let profiles = self.aggregator.compile(working).await;
        summary.compiled = profiles.len();

        if profiles.is_empty() {
            warn!("aggregation produced no profiles, nothing to publish");
            summary.elapsed = started.elapsed();
            return Ok(summary);
        }

        if self.config.dry_run {
            info!(profiles = summary.compiled, "dry run, skipping publication");
        } else {
            summary.published = self.publisher.publish_all(&profiles).await;
        }

        summary.elapsed = started.elapsed();
        info!(
            fetched = summary.fetched,
            unique = summary.unique,
            working = summary.working,
            published = summary.published,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "run finished"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::GeoResolver;
    use crate::probe::backend::ProbeBackend;
    use crate::publish::store::{RemoteStore, StoredFile};
    use crate::subscription::models::{CountryInfo, Descriptor, ProbeReport};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct ScriptedBackend {
        latencies: HashMap<String, u64>,
    }

    #[async_trait]
    impl ProbeBackend for ScriptedBackend {
        async fn probe(
            &self,
            descriptor: &Descriptor,
            _timeout: Duration,
            _test_url: &str,
        ) -> ProbeReport {
            match self.latencies.get(&descriptor.address) {
                Some(latency) => ProbeReport::working(descriptor.clone(), *latency),
                None => ProbeReport::failed(descriptor.clone(), "unreachable".to_string()),
            }
        }
    }

    struct FixedResolver;

    #[async_trait]
    impl GeoResolver for FixedResolver {
        async fn resolve(&self, _address: &str) -> crate::Result<CountryInfo> {
            Ok(CountryInfo::new("US"))
        }
    }

    /// Store that only counts calls
    struct CountingStore {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RemoteStore for CountingStore {
        async fn get(&self, _path: &str) -> crate::Result<Option<StoredFile>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        }

        async fn create(&self, _path: &str, _content: &str, _message: &str) -> crate::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn update(
            &self,
            _path: &str,
            _content: &str,
            _sha: &str,
            _message: &str,
        ) -> crate::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn pipeline_for(
        sources: Vec<String>,
        latencies: HashMap<String, u64>,
        store: Arc<CountingStore>,
    ) -> Pipeline {
        let config = Config {
            sources,
            ..Config::for_tests()
        };
        let fetcher = SourceFetcher::new(&config).unwrap();
        let orchestrator =
            ProbeOrchestrator::new(&config, Arc::new(ScriptedBackend { latencies }));
        let aggregator = ResultAggregator::new(Arc::new(FixedResolver));
        let publisher = ArtifactPublisher::new(&config, store);
        Pipeline::new(config, fetcher, orchestrator, aggregator, publisher)
    }

    #[tokio::test]
    async fn test_cross_source_duplicate_collapses() {
        let server = MockServer::start().await;
        let body_a = "trojan://pw@1.1.1.1:443?type=tcp#a\n\
                      trojan://pw@2.2.2.2:443?type=tcp#b\n\
                      trojan://pw@3.3.3.3:443?type=tcp#c";
        let body_b = "trojan://pw@2.2.2.2:443?type=tcp#b\n\
                      trojan://pw@4.4.4.4:443?type=tcp#d";
        Mock::given(method("GET"))
            .and(path("/a"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body_a))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/b"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body_b))
            .mount(&server)
            .await;

        let latencies = HashMap::from([
            ("1.1.1.1".to_string(), 50),
            ("2.2.2.2".to_string(), 60),
            ("3.3.3.3".to_string(), 70),
            ("4.4.4.4".to_string(), 80),
        ]);
        let store = Arc::new(CountingStore {
            calls: AtomicUsize::new(0),
        });
        let pipeline = pipeline_for(
            vec![format!("{}/a", server.uri()), format!("{}/b", server.uri())],
            latencies,
            store.clone(),
        );

        let summary = pipeline.run().await.unwrap();
        assert_eq!(summary.fetched, 5);
        assert_eq!(summary.unique, 4);
        assert_eq!(summary.working, 4);
        assert_eq!(summary.compiled, 4);
        assert_eq!(summary.published, 2);
    }

    #[tokio::test]
    async fn test_failed_probe_is_excluded_from_output() {
        let server = MockServer::start().await;
        let body = "trojan://pw@1.1.1.1:443?type=tcp#a\n\
                    trojan://pw@2.2.2.2:443?type=tcp#b";
        Mock::given(method("GET"))
            .and(path("/s"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let latencies = HashMap::from([("1.1.1.1".to_string(), 50)]);
        let store = Arc::new(CountingStore {
            calls: AtomicUsize::new(0),
        });
        let pipeline = pipeline_for(vec![format!("{}/s", server.uri())], latencies, store);

        let summary = pipeline.run().await.unwrap();
        assert_eq!(summary.unique, 2);
        assert_eq!(summary.working, 1);
        assert_eq!(summary.compiled, 1);
    }

    #[tokio::test]
    async fn test_empty_collection_skips_publishing_entirely() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/empty"))
            .respond_with(ResponseTemplate::new(200).set_body_string("nothing to see here"))
            .mount(&server)
            .await;

        let store = Arc::new(CountingStore {
            calls: AtomicUsize::new(0),
        });
        let pipeline = pipeline_for(
            vec![format!("{}/empty", server.uri())],
            HashMap::new(),
            store.clone(),
        );

        let summary = pipeline.run().await.unwrap();
        assert_eq!(summary.unique, 0);
        assert_eq!(summary.published, 0);
        // The remote store was never touched
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_all_probes_failing_skips_publishing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/s"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("trojan://pw@1.1.1.1:443?type=tcp#a"),
            )
            .mount(&server)
            .await;

        let store = Arc::new(CountingStore {
            calls: AtomicUsize::new(0),
        });
        let pipeline = pipeline_for(vec![format!("{}/s", server.uri())], HashMap::new(), store.clone());

        let summary = pipeline.run().await.unwrap();
        assert_eq!(summary.unique, 1);
        assert_eq!(summary.working, 0);
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dry_run_skips_publishing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/s"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("trojan://pw@1.1.1.1:443?type=tcp#a"),
            )
            .mount(&server)
            .await;

        let store = Arc::new(CountingStore {
            calls: AtomicUsize::new(0),
        });
        let config = Config {
            sources: vec![format!("{}/s", server.uri())],
            dry_run: true,
            ..Config::for_tests()
        };
        let fetcher = SourceFetcher::new(&config).unwrap();
        let orchestrator = ProbeOrchestrator::new(
            &config,
            Arc::new(ScriptedBackend {
                latencies: HashMap::from([("1.1.1.1".to_string(), 10)]),
            }),
        );
        let aggregator = ResultAggregator::new(Arc::new(FixedResolver));
        let publisher = ArtifactPublisher::new(&config, store.clone());
        let pipeline = Pipeline::new(config, fetcher, orchestrator, aggregator, publisher);

        let summary = pipeline.run().await.unwrap();
        assert_eq!(summary.compiled, 1);
        assert_eq!(summary.published, 0);
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }
}
