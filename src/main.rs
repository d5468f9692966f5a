use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use subfresh::config::{DEFAULT_GEO_ENDPOINT, DEFAULT_TEST_URL};
use subfresh::geo::HttpGeoResolver;
use subfresh::{
    ArtifactPublisher, CommandProbeBackend, Config, GithubStore, Pipeline, ProbeOrchestrator,
    ResultAggregator, SourceFetcher, StoreConfig,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Collects proxy subscription sources, verifies endpoints, republishes
/// ranked subscriptions
#[derive(Parser)]
#[command(name = "subfresh")]
#[command(about = "Aggregate, verify, and republish proxy subscriptions")]
struct Cli {
    /// Subscription source URLs, newline/comma/semicolon separated
    #[arg(long, env = "SUBFRESH_SOURCES")]
    sources: String,

    /// Maximum concurrent source fetches
    #[arg(long, env = "SUBFRESH_FETCH_CONCURRENCY", default_value_t = 5)]
    fetch_concurrency: usize,

    /// Maximum concurrent probes
    #[arg(long, env = "SUBFRESH_PROBE_CONCURRENCY", default_value_t = 10)]
    probe_concurrency: usize,

    /// Per-source download timeout in seconds
    #[arg(long, env = "SUBFRESH_DOWNLOAD_TIMEOUT", default_value_t = 8)]
    download_timeout: u64,

    /// Per-probe timeout in seconds
    #[arg(long, env = "SUBFRESH_PROBE_TIMEOUT", default_value_t = 10)]
    probe_timeout: u64,

    /// URL every candidate proxy must reach
    #[arg(long, env = "SUBFRESH_TEST_URL", default_value = DEFAULT_TEST_URL)]
    test_url: String,

    /// External tester binary invoked once per probe
    #[arg(long, env = "SUBFRESH_TESTER", default_value = "proxy-probe")]
    tester: PathBuf,

    /// Geolocation endpoint answering JSON with a countryCode field
    #[arg(long, env = "SUBFRESH_GEO_ENDPOINT", default_value = DEFAULT_GEO_ENDPOINT)]
    geo_endpoint: String,

    /// Remote store repository owner
    #[arg(long, env = "SUBFRESH_GITHUB_OWNER")]
    github_owner: String,

    /// Remote store repository name
    #[arg(long, env = "SUBFRESH_GITHUB_REPO")]
    github_repo: String,

    /// Remote store branch
    #[arg(long, env = "SUBFRESH_GITHUB_BRANCH", default_value = "main")]
    github_branch: String,

    /// Remote store credential
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    github_token: String,

    /// Remote store API base URL
    #[arg(
        long,
        env = "SUBFRESH_GITHUB_API",
        default_value = "https://api.github.com"
    )]
    github_api: String,

    /// Destination path of the plain-text artifact
    #[arg(long, env = "SUBFRESH_PLAIN_PATH")]
    plain_path: String,

    /// Destination path of the structured artifact
    #[arg(long, env = "SUBFRESH_SINGBOX_PATH")]
    singbox_path: String,

    /// Run the pipeline but skip publication
    #[arg(long)]
    dry_run: bool,
}

impl Cli {
    fn into_config(self) -> Result<Config> {
        Ok(Config {
            sources: Config::parse_sources(&self.sources)?,
            fetch_concurrency: self.fetch_concurrency,
            probe_concurrency: self.probe_concurrency,
            download_timeout: Duration::from_secs(self.download_timeout),
            probe_timeout: Duration::from_secs(self.probe_timeout),
            test_url: self.test_url,
            tester_path: self.tester,
            geo_endpoint: self.geo_endpoint,
            store: StoreConfig {
                owner: self.github_owner,
                repo: self.github_repo,
                branch: self.github_branch,
                token: self.github_token,
                api_base: self.github_api,
            },
            plain_artifact_path: self.plain_path,
            singbox_artifact_path: self.singbox_path,
            dry_run: self.dry_run,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Cli::parse().into_config()?;

    let fetcher = SourceFetcher::new(&config)?;
    let backend = Arc::new(CommandProbeBackend::new(config.tester_path.clone()));
    let orchestrator = ProbeOrchestrator::new(&config, backend);
    let aggregator = ResultAggregator::new(Arc::new(HttpGeoResolver::new(&config)?));
    let publisher = ArtifactPublisher::new(&config, Arc::new(GithubStore::new(&config)?));

    let pipeline = Pipeline::new(config, fetcher, orchestrator, aggregator, publisher);
    let summary = pipeline.run().await?;

    info!(
        unique = summary.unique,
        working = summary.working,
        published = summary.published,
        "subfresh run complete"
    );
    Ok(())
}
