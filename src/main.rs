//! Threat Aggregator
//!
//! Looks up an IP address across AbuseIPDB, VirusTotal, Feodo Tracker and
//! IPInfo, and serves a single scored threat report.

use std::fs::OpenOptions;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};
use url::Url;

mod aggregator;
mod api;
mod cache;
mod enrichment;
mod models;

use aggregator::{AggregatorConfig, ProviderEndpoints, ScoringPolicy, ThreatAggregator};
use api::{create_router, AppState};
use cache::ResponseCache;
use enrichment::feodo::FEODO_BLOCKLIST_URL;
use enrichment::RetryPolicy;

const CACHE_JANITOR_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
    Pretty,
}

/// Threat Aggregator
#[derive(Parser, Debug)]
#[command(name = "threat-aggregator")]
#[command(about = "Aggregate IP threat intelligence into a single scored report")]
struct Args {
    /// Server host
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    /// Server port
    #[arg(long, env = "PORT", default_value = "8000")]
    port: u16,

    /// AbuseIPDB API key
    #[arg(long, env = "ABUSEIPDB_API_KEY", hide_env_values = true)]
    abuseipdb_api_key: Option<String>,

    /// VirusTotal API key
    #[arg(long, env = "VIRUSTOTAL_API_KEY", hide_env_values = true)]
    virustotal_api_key: Option<String>,

    /// IPInfo API key
    #[arg(long, env = "IPINFO_API_KEY", hide_env_values = true)]
    ipinfo_api_key: Option<String>,

    /// Feodo Tracker blocklist location
    #[arg(long, env = "FEODO_BLOCKLIST_URL", default_value = FEODO_BLOCKLIST_URL)]
    feodo_blocklist_url: Url,

    /// Maximum number of cached provider results
    #[arg(long, env = "CACHE_CAPACITY", default_value = "100")]
    cache_capacity: usize,

    /// Lifetime of a cached provider result in seconds
    #[arg(long, env = "CACHE_TTL_SECS", default_value = "3600")]
    cache_ttl_secs: u64,

    /// Attempts per provider request (AbuseIPDB, VirusTotal, IPInfo)
    #[arg(long, env = "RETRY_ATTEMPTS", default_value = "3")]
    retry_attempts: u32,

    /// Seconds to wait between attempts
    #[arg(long, env = "RETRY_DELAY_SECS", default_value = "2")]
    retry_delay_secs: u64,

    /// Weight of the AbuseIPDB confidence score
    #[arg(long, env = "SCORE_ABUSEIPDB_WEIGHT", default_value = "0.5")]
    score_abuseipdb_weight: f64,

    /// Points per VirusTotal engine flagging the address
    #[arg(long, env = "SCORE_VIRUSTOTAL_WEIGHT", default_value = "10.0")]
    score_virustotal_weight: f64,

    /// Weight of the Feodo Tracker confidence level
    #[arg(long, env = "SCORE_FEODO_WEIGHT", default_value = "0.5")]
    score_feodo_weight: f64,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value = "text")]
    log_format: LogFormat,

    /// Also write logs to this file
    #[arg(long, env = "LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Expose Prometheus metrics on /metrics
    #[arg(long, env = "METRICS", default_value = "true", action = clap::ArgAction::Set)]
    metrics: bool,
}

fn init_tracing(format: LogFormat, log_file: Option<&PathBuf>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "threat_aggregator=info,tower_http=info".into());

    let stdout = match format {
        LogFormat::Text => fmt::layer().boxed(),
        LogFormat::Json => fmt::layer().json().boxed(),
        LogFormat::Pretty => fmt::layer().pretty().boxed(),
    };

    let file = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout)
        .with(file)
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Parse arguments
    let args = Args::parse();

    init_tracing(args.log_format, args.log_file.as_ref())?;

    tracing::info!("Starting Threat Aggregator");

    let metrics = if args.metrics {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("Failed to install Prometheus recorder")?;
        tracing::info!("Prometheus metrics enabled on /metrics");
        Some(handle)
    } else {
        None
    };

    let cache = Arc::new(ResponseCache::new(
        args.cache_capacity,
        Duration::from_secs(args.cache_ttl_secs),
    ));

    tracing::info!(
        capacity = cache.capacity(),
        ttl_secs = cache.ttl().as_secs(),
        "Response cache configured"
    );

    // Periodically drop expired cache entries
    let janitor_cache = cache.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CACHE_JANITOR_INTERVAL);
        loop {
            interval.tick().await;
            let removed = janitor_cache.purge_expired();
            if removed > 0 {
                tracing::debug!(removed, remaining = janitor_cache.len(), "Purged expired cache entries");
            }
        }
    });

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .context("Failed to create HTTP client")?;

    let config = AggregatorConfig {
        abuseipdb_api_key: args.abuseipdb_api_key,
        virustotal_api_key: args.virustotal_api_key,
        ipinfo_api_key: args.ipinfo_api_key,
        endpoints: ProviderEndpoints {
            feodo_blocklist: args.feodo_blocklist_url.to_string(),
            ..ProviderEndpoints::default()
        },
        retry: RetryPolicy::new(args.retry_attempts, Duration::from_secs(args.retry_delay_secs)),
        scoring: ScoringPolicy {
            abuseipdb_weight: args.score_abuseipdb_weight,
            virustotal_weight: args.score_virustotal_weight,
            feodo_weight: args.score_feodo_weight,
        },
    };

    let aggregator = ThreatAggregator::new(client, cache, config);
    for provider in aggregator.configured_providers() {
        tracing::info!(provider = %provider, "Provider enabled");
    }

    // Create application state
    let state = Arc::new(AppState {
        aggregator,
        metrics,
    });

    // Setup CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Create router
    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start server
    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    tracing::info!("Listening on http://{}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
