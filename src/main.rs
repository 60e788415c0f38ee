//! Demo service exporting HTTP SLI metrics.
//!
//! ```text
//!   request ─▶ diagnostics middleware ─▶ demo handler
//!                   │
//!                   ▼ lifecycle events ("sli.http.server")
//!             SourceRegistry ─▶ HttpMetricsObserver ─▶ PrometheusSink ─▶ GET /metrics
//! ```

use clap::Parser;
use std::path::PathBuf;
use tokio::net::TcpListener;

use sli_metrics::config::{load_config, AppConfig};
use sli_metrics::events::SourceRegistry;
use sli_metrics::http::diagnostics::SOURCE_NAME;
use sli_metrics::http::{HttpMetricsOptions, HttpServer};
use sli_metrics::lifecycle::{spawn_signal_handler, Shutdown};
use sli_metrics::observability::init_logging;
use sli_metrics::sink::PrometheusSink;
use sli_metrics::ObservabilityBuilder;

#[derive(Debug, Parser)]
#[command(name = "sli-metrics", version, about = "HTTP service exporting SLI metrics")]
struct Cli {
    /// Path to a TOML configuration file. Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => AppConfig::default(),
    };

    init_logging(&config.logging)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "sli-metrics starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        request_timeout_secs = config.listener.request_timeout_secs,
        duration_metric_type = ?config.metrics.duration_metric_type,
        "Configuration loaded"
    );

    let registry = SourceRegistry::new();
    let sink = PrometheusSink::new();
    for (key, value) in &config.metrics.global_labels {
        sink.add_global_label(key, value)?;
    }

    let host = ObservabilityBuilder::new(registry.clone())
        .add_http_metrics(HttpMetricsOptions::from_config(&config.metrics), &sink)?
        .build();
    host.start()?;

    let source = registry.create_source(SOURCE_NAME);
    let server = HttpServer::new(config.clone(), source, Some(sink.handle()));

    let shutdown = Shutdown::new();
    let signals = spawn_signal_handler(shutdown.clone());

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let result = server.run(listener, &shutdown).await;

    host.stop();
    signals.abort();

    result?;
    tracing::info!("Shutdown complete");
    Ok(())
}
