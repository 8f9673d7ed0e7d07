use std::error::Error;

use axum::http::{header, HeaderValue};
use axum::routing::get;
use clap::Parser;
use common::config::{BackendConfig, Config};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::api::{router, AppState};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to config file
    #[arg(short, long, default_value = "target/debug/config/total_config.yaml")]
    pub config: String,
}

/// Parses arguments, loads the config and sets up tracing.
///
/// `RUST_LOG` wins over `backend.log_level` when set.
pub fn initialize_executable() -> Result<Config, Box<dyn Error + Send + Sync>> {
    let args = Args::parse();
    let config = Config::load(&args.config)?;

    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.backend.log_level))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!(
        config = %args.config,
        project = %config.common.project_name,
        "Configuration loaded"
    );
    Ok(config)
}

pub fn install_metrics() -> Result<PrometheusHandle, Box<dyn Error + Send + Sync>> {
    Ok(PrometheusBuilder::new().install_recorder()?)
}

fn cors_layer(origin: &str) -> Result<CorsLayer, Box<dyn Error + Send + Sync>> {
    let allow_origin = if origin == "*" {
        AllowOrigin::any()
    } else {
        AllowOrigin::exact(origin.parse::<HeaderValue>()?)
    };
    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]))
}

pub async fn run_backend(
    config: BackendConfig,
    state: AppState,
    metrics: PrometheusHandle,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let app = router(state)
        .route("/metrics", get(move || std::future::ready(metrics.render())))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config.cors_origin)?);

    tracing::info!("Starting backend service at {}", config.server_address);
    let listener = tokio::net::TcpListener::bind(&config.server_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cors_origin_parsing() {
        assert!(cors_layer("*").is_ok());
        assert!(cors_layer("http://localhost:3000").is_ok());
        assert!(cors_layer("bad\norigin").is_err());
    }
}
