//! wx-api server entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use clap::Parser;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use wx_api::config::Config;
use wx_api::handlers;
use wx_api::state::AppState;

#[derive(Parser, Debug)]
#[command(name = "wx-api")]
#[command(about = "Point-forecast HTTP surface over the weather-store core")]
struct Args {
    /// Listen address, overriding the config default.
    #[arg(short, long, env = "WX_LISTEN_ADDR")]
    listen: Option<String>,

    /// Log level.
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    log_level: String,
}

fn main() {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    fmt().with_env_filter(filter).with_target(true).with_level(true).json().init();

    let mut config = Config::from_env();
    if let Some(listen) = args.listen {
        config.listen_addr = listen;
    }
    if let Err(reason) = config.validate() {
        tracing::error!("invalid configuration: {reason}");
        std::process::exit(1);
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.worker_threads)
        .enable_all()
        .build()
        .expect("failed to create Tokio runtime");

    runtime.block_on(async move { run_server(config).await });
}

async fn run_server(config: Config) {
    info!("starting wx-api server");

    let listen_addr = config.listen_addr.clone();
    let state = match AppState::new(config) {
        Ok(state) => Arc::new(state),
        Err(e) => {
            tracing::error!("failed to initialize application state: {e}");
            std::process::exit(1);
        }
    };

    let app = Router::new()
        .route("/health", get(handlers::health::health_handler))
        .route("/:model", get(handlers::query::query_handler))
        .layer(Extension(state))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = listen_addr.parse().expect("invalid listen address");
    info!("wx-api listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await.expect("failed to bind");
    axum::serve(listener, app).await.expect("server failed");
}
