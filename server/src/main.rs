//! Webhook front-end for the tag-mix game pipeline.
//!
//! Exposes `POST /webhook/run` to start a run (one at a time), `GET /status`
//! for the run lock and last result, and `GET /health`. The pipeline itself
//! is synchronous; runs execute on a blocking task while the server stays
//! responsive.

mod routes;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use pipeline::config::load_config;

use crate::state::AppState;

#[derive(Parser)]
#[command(name = "pipeline-server")]
#[command(about = "Webhook server for the tag-mix game pipeline")]
struct Args {
    /// Address to bind the server to
    #[arg(long, default_value = "127.0.0.1")]
    bind: String,

    /// Port to listen on
    #[arg(long, default_value = "3847")]
    port: u16,

    /// Path to the pipeline config file
    #[arg(long, default_value = "pipeline.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("pipeline_server=info".parse()?)
                .add_directive("pipeline=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let config = load_config(&args.config)?;
    let secret = std::env::var("WEBHOOK_SECRET").ok().filter(|s| !s.is_empty());
    if secret.is_none() {
        info!("WEBHOOK_SECRET not set, authentication disabled");
    }

    let state = AppState::new(config, secret);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = routes::router(state).layer(cors);

    let addr: SocketAddr = format!("{}:{}", args.bind, args.port).parse()?;
    info!(addr = %addr, "pipeline-server listening");
    info!("POST /webhook/run  - start a pipeline run");
    info!("GET  /status       - run state and last result");
    info!("GET  /health       - health check");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
