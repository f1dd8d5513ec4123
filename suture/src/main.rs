// Copyright 2026 The Suture Project
// SPDX-License-Identifier: Apache-2.0

use clap::Parser;
use suture::config;
use suture::engine;
use suture::proxy;

use std::net::SocketAddr;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "suture", about = "LLM reverse proxy that sutures truncated streams")]
struct Cli {
    /// Path to the suture.yaml config file
    #[arg(long, default_value = "suture.yaml", env = "SUTURE_CONFIG")]
    config: String,

    /// Port to listen on (overrides the config file)
    #[arg(long, env = "SUTURE_PORT")]
    port: Option<u16>,

    /// Address to bind
    #[arg(long, default_value = "127.0.0.1", env = "SUTURE_BIND")]
    bind: String,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .json()
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let source = config::FileSource {
        path: std::path::PathBuf::from(&cli.config),
    };
    let config = match config::load_config(&source) {
        Ok(c) => Arc::new(c),
        Err(e) => {
            tracing::error!("failed to load config: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(
        groups = config.groups.len(),
        contract_hash = %config.contract_hash,
        "config loaded"
    );

    let port = cli.port.or(config.server.port).unwrap_or(9800);
    let addr: SocketAddr = match format!("{}:{}", cli.bind, port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            tracing::error!("invalid bind address: {e}");
            std::process::exit(1);
        }
    };

    let service: Arc<dyn proxy::GatewayService> = Arc::new(engine::build_engine(config));
    let app = proxy::build_router(service);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind to address");

    tracing::info!(%addr, "suture listening");

    axum::serve(listener, app).await.expect("server error");
}
