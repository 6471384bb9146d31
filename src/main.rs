// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Persistent queue/list service
//!
//! A process-embedded queue and list store exposed over a length-prefixed
//! JSON RPC protocol on a duplex TCP socket. State survives restarts: one
//! `sled` file backs all queues, a second backs all lists.
//!
//! # Usage
//!
//! ```bash
//! # Start server on default port (7400)
//! persist-queue-service
//!
//! # Custom port and config
//! persist-queue-service --port 7410 --config server.json
//! ```

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use persist_queue_service::config::ServerConfig;
use persist_queue_service::server::QueueListServer;

/// Persistent queue/list service - durable FIFO queues and cursor lists over RPC.
#[derive(Parser, Debug)]
#[command(name = "persist-queue-service")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TCP port to listen on
    #[arg(short, long, default_value = "7400")]
    port: u16,

    /// Bind address (0.0.0.0 for all interfaces)
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    /// Configuration file (JSON format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to the sled file backing all queue containers
    #[arg(long, default_value = "queue.db")]
    queue_db: PathBuf,

    /// Path to the sled file backing all list containers
    #[arg(long, default_value = "list.db")]
    list_db: PathBuf,

    /// Address of an upstream service registry (stored and logged only)
    #[arg(long)]
    service_registry: Option<String>,

    /// Maximum accepted message size, in bytes
    #[arg(long, default_value = "16777216")]
    max_message_size: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let config = if let Some(config_path) = args.config {
        info!("loading config from {:?}", config_path);
        ServerConfig::from_file(&config_path)?
    } else {
        ServerConfig {
            bind_address: args.bind.parse()?,
            port: args.port,
            queue_file: args.queue_db,
            list_file: args.list_db,
            service_registry: args.service_registry,
            max_message_size: args.max_message_size,
            ..Default::default()
        }
    };

    let addr: SocketAddr = format!("{}:{}", config.bind_address, config.port).parse()?;

    info!("+----------------------------------------------------+");
    info!(
        "|  persist-queue-service v{}                     |",
        env!("CARGO_PKG_VERSION")
    );
    info!("+----------------------------------------------------+");
    info!("|  Bind:   {:40} |", addr);
    info!("|  Queues: {:40} |", config.queue_file.display());
    info!("|  Lists:  {:40} |", config.list_file.display());
    info!("+----------------------------------------------------+");

    let server = QueueListServer::new(config)?;

    let server_handle = server.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown signal received, stopping server...");
        server_handle.shutdown().await;
    });

    server.run().await?;

    info!("queue/list server stopped");
    Ok(())
}
