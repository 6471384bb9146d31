// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Queue/list RPC server core implementation.

use crate::config::ServerConfig;
use crate::engine::Engines;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub mod connection;
pub mod dispatcher;
pub mod protocol;

pub use connection::ClientConnection;
use protocol::Frame;

/// Queue/list RPC server: accepts TCP connections and drives each one
/// through the operation dispatcher concurrently with all others.
#[derive(Clone)]
pub struct QueueListServer {
    config: Arc<ServerConfig>,
    engines: Engines,
    shutdown: Arc<tokio::sync::Notify>,
    running: Arc<std::sync::atomic::AtomicBool>,
}

impl QueueListServer {
    /// Create a new server, opening both substrates.
    pub fn new(config: ServerConfig) -> Result<Self, ServerError> {
        config
            .validate()
            .map_err(|e| ServerError::Config(e.to_string()))?;

        let engines = Engines::open(&config.queue_file, &config.list_file)
            .map_err(|e| ServerError::Storage(e.to_string()))?;

        if let Some(registry) = &config.service_registry {
            info!("service registry configured at {} (dialing it is not implemented)", registry);
        }

        Ok(Self {
            config: Arc::new(config),
            engines,
            shutdown: Arc::new(tokio::sync::Notify::new()),
            running: Arc::new(std::sync::atomic::AtomicBool::new(false)),
        })
    }

    /// Run the server's accept loop until `shutdown` is called or `SIGINT`
    /// triggers it.
    pub async fn run(&self) -> Result<(), ServerError> {
        use std::sync::atomic::Ordering;
        use tokio::net::TcpListener;

        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ServerError::AlreadyRunning);
        }

        let addr = format!("{}:{}", self.config.bind_address, self.config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ServerError::Bind(e.to_string()))?;

        info!("queue/list server listening on {}", addr);

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            info!("new connection from {}", peer_addr);

                            let engines = self.engines.clone();
                            let config = self.config.clone();
                            let shutdown = self.shutdown.clone();

                            tokio::spawn(async move {
                                if let Err(e) =
                                    Self::handle_connection(stream, peer_addr, engines, config, shutdown).await
                                {
                                    warn!("connection error from {}: {}", peer_addr, e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("accept error: {}", e);
                        }
                    }
                }
                _ = self.shutdown.notified() => {
                    info!("shutdown signal received");
                    break;
                }
            }
        }

        if let Err(e) = self.engines.flush().await {
            warn!("failed to flush substrates on shutdown: {}", e);
        }

        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Handle one client connection: read frames in a loop, dispatch each
    /// request independently so several can be in flight at once, and write
    /// back a matching response or error frame.
    async fn handle_connection(
        stream: tokio::net::TcpStream,
        peer_addr: std::net::SocketAddr,
        engines: Engines,
        config: Arc<ServerConfig>,
        shutdown: Arc<tokio::sync::Notify>,
    ) -> Result<(), ServerError> {
        let mut conn = ClientConnection::new(stream, peer_addr, config.max_message_size);

        loop {
            tokio::select! {
                result = conn.read_frame() => {
                    match result {
                        Ok(Some(frame)) => {
                            Self::process_frame(&mut conn, frame, &engines).await?;
                        }
                        Ok(None) => {
                            info!("connection closed: {}", peer_addr);
                            break;
                        }
                        Err(e) => {
                            warn!("read error from {}: {}", peer_addr, e);
                            break;
                        }
                    }
                }
                _ = shutdown.notified() => {
                    debug!("connection handler shutting down: {}", peer_addr);
                    break;
                }
            }
        }

        Ok(())
    }

    /// Dispatch a single request frame and write back its response.
    async fn process_frame(
        conn: &mut ClientConnection,
        frame: Frame,
        engines: &Engines,
    ) -> Result<(), ServerError> {
        let Frame::Request { id, op, args } = frame else {
            debug!("ignoring non-request frame from client");
            return Ok(());
        };

        match dispatcher::dispatch(engines, &op, &args).await {
            Ok(result) => conn.send_frame(&Frame::response(id, result)).await?,
            Err(e) => {
                debug!("op {} failed: {}", op, e);
                conn.send_frame(&Frame::error(id, e.kind(), e.to_string())).await?
            }
        }

        Ok(())
    }

    /// Signal the server to shut down; in-flight connection handlers finish
    /// their current frame and then exit.
    pub async fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }

    /// Check if server is running.
    pub fn is_running(&self) -> bool {
        self.running.load(std::sync::atomic::Ordering::SeqCst)
    }
}

/// Server error types.
#[derive(Debug)]
pub enum ServerError {
    Config(String),
    Storage(String),
    Bind(String),
    AlreadyRunning,
    Io(String),
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(s) => write!(f, "configuration error: {}", s),
            Self::Storage(s) => write!(f, "storage error: {}", s),
            Self::Bind(s) => write!(f, "bind error: {}", s),
            Self::AlreadyRunning => write!(f, "server already running"),
            Self::Io(s) => write!(f, "I/O error: {}", s),
        }
    }
}

impl std::error::Error for ServerError {}

impl From<std::io::Error> for ServerError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<connection::ConnectionError> for ServerError {
    fn from(e: connection::ConnectionError) -> Self {
        Self::Io(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(dir: &tempfile::TempDir) -> ServerConfig {
        ServerConfig {
            bind_address: "127.0.0.1".parse().unwrap(),
            port: 17400,
            queue_file: dir.path().join("queue.db"),
            list_file: dir.path().join("list.db"),
            ..Default::default()
        }
    }

    #[test]
    fn new_opens_both_substrates() {
        let dir = tempfile::tempdir().unwrap();
        let server = QueueListServer::new(test_config(&dir)).unwrap();
        assert!(!server.is_running());
    }

    #[test]
    fn new_rejects_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(&dir);
        config.port = 0;
        let err = QueueListServer::new(config);
        assert!(err.is_err());
    }
}
