//! Server — start the mock endpoint in-process and hand back a handle.

use axum::http::StatusCode;
use std::net::SocketAddr;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::error::ListenerError;
use crate::routes::build_router;
use crate::state::ListenerState;

/// A running mock listener.
///
/// Dropping the handle does not stop the server; call [`ListenerHandle::shutdown`].
pub struct ListenerHandle {
    local_addr: SocketAddr,
    advertise_host: String,
    state: ListenerState,
    shutdown_tx: tokio::sync::watch::Sender<bool>,
    task: JoinHandle<Result<(), std::io::Error>>,
}

pub struct MockListener;

impl MockListener {
    /// Bind `config.bind_address` and serve until shutdown.
    pub async fn start(config: &ServerConfig) -> Result<ListenerHandle, ListenerError> {
        let addr: SocketAddr = config
            .bind_address
            .parse()
            .map_err(|_| ListenerError::InvalidAddress(config.bind_address.clone()))?;

        let default_status =
            StatusCode::from_u16(config.default_status).unwrap_or(StatusCode::OK);
        let state = ListenerState::new(default_status);
        let app = build_router(state.clone(), config);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|source| ListenerError::Bind {
                addr: config.bind_address.clone(),
                source,
            })?;
        let local_addr = listener.local_addr().map_err(|source| ListenerError::Bind {
            addr: config.bind_address.clone(),
            source,
        })?;

        let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(false);
        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    while shutdown_rx.changed().await.is_ok() {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                })
                .await
        });

        info!(
            "Mock listener on {} (advertised as {}:{})",
            local_addr,
            config.advertise_host,
            local_addr.port()
        );

        Ok(ListenerHandle {
            local_addr,
            advertise_host: config.advertise_host.clone(),
            state,
            shutdown_tx,
            task,
        })
    }
}

impl ListenerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// `(host, port)` the log driver should ship to.
    pub fn address(&self) -> (String, u16) {
        (self.advertise_host.clone(), self.local_addr.port())
    }

    /// Ingestion URL handed to the driver as `logzio-url`.
    pub fn url(&self) -> String {
        let (host, port) = self.address();
        format!("http://{}:{}", host, port)
    }

    pub fn state(&self) -> &ListenerState {
        &self.state
    }

    /// Stop accepting connections and wait for in-flight requests to finish.
    pub async fn shutdown(self) -> Result<(), ListenerError> {
        let _ = self.shutdown_tx.send(true);
        match self.task.await {
            Ok(Ok(())) => {
                info!("Mock listener stopped");
                Ok(())
            }
            Ok(Err(e)) => Err(ListenerError::Server(e.to_string())),
            Err(e) => {
                warn!("Mock listener task panicked or was cancelled: {}", e);
                Err(ListenerError::Server(e.to_string()))
            }
        }
    }
}
