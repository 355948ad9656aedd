//! HTTP server assembly for the journal gateway.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::Router;
use tokio::signal;

use super::config::{build_rustls_config, GatewayConfig};
use super::handlers::{
    handle_browse, handle_entries, handle_fields, handle_machine, handle_metrics, handle_not_found,
    handle_root, AppState,
};
use super::metrics::Metrics;
use super::middleware::{MetricsLayer, TracingLayer};
use crate::error::{Error, Result};
use crate::journal::JournalOpener;
use crate::machine::MachineProbe;

/// HTTP server exposing the journal.
pub struct GatewayServer {
    opener: Arc<dyn JournalOpener>,
    probe: Arc<dyn MachineProbe>,
    config: GatewayConfig,
}

impl GatewayServer {
    /// Create a new gateway server.
    pub fn new(
        opener: Arc<dyn JournalOpener>,
        probe: Arc<dyn MachineProbe>,
        config: GatewayConfig,
    ) -> Self {
        Self {
            opener,
            probe,
            config,
        }
    }

    /// Assembles the router over the given state.
    pub fn router(state: AppState) -> Router {
        let metrics = state.metrics.clone();
        Router::new()
            .route("/", get(handle_root))
            .route("/entries", get(handle_entries))
            .route("/fields/{field}", get(handle_fields))
            .route("/browse", get(handle_browse))
            .route("/machine", get(handle_machine))
            .route("/metrics", get(handle_metrics))
            .fallback(handle_not_found)
            .layer(TracingLayer::new())
            .layer(MetricsLayer::new(metrics))
            .with_state(state)
    }

    /// Run the HTTP server until shutdown.
    pub async fn run(self) -> Result<()> {
        let state = AppState {
            opener: self.opener,
            probe: self.probe,
            metrics: Arc::new(Metrics::new()),
            document_root: self.config.document_root.clone(),
        };
        let app = Self::router(state);

        let listener = listen_socket(self.config.port)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        match &self.config.tls {
            Some(paths) => {
                let tls = build_rustls_config(paths)?;
                let tls = axum_server::tls_rustls::RustlsConfig::from_config(Arc::new(tls));
                tracing::info!("starting journal gateway on {local_addr} (tls)");

                let handle = axum_server::Handle::new();
                tokio::spawn({
                    let handle = handle.clone();
                    async move {
                        shutdown_signal().await;
                        handle.graceful_shutdown(Some(Duration::from_secs(5)));
                    }
                });
                axum_server::from_tcp_rustls(listener, tls)
                    .handle(handle)
                    .serve(app.into_make_service())
                    .await?;
            }
            None => {
                let listener = tokio::net::TcpListener::from_std(listener)?;
                tracing::info!("starting journal gateway on {local_addr}");

                axum::serve(listener, app)
                    .with_graceful_shutdown(shutdown_signal())
                    .await?;
            }
        }

        tracing::info!("server shut down gracefully");
        Ok(())
    }
}

/// Adopts a socket passed by the service manager, or binds the default
/// listen address.
fn listen_socket(port: u16) -> Result<std::net::TcpListener> {
    if let Some(listener) = activation_socket()? {
        tracing::info!("adopting listen socket from the service manager");
        return Ok(listener);
    }
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    Ok(std::net::TcpListener::bind(addr)?)
}

/// Checks the service-manager activation protocol: when exactly one file
/// descriptor is passed to this process, it is adopted as the listen
/// socket; more than one is an error.
fn activation_socket() -> Result<Option<std::net::TcpListener>> {
    let Ok(listen_fds) = std::env::var("LISTEN_FDS") else {
        return Ok(None);
    };
    if let Ok(listen_pid) = std::env::var("LISTEN_PID") {
        if listen_pid.trim() != std::process::id().to_string() {
            return Ok(None);
        }
    }
    let count: u32 = listen_fds
        .trim()
        .parse()
        .map_err(|_| Error::InvalidInput(format!("bad LISTEN_FDS value: {listen_fds:?}")))?;
    match count {
        0 => Ok(None),
        1 => Ok(Some(adopt_fd())),
        _ => Err(Error::InvalidInput(
            "cannot listen on more than one socket".into(),
        )),
    }
}

#[cfg(unix)]
fn adopt_fd() -> std::net::TcpListener {
    use std::os::unix::io::FromRawFd;

    // The activation protocol passes the first socket as fd 3.
    const LISTEN_FDS_START: i32 = 3;
    unsafe { std::net::TcpListener::from_raw_fd(LISTEN_FDS_START) }
}

#[cfg(not(unix))]
fn adopt_fd() -> std::net::TcpListener {
    unreachable!("socket activation is only supported on unix")
}

/// Listen for SIGTERM (service manager stop) and SIGINT (Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received SIGINT, starting graceful shutdown"),
        _ = terminate => tracing::info!("received SIGTERM, starting graceful shutdown"),
    }
}
