//! Prometheus scrape endpoint for a single ingestion run.
//!
//! A run is short-lived, so the endpoint only lives as long as the run:
//! [`init`] binds the listener before installing the recorder (a taken port
//! fails the run at startup), and [`MetricsServer::shutdown`] stops serving
//! once the run is over.

use axum::Router;
use axum::extract::State;
use axum::routing::get;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use snafu::prelude::*;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::error::{MetricsBindSnafu, MetricsError, PrometheusInitSnafu};

/// Handle to the running scrape endpoint.
#[derive(Debug)]
pub struct MetricsServer {
    handle: PrometheusHandle,
    local_addr: SocketAddr,
    task: JoinHandle<()>,
}

/// Bind `addr`, install the Prometheus recorder and serve `/metrics` and
/// `/health` in the background.
pub async fn init(addr: SocketAddr) -> Result<MetricsServer, MetricsError> {
    let listener = TcpListener::bind(addr)
        .await
        .context(MetricsBindSnafu { addr })?;
    let local_addr = listener.local_addr().context(MetricsBindSnafu { addr })?;

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context(PrometheusInitSnafu)?;

    let app = Router::new()
        .route("/metrics", get(render))
        .route("/health", get(|| async { "ok\n" }))
        .with_state(handle.clone());

    let task = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(MetricsServer {
        handle,
        local_addr,
        task,
    })
}

async fn render(State(handle): State<PrometheusHandle>) -> String {
    handle.render()
}

impl MetricsServer {
    /// Address the endpoint is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Current metrics in Prometheus text format.
    pub fn snapshot(&self) -> String {
        self.handle.render()
    }

    /// Stop serving and return the final snapshot.
    pub fn shutdown(self) -> String {
        let snapshot = self.snapshot();
        self.task.abort();
        debug!("Metrics endpoint on {} stopped", self.local_addr);
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emit;
    use crate::metrics::events::FilesDiscovered;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    async fn fetch(addr: SocketAddr, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    // The recorder is process-global, so this is the only test that installs it
    #[tokio::test]
    async fn test_serves_run_metrics_until_shutdown() {
        let server = init("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let addr = server.local_addr();

        emit!(FilesDiscovered {
            count: 3,
            target: "balanzas".to_string(),
        });

        let health = fetch(addr, "/health").await;
        assert!(health.starts_with("HTTP/1.1 200"));

        let metrics = fetch(addr, "/metrics").await;
        assert!(metrics.starts_with("HTTP/1.1 200"));
        assert!(metrics.contains("balanzas"));

        let last = server.shutdown();
        assert!(last.contains("balanzas"));
    }

    #[tokio::test]
    async fn test_taken_port_fails_before_installing_recorder() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let err = init(taken.local_addr().unwrap()).await.unwrap_err();
        assert!(matches!(err, MetricsError::MetricsBind { .. }));
    }
}
