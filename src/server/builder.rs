// ────────────────────────────────
// src/server/builder.rs
// ────────────────────────────────
use crate::server::listener::bind_tcp;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use hyper::{server::conn::Http, Body, Request, Response};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tower::Service;

const ACCEPT_BACKOFF_MIN: Duration = Duration::from_millis(5);
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Source of incoming scrape connections.
#[async_trait]
pub trait Accept: Send + 'static {
    type Conn: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    async fn accept(&mut self) -> std::io::Result<(Self::Conn, SocketAddr)>;
}

#[async_trait]
impl Accept for TcpListener {
    type Conn = TcpStream;

    async fn accept(&mut self) -> std::io::Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(self).await
    }
}

/// Builder pattern so `main.rs` can inject the metrics handler.
pub struct ServerBuilder<H>
where
    H: Service<Request<Body>, Response = Response<Body>> + Send + Clone + 'static,
    H::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    H::Future: Send + 'static,
{
    addr: SocketAddr,
    handler: Option<H>,
}

impl<H> ServerBuilder<H>
where
    H: Service<Request<Body>, Response = Response<Body>> + Send + Clone + 'static,
    H::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    H::Future: Send + 'static,
{
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr, handler: None }
    }

    pub fn with_handler(mut self, handler: H) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Binds now so address errors surface at startup, then accepts
    /// connections on a background task that only ends if it panics.
    /// Returns the bound address.
    pub async fn spawn(self) -> Result<(SocketAddr, JoinHandle<()>)> {
        let handler = self
            .handler
            .ok_or_else(|| anyhow!("handler must be set via with_handler()"))?;

        let listener = bind_tcp(self.addr).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!("HTTP server listening on {}", local_addr);

        let task = tokio::spawn(accept_loop(listener, handler));
        Ok((local_addr, task))
    }
}

/// Serves every accepted connection on its own task.
///
/// Accept errors (EMFILE, ECONNABORTED and the like) are transient: the loop
/// pauses with a doubling delay capped at one second and tries again.
pub async fn accept_loop<A, H>(mut acceptor: A, handler: H)
where
    A: Accept,
    H: Service<Request<Body>, Response = Response<Body>> + Send + Clone + 'static,
    H::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    H::Future: Send + 'static,
{
    let mut backoff = ACCEPT_BACKOFF_MIN;
    loop {
        let (stream, peer) = match acceptor.accept().await {
            Ok(accepted) => {
                backoff = ACCEPT_BACKOFF_MIN;
                accepted
            }
            Err(err) => {
                tracing::warn!(%err, "accept error; retrying in {:?}", backoff);
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(ACCEPT_BACKOFF_MAX);
                continue;
            }
        };
        let svc = handler.clone();

        // One task per scrape connection.
        tokio::spawn(async move {
            let http = Http::new();
            if let Err(err) = http.serve_connection(stream, svc).await {
                tracing::warn!(%peer, %err, "connection error");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::{GroupingMode, Snapshot, StateCounts};
    use crate::metrics::MetricsRegistry;
    use crate::server::MetricsHandler;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};

    /// Hands out scripted results, then blocks forever.
    struct ScriptedAcceptor {
        results: VecDeque<std::io::Result<DuplexStream>>,
    }

    #[async_trait]
    impl Accept for ScriptedAcceptor {
        type Conn = DuplexStream;

        async fn accept(&mut self) -> std::io::Result<(DuplexStream, SocketAddr)> {
            match self.results.pop_front() {
                Some(result) => result.map(|conn| (conn, ([127, 0, 0, 1], 40000).into())),
                None => std::future::pending().await,
            }
        }
    }

    fn handler() -> MetricsHandler {
        let registry = Arc::new(MetricsRegistry::new(&GroupingMode::Disabled).unwrap());
        registry
            .collector()
            .publish(&Snapshot::Ungrouped(StateCounts { healthy: 4, sick: 1 }), false);
        MetricsHandler::new(registry, "/metrics")
    }

    #[tokio::test]
    async fn test_accept_errors_do_not_stop_the_server() {
        let (mut client, server) = duplex(64 * 1024);
        let acceptor = ScriptedAcceptor {
            results: VecDeque::from(vec![
                Err(std::io::Error::from_raw_os_error(24)),
                Err(std::io::ErrorKind::ConnectionAborted.into()),
                Err(std::io::Error::from_raw_os_error(24)),
                Ok(server),
            ]),
        };
        let task = tokio::spawn(accept_loop(acceptor, handler()));

        client
            .write_all(b"GET /metrics HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        tokio::time::timeout(Duration::from_secs(10), client.read_to_string(&mut response))
            .await
            .expect("no response after accept errors")
            .unwrap();

        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.contains("varnish_backend_state{state=\"healthy\"} 4"));
        assert!(!task.is_finished());
        task.abort();
    }

    #[tokio::test]
    async fn test_spawned_server_reports_bound_address() {
        let (addr, task) = ServerBuilder::new(([127, 0, 0, 1], 0).into())
            .with_handler(handler())
            .spawn()
            .await
            .unwrap();
        assert_ne!(addr.port(), 0);
        assert!(!task.is_finished());
        task.abort();
    }

    #[tokio::test]
    async fn test_spawn_requires_handler() {
        let builder: ServerBuilder<MetricsHandler> = ServerBuilder::new(([127, 0, 0, 1], 0).into());
        assert!(builder.spawn().await.is_err());
    }
}
