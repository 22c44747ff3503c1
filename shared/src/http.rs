use http_body_util::combinators::BoxBody;
use hyper::body::{Bytes, Incoming};
use hyper::service::Service;
use hyper::{Request, Response};
use hyper_util::rt::TokioExecutor;
use hyper_util::rt::TokioIo;
use hyper_util::server::conn::auto::Builder;
use hyper_util::server::graceful::GracefulShutdown;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// Upper bound on waiting for open connections after shutdown is requested.
pub const GRACEFUL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Binds `host:port` and serves `service` until `shutdown` resolves.
pub async fn run_http_service<S, E, F>(
    host: &str,
    port: u16,
    service: S,
    shutdown: F,
) -> Result<(), E>
where
    S: Service<Request<Incoming>, Response = Response<BoxBody<Bytes, E>>, Error = E>
        + Send
        + Sync
        + 'static,
    S::Future: Send + 'static,
    E: From<std::io::Error> + std::error::Error + Send + Sync + 'static,
    F: Future<Output = ()>,
{
    let listener = TcpListener::bind(format!("{host}:{port}")).await?;
    tracing::info!(host, port, "Listening");
    serve(listener, service, shutdown).await
}

/// Accept loop over an already bound listener.
///
/// Once `shutdown` resolves no new connections are accepted, open connections
/// are asked to close after their current request, and the call returns when
/// they are all closed or [`GRACEFUL_SHUTDOWN_TIMEOUT`] elapses.
pub async fn serve<S, E, F>(listener: TcpListener, service: S, shutdown: F) -> Result<(), E>
where
    S: Service<Request<Incoming>, Response = Response<BoxBody<Bytes, E>>, Error = E>
        + Send
        + Sync
        + 'static,
    S::Future: Send + 'static,
    E: From<std::io::Error> + std::error::Error + Send + Sync + 'static,
    F: Future<Output = ()>,
{
    let service_arc = Arc::new(service);
    let builder = Builder::new(TokioExecutor::new());
    let graceful = GracefulShutdown::new();
    tokio::pin!(shutdown);

    loop {
        let (stream, _peer_addr) = tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("Shutdown requested, no longer accepting connections");
                break;
            }
            accepted = listener.accept() => accepted?,
        };
        let _ = stream.set_nodelay(true);
        let io = TokioIo::new(stream);
        let svc = service_arc.clone();

        // Hand the connection to hyper; auto-detect h1/h2 on this socket
        let conn = graceful.watch(builder.serve_connection_with_upgrades(io, svc).into_owned());
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                tracing::debug!(error = %e, "Connection closed with error");
            }
        });
    }

    drop(listener);
    tokio::select! {
        _ = graceful.shutdown() => {
            tracing::info!("All connections closed");
        }
        _ = tokio::time::sleep(GRACEFUL_SHUTDOWN_TIMEOUT) => {
            tracing::warn!("Timed out waiting for connections to close");
        }
    }
    Ok(())
}
