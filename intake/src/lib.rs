pub mod config;
pub mod dispatch;
pub mod errors;
pub mod gateway;
pub mod http;
pub mod metrics_defs;
pub mod queue;
pub mod request;

#[cfg(test)]
mod testutils;

use crate::dispatch::Dispatcher;
use crate::errors::IntakeError;
use crate::gateway::{Gateway, IntakeService};
use shared::http::run_http_service;
use std::sync::Arc;

/// Serves the intake gateway until a shutdown signal arrives, then waits for
/// dispatches that were started but not finished.
pub async fn run(config: config::Config) -> Result<(), IntakeError> {
    config.validate()?;

    let config = Arc::new(config);
    let dispatcher = Dispatcher::new(dispatch::build_sink(&config.sink));
    let gateway = Gateway::new(config.clone(), dispatcher.clone());

    tracing::info!(
        path = %config.path,
        sink = config.sink.kind(),
        "Starting intake gateway"
    );

    run_http_service(
        &config.listener.host,
        config.listener.port,
        IntakeService::new(Arc::new(gateway)),
        shutdown_signal(),
    )
    .await?;

    tracing::info!(
        pending = dispatcher.pending(),
        "Waiting for in-flight dispatches"
    );
    dispatcher.flush().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
