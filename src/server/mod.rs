//! HTTP service exposing generation, random prompts, and cached images.
//!
//! One task per connection; shutdown stops accepting, asks open
//! connections to finish their in-flight request, and waits for them.

pub mod routes;

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::core::orchestrator::Orchestrator;
use crate::error::{RelayError, Result};
use crate::storage::prompts::AutoPrompts;

/// Shared state behind every request.
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub prompts: AutoPrompts,
}

/// Bind the listener for `host:port`.
///
/// # Errors
/// [`RelayError::Config`] for an unparsable address, I/O errors from bind.
pub async fn bind(host: &str, port: u16) -> Result<TcpListener> {
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .map_err(|e| RelayError::Config(format!("Invalid listen address {host}:{port}: {e}")))?;
    Ok(TcpListener::bind(addr).await?)
}

/// Accept connections until `shutdown` resolves.
///
/// # Errors
/// Returns an error if the listener's local address cannot be read.
pub async fn serve<S>(listener: TcpListener, state: Arc<AppState>, shutdown: S) -> Result<()>
where
    S: Future<Output = ()>,
{
    let local = listener.local_addr()?;
    tracing::info!(address = %local, "Image relay listening");

    let (stop_tx, stop_rx) = watch::channel(false);
    let mut connections = JoinSet::new();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            () = &mut shutdown => {
                tracing::info!("Shutdown requested, draining connections");
                break;
            }
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        tracing::warn!(error = %e, "Accept failed");
                        continue;
                    }
                };
                let state = Arc::clone(&state);
                let mut stop_rx = stop_rx.clone();
                connections.spawn(async move {
                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { Ok::<_, Infallible>(routes::handle(&state, req).await) }
                    });
                    let conn = http1::Builder::new().serve_connection(TokioIo::new(stream), service);
                    tokio::pin!(conn);

                    tokio::select! {
                        result = conn.as_mut() => {
                            if let Err(e) = result {
                                tracing::debug!(peer = %peer, error = %e, "Connection ended with error");
                            }
                        }
                        _ = stop_rx.changed() => {
                            conn.as_mut().graceful_shutdown();
                            let _ = conn.await;
                        }
                    }
                });
            }
        }
    }

    let _ = stop_tx.send(true);
    while connections.join_next().await.is_some() {}
    tracing::info!("Image relay stopped");
    Ok(())
}

/// Resolves on Ctrl-C.
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Could not install Ctrl-C handler");
        std::future::pending::<()>().await;
    }
}
