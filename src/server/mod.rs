// Server module entry point
// Accept loop, per-connection serving, listener setup and shutdown signals

pub mod connection;
pub mod listener;
pub mod signal;

use std::future::Future;
use std::sync::Arc;

use hyper_util::server::graceful::GracefulShutdown;
use tokio::net::TcpListener;

use crate::config::AppState;

// Re-export commonly used items
pub use listener::create_listener;
pub use signal::shutdown_signal;

/// Accept connections until `shutdown` resolves, then wait for open
/// connections to finish.
///
/// Each connection runs on its own task. Accept errors are logged and the
/// loop keeps going.
pub async fn run<F>(listener: TcpListener, state: Arc<AppState>, shutdown: F)
where
    F: Future<Output = ()>,
{
    let graceful = GracefulShutdown::new();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, peer_addr)) => {
                        tracing::trace!(peer = %peer_addr, "Connection accepted");
                        connection::serve_connection(stream, peer_addr, &state, &graceful);
                    }
                    Err(e) => tracing::warn!("Failed to accept connection: {e}"),
                }
            }

            () = &mut shutdown => {
                tracing::info!("Stopped accepting connections");
                break;
            }
        }
    }

    // Close the listening socket before draining
    drop(listener);
    graceful.shutdown().await;
    tracing::info!("All connections closed");
}
