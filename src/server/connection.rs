// Connection handling module
// Serves a single accepted TCP connection on its own task

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use hyper_util::server::graceful::GracefulShutdown;
use tokio::net::TcpStream;

use crate::config::AppState;
use crate::handler;
use crate::logger;

/// Handle a single connection in a spawned task.
///
/// This function:
/// 1. Wraps the TCP stream in `TokioIo`
/// 2. Configures HTTP/1.1 keep-alive from `[performance]`
/// 3. Bounds the wait for each request head by `header_read_timeout`
///    (0 disables it); a response body may take as long as the client needs
/// 4. Registers the connection with the graceful shutdown watcher
pub fn serve_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    state: &Arc<AppState>,
    graceful: &GracefulShutdown,
) {
    let io = TokioIo::new(stream);
    let performance = &state.config.performance;

    let service_state = Arc::clone(state);
    let service = service_fn(move |req| {
        handler::handle_request(req, Arc::clone(&service_state), peer_addr)
    });

    let header_timeout = (performance.header_read_timeout > 0)
        .then(|| Duration::from_secs(performance.header_read_timeout));

    let mut builder = http1::Builder::new();
    builder
        .timer(TokioTimer::new())
        .keep_alive(performance.keep_alive)
        .header_read_timeout(header_timeout);
    let conn = graceful.watch(builder.serve_connection(io, service));

    tokio::spawn(async move {
        if let Err(err) = conn.await {
            if err.is_timeout() {
                tracing::debug!(peer = %peer_addr, "Request head not received in time");
            } else {
                logger::log_connection_error(&peer_addr, &err);
            }
        }
    });
}
