use std::sync::Arc;

use static_responder::config::{AppState, Config};
use static_responder::error::StartupError;
use static_responder::{logger, server};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = Config::load().map_err(StartupError::from)?;
    logger::init(&cfg.logging)?;

    // Build the Tokio runtime, sizing the worker pool from config
    let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
    runtime_builder.enable_all();
    if let Some(workers) = cfg.server.workers.filter(|&n| n > 0) {
        runtime_builder.worker_threads(workers);
    }
    let runtime = runtime_builder.build().map_err(StartupError::Runtime)?;

    runtime.block_on(async_main(cfg))?;
    Ok(())
}

async fn async_main(cfg: Config) -> Result<(), StartupError> {
    let addr = cfg.socket_addr()?;
    let state = Arc::new(AppState::new(cfg)?);

    let listener =
        server::create_listener(addr).map_err(|source| StartupError::Bind { addr, source })?;

    logger::log_server_start(&addr, &state);
    server::run(listener, state, server::shutdown_signal()).await;
    Ok(())
}
