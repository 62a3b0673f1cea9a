//! Process bootstrap: CLI, logging, store open, runtime, shutdown.

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tred_common::config::ServerConfig;
use tred_common::error::{TredError, TredResult};
use tred_store::Store;

use crate::network::Server;

/// Durable RESP key/value server.
#[derive(Debug, Parser)]
#[command(name = "tred-server", about = "Durable RESP key/value server")]
struct ServerArgs {
    /// Listen address in host:port form.
    #[arg(long, default_value = tred_common::config::DEFAULT_ADDR)]
    addr: String,

    /// Binlog file path; empty selects ./default.db in the working directory.
    #[arg(long, default_value = "")]
    db_path: String,
}

pub(crate) fn run() -> TredResult<()> {
    let args = ServerArgs::parse();
    init_logging();

    let config = ServerConfig {
        addr: args.addr,
        db_path: args.db_path,
    };
    config.validate()?;

    let db_path = config.normalized_db_path();
    let store = Arc::new(Store::open(&db_path)?);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|build_error| TredError::Io(format!("build runtime failed: {build_error}")))?;

    runtime.block_on(async {
        let server = Server::bind(&config.addr, Arc::clone(&store)).await?;
        info!(addr = %config.addr, db_path = %db_path.display(), "serving");
        server.run(shutdown_signal()).await
    })?;

    // The listener is gone; flush whatever the fsync interval has not covered yet.
    if let Err(close_error) = store.close() {
        error!(%close_error, "closing store failed");
        return Err(close_error);
    }
    info!("shut down cleanly");
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let interrupt = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(terminate) => terminate,
            Err(signal_error) => {
                error!(%signal_error, "installing SIGTERM handler failed");
                let _ = interrupt.await;
                return;
            }
        };

        tokio::select! {
            _ = interrupt => {}
            _ = terminate.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = interrupt.await;
    }
}
