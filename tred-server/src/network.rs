//! TCP ingress: accept loop and per-connection command processing.
//!
//! Each accepted socket gets one spawned task that owns the connection's parser state. The
//! accept loop stops when the shutdown future resolves, dropping the listener; in-flight
//! connection tasks finish their current reply on their own.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};
use tred_common::error::{TredError, TredResult};
use tred_core::command::{CommandFrame, CommandReply};
use tred_core::dispatch::CommandRegistry;
use tred_facade::connection::ConnectionState;
use tred_store::Store;

const READ_CHUNK_BYTES: usize = 8192;

/// Listening server bound to one address and one store.
#[derive(Debug)]
pub(crate) struct Server {
    listener: TcpListener,
    store: Arc<Store>,
    registry: Arc<CommandRegistry>,
}

impl Server {
    /// Binds the listener and prepares the command table.
    ///
    /// # Errors
    ///
    /// Returns `TredError::Io` when the address cannot be bound.
    pub(crate) async fn bind(addr: &str, store: Arc<Store>) -> TredResult<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|error| TredError::Io(format!("bind listener on {addr} failed: {error}")))?;

        Ok(Self {
            listener,
            store,
            registry: Arc::new(CommandRegistry::with_builtin_commands()),
        })
    }

    /// Returns the bound socket address.
    ///
    /// # Errors
    ///
    /// Returns `TredError::Io` when the local address cannot be queried.
    pub(crate) fn local_addr(&self) -> TredResult<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|error| TredError::Io(format!("query local address failed: {error}")))
    }

    /// Accepts connections until `shutdown` resolves, then drops the listener.
    ///
    /// # Errors
    ///
    /// Infallible today; the signature leaves room for accept-path failures that should stop
    /// the server.
    pub(crate) async fn run(self, shutdown: impl Future<Output = ()>) -> TredResult<()> {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => break,
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((socket, peer)) => {
                            debug!(%peer, "accepted connection");
                            let store = Arc::clone(&self.store);
                            let registry = Arc::clone(&self.registry);
                            let _ = tokio::spawn(async move {
                                handle_connection(socket, peer, &store, &registry).await;
                            });
                        }
                        Err(accept_error) => {
                            warn!(%accept_error, "accept failed");
                        }
                    }
                }
            }
        }

        info!("listener closed, no longer accepting connections");
        Ok(())
    }
}

/// Drives one connection: read, parse, dispatch, reply.
///
/// The task ends when the peer disconnects, a QUIT reply has been written, framing breaks, or
/// a reply can no longer be delivered.
async fn handle_connection(
    mut socket: TcpStream,
    peer: SocketAddr,
    store: &Store,
    registry: &CommandRegistry,
) {
    let mut parser = ConnectionState::new();
    let mut chunk = [0_u8; READ_CHUNK_BYTES];

    loop {
        let read_len = match socket.read(&mut chunk).await {
            Ok(0) => {
                debug!(%peer, "peer disconnected");
                return;
            }
            Ok(read_len) => read_len,
            Err(read_error) => {
                debug!(%peer, %read_error, "connection read failed");
                return;
            }
        };
        parser.feed_bytes(&chunk[..read_len]);

        loop {
            match parser.try_pop_command() {
                Ok(Some(parsed)) => {
                    let frame = CommandFrame::new(parsed.name, parsed.args);
                    let reply = registry.dispatch(store, &frame);
                    let closing = frame.name == "QUIT";

                    if let Err(write_error) = socket.write_all(&reply.to_resp_bytes()).await {
                        debug!(%peer, %write_error, "reply write failed");
                        return;
                    }
                    if closing {
                        let _ = socket.shutdown().await;
                        return;
                    }
                }
                Ok(None) => break,
                Err(parse_error) => {
                    debug!(%peer, %parse_error, "dropping connection after framing violation");
                    let reply = CommandReply::Error(parse_error.to_string());
                    let _ = socket.write_all(&reply.to_resp_bytes()).await;
                    return;
                }
            }
        }
    }
}
