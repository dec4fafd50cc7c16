//! TCP front end.
//!
//! Each connection gets a reader loop and a writer task. The reader decodes
//! frames and dispatches them one at a time, so packets from one client are
//! handled in arrival order. The writer drains the connection's bounded
//! outbound queue, which is the only thing the rest of the server writes to.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use realm_core::protocol::ServerMessage;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};

use crate::frame::{FrameReader, FrameWriter};
use crate::network_manager::NetworkManager;
use crate::session::Session;
use crate::tasks::{dispatch, TaskContext};

pub struct GameServer {
    ctx: TaskContext,
    network: Arc<NetworkManager>,
    outbound_queue: usize,
    next_connection: AtomicU64,
}

impl GameServer {
    /// `ctx` should carry `network` as its message sender.
    pub fn new(ctx: TaskContext, network: Arc<NetworkManager>, outbound_queue: usize) -> Self {
        Self {
            ctx,
            network,
            outbound_queue: outbound_queue.max(1),
            next_connection: AtomicU64::new(1),
        }
    }

    pub fn network(&self) -> &Arc<NetworkManager> {
        &self.network
    }

    /// Accept connections until `shutdown` turns true.
    pub async fn serve(
        self: Arc<Self>,
        listener: TcpListener,
        mut shutdown: watch::Receiver<bool>,
    ) -> io::Result<()> {
        log::info!("Listening on {}", listener.local_addr()?);
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            log::warn!("Accept failed: {e}");
                            continue;
                        }
                    };
                    if let Err(e) = stream.set_nodelay(true) {
                        log::debug!("Could not set TCP_NODELAY for {peer}: {e}");
                    }
                    let server = Arc::clone(&self);
                    let shutdown = shutdown.clone();
                    tokio::spawn(async move {
                        server.handle_connection(stream, peer.to_string(), shutdown).await;
                    });
                }
            }
        }
        log::info!("No longer accepting connections");
        Ok(())
    }

    /// Serve one client until it disconnects, sends a fatal frame, or the
    /// server shuts down.
    pub async fn handle_connection<S>(
        self: Arc<Self>,
        stream: S,
        peer: String,
        mut shutdown: watch::Receiver<bool>,
    ) where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let connection_id = self.next_connection.fetch_add(1, Ordering::Relaxed);
        let (read_half, write_half) = tokio::io::split(stream);

        let (queue_tx, queue_rx) = mpsc::channel(self.outbound_queue);
        self.network.register_connection(connection_id, queue_tx);
        let writer = tokio::spawn(write_loop(
            connection_id,
            FrameWriter::new(write_half),
            queue_rx,
        ));
        log::info!("Connection {connection_id} opened from {peer}");

        let mut session = Session::new(connection_id);
        let mut reader = FrameReader::new(read_half);
        loop {
            let frame = tokio::select! {
                _ = shutdown.changed() => break,
                frame = reader.read_frame() => frame,
            };
            match frame {
                Ok(Some(frame)) => {
                    // Rejections are logged inside dispatch.
                    let _ = dispatch(&self.ctx, &mut session, frame.opcode, &frame.payload).await;
                }
                Ok(None) => break,
                Err(e) if !e.is_fatal() => {
                    log::warn!("Connection {connection_id}: {e}");
                }
                Err(e) => {
                    log::warn!("Closing connection {connection_id}: {e}");
                    break;
                }
            }
        }

        if let Some(user_id) = self.network.unregister_connection(connection_id) {
            if self.ctx.world.leave_player(user_id).is_some() {
                log::info!("User {user_id} left the world");
            }
        }
        // The queue sender went with the registration, so the writer ends
        // once it has flushed what was queued.
        if let Err(e) = writer.await {
            log::error!("Writer for connection {connection_id} failed: {e}");
        }
        log::info!("Connection {connection_id} closed");
    }
}

async fn write_loop<W: AsyncWrite + Unpin>(
    connection_id: u64,
    mut writer: FrameWriter<W>,
    mut queue: mpsc::Receiver<ServerMessage>,
) {
    while let Some(message) = queue.recv().await {
        let mut result = writer.write_message(&message).await;
        while result.is_ok() {
            match queue.try_recv() {
                Ok(next) => result = writer.write_message(&next).await,
                Err(_) => break,
            }
        }
        if let Ok(()) = result {
            result = writer.flush().await;
        }
        if let Err(e) = result {
            log::warn!("Write to connection {connection_id} failed: {e}");
            break;
        }
    }
}
