use std::sync::Arc;

use esl_protocol::{Framer, MessageKind};
use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::connection::Connection;
use crate::listener::Listener;

/// Drives the read half of one [`Connection`], classifying every parsed
/// message and routing it to either the pending-reply FIFO or the
/// [`Listener`]'s event dispatch (§4.2.3, §4.3).
pub struct EventLoop {
    handle: JoinHandle<()>,
}

impl EventLoop {
    /// Spawn the read loop. `reader`/`framer` are the leftovers from
    /// [`Connection::connect`] — any bytes buffered during the handshake
    /// are replayed through `framer` before new bytes are read (§4.2.1).
    pub fn spawn(
        connection: Arc<Connection>,
        listener: Arc<Listener>,
        mut reader: OwnedReadHalf,
        mut framer: Framer,
    ) -> Self {
        let handle = tokio::spawn(async move {
            let mut buf = [0u8; 8192];
            loop {
                loop {
                    match framer.try_parse() {
                        Ok(Some(msg)) => match msg.kind {
                            MessageKind::CommandReply | MessageKind::ApiResponse => {
                                connection.resolve_pending(msg).await;
                            }
                            MessageKind::Event => {
                                listener.dispatch(msg).await;
                            }
                            MessageKind::DisconnectNotice => {
                                debug!("engine sent disconnect-notice");
                                connection.fail_all_pending().await;
                                listener.on_disconnect().await;
                                return;
                            }
                            MessageKind::AuthRequest => {
                                warn!("unexpected auth/request after handshake; ignoring");
                            }
                        },
                        Ok(None) => break,
                        Err(err) => {
                            error!(?err, "malformed message from engine; tearing down connection");
                            connection.fail_all_pending().await;
                            listener.on_disconnect().await;
                            return;
                        }
                    }
                }

                let n = match reader.read(&mut buf).await {
                    Ok(0) => {
                        debug!("engine closed the socket");
                        connection.fail_all_pending().await;
                        listener.on_disconnect().await;
                        return;
                    }
                    Ok(n) => n,
                    Err(err) => {
                        error!(?err, "read error; tearing down connection");
                        connection.fail_all_pending().await;
                        listener.on_disconnect().await;
                        return;
                    }
                };
                framer.feed(&buf[..n]);
            }
        });
        EventLoop { handle }
    }

    pub fn abort(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
