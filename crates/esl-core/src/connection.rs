use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use esl_protocol::{encode, Framer, Message, MessageKind};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, warn};

use crate::error::CoreError;

/// A slot in the FIFO pending-reply queue (§4.2.2, §5 Timeouts).
///
/// Wrapped so that a timed-out requester can mark its own slot abandoned
/// without needing to find its position in the queue: the EventLoop pops
/// slots in order and simply discards a reply destined for an abandoned
/// one rather than misaligning it onto the next waiter.
type PendingSlot = Arc<Mutex<Option<oneshot::Sender<Message>>>>;

/// A single TCP session to one engine (§4.2).
///
/// Safe for concurrent senders — outbound writes are serialized through
/// `writer`. Single-reader: only the [`crate::event_loop::EventLoop`]
/// reads from the socket.
pub struct Connection {
    writer: Mutex<OwnedWriteHalf>,
    pending: Mutex<std::collections::VecDeque<PendingSlot>>,
    closed: AtomicBool,
}

impl Connection {
    /// Connect, perform the auth handshake, and subscribe to `events`.
    ///
    /// Returns the live Connection plus the read half and Framer so the
    /// caller can hand both to an [`crate::event_loop::EventLoop`] without
    /// losing any bytes buffered during the handshake (§4.2.1).
    pub async fn connect(
        addr: std::net::SocketAddr,
        password: &str,
        events: &[&str],
    ) -> Result<(Arc<Connection>, OwnedReadHalf, Framer), CoreError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true).ok();
        let (mut read_half, write_half) = stream.into_split();
        let mut framer = Framer::new();

        let greeting = read_one(&mut read_half, &mut framer).await?;
        if greeting.kind != MessageKind::AuthRequest {
            return Err(CoreError::Auth(format!(
                "expected auth/request, got {:?}",
                greeting.kind
            )));
        }

        let connection = Arc::new(Connection {
            writer: Mutex::new(write_half),
            pending: Mutex::new(std::collections::VecDeque::new()),
            closed: AtomicBool::new(false),
        });

        connection.send(&encode::build_auth(password)).await?;
        let auth_reply = read_one(&mut read_half, &mut framer).await?;
        if auth_reply.is_error_reply() {
            return Err(CoreError::Auth(
                auth_reply
                    .header("Reply-Text")
                    .unwrap_or("-ERR auth rejected")
                    .to_owned(),
            ));
        }

        connection
            .send(&encode::build_event_subscribe("plain", events))
            .await?;
        let sub_reply = read_one(&mut read_half, &mut framer).await?;
        if sub_reply.is_error_reply() {
            return Err(CoreError::Auth(format!(
                "event subscription rejected: {:?}",
                sub_reply.header("Reply-Text")
            )));
        }

        debug!(events = ?events, "subscribed to default event set");
        Ok((connection, read_half, framer))
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn mark_closed(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub async fn send(&self, bytes: &[u8]) -> Result<(), CoreError> {
        let mut writer = self.writer.lock().await;
        writer.write_all(bytes).await?;
        Ok(())
    }

    /// Send a command and wait for its reply, honoring FIFO ordering with
    /// every other in-flight command on this Connection (§8 property 4).
    pub async fn request(&self, bytes: &[u8]) -> Result<Message, CoreError> {
        self.request_with_timeout(bytes, None).await
    }

    pub async fn request_with_timeout(
        &self,
        bytes: &[u8],
        deadline: Option<Duration>,
    ) -> Result<Message, CoreError> {
        if self.is_closed() {
            return Err(CoreError::ConnectionLost);
        }
        let (tx, rx) = oneshot::channel();
        let slot: PendingSlot = Arc::new(Mutex::new(Some(tx)));
        self.pending.lock().await.push_back(slot.clone());
        self.send(bytes).await?;

        let outcome = match deadline {
            Some(d) => match tokio::time::timeout(d, rx).await {
                Ok(inner) => inner,
                Err(_) => {
                    *slot.lock().await = None; // abandon: discard the eventual reply
                    return Err(CoreError::Timeout);
                }
            },
            None => rx.await,
        };
        outcome.map_err(|_| CoreError::ConnectionLost)
    }

    /// Resolve the head of the pending-reply FIFO with an arriving
    /// `command-reply`/`api-response` message (called by the EventLoop).
    pub async fn resolve_pending(&self, msg: Message) {
        let slot = self.pending.lock().await.pop_front();
        match slot {
            Some(slot) => {
                if let Some(tx) = slot.lock().await.take() {
                    let _ = tx.send(msg);
                }
                // else: the waiter abandoned this slot on timeout; discard.
            }
            None => warn!("received reply with no pending waiter"),
        }
    }

    /// Fail every outstanding waiter with `ConnectionLost` (§4.2.4, §7).
    pub async fn fail_all_pending(&self) {
        self.mark_closed();
        let mut pending = self.pending.lock().await;
        while let Some(slot) = pending.pop_front() {
            if let Some(tx) = slot.lock().await.take() {
                drop(tx); // dropping the sender fails the receiver
            }
        }
    }
}

async fn read_one(reader: &mut OwnedReadHalf, framer: &mut Framer) -> Result<Message, CoreError> {
    loop {
        if let Some(msg) = framer.try_parse()? {
            return Ok(msg);
        }
        let mut buf = [0u8; 4096];
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Err(CoreError::ConnectionLost);
        }
        framer.feed(&buf[..n]);
    }
}
