//! A scripted FreeSWITCH ESL server for integration tests (§8 concrete
//! scenarios). Binds to a random port, drives the auth handshake, answers
//! `api`/`bgapi` with canned replies, and lets a test push arbitrary raw
//! events onto the wire to exercise the Listener's handler chain.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

/// Canned server behavior, built up with the `with_*` methods before
/// calling [`MockEslServer::start`].
#[derive(Clone, Default)]
pub struct MockConfig {
    password: String,
    auth_succeeds: bool,
    /// `api <command>` text (without the `api ` prefix) → response body.
    api_bodies: HashMap<String, String>,
    /// `bgapi <command>` text → `(delay, BACKGROUND_JOB body)` fired after
    /// the command/reply that acknowledges the `bgapi` itself.
    bgapi_results: HashMap<String, (Duration, String)>,
}

impl MockConfig {
    pub fn new(password: impl Into<String>) -> Self {
        MockConfig {
            password: password.into(),
            auth_succeeds: true,
            api_bodies: HashMap::new(),
            bgapi_results: HashMap::new(),
        }
    }

    pub fn auth_fails(mut self) -> Self {
        self.auth_succeeds = false;
        self
    }

    pub fn with_api_response(mut self, command: impl Into<String>, body: impl Into<String>) -> Self {
        self.api_bodies.insert(command.into(), body.into());
        self
    }

    pub fn with_bgapi_result(
        mut self,
        command: impl Into<String>,
        delay: Duration,
        body: impl Into<String>,
    ) -> Self {
        self.bgapi_results
            .insert(command.into(), (delay, body.into()));
        self
    }
}

/// A handle a test uses to push raw bytes (typically a scripted event) to
/// whichever connection is currently live.
#[derive(Clone)]
pub struct PushHandle {
    tx: Arc<Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>>,
}

impl PushHandle {
    pub async fn push(&self, bytes: Vec<u8>) {
        if let Some(tx) = self.tx.lock().await.as_ref() {
            let _ = tx.send(bytes);
        }
    }

    pub async fn push_disconnect_notice(&self) {
        self.push(b"Content-Type: text/disconnect-notice\n\n".to_vec())
            .await;
    }
}

pub struct MockEslServer {
    addr: SocketAddr,
    push: PushHandle,
    _task: JoinHandle<()>,
}

impl MockEslServer {
    pub async fn start(config: MockConfig) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let push_tx_slot: Arc<Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>> =
            Arc::new(Mutex::new(None));
        let push = PushHandle {
            tx: push_tx_slot.clone(),
        };

        let task = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let (push_tx, push_rx) = mpsc::unbounded_channel();
                *push_tx_slot.lock().await = Some(push_tx);
                let config = config.clone();
                tokio::spawn(async move {
                    let _ = handle_connection(stream, config, push_rx).await;
                });
            }
        });

        Ok(MockEslServer {
            addr,
            push,
            _task: task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn push_handle(&self) -> PushHandle {
        self.push.clone()
    }
}

async fn handle_connection(
    stream: tokio::net::TcpStream,
    config: MockConfig,
    mut push_rx: mpsc::UnboundedReceiver<Vec<u8>>,
) -> std::io::Result<()> {
    let (mut read_half, write_half) = stream.into_split();
    let writer = Arc::new(Mutex::new(write_half));

    writer
        .lock()
        .await
        .write_all(b"Content-Type: auth/request\n\n")
        .await?;

    let Some(auth_line) = read_command(&mut read_half).await? else {
        return Ok(());
    };
    let presented_password = auth_line
        .lines()
        .next()
        .and_then(|l| l.strip_prefix("auth "))
        .unwrap_or_default();

    if config.auth_succeeds && presented_password == config.password {
        writer
            .lock()
            .await
            .write_all(b"Content-Type: command/reply\nReply-Text: +OK accepted\n\n")
            .await?;
    } else {
        writer
            .lock()
            .await
            .write_all(b"Content-Type: command/reply\nReply-Text: -ERR invalid\n\n")
            .await?;
        return Ok(());
    }

    loop {
        tokio::select! {
            command = read_command(&mut read_half) => {
                match command {
                    Ok(Some(text)) => respond_to_command(&writer, &config, &text).await?,
                    Ok(None) | Err(_) => return Ok(()),
                }
            }
            pushed = push_rx.recv() => {
                match pushed {
                    Some(bytes) => writer.lock().await.write_all(&bytes).await?,
                    None => return Ok(()),
                }
            }
        }
    }
}

/// Reads one blank-line-terminated command off the socket. Control-plane
/// commands (`auth`, `api`, `bgapi`, `event`, ...) are themselves simple
/// line-oriented text, so a byte-at-a-time scan for a blank line is
/// sufficient without pulling in the inbound [`esl_protocol::Framer`],
/// which models engine → client framing, not the reverse.
async fn read_command(
    reader: &mut tokio::net::tcp::OwnedReadHalf,
) -> std::io::Result<Option<String>> {
    let mut line = Vec::new();
    let mut buf = [0u8; 1];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(None);
        }
        line.push(buf[0]);
        if line.ends_with(b"\n\n") {
            break;
        }
    }
    Ok(Some(String::from_utf8_lossy(&line).to_string()))
}

async fn respond_to_command(
    writer: &Arc<Mutex<OwnedWriteHalf>>,
    config: &MockConfig,
    text: &str,
) -> std::io::Result<()> {
    let first_line = text.lines().next().unwrap_or_default();

    if let Some(command) = first_line.strip_prefix("api ") {
        let body = config
            .api_bodies
            .get(command)
            .cloned()
            .unwrap_or_else(|| "+OK".to_owned());
        let mut w = writer.lock().await;
        w.write_all(
            format!("Content-Type: api/response\nContent-Length: {}\n\n{body}", body.len())
                .as_bytes(),
        )
        .await?;
        return Ok(());
    }

    if let Some(command) = first_line.strip_prefix("bgapi ") {
        let job_uuid = text
            .lines()
            .find_map(|l| l.strip_prefix("Job-UUID: "))
            .unwrap_or("unknown-job")
            .to_owned();
        {
            let mut w = writer.lock().await;
            w.write_all(
                format!("Content-Type: command/reply\nReply-Text: +OK Job-UUID: {job_uuid}\n\n")
                    .as_bytes(),
            )
            .await?;
        }
        if let Some((delay, body)) = config.bgapi_results.get(command).cloned() {
            let writer = writer.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let nested = format!(
                    "Event-Name: BACKGROUND_JOB\nJob-UUID: {job_uuid}\nContent-Length: {}\n\n{body}",
                    body.len()
                );
                let framed = format!("Content-Type: text/event-plain\nContent-Length: {}\n\n{nested}", nested.len());
                let _ = writer.lock().await.write_all(framed.as_bytes()).await;
            });
        }
        return Ok(());
    }

    let mut w = writer.lock().await;
    w.write_all(b"Content-Type: command/reply\nReply-Text: +OK\n\n")
        .await?;
    Ok(())
}
