use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use esl_protocol::{encode, Message};
use uuid::Uuid;
use tracing::info;

use crate::connection::Connection;
use crate::error::CoreError;
use crate::event_loop::EventLoop;
use crate::listener::{Listener, DEFAULT_EVENTS};
use crate::model::{AppSpec, Direction, Job, Session};

/// Template for a round of `originate` requests (§3 Data Model:
/// OriginateRequest, §6 Originate command template).
#[derive(Debug, Clone)]
pub struct OriginateRequest {
    pub destination: String,
    pub profile: Option<String>,
    pub proxy: Option<String>,
    pub post_connect_app: String,
    pub codecs: Option<String>,
    pub originate_timeout: u32,
    pub custom_headers: Vec<(String, String)>,
}

impl OriginateRequest {
    pub fn new(destination: impl Into<String>, post_connect_app: impl Into<String>) -> Self {
        OriginateRequest {
            destination: destination.into(),
            profile: None,
            proxy: None,
            post_connect_app: post_connect_app.into(),
            codecs: None,
            originate_timeout: 30,
            custom_headers: Vec::new(),
        }
    }
}

/// Thin control façade over a [`Connection`] + [`Listener`] pair (§4.5).
pub struct Client {
    pub id: String,
    connection: Arc<Connection>,
    listener: Arc<Listener>,
    _event_loop: EventLoop,
}

impl Client {
    /// Connect to one engine and start its event loop. `id` identifies
    /// this Client in originated sessions via `sip_h_X-switchio_client`.
    pub async fn connect(
        id: impl Into<String>,
        addr: SocketAddr,
        password: &str,
    ) -> Result<Self, CoreError> {
        let id = id.into();
        let (connection, reader, framer) = Connection::connect(addr, password, DEFAULT_EVENTS).await?;
        let listener = Listener::new();
        let event_loop = EventLoop::spawn(connection.clone(), listener.clone(), reader, framer);
        info!(client_id = %id, %addr, "connected to engine");
        Ok(Client {
            id,
            connection,
            listener,
            _event_loop: event_loop,
        })
    }

    pub fn listener(&self) -> &Arc<Listener> {
        &self.listener
    }

    pub fn is_connected(&self) -> bool {
        !self.connection.is_closed()
    }

    /// Synchronous `api` call (§4.5). Fails with `CoreError::Api` if the
    /// reply body starts with `-ERR`.
    pub async fn api(&self, cmd: &str) -> Result<Message, CoreError> {
        let reply = self.connection.request(&encode::build_api(cmd)).await?;
        if reply.is_error_reply() {
            return Err(CoreError::Api(
                reply.body_str().unwrap_or("-ERR unknown").to_owned(),
            ));
        }
        Ok(reply)
    }

    /// `cmd(s)`: `api` stripped down to its body text.
    pub async fn cmd(&self, cmd: &str) -> Result<String, CoreError> {
        let reply = self.api(cmd).await?;
        Ok(reply.body_str().unwrap_or_default().trim().to_owned())
    }

    /// Issue a non-blocking API call and return a [`Job`] registered with
    /// the Listener before the command is even sent, so a `BACKGROUND_JOB`
    /// racing the command-reply can never be missed (§4.5 `bgapi`).
    pub async fn bgapi(&self, cmd: &str) -> Result<Job, CoreError> {
        let job_uuid = Uuid::new_v4().to_string();
        let job = self.listener.register_job(job_uuid.clone(), None).await;
        let reply = self
            .connection
            .request(&encode::build_bgapi(cmd, &job_uuid))
            .await?;
        if reply.is_error_reply() {
            return Err(CoreError::Api(
                reply.body_str().unwrap_or("-ERR unknown").to_owned(),
            ));
        }
        Ok(job)
    }

    /// Render and fire one `originate` request (§4.5, §6 template).
    ///
    /// Plants `origination_uuid`, `sip_h_X-originating_session_uuid`
    /// (both the freshly generated correlation tag) and
    /// `sip_h_X-switchio_client` so the Listener can pair legs and
    /// attribute ownership (§4.4 Correlation).
    pub async fn originate(&self, request: &OriginateRequest, app_id: Option<&str>) -> Result<Job, CoreError> {
        let tag = Uuid::new_v4().to_string();
        self.listener
            .preallocate_session(&tag, Direction::Outbound, &self.id, app_id)
            .await;

        let mut vars = vec![
            ("origination_uuid".to_owned(), tag.clone()),
            ("sip_h_X-originating_session_uuid".to_owned(), tag.clone()),
            ("sip_h_X-switchio_client".to_owned(), self.id.clone()),
            ("originate_timeout".to_owned(), request.originate_timeout.to_string()),
        ];
        if let Some(app_id) = app_id {
            vars.push(("switchio_app".to_owned(), app_id.to_owned()));
        }
        if let Some(codecs) = &request.codecs {
            vars.push(("absolute_codec_string".to_owned(), codecs.clone()));
        }
        for (k, v) in &request.custom_headers {
            vars.push((k.clone(), v.clone()));
        }

        let dest = match (&request.profile, &request.proxy) {
            (Some(profile), Some(proxy)) => format!("sofia/{profile}/{}@{}", request.destination, proxy),
            (Some(profile), None) => format!("sofia/{profile}/{}", request.destination),
            _ => request.destination.clone(),
        };

        let cmd = format!(
            "originate {{{}}}{} &{}()",
            vars.iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(","),
            dest,
            request.post_connect_app,
        );

        let job_uuid = Uuid::new_v4().to_string();
        let job = self
            .listener
            .register_job(job_uuid.clone(), Some(tag))
            .await;
        let reply = self
            .connection
            .request(&encode::build_bgapi(&cmd, &job_uuid))
            .await?;
        if reply.is_error_reply() {
            return Err(CoreError::Api(
                reply.body_str().unwrap_or("-ERR unknown").to_owned(),
            ));
        }
        Ok(job)
    }

    /// Register every callback/hook in `spec` atomically (§4.5, §7
    /// Atomicity).
    pub async fn load_app(&self, spec: AppSpec) -> Result<String, CoreError> {
        self.listener.load_app(spec).await
    }

    pub async fn unload_app(&self, app_id: &str) {
        self.listener.unload_app(app_id).await;
    }

    /// Terminate every session owned by this Client (§4.5 `hupall`).
    pub async fn hupall(&self) -> Result<(), CoreError> {
        self.cmd(&format!("hupall NORMAL_CLEARING switchio_client {}", self.id))
            .await?;
        Ok(())
    }

    pub async fn hangup(&self, uuid: &str, cause: &str) -> Result<(), CoreError> {
        self.cmd(&format!("uuid_kill {uuid} {cause}")).await?;
        Ok(())
    }

    pub async fn session(&self, uuid: &str) -> Option<Session> {
        self.listener.session(uuid).await
    }

    pub async fn api_with_timeout(&self, cmd: &str, deadline: Duration) -> Result<Message, CoreError> {
        let reply = self
            .connection
            .request_with_timeout(&encode::build_api(cmd), Some(deadline))
            .await?;
        if reply.is_error_reply() {
            return Err(CoreError::Api(
                reply.body_str().unwrap_or("-ERR unknown").to_owned(),
            ));
        }
        Ok(reply)
    }
}
