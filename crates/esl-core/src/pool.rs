use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use esl_protocol::Message;

use crate::client::{Client, OriginateRequest};
use crate::error::CoreError;
use crate::model::{AppSpec, Job};

/// Aggregates N [`Client`]s, one per engine, and round-robins originate
/// traffic across them (§4.6).
pub struct Pool {
    clients: Vec<Arc<Client>>,
    next: AtomicUsize,
}

impl Pool {
    /// Connect to every host in `hosts` with the same `password`,
    /// assigning each a client id derived from its address.
    pub async fn connect(hosts: &[SocketAddr], password: &str) -> Result<Self, CoreError> {
        let mut clients = Vec::with_capacity(hosts.len());
        for addr in hosts {
            let client = Client::connect(addr.to_string(), *addr, password).await?;
            clients.push(Arc::new(client));
        }
        Ok(Pool {
            clients,
            next: AtomicUsize::new(0),
        })
    }

    pub fn clients(&self) -> &[Arc<Client>] {
        &self.clients
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Broadcast `load_app` to every member (§4.6).
    pub async fn load_app(&self, spec: AppSpec) -> Result<Vec<Result<String, CoreError>>, CoreError> {
        let mut results = Vec::with_capacity(self.clients.len());
        for client in &self.clients {
            results.push(client.load_app(spec.clone()).await);
        }
        Ok(results)
    }

    /// Evaluate `cmd` via `api` on every member, returning each reply in
    /// client order (§4.6 `evals`).
    pub async fn evals(&self, cmd: &str) -> Vec<Result<Message, CoreError>> {
        let mut results = Vec::with_capacity(self.clients.len());
        for client in &self.clients {
            results.push(client.api(cmd).await);
        }
        results
    }

    /// Pick the next Client round-robin (§4.6: "iterates clients
    /// round-robin so load spreads evenly").
    pub fn next_client(&self) -> Option<&Arc<Client>> {
        if self.clients.is_empty() {
            return None;
        }
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.clients.len();
        self.clients.get(idx)
    }

    pub async fn originate_round_robin(
        &self,
        request: &OriginateRequest,
        app_id: Option<&str>,
    ) -> Result<Job, CoreError> {
        let client = self
            .next_client()
            .ok_or_else(|| CoreError::Configuration("pool has no clients".to_owned()))?;
        client.originate(request, app_id).await
    }

    pub async fn active_session_count(&self) -> usize {
        let mut total = 0;
        for client in &self.clients {
            total += client.listener().active_session_count().await;
        }
        total
    }

    pub async fn total_originated_sessions(&self) -> u64 {
        let mut total = 0;
        for client in &self.clients {
            total += client.listener().total_originated_sessions().await;
        }
        total
    }
}
