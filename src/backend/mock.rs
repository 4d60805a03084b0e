//! Scripted in-process backend.
//!
//! Each endpoint has a FIFO of scripted replies and an optional sticky reply
//! used once the FIFO is empty. Every call is recorded, so tests can assert on
//! exactly how many requests reached the "network".

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{ApiResponse, Backend};
use crate::error::InsightsError;
use crate::period::types::WindowKey;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Sync,
    Sso,
    Period(WindowKey),
    Refresh,
    RefreshAccount,
    RefreshStatus,
    Accounts,
    Probe,
}

type Reply = Result<ApiResponse, InsightsError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub endpoint: Endpoint,
    pub bearer: String,
}

#[derive(Default)]
struct Script {
    queued: HashMap<Endpoint, VecDeque<Reply>>,
    sticky: HashMap<Endpoint, Reply>,
    calls: Vec<RecordedCall>,
}

#[derive(Default)]
pub struct MockBackend {
    script: Mutex<Script>,
    latency: Option<Duration>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call sleeps this long before answering.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            script: Mutex::new(Script::default()),
            latency: Some(latency),
        }
    }

    /// Queue a one-shot reply.
    pub fn push(&self, endpoint: Endpoint, reply: Reply) {
        self.lock()
            .queued
            .entry(endpoint)
            .or_default()
            .push_back(reply);
    }

    pub fn push_response(&self, endpoint: Endpoint, status: u16, body: serde_json::Value) {
        self.push(endpoint, Ok(ApiResponse::json(status, body)));
    }

    /// Reply used whenever the queue for `endpoint` is empty.
    pub fn set_sticky(&self, endpoint: Endpoint, reply: Reply) {
        self.lock().sticky.insert(endpoint, reply);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self, endpoint: &Endpoint) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| &call.endpoint == endpoint)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.lock().calls.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn answer(&self, endpoint: Endpoint, bearer: &str) -> Reply {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let mut script = self.lock();
        script.calls.push(RecordedCall {
            endpoint: endpoint.clone(),
            bearer: bearer.to_string(),
        });
        if let Some(reply) = script.queued.get_mut(&endpoint).and_then(VecDeque::pop_front) {
            return reply;
        }
        script
            .sticky
            .get(&endpoint)
            .cloned()
            .unwrap_or_else(|| Ok(ApiResponse::new(501, "no scripted reply")))
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn sync_callback(&self, upstream_token: &str, _provider_token: &str) -> Reply {
        self.answer(Endpoint::Sync, upstream_token).await
    }

    async fn sso_login(&self, upstream_token: &str) -> Reply {
        self.answer(Endpoint::Sso, upstream_token).await
    }

    async fn fetch_period(&self, access_token: &str, window: &WindowKey) -> Reply {
        self.answer(Endpoint::Period(window.clone()), access_token).await
    }

    async fn trigger_refresh(&self, access_token: &str) -> Reply {
        self.answer(Endpoint::Refresh, access_token).await
    }

    async fn refresh_account(&self, access_token: &str, _account_id: &str) -> Reply {
        self.answer(Endpoint::RefreshAccount, access_token).await
    }

    async fn refresh_status(&self, access_token: &str, _job_id: &str) -> Reply {
        self.answer(Endpoint::RefreshStatus, access_token).await
    }

    async fn list_accounts(&self, access_token: &str) -> Reply {
        self.answer(Endpoint::Accounts, access_token).await
    }

    async fn probe_ready(&self, access_token: &str) -> Reply {
        self.answer(Endpoint::Probe, access_token).await
    }
}
