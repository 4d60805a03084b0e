//! Backend refresh and readiness polling types.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;

use crate::backend::wire::{AccountRefreshBody, RefreshBody, RefreshStatusBody};

/// Accepted tenant refresh request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefreshTicket {
    pub success: bool,
    /// `processing`, `system_busy` or `no_accounts` on the current backend.
    pub status: String,
    pub accounts_total: Option<u32>,
    pub jobs_launched: Option<u32>,
    pub estimated_time_minutes: Option<u32>,
    pub retry_in_minutes: Option<u32>,
    pub message: Option<String>,
}

impl RefreshTicket {
    pub fn is_busy(&self) -> bool {
        self.status == "system_busy"
    }

    pub fn has_no_accounts(&self) -> bool {
        self.status == "no_accounts"
    }
}

impl From<RefreshBody> for RefreshTicket {
    fn from(body: RefreshBody) -> Self {
        Self {
            success: body.success.unwrap_or(true),
            status: body.status.unwrap_or_else(|| "processing".to_string()),
            accounts_total: body.accounts_total,
            jobs_launched: body.jobs_launched,
            estimated_time_minutes: body.estimated_time_minutes,
            retry_in_minutes: body.retry_in_minutes,
            message: body.message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountRefreshJob {
    pub job_id: String,
    pub status: String,
    pub already_processing: bool,
}

impl From<AccountRefreshBody> for AccountRefreshJob {
    fn from(body: AccountRefreshBody) -> Self {
        Self {
            job_id: body.job_id,
            status: body.status,
            already_processing: body.already_processing,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    Ok,
    Error,
    Unknown(String),
}

impl JobState {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "queued" => Self::Queued,
            "running" => Self::Running,
            "ok" => Self::Ok,
            "error" => Self::Error,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Ok | Self::Error)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefreshJobStatus {
    pub state: JobState,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    pub error: Option<String>,
}

impl From<RefreshStatusBody> for RefreshJobStatus {
    fn from(body: RefreshStatusBody) -> Self {
        Self {
            state: JobState::parse(&body.status),
            started_at: body.started_at,
            finished_at: body.finished_at,
            error: body.error,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PollOutcome {
    Ready { attempts: u32 },
    /// Budget exhausted; the caller should offer a manual retry.
    TimedOut { attempts: u32 },
    Cancelled { attempts: u32 },
}

impl PollOutcome {
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Ready { attempts } | Self::TimedOut { attempts } | Self::Cancelled { attempts } => {
                *attempts
            }
        }
    }
}

/// Cancellation handle for `poll_until_ready`. Clones share one flag.
#[derive(Clone)]
pub struct PollCancel {
    sender: Arc<watch::Sender<bool>>,
}

impl Default for PollCancel {
    fn default() -> Self {
        Self::new()
    }
}

impl PollCancel {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}
