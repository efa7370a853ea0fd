//! # Fetch Request State Machine
//!
//! Tracks one resolution of a cache key through its local and remote tiers.
//!
//! ## State Machine
//!
//! ```text
//! Idle → CheckingLocal → Resolved
//!              ↓     ↘
//!              ↓      FetchingRemote → Resolved
//!              ↓            ↓
//!              └──────→ Failed ←┘
//! ```
//!
//! Every transition is validated; an illegal one yields
//! [`SyncError::InvalidStateTransition`] and leaves the request untouched.

use crate::{Result, SyncError};
use chrono::{DateTime, Utc};
use core_runtime::events::ResolvedFrom;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for a fetch request, used to correlate log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| SyncError::InvalidKey(format!("request id: {}", e)))
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    Idle,
    CheckingLocal,
    FetchingRemote,
    Resolved,
    Failed,
}

impl RequestState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestState::Idle => "idle",
            RequestState::CheckingLocal => "checking_local",
            RequestState::FetchingRemote => "fetching_remote",
            RequestState::Resolved => "resolved",
            RequestState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestState::Resolved | RequestState::Failed)
    }

    fn can_transition_to(&self, next: RequestState) -> bool {
        use RequestState::*;
        matches!(
            (self, next),
            (Idle, CheckingLocal)
                | (Idle, FetchingRemote)
                | (CheckingLocal, Resolved)
                | (CheckingLocal, FetchingRemote)
                | (CheckingLocal, Failed)
                | (FetchingRemote, Resolved)
                | (FetchingRemote, Failed)
        )
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestState {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "idle" => Ok(RequestState::Idle),
            "checking_local" => Ok(RequestState::CheckingLocal),
            "fetching_remote" => Ok(RequestState::FetchingRemote),
            "resolved" => Ok(RequestState::Resolved),
            "failed" => Ok(RequestState::Failed),
            other => Err(SyncError::InvalidKey(format!("unknown request state '{}'", other))),
        }
    }
}

/// One pass of the resolution pipeline for a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub id: RequestId,
    pub key: String,
    pub state: RequestState,
    /// Remote attempts made, retries included
    pub attempts: u32,
    pub resolved_from: Option<ResolvedFrom>,
    pub failure: Option<String>,
    pub started_at: DateTime<Utc>,
}

impl FetchRequest {
    pub fn new(key: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: RequestId::new(),
            key: key.into(),
            state: RequestState::Idle,
            attempts: 0,
            resolved_from: None,
            failure: None,
            started_at: now,
        }
    }

    pub fn check_local(&mut self) -> Result<()> {
        self.transition(RequestState::CheckingLocal, "local lookup")
    }

    /// Remote lookups may start directly from `Idle` when the local tier is
    /// known to be stale.
    pub fn fetch_remote(&mut self) -> Result<()> {
        self.transition(RequestState::FetchingRemote, "remote fetch")
    }

    pub fn resolve(&mut self, source: ResolvedFrom) -> Result<()> {
        self.transition(RequestState::Resolved, "resolution")?;
        self.resolved_from = Some(source);
        Ok(())
    }

    pub fn fail(&mut self, reason: impl Into<String>) -> Result<()> {
        self.transition(RequestState::Failed, "failure")?;
        self.failure = Some(reason.into());
        Ok(())
    }

    pub fn record_attempts(&mut self, attempts: u32) {
        self.attempts = attempts;
    }

    fn transition(&mut self, next: RequestState, action: &str) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(SyncError::InvalidStateTransition {
                from: self.state.to_string(),
                to: next.to_string(),
                reason: format!("{} is not allowed for request {}", action, self.id),
            });
        }
        self.state = next;
        Ok(())
    }
}
