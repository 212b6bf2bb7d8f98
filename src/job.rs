use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::control::Control;

/// Lifecycle states of a tracked job. `Idle` is represented by absence from
/// the registry, so it has no variant here: a job record only exists while
/// something is in flight or cooling down.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr, Serialize, Deserialize, JsonSchema,
)]
pub enum JobState {
    Preparing,
    Downloading,
    Pausing,
    Paused,
    Resuming,
    Finishing,
    Downloaded,
    Error,
}

impl JobState {
    /// Terminal states stay on screen through a cool-down, then the record
    /// is dropped and the control recycled.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Downloaded | JobState::Error)
    }

    /// States eligible for identifier-less correlation (tier 3). `Paused`
    /// jobs are deliberately excluded: a paused worker does not broadcast.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            JobState::Preparing
                | JobState::Downloading
                | JobState::Finishing
                | JobState::Pausing
                | JobState::Resuming
        )
    }

    /// States in which a `progress == 100` sentinel may move the job to
    /// `Finishing`. Paused-ish states must not be yanked forward by a stale
    /// progress broadcast.
    pub fn may_enter_finishing(&self) -> bool {
        matches!(self, JobState::Downloading | JobState::Finishing)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum JobKind {
    Single,
    Set,
    SetRange,
}

/// Everything needed to (re)issue the job's command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DownloadRequest {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range_start: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range_end: Option<u32>,
}

impl DownloadRequest {
    pub fn url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            range_start: None,
            range_end: None,
        }
    }
}

/// Cancellation tokens for the timers guarding this job. Every transition
/// that supersedes a timer cancels it here, so a recycled control can never
/// be touched by a callback armed for a previous job.
#[derive(Debug, Default)]
pub struct JobTimers {
    pub prepare: Option<CancellationToken>,
    pub cooldown: Option<CancellationToken>,
}

impl JobTimers {
    pub fn cancel_all(&mut self) {
        if let Some(t) = self.prepare.take() {
            t.cancel();
        }
        if let Some(t) = self.cooldown.take() {
            t.cancel();
        }
    }
}

impl Drop for JobTimers {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

/// One tracked download. Owned exclusively by the engine task.
#[derive(Debug)]
pub struct Job {
    pub id: String,
    pub state: JobState,
    pub kind: JobKind,
    /// Identifier the platform's own download manager assigns, relayed by the
    /// worker some time after creation. May never arrive.
    pub secondary_id: Option<String>,
    pub request: DownloadRequest,
    pub last_progress_at: Instant,
    pub control: Arc<dyn Control>,
    pub timers: JobTimers,
    pub stall_flagged: bool,
}

impl Job {
    pub fn new(id: String, kind: JobKind, request: DownloadRequest, control: Arc<dyn Control>) -> Self {
        Self {
            id,
            state: JobState::Preparing,
            kind,
            secondary_id: None,
            request,
            last_progress_at: Instant::now(),
            control,
            timers: JobTimers::default(),
            stall_flagged: false,
        }
    }

    /// Record that a message advanced progress. Also clears the stall flag so
    /// a recovered job stops showing "may be stuck".
    pub fn touch_progress(&mut self) {
        self.last_progress_at = Instant::now();
        self.stall_flagged = false;
    }

    /// Bind the worker-assigned secondary id. First binding wins; a live job
    /// is never rebound.
    pub fn bind_secondary(&mut self, secondary_id: &str) {
        if self.secondary_id.is_none() {
            self.secondary_id = Some(secondary_id.to_string());
        }
    }
}

/// Immutable view of a job used by the pure correlation tiers.
#[derive(Debug, Clone)]
pub struct JobSnapshot {
    pub id: String,
    pub state: JobState,
    pub secondary_id: Option<String>,
    pub last_progress_at: Instant,
}

impl Job {
    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            id: self.id.clone(),
            state: self.state,
            secondary_id: self.secondary_id.clone(),
            last_progress_at: self.last_progress_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_and_active_sets_are_disjoint() {
        let all = [
            JobState::Preparing,
            JobState::Downloading,
            JobState::Pausing,
            JobState::Paused,
            JobState::Resuming,
            JobState::Finishing,
            JobState::Downloaded,
            JobState::Error,
        ];
        for state in all {
            assert!(
                !(state.is_terminal() && state.is_active()),
                "{state} is both terminal and active"
            );
        }
        // Paused is neither: it is alive but not a broadcast candidate
        assert!(!JobState::Paused.is_active());
        assert!(!JobState::Paused.is_terminal());
    }

    #[test]
    fn secondary_id_binds_once() {
        let control = crate::control::RecordingControl::shared();
        let mut job = Job::new(
            "a".into(),
            JobKind::Single,
            DownloadRequest::url("https://example.com/x"),
            control,
        );
        job.bind_secondary("dl-1");
        job.bind_secondary("dl-2");
        assert_eq!(job.secondary_id.as_deref(), Some("dl-1"));
    }

    #[test]
    fn cancel_all_takes_tokens() {
        let mut timers = JobTimers {
            prepare: Some(CancellationToken::new()),
            cooldown: Some(CancellationToken::new()),
        };
        let prepare = timers.prepare.clone().unwrap();
        timers.cancel_all();
        assert!(prepare.is_cancelled());
        assert!(timers.prepare.is_none() && timers.cooldown.is_none());
    }
}
