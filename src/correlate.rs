use strum_macros::Display;

use crate::job::JobSnapshot;
use crate::message::StatusMessage;

/// Outcome of resolving an inbound status message against the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Correlation {
    /// Bound to this job id. The id may still be unknown to the registry
    /// (tier 1 trusts the message); the engine drops those silently.
    Matched(String),
    Discarded(DiscardReason),
}

/// Why a message was dropped. Ambiguous reasons are logged at warn, the rest
/// are expected noise from unrelated broadcasts and only logged at debug.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum DiscardReason {
    /// `secondary_id` matched more than one live job; never guess.
    AmbiguousSecondaryId,
    /// No identifier, several active candidates, no timestamp to break the
    /// tie.
    AmbiguousNoTimestamp,
    /// No identifier, several active candidates with indistinguishable
    /// recency.
    TiedRecency,
    /// Message carries no lifecycle fields at all.
    MinimalNoise,
    /// Identifier-less update but nothing is in flight.
    NoActiveJobs,
}

impl DiscardReason {
    pub fn is_ambiguous(&self) -> bool {
        matches!(
            self,
            DiscardReason::AmbiguousSecondaryId
                | DiscardReason::AmbiguousNoTimestamp
                | DiscardReason::TiedRecency
        )
    }
}

/// Resolve a status message to at most one job. Tiers run in order of trust
/// and stop at the first that decides:
///
/// 1. explicit `id`/`originalId`, used as-is,
/// 2. `secondaryId` scan over the registry,
/// 3. active-job heuristic for identifier-less updates,
/// 4. discard.
///
/// Pure function over a snapshot of the registry, so every tier is testable
/// without an engine.
pub fn correlate(msg: &StatusMessage, jobs: &[JobSnapshot]) -> Correlation {
    if let Some(id) = msg.explicit_id() {
        return Correlation::Matched(id.to_string());
    }

    if let Some(secondary) = msg.secondary_id.as_deref() {
        let mut matches = jobs
            .iter()
            .filter(|j| j.secondary_id.as_deref() == Some(secondary));
        if let Some(first) = matches.next() {
            if matches.next().is_some() {
                return Correlation::Discarded(DiscardReason::AmbiguousSecondaryId);
            }
            return Correlation::Matched(first.id.clone());
        }
        // no job has claimed this secondary id yet; fall through to tier 3
    }

    active_job_heuristic(msg, jobs)
}

/// Tier 3: an identifier-less message that still talks about a lifecycle
/// (progress, status, error or completed) is attributed to the active job
/// set, conservatively.
fn active_job_heuristic(msg: &StatusMessage, jobs: &[JobSnapshot]) -> Correlation {
    if msg.is_minimal() {
        return Correlation::Discarded(DiscardReason::MinimalNoise);
    }

    let candidates: Vec<&JobSnapshot> = jobs.iter().filter(|j| j.state.is_active()).collect();
    match candidates.as_slice() {
        [] => Correlation::Discarded(DiscardReason::NoActiveJobs),
        [only] => Correlation::Matched(only.id.clone()),
        several => {
            if msg.timestamp.is_none() {
                return Correlation::Discarded(DiscardReason::AmbiguousNoTimestamp);
            }
            let Some(most_recent) = several.iter().max_by_key(|j| j.last_progress_at) else {
                return Correlation::Discarded(DiscardReason::AmbiguousNoTimestamp);
            };
            let tied = several
                .iter()
                .filter(|j| j.last_progress_at == most_recent.last_progress_at)
                .count();
            if tied > 1 {
                return Correlation::Discarded(DiscardReason::TiedRecency);
            }
            Correlation::Matched(most_recent.id.clone())
        }
    }
}
