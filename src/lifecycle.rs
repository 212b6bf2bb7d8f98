use crate::job::JobState;
use crate::message::{StatusLabel, StatusMessage, PROGRESS_FINISHING, PROGRESS_PARTIAL, PROGRESS_SUCCESS};

/// Visual side effect the engine asks the control to render. Applying these
/// is the only way the engine touches the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEffect {
    /// "Preparing…", disabled.
    Preparing,
    /// Percent bar, clickable (pause).
    Progress(u8),
    /// "Finishing…".
    Finishing,
    /// Success styling.
    Success,
    /// Partial-success styling (some items of a set failed).
    PartialSuccess,
    /// "Paused", clickable (resume).
    Paused,
    /// "Resuming…", disabled.
    Resuming,
    /// Error styling with the worker's message, clickable (retry).
    Errored(String),
    /// Staleness warning; state is unchanged underneath.
    MayBeStuck,
    /// Back to the initial clickable appearance.
    Reset,
}

/// One transition decided by the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub next: JobState,
    pub effect: UiEffect,
}

impl Step {
    fn to(next: JobState, effect: UiEffect) -> Option<Step> {
        Some(Step { next, effect })
    }

    /// Did this step come from a message that advanced progress? Drives
    /// `last_progress_at` and clears the stall flag.
    pub fn advanced_progress(&self) -> bool {
        matches!(
            self.effect,
            UiEffect::Progress(_) | UiEffect::Finishing | UiEffect::Success | UiEffect::PartialSuccess
        )
    }
}

/// Pure transition function: (current state, message) → step, or `None` when
/// the message does not move this job.
///
/// Checks run in fixed priority order and the first match wins. Completion
/// sentinels outrank the status and error fields of the same message because
/// completion is irreversible; a stale `status` riding along must not undo
/// it. Messages reaching a terminal job are always a no-op, which is what
/// makes duplicate and late delivery harmless.
pub fn step(state: JobState, msg: &StatusMessage) -> Option<Step> {
    if state.is_terminal() {
        return None;
    }

    if let Some(p) = msg.effective_progress() {
        if p == PROGRESS_SUCCESS {
            return Step::to(JobState::Downloaded, UiEffect::Success);
        }
        if p == PROGRESS_PARTIAL {
            return Step::to(JobState::Downloaded, UiEffect::PartialSuccess);
        }
        if p == PROGRESS_FINISHING && state.may_enter_finishing() {
            return Step::to(JobState::Finishing, UiEffect::Finishing);
        }
        // Resuming is included: once percent updates flow again the transfer
        // is plainly running, and nothing else would ever take the job back
        // to Downloading
        if (0..PROGRESS_FINISHING).contains(&p)
            && matches!(
                state,
                JobState::Preparing | JobState::Downloading | JobState::Resuming
            )
        {
            return Step::to(JobState::Downloading, UiEffect::Progress(p as u8));
        }
        if p == PROGRESS_FINISHING && state == JobState::Preparing {
            // first message ever seen already says 100: show it as percent,
            // the finishing sentinel only applies once transfer was visible
            return Step::to(JobState::Downloading, UiEffect::Progress(100));
        }
        // out-of-range progress carries no meaning on its own; fall through
        // so a status or error riding along can still apply
    }

    if state == JobState::Preparing && msg.is_minimal() {
        // bare ack: the worker accepted the command but has nothing to report
        return Step::to(JobState::Downloading, UiEffect::Progress(0));
    }

    match (msg.status_label(), state) {
        (Some(StatusLabel::Paused), JobState::Downloading)
        | (Some(StatusLabel::Paused), JobState::Pausing)
        | (Some(StatusLabel::Paused), JobState::Resuming) => {
            return Step::to(JobState::Paused, UiEffect::Paused);
        }
        (Some(StatusLabel::Resuming), JobState::Paused) => {
            return Step::to(JobState::Resuming, UiEffect::Resuming);
        }
        _ => {}
    }

    if let Some(error) = &msg.error {
        return Step::to(JobState::Error, UiEffect::Errored(error.clone()));
    }

    None
}
