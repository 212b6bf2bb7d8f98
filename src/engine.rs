use std::sync::Arc;

use anyhow::{anyhow, Result};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::channel::ChannelAdapter;
use crate::config::EngineConfig;
use crate::control::Control;
use crate::correlate::{correlate, Correlation};
use crate::dispatch;
use crate::error::{ChannelError, DispatchError};
use crate::job::{DownloadRequest, Job, JobKind, JobState};
use crate::lifecycle::{self, Step, UiEffect};
use crate::message::{CommandMessage, StatusMessage};
use crate::registry::JobRegistry;
use crate::watchdog::{self, SweepAction};

/// User-intent events, sent by [`EngineHandle`]s.
#[derive(Debug)]
enum EngineEvent {
    Start {
        kind: JobKind,
        request: DownloadRequest,
        control: Arc<dyn Control>,
        reply: oneshot::Sender<Result<String, DispatchError>>,
    },
    PauseOrResume {
        id: String,
        reply: oneshot::Sender<Result<(), DispatchError>>,
    },
    QueryState {
        id: String,
        reply: oneshot::Sender<Option<JobState>>,
    },
    Shutdown,
}

/// Events the engine posts to itself from spawned send tasks and timers.
/// They travel on a separate inbox so that closing the public one (all
/// handles dropped) still ends the loop cleanly.
#[derive(Debug)]
pub(crate) enum InternalEvent {
    SendResult {
        id: String,
        result: Result<StatusMessage, ChannelError>,
    },
    PrepareTimedOut { id: String },
    CooldownElapsed { id: String },
}

/// Cloneable public API of the engine actor.
#[derive(Clone, Debug)]
pub struct EngineHandle {
    tx: mpsc::UnboundedSender<EngineEvent>,
}

impl EngineHandle {
    /// Begin a single-item download. Returns the new job id; the control
    /// immediately shows "Preparing…".
    pub async fn start(&self, request: DownloadRequest, control: Arc<dyn Control>) -> Result<String> {
        self.start_kind(JobKind::Single, request, control).await
    }

    /// Begin a whole-set download.
    pub async fn start_set(&self, request: DownloadRequest, control: Arc<dyn Control>) -> Result<String> {
        self.start_kind(JobKind::Set, request, control).await
    }

    /// Begin a set download bounded by `request.range_start..range_end`.
    pub async fn start_set_range(
        &self,
        request: DownloadRequest,
        control: Arc<dyn Control>,
    ) -> Result<String> {
        self.start_kind(JobKind::SetRange, request, control).await
    }

    async fn start_kind(
        &self,
        kind: JobKind,
        request: DownloadRequest,
        control: Arc<dyn Control>,
    ) -> Result<String> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(EngineEvent::Start { kind, request, control, reply })
            .map_err(|_| anyhow!("engine is gone"))?;
        Ok(rx.await.map_err(|_| anyhow!("engine dropped the reply"))??)
    }

    /// Toggle a job: pause it while downloading/resuming, resume it while
    /// paused, no-op otherwise.
    pub async fn pause_or_resume(&self, id: &str) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(EngineEvent::PauseOrResume { id: id.to_string(), reply })
            .map_err(|_| anyhow!("engine is gone"))?;
        Ok(rx.await.map_err(|_| anyhow!("engine dropped the reply"))??)
    }

    /// Current lifecycle state of a job; `None` means idle (not tracked).
    pub async fn job_state(&self, id: &str) -> Result<Option<JobState>> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(EngineEvent::QueryState { id: id.to_string(), reply })
            .map_err(|_| anyhow!("engine is gone"))?;
        rx.await.map_err(|_| anyhow!("engine dropped the reply"))
    }

    /// Explicit teardown; dropping every handle has the same effect.
    pub fn shutdown(&self) {
        let _ = self.tx.send(EngineEvent::Shutdown);
    }
}

/// The reconciliation engine. One task owns the registry and applies every
/// mutation; handles, timers and send tasks only post events into it, so all
/// sequencing comes from the loop's run-to-completion handling (no locks).
pub struct Engine {
    config: EngineConfig,
    adapter: Arc<dyn ChannelAdapter>,
    registry: JobRegistry,
    cmd_rx: mpsc::UnboundedReceiver<EngineEvent>,
    internal_rx: mpsc::UnboundedReceiver<InternalEvent>,
    internal_tx: mpsc::UnboundedSender<InternalEvent>,
    status_rx: broadcast::Receiver<StatusMessage>,
    status_open: bool,
}

impl Engine {
    /// Spawn the engine task and return its handle.
    pub fn spawn(adapter: Arc<dyn ChannelAdapter>, config: EngineConfig) -> EngineHandle {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let status_rx = adapter.subscribe();
        let engine = Engine {
            config,
            adapter,
            registry: JobRegistry::new(),
            cmd_rx,
            internal_rx,
            internal_tx,
            status_rx,
            status_open: true,
        };
        tokio::spawn(engine.run());
        EngineHandle { tx: cmd_tx }
    }

    async fn run(mut self) {
        info!(channel = %self.adapter.name(), "download engine started");
        let mut sweep = interval(self.config.sweep_interval());
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick of an interval completes immediately
        sweep.tick().await;

        loop {
            tokio::select! {
                maybe = self.cmd_rx.recv() => match maybe {
                    None | Some(EngineEvent::Shutdown) => break,
                    Some(event) => self.handle_command(event),
                },
                Some(event) = self.internal_rx.recv() => self.handle_internal(event),
                result = self.status_rx.recv(), if self.status_open => match result {
                    Ok(msg) => self.handle_status(msg),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "status subscription lagged; relying on the watchdog to catch up");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        warn!("status channel closed; jobs can only finish via the watchdog now");
                        self.status_open = false;
                    }
                },
                _ = sweep.tick() => self.sweep(),
            }
        }
        debug!("download engine stopped");
    }

    fn handle_command(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Start { kind, request, control, reply } => {
                let _ = reply.send(self.start_job(kind, request, control));
            }
            EngineEvent::PauseOrResume { id, reply } => {
                let _ = reply.send(self.pause_or_resume(&id));
            }
            EngineEvent::QueryState { id, reply } => {
                let _ = reply.send(self.registry.get(&id).map(|j| j.state));
            }
            // handled by the run loop
            EngineEvent::Shutdown => {}
        }
    }

    fn start_job(
        &mut self,
        kind: JobKind,
        request: DownloadRequest,
        control: Arc<dyn Control>,
    ) -> Result<String, DispatchError> {
        // one non-terminal job per control: a second click while live is the
        // same job, not a new one
        let duplicate = self
            .registry
            .all_matching(|j| !j.state.is_terminal() && Arc::ptr_eq(&j.control, &control))
            .first()
            .map(|j| j.id.clone());
        if let Some(existing) = duplicate {
            warn!(id = %existing, "control already owns a live job; ignoring duplicate start");
            return Ok(existing);
        }

        // a retry during the terminal cool-down takes the control over: drop
        // the old record first so its cool-down timer is cancelled and its
        // pending Reset can never land on the new job's control
        let stale = self
            .registry
            .ids_matching(|j| j.state.is_terminal() && Arc::ptr_eq(&j.control, &control));
        for old in stale {
            self.registry.remove(&old);
            debug!(id = %old, "retry during cool-down; terminal job dropped");
        }

        let id = Uuid::new_v4().to_string();
        let command = dispatch::start_command(kind, &id, &request)?;

        let mut job = Job::new(id.clone(), kind, request, control);
        job.control.apply(&UiEffect::Preparing);
        let token = CancellationToken::new();
        job.timers.prepare = Some(token.clone());
        watchdog::spawn_deadline(
            self.config.prepare_timeout(),
            token,
            self.internal_tx.clone(),
            InternalEvent::PrepareTimedOut { id: id.clone() },
        );
        self.registry.create(job);

        self.send_in_background(id.clone(), command);
        debug!(id = %id, ?kind, "job created, command dispatched");
        Ok(id)
    }

    fn pause_or_resume(&mut self, id: &str) -> Result<(), DispatchError> {
        dispatch::validate_id(id)?;
        let (next, command, effect) = match self.registry.get(id).map(|j| j.state) {
            None => {
                debug!(%id, "pause/resume on an idle job is a no-op");
                return Ok(());
            }
            Some(JobState::Downloading) | Some(JobState::Resuming) => {
                (JobState::Pausing, dispatch::pause_command(id)?, None)
            }
            Some(JobState::Paused) => (
                JobState::Resuming,
                dispatch::resume_command(id)?,
                Some(UiEffect::Resuming),
            ),
            Some(state) => {
                debug!(%id, %state, "pause/resume is a no-op in this state");
                return Ok(());
            }
        };

        if let Some(job) = self.registry.get_mut(id) {
            job.timers.cancel_all();
            job.state = next;
            if let Some(effect) = &effect {
                job.control.apply(effect);
            }
        }
        self.send_in_background(id.to_string(), command);
        Ok(())
    }

    fn send_in_background(&self, id: String, command: CommandMessage) {
        let adapter = self.adapter.clone();
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = adapter.send_command(command).await;
            let _ = tx.send(InternalEvent::SendResult { id, result });
        });
    }

    fn handle_internal(&mut self, event: InternalEvent) {
        match event {
            InternalEvent::SendResult { id, result: Ok(mut ack) } => {
                // the ack is a direct response, so we know which job it
                // answers even when the transport stripped the identifier
                if ack.explicit_id().is_none() {
                    ack.original_id = Some(id);
                }
                self.handle_status(ack);
            }
            InternalEvent::SendResult { id, result: Err(err) } => {
                self.fail_job(&id, err);
            }
            InternalEvent::PrepareTimedOut { id } => {
                let still_preparing = self
                    .registry
                    .get(&id)
                    .map(|j| j.state == JobState::Preparing)
                    .unwrap_or(false);
                if still_preparing {
                    warn!(%id, "no ack before the prepare timeout; resetting control");
                    if let Some(job) = self.registry.remove(&id) {
                        job.control.apply(&UiEffect::Reset);
                    }
                }
            }
            InternalEvent::CooldownElapsed { id } => {
                let terminal = self
                    .registry
                    .get(&id)
                    .map(|j| j.state.is_terminal())
                    .unwrap_or(false);
                if terminal {
                    if let Some(job) = self.registry.remove(&id) {
                        job.control.apply(&UiEffect::Reset);
                        debug!(%id, "cool-down elapsed, control recycled");
                    }
                }
            }
        }
    }

    /// Route an inbound status message: correlate, step the state machine,
    /// apply the side effects. Late or duplicate messages land on terminal
    /// (or absent) jobs and fall out here as no-ops.
    fn handle_status(&mut self, msg: StatusMessage) {
        let snapshots = self.registry.snapshots();
        let id = match correlate(&msg, &snapshots) {
            Correlation::Matched(id) => id,
            Correlation::Discarded(reason) => {
                if reason.is_ambiguous() {
                    warn!(%reason, "discarding status message");
                } else {
                    debug!(%reason, "discarding status message");
                }
                return;
            }
        };

        let step = {
            let Some(job) = self.registry.get_mut(&id) else {
                debug!(%id, "status for an untracked job dropped");
                return;
            };
            if job.state.is_terminal() {
                debug!(%id, "late message for a terminal job ignored");
                return;
            }
            if let Some(secondary) = msg.secondary_id.as_deref() {
                job.bind_secondary(secondary);
            }
            lifecycle::step(job.state, &msg)
        };

        match step {
            Some(step) => self.apply_step(&id, step),
            None => debug!(%id, "message does not move this job"),
        }
    }

    /// Commit a transition: cancel superseded timers, mutate, render, arm
    /// whatever the new state needs.
    fn apply_step(&mut self, id: &str, step: Step) {
        let Some(job) = self.registry.get_mut(id) else {
            return;
        };
        debug!(%id, from = %job.state, to = %step.next, "transition");
        job.timers.cancel_all();
        job.state = step.next;
        if step.advanced_progress() {
            job.touch_progress();
        }
        job.control.apply(&step.effect);

        let cooldown = match step.next {
            JobState::Downloaded => Some(self.config.downloaded_cooldown()),
            JobState::Error => Some(self.config.error_cooldown()),
            _ => None,
        };
        if let Some(delay) = cooldown {
            let token = CancellationToken::new();
            job.timers.cooldown = Some(token.clone());
            watchdog::spawn_deadline(
                delay,
                token,
                self.internal_tx.clone(),
                InternalEvent::CooldownElapsed { id: id.to_string() },
            );
        }
    }

    fn fail_job(&mut self, id: &str, err: ChannelError) {
        let Some(job) = self.registry.get(id) else {
            return;
        };
        if job.state.is_terminal() {
            return;
        }
        warn!(%id, error = %err, "channel failure");
        self.apply_step(
            id,
            Step {
                next: JobState::Error,
                effect: UiEffect::Errored(err.to_string()),
            },
        );
    }

    /// Periodic staleness sweep over downloading jobs.
    fn sweep(&mut self) {
        let now = Instant::now();
        let ids = self.registry.ids_matching(|j| j.state == JobState::Downloading);
        for id in ids {
            let Some(job) = self.registry.get(&id) else {
                continue;
            };
            let idle = now.duration_since(job.last_progress_at);
            match watchdog::classify_idle(idle, &self.config) {
                SweepAction::Keep => {}
                SweepAction::FlagStall => {
                    if let Some(job) = self.registry.get_mut(&id) {
                        if !job.stall_flagged {
                            job.stall_flagged = true;
                            warn!(%id, idle_ms = idle.as_millis() as u64, "download looks stuck");
                            job.control.apply(&UiEffect::MayBeStuck);
                        }
                    }
                }
                SweepAction::AssumeDone => {
                    warn!(%id, idle_ms = idle.as_millis() as u64,
                        "idle past the recovery threshold; assuming silent completion");
                    self.apply_step(
                        &id,
                        Step {
                            next: JobState::Downloaded,
                            effect: UiEffect::Success,
                        },
                    );
                }
            }
        }
    }
}
