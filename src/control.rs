use std::fmt::Debug;
use std::sync::{Arc, Mutex};

use crate::lifecycle::UiEffect;

/// The user-facing control a job reports into. One control belongs to at
/// most one non-terminal job at a time, but controls are recycled: after a
/// terminal cool-down resets the job, the same handle can back a new one.
///
/// `apply` is called from the engine task and must not block.
pub trait Control: Send + Sync + Debug {
    fn apply(&self, effect: &UiEffect);
}

/// Test double that records every effect applied to it.
#[derive(Debug, Default)]
pub struct RecordingControl {
    effects: Mutex<Vec<UiEffect>>,
}

impl RecordingControl {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn effects(&self) -> Vec<UiEffect> {
        self.effects.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<UiEffect> {
        self.effects.lock().unwrap().last().cloned()
    }
}

impl Control for RecordingControl {
    fn apply(&self, effect: &UiEffect) {
        self.effects.lock().unwrap().push(effect.clone());
    }
}
