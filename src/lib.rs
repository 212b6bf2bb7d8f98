pub mod channel;
pub mod config;
pub mod control;
pub mod correlate;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod job;
pub mod lifecycle;
pub mod message;
pub mod registry;
pub mod watchdog;

pub use channel::ChannelAdapter;
pub use config::EngineConfig;
pub use control::Control;
pub use engine::{Engine, EngineHandle};
pub use job::{DownloadRequest, JobKind, JobState};
pub use lifecycle::UiEffect;
