use chrono::Utc;

use crate::error::DispatchError;
use crate::job::{DownloadRequest, JobKind};
use crate::message::{CommandMessage, CommandType};

/// The placeholder some hosts put where an id should be. As unsendable as an
/// empty string: the worker would echo it back and nothing could correlate.
pub const UNSET_ID: &str = "undefined";

/// Every command must carry an id the worker can echo back; without one the
/// job could never be correlated, so refuse before anything hits the wire.
pub fn validate_id(id: &str) -> Result<(), DispatchError> {
    if id.trim().is_empty() || id == UNSET_ID {
        return Err(DispatchError::MissingIdentifier);
    }
    Ok(())
}

pub fn start_command(
    kind: JobKind,
    id: &str,
    request: &DownloadRequest,
) -> Result<CommandMessage, DispatchError> {
    validate_id(id)?;
    let command = match kind {
        JobKind::Single => CommandType::Start,
        JobKind::Set => CommandType::StartSet,
        JobKind::SetRange => CommandType::StartSetRange,
    };
    Ok(CommandMessage {
        command,
        id: id.to_string(),
        url: Some(request.url.clone()),
        range_start: request.range_start,
        range_end: request.range_end,
        timestamp: Utc::now(),
    })
}

pub fn pause_command(id: &str) -> Result<CommandMessage, DispatchError> {
    bare_command(CommandType::Pause, id)
}

pub fn resume_command(id: &str) -> Result<CommandMessage, DispatchError> {
    bare_command(CommandType::Resume, id)
}

fn bare_command(command: CommandType, id: &str) -> Result<CommandMessage, DispatchError> {
    validate_id(id)?;
    Ok(CommandMessage {
        command,
        id: id.to_string(),
        url: None,
        range_start: None,
        range_end: None,
        timestamp: Utc::now(),
    })
}
