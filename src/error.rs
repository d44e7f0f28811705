use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Failure to start or wait on an external command.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("command line is empty")]
    EmptyArgv,

    #[error("failed to spawn `{argv}`")]
    Spawn {
        argv: String,
        #[source]
        source: std::io::Error,
    },
}

/// Pipeline stage of the connection probe, used to tag failures in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    HardwareRefresh,
    StatusRefresh,
    StateRead,
    StateParse,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::HardwareRefresh => "hardware-refresh",
            Stage::StatusRefresh => "status-refresh",
            Stage::StateRead => "state-read",
            Stage::StateParse => "state-parse",
        })
    }
}

/// Why a connection probe could not produce an answer.
///
/// Public detection entry points fold every variant into "disconnected";
/// the typed error exists so callers and tests can see which stage failed.
#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("{stage} command failed")]
    Command {
        stage: Stage,
        #[source]
        source: CommandError,
    },

    #[error("state file {} does not exist", path.display())]
    StateMissing { path: PathBuf },

    #[error("failed to read state file {}", path.display())]
    StateRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse state file {}", path.display())]
    StateParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("state file {} has no external-monitor-connected field", path.display())]
    MissingField { path: PathBuf },
}

impl DetectionError {
    pub fn stage(&self) -> Stage {
        match self {
            DetectionError::Command { stage, .. } => *stage,
            DetectionError::StateMissing { .. } | DetectionError::StateRead { .. } => {
                Stage::StateRead
            }
            DetectionError::StateParse { .. } | DetectionError::MissingField { .. } => {
                Stage::StateParse
            }
        }
    }
}

/// A mode name outside the four known ones reached the core.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModeError {
    #[error("unknown display mode `{0}`")]
    Unknown(String),
}

/// Failure of a by-name mode switch.
#[derive(Debug, Error)]
pub enum SwitchError {
    #[error(transparent)]
    Mode(#[from] ModeError),

    #[error(transparent)]
    Command(#[from] CommandError),
}
