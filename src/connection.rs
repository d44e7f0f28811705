use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::command::{SharedRunner, display_args};
use crate::config::Configuration;
use crate::error::{DetectionError, Stage};

/// Contents of the JSON artifact written by the status-refresh helper.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateRecord {
    #[serde(rename = "external-monitor-connected", default)]
    pub external_monitor_connected: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checked: Option<String>,
}

/// Answers "is an external display plugged in" by refreshing hardware state,
/// asking the status helper to persist it, then reading the persisted file.
#[derive(Clone)]
pub struct ConnectionDetector {
    runner: SharedRunner,
    hardware_refresh: Vec<String>,
    status_refresh: Vec<String>,
    state_file: PathBuf,
}

impl ConnectionDetector {
    pub fn new(
        runner: SharedRunner,
        hardware_refresh: Vec<String>,
        status_refresh: Vec<String>,
        state_file: PathBuf,
    ) -> Self {
        Self {
            runner,
            hardware_refresh,
            status_refresh,
            state_file,
        }
    }

    pub fn from_config(runner: SharedRunner, cfg: &Configuration) -> Self {
        Self::new(
            runner,
            cfg.commands.hardware_refresh.clone(),
            cfg.commands.status_refresh.clone(),
            cfg.state_file.clone(),
        )
    }

    pub fn state_file(&self) -> &Path {
        &self.state_file
    }

    /// Always resolves; any stage failure is logged and reported as `false`.
    pub async fn detect(&self) -> bool {
        match self.probe().await {
            Ok(connected) => connected,
            Err(err) => {
                warn!(stage = %err.stage(), error = %error_chain(&err), "connection probe failed; assuming disconnected");
                false
            }
        }
    }

    #[instrument(skip(self), fields(state_file = %self.state_file.display()))]
    pub async fn probe(&self) -> Result<bool, DetectionError> {
        self.run_stage(Stage::HardwareRefresh, &self.hardware_refresh)
            .await?;
        self.run_stage(Stage::StatusRefresh, &self.status_refresh)
            .await?;
        debug!("state refresh finished; reading state file");

        let record = read_state(&self.state_file).await?;
        let connected = record
            .external_monitor_connected
            .ok_or_else(|| DetectionError::MissingField {
                path: self.state_file.clone(),
            })?;
        if connected {
            info!(connector = record.connector.as_deref().unwrap_or("<unknown>"), "external display connected");
        } else {
            debug!("no external display connected");
        }
        Ok(connected)
    }

    async fn run_stage(&self, stage: Stage, argv: &[String]) -> Result<(), DetectionError> {
        let output = self
            .runner
            .run(argv)
            .await
            .map_err(|source| DetectionError::Command { stage, source })?;
        // Refresh tools may exit non-zero without anything being wrong.
        if !output.success {
            debug!(
                %stage,
                command = %display_args(argv),
                code = output.exit_code,
                stderr = %output.stderr.trim(),
                "refresh command exited non-zero; continuing"
            );
        }
        Ok(())
    }
}

pub async fn read_state(path: &Path) -> Result<StateRecord, DetectionError> {
    let data = match tokio::fs::read(path).await {
        Ok(data) => data,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Err(DetectionError::StateMissing {
                path: path.to_path_buf(),
            });
        }
        Err(source) => {
            return Err(DetectionError::StateRead {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    serde_json::from_slice(&data).map_err(|source| DetectionError::StateParse {
        path: path.to_path_buf(),
        source,
    })
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}
