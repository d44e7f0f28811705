use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use serde::Deserialize;
use tracing::info;

use crate::surface::Bounds;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct Configuration {
    /// Whether the status toggle is shown in the system menu at all.
    pub show_status_toggle: bool,
    pub commands: Commands,
    /// JSON artifact written by the status-refresh command.
    pub state_file: PathBuf,
    /// Path watched for hardware change notifications.
    pub change_path: PathBuf,
    pub control_socket_path: PathBuf,
    /// Where the flyout is drawn, for telling presses outside it apart.
    pub flyout_bounds: Option<Bounds>,
    pub timings: Timings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct Commands {
    pub hardware_refresh: Vec<String>,
    pub status_refresh: Vec<String>,
    pub detect_mode: Vec<String>,
    /// The mode's external name is appended as the single positional argument.
    pub apply_mode: Vec<String>,
    /// Title and body are appended.
    pub notify: Vec<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct Timings {
    #[serde(with = "humantime_serde")]
    pub detect_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub inactivity: Duration,
    #[serde(with = "humantime_serde")]
    pub auto_apply: Duration,
    #[serde(with = "humantime_serde")]
    pub entrance: Duration,
    #[serde(with = "humantime_serde")]
    pub exit: Duration,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            show_status_toggle: true,
            commands: Commands::default(),
            state_file: Self::default_state_file(),
            change_path: PathBuf::from("/opt/hdmi-events"),
            control_socket_path: Self::default_control_socket_path(),
            flyout_bounds: None,
            timings: Timings::default(),
        }
    }
}

impl Default for Commands {
    fn default() -> Self {
        Self {
            hardware_refresh: argv(&["xrandr", "--query"]),
            status_refresh: argv(&["hdmi-control-service", "--now"]),
            detect_mode: argv(&["detect-display-mode"]),
            apply_mode: argv(&["hdmi-switch"]),
            notify: argv(&["notify-send", "--icon=video-display-symbolic"]),
        }
    }
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            detect_timeout: Duration::from_millis(2000),
            inactivity: Duration::from_secs(5),
            auto_apply: Duration::from_secs(2),
            entrance: Duration::from_millis(200),
            exit: Duration::from_millis(150),
        }
    }
}

impl Configuration {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&s)?)
    }

    /// Load `path`, or the per-user default location; a missing default file
    /// yields the built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let cfg = match path {
            Some(path) => Self::from_yaml_file(path)
                .with_context(|| format!("failed to load configuration from {}", path.display()))?,
            None => {
                let default = Self::default_config_file();
                if default.exists() {
                    Self::from_yaml_file(&default).with_context(|| {
                        format!("failed to load configuration from {}", default.display())
                    })?
                } else {
                    info!(path = %default.display(), "no configuration file; using defaults");
                    Self::default()
                }
            }
        };
        cfg.validated().context("invalid configuration values")
    }

    pub fn validated(self) -> Result<Self> {
        let commands = &self.commands;
        for (name, argv) in [
            ("hardware-refresh", &commands.hardware_refresh),
            ("status-refresh", &commands.status_refresh),
            ("detect-mode", &commands.detect_mode),
            ("apply-mode", &commands.apply_mode),
            ("notify", &commands.notify),
        ] {
            ensure!(
                argv.first().is_some_and(|program| !program.trim().is_empty()),
                "commands.{name} must name a program"
            );
        }
        ensure!(
            self.state_file.file_name().is_some(),
            "state-file must include a file name"
        );
        ensure!(
            self.control_socket_path.file_name().is_some(),
            "control-socket-path must include a socket file name"
        );
        if let Some(bounds) = &self.flyout_bounds {
            ensure!(
                bounds.width > 0.0 && bounds.height > 0.0,
                "flyout-bounds must have a positive width and height"
            );
        }
        let t = &self.timings;
        for (name, value) in [
            ("detect-timeout", t.detect_timeout),
            ("inactivity", t.inactivity),
            ("auto-apply", t.auto_apply),
        ] {
            ensure!(!value.is_zero(), "timings.{name} must be greater than zero");
        }
        Ok(self)
    }

    pub fn default_config_file() -> PathBuf {
        user_config_dir()
            .join("display-switcher")
            .join("config.yaml")
    }

    /// `<user-config-dir>/hdmi-control/state.json`
    pub fn default_state_file() -> PathBuf {
        user_config_dir().join("hdmi-control").join("state.json")
    }

    fn default_control_socket_path() -> PathBuf {
        dirs::runtime_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("display-switcher.sock")
    }
}

fn user_config_dir() -> PathBuf {
    dirs::config_dir().unwrap_or_else(|| PathBuf::from(".config"))
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}
