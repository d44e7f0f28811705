use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ModeError;

/// Display arrangement understood by the external apply and detect commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DisplayMode {
    #[serde(rename = "internal")]
    Internal,
    #[serde(rename = "external")]
    External,
    #[serde(rename = "join")]
    Extended,
    #[serde(rename = "mirror")]
    Mirror,
}

impl DisplayMode {
    /// Flyout order, also the order the keybinding cycles through.
    pub const ORDER: [DisplayMode; 4] = [
        DisplayMode::Internal,
        DisplayMode::Mirror,
        DisplayMode::Extended,
        DisplayMode::External,
    ];

    /// Name passed to and read back from the external commands.
    pub fn external_name(self) -> &'static str {
        match self {
            DisplayMode::Internal => "internal",
            DisplayMode::External => "external",
            DisplayMode::Extended => "join",
            DisplayMode::Mirror => "mirror",
        }
    }

    /// Exact, case-sensitive match against the four external names.
    pub fn from_external(name: &str) -> Option<Self> {
        Self::ORDER
            .into_iter()
            .find(|mode| mode.external_name() == name)
    }

    pub fn label(self) -> &'static str {
        match self {
            DisplayMode::Internal => "Internal only",
            DisplayMode::External => "External only",
            DisplayMode::Extended => "Extended",
            DisplayMode::Mirror => "Mirror",
        }
    }

    /// Index of this mode in [`DisplayMode::ORDER`].
    pub fn position(self) -> usize {
        match self {
            DisplayMode::Internal => 0,
            DisplayMode::Mirror => 1,
            DisplayMode::Extended => 2,
            DisplayMode::External => 3,
        }
    }
}

impl fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.external_name())
    }
}

impl FromStr for DisplayMode {
    type Err = ModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_external(s).ok_or_else(|| ModeError::Unknown(s.to_string()))
    }
}

/// Outcome of one run of the mode detection command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionResult {
    Mode(DisplayMode),
    Unknown,
}

impl DetectionResult {
    pub fn mode(self) -> Option<DisplayMode> {
        match self {
            DetectionResult::Mode(mode) => Some(mode),
            DetectionResult::Unknown => None,
        }
    }

    /// Interpret detection stdout: trimmed, exact external name or nothing.
    pub fn from_stdout(stdout: &str) -> Self {
        match DisplayMode::from_external(stdout.trim()) {
            Some(mode) => DetectionResult::Mode(mode),
            None => DetectionResult::Unknown,
        }
    }
}

impl fmt::Display for DetectionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectionResult::Mode(mode) => mode.fmt(f),
            DetectionResult::Unknown => f.write_str("unknown"),
        }
    }
}
