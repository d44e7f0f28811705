pub mod command;
pub mod config;
pub mod connection;
pub mod control;
pub mod detect;
pub mod error;
pub mod flyout;
pub mod logging;
pub mod mode;
pub mod surface;
pub mod switcher;
pub mod timer;
pub mod watch;

pub use config::Configuration;
pub use mode::{DetectionResult, DisplayMode};
