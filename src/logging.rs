use anyhow::{Context, Result, anyhow};
use tracing::Level;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{EnvFilter, fmt};

/// Map the `-v` count to this crate's log level.
pub fn level_for(verbosity: u8) -> Level {
    match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Install the global subscriber. `RUST_LOG` directives are kept; the crate
/// level from `-v` is added on top. Output goes to stderr so one-shot
/// subcommands keep stdout for their answer.
pub fn init(verbosity: u8) -> Result<()> {
    let directive = format!("display_switcher={}", level_for(verbosity))
        .parse::<Directive>()
        .context("invalid log directive")?;
    let filter = EnvFilter::from_default_env().add_directive(directive);
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow!("failed to install tracing subscriber: {err}"))
}

#[cfg(test)]
mod tests {
    use super::level_for;
    use tracing::Level;

    #[test]
    fn verbosity_maps_to_levels() {
        assert_eq!(level_for(0), Level::INFO);
        assert_eq!(level_for(1), Level::DEBUG);
        assert_eq!(level_for(7), Level::TRACE);
    }
}
