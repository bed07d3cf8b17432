//! Console logging for dbpsql
//!
//! Events go to stderr so command output on stdout stays clean. `RUST_LOG`
//! wins when set; otherwise the level is `info`, or `debug` with `--debug`.
//! `RUST_LOG=dbpsql_core=debug` shows every compiled statement.

use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Default)]
pub struct TracingConfig {
    /// Fallback level becomes `debug` when `RUST_LOG` is unset.
    pub debug: bool,
}

impl TracingConfig {
    fn fallback_level(&self) -> &'static str {
        if self.debug {
            "debug"
        } else {
            "info"
        }
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init(config: &TracingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.fallback_level()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.debug)
        .with_writer(std::io::stderr)
        .compact()
        .try_init()
        .map_err(|err| anyhow!(err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_level_follows_debug_flag() {
        assert_eq!(TracingConfig::default().fallback_level(), "info");
        assert_eq!(TracingConfig { debug: true }.fallback_level(), "debug");
    }
}
