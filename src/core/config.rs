use anyhow::{bail, Context, Result};
use std::time::Duration;

use super::duration::parse_duration;
use super::table::{Backend, SystemTable};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub const POLL_INTERVAL_ENV: &str = "PROCWATCH_POLL_INTERVAL";
pub const BACKEND_ENV: &str = "PROCWATCH_BACKEND";

/// Settings shared by every watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchConfig {
    pub poll_interval: Duration,
    pub backend: Backend,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            backend: Backend::default(),
        }
    }
}

impl WatchConfig {
    /// Defaults overridden by `PROCWATCH_POLL_INTERVAL` and `PROCWATCH_BACKEND`.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(interval) = std::env::var(POLL_INTERVAL_ENV) {
            config = config.with_poll_interval(
                parse_duration(&interval)
                    .with_context(|| format!("Invalid {}: {}", POLL_INTERVAL_ENV, interval))?,
            )?;
        }

        if let Ok(backend) = std::env::var(BACKEND_ENV) {
            config.backend = backend
                .parse()
                .with_context(|| format!("Invalid {}", BACKEND_ENV))?;
        }

        Ok(config)
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Result<Self> {
        if interval.is_zero() {
            bail!("Poll interval must be greater than zero");
        }
        self.poll_interval = interval;
        Ok(self)
    }

    pub fn table(&self) -> SystemTable {
        SystemTable::new(self.backend)
    }
}
