use std::path::Path;

use config as cfg;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StressError};

/// Environment prefix for configuration overrides, e.g. `SPLITREF__PRODUCERS=4`.
pub const ENV_PREFIX: &str = "SPLITREF";

/// Shape of one stress run: how many threads push and pop, how much, and
/// how consumers back off when they find the queue empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StressConfig {
    pub producers: usize,
    pub consumers: usize,
    /// Each producer pushes a disjoint range of this many integers.
    pub items_per_producer: u64,
    /// Sleep between two pushes of the same producer.
    pub producer_pause_ms: u64,
    /// Sleep after a consumer pops from an empty queue. Zero yields instead.
    pub consumer_backoff_ms: u64,
    /// Randomize each backoff sleep within `0..=consumer_backoff_ms`.
    pub backoff_jitter: bool,
    pub rounds: u32,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            producers: 2,
            consumers: 2,
            items_per_producer: 1000,
            producer_pause_ms: 0,
            consumer_backoff_ms: 5,
            backoff_jitter: false,
            rounds: 1,
        }
    }
}

impl StressConfig {
    /// Layered load: defaults, then the optional TOML file, then
    /// `SPLITREF__*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_from_sources(path, ENV_PREFIX)
    }

    pub fn load_from_sources(path: Option<&Path>, env_prefix: &str) -> Result<Self> {
        let mut builder = cfg::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(
                cfg::File::from(path)
                    .format(cfg::FileFormat::Toml)
                    .required(true),
            );
        }
        builder = builder.add_source(
            cfg::Environment::with_prefix(env_prefix)
                .separator("__")
                .try_parsing(true),
        );

        let config: StressConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.producers == 0 {
            return Err(StressError::InvalidConfig(
                "at least one producer is required".into(),
            ));
        }
        if self.consumers == 0 {
            return Err(StressError::InvalidConfig(
                "at least one consumer is required".into(),
            ));
        }
        if self.rounds == 0 {
            return Err(StressError::InvalidConfig(
                "rounds must be at least 1".into(),
            ));
        }
        if self
            .items_per_producer
            .checked_mul(self.producers as u64)
            .is_none()
        {
            return Err(StressError::InvalidConfig(format!(
                "{} producers x {} items overflows the value range",
                self.producers, self.items_per_producer
            )));
        }
        Ok(())
    }

    pub fn total_items(&self) -> u64 {
        self.items_per_producer * self.producers as u64
    }

    /// Values producer `index` pushes.
    pub fn producer_range(&self, index: usize) -> std::ops::Range<u64> {
        let start = index as u64 * self.items_per_producer;
        start..start + self.items_per_producer
    }

    /// Pops consumer `index` performs. The remainder of an uneven split goes
    /// to the lowest-numbered consumers.
    pub fn consumer_quota(&self, index: usize) -> u64 {
        let consumers = self.consumers as u64;
        let base = self.total_items() / consumers;
        let extra = u64::from((index as u64) < self.total_items() % consumers);
        base + extra
    }
}
