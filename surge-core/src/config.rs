use std::time::Duration;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage {
    pub duration: Duration,
    pub target: u64,
}

impl Stage {
    pub fn new(duration: Duration, target: u64) -> Self {
        Self { duration, target }
    }
}

/// One-time health probe run before any VU starts.
#[derive(Debug, Clone)]
pub struct SetupCheck {
    pub url: String,
    pub expected_status: u16,
    pub timeout: Duration,
}

impl SetupCheck {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            expected_status: 200,
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub stages: Vec<Stage>,

    /// How often the coordinator re-reads the stage schedule.
    pub scheduler_tick: Duration,

    /// Interval for continuous thresholds.
    pub threshold_interval: Duration,

    /// Interval for progress callbacks.
    pub progress_interval: Duration,

    /// How long VUs may keep draining after the last stage before they are aborted.
    pub graceful_stop: Duration,

    pub setup: Option<SetupCheck>,

    /// Seed for pacing, probabilities and weighted picks. Each VU derives its own stream.
    pub seed: Option<u64>,

    /// TCP connect timeout for the shared HTTP client.
    pub connect_timeout: Option<Duration>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            stages: Vec::new(),
            scheduler_tick: Duration::from_millis(50),
            threshold_interval: Duration::from_secs(2),
            progress_interval: Duration::from_secs(1),
            graceful_stop: Duration::from_secs(30),
            setup: None,
            seed: None,
            connect_timeout: Some(Duration::from_secs(3)),
        }
    }
}

impl RunOptions {
    pub fn with_stages(stages: Vec<Stage>) -> Self {
        Self {
            stages,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_stages(&self.stages)?;

        if self.scheduler_tick.is_zero() {
            return Err(Error::Config("`scheduler_tick` must be positive".to_string()));
        }
        if self.threshold_interval.is_zero() {
            return Err(Error::Config(
                "`threshold_interval` must be positive".to_string(),
            ));
        }
        if self.progress_interval.is_zero() {
            return Err(Error::Config(
                "`progress_interval` must be positive".to_string(),
            ));
        }
        if let Some(setup) = &self.setup
            && setup.url.trim().is_empty()
        {
            return Err(Error::Config("`setup.url` must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn total_duration(&self) -> Duration {
        self.stages
            .iter()
            .fold(Duration::ZERO, |acc, s| acc.saturating_add(s.duration))
    }

    pub fn max_target(&self) -> u64 {
        self.stages.iter().map(|s| s.target).max().unwrap_or(0)
    }
}

pub fn validate_stages(stages: &[Stage]) -> Result<()> {
    if stages.is_empty() {
        return Err(Error::EmptyStages);
    }
    if let Some(index) = stages.iter().position(|s| s.duration.is_zero()) {
        return Err(Error::ZeroStageDuration { index });
    }
    Ok(())
}
