//! Controller configuration

use crate::{Error, FailoverMode, PrimarySite, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Trigger thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thresholds {
    /// EWMA ceiling in milliseconds before the drift predicate holds
    pub ewma_max_ms: f64,

    /// Minimum latency slope (ms per sample position, reported as ms/s)
    pub slope_min_ms_per_s: f64,

    /// How long the drift predicate must hold before firing, in seconds
    pub hold_secs: f64,

    /// CPU utilisation ceiling in [0, 1]
    pub cpu_max: f64,

    /// Buffer fill ceiling in [0, 1]
    pub buffer_max_pct: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            ewma_max_ms: 100.0,
            slope_min_ms_per_s: 5.0,
            hold_secs: 3.0,
            cpu_max: 0.85,
            buffer_max_pct: 0.8,
        }
    }
}

/// Controller configuration.
///
/// Thresholds, smoothing, and the state-machine timers are static at
/// startup; the failover mode and primary site are runtime-mutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    pub thresholds: Thresholds,

    /// EWMA smoothing factor in (0, 1]
    pub alpha: f64,

    /// Latency window size in samples
    pub window: usize,

    /// Minimum time in degraded before a path may start recovering
    pub hold_recovery: Duration,

    /// Minimum time in recovering before a path may return to healthy
    pub stability: Duration,

    /// Wall-clock span over which a gradual revert plays out
    pub transition_duration: Duration,

    /// Number of interpolation steps in a gradual revert
    pub revert_steps: usize,

    /// How the gateway reacts when the trigger fires
    pub failover_mode: FailoverMode,

    /// Preferred primary sink
    pub primary: PrimarySite,

    /// How many ranked paths the dispatcher samples across
    pub dispatch_candidates: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::default(),
            alpha: 0.3,
            window: 10,
            hold_recovery: Duration::from_secs(20),
            stability: Duration::from_secs(15),
            transition_duration: Duration::from_secs(7),
            revert_steps: 5,
            failover_mode: FailoverMode::Predictive,
            primary: PrimarySite::Edge,
            dispatch_candidates: 3,
        }
    }
}

impl ControllerConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if !(self.alpha > 0.0 && self.alpha <= 1.0) {
            return Err(Error::config(format!(
                "alpha must be in (0, 1], got {}",
                self.alpha
            )));
        }
        if self.window == 0 {
            return Err(Error::config("window must be at least 1"));
        }
        if self.revert_steps == 0 {
            return Err(Error::config("revert_steps must be at least 1"));
        }
        if self.dispatch_candidates == 0 {
            return Err(Error::config("dispatch_candidates must be at least 1"));
        }
        if self.transition_duration.is_zero() {
            return Err(Error::config("transition_duration must be greater than 0"));
        }
        if self.hold_recovery.is_zero() {
            return Err(Error::config("hold_recovery must be greater than 0"));
        }
        if self.stability.is_zero() {
            return Err(Error::config("stability must be greater than 0"));
        }
        if self.thresholds.ewma_max_ms <= 0.0 {
            return Err(Error::config("ewma_max_ms must be greater than 0"));
        }
        if self.thresholds.hold_secs < 0.0 {
            return Err(Error::config("hold_secs must not be negative"));
        }
        if !(0.0..=1.0).contains(&self.thresholds.cpu_max) {
            return Err(Error::config("cpu_max must be in [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.thresholds.buffer_max_pct) {
            return Err(Error::config("buffer_max_pct must be in [0, 1]"));
        }
        Ok(())
    }

    /// Hold window for the latency-drift debounce
    pub fn hold_duration(&self) -> Duration {
        Duration::from_secs_f64(self.thresholds.hold_secs)
    }
}

/// Builder for ControllerConfig
pub struct ControllerConfigBuilder {
    config: ControllerConfig,
}

impl ControllerConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: ControllerConfig::default(),
        }
    }

    /// Set the EWMA ceiling in milliseconds
    pub fn ewma_max_ms(mut self, v: f64) -> Self {
        self.config.thresholds.ewma_max_ms = v;
        self
    }

    /// Set the minimum slope threshold
    pub fn slope_min(mut self, v: f64) -> Self {
        self.config.thresholds.slope_min_ms_per_s = v;
        self
    }

    /// Set the drift hold time in seconds
    pub fn hold_secs(mut self, v: f64) -> Self {
        self.config.thresholds.hold_secs = v;
        self
    }

    /// Set the CPU pressure ceiling
    pub fn cpu_max(mut self, v: f64) -> Self {
        self.config.thresholds.cpu_max = v;
        self
    }

    /// Set the buffer pressure ceiling
    pub fn buffer_max_pct(mut self, v: f64) -> Self {
        self.config.thresholds.buffer_max_pct = v;
        self
    }

    /// Set the EWMA smoothing factor
    pub fn alpha(mut self, v: f64) -> Self {
        self.config.alpha = v;
        self
    }

    /// Set the latency window size
    pub fn window(mut self, v: usize) -> Self {
        self.config.window = v;
        self
    }

    /// Set the degraded hold window
    pub fn hold_recovery(mut self, v: Duration) -> Self {
        self.config.hold_recovery = v;
        self
    }

    /// Set the recovering stability window
    pub fn stability(mut self, v: Duration) -> Self {
        self.config.stability = v;
        self
    }

    /// Set the gradual revert span
    pub fn transition_duration(mut self, v: Duration) -> Self {
        self.config.transition_duration = v;
        self
    }

    /// Set the number of revert steps
    pub fn revert_steps(mut self, v: usize) -> Self {
        self.config.revert_steps = v;
        self
    }

    /// Set the failover mode
    pub fn failover_mode(mut self, v: FailoverMode) -> Self {
        self.config.failover_mode = v;
        self
    }

    /// Set the primary site
    pub fn primary(mut self, v: PrimarySite) -> Self {
        self.config.primary = v;
        self
    }

    /// Build the configuration
    pub fn build(self) -> ControllerConfig {
        self.config
    }
}

impl Default for ControllerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
