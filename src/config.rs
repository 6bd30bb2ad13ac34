//! Global configuration constants and integrator settings.

use serde::{Deserialize, Serialize};

use crate::error::{ConfigurationError, Result};

/// Standard gravitational acceleration (m/s²).
pub const DEFAULT_GRAVITY: f64 = 9.81;

/// Default relative and absolute integration tolerance.
pub const DEFAULT_TOLERANCE: f64 = 1e-10;

/// Default output sampling rate (samples per second).
pub const DEFAULT_FRAME_RATE: f64 = 30.0;

/// Step budget for a single integration run.
pub const DEFAULT_MAX_STEPS: usize = 500_000;

/// Smallest/largest singular value ratio below which the augmented
/// mass/constraint system is treated as singular.
pub const SINGULARITY_THRESHOLD: f64 = 1e-12;

/// Cut-off passed to SVD-based least-squares solves.
pub const SINGULAR_VALUE_EPSILON: f64 = 1e-14;

/// Largest constraint residual accepted in an initial state.
pub const CONSTRAINT_TOLERANCE: f64 = 1e-9;

/// Gauss-Newton iterations allowed when projecting onto the constraints.
pub const PROJECTION_MAX_ITERATIONS: usize = 50;

/// Step-size controls for the adaptive integrator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegratorConfig {
    pub rtol: f64,
    pub atol: f64,
    pub max_steps: usize,
    /// Smallest step accepted before reporting failure.
    pub min_step: f64,
    /// Upper bound on any internal step; `None` means unbounded.
    pub max_step: Option<f64>,
    /// First trial step; `None` selects one from the initial derivative.
    pub initial_step: Option<f64>,
    pub safety: f64,
}

impl Default for IntegratorConfig {
    fn default() -> Self {
        Self {
            rtol: DEFAULT_TOLERANCE,
            atol: DEFAULT_TOLERANCE,
            max_steps: DEFAULT_MAX_STEPS,
            min_step: 1e-14,
            max_step: None,
            initial_step: None,
            safety: 0.9,
        }
    }
}

impl IntegratorConfig {
    pub fn with_tolerances(mut self, rtol: f64, atol: f64) -> Self {
        self.rtol = rtol;
        self.atol = atol;
        self
    }

    pub fn with_max_step(mut self, max_step: f64) -> Self {
        self.max_step = Some(max_step);
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn validate(&self) -> Result<()> {
        let positive = |v: f64| v.is_finite() && v > 0.0;
        if !positive(self.rtol) || !positive(self.atol) {
            return Err(ConfigurationError::InvalidSetting(format!(
                "tolerances must be positive (rtol {}, atol {})",
                self.rtol, self.atol
            ))
            .into());
        }
        if !positive(self.min_step) || self.max_step.is_some_and(|h| !positive(h)) {
            return Err(
                ConfigurationError::InvalidSetting("step bounds must be positive".into()).into(),
            );
        }
        if !(self.safety > 0.0 && self.safety <= 1.0) {
            return Err(ConfigurationError::InvalidSetting(format!(
                "safety factor {} outside (0, 1]",
                self.safety
            ))
            .into());
        }
        if self.max_steps == 0 {
            return Err(ConfigurationError::InvalidSetting("max_steps is zero".into()).into());
        }
        Ok(())
    }
}
