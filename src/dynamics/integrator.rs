//! Adaptive Dormand-Prince 5(4) integration sampled on a fixed output grid.

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::config::{IntegratorConfig, DEFAULT_FRAME_RATE};
use crate::error::{ConfigurationError, IntegrationError, Result};
use crate::utils::logging::{Stage, StageTimer};

/// Strictly increasing output times; the first entry is the initial time.
///
/// Serializes as a plain list of times and is validated again on the way in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct TimeGrid {
    times: Vec<f64>,
}

impl TimeGrid {
    pub fn new(times: Vec<f64>) -> Result<Self> {
        if times.is_empty() {
            return Err(ConfigurationError::InvalidTimeGrid("no output times".into()).into());
        }
        if let Some(t) = times.iter().find(|t| !t.is_finite()) {
            return Err(ConfigurationError::InvalidTimeGrid(format!("non-finite time {t}")).into());
        }
        if let Some(w) = times.windows(2).find(|w| w[1] <= w[0]) {
            return Err(ConfigurationError::InvalidTimeGrid(format!(
                "times not strictly increasing at {} -> {}",
                w[0], w[1]
            ))
            .into());
        }
        Ok(Self { times })
    }

    /// `start, start + 1/rate, ...` up to but excluding `end`.
    pub fn uniform(start: f64, end: f64, rate: f64) -> Result<Self> {
        if !(rate.is_finite() && rate > 0.0) {
            return Err(
                ConfigurationError::InvalidTimeGrid(format!("sample rate {rate} not positive"))
                    .into(),
            );
        }
        if !(end > start) {
            return Err(ConfigurationError::InvalidTimeGrid(format!(
                "end {end} not after start {start}"
            ))
            .into());
        }
        // Guard against the end point sneaking in through rounding.
        let count = ((end - start) * rate - 1e-9).ceil().max(1.0) as usize;
        Self::new((0..count).map(|i| start + i as f64 / rate).collect())
    }

    /// Grid at the default frame rate.
    pub fn frames(start: f64, end: f64) -> Result<Self> {
        Self::uniform(start, end, DEFAULT_FRAME_RATE)
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn start(&self) -> f64 {
        self.times[0]
    }

    pub fn end(&self) -> f64 {
        self.times[self.times.len() - 1]
    }
}

impl TryFrom<Vec<f64>> for TimeGrid {
    type Error = crate::error::Error;

    fn try_from(times: Vec<f64>) -> Result<Self> {
        Self::new(times)
    }
}

impl From<TimeGrid> for Vec<f64> {
    fn from(grid: TimeGrid) -> Self {
        grid.times
    }
}

/// Work done by one integration run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrationStats {
    pub accepted: usize,
    pub rejected: usize,
    pub evaluations: usize,
}

/// States sampled at every grid time, stored row-major.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    pub times: Vec<f64>,
    pub width: usize,
    pub data: Vec<f64>,
    pub stats: IntegrationStats,
}

impl Trajectory {
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn row(&self, index: usize) -> &[f64] {
        &self.data[index * self.width..(index + 1) * self.width]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> + '_ {
        self.data.chunks_exact(self.width.max(1))
    }

    pub fn last(&self) -> Option<&[f64]> {
        self.len().checked_sub(1).map(|i| self.row(i))
    }

    /// One state component over time.
    pub fn column(&self, index: usize) -> Vec<f64> {
        self.rows().map(|row| row[index]).collect()
    }

    /// Position history of coordinate `index` in declaration order.
    pub fn coordinate(&self, index: usize) -> Vec<f64> {
        self.column(2 * index)
    }

    /// Rate history of coordinate `index` in declaration order.
    pub fn rate(&self, index: usize) -> Vec<f64> {
        self.column(2 * index + 1)
    }
}

const C: [f64; 7] = [0.0, 1.0 / 5.0, 3.0 / 10.0, 4.0 / 5.0, 8.0 / 9.0, 1.0, 1.0];

const A: [[f64; 6]; 7] = [
    [0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [1.0 / 5.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [3.0 / 40.0, 9.0 / 40.0, 0.0, 0.0, 0.0, 0.0],
    [44.0 / 45.0, -56.0 / 15.0, 32.0 / 9.0, 0.0, 0.0, 0.0],
    [
        19372.0 / 6561.0,
        -25360.0 / 2187.0,
        64448.0 / 6561.0,
        -212.0 / 729.0,
        0.0,
        0.0,
    ],
    [
        9017.0 / 3168.0,
        -355.0 / 33.0,
        46732.0 / 5247.0,
        49.0 / 176.0,
        -5103.0 / 18656.0,
        0.0,
    ],
    [
        35.0 / 384.0,
        0.0,
        500.0 / 1113.0,
        125.0 / 192.0,
        -2187.0 / 6784.0,
        11.0 / 84.0,
    ],
];

/// Fifth-order minus fourth-order weights.
const E: [f64; 7] = [
    71.0 / 57600.0,
    0.0,
    -71.0 / 16695.0,
    71.0 / 1920.0,
    -17253.0 / 339200.0,
    22.0 / 525.0,
    -1.0 / 40.0,
];

/// PI step-size controller on the scaled error norm (target 1).
#[derive(Debug, Clone)]
struct StepController {
    alpha: f64,
    beta: f64,
    safety: f64,
    min_factor: f64,
    max_factor: f64,
    previous_error: f64,
}

impl StepController {
    fn new(safety: f64) -> Self {
        Self {
            alpha: 0.17,
            beta: 0.04,
            safety,
            min_factor: 0.2,
            max_factor: 5.0,
            previous_error: 1e-4,
        }
    }

    /// Returns `(accepted, step scale)`.
    fn adjust(&mut self, error: f64) -> (bool, f64) {
        if !error.is_finite() {
            return (false, self.min_factor);
        }
        if error <= 1.0 {
            let factor = if error == 0.0 {
                self.max_factor
            } else {
                (self.safety * error.powf(-self.alpha) * self.previous_error.powf(self.beta))
                    .clamp(self.min_factor, self.max_factor)
            };
            self.previous_error = error.max(1e-4);
            (true, factor)
        } else {
            let factor = (self.safety * error.powf(-self.alpha)).clamp(self.min_factor, 1.0);
            (false, factor)
        }
    }
}

fn error_norm(error: &[f64], start: &[f64], end: &[f64], config: &IntegratorConfig) -> f64 {
    if error.is_empty() {
        return 0.0;
    }
    let sum: f64 = error
        .iter()
        .zip(start.iter().zip(end))
        .map(|(e, (y0, y1))| {
            let scale = config.atol + config.rtol * y0.abs().max(y1.abs());
            (e / scale).powi(2)
        })
        .sum();
    (sum / error.len() as f64).sqrt()
}

fn check_finite(values: &[f64], time: f64) -> Result<()> {
    if values.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(IntegrationError::NonFinite { time }.into())
    }
}

struct Stepper<'a, F> {
    rhs: F,
    config: &'a IntegratorConfig,
    stats: IntegrationStats,
    stages: Vec<Vec<f64>>,
    scratch: Vec<f64>,
}

impl<'a, F> Stepper<'a, F>
where
    F: FnMut(f64, &[f64]) -> Result<Vec<f64>>,
{
    fn evaluate(&mut self, time: f64, state: &[f64]) -> Result<Vec<f64>> {
        self.stats.evaluations += 1;
        let derivative = (self.rhs)(time, state)?;
        if derivative.len() != state.len() {
            return Err(ConfigurationError::StateLength {
                expected: state.len(),
                got: derivative.len(),
            }
            .into());
        }
        check_finite(&derivative, time)?;
        Ok(derivative)
    }

    /// Hairer-Wanner starting step estimate.
    fn initial_step(&mut self, time: f64, state: &[f64], slope: &[f64], span: f64) -> Result<f64> {
        if let Some(step) = self.config.initial_step {
            return Ok(step.min(span));
        }
        let scale: Vec<f64> = state
            .iter()
            .map(|y| self.config.atol + self.config.rtol * y.abs())
            .collect();
        let rms = |v: &[f64]| -> f64 {
            if v.is_empty() {
                return 0.0;
            }
            (v.iter()
                .zip(&scale)
                .map(|(x, s)| (x / s).powi(2))
                .sum::<f64>()
                / v.len() as f64)
                .sqrt()
        };
        let d0 = rms(state);
        let d1 = rms(slope);
        let h0 = if d0 < 1e-5 || d1 < 1e-5 {
            1e-6
        } else {
            0.01 * d0 / d1
        };
        let h0 = h0.min(span);
        let probe: Vec<f64> = state.iter().zip(slope).map(|(y, f)| y + h0 * f).collect();
        let slope1 = self.evaluate(time + h0, &probe)?;
        let change: Vec<f64> = slope1.iter().zip(slope).map(|(a, b)| (a - b) / h0).collect();
        let d2 = rms(&change);
        let h1 = if d1.max(d2) <= 1e-15 {
            (h0 * 1e-3).max(1e-6)
        } else {
            (0.01 / d1.max(d2)).powf(1.0 / 5.0)
        };
        Ok((100.0 * h0).min(h1).min(span))
    }

    /// One trial step from `(time, state)` with stage 1 slope `slope`.
    /// Returns the new state, its slope and the scaled error norm.
    fn attempt(
        &mut self,
        time: f64,
        state: &[f64],
        slope: &[f64],
        step: f64,
    ) -> Result<(Vec<f64>, Vec<f64>, f64)> {
        let n = state.len();
        self.stages.clear();
        self.stages.push(slope.to_vec());
        for stage in 1..7 {
            for i in 0..n {
                let increment: f64 = (0..stage).map(|j| A[stage][j] * self.stages[j][i]).sum();
                self.scratch[i] = state[i] + step * increment;
            }
            // Stage 7 is evaluated at the fifth-order solution itself.
            let probe = self.scratch.clone();
            match self.evaluate(time + C[stage] * step, &probe) {
                Ok(s) => self.stages.push(s),
                Err(e) if is_non_finite(&e) => return Ok((probe, Vec::new(), f64::INFINITY)),
                Err(e) => return Err(e),
            }
        }
        let next = self.scratch.clone();
        let error: Vec<f64> = (0..n)
            .map(|i| step * (0..7).map(|s| E[s] * self.stages[s][i]).sum::<f64>())
            .collect();
        let norm = error_norm(&error, state, &next, self.config);
        Ok((next, self.stages[6].clone(), norm))
    }
}

fn is_non_finite(error: &crate::error::Error) -> bool {
    matches!(
        error,
        crate::error::Error::Integration(IntegrationError::NonFinite { .. })
    )
}

/// Integrates `y' = rhs(t, y)` from `initial` at `grid.start()` and returns
/// the state at every grid time.
///
/// Internal steps are shortened so that each output time is hit exactly.
/// Any failure aborts the whole run; no partial trajectory is returned.
pub fn integrate<F>(
    rhs: F,
    initial: &[f64],
    grid: &TimeGrid,
    config: &IntegratorConfig,
) -> Result<Trajectory>
where
    F: FnMut(f64, &[f64]) -> Result<Vec<f64>>,
{
    config.validate()?;
    let timer = StageTimer::start(Stage::Integration);
    let mut time = grid.start();
    check_finite(initial, time)?;

    let width = initial.len();
    let mut data = Vec::with_capacity(width * grid.len());
    data.extend_from_slice(initial);

    let mut stepper = Stepper {
        rhs,
        config,
        stats: IntegrationStats::default(),
        stages: Vec::with_capacity(7),
        scratch: vec![0.0; width],
    };
    if grid.len() == 1 {
        timer.finish(0);
        return Ok(Trajectory {
            times: grid.times().to_vec(),
            width,
            data,
            stats: stepper.stats,
        });
    }

    let mut state = initial.to_vec();
    let mut slope = stepper.evaluate(time, &state)?;
    let span = grid.end() - time;
    let mut step = stepper.initial_step(time, &state, &slope, span)?;
    if let Some(max) = config.max_step {
        step = step.min(max);
    }
    let mut controller = StepController::new(config.safety);
    let mut steps = 0usize;

    for &target in &grid.times()[1..] {
        while time < target {
            if steps >= config.max_steps {
                return Err(IntegrationError::TooManySteps { time, steps }.into());
            }
            let remaining = target - time;
            let landing = step >= remaining * (1.0 - 1e-12);
            let trial = if landing { remaining } else { step };

            let (next, next_slope, error) = stepper.attempt(time, &state, &slope, trial)?;
            steps += 1;
            let (accepted, factor) = controller.adjust(error);
            if accepted {
                stepper.stats.accepted += 1;
                time = if landing { target } else { time + trial };
                state = next;
                slope = next_slope;
                // A step shortened to land on an output time says little
                // about the step that follows.
                if !landing || trial >= step {
                    step = trial * factor;
                }
            } else {
                stepper.stats.rejected += 1;
                step = trial * factor;
                debug!("rejected step {trial:.3e} at t = {time:.6} (error {error:.3e})");
            }
            if let Some(max) = config.max_step {
                step = step.min(max);
            }
            if step < config.min_step {
                warn!("step size {step:.3e} fell below the floor at t = {time:.6}");
                return Err(IntegrationError::StepSizeUnderflow { time, step }.into());
            }
        }
        data.extend_from_slice(&state);
    }

    debug!(
        "integration finished: {} accepted, {} rejected, {} evaluations",
        stepper.stats.accepted, stepper.stats.rejected, stepper.stats.evaluations
    );
    timer.finish(stepper.stats.evaluations);
    Ok(Trajectory {
        times: grid.times().to_vec(),
        width,
        data,
        stats: stepper.stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn uniform_grid_excludes_end_point() {
        let grid = TimeGrid::uniform(0.0, 10.0, 30.0).unwrap();
        assert_eq!(grid.len(), 300);
        assert_relative_eq!(grid.end(), 299.0 / 30.0, epsilon = 1e-12);
        assert!(TimeGrid::new(vec![0.0, 1.0, 1.0]).is_err());
        assert!(TimeGrid::new(vec![]).is_err());
    }

    #[test]
    fn deserialized_grids_are_validated() {
        let grid: TimeGrid = serde_json::from_str("[0.0, 0.5, 2.0]").unwrap();
        assert_eq!(grid.times(), &[0.0, 0.5, 2.0]);
        assert_eq!(grid.end(), 2.0);
        assert_eq!(serde_json::to_string(&grid).unwrap(), "[0.0,0.5,2.0]");

        assert!(serde_json::from_str::<TimeGrid>("[]").is_err());
        assert!(serde_json::from_str::<TimeGrid>("[1.0, 0.5]").is_err());
        assert!(serde_json::from_str::<TimeGrid>(r#"{"times": []}"#).is_err());
    }

    #[test]
    fn exponential_decay_matches_closed_form() {
        let grid = TimeGrid::new(vec![0.0, 0.5, 1.0, 2.0]).unwrap();
        let config = IntegratorConfig::default().with_tolerances(1e-10, 1e-12);
        let trajectory =
            integrate(|_, y| Ok(vec![-y[0]]), &[1.0], &grid, &config).unwrap();
        for (i, &t) in grid.times().iter().enumerate() {
            assert_relative_eq!(trajectory.row(i)[0], (-t).exp(), max_relative = 1e-8);
        }
        assert_eq!(trajectory.times, grid.times());
    }

    #[test]
    fn harmonic_oscillator_hits_output_times_exactly() {
        let grid = TimeGrid::uniform(0.0, 6.0, 7.0).unwrap();
        let config = IntegratorConfig::default();
        let trajectory = integrate(
            |_, y| Ok(vec![y[1], -y[0]]),
            &[1.0, 0.0],
            &grid,
            &config,
        )
        .unwrap();
        for (i, &t) in grid.times().iter().enumerate() {
            assert_relative_eq!(trajectory.row(i)[0], t.cos(), epsilon = 1e-8);
            assert_relative_eq!(trajectory.row(i)[1], -t.sin(), epsilon = 1e-8);
        }
        assert!(trajectory.stats.accepted > 0);
    }

    #[test]
    fn step_budget_is_enforced() {
        let grid = TimeGrid::new(vec![0.0, 100.0]).unwrap();
        let config = IntegratorConfig::default().with_max_steps(3);
        let result = integrate(|_, y| Ok(vec![y[1], -y[0]]), &[1.0, 0.0], &grid, &config);
        assert!(matches!(
            result,
            Err(crate::error::Error::Integration(IntegrationError::TooManySteps { .. }))
        ));
    }

    #[test]
    fn blow_up_surfaces_as_error() {
        let grid = TimeGrid::new(vec![0.0, 2.0]).unwrap();
        let config = IntegratorConfig::default();
        let result = integrate(|_, y| Ok(vec![y[0] * y[0]]), &[1.0], &grid, &config);
        assert!(result.is_err());
    }

    #[test]
    fn controller_rejects_large_errors() {
        let mut controller = StepController::new(0.9);
        let (accepted, factor) = controller.adjust(4.0);
        assert!(!accepted);
        assert!(factor < 1.0);
        let (accepted, factor) = controller.adjust(0.01);
        assert!(accepted);
        assert!(factor > 1.0);
        assert!(!controller.adjust(f64::NAN).0);
    }
}
