//! Post-processing of integrated trajectories.

use glam::DVec3;
#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::core::{ConstantTable, Point, StateBindings};
use crate::dynamics::integrator::Trajectory;
use crate::error::{ConfigurationError, Result};
use crate::symbolic::{Expr, Tape};
use crate::system::System;

/// Evaluates one compiled tape on every row of a trajectory whose rows hold
/// `coordinates` interleaved position/rate pairs.
fn evaluate_rows(
    tape: &Tape,
    coordinates: usize,
    trajectory: &Trajectory,
    constants: &ConstantTable,
) -> Result<Vec<Vec<f64>>> {
    let width = 2 * coordinates;
    if trajectory.width != width {
        return Err(ConfigurationError::StateLength {
            expected: width,
            got: trajectory.width,
        }
        .into());
    }
    if trajectory.data.len() != width * trajectory.len() {
        return Err(ConfigurationError::InvalidSetting(format!(
            "trajectory holds {} values for {} rows of width {width}",
            trajectory.data.len(),
            trajectory.len()
        ))
        .into());
    }
    if width == 0 {
        return trajectory
            .times
            .iter()
            .map(|_| tape.evaluate_vec(&StateBindings::new(&[], constants)))
            .collect();
    }
    let eval = |row: &[f64]| tape.evaluate_vec(&StateBindings::new(row, constants));

    #[cfg(feature = "parallel")]
    {
        trajectory.data.par_chunks_exact(width).map(eval).collect()
    }
    #[cfg(not(feature = "parallel"))]
    {
        trajectory.data.chunks_exact(width).map(eval).collect()
    }
}

/// Positions of a fixed list of points over a trajectory.
#[derive(Debug, Clone)]
pub struct PointsOutput {
    names: Vec<String>,
    coordinates: usize,
    tape: Tape,
}

impl PointsOutput {
    /// Compiles `points` for trajectories of `system`.
    pub fn new(system: &System, points: &[Point]) -> Self {
        let exprs: Vec<Expr> = points
            .iter()
            .flat_map(|p| {
                let [x, y, z] = p.position.components();
                [x.clone(), y.clone(), z.clone()]
            })
            .collect();
        Self {
            names: points.iter().map(|p| p.name.clone()).collect(),
            coordinates: system.coordinates().len(),
            tape: Tape::compile(&exprs),
        }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// `result[row][point]` in Newtonian components.
    pub fn calc(
        &self,
        trajectory: &Trajectory,
        constants: &ConstantTable,
    ) -> Result<Vec<Vec<DVec3>>> {
        Ok(evaluate_rows(&self.tape, self.coordinates, trajectory, constants)?
            .into_iter()
            .map(|flat| {
                flat.chunks_exact(3)
                    .map(|c| DVec3::new(c[0], c[1], c[2]))
                    .collect()
            })
            .collect())
    }
}

/// Scalar energy expression evaluated over a trajectory.
#[derive(Debug, Clone)]
pub struct EnergyOutput {
    coordinates: usize,
    tape: Tape,
}

impl EnergyOutput {
    pub fn new(system: &System, energy: &Expr) -> Self {
        Self {
            coordinates: system.coordinates().len(),
            tape: Tape::compile(std::slice::from_ref(energy)),
        }
    }

    pub fn calc(&self, trajectory: &Trajectory, constants: &ConstantTable) -> Result<Vec<f64>> {
        Ok(evaluate_rows(&self.tape, self.coordinates, trajectory, constants)?
            .into_iter()
            .map(|row| row[0])
            .collect())
    }
}

/// Largest absolute deviation from the first value.
pub fn max_drift(values: &[f64]) -> f64 {
    match values.first() {
        Some(first) => values
            .iter()
            .map(|v| (v - first).abs())
            .fold(0.0, f64::max),
        None => 0.0,
    }
}

/// Half the peak-to-peak range of coordinate `index` over `start <= t <= end`.
pub fn oscillation_amplitude(trajectory: &Trajectory, index: usize, start: f64, end: f64) -> f64 {
    let (min, max) = trajectory
        .times
        .iter()
        .zip(trajectory.coordinate(index))
        .filter(|(t, _)| **t >= start && **t <= end)
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), (_, q)| {
            (lo.min(q), hi.max(q))
        });
    if min > max {
        0.0
    } else {
        0.5 * (max - min)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamics::integrator::IntegrationStats;
    use approx::assert_relative_eq;

    fn sine_trajectory() -> Trajectory {
        let times: Vec<f64> = (0..200).map(|i| i as f64 * 0.05).collect();
        let data = times
            .iter()
            .flat_map(|t| {
                let amplitude = if *t < 5.0 { 2.0 } else { 0.5 };
                [amplitude * (3.0 * t).sin(), 0.0]
            })
            .collect();
        Trajectory {
            times,
            width: 2,
            data,
            stats: IntegrationStats::default(),
        }
    }

    #[test]
    fn amplitude_is_measured_per_window() {
        let trajectory = sine_trajectory();
        assert_relative_eq!(oscillation_amplitude(&trajectory, 0, 0.0, 4.9), 2.0, epsilon = 0.02);
        assert_relative_eq!(oscillation_amplitude(&trajectory, 0, 5.0, 10.0), 0.5, epsilon = 0.01);
        assert_eq!(oscillation_amplitude(&trajectory, 0, 20.0, 30.0), 0.0);
    }

    #[test]
    fn drift_is_relative_to_first_sample() {
        assert_eq!(max_drift(&[1.0, 1.5, 0.25]), 0.75);
        assert_eq!(max_drift(&[]), 0.0);
    }
}
