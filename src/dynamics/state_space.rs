//! Conversion of the constrained equations into an explicit first-order ODE.
//!
//! The mass matrix, the forcing remainder, the constraint Jacobian and the
//! constraint bias are extracted symbolically and compiled once. Each call
//! evaluates them for the given state and solves the augmented system
//!
//! ```text
//! [ M  Jt ] [ q'' ]   [ rhs ]
//! [ J  0  ] [ mu  ] = [ -b  ]
//! ```
//!
//! numerically, so constants can change between calls without re-deriving.

use log::info;
use nalgebra::{DMatrix, DVector};

use super::constraints::{CompiledConstraints, ConstraintSet};
use super::eom::EquationsOfMotion;
use crate::config::{SINGULARITY_THRESHOLD, SINGULAR_VALUE_EPSILON};
use crate::core::{check_state_len, ConstantTable, StateBindings};
use crate::error::{IntegrationError, Result};
use crate::symbolic::{Expr, Tape};
use crate::utils::logging::{Stage, StageTimer};

/// Accelerations together with the constraint multipliers that enforce them.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstrainedSolution {
    pub accelerations: Vec<f64>,
    /// Generalized constraint forces are `J^T * multipliers`.
    pub multipliers: Vec<f64>,
}

/// Pure right-hand side `(state, t, constants) -> state derivative`.
#[derive(Debug, Clone)]
pub struct StateSpace {
    coordinates: usize,
    constraints: usize,
    mass: Tape,
    forcing: Tape,
    jacobian: Tape,
    bias: Tape,
    checks: CompiledConstraints,
}

impl StateSpace {
    pub fn new(eom: &EquationsOfMotion, constraints: &ConstraintSet) -> Result<Self> {
        let timer = StageTimer::start(Stage::Compilation);
        let n = eom.len();
        constraints.ensure_not_overconstrained(n)?;

        let mass: Vec<Expr> = eom.mass_matrix().into_iter().flatten().collect();
        let jacobian: Vec<Expr> = constraints
            .jacobian(&eom.coordinates)
            .into_iter()
            .flatten()
            .collect();

        let space = Self {
            coordinates: n,
            constraints: constraints.len(),
            mass: Tape::compile(&mass),
            forcing: Tape::compile(&eom.residuals()),
            jacobian: Tape::compile(&jacobian),
            bias: Tape::compile(&constraints.accelerations()),
            checks: constraints.compile(&eom.coordinates),
        };
        let ops = space.mass.op_count()
            + space.forcing.op_count()
            + space.jacobian.op_count()
            + space.bias.op_count();
        info!(
            "state space ready: {n} coordinates, {} constraints, {ops} tape ops",
            space.constraints
        );
        timer.finish(ops);
        Ok(space)
    }

    pub fn coordinate_count(&self) -> usize {
        self.coordinates
    }

    pub fn constraint_count(&self) -> usize {
        self.constraints
    }

    /// Length of an interleaved state vector.
    pub fn state_len(&self) -> usize {
        2 * self.coordinates
    }

    pub fn constraints(&self) -> &CompiledConstraints {
        &self.checks
    }

    fn ensure_state_len(&self, state: &[f64]) -> Result<()> {
        check_state_len(state, self.coordinates)
    }

    /// Generalized mass matrix at `state`.
    pub fn mass_matrix(&self, state: &[f64], constants: &ConstantTable) -> Result<DMatrix<f64>> {
        self.ensure_state_len(state)?;
        let values = self.mass.evaluate_vec(&StateBindings::new(state, constants))?;
        let n = self.coordinates;
        Ok(DMatrix::from_row_slice(n, n, &values))
    }

    /// Consistent accelerations and constraint multipliers at `state`.
    pub fn solve_with_multipliers(
        &self,
        state: &[f64],
        time: f64,
        constants: &ConstantTable,
    ) -> Result<ConstrainedSolution> {
        self.ensure_state_len(state)?;
        let bindings = StateBindings::new(state, constants);
        let n = self.coordinates;
        let m = self.constraints;

        let mass = self.mass.evaluate_vec(&bindings)?;
        let forcing = self.forcing.evaluate_vec(&bindings)?;
        let jacobian = self.jacobian.evaluate_vec(&bindings)?;
        let bias = self.bias.evaluate_vec(&bindings)?;

        let size = n + m;
        let mut a = DMatrix::<f64>::zeros(size, size);
        let mut rhs = DVector::<f64>::zeros(size);
        for i in 0..n {
            for j in 0..n {
                a[(i, j)] = mass[i * n + j];
            }
            rhs[i] = forcing[i];
        }
        for k in 0..m {
            for j in 0..n {
                let value = jacobian[k * n + j];
                a[(n + k, j)] = value;
                a[(j, n + k)] = value;
            }
            rhs[n + k] = -bias[k];
        }

        if a.iter().chain(rhs.iter()).any(|v| !v.is_finite()) {
            return Err(IntegrationError::NonFinite { time }.into());
        }

        let svd = a.svd(true, true);
        let largest = svd.singular_values.max();
        let smallest = svd.singular_values.min();
        let ratio = if largest > 0.0 { smallest / largest } else { 0.0 };
        if ratio < SINGULARITY_THRESHOLD {
            return Err(IntegrationError::SingularSystem { time, ratio }.into());
        }
        let solution = svd
            .solve(&rhs, SINGULAR_VALUE_EPSILON)
            .map_err(|_| IntegrationError::SingularSystem { time, ratio })?;

        Ok(ConstrainedSolution {
            accelerations: solution.rows(0, n).iter().copied().collect(),
            multipliers: solution.rows(n, m).iter().map(|mu| -mu).collect(),
        })
    }

    /// Interleaved `[u0, a0, u1, a1, ...]` for an interleaved `[q0, u0, ...]` state.
    pub fn derivative(
        &self,
        state: &[f64],
        time: f64,
        constants: &ConstantTable,
    ) -> Result<Vec<f64>> {
        let solution = self.solve_with_multipliers(state, time, constants)?;
        let mut out = vec![0.0; self.state_len()];
        for (i, acceleration) in solution.accelerations.iter().enumerate() {
            out[2 * i] = state[2 * i + 1];
            out[2 * i + 1] = *acceleration;
        }
        if out.iter().any(|v| !v.is_finite()) {
            return Err(IntegrationError::NonFinite { time }.into());
        }
        Ok(out)
    }

    /// Borrowing closure over fixed constants, in the shape the integrator expects.
    pub fn rhs<'a>(
        &'a self,
        constants: &'a ConstantTable,
    ) -> impl Fn(f64, &[f64]) -> Result<Vec<f64>> + 'a {
        move |time, state| self.derivative(state, time, constants)
    }

    /// Rejects initial states that violate any position or velocity constraint.
    pub fn check_initial_state(
        &self,
        state: &[f64],
        constants: &ConstantTable,
        tolerance: f64,
    ) -> Result<()> {
        self.ensure_state_len(state)?;
        self.checks.check(state, constants, tolerance)
    }

    /// Projects an initial state onto the position and velocity constraints.
    pub fn project_initial_state(
        &self,
        state: &[f64],
        constants: &ConstantTable,
        tolerance: f64,
    ) -> Result<Vec<f64>> {
        self.ensure_state_len(state)?;
        self.checks.project(state, constants, tolerance)
    }
}
