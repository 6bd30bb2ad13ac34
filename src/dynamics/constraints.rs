//! Holonomic constraints and their time derivatives.

use log::{debug, warn};
use nalgebra::{DMatrix, DVector};

use crate::config::{PROJECTION_MAX_ITERATIONS, SINGULAR_VALUE_EPSILON};
use crate::core::{ConstantTable, StateBindings};
use crate::error::{ConstraintLevel, ModelError, Result};
use crate::symbolic::{Expr, Symbol, Tape};
use crate::utils::allocator::CoordinateId;

/// Scalar position-level constraint `phi(q) = 0` with its derivatives.
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub name: String,
    pub position: Expr,
    pub velocity: Expr,
    /// Linear in the coordinate accelerations.
    pub acceleration: Expr,
}

impl Constraint {
    pub fn new(name: &str, position: Expr) -> Self {
        let velocity = position.time_derivative();
        let acceleration = velocity.time_derivative();
        Self {
            name: name.to_owned(),
            position,
            velocity,
            acceleration,
        }
    }
}

/// Ordered list of constraints; the order fixes the multiplier order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConstraintSet {
    constraints: Vec<Constraint>,
}

impl ConstraintSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, constraint: Constraint) {
        debug!("adding constraint `{}`", constraint.name);
        self.constraints.push(constraint);
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Constraint> {
        self.constraints.iter()
    }

    pub fn ensure_not_overconstrained(&self, coordinates: usize) -> Result<()> {
        if self.constraints.len() > coordinates {
            return Err(ModelError::OverConstrained {
                constraints: self.constraints.len(),
                coordinates,
            }
            .into());
        }
        Ok(())
    }

    /// `J[k][j] = d(phi_k'')/d(q_j'')`, equal to `d(phi_k)/d(q_j)`.
    pub fn jacobian(&self, coordinates: &[CoordinateId]) -> Vec<Vec<Expr>> {
        self.constraints
            .iter()
            .map(|c| {
                coordinates
                    .iter()
                    .map(|&q| c.acceleration.partial(Symbol::acceleration(q)))
                    .collect()
            })
            .collect()
    }

    /// Acceleration-level constraints; evaluated at zero acceleration they
    /// give the bias term `b` in `J q'' + b = 0`.
    pub fn accelerations(&self) -> Vec<Expr> {
        self.constraints
            .iter()
            .map(|c| c.acceleration.clone())
            .collect()
    }

    pub fn compile(&self, coordinates: &[CoordinateId]) -> CompiledConstraints {
        let positions: Vec<Expr> = self.constraints.iter().map(|c| c.position.clone()).collect();
        let velocities: Vec<Expr> = self.constraints.iter().map(|c| c.velocity.clone()).collect();
        let jacobian: Vec<Expr> = self
            .constraints
            .iter()
            .flat_map(|c| {
                coordinates
                    .iter()
                    .map(|&q| c.velocity.partial(Symbol::rate(q)))
                    .collect::<Vec<_>>()
            })
            .collect();
        CompiledConstraints {
            count: self.constraints.len(),
            coordinates: coordinates.len(),
            positions: Tape::compile(&positions),
            velocities: Tape::compile(&velocities),
            jacobian: Tape::compile(&jacobian),
        }
    }
}

/// Numeric evaluators for constraint residuals and the constraint Jacobian.
#[derive(Debug, Clone)]
pub struct CompiledConstraints {
    count: usize,
    coordinates: usize,
    positions: Tape,
    velocities: Tape,
    jacobian: Tape,
}

impl CompiledConstraints {
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    fn bindings<'a>(
        &self,
        state: &'a [f64],
        constants: &'a ConstantTable,
    ) -> Result<StateBindings<'a>> {
        StateBindings::checked(state, constants, self.coordinates)
    }

    pub fn position_residuals(&self, state: &[f64], constants: &ConstantTable) -> Result<Vec<f64>> {
        self.positions.evaluate_vec(&self.bindings(state, constants)?)
    }

    pub fn velocity_residuals(&self, state: &[f64], constants: &ConstantTable) -> Result<Vec<f64>> {
        self.velocities.evaluate_vec(&self.bindings(state, constants)?)
    }

    pub fn jacobian(&self, state: &[f64], constants: &ConstantTable) -> Result<DMatrix<f64>> {
        let values = self.jacobian.evaluate_vec(&self.bindings(state, constants)?)?;
        Ok(DMatrix::from_row_slice(self.count, self.coordinates, &values))
    }

    /// Rejects states whose position or velocity residual exceeds `tolerance`.
    pub fn check(&self, state: &[f64], constants: &ConstantTable, tolerance: f64) -> Result<()> {
        let levels = [
            (ConstraintLevel::Position, self.position_residuals(state, constants)?),
            (ConstraintLevel::Velocity, self.velocity_residuals(state, constants)?),
        ];
        for (level, residuals) in levels {
            if let Some((index, &residual)) = residuals
                .iter()
                .enumerate()
                .find(|(_, r)| !(r.abs() <= tolerance))
            {
                return Err(ModelError::InconsistentInitialState {
                    level,
                    index,
                    residual,
                }
                .into());
            }
        }
        Ok(())
    }

    /// Moves `state` onto the constraint manifold.
    ///
    /// Coordinates follow minimum-norm Gauss-Newton corrections until every
    /// position residual is within `tolerance`; rates are then projected onto
    /// the null space of the constraint Jacobian.
    pub fn project(
        &self,
        state: &[f64],
        constants: &ConstantTable,
        tolerance: f64,
    ) -> Result<Vec<f64>> {
        let mut projected = state.to_vec();
        if self.count == 0 {
            return Ok(projected);
        }

        let mut residual = f64::INFINITY;
        let mut converged = false;
        for iteration in 0..PROJECTION_MAX_ITERATIONS {
            let phi = DVector::from_vec(self.position_residuals(&projected, constants)?);
            residual = phi.amax();
            if residual <= tolerance {
                debug!("constraint projection converged after {iteration} iterations");
                converged = true;
                break;
            }
            let correction = self.minimum_norm_solve(&projected, constants, &phi)?;
            for (i, dq) in correction.iter().enumerate() {
                projected[2 * i] -= dq;
            }
        }
        if !converged {
            warn!("constraint projection stalled at residual {residual:.3e}");
            return Err(ModelError::ProjectionFailed {
                iterations: PROJECTION_MAX_ITERATIONS,
                residual,
            }
            .into());
        }

        let j = self.jacobian(&projected, constants)?;
        let rates = DVector::from_iterator(
            self.coordinates,
            (0..self.coordinates).map(|i| projected[2 * i + 1]),
        );
        let drift = &j * &rates;
        let correction = self.minimum_norm_solve(&projected, constants, &drift)?;
        for (i, du) in correction.iter().enumerate() {
            projected[2 * i + 1] -= du;
        }
        Ok(projected)
    }

    fn minimum_norm_solve(
        &self,
        state: &[f64],
        constants: &ConstantTable,
        rhs: &DVector<f64>,
    ) -> Result<DVector<f64>> {
        let svd = self.jacobian(state, constants)?.svd(true, true);
        svd.solve(rhs, SINGULAR_VALUE_EPSILON).map_err(|_| {
            ModelError::ProjectionFailed {
                iterations: 0,
                residual: rhs.amax(),
            }
            .into()
        })
    }
}
