use glam::DVec3;

use super::frames::FrameGraph;
use super::variables::{ConstantTable, StateBindings};
use crate::error::Result;
use crate::symbolic::{Expr, Vector};
use crate::utils::allocator::FrameId;

/// Named position expression measured from the Newtonian origin.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub name: String,
    pub position: Vector,
}

impl Point {
    pub fn origin(name: &str) -> Self {
        Self::new(name, Vector::zero())
    }

    pub fn new(name: &str, position: Vector) -> Self {
        Self {
            name: name.to_owned(),
            position,
        }
    }

    /// New point at `self + offset`, with the offset given in `frame` components.
    pub fn offset(
        &self,
        name: &str,
        frames: &FrameGraph,
        frame: FrameId,
        offset: [Expr; 3],
    ) -> Result<Point> {
        let delta = frames.express(frame, offset)?;
        Ok(Point::new(name, &self.position + &delta))
    }

    /// Inertial velocity; exact time derivative of the position.
    pub fn velocity(&self) -> Vector {
        self.position.time_derivative()
    }

    /// Inertial acceleration.
    pub fn acceleration(&self) -> Vector {
        self.velocity().time_derivative()
    }

    /// Position relative to another point.
    pub fn relative_to(&self, other: &Point) -> Vector {
        &self.position - &other.position
    }

    /// Evaluates the position for one interleaved state row of a model with
    /// `coordinates` generalized coordinates.
    pub fn position_of(
        &self,
        state: &[f64],
        constants: &ConstantTable,
        coordinates: usize,
    ) -> Result<DVec3> {
        self.position.evaluate(&StateBindings::checked(state, constants, coordinates)?)
    }
}
