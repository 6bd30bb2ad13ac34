//! Linkage Dynamics – symbolic equations of motion for planar mechanisms.
//!
//! A model is described as a tree of rotating frames, points, bodies,
//! forces and holonomic constraints. The crate derives the equations of
//! motion symbolically with a generalized-force formulation, couples them
//! with the acceleration-level constraints through multipliers, compiles
//! the result into a pure state-derivative function and integrates it with
//! an adaptive embedded Runge-Kutta scheme.
//!
//! ```no_run
//! use linkage_dynamics::{four_bar, FourBarParameters, Simulation, TimeGrid};
//!
//! # fn main() -> linkage_dynamics::Result<()> {
//! let mut model = four_bar(&FourBarParameters::default())?;
//! let trajectory = Simulation::new(&mut model.system)?.run(&TimeGrid::frames(0.0, 10.0)?)?;
//! assert_eq!(trajectory.len(), 300);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod dynamics;
pub mod error;
pub mod mechanisms;
pub mod output;
pub mod symbolic;
pub mod system;
pub mod utils;

pub use glam::DVec3;

pub use config::IntegratorConfig;
pub use core::{
    Body, BodyRegistry, ConstantTable, FrameGraph, GeneralizedCoordinate, Point, Rotation,
    RotationConvention, RotationSense,
};
pub use dynamics::{
    constraints::{Constraint, ConstraintSet},
    eom::EquationsOfMotion,
    forces::{ForceGenerator, ForceRegistry},
    integrator::{integrate, TimeGrid, Trajectory},
    state_space::{ConstrainedSolution, StateSpace},
};
pub use error::{
    ConfigurationError, ConstraintLevel, Error, ErrorKind, IntegrationError, ModelError, Result,
};
pub use mechanisms::{four_bar, FourBar, FourBarParameters};
pub use output::{max_drift, oscillation_amplitude, EnergyOutput, PointsOutput};
pub use symbolic::{Dyadic, Expr, Orientation, Symbol, Vector};
pub use system::{simulate, InitialCondition, Simulation, System};
pub use utils::allocator::{BodyId, ConstantId, CoordinateId, FrameId};
