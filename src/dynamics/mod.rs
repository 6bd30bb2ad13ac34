//! Dynamics pipeline: forces, equation assembly, constraints, inversion and integration.

pub mod constraints;
pub mod eom;
pub mod forces;
pub mod integrator;
pub mod state_space;

pub use constraints::{CompiledConstraints, Constraint, ConstraintSet};
pub use eom::{assemble, EquationsOfMotion};
pub use forces::{
    AppliedForce, DamperForce, ForceContribution, ForceGenerator, ForceKind, ForceRegistry,
    GravityForce, SpringForce,
};
pub use integrator::{integrate, IntegrationStats, TimeGrid, Trajectory};
pub use state_space::{ConstrainedSolution, StateSpace};
