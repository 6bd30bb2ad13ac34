//! Error taxonomy for model definition, evaluation and integration.

use thiserror::Error;

/// Malformed model detected while defining or assembling the system.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ModelError {
    /// Frame handle does not belong to this system.
    #[error("unknown frame handle {0}")]
    UnknownFrame(usize),

    /// Coordinate handle does not belong to this system.
    #[error("unknown coordinate handle {0}")]
    UnknownCoordinate(usize),

    /// Two frames share the same name.
    #[error("frame name `{0}` is already in use")]
    DuplicateFrameName(String),

    /// A frame may be rotated relative to its parent at most once.
    #[error("frame `{0}` already has a rotation")]
    DuplicateRotation(String),

    /// Rotating the frame against this parent would close a loop.
    #[error("rotating `{frame}` relative to `{parent}` would create a cycle")]
    RotationCycle { frame: String, parent: String },

    /// The Newtonian frame is fixed and cannot be rotated.
    #[error("the Newtonian frame `{0}` cannot be rotated")]
    RotatingNewtonian(String),

    /// Frame is not connected to the Newtonian frame.
    #[error("frame `{0}` is not connected to the Newtonian frame")]
    UnrootedFrame(String),

    /// Only one body may attach to a frame.
    #[error("frame `{0}` already carries a body")]
    FrameAlreadyHasBody(String),

    /// Rotation axis has zero length.
    #[error("rotation axis for frame `{0}` has zero length")]
    ZeroAxis(String),

    /// More constraints than coordinates.
    #[error("{constraints} constraints exceed {coordinates} generalized coordinates")]
    OverConstrained {
        constraints: usize,
        coordinates: usize,
    },

    /// Supplied initial state violates a constraint.
    #[error("initial state violates {level} constraint {index} (residual {residual:.3e})")]
    InconsistentInitialState {
        level: ConstraintLevel,
        index: usize,
        residual: f64,
    },

    /// Projection onto the constraint manifold did not converge.
    #[error("projection onto the constraint manifold failed after {iterations} iterations (residual {residual:.3e})")]
    ProjectionFailed { iterations: usize, residual: f64 },
}

/// Differentiation level of a holonomic constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintLevel {
    Position,
    Velocity,
}

impl std::fmt::Display for ConstraintLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConstraintLevel::Position => write!(f, "position"),
            ConstraintLevel::Velocity => write!(f, "velocity"),
        }
    }
}

/// Invalid evaluation-time inputs.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigurationError {
    /// A constant referenced by the equations has no value.
    #[error("constant `{name}` has no value")]
    MissingConstant { name: String },

    /// State vector does not match 2 x number of coordinates.
    #[error("state vector has length {got}, expected {expected}")]
    StateLength { expected: usize, got: usize },

    /// Time grid is empty or not strictly increasing.
    #[error("invalid time grid: {0}")]
    InvalidTimeGrid(String),

    /// Tolerances or step bounds are not positive.
    #[error("invalid integrator setting: {0}")]
    InvalidSetting(String),

    /// Expression references a derivative order with no value supplied.
    #[error("no value bound for {0}")]
    UnboundSymbol(String),

    /// No constant with this name was declared.
    #[error("no constant named `{0}`")]
    UnknownConstant(String),
}

/// Failure during the numeric phase.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum IntegrationError {
    /// Augmented mass/constraint system could not be inverted.
    #[error("singular constraint-coupled system at t = {time} (condition ratio {ratio:.3e})")]
    SingularSystem { time: f64, ratio: f64 },

    /// Right-hand side produced NaN or infinity.
    #[error("non-finite state derivative at t = {time}")]
    NonFinite { time: f64 },

    /// Step controller shrank the step below the allowed floor.
    #[error("step size {step:.3e} fell below the minimum at t = {time}")]
    StepSizeUnderflow { time: f64, step: f64 },

    /// Step budget exhausted before reaching the final time.
    #[error("exceeded {steps} steps at t = {time}")]
    TooManySteps { time: f64, steps: usize },
}

/// Coarse error category, one per failure class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Model,
    Configuration,
    Integration,
    FrozenModel,
}

/// Top-level error returned by every fallible operation.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum Error {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Integration(#[from] IntegrationError),

    /// Model mutation attempted after assembly started.
    #[error("cannot {operation}: the model is frozen after assembly")]
    FrozenModel { operation: &'static str },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Model(_) => ErrorKind::Model,
            Error::Configuration(_) => ErrorKind::Configuration,
            Error::Integration(_) => ErrorKind::Integration,
            Error::FrozenModel { .. } => ErrorKind::FrozenModel,
        }
    }
}

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
