//! Model description: frames, coordinates and constants, points and bodies.

pub mod bodies;
pub mod frames;
pub mod points;
pub mod variables;

pub use bodies::{Body, BodyKinematics, BodyRegistry};
pub use frames::{Frame, FrameGraph, Rotation, RotationConvention, RotationSense};
pub use points::Point;
pub use variables::{check_state_len, ConstantTable, GeneralizedCoordinate, StateBindings};
