//! Utility helpers: typed arenas, logging timers and inertia math.

pub mod allocator;
pub mod logging;
pub mod math;

pub use allocator::{Arena, ArenaId, BodyId, ConstantId, CoordinateId, FrameId};
pub use math::*;
