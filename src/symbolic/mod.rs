//! Symbolic layer: expression trees, vectors and compiled evaluation tapes.

pub mod expr;
pub mod tape;
pub mod vector;

pub use expr::{Bindings, Expr, Node, Symbol};
pub use tape::Tape;
pub use vector::{Dyadic, Orientation, Vector};
