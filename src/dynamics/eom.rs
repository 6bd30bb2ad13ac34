//! Generalized-force (Kane) assembly of the equations of motion.
//!
//! For every coordinate `j` with rate `u_j`, each applied load is projected
//! onto the partial velocity `d(v)/d(u_j)` of the velocity it is paired with
//! (giving `f_j`), and each body's inertial force and torque are projected
//! onto the partial velocities of its center of mass and its angular
//! velocity (giving `ma_j`). The dynamics are the residuals `f - ma = 0`.

use log::info;

use super::forces::ForceRegistry;
use crate::core::{BodyRegistry, FrameGraph};
use crate::error::Result;
use crate::symbolic::{Expr, Symbol};
use crate::utils::allocator::CoordinateId;
use crate::utils::logging::{Stage, StageTimer};

/// Symbolic equations of motion, one entry per generalized coordinate.
#[derive(Debug, Clone, PartialEq)]
pub struct EquationsOfMotion {
    pub coordinates: Vec<CoordinateId>,
    /// Generalized active forces.
    pub f: Vec<Expr>,
    /// Generalized inertia forces.
    pub ma: Vec<Expr>,
}

impl EquationsOfMotion {
    pub fn len(&self) -> usize {
        self.coordinates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coordinates.is_empty()
    }

    /// `f - ma`, one residual per coordinate.
    pub fn residuals(&self) -> Vec<Expr> {
        self.f.iter().zip(&self.ma).map(|(f, ma)| f - ma).collect()
    }

    /// Generalized mass matrix `M[i][j] = -d(f_i - ma_i)/d(q_j'')`.
    ///
    /// The residuals are linear in the accelerations, so this is exact and
    /// `f - ma = rhs - M q''` with `rhs` the residual at zero acceleration.
    pub fn mass_matrix(&self) -> Vec<Vec<Expr>> {
        self.residuals()
            .iter()
            .map(|r| {
                self.coordinates
                    .iter()
                    .map(|&c| -r.partial(Symbol::acceleration(c)))
                    .collect()
            })
            .collect()
    }
}

/// Derives `f` and `ma` from the registered bodies and forces.
pub fn assemble(
    frames: &FrameGraph,
    bodies: &BodyRegistry,
    forces: &ForceRegistry,
    coordinates: &[CoordinateId],
) -> Result<EquationsOfMotion> {
    let timer = StageTimer::start(Stage::Assembly);

    let contributions = forces.contributions(frames, bodies)?;
    let mut inertial = Vec::with_capacity(bodies.len());
    for (_, body) in bodies.iter() {
        let kinematics = body.kinematics(frames)?;
        let (force, torque) = body.inertial_loads(&kinematics);
        inertial.push((kinematics, force, torque));
    }

    let mut f = Vec::with_capacity(coordinates.len());
    let mut ma = Vec::with_capacity(coordinates.len());
    for &coordinate in coordinates {
        let rate = Symbol::rate(coordinate);

        f.push(Expr::sum(contributions.iter().map(|c| {
            c.load.dot(&c.velocity.partial(rate))
        })));

        ma.push(Expr::sum(inertial.iter().flat_map(|(k, force, torque)| {
            [
                force.dot(&k.velocity.partial(rate)),
                torque.dot(&k.angular_velocity.partial(rate)),
            ]
        })));
    }

    let eom = EquationsOfMotion {
        coordinates: coordinates.to_vec(),
        f,
        ma,
    };
    let nodes = eom.residuals().iter().map(Expr::node_count).sum::<usize>();
    info!(
        "assembled {} equations from {} bodies and {} force contributions ({nodes} nodes)",
        eom.len(),
        bodies.len(),
        contributions.len(),
    );
    timer.finish(nodes);
    Ok(eom)
}
