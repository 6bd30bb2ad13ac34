use log::debug;

use super::frames::FrameGraph;
use super::points::Point;
use crate::error::{ModelError, Result};
use crate::symbolic::{Dyadic, Expr, Orientation, Vector};
use crate::utils::allocator::{Arena, BodyId, CoordinateId, FrameId};

/// Rigid body attached to a frame, or a particle when `frame` is `None`.
#[derive(Debug, Clone)]
pub struct Body {
    pub name: String,
    pub frame: Option<FrameId>,
    pub center_of_mass: Point,
    pub mass: Expr,
    /// Inertia about the center of mass, in the body's own frame.
    pub inertia: Dyadic,
}

/// Velocity-level and acceleration-level description of one body.
#[derive(Debug, Clone)]
pub struct BodyKinematics {
    pub velocity: Vector,
    pub acceleration: Vector,
    /// Angular velocity in body-frame components.
    pub angular_velocity: Vector,
    /// Angular acceleration in body-frame components.
    pub angular_acceleration: Vector,
    pub orientation: Orientation,
}

impl Body {
    pub fn is_particle(&self) -> bool {
        self.frame.is_none()
    }

    pub fn kinematics(&self, frames: &FrameGraph) -> Result<BodyKinematics> {
        let velocity = self.center_of_mass.velocity();
        let acceleration = velocity.time_derivative();
        let (orientation, omega, alpha) = match self.frame {
            Some(frame) => {
                let orientation = frames.orientation(frame)?;
                let omega = frames.angular_velocity(frame)?;
                let alpha = omega.time_derivative();
                (
                    orientation.clone(),
                    orientation.apply_transpose(&omega),
                    orientation.apply_transpose(&alpha),
                )
            }
            None => (Orientation::identity(), Vector::zero(), Vector::zero()),
        };
        Ok(BodyKinematics {
            velocity,
            acceleration,
            angular_velocity: omega,
            angular_acceleration: alpha,
            orientation,
        })
    }

    /// Translational plus rotational kinetic energy.
    pub fn kinetic_energy(&self, frames: &FrameGraph) -> Result<Expr> {
        let k = self.kinematics(frames)?;
        let translational = &self.mass * k.velocity.dot(&k.velocity);
        let rotational = k
            .angular_velocity
            .dot(&self.inertia.apply(&k.angular_velocity));
        Ok((translational + rotational).scale(0.5))
    }

    /// Inertial force `m a` in Newtonian components and inertial torque
    /// `I alpha + w x I w` in body-frame components.
    pub fn inertial_loads(&self, kinematics: &BodyKinematics) -> (Vector, Vector) {
        let force = kinematics.acceleration.scale(&self.mass);
        if self.is_particle() {
            return (force, Vector::zero());
        }
        let h = self.inertia.apply(&kinematics.angular_velocity);
        let torque = &self.inertia.apply(&kinematics.angular_acceleration)
            + &kinematics.angular_velocity.cross(&h);
        (force, torque)
    }

    /// This body's contribution to the generalized mass matrix over `coordinates`.
    pub fn mass_matrix(
        &self,
        frames: &FrameGraph,
        coordinates: &[CoordinateId],
    ) -> Result<Vec<Vec<Expr>>> {
        use crate::symbolic::Symbol;

        let k = self.kinematics(frames)?;
        let partials: Vec<(Vector, Vector)> = coordinates
            .iter()
            .map(|&c| {
                let rate = Symbol::rate(c);
                (k.velocity.partial(rate), k.angular_velocity.partial(rate))
            })
            .collect();

        Ok(partials
            .iter()
            .map(|(vi, wi)| {
                partials
                    .iter()
                    .map(|(vj, wj)| &self.mass * vi.dot(vj) + wi.dot(&self.inertia.apply(wj)))
                    .collect()
            })
            .collect())
    }
}

/// Table of bodies keyed by typed handle, at most one per frame.
#[derive(Debug, Clone, Default)]
pub struct BodyRegistry {
    bodies: Arena<BodyId, Body>,
}

impl BodyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach_body(
        &mut self,
        frames: &FrameGraph,
        name: &str,
        frame: FrameId,
        center_of_mass: Point,
        mass: Expr,
        inertia: Dyadic,
    ) -> Result<BodyId> {
        let frame_name = frames.name(frame)?.to_owned();
        if self.bodies.values().any(|b| b.frame == Some(frame)) {
            return Err(ModelError::FrameAlreadyHasBody(frame_name).into());
        }
        debug!("attaching body `{name}` to frame `{frame_name}`");
        Ok(self.bodies.insert(Body {
            name: name.to_owned(),
            frame: Some(frame),
            center_of_mass,
            mass,
            inertia,
        }))
    }

    pub fn attach_particle(&mut self, name: &str, point: Point, mass: Expr) -> BodyId {
        debug!("attaching particle `{name}` at `{}`", point.name);
        self.bodies.insert(Body {
            name: name.to_owned(),
            frame: None,
            center_of_mass: point,
            mass,
            inertia: Dyadic::zero(),
        })
    }

    pub fn get(&self, id: BodyId) -> Option<&Body> {
        self.bodies.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (BodyId, &Body)> + '_ {
        self.bodies.iter()
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }
}
