use crate::core::{BodyRegistry, FrameGraph, Point};
use crate::error::Result;
use crate::symbolic::{Expr, Vector};

/// A force or torque paired with the velocity it does work against.
///
/// Projecting `load` onto the partial velocities of `velocity` gives its
/// generalized force.
#[derive(Debug, Clone)]
pub struct ForceContribution {
    pub load: Vector,
    pub velocity: Vector,
}

impl ForceContribution {
    pub fn new(load: Vector, velocity: Vector) -> Self {
        Self { load, velocity }
    }
}

/// Category used when splitting potential energy by source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForceKind {
    Gravity,
    Spring,
    Damper,
    Applied,
}

/// Trait describing a source of generalized forces.
pub trait ForceGenerator: Send + Sync {
    fn kind(&self) -> ForceKind;

    /// Force/velocity pairs, resolved against the final set of bodies.
    fn contributions(
        &self,
        frames: &FrameGraph,
        bodies: &BodyRegistry,
    ) -> Result<Vec<ForceContribution>>;

    /// Stored potential energy, measured from `reference` where that matters.
    fn potential_energy(&self, _bodies: &BodyRegistry, _reference: &Point) -> Option<Expr> {
        None
    }
}

/// Uniform gravity acting at every body's center of mass.
pub struct GravityForce {
    pub gravity: Vector,
}

impl GravityForce {
    pub fn new(gravity: Vector) -> Self {
        Self { gravity }
    }
}

impl ForceGenerator for GravityForce {
    fn kind(&self) -> ForceKind {
        ForceKind::Gravity
    }

    fn contributions(
        &self,
        _frames: &FrameGraph,
        bodies: &BodyRegistry,
    ) -> Result<Vec<ForceContribution>> {
        Ok(bodies
            .iter()
            .map(|(_, body)| {
                ForceContribution::new(
                    self.gravity.scale(&body.mass),
                    body.center_of_mass.velocity(),
                )
            })
            .collect())
    }

    fn potential_energy(&self, bodies: &BodyRegistry, reference: &Point) -> Option<Expr> {
        Some(Expr::sum(bodies.iter().map(|(_, body)| {
            let height = body.center_of_mass.relative_to(reference);
            -(&body.mass * self.gravity.dot(&height))
        })))
    }
}

/// Linear spring `-k * deflection` acting against `velocity`.
pub struct SpringForce {
    pub stiffness: Expr,
    pub deflection: Vector,
    pub velocity: Vector,
}

impl ForceGenerator for SpringForce {
    fn kind(&self) -> ForceKind {
        ForceKind::Spring
    }

    fn contributions(
        &self,
        _frames: &FrameGraph,
        _bodies: &BodyRegistry,
    ) -> Result<Vec<ForceContribution>> {
        let load = -self.deflection.scale(&self.stiffness);
        Ok(vec![ForceContribution::new(load, self.velocity.clone())])
    }

    fn potential_energy(&self, _bodies: &BodyRegistry, _reference: &Point) -> Option<Expr> {
        Some((&self.stiffness * self.deflection.dot(&self.deflection)).scale(0.5))
    }
}

/// Viscous damper `-b * velocity`.
pub struct DamperForce {
    pub coefficient: Expr,
    pub velocity: Vector,
}

impl ForceGenerator for DamperForce {
    fn kind(&self) -> ForceKind {
        ForceKind::Damper
    }

    fn contributions(
        &self,
        _frames: &FrameGraph,
        _bodies: &BodyRegistry,
    ) -> Result<Vec<ForceContribution>> {
        let load = -self.velocity.scale(&self.coefficient);
        Ok(vec![ForceContribution::new(load, self.velocity.clone())])
    }
}

/// Arbitrary load paired with an arbitrary velocity.
pub struct AppliedForce {
    pub load: Vector,
    pub velocity: Vector,
}

impl ForceGenerator for AppliedForce {
    fn kind(&self) -> ForceKind {
        ForceKind::Applied
    }

    fn contributions(
        &self,
        _frames: &FrameGraph,
        _bodies: &BodyRegistry,
    ) -> Result<Vec<ForceContribution>> {
        Ok(vec![ForceContribution::new(
            self.load.clone(),
            self.velocity.clone(),
        )])
    }
}

/// Append-only collection of force generators.
pub struct ForceRegistry {
    forces: Vec<Box<dyn ForceGenerator>>,
}

impl Default for ForceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ForceRegistry {
    pub fn new() -> Self {
        Self { forces: Vec::new() }
    }

    pub fn add_force<F: ForceGenerator + 'static>(&mut self, force: F) {
        self.forces.push(Box::new(force));
    }

    pub fn len(&self) -> usize {
        self.forces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forces.is_empty()
    }

    pub fn contributions(
        &self,
        frames: &FrameGraph,
        bodies: &BodyRegistry,
    ) -> Result<Vec<ForceContribution>> {
        let mut out = Vec::new();
        for force in &self.forces {
            out.extend(force.contributions(frames, bodies)?);
        }
        Ok(out)
    }

    /// Summed potential energy of every generator of `kind`.
    pub fn potential_energy(
        &self,
        kind: ForceKind,
        bodies: &BodyRegistry,
        reference: &Point,
    ) -> Expr {
        Expr::sum(
            self.forces
                .iter()
                .filter(|force| force.kind() == kind)
                .filter_map(|force| force.potential_energy(bodies, reference)),
        )
    }
}

impl std::fmt::Debug for ForceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kinds: Vec<ForceKind> = self.forces.iter().map(|force| force.kind()).collect();
        f.debug_struct("ForceRegistry").field("forces", &kinds).finish()
    }
}
