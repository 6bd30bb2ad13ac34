use glam::DVec3;
use log::{debug, info};

use crate::{
    config::{IntegratorConfig, CONSTRAINT_TOLERANCE},
    core::{
        BodyRegistry, ConstantTable, FrameGraph, GeneralizedCoordinate, Point, Rotation,
        RotationConvention, RotationSense,
    },
    dynamics::{
        constraints::{Constraint, ConstraintSet},
        eom::{self, EquationsOfMotion},
        forces::{
            AppliedForce, DamperForce, ForceGenerator, ForceKind, ForceRegistry, GravityForce,
            SpringForce,
        },
        integrator::{self, TimeGrid, Trajectory},
        state_space::StateSpace,
    },
    error::{ConfigurationError, Error, ModelError, Result},
    symbolic::{Dyadic, Expr, Vector},
    utils::allocator::{Arena, BodyId, ConstantId, CoordinateId, FrameId},
};

/// Name of the Newtonian frame every model starts with.
pub const NEWTONIAN: &str = "N";

/// Mechanism being modelled: frames, coordinates, constants, bodies, forces
/// and constraints.
///
/// Every builder call fails with [`Error::FrozenModel`] once
/// [`System::assemble`] has run.
#[derive(Debug)]
pub struct System {
    frames: FrameGraph,
    coordinates: Arena<CoordinateId, GeneralizedCoordinate>,
    constants: ConstantTable,
    points: Vec<Point>,
    bodies: BodyRegistry,
    forces: ForceRegistry,
    constraints: ConstraintSet,
    frozen: bool,
}

impl Default for System {
    fn default() -> Self {
        Self::new(RotationConvention::default())
    }
}

impl System {
    pub fn new(convention: RotationConvention) -> Self {
        Self {
            frames: FrameGraph::new(NEWTONIAN, convention),
            coordinates: Arena::new(),
            constants: ConstantTable::default(),
            points: vec![Point::origin("O")],
            bodies: BodyRegistry::new(),
            forces: ForceRegistry::new(),
            constraints: ConstraintSet::new(),
            frozen: false,
        }
    }

    fn ensure_mutable(&self, operation: &'static str) -> Result<()> {
        if self.frozen {
            return Err(Error::FrozenModel { operation });
        }
        Ok(())
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn newtonian(&self) -> FrameId {
        self.frames.root()
    }

    /// Fixed point at the Newtonian origin.
    pub fn origin(&self) -> Point {
        Point::origin("O")
    }

    pub fn frames(&self) -> &FrameGraph {
        &self.frames
    }

    pub fn bodies(&self) -> &BodyRegistry {
        &self.bodies
    }

    pub fn constraints(&self) -> &ConstraintSet {
        &self.constraints
    }

    pub fn forces(&self) -> &ForceRegistry {
        &self.forces
    }

    /// Declares a generalized coordinate with its initial position and rate.
    pub fn coordinate(
        &mut self,
        name: &str,
        initial_position: f64,
        initial_rate: f64,
    ) -> Result<CoordinateId> {
        self.ensure_mutable("declare a coordinate")?;
        debug!("declaring coordinate `{name}` = {initial_position} ({initial_rate}/s)");
        Ok(self.coordinates.insert(GeneralizedCoordinate {
            name: name.to_owned(),
            initial_position,
            initial_rate,
        }))
    }

    pub fn coordinates(&self) -> Vec<CoordinateId> {
        self.coordinates.ids().collect()
    }

    pub fn coordinate_info(&self, id: CoordinateId) -> Result<&GeneralizedCoordinate> {
        Ok(self
            .coordinates
            .get(id)
            .ok_or(ModelError::UnknownCoordinate(id.index()))?)
    }

    /// Declares a named constant and its default value.
    pub fn constant(&mut self, name: &str, value: f64) -> Result<ConstantId> {
        self.ensure_mutable("declare a constant")?;
        if self.constants.id(name).is_some() {
            return Err(
                ConfigurationError::InvalidSetting(format!("constant `{name}` declared twice"))
                    .into(),
            );
        }
        Ok(self.constants.declare(name, value))
    }

    /// Default constant values; clone and override per run.
    pub fn constants(&self) -> &ConstantTable {
        &self.constants
    }

    /// Length of an interleaved state row.
    pub fn state_len(&self) -> usize {
        2 * self.coordinates.len()
    }

    /// Interleaved `[q0, u0, q1, u1, ...]` from the declared initial conditions.
    pub fn initial_state(&self) -> Vec<f64> {
        self.coordinates
            .values()
            .flat_map(|c| [c.initial_position, c.initial_rate])
            .collect()
    }

    pub fn create_frame(&mut self, name: &str) -> Result<FrameId> {
        self.ensure_mutable("create a frame")?;
        self.frames.create_frame(name)
    }

    /// Rotates `frame` relative to `parent` by `coordinate` about `axis`.
    pub fn rotate(
        &mut self,
        frame: FrameId,
        parent: FrameId,
        axis: DVec3,
        coordinate: CoordinateId,
    ) -> Result<()> {
        self.rotate_with(
            frame,
            parent,
            Rotation {
                axis,
                coordinate,
                sense: RotationSense::Directed,
                offset: None,
            },
        )
    }

    /// Like [`System::rotate`] with a fixed angle added to the coordinate.
    pub fn rotate_with_offset(
        &mut self,
        frame: FrameId,
        parent: FrameId,
        axis: DVec3,
        coordinate: CoordinateId,
        offset: impl Into<Expr>,
    ) -> Result<()> {
        self.rotate_with(
            frame,
            parent,
            Rotation {
                axis,
                coordinate,
                sense: RotationSense::Directed,
                offset: Some(offset.into()),
            },
        )
    }

    pub fn rotate_with(
        &mut self,
        frame: FrameId,
        parent: FrameId,
        rotation: Rotation,
    ) -> Result<()> {
        self.ensure_mutable("rotate a frame")?;
        self.coordinate_info(rotation.coordinate)?;
        self.frames.rotate(frame, parent, rotation)
    }

    pub fn basis(&self, frame: FrameId) -> Result<[Vector; 3]> {
        self.frames.basis(frame)
    }

    pub fn angular_velocity(&self, frame: FrameId) -> Result<Vector> {
        self.frames.angular_velocity(frame)
    }

    /// Defines `name` at `base + offset`, offset given in `frame` components.
    pub fn define_point(
        &mut self,
        name: &str,
        base: &Point,
        frame: FrameId,
        offset: [Expr; 3],
    ) -> Result<Point> {
        self.ensure_mutable("define a point")?;
        let point = base.offset(name, &self.frames, frame, offset)?;
        debug!("defining point `{name}`");
        self.points.push(point.clone());
        Ok(point)
    }

    /// Previously defined point by name.
    pub fn point(&self, name: &str) -> Option<&Point> {
        self.points.iter().rev().find(|p| p.name == name)
    }

    /// Numeric position of `point` for one state row, using the default constants.
    pub fn position_of(&self, point: &Point, state: &[f64]) -> Result<DVec3> {
        point.position_of(state, &self.constants, self.coordinates.len())
    }

    pub fn velocity_of(&self, point: &Point) -> Vector {
        point.velocity()
    }

    pub fn acceleration_of(&self, point: &Point) -> Vector {
        point.acceleration()
    }

    pub fn attach_body(
        &mut self,
        name: &str,
        frame: FrameId,
        center_of_mass: &Point,
        mass: impl Into<Expr>,
        inertia: Dyadic,
    ) -> Result<BodyId> {
        self.ensure_mutable("attach a body")?;
        self.bodies.attach_body(
            &self.frames,
            name,
            frame,
            center_of_mass.clone(),
            mass.into(),
            inertia,
        )
    }

    pub fn attach_particle(
        &mut self,
        name: &str,
        point: &Point,
        mass: impl Into<Expr>,
    ) -> Result<BodyId> {
        self.ensure_mutable("attach a particle")?;
        Ok(self
            .bodies
            .attach_particle(name, point.clone(), mass.into()))
    }

    /// Registers a custom force generator.
    pub fn add_force<F: ForceGenerator + 'static>(&mut self, force: F) -> Result<()> {
        self.ensure_mutable("add a force")?;
        debug!("registering {:?} force", force.kind());
        self.forces.add_force(force);
        Ok(())
    }

    /// Applies `load` against `velocity` (a point velocity for forces, an
    /// angular velocity for torques).
    pub fn add_generalized_force(&mut self, load: Vector, velocity: Vector) -> Result<()> {
        self.ensure_mutable("add a force")?;
        debug!("registering applied load");
        self.forces.add_force(AppliedForce { load, velocity });
        Ok(())
    }

    /// Uniform gravity acting on every body, including ones attached later.
    pub fn add_gravity(&mut self, gravity: Vector) -> Result<()> {
        self.ensure_mutable("add gravity")?;
        debug!("registering gravity");
        self.forces.add_force(GravityForce::new(gravity));
        Ok(())
    }

    /// Spring load `-stiffness * deflection` acting against `velocity`.
    pub fn add_spring(
        &mut self,
        stiffness: impl Into<Expr>,
        deflection: Vector,
        velocity: Vector,
    ) -> Result<()> {
        self.ensure_mutable("add a spring")?;
        debug!("registering spring");
        self.forces.add_force(SpringForce {
            stiffness: stiffness.into(),
            deflection,
            velocity,
        });
        Ok(())
    }

    /// Damping load `-coefficient * velocity`.
    pub fn add_damper(&mut self, coefficient: impl Into<Expr>, velocity: Vector) -> Result<()> {
        self.ensure_mutable("add a damper")?;
        debug!("registering damper");
        self.forces.add_force(DamperForce {
            coefficient: coefficient.into(),
            velocity,
        });
        Ok(())
    }

    /// Adds the holonomic constraint `position == 0`.
    pub fn add_constraint(&mut self, name: &str, position: Expr) -> Result<()> {
        self.ensure_mutable("add a constraint")?;
        self.constraints.add(Constraint::new(name, position));
        Ok(())
    }

    /// Derives the unconstrained equations of motion and freezes the model.
    pub fn assemble(&mut self) -> Result<EquationsOfMotion> {
        if !self.frozen {
            info!(
                "freezing model: {} frames, {} coordinates, {} bodies, {} forces, {} constraints",
                self.frames.len(),
                self.coordinates.len(),
                self.bodies.len(),
                self.forces.len(),
                self.constraints.len()
            );
        }
        self.frozen = true;
        self.constraints
            .ensure_not_overconstrained(self.coordinates.len())?;
        eom::assemble(
            &self.frames,
            &self.bodies,
            &self.forces,
            &self.coordinates(),
        )
    }

    /// Assembles and compiles the constrained first-order form.
    pub fn state_space(&mut self) -> Result<StateSpace> {
        let eom = self.assemble()?;
        StateSpace::new(&eom, &self.constraints)
    }

    pub fn kinetic_energy(&self) -> Result<Expr> {
        let mut terms = Vec::with_capacity(self.bodies.len());
        for (_, body) in self.bodies.iter() {
            terms.push(body.kinetic_energy(&self.frames)?);
        }
        Ok(Expr::sum(terms))
    }

    /// Gravitational potential energy measured from `reference`.
    pub fn gravity_potential(&self, reference: &Point) -> Expr {
        self.forces
            .potential_energy(ForceKind::Gravity, &self.bodies, reference)
    }

    pub fn spring_potential(&self) -> Expr {
        self.forces
            .potential_energy(ForceKind::Spring, &self.bodies, &self.origin())
    }

    /// Kinetic plus gravitational (from the origin) plus spring energy.
    pub fn total_energy(&self) -> Result<Expr> {
        Ok(Expr::sum([
            self.kinetic_energy()?,
            self.gravity_potential(&self.origin()),
            self.spring_potential(),
        ]))
    }
}

/// What to do with an initial state that violates the constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InitialCondition {
    /// Refuse to integrate.
    #[default]
    Validate,
    /// Move the state onto the constraint manifold first.
    Project,
}

/// Compiled model plus everything needed to integrate it.
#[derive(Debug, Clone)]
pub struct Simulation {
    state_space: StateSpace,
    constants: ConstantTable,
    initial_state: Vec<f64>,
    config: IntegratorConfig,
    initial_condition: InitialCondition,
    tolerance: f64,
}

impl Simulation {
    /// Assembles (and freezes) `system`, taking its constants and initial state.
    pub fn new(system: &mut System) -> Result<Self> {
        let state_space = system.state_space()?;
        Ok(Self {
            state_space,
            constants: system.constants().clone(),
            initial_state: system.initial_state(),
            config: IntegratorConfig::default(),
            initial_condition: InitialCondition::default(),
            tolerance: CONSTRAINT_TOLERANCE,
        })
    }

    pub fn with_config(mut self, config: IntegratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_initial_condition(mut self, policy: InitialCondition) -> Self {
        self.initial_condition = policy;
        self
    }

    pub fn with_constraint_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_initial_state(mut self, state: Vec<f64>) -> Self {
        self.initial_state = state;
        self
    }

    pub fn set_constant(&mut self, name: &str, value: f64) -> Result<()> {
        self.constants.set_by_name(name, value)
    }

    pub fn constants(&self) -> &ConstantTable {
        &self.constants
    }

    pub fn constants_mut(&mut self) -> &mut ConstantTable {
        &mut self.constants
    }

    pub fn state_space(&self) -> &StateSpace {
        &self.state_space
    }

    pub fn initial_state(&self) -> &[f64] {
        &self.initial_state
    }

    /// Initial state after applying the [`InitialCondition`] policy.
    pub fn consistent_initial_state(&self) -> Result<Vec<f64>> {
        match self.initial_condition {
            InitialCondition::Validate => {
                self.state_space
                    .check_initial_state(&self.initial_state, &self.constants, self.tolerance)?;
                Ok(self.initial_state.clone())
            }
            InitialCondition::Project => self.state_space.project_initial_state(
                &self.initial_state,
                &self.constants,
                self.tolerance,
            ),
        }
    }

    /// Integrates over `grid`; the result holds one state row per grid time.
    pub fn run(&self, grid: &TimeGrid) -> Result<Trajectory> {
        let initial = self.consistent_initial_state()?;
        integrator::integrate(
            self.state_space.rhs(&self.constants),
            &initial,
            grid,
            &self.config,
        )
    }
}

/// Assemble, invert, check the initial state and integrate in one call.
pub fn simulate(
    system: &mut System,
    grid: &TimeGrid,
    config: &IntegratorConfig,
) -> Result<Trajectory> {
    Simulation::new(system)?.with_config(*config).run(grid)
}
