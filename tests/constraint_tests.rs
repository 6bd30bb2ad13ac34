use approx::{assert_abs_diff_eq, assert_relative_eq};
use linkage_dynamics::*;

/// Point mass on Cartesian coordinates `(x, y)` held at distance `length`
/// from the origin by a single constraint.
fn cartesian_pendulum(mass: f64, length: f64, x0: f64, y0: f64) -> System {
    let mut sys = System::default();
    let x = sys.coordinate("x", x0, 0.0).unwrap();
    let y = sys.coordinate("y", y0, 0.0).unwrap();
    let m = sys.constant("m", mass).unwrap();
    let l = sys.constant("l", length).unwrap();
    let g = sys.constant("g", 9.81).unwrap();

    let bob = Point::new("bob", Vector::new(x.q(), y.q(), Expr::zero()));
    sys.attach_particle("bob", &bob, m.expr()).unwrap();
    sys.add_gravity(Vector::new(Expr::zero(), -g.expr(), Expr::zero()))
        .unwrap();
    sys.add_constraint("rod", x.q() * x.q() + y.q() * y.q() - l.expr() * l.expr())
        .unwrap();
    sys
}

#[test]
fn more_constraints_than_coordinates_is_a_model_error() {
    let mut sys = cartesian_pendulum(1.0, 1.0, 0.0, -1.0);
    let x = sys.coordinates()[0];
    let y = sys.coordinates()[1];
    sys.add_constraint("x_fixed", x.q()).unwrap();
    sys.add_constraint("y_fixed", y.q() + 1.0).unwrap();

    let err = sys.state_space().unwrap_err();
    assert!(matches!(
        err,
        Error::Model(ModelError::OverConstrained {
            constraints: 3,
            coordinates: 2
        })
    ));
    assert_eq!(err.kind(), ErrorKind::Model);
}

#[test]
fn multipliers_carry_the_rod_tension() {
    let (m, l) = (0.4, 0.5);
    let mut sys = cartesian_pendulum(m, l, 0.0, -l);
    let space = sys.state_space().unwrap();
    let state = sys.initial_state();

    let solution = space
        .solve_with_multipliers(&state, 0.0, sys.constants())
        .unwrap();
    assert_abs_diff_eq!(solution.accelerations[0], 0.0, epsilon = 1e-12);
    assert_abs_diff_eq!(solution.accelerations[1], 0.0, epsilon = 1e-12);
    assert_eq!(solution.multipliers.len(), 1);

    // J = [2x, 2y]; the generalized constraint force J^T * lambda holds the bob up.
    let jacobian = space.constraints().jacobian(&state, sys.constants()).unwrap();
    assert_relative_eq!(jacobian[(0, 1)], -2.0 * l, epsilon = 1e-14);
    assert_relative_eq!(
        jacobian[(0, 1)] * solution.multipliers[0],
        m * 9.81,
        epsilon = 1e-12
    );
}

#[test]
fn swinging_pendulum_accelerations_respect_the_rod() {
    let mut sys = cartesian_pendulum(1.0, 1.0, 0.6, -0.8);
    let space = sys.state_space().unwrap();
    // Tangential velocity keeps the velocity constraint satisfied.
    let state = [0.6, 0.8 * 1.5, -0.8, 0.6 * 1.5];
    let derivative = space.derivative(&state, 0.0, sys.constants()).unwrap();

    // d2/dt2 (x^2 + y^2) = 2(x ax + vx^2 + y ay + vy^2) = 0
    let (x, vx, ax) = (state[0], state[1], derivative[1]);
    let (y, vy, ay) = (state[2], state[3], derivative[3]);
    assert_abs_diff_eq!(x * ax + vx * vx + y * ay + vy * vy, 0.0, epsilon = 1e-12);
    // Centripetal magnitude v^2 / l plus the radial share of gravity.
    assert_relative_eq!(ax, -0.6 * (1.5f64.powi(2) + 0.8 * 9.81), epsilon = 1e-10);
}

#[test]
fn redundant_constraints_surface_as_integration_errors() {
    let mut sys = System::default();
    let n = sys.newtonian();
    let q1 = sys.coordinate("q1", 0.5, 0.0).unwrap();
    let q2 = sys.coordinate("q2", 0.0, 0.0).unwrap();
    let a = sys.create_frame("A").unwrap();
    let b = sys.create_frame("B").unwrap();
    sys.rotate(a, n, DVec3::Z, q1).unwrap();
    sys.rotate(b, a, DVec3::Z, q2).unwrap();
    let origin = sys.origin();
    sys.attach_body("a", a, &origin, 1.0, Dyadic::diagonal(1.0, 1.0, 1.0))
        .unwrap();
    sys.attach_body("b", b, &origin, 1.0, Dyadic::diagonal(1.0, 1.0, 1.0))
        .unwrap();
    sys.add_constraint("lock", q1.q() - 0.5).unwrap();
    sys.add_constraint("lock again", q1.q().scale(2.0) - 1.0)
        .unwrap();

    let space = sys.state_space().unwrap();
    let err = space
        .derivative(&sys.initial_state(), 0.25, sys.constants())
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Integration(IntegrationError::SingularSystem { time, .. }) if time == 0.25
    ));

    let grid = TimeGrid::frames(0.0, 1.0).unwrap();
    let result = Simulation::new(&mut sys).unwrap().run(&grid);
    assert_eq!(result.unwrap_err().kind(), ErrorKind::Integration);
}

#[test]
fn inconsistent_initial_positions_are_rejected() {
    let mut params = FourBarParameters::default();
    params.initial_angles[2] = (-50f64).to_radians();
    let mut model = four_bar(&params).unwrap();
    let simulation = Simulation::new(&mut model.system).unwrap();

    let err = simulation.run(&TimeGrid::frames(0.0, 1.0).unwrap()).unwrap_err();
    match err {
        Error::Model(ModelError::InconsistentInitialState {
            level, residual, ..
        }) => {
            assert_eq!(level, ConstraintLevel::Position);
            assert!(residual.abs() > 1e-3);
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn inconsistent_initial_rates_are_rejected() {
    let mut params = FourBarParameters::default();
    params.initial_rates = [1.0, 0.0, 0.0];
    let mut model = four_bar(&params).unwrap();
    let simulation = Simulation::new(&mut model.system).unwrap();

    assert!(matches!(
        simulation.consistent_initial_state(),
        Err(Error::Model(ModelError::InconsistentInitialState {
            level: ConstraintLevel::Velocity,
            ..
        }))
    ));
}

#[test]
fn projection_moves_the_state_onto_the_constraints() {
    let mut params = FourBarParameters::default();
    params.initial_angles[2] = (-50f64).to_radians();
    params.initial_rates = [0.5, 0.0, 0.0];
    let mut model = four_bar(&params).unwrap();
    let simulation = Simulation::new(&mut model.system)
        .unwrap()
        .with_initial_condition(InitialCondition::Project);

    let projected = simulation.consistent_initial_state().unwrap();
    let constraints = simulation.state_space().constraints();
    for residual in constraints
        .position_residuals(&projected, simulation.constants())
        .unwrap()
    {
        assert_abs_diff_eq!(residual, 0.0, epsilon = 1e-9);
    }
    for residual in constraints
        .velocity_residuals(&projected, simulation.constants())
        .unwrap()
    {
        assert_abs_diff_eq!(residual, 0.0, epsilon = 1e-9);
    }
    // The projected state passes validation.
    simulation
        .state_space()
        .check_initial_state(&projected, simulation.constants(), 1e-9)
        .unwrap();
}

#[test]
fn constraint_evaluators_reject_rows_of_the_wrong_length() {
    let mut sys = cartesian_pendulum(1.0, 1.0, 0.0, -1.0);
    let space = sys.state_space().unwrap();
    let constraints = space.constraints();
    let state = sys.initial_state();
    let long = [state.as_slice(), &[0.0, 0.0][..]].concat();

    assert!(constraints.position_residuals(&state, sys.constants()).is_ok());
    for result in [
        constraints.position_residuals(&long, sys.constants()),
        constraints.velocity_residuals(&long, sys.constants()),
    ] {
        assert!(matches!(
            result,
            Err(Error::Configuration(ConfigurationError::StateLength {
                expected: 4,
                got: 6
            }))
        ));
    }
    assert!(constraints.jacobian(&long, sys.constants()).is_err());
}
