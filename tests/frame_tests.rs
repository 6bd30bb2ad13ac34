use approx::assert_relative_eq;
use linkage_dynamics::core::StateBindings;
use linkage_dynamics::*;

fn two_link(convention: RotationConvention) -> (System, Point, [FrameId; 2]) {
    let mut sys = System::new(convention);
    let n = sys.newtonian();
    let q1 = sys.coordinate("q1", 0.0, 0.0).unwrap();
    let q2 = sys.coordinate("q2", 0.0, 0.0).unwrap();
    let a = sys.create_frame("A").unwrap();
    let b = sys.create_frame("B").unwrap();
    sys.rotate(a, n, DVec3::Z, q1).unwrap();
    sys.rotate(b, a, DVec3::Z, q2).unwrap();

    let origin = sys.origin();
    let elbow = sys
        .define_point("elbow", &origin, a, [Expr::number(1.0), Expr::zero(), Expr::zero()])
        .unwrap();
    let hand = sys
        .define_point("hand", &elbow, b, [Expr::number(0.5), Expr::zero(), Expr::zero()])
        .unwrap();
    (sys, hand, [a, b])
}

#[test]
fn sequential_and_absolute_conventions_agree() {
    let (relative, hand_rel, frames_rel) = two_link(RotationConvention::Sequential);
    let (absolute, hand_abs, frames_abs) = two_link(RotationConvention::Absolute);
    let (q1, q2, u1, u2) = (0.7, -1.1, 0.3, 2.0);

    let rel_state = [q1, u1, q2, u2];
    let abs_state = [q1, u1, q1 + q2, u1 + u2];
    let rel = StateBindings::new(&rel_state, relative.constants());
    let abs = StateBindings::new(&abs_state, absolute.constants());

    let p_rel = hand_rel.position.evaluate(&rel).unwrap();
    let p_abs = hand_abs.position.evaluate(&abs).unwrap();
    assert_relative_eq!(p_rel.x, p_abs.x, epsilon = 1e-12);
    assert_relative_eq!(p_rel.y, p_abs.y, epsilon = 1e-12);
    assert_relative_eq!(p_rel.x, q1.cos() + 0.5 * (q1 + q2).cos(), epsilon = 1e-12);

    let v_rel = relative.velocity_of(&hand_rel).evaluate(&rel).unwrap();
    let v_abs = absolute.velocity_of(&hand_abs).evaluate(&abs).unwrap();
    assert_relative_eq!(v_rel.x, v_abs.x, epsilon = 1e-12);
    assert_relative_eq!(v_rel.y, v_abs.y, epsilon = 1e-12);

    let w_rel = relative
        .angular_velocity(frames_rel[1])
        .unwrap()
        .evaluate(&rel)
        .unwrap();
    let w_abs = absolute
        .angular_velocity(frames_abs[1])
        .unwrap()
        .evaluate(&abs)
        .unwrap();
    assert_relative_eq!(w_rel.z, u1 + u2, epsilon = 1e-12);
    assert_relative_eq!(w_abs.z, u1 + u2, epsilon = 1e-12);
}

#[test]
fn basis_vectors_stay_orthonormal() {
    let mut sys = System::default();
    let n = sys.newtonian();
    let q1 = sys.coordinate("q1", 0.0, 0.0).unwrap();
    let q2 = sys.coordinate("q2", 0.0, 0.0).unwrap();
    let a = sys.create_frame("A").unwrap();
    let b = sys.create_frame("B").unwrap();
    sys.rotate(a, n, DVec3::Z, q1).unwrap();
    sys.rotate(b, a, DVec3::new(1.0, 1.0, 0.0), q2).unwrap();

    let state = [0.4, 0.0, 1.3, 0.0];
    let bindings = StateBindings::new(&state, sys.constants());
    let basis: Vec<DVec3> = sys
        .basis(b)
        .unwrap()
        .iter()
        .map(|v| v.evaluate(&bindings).unwrap())
        .collect();
    for i in 0..3 {
        for j in 0..3 {
            let expected = if i == j { 1.0 } else { 0.0 };
            assert_relative_eq!(basis[i].dot(basis[j]), expected, epsilon = 1e-12);
        }
    }
    assert_relative_eq!(basis[0].cross(basis[1]).dot(basis[2]), 1.0, epsilon = 1e-12);
}

#[test]
fn point_velocity_is_exact_derivative() {
    let mut sys = System::default();
    let n = sys.newtonian();
    let q = sys.coordinate("q", 0.0, 0.0).unwrap();
    let len = sys.constant("L", 2.0).unwrap();
    let a = sys.create_frame("A").unwrap();
    sys.rotate(a, n, DVec3::Z, q).unwrap();
    let origin = sys.origin();
    let tip = sys
        .define_point("tip", &origin, a, [len.expr(), Expr::zero(), Expr::zero()])
        .unwrap();

    let (angle, rate) = (0.9, -1.7);
    let state = [angle, rate];
    let bindings = StateBindings::new(&state, sys.constants());
    let v = sys.velocity_of(&tip).evaluate(&bindings).unwrap();
    assert_relative_eq!(v.x, -2.0 * rate * angle.sin(), epsilon = 1e-12);
    assert_relative_eq!(v.y, 2.0 * rate * angle.cos(), epsilon = 1e-12);

    // Centripetal part only, since the acceleration symbol reads as zero.
    let acc = sys.acceleration_of(&tip).evaluate(&bindings).unwrap();
    assert_relative_eq!(acc.x, -2.0 * rate * rate * angle.cos(), epsilon = 1e-12);
    assert_relative_eq!(acc.y, -2.0 * rate * rate * angle.sin(), epsilon = 1e-12);
}

#[test]
fn offset_shifts_orientation_but_not_angular_velocity() {
    let mut sys = System::default();
    let n = sys.newtonian();
    let q = sys.coordinate("q", 0.0, 0.0).unwrap();
    let preload = sys.constant("preload", std::f64::consts::FRAC_PI_2).unwrap();
    let a = sys.create_frame("A").unwrap();
    sys.rotate_with_offset(a, n, DVec3::Z, q, preload.expr()).unwrap();

    let state = [0.0, 3.0];
    let bindings = StateBindings::new(&state, sys.constants());
    let x_axis = sys.basis(a).unwrap()[0].evaluate(&bindings).unwrap();
    assert_relative_eq!(x_axis.x, 0.0, epsilon = 1e-12);
    assert_relative_eq!(x_axis.y, 1.0, epsilon = 1e-12);
    let w = sys.angular_velocity(a).unwrap().evaluate(&bindings).unwrap();
    assert_relative_eq!(w.z, 3.0, epsilon = 1e-12);
}

#[test]
fn rotating_a_frame_twice_is_rejected() {
    let mut sys = System::default();
    let n = sys.newtonian();
    let q = sys.coordinate("q", 0.0, 0.0).unwrap();
    let a = sys.create_frame("A").unwrap();
    sys.rotate(a, n, DVec3::Z, q).unwrap();

    let err = sys.rotate(a, n, DVec3::X, q).unwrap_err();
    assert!(matches!(err, Error::Model(ModelError::DuplicateRotation(ref name)) if name == "A"));
    assert_eq!(err.kind(), ErrorKind::Model);
}

#[test]
fn malformed_frame_graphs_are_rejected() {
    let mut sys = System::default();
    let n = sys.newtonian();
    let q = sys.coordinate("q", 0.0, 0.0).unwrap();
    let a = sys.create_frame("A").unwrap();
    let b = sys.create_frame("B").unwrap();

    assert!(matches!(
        sys.create_frame("A"),
        Err(Error::Model(ModelError::DuplicateFrameName(_)))
    ));
    assert!(matches!(
        sys.rotate(n, a, DVec3::Z, q),
        Err(Error::Model(ModelError::RotatingNewtonian(_)))
    ));
    assert!(matches!(
        sys.rotate(a, n, DVec3::ZERO, q),
        Err(Error::Model(ModelError::ZeroAxis(_)))
    ));

    sys.rotate(a, b, DVec3::Z, q).unwrap();
    assert!(matches!(
        sys.rotate(b, a, DVec3::Z, q),
        Err(Error::Model(ModelError::RotationCycle { .. }))
    ));
    // `b` never reaches the Newtonian frame, so neither does `a`.
    assert!(matches!(
        sys.basis(a),
        Err(Error::Model(ModelError::UnrootedFrame(_)))
    ));
}
