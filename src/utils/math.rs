//! Numeric helpers for inertia properties, layered on top of `glam`.

use glam::{DMat3, DVec3};

use crate::symbolic::{Dyadic, Expr};

/// Principal moments of a uniform slender rod of `length` along its local x axis.
pub fn slender_rod_inertia(mass: f64, length: f64) -> DVec3 {
    let transverse = mass * length * length / 12.0;
    DVec3::new(0.0, transverse, transverse)
}

/// Principal moments of a solid box with the given full extents.
pub fn box_inertia(mass: f64, extents: DVec3) -> DVec3 {
    let sq = extents * extents;
    DVec3::new(sq.y + sq.z, sq.x + sq.z, sq.x + sq.y) * (mass / 12.0)
}

/// Moves principal moments about the center of mass to a parallel axis
/// offset by `offset`.
pub fn parallel_axis(inertia: DMat3, mass: f64, offset: DVec3) -> DMat3 {
    let shift = DMat3::from_diagonal(DVec3::splat(offset.length_squared()))
        - DMat3::from_cols(offset * offset.x, offset * offset.y, offset * offset.z);
    inertia + shift * mass
}

/// Numeric principal moments as a symbolic dyadic.
pub fn principal_dyadic(moments: DVec3) -> Dyadic {
    Dyadic::diagonal(
        Expr::number(moments.x),
        Expr::number(moments.y),
        Expr::number(moments.z),
    )
}

/// Wraps an angle into `(-pi, pi]`.
pub fn wrap_angle(angle: f64) -> f64 {
    let two_pi = std::f64::consts::TAU;
    let wrapped = angle.rem_euclid(two_pi);
    if wrapped > std::f64::consts::PI {
        wrapped - two_pi
    } else {
        wrapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn rod_about_end_matches_textbook() {
        let (m, l) = (0.03, 0.18);
        let com = DMat3::from_diagonal(slender_rod_inertia(m, l));
        let end = parallel_axis(com, m, DVec3::new(l / 2.0, 0.0, 0.0));
        assert_relative_eq!(end.z_axis.z, m * l * l / 3.0, epsilon = 1e-15);
        assert_relative_eq!(end.x_axis.x, 0.0, epsilon = 1e-15);
    }

    #[test]
    fn box_is_symmetric_for_cube() {
        let i = box_inertia(6.0, DVec3::splat(1.0));
        assert_relative_eq!(i.x, 1.0);
        assert_relative_eq!(i.y, i.z);
    }

    #[test]
    fn angles_wrap_into_principal_range() {
        assert_relative_eq!(
            wrap_angle(2.5 * std::f64::consts::PI),
            0.5 * std::f64::consts::PI,
            epsilon = 1e-12
        );
        assert_relative_eq!(wrap_angle(-0.5), -0.5, epsilon = 1e-12);
    }
}
