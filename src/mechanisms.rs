//! Ready-made planar mechanisms.

use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_GRAVITY;
use crate::core::{Point, RotationConvention};
use crate::error::Result;
use crate::symbolic::{Dyadic, Expr};
use crate::system::System;
use crate::utils::allocator::{CoordinateId, FrameId};

/// Physical parameters of the three-link chain with a pinned tip.
///
/// Angles are absolute, measured from the Newtonian x axis about z.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FourBarParameters {
    pub lengths: [f64; 3],
    pub masses: [f64; 3],
    /// Principal moment about every axis, per link.
    pub inertias: [f64; 3],
    pub gravity: f64,
    /// Rotational damper on the input link.
    pub damping: f64,
    /// Rotational spring on the input link.
    pub stiffness: f64,
    /// Spring neutral angle.
    pub preload: f64,
    pub initial_angles: [f64; 3],
    pub initial_rates: [f64; 3],
    /// Where the tip of the last link is pinned.
    pub pin: [f64; 2],
}

impl Default for FourBarParameters {
    fn default() -> Self {
        Self {
            lengths: [0.06, 0.18, 0.06],
            masses: [0.01, 0.03, 0.01],
            inertias: [1.0, 1.0, 1.0],
            gravity: DEFAULT_GRAVITY,
            damping: 0.0,
            stiffness: 0.0,
            preload: 90f64.to_radians(),
            initial_angles: [
                120f64.to_radians(),
                0f64.to_radians(),
                (-60f64).to_radians(),
            ],
            initial_rates: [0.0; 3],
            pin: [0.18, 0.0],
        }
    }
}

/// Built model plus the handles callers need to inspect it.
#[derive(Debug)]
pub struct FourBar {
    pub system: System,
    pub coordinates: [CoordinateId; 3],
    pub frames: [FrameId; 3],
    /// Joint points from the ground pivot to the pinned tip.
    pub joints: [Point; 4],
    pub pin: DVec3,
}

impl FourBar {
    pub fn tip(&self) -> &Point {
        &self.joints[3]
    }
}

/// Three links `A`, `B`, `C` hung from the origin, with the end of `C`
/// constrained to the pin. Gravity acts along `-y`; the spring and damper
/// act on the absolute angle of `A`.
pub fn four_bar(params: &FourBarParameters) -> Result<FourBar> {
    let mut sys = System::new(RotationConvention::Absolute);
    let n = sys.newtonian();
    let z = DVec3::Z;

    let l = [
        sys.constant("lA", params.lengths[0])?,
        sys.constant("lB", params.lengths[1])?,
        sys.constant("lC", params.lengths[2])?,
    ];
    let m = [
        sys.constant("mA", params.masses[0])?,
        sys.constant("mB", params.masses[1])?,
        sys.constant("mC", params.masses[2])?,
    ];
    let inertia = [
        sys.constant("I_A", params.inertias[0])?,
        sys.constant("I_B", params.inertias[1])?,
        sys.constant("I_C", params.inertias[2])?,
    ];
    let g = sys.constant("g", params.gravity)?;
    let b = sys.constant("b", params.damping)?;
    let k = sys.constant("k", params.stiffness)?;
    let preload = sys.constant("preload", params.preload)?;
    let pin_x = sys.constant("x_pin", params.pin[0])?;
    let pin_y = sys.constant("y_pin", params.pin[1])?;

    let q = [
        sys.coordinate("qA", params.initial_angles[0], params.initial_rates[0])?,
        sys.coordinate("qB", params.initial_angles[1], params.initial_rates[1])?,
        sys.coordinate("qC", params.initial_angles[2], params.initial_rates[2])?,
    ];

    let frames = [
        sys.create_frame("A")?,
        sys.create_frame("B")?,
        sys.create_frame("C")?,
    ];
    sys.rotate(frames[0], n, z, q[0])?;
    sys.rotate(frames[1], frames[0], z, q[1])?;
    sys.rotate(frames[2], frames[1], z, q[2])?;

    let along = |length: Expr| [length, Expr::zero(), Expr::zero()];
    let p_na = sys.origin();
    let p_ab = sys.define_point("pAB", &p_na, frames[0], along(l[0].expr()))?;
    let p_bc = sys.define_point("pBC", &p_ab, frames[1], along(l[1].expr()))?;
    let p_cd = sys.define_point("pCD", &p_bc, frames[2], along(l[2].expr()))?;

    let joints = [p_na, p_ab, p_bc, p_cd];
    for (i, name) in ["A", "B", "C"].into_iter().enumerate() {
        let com = sys.define_point(
            &format!("p{name}cm"),
            &joints[i],
            frames[i],
            along(l[i].expr().scale(0.5)),
        )?;
        let moment = inertia[i].expr();
        sys.attach_body(
            &format!("Body{name}"),
            frames[i],
            &com,
            m[i].expr(),
            Dyadic::diagonal(moment.clone(), moment.clone(), moment),
        )?;
    }

    let [nx, ny, nz] = sys.basis(n)?;
    let w_na = sys.angular_velocity(frames[0])?;

    sys.add_damper(b.expr(), w_na.clone())?;
    let deflection = nz.scale(&(q[0].q() - preload.expr()));
    sys.add_spring(k.expr(), deflection, w_na)?;
    sys.add_gravity(ny.scale(&-g.expr()))?;

    let tip = &joints[3].position;
    sys.add_constraint("tip_x", tip.dot(&nx) - pin_x.expr())?;
    sys.add_constraint("tip_y", tip.dot(&ny) - pin_y.expr())?;

    Ok(FourBar {
        system: sys,
        coordinates: q,
        frames,
        joints,
        pin: DVec3::new(params.pin[0], params.pin[1], 0.0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn default_geometry_closes_on_the_pin() {
        let model = four_bar(&FourBarParameters::default()).unwrap();
        let state = model.system.initial_state();
        let tip = model.system.position_of(model.tip(), &state).unwrap();
        assert_abs_diff_eq!(tip.x, 0.18, epsilon = 1e-12);
        assert_abs_diff_eq!(tip.y, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn model_declares_three_coordinates_and_two_constraints() {
        let model = four_bar(&FourBarParameters::default()).unwrap();
        assert_eq!(model.system.coordinates().len(), 3);
        assert_eq!(model.system.constraints().len(), 2);
        assert_eq!(model.system.bodies().len(), 3);
    }
}
