//! Symbolic vectors, rotation matrices and inertia dyadics.
//!
//! Every [`Vector`] carries its components in the Newtonian frame. Frame
//! basis vectors are the columns of the frame's composed [`Orientation`], so
//! `l * A.x` becomes `l * orientation(A).column(0)`.

use std::ops::{Add, Neg, Sub};

use glam::DVec3;

use super::expr::{Bindings, Expr, Symbol};
use crate::error::Result;

/// Three scalar expressions in Newtonian components.
#[derive(Debug, Clone, PartialEq)]
pub struct Vector {
    pub x: Expr,
    pub y: Expr,
    pub z: Expr,
}

impl Default for Vector {
    fn default() -> Self {
        Self::zero()
    }
}

impl Vector {
    pub fn new(x: Expr, y: Expr, z: Expr) -> Self {
        Self { x, y, z }
    }

    pub fn zero() -> Self {
        Self::new(Expr::zero(), Expr::zero(), Expr::zero())
    }

    pub fn from_numeric(v: DVec3) -> Self {
        Self::new(Expr::number(v.x), Expr::number(v.y), Expr::number(v.z))
    }

    pub fn components(&self) -> [&Expr; 3] {
        [&self.x, &self.y, &self.z]
    }

    fn map(&self, f: impl Fn(&Expr) -> Expr) -> Vector {
        Vector::new(f(&self.x), f(&self.y), f(&self.z))
    }

    pub fn is_zero(&self) -> bool {
        self.x.is_zero() && self.y.is_zero() && self.z.is_zero()
    }

    pub fn scale(&self, factor: &Expr) -> Vector {
        self.map(|c| c * factor)
    }

    pub fn dot(&self, other: &Vector) -> Expr {
        Expr::sum([&self.x * &other.x, &self.y * &other.y, &self.z * &other.z])
    }

    pub fn cross(&self, other: &Vector) -> Vector {
        Vector::new(
            &self.y * &other.z - &self.z * &other.y,
            &self.z * &other.x - &self.x * &other.z,
            &self.x * &other.y - &self.y * &other.x,
        )
    }

    pub fn time_derivative(&self) -> Vector {
        self.map(Expr::time_derivative)
    }

    /// Component-wise partial derivative; with a rate symbol this is the
    /// partial velocity.
    pub fn partial(&self, symbol: Symbol) -> Vector {
        self.map(|c| c.partial(symbol))
    }

    pub fn evaluate(&self, bindings: &dyn Bindings) -> Result<DVec3> {
        Ok(DVec3::new(
            self.x.evaluate(bindings)?,
            self.y.evaluate(bindings)?,
            self.z.evaluate(bindings)?,
        ))
    }
}

impl Add for Vector {
    type Output = Vector;
    fn add(self, rhs: Vector) -> Vector {
        &self + &rhs
    }
}

impl Add<&Vector> for &Vector {
    type Output = Vector;
    fn add(self, rhs: &Vector) -> Vector {
        Vector::new(&self.x + &rhs.x, &self.y + &rhs.y, &self.z + &rhs.z)
    }
}

impl Sub for Vector {
    type Output = Vector;
    fn sub(self, rhs: Vector) -> Vector {
        &self - &rhs
    }
}

impl Sub<&Vector> for &Vector {
    type Output = Vector;
    fn sub(self, rhs: &Vector) -> Vector {
        Vector::new(&self.x - &rhs.x, &self.y - &rhs.y, &self.z - &rhs.z)
    }
}

impl Neg for Vector {
    type Output = Vector;
    fn neg(self) -> Vector {
        self.map(|c| -c)
    }
}

impl Neg for &Vector {
    type Output = Vector;
    fn neg(self) -> Vector {
        self.map(|c| -c)
    }
}

/// Rotation matrix from a frame to the Newtonian frame, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Orientation {
    m: [[Expr; 3]; 3],
}

impl Orientation {
    pub fn identity() -> Self {
        Self {
            m: std::array::from_fn(|i| {
                std::array::from_fn(|j| if i == j { Expr::one() } else { Expr::zero() })
            }),
        }
    }

    /// Rotation by `angle` about the unit `axis` (Rodrigues' formula).
    pub fn about_axis(axis: DVec3, angle: &Expr) -> Self {
        let k = axis.to_array();
        let c = angle.cos();
        let s = angle.sin();
        let skew = [
            [0.0, -k[2], k[1]],
            [k[2], 0.0, -k[0]],
            [-k[1], k[0], 0.0],
        ];
        Self {
            m: std::array::from_fn(|i| {
                std::array::from_fn(|j| {
                    let kk = k[i] * k[j];
                    let delta = if i == j { 1.0 } else { 0.0 };
                    Expr::sum([
                        c.scale(delta - kk),
                        s.scale(skew[i][j]),
                        Expr::number(kk),
                    ])
                })
            }),
        }
    }

    pub fn element(&self, row: usize, col: usize) -> &Expr {
        &self.m[row][col]
    }

    /// `self * other`.
    pub fn compose(&self, other: &Orientation) -> Orientation {
        Self {
            m: std::array::from_fn(|i| {
                std::array::from_fn(|j| {
                    Expr::sum((0..3).map(|k| &self.m[i][k] * &other.m[k][j]))
                })
            }),
        }
    }

    /// Basis vector `index` of the rotated frame, in Newtonian components.
    pub fn column(&self, index: usize) -> Vector {
        Vector::new(
            self.m[0][index].clone(),
            self.m[1][index].clone(),
            self.m[2][index].clone(),
        )
    }

    /// Maps components expressed in the rotated frame to Newtonian components.
    pub fn apply(&self, local: &Vector) -> Vector {
        let v = local.components();
        let row = |i: usize| Expr::sum((0..3).map(|k| &self.m[i][k] * v[k]));
        Vector::new(row(0), row(1), row(2))
    }

    /// Maps Newtonian components into the rotated frame.
    pub fn apply_transpose(&self, global: &Vector) -> Vector {
        let v = global.components();
        let row = |i: usize| Expr::sum((0..3).map(|k| &self.m[k][i] * v[k]));
        Vector::new(row(0), row(1), row(2))
    }
}

/// Symmetric second-order tensor expressed in a body's own frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Dyadic {
    pub xx: Expr,
    pub yy: Expr,
    pub zz: Expr,
    pub xy: Expr,
    pub yz: Expr,
    pub zx: Expr,
}

impl Dyadic {
    /// Principal moments only.
    pub fn diagonal(xx: impl Into<Expr>, yy: impl Into<Expr>, zz: impl Into<Expr>) -> Self {
        Self {
            xx: xx.into(),
            yy: yy.into(),
            zz: zz.into(),
            xy: Expr::zero(),
            yz: Expr::zero(),
            zx: Expr::zero(),
        }
    }

    pub fn zero() -> Self {
        Self::diagonal(0.0, 0.0, 0.0)
    }

    /// Dyadic-vector product with both in the same (body) frame.
    pub fn apply(&self, v: &Vector) -> Vector {
        Vector::new(
            Expr::sum([&self.xx * &v.x, &self.xy * &v.y, &self.zx * &v.z]),
            Expr::sum([&self.xy * &v.x, &self.yy * &v.y, &self.yz * &v.z]),
            Expr::sum([&self.zx * &v.x, &self.yz * &v.y, &self.zz * &v.z]),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::allocator::{ArenaId, CoordinateId};

    #[test]
    fn z_rotation_reduces_to_planar_matrix() {
        let q = Expr::symbol(Symbol::position(CoordinateId::from_index(0)));
        let r = Orientation::about_axis(DVec3::Z, &q);

        assert_eq!(*r.element(0, 0), q.cos());
        assert_eq!(*r.element(1, 0), q.sin());
        assert_eq!(*r.element(0, 1), -q.sin());
        assert_eq!(*r.element(2, 2), Expr::one());
        assert!(r.element(0, 2).is_zero());
        assert!(r.element(2, 0).is_zero());
    }

    #[test]
    fn cross_product_of_basis_vectors() {
        let x = Vector::from_numeric(DVec3::X);
        let y = Vector::from_numeric(DVec3::Y);
        assert_eq!(x.cross(&y), Vector::from_numeric(DVec3::Z));
        assert!(x.dot(&y).is_zero());
    }
}
