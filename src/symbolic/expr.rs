//! Scalar expression tree with exact differentiation.
//!
//! Expressions are immutable and reference counted, so cloning is cheap and
//! common sub-trees (e.g. `cos(q)` of a frame rotation) are shared between
//! every expression that uses them. Constructors simplify eagerly: nested
//! sums and products are flattened, numbers are folded, zeros and ones are
//! dropped and like terms of a sum are merged. Simplification is purely
//! structural and deterministic, so building the same model twice yields
//! identical trees.

use std::collections::HashSet;
use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};
use std::sync::Arc;

use crate::error::Result;
use crate::utils::allocator::{ConstantId, CoordinateId};

/// A generalized coordinate differentiated `order` times with respect to time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol {
    pub coordinate: CoordinateId,
    pub order: u8,
}

impl Symbol {
    pub fn position(coordinate: CoordinateId) -> Self {
        Self {
            coordinate,
            order: 0,
        }
    }

    pub fn rate(coordinate: CoordinateId) -> Self {
        Self {
            coordinate,
            order: 1,
        }
    }

    pub fn acceleration(coordinate: CoordinateId) -> Self {
        Self {
            coordinate,
            order: 2,
        }
    }

    /// The symbol one time-derivative higher.
    pub fn differentiated(self) -> Self {
        Self {
            coordinate: self.coordinate,
            order: self.order + 1,
        }
    }
}

/// Node of the expression tree.
#[derive(Debug, PartialEq)]
pub enum Node {
    Number(f64),
    Constant(ConstantId),
    Coordinate(Symbol),
    Sum(Vec<Expr>),
    Product(Vec<Expr>),
    Sin(Expr),
    Cos(Expr),
}

/// Values for the leaves of an expression.
pub trait Bindings {
    fn constant(&self, id: ConstantId) -> Result<f64>;
    fn coordinate(&self, symbol: Symbol) -> Result<f64>;
}

/// Shared handle to an immutable expression node.
#[derive(Clone)]
pub struct Expr(Arc<Node>);

impl PartialEq for Expr {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || *self.0 == *other.0
    }
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl Expr {
    fn from_node(node: Node) -> Self {
        Self(Arc::new(node))
    }

    pub fn node(&self) -> &Node {
        &self.0
    }

    pub(crate) fn ptr(&self) -> *const Node {
        Arc::as_ptr(&self.0)
    }

    pub fn number(value: f64) -> Self {
        Self::from_node(Node::Number(value))
    }

    pub fn zero() -> Self {
        Self::number(0.0)
    }

    pub fn one() -> Self {
        Self::number(1.0)
    }

    pub fn constant(id: ConstantId) -> Self {
        Self::from_node(Node::Constant(id))
    }

    pub fn symbol(symbol: Symbol) -> Self {
        Self::from_node(Node::Coordinate(symbol))
    }

    pub fn as_number(&self) -> Option<f64> {
        match self.node() {
            Node::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.as_number() == Some(0.0)
    }

    /// Builds a simplified sum of `terms`.
    pub fn sum<I: IntoIterator<Item = Expr>>(terms: I) -> Self {
        let mut numeric = 0.0;
        let mut merged: Vec<(f64, Expr)> = Vec::new();

        let mut pending: Vec<Expr> = terms.into_iter().collect();
        pending.reverse();
        while let Some(term) = pending.pop() {
            match term.node() {
                Node::Number(value) => numeric += value,
                Node::Sum(children) => pending.extend(children.iter().rev().cloned()),
                _ => {
                    let (coefficient, rest) = term.split_coefficient();
                    match merged.iter_mut().find(|(_, existing)| *existing == rest) {
                        Some((existing_coefficient, _)) => *existing_coefficient += coefficient,
                        None => merged.push((coefficient, rest)),
                    }
                }
            }
        }

        let mut out: Vec<Expr> = merged
            .into_iter()
            .filter(|(coefficient, _)| *coefficient != 0.0)
            .map(|(coefficient, rest)| {
                if coefficient == 1.0 {
                    rest
                } else {
                    Expr::product([Expr::number(coefficient), rest])
                }
            })
            .collect();
        if numeric != 0.0 {
            out.push(Expr::number(numeric));
        }

        match out.len() {
            0 => Expr::zero(),
            1 => out.pop().unwrap_or_else(Expr::zero),
            _ => Expr::from_node(Node::Sum(out)),
        }
    }

    /// Builds a simplified product of `factors`.
    pub fn product<I: IntoIterator<Item = Expr>>(factors: I) -> Self {
        let mut coefficient = 1.0;
        let mut out: Vec<Expr> = Vec::new();

        let mut pending: Vec<Expr> = factors.into_iter().collect();
        pending.reverse();
        while let Some(factor) = pending.pop() {
            match factor.node() {
                Node::Number(value) => {
                    if *value == 0.0 {
                        return Expr::zero();
                    }
                    coefficient *= value;
                }
                Node::Product(children) => pending.extend(children.iter().rev().cloned()),
                _ => out.push(factor),
            }
        }

        if coefficient == 0.0 {
            return Expr::zero();
        }
        if out.is_empty() {
            return Expr::number(coefficient);
        }
        if coefficient == 1.0 && out.len() == 1 {
            return out.pop().unwrap_or_else(Expr::one);
        }
        if coefficient != 1.0 {
            out.insert(0, Expr::number(coefficient));
        }
        Expr::from_node(Node::Product(out))
    }

    pub fn sin(&self) -> Self {
        match self.as_number() {
            Some(value) => Expr::number(value.sin()),
            None => Expr::from_node(Node::Sin(self.clone())),
        }
    }

    pub fn cos(&self) -> Self {
        match self.as_number() {
            Some(value) => Expr::number(value.cos()),
            None => Expr::from_node(Node::Cos(self.clone())),
        }
    }

    pub fn scale(&self, factor: f64) -> Self {
        Expr::product([Expr::number(factor), self.clone()])
    }

    /// Splits `c * rest` into its numeric coefficient and the remainder.
    fn split_coefficient(&self) -> (f64, Expr) {
        if let Node::Product(factors) = self.node() {
            if let Some(coefficient) = factors.first().and_then(Expr::as_number) {
                let rest = Expr::product(factors[1..].iter().cloned());
                return (coefficient, rest);
            }
        }
        (1.0, self.clone())
    }

    /// Partial derivative with respect to a single symbol.
    pub fn partial(&self, symbol: Symbol) -> Expr {
        match self.node() {
            Node::Number(_) | Node::Constant(_) => Expr::zero(),
            Node::Coordinate(own) => {
                if *own == symbol {
                    Expr::one()
                } else {
                    Expr::zero()
                }
            }
            Node::Sum(terms) => Expr::sum(terms.iter().map(|term| term.partial(symbol))),
            Node::Product(factors) => product_rule(factors, |factor| factor.partial(symbol)),
            Node::Sin(inner) => {
                let d = inner.partial(symbol);
                if d.is_zero() {
                    return Expr::zero();
                }
                Expr::product([inner.cos(), d])
            }
            Node::Cos(inner) => {
                let d = inner.partial(symbol);
                if d.is_zero() {
                    return Expr::zero();
                }
                Expr::product([Expr::number(-1.0), inner.sin(), d])
            }
        }
    }

    /// Total time derivative: every coordinate symbol is time dependent.
    pub fn time_derivative(&self) -> Expr {
        match self.node() {
            Node::Number(_) | Node::Constant(_) => Expr::zero(),
            Node::Coordinate(symbol) => Expr::symbol(symbol.differentiated()),
            Node::Sum(terms) => Expr::sum(terms.iter().map(Expr::time_derivative)),
            Node::Product(factors) => product_rule(factors, Expr::time_derivative),
            Node::Sin(inner) => Expr::product([inner.cos(), inner.time_derivative()]),
            Node::Cos(inner) => {
                Expr::product([Expr::number(-1.0), inner.sin(), inner.time_derivative()])
            }
        }
    }

    /// Whether the expression references `symbol` anywhere.
    pub fn depends_on(&self, symbol: Symbol) -> bool {
        match self.node() {
            Node::Number(_) | Node::Constant(_) => false,
            Node::Coordinate(own) => *own == symbol,
            Node::Sum(children) | Node::Product(children) => {
                children.iter().any(|child| child.depends_on(symbol))
            }
            Node::Sin(inner) | Node::Cos(inner) => inner.depends_on(symbol),
        }
    }

    /// Direct tree-walking evaluation. Prefer a compiled tape on hot paths.
    pub fn evaluate(&self, bindings: &dyn Bindings) -> Result<f64> {
        Ok(match self.node() {
            Node::Number(value) => *value,
            Node::Constant(id) => bindings.constant(*id)?,
            Node::Coordinate(symbol) => bindings.coordinate(*symbol)?,
            Node::Sum(terms) => {
                let mut total = 0.0;
                for term in terms {
                    total += term.evaluate(bindings)?;
                }
                total
            }
            Node::Product(factors) => {
                let mut total = 1.0;
                for factor in factors {
                    total *= factor.evaluate(bindings)?;
                }
                total
            }
            Node::Sin(inner) => inner.evaluate(bindings)?.sin(),
            Node::Cos(inner) => inner.evaluate(bindings)?.cos(),
        })
    }

    /// Number of distinct nodes reachable from this expression.
    pub fn node_count(&self) -> usize {
        let mut seen = HashSet::new();
        count_unique(self, &mut seen);
        seen.len()
    }
}

fn count_unique(expr: &Expr, seen: &mut HashSet<*const Node>) {
    if !seen.insert(expr.ptr()) {
        return;
    }
    match expr.node() {
        Node::Sum(children) | Node::Product(children) => {
            for child in children {
                count_unique(child, seen);
            }
        }
        Node::Sin(inner) | Node::Cos(inner) => count_unique(inner, seen),
        _ => {}
    }
}

fn product_rule(factors: &[Expr], derive: impl Fn(&Expr) -> Expr) -> Expr {
    let mut terms = Vec::with_capacity(factors.len());
    for (i, factor) in factors.iter().enumerate() {
        let d = derive(factor);
        if d.is_zero() {
            continue;
        }
        let others = factors
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != i)
            .map(|(_, other)| other.clone());
        terms.push(Expr::product(std::iter::once(d).chain(others)));
    }
    Expr::sum(terms)
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.node() {
            Node::Number(value) => write!(f, "{value}"),
            Node::Constant(id) => write!(f, "c{}", id.index()),
            Node::Coordinate(symbol) => {
                write!(f, "q{}", symbol.coordinate.index())?;
                for _ in 0..symbol.order {
                    write!(f, "'")?;
                }
                Ok(())
            }
            Node::Sum(terms) => {
                write!(f, "(")?;
                for (i, term) in terms.iter().enumerate() {
                    if i > 0 {
                        write!(f, " + ")?;
                    }
                    write!(f, "{term}")?;
                }
                write!(f, ")")
            }
            Node::Product(factors) => {
                for (i, factor) in factors.iter().enumerate() {
                    if i > 0 {
                        write!(f, "*")?;
                    }
                    write!(f, "{factor}")?;
                }
                Ok(())
            }
            Node::Sin(inner) => write!(f, "sin({inner})"),
            Node::Cos(inner) => write!(f, "cos({inner})"),
        }
    }
}

impl From<f64> for Expr {
    fn from(value: f64) -> Self {
        Expr::number(value)
    }
}

impl From<ConstantId> for Expr {
    fn from(id: ConstantId) -> Self {
        Expr::constant(id)
    }
}

macro_rules! binary_ops {
    ($lhs:ty, $rhs:ty) => {
        impl Add<$rhs> for $lhs {
            type Output = Expr;
            fn add(self, rhs: $rhs) -> Expr {
                Expr::sum([Expr::from(self), Expr::from(rhs)])
            }
        }

        impl Sub<$rhs> for $lhs {
            type Output = Expr;
            fn sub(self, rhs: $rhs) -> Expr {
                Expr::sum([Expr::from(self), Expr::from(rhs).scale(-1.0)])
            }
        }

        impl Mul<$rhs> for $lhs {
            type Output = Expr;
            fn mul(self, rhs: $rhs) -> Expr {
                Expr::product([Expr::from(self), Expr::from(rhs)])
            }
        }
    };
}

impl From<&Expr> for Expr {
    fn from(expr: &Expr) -> Self {
        expr.clone()
    }
}

binary_ops!(Expr, Expr);
binary_ops!(Expr, &Expr);
binary_ops!(&Expr, Expr);
binary_ops!(&Expr, &Expr);
binary_ops!(Expr, f64);
binary_ops!(&Expr, f64);
binary_ops!(f64, Expr);
binary_ops!(f64, &Expr);

impl Neg for Expr {
    type Output = Expr;
    fn neg(self) -> Expr {
        self.scale(-1.0)
    }
}

impl Neg for &Expr {
    type Output = Expr;
    fn neg(self) -> Expr {
        self.scale(-1.0)
    }
}
