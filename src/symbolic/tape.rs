//! Flattened evaluation of many expressions at once.
//!
//! A [`Tape`] lists every distinct node reachable from its outputs in
//! dependency order, so shared sub-trees are computed once per evaluation.
//! Constants are looked up through [`Bindings`] at evaluation time, which
//! keeps compiled tapes independent of the numeric constant values.

use std::collections::HashMap;

use super::expr::{Bindings, Expr, Node, Symbol};
use crate::error::Result;
use crate::utils::allocator::ConstantId;

#[derive(Debug, Clone)]
enum Op {
    Number(f64),
    Constant(ConstantId),
    Coordinate(Symbol),
    Sum(Vec<usize>),
    Product(Vec<usize>),
    Sin(usize),
    Cos(usize),
}

/// Compiled multi-output evaluator.
#[derive(Debug, Clone)]
pub struct Tape {
    ops: Vec<Op>,
    outputs: Vec<usize>,
}

impl Tape {
    pub fn compile(exprs: &[Expr]) -> Self {
        let mut builder = TapeBuilder::default();
        let outputs = exprs.iter().map(|e| builder.visit(e)).collect();
        Self {
            ops: builder.ops,
            outputs,
        }
    }

    pub fn output_len(&self) -> usize {
        self.outputs.len()
    }

    pub fn op_count(&self) -> usize {
        self.ops.len()
    }

    /// Evaluates every output into `out`, which must hold `output_len()` values.
    pub fn evaluate(&self, bindings: &dyn Bindings, out: &mut [f64]) -> Result<()> {
        let mut slots = vec![0.0; self.ops.len()];
        for (index, op) in self.ops.iter().enumerate() {
            let value: f64 = match op {
                Op::Number(value) => *value,
                Op::Constant(id) => bindings.constant(*id)?,
                Op::Coordinate(symbol) => bindings.coordinate(*symbol)?,
                Op::Sum(args) => args.iter().map(|&a| slots[a]).sum(),
                Op::Product(args) => args.iter().map(|&a| slots[a]).product(),
                Op::Sin(arg) => slots[*arg].sin(),
                Op::Cos(arg) => slots[*arg].cos(),
            };
            slots[index] = value;
        }
        for (dst, &src) in out.iter_mut().zip(&self.outputs) {
            *dst = slots[src];
        }
        Ok(())
    }

    pub fn evaluate_vec(&self, bindings: &dyn Bindings) -> Result<Vec<f64>> {
        let mut out = vec![0.0; self.outputs.len()];
        self.evaluate(bindings, &mut out)?;
        Ok(out)
    }
}

#[derive(Default)]
struct TapeBuilder {
    ops: Vec<Op>,
    seen: HashMap<*const Node, usize>,
}

impl TapeBuilder {
    fn visit(&mut self, expr: &Expr) -> usize {
        if let Some(&slot) = self.seen.get(&expr.ptr()) {
            return slot;
        }
        let op = match expr.node() {
            Node::Number(value) => Op::Number(*value),
            Node::Constant(id) => Op::Constant(*id),
            Node::Coordinate(symbol) => Op::Coordinate(*symbol),
            Node::Sum(children) => Op::Sum(children.iter().map(|c| self.visit(c)).collect()),
            Node::Product(children) => {
                Op::Product(children.iter().map(|c| self.visit(c)).collect())
            }
            Node::Sin(inner) => Op::Sin(self.visit(inner)),
            Node::Cos(inner) => Op::Cos(self.visit(inner)),
        };
        let slot = self.ops.len();
        self.ops.push(op);
        self.seen.insert(expr.ptr(), slot);
        slot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::allocator::{ArenaId, CoordinateId};

    struct Angles(Vec<f64>);

    impl Bindings for Angles {
        fn constant(&self, _id: ConstantId) -> Result<f64> {
            Ok(2.0)
        }

        fn coordinate(&self, symbol: Symbol) -> Result<f64> {
            Ok(self.0[symbol.coordinate.index()])
        }
    }

    #[test]
    fn tape_matches_tree_evaluation() {
        let q0 = Expr::symbol(Symbol::position(CoordinateId::from_index(0)));
        let q1 = Expr::symbol(Symbol::position(CoordinateId::from_index(1)));
        let c = Expr::constant(ConstantId::from_index(0));
        let shared = q0.cos();
        let exprs = vec![
            &shared * &c + q1.sin(),
            &shared * &shared - 1.5,
            Expr::number(7.0),
        ];

        let tape = Tape::compile(&exprs);
        let bindings = Angles(vec![0.3, -0.8]);
        let values = tape.evaluate_vec(&bindings).unwrap();

        for (expr, value) in exprs.iter().zip(values) {
            let direct = expr.evaluate(&bindings).unwrap();
            assert!((direct - value).abs() < 1e-14);
        }
        assert_eq!(tape.output_len(), 3);
    }
}
