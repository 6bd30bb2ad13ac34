use serde::{Deserialize, Serialize};

use crate::error::{ConfigurationError, Error, Result};
use crate::symbolic::{Bindings, Expr, Symbol};
use crate::utils::allocator::{ConstantId, CoordinateId};

/// Scalar configuration variable with its initial condition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralizedCoordinate {
    pub name: String,
    pub initial_position: f64,
    pub initial_rate: f64,
}

impl CoordinateId {
    /// Position symbol `q`.
    pub fn q(&self) -> Expr {
        Expr::symbol(Symbol::position(*self))
    }

    /// Rate symbol `q'`.
    pub fn qd(&self) -> Expr {
        Expr::symbol(Symbol::rate(*self))
    }

    /// Acceleration symbol `q''`.
    pub fn qdd(&self) -> Expr {
        Expr::symbol(Symbol::acceleration(*self))
    }
}

impl ConstantId {
    pub fn expr(&self) -> Expr {
        Expr::constant(*self)
    }
}

/// Named numeric value of a model constant.
///
/// Equations only hold the handle, so values can be changed here without
/// re-deriving anything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConstantTable {
    names: Vec<String>,
    values: Vec<Option<f64>>,
}

impl ConstantTable {
    pub(crate) fn declare(&mut self, name: &str, value: f64) -> ConstantId {
        use crate::utils::allocator::ArenaId;
        let id = ConstantId::from_index(self.names.len());
        self.names.push(name.to_owned());
        self.values.push(Some(value));
        id
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn name(&self, id: ConstantId) -> Option<&str> {
        self.names.get(id.index()).map(String::as_str)
    }

    pub fn id(&self, name: &str) -> Option<ConstantId> {
        use crate::utils::allocator::ArenaId;
        self.names
            .iter()
            .position(|n| n == name)
            .map(ConstantId::from_index)
    }

    pub fn get(&self, id: ConstantId) -> Option<f64> {
        self.values.get(id.index()).copied().flatten()
    }

    /// Sets a value, returning the updated table for chaining.
    pub fn with(mut self, id: ConstantId, value: f64) -> Self {
        self.set(id, value);
        self
    }

    pub fn set(&mut self, id: ConstantId, value: f64) {
        if let Some(slot) = self.values.get_mut(id.index()) {
            *slot = Some(value);
        }
    }

    pub fn set_by_name(&mut self, name: &str, value: f64) -> Result<()> {
        let id = self
            .id(name)
            .ok_or_else(|| ConfigurationError::UnknownConstant(name.to_owned()))?;
        self.set(id, value);
        Ok(())
    }

    /// Removes the value; evaluating an expression that needs it then fails.
    pub fn clear(&mut self, id: ConstantId) {
        if let Some(slot) = self.values.get_mut(id.index()) {
            *slot = None;
        }
    }

    pub(crate) fn lookup(&self, id: ConstantId) -> Result<f64> {
        self.get(id).ok_or_else(|| {
            Error::from(ConfigurationError::MissingConstant {
                name: self
                    .name(id)
                    .map(str::to_owned)
                    .unwrap_or_else(|| format!("#{}", id.index())),
            })
        })
    }
}

/// Binds an interleaved `[q0, u0, q1, u1, ...]` state row and a constant
/// table to expression leaves.
///
/// Accelerations read from `accelerations` when present and as zero
/// otherwise, which is how the forcing remainder is evaluated.
pub struct StateBindings<'a> {
    pub state: &'a [f64],
    pub accelerations: Option<&'a [f64]>,
    pub constants: &'a ConstantTable,
}

impl<'a> StateBindings<'a> {
    pub fn new(state: &'a [f64], constants: &'a ConstantTable) -> Self {
        Self {
            state,
            accelerations: None,
            constants,
        }
    }

    /// Like [`StateBindings::new`], but rejects rows that are not exactly
    /// `2 * coordinates` long.
    pub fn checked(
        state: &'a [f64],
        constants: &'a ConstantTable,
        coordinates: usize,
    ) -> Result<Self> {
        check_state_len(state, coordinates)?;
        Ok(Self::new(state, constants))
    }
}

/// Fails unless `state` holds one position and one rate per coordinate.
pub fn check_state_len(state: &[f64], coordinates: usize) -> Result<()> {
    if state.len() != 2 * coordinates {
        return Err(ConfigurationError::StateLength {
            expected: 2 * coordinates,
            got: state.len(),
        }
        .into());
    }
    Ok(())
}

impl Bindings for StateBindings<'_> {
    fn constant(&self, id: ConstantId) -> Result<f64> {
        self.constants.lookup(id)
    }

    fn coordinate(&self, symbol: Symbol) -> Result<f64> {
        let i = symbol.coordinate.index();
        let expected = 2 * (i + 1);
        let value = match symbol.order {
            0 => self.state.get(2 * i),
            1 => self.state.get(2 * i + 1),
            2 => match self.accelerations {
                Some(acc) => acc.get(i),
                None => return Ok(0.0),
            },
            order => {
                return Err(ConfigurationError::UnboundSymbol(format!(
                    "derivative order {order} of coordinate {i}"
                ))
                .into())
            }
        };
        value.copied().ok_or_else(|| {
            ConfigurationError::StateLength {
                expected,
                got: self.state.len(),
            }
            .into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::allocator::ArenaId;

    #[test]
    fn constants_are_overridable_by_name() {
        let mut table = ConstantTable::default();
        let g = table.declare("g", 9.81);
        let b = table.declare("b", 0.0);

        table.set_by_name("b", 1.0).unwrap();
        assert_eq!(table.get(b), Some(1.0));
        assert_eq!(table.get(g), Some(9.81));
        assert!(table.set_by_name("missing", 1.0).is_err());
    }

    #[test]
    fn interleaved_state_binds_positions_and_rates() {
        let table = ConstantTable::default();
        let state = [0.1, 0.2, 0.3, 0.4];
        let bindings = StateBindings::new(&state, &table);
        let q1 = CoordinateId::from_index(1);

        assert_eq!(bindings.coordinate(Symbol::position(q1)).unwrap(), 0.3);
        assert_eq!(bindings.coordinate(Symbol::rate(q1)).unwrap(), 0.4);
        assert_eq!(bindings.coordinate(Symbol::acceleration(q1)).unwrap(), 0.0);
    }
}
