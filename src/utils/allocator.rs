use serde::{Deserialize, Serialize};
use std::marker::PhantomData;

/// Index type handed out by an [`Arena`].
pub trait ArenaId: Copy + Eq + std::fmt::Debug {
    fn from_index(index: usize) -> Self;
    fn index(&self) -> usize;
}

macro_rules! typed_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        pub struct $name(usize);

        impl ArenaId for $name {
            fn from_index(index: usize) -> Self {
                Self(index)
            }

            fn index(&self) -> usize {
                self.0
            }
        }

        impl $name {
            pub fn index(&self) -> usize {
                self.0
            }
        }
    };
}

typed_id!(
    /// Handle to a reference frame in the frame graph.
    FrameId
);
typed_id!(
    /// Handle to a declared generalized coordinate.
    CoordinateId
);
typed_id!(
    /// Handle to a named model constant.
    ConstantId
);
typed_id!(
    /// Handle to a rigid body or particle in the inertia registry.
    BodyId
);

/// Append-only arena that hands out typed, stable ids.
///
/// Entries are never removed, so an id stays valid for the lifetime of the
/// arena that produced it.
#[derive(Debug, Clone)]
pub struct Arena<I: ArenaId, T> {
    items: Vec<T>,
    _marker: PhantomData<fn() -> I>,
}

impl<I: ArenaId, T> Default for Arena<I, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: ArenaId, T> Arena<I, T> {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            _marker: PhantomData,
        }
    }

    pub fn insert(&mut self, item: T) -> I {
        let id = I::from_index(self.items.len());
        self.items.push(item);
        id
    }

    pub fn get(&self, id: I) -> Option<&T> {
        self.items.get(id.index())
    }

    pub fn get_mut(&mut self, id: I) -> Option<&mut T> {
        self.items.get_mut(id.index())
    }

    pub fn iter(&self) -> impl Iterator<Item = (I, &T)> + '_ {
        self.items
            .iter()
            .enumerate()
            .map(|(index, item)| (I::from_index(index), item))
    }

    pub fn values(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = I> + '_ {
        (0..self.items.len()).map(I::from_index)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_stable_and_typed() {
        let mut arena: Arena<FrameId, &str> = Arena::new();
        let a = arena.insert("A");
        let b = arena.insert("B");

        assert_ne!(a, b);
        assert_eq!(arena.get(a), Some(&"A"));
        assert_eq!(arena.get(b), Some(&"B"));
        assert_eq!(arena.len(), 2);
        assert_eq!(arena.ids().collect::<Vec<_>>(), vec![a, b]);
    }

    #[test]
    fn out_of_range_ids_are_rejected() {
        let arena: Arena<CoordinateId, f64> = Arena::new();
        assert!(arena.get(CoordinateId::from_index(3)).is_none());
        assert!(arena.is_empty());
    }
}
