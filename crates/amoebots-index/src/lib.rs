//! Occupancy storage abstractions mapping particles to grid positions.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::Hash;
use thiserror::Error;

/// Errors emitted by occupancy storage implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StorageError {
    /// Another particle already sits at the requested position.
    #[error("position already holds a particle")]
    PositionTaken,
    /// The particle is already stored at some position.
    #[error("particle is already stored")]
    ParticlePresent,
    /// The particle is not stored anywhere.
    #[error("particle is not stored")]
    MissingParticle,
}

/// Common behaviour exposed by particle occupancy storage.
///
/// Implementations keep a bijection: every stored particle has exactly one
/// position and every occupied position exactly one particle.
pub trait ParticleStorage<K, P> {
    /// Number of stored particles.
    fn len(&self) -> usize;

    /// Returns whether nothing is stored.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Position of `key`, if stored.
    fn position_of(&self, key: K) -> Option<P>;

    /// Particle occupying `position`, if any.
    fn particle_at(&self, position: &P) -> Option<K>;

    /// Returns whether `key` is stored.
    fn contains(&self, key: K) -> bool {
        self.position_of(key).is_some()
    }

    /// Returns whether `position` is occupied.
    fn is_occupied(&self, position: &P) -> bool {
        self.particle_at(position).is_some()
    }

    /// Store `key` at `position`.
    fn insert(&mut self, key: K, position: P) -> Result<(), StorageError>;

    /// Remove `key`, returning the position it held.
    fn remove(&mut self, key: K) -> Option<P>;

    /// Visit every stored pair in unspecified order.
    fn for_each(&self, visitor: &mut dyn FnMut(K, &P));
}

/// Hash-map backed bijection with O(1) amortized lookups in both directions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BiMapStorage<K, P>
where
    K: Copy + Eq + Hash,
    P: Clone + Eq + Hash,
{
    by_position: HashMap<P, K>,
    by_particle: HashMap<K, P>,
}

impl<K, P> Default for BiMapStorage<K, P>
where
    K: Copy + Eq + Hash,
    P: Clone + Eq + Hash,
{
    fn default() -> Self {
        Self {
            by_position: HashMap::new(),
            by_particle: HashMap::new(),
        }
    }
}

impl<K, P> BiMapStorage<K, P>
where
    K: Copy + Eq + Hash,
    P: Clone + Eq + Hash,
{
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-size both maps for `capacity` particles.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            by_position: HashMap::with_capacity(capacity),
            by_particle: HashMap::with_capacity(capacity),
        }
    }

    /// Relocate `key` to `position` in one step.
    pub fn relocate(&mut self, key: K, position: P) -> Result<P, StorageError> {
        if let Some(&holder) = self.by_position.get(&position)
            && holder != key
        {
            return Err(StorageError::PositionTaken);
        }
        let slot = self
            .by_particle
            .get_mut(&key)
            .ok_or(StorageError::MissingParticle)?;
        let previous = std::mem::replace(slot, position.clone());
        self.by_position.remove(&previous);
        self.by_position.insert(position, key);
        Ok(previous)
    }
}

impl<K, P> ParticleStorage<K, P> for BiMapStorage<K, P>
where
    K: Copy + Eq + Hash,
    P: Clone + Eq + Hash,
{
    fn len(&self) -> usize {
        self.by_particle.len()
    }

    fn position_of(&self, key: K) -> Option<P> {
        self.by_particle.get(&key).cloned()
    }

    fn particle_at(&self, position: &P) -> Option<K> {
        self.by_position.get(position).copied()
    }

    fn contains(&self, key: K) -> bool {
        self.by_particle.contains_key(&key)
    }

    fn is_occupied(&self, position: &P) -> bool {
        self.by_position.contains_key(position)
    }

    fn insert(&mut self, key: K, position: P) -> Result<(), StorageError> {
        if self.by_particle.contains_key(&key) {
            return Err(StorageError::ParticlePresent);
        }
        if self.by_position.contains_key(&position) {
            return Err(StorageError::PositionTaken);
        }
        self.by_position.insert(position.clone(), key);
        self.by_particle.insert(key, position);
        Ok(())
    }

    fn remove(&mut self, key: K) -> Option<P> {
        let position = self.by_particle.remove(&key)?;
        self.by_position.remove(&position);
        Some(position)
    }

    fn for_each(&self, visitor: &mut dyn FnMut(K, &P)) {
        for (key, position) in &self.by_particle {
            visitor(*key, position);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_lookup_both_ways() {
        let mut storage = BiMapStorage::<u32, (i32, i32)>::new();
        storage.insert(1, (0, 0)).expect("insert");
        storage.insert(2, (0, 1)).expect("insert");
        assert_eq!(storage.len(), 2);
        assert_eq!(storage.position_of(1), Some((0, 0)));
        assert_eq!(storage.particle_at(&(0, 1)), Some(2));
        assert!(storage.is_occupied(&(0, 0)));
        assert!(!storage.is_occupied(&(5, 5)));
    }

    #[test]
    fn rejects_double_occupancy() {
        let mut storage = BiMapStorage::<u32, (i32, i32)>::new();
        storage.insert(1, (0, 0)).expect("insert");
        assert_eq!(storage.insert(2, (0, 0)), Err(StorageError::PositionTaken));
        assert_eq!(storage.insert(1, (3, 3)), Err(StorageError::ParticlePresent));
        assert_eq!(storage.len(), 1);
        assert!(!storage.contains(2));
    }

    #[test]
    fn remove_clears_both_directions() {
        let mut storage = BiMapStorage::<u32, (i32, i32)>::new();
        storage.insert(7, (2, -1)).expect("insert");
        assert_eq!(storage.remove(7), Some((2, -1)));
        assert!(storage.is_empty());
        assert!(!storage.is_occupied(&(2, -1)));
        assert_eq!(storage.remove(7), None);
    }

    #[test]
    fn relocate_keeps_bijection() {
        let mut storage = BiMapStorage::<u32, (i32, i32)>::new();
        storage.insert(1, (0, 0)).expect("insert");
        storage.insert(2, (1, 0)).expect("insert");
        assert_eq!(storage.relocate(1, (1, 0)), Err(StorageError::PositionTaken));
        assert_eq!(storage.relocate(1, (0, 1)), Ok((0, 0)));
        assert_eq!(storage.particle_at(&(0, 1)), Some(1));
        assert!(!storage.is_occupied(&(0, 0)));
        assert_eq!(storage.relocate(9, (4, 4)), Err(StorageError::MissingParticle));
        assert!(!storage.contains(9));

        let mut seen = 0;
        storage.for_each(&mut |key, position| {
            assert_eq!(storage.particle_at(position), Some(key));
            seen += 1;
        });
        assert_eq!(seen, 2);
    }
}
