//! Insertion-ordered entity registries and the shared name index.
//!
//! Registries hold engine handles for iteration order only; the engine sets
//! inside [`crate::PhysicsWorld`] own the objects. An entity's position in
//! its registry is its id, so removing an entry shifts every later id down.

use rapier3d::prelude::*;
use std::collections::HashMap;

/// What a name resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityRef {
    /// Dynamic or kinematic body; has a result-buffer slot.
    Body(RigidBodyHandle),
    /// Static solid; never read back.
    Solid(RigidBodyHandle),
    Joint(ImpulseJointHandle),
    Terrain(RigidBodyHandle),
}

impl EntityRef {
    /// The rigid body behind this entity, if it has one.
    pub fn rigid_body(self) -> Option<RigidBodyHandle> {
        match self {
            Self::Body(h) | Self::Solid(h) | Self::Terrain(h) => Some(h),
            Self::Joint(_) => None,
        }
    }
}

/// Outcome of registering a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insertion {
    /// Anonymous entity; nothing was indexed.
    Unnamed,
    Fresh,
    /// The name already existed and now points at the new entity. The old
    /// entity stays alive but is no longer reachable by name.
    Overwrote(EntityRef),
}

impl Insertion {
    pub fn is_overwrite(&self) -> bool {
        matches!(self, Self::Overwrote(_))
    }
}

/// Name → entity map. Last write wins.
#[derive(Debug, Default)]
pub struct NameIndex {
    map: HashMap<String, EntityRef>,
}

impl NameIndex {
    pub fn insert(&mut self, name: Option<&str>, entity: EntityRef) -> Insertion {
        let Some(name) = name else {
            return Insertion::Unnamed;
        };
        match self.map.insert(name.to_string(), entity) {
            Some(previous) => Insertion::Overwrote(previous),
            None => Insertion::Fresh,
        }
    }

    pub fn get(&self, name: &str) -> Option<EntityRef> {
        self.map.get(name).copied()
    }

    pub fn body(&self, name: &str) -> Option<RigidBodyHandle> {
        self.get(name).and_then(EntityRef::rigid_body)
    }

    pub fn joint(&self, name: &str) -> Option<ImpulseJointHandle> {
        match self.get(name)? {
            EntityRef::Joint(h) => Some(h),
            _ => None,
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<EntityRef> {
        self.map.remove(name)
    }

    /// Drop every name pointing at `entity`.
    pub fn evict(&mut self, entity: EntityRef) {
        self.map.retain(|_, e| *e != entity);
    }

    /// Reverse lookup, for diagnostics and query results.
    pub fn name_of(&self, entity: EntityRef) -> Option<&str> {
        self.map
            .iter()
            .find(|(_, e)| **e == entity)
            .map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }
}

/// Ordered list of handles of one entity category.
#[derive(Debug)]
pub struct Registry<T> {
    entries: Vec<T>,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T> Registry<T> {
    /// Append and return the new entry's id.
    pub fn push(&mut self, entry: T) -> usize {
        self.entries.push(entry);
        self.entries.len() - 1
    }

    /// Remove the first entry matching `pred`, shifting later ids down.
    pub fn remove_first(&mut self, pred: impl Fn(&T) -> bool) -> Option<T> {
        let id = self.entries.iter().position(pred)?;
        Some(self.entries.remove(id))
    }

    /// Remove and return every entry not matching `keep`, preserving order.
    pub fn drain_unless(&mut self, mut keep: impl FnMut(&T) -> bool) -> Vec<T> {
        let (kept, removed): (Vec<T>, Vec<T>) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|e| keep(e));
        self.entries = kept;
        removed
    }

    pub fn take_all(&mut self) -> Vec<T> {
        std::mem::take(&mut self.entries)
    }

    pub fn get(&self, id: usize) -> Option<&T> {
        self.entries.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(i: u32) -> EntityRef {
        EntityRef::Body(RigidBodyHandle::from_raw_parts(i, 0))
    }

    #[test]
    fn last_write_wins_and_reports_overwrite() {
        let mut names = NameIndex::default();
        assert_eq!(names.insert(Some("a"), body(0)), Insertion::Fresh);
        let second = names.insert(Some("a"), body(1));
        assert_eq!(second, Insertion::Overwrote(body(0)));
        assert!(second.is_overwrite());
        assert_eq!(names.get("a"), Some(body(1)));
        assert_eq!(names.insert(None, body(2)), Insertion::Unnamed);
        assert_eq!(names.len(), 1);
    }

    #[test]
    fn evict_removes_every_alias() {
        let mut names = NameIndex::default();
        names.insert(Some("a"), body(0));
        names.insert(Some("b"), body(0));
        names.insert(Some("c"), body(1));
        names.evict(body(0));
        assert_eq!(names.len(), 1);
        assert_eq!(names.name_of(body(1)), Some("c"));
    }

    #[test]
    fn removal_shifts_ids() {
        let mut reg = Registry::default();
        reg.push('a');
        reg.push('b');
        reg.push('c');
        assert_eq!(reg.remove_first(|c| *c == 'b'), Some('b'));
        assert_eq!(reg.get(1), Some(&'c'));
        assert_eq!(reg.remove_first(|c| *c == 'z'), None);

        let gone = reg.drain_unless(|c| *c != 'a');
        assert_eq!(gone, vec!['a']);
        assert_eq!(reg.len(), 1);
    }
}
