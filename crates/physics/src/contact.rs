//! Named contact tests, evaluated once per step.
//!
//! A group's slot is its position in the registry, so slots stay dense in
//! `[0, len)` across any sequence of adds and removes and the result vector
//! never has gaps.

use crate::error::{PhysicsError, PhysicsResult};
use crate::physics_world::PhysicsWorld;
use crate::registry::NameIndex;
use rapier3d::parry::query;
use rapier3d::prelude::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactGroupDescriptor {
    pub name: String,
    pub body_a: String,
    /// `None` tests body A against everything else in the world.
    pub body_b: Option<String>,
}

impl ContactGroupDescriptor {
    pub fn pair(name: impl Into<String>, a: impl Into<String>, b: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            body_a: a.into(),
            body_b: Some(b.into()),
        }
    }

    pub fn single(name: impl Into<String>, a: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            body_a: a.into(),
            body_b: None,
        }
    }
}

#[derive(Debug)]
struct ContactGroup {
    name: String,
    body_a: RigidBodyHandle,
    body_b: Option<RigidBodyHandle>,
    enabled: bool,
}

#[derive(Debug, Default)]
pub struct ContactGroups {
    groups: Vec<ContactGroup>,
    results: Vec<u8>,
}

impl ContactGroups {
    /// Register a group and return its slot. Both bodies must already exist;
    /// a group naming a missing body is rejected and nothing is tracked.
    pub fn add(&mut self, desc: &ContactGroupDescriptor, names: &NameIndex) -> PhysicsResult<usize> {
        let resolve = |name: &str| {
            names.body(name).ok_or_else(|| PhysicsError::UnresolvedBody {
                context: "contact group",
                name: name.to_string(),
            })
        };
        let body_a = resolve(&desc.body_a)?;
        let body_b = desc.body_b.as_deref().map(resolve).transpose()?;

        self.groups.push(ContactGroup {
            name: desc.name.clone(),
            body_a,
            body_b,
            enabled: true,
        });
        self.results.push(0);
        Ok(self.groups.len() - 1)
    }

    /// Remove every group called `name`; later slots shift down.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.groups.len();
        let mut slot = 0;
        while slot < self.groups.len() {
            if self.groups[slot].name == name {
                self.groups.remove(slot);
                self.results.remove(slot);
            } else {
                slot += 1;
            }
        }
        self.groups.len() != before
    }

    pub fn clear(&mut self) {
        self.groups.clear();
        self.results.clear();
    }

    pub fn enable(&mut self, name: &str) -> bool {
        self.set_enabled(name, true)
    }

    pub fn disable(&mut self, name: &str) -> bool {
        self.set_enabled(name, false)
    }

    pub fn enable_all(&mut self) {
        self.groups.iter_mut().for_each(|g| g.enabled = true);
    }

    pub fn disable_all(&mut self) {
        self.groups.iter_mut().for_each(|g| g.enabled = false);
    }

    fn set_enabled(&mut self, name: &str, enabled: bool) -> bool {
        let mut found = false;
        for group in self.groups.iter_mut().filter(|g| g.name == name) {
            group.enabled = enabled;
            found = true;
        }
        found
    }

    pub fn slot_of(&self, name: &str) -> Option<usize> {
        self.groups.iter().position(|g| g.name == name)
    }

    pub fn is_enabled(&self, name: &str) -> Option<bool> {
        self.groups.iter().find(|g| g.name == name).map(|g| g.enabled)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// One 0/1 value per slot from the latest run.
    pub fn results(&self) -> &[u8] {
        &self.results
    }

    /// Re-evaluate every enabled group. Disabled groups keep their value.
    /// Expects an up-to-date query pipeline.
    pub fn run(&mut self, world: &PhysicsWorld) {
        for (group, result) in self.groups.iter().zip(self.results.iter_mut()) {
            if !group.enabled {
                continue;
            }
            let touching = match group.body_b {
                Some(b) => pair_touching(world, group.body_a, b),
                None => touching_anything(world, group.body_a),
            };
            *result = u8::from(touching);
        }
    }
}

fn colliders_of(world: &PhysicsWorld, body: RigidBodyHandle) -> &[ColliderHandle] {
    world
        .rigid_body_set
        .get(body)
        .filter(|b| b.is_enabled())
        .map(|b| b.colliders())
        .unwrap_or(&[])
}

fn pair_touching(world: &PhysicsWorld, a: RigidBodyHandle, b: RigidBodyHandle) -> bool {
    let colliders = &world.collider_set;
    colliders_of(world, a).iter().any(|&ca| {
        colliders_of(world, b).iter().any(|&cb| {
            let (Some(c1), Some(c2)) = (colliders.get(ca), colliders.get(cb)) else {
                return false;
            };
            match query::intersection_test(c1.position(), c1.shape(), c2.position(), c2.shape()) {
                Ok(hit) => hit,
                // Shape pairs parry cannot test directly fall back to the
                // narrow phase's contact manifold from the last step.
                Err(_) => world
                    .narrow_phase
                    .contact_pair(ca, cb)
                    .is_some_and(|pair| pair.has_any_active_contact),
            }
        })
    })
}

fn touching_anything(world: &PhysicsWorld, body: RigidBodyHandle) -> bool {
    let filter = QueryFilter::default().exclude_rigid_body(body);
    colliders_of(world, body).iter().any(|&handle| {
        let Some(collider) = world.collider_set.get(handle) else {
            return false;
        };
        let mut hit = false;
        world.query_pipeline.intersections_with_shape(
            &world.rigid_body_set,
            &world.collider_set,
            collider.position(),
            collider.shape(),
            filter,
            |_| {
                hit = true;
                false
            },
        );
        hit
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorldConfig;
    use crate::registry::EntityRef;

    struct Fixture {
        world: PhysicsWorld,
        names: NameIndex,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                world: PhysicsWorld::new(&WorldConfig {
                    gravity: [0.0; 3],
                    ..Default::default()
                }),
                names: NameIndex::default(),
            }
        }

        fn ball(&mut self, name: &str, x: f32) -> RigidBodyHandle {
            let body = RigidBodyBuilder::dynamic().translation(vector![x, 0.0, 0.0]).build();
            let h = self
                .world
                .insert_body(body, ColliderBuilder::ball(0.5).build())
                .unwrap();
            self.names.insert(Some(name), EntityRef::Body(h));
            h
        }

        fn run(&mut self, groups: &mut ContactGroups) {
            self.world.update_query_pipeline();
            groups.run(&self.world);
        }
    }

    #[test]
    fn unresolved_body_a_is_not_tracked() {
        let fx = Fixture::new();
        let mut groups = ContactGroups::default();
        let err = groups
            .add(&ContactGroupDescriptor::single("g", "nobody"), &fx.names)
            .unwrap_err();
        assert!(matches!(err, PhysicsError::UnresolvedBody { .. }));
        assert!(groups.is_empty());
        assert!(groups.results().is_empty());
    }

    #[test]
    fn slots_stay_dense_after_removal() {
        let mut fx = Fixture::new();
        fx.ball("a", 0.0);
        let mut groups = ContactGroups::default();
        for name in ["g0", "g1", "g2", "g3"] {
            groups.add(&ContactGroupDescriptor::single(name, "a"), &fx.names).unwrap();
        }
        assert!(groups.remove("g1"));
        assert!(!groups.remove("g1"));
        assert_eq!(groups.slot_of("g0"), Some(0));
        assert_eq!(groups.slot_of("g2"), Some(1));
        assert_eq!(groups.slot_of("g3"), Some(2));
        assert_eq!(groups.results().len(), 3);
    }

    #[test]
    fn pair_reports_overlap_then_separation() {
        let mut fx = Fixture::new();
        fx.ball("A", 0.0);
        let b = fx.ball("B", 0.5);
        let mut groups = ContactGroups::default();
        groups
            .add(&ContactGroupDescriptor::pair("ab", "A", "B"), &fx.names)
            .unwrap();

        fx.run(&mut groups);
        assert_eq!(groups.results(), &[1]);

        fx.world.rigid_body_set[b].set_translation(vector![10.0, 0.0, 0.0], true);
        fx.world.advance(1.0 / 60.0, 1);
        fx.run(&mut groups);
        assert_eq!(groups.results(), &[0]);
    }

    #[test]
    fn disabled_groups_keep_their_last_value() {
        let mut fx = Fixture::new();
        fx.ball("A", 0.0);
        let b = fx.ball("B", 0.5);
        let mut groups = ContactGroups::default();
        groups
            .add(&ContactGroupDescriptor::single("any", "A"), &fx.names)
            .unwrap();
        fx.run(&mut groups);
        assert_eq!(groups.results(), &[1]);

        groups.disable("any");
        groups.disable("any");
        assert_eq!(groups.is_enabled("any"), Some(false));
        fx.world.rigid_body_set[b].set_translation(vector![10.0, 0.0, 0.0], true);
        fx.world.advance(1.0 / 60.0, 1);
        fx.run(&mut groups);
        assert_eq!(groups.results(), &[1]);

        groups.enable("any");
        fx.run(&mut groups);
        assert_eq!(groups.results(), &[0]);
    }

    #[test]
    fn removed_body_reports_no_contact() {
        let mut fx = Fixture::new();
        let a = fx.ball("A", 0.0);
        fx.ball("B", 0.5);
        let mut groups = ContactGroups::default();
        groups
            .add(&ContactGroupDescriptor::pair("ab", "A", "B"), &fx.names)
            .unwrap();
        fx.world.remove_body(a);
        fx.run(&mut groups);
        assert_eq!(groups.results(), &[0]);
    }
}
