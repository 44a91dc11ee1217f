//! Collision groups, masks and per-object collision flags.
//!
//! Groups and masks travel as raw `u32` bitfields so callers can combine
//! rapier's [`Group`] bits with their own.

use rapier3d::prelude::*;

/// Membership given to bodies and terrains that don't name a group.
pub const DEFAULT_GROUP: u32 = Group::GROUP_1.bits();

/// Mask that collides with everything.
pub const ALL_GROUPS: u32 = Group::ALL.bits();

/// Build rapier interaction groups from a membership/filter pair.
pub fn interaction_groups(group: u32, mask: u32) -> InteractionGroups {
    InteractionGroups::new(Group::from_bits_retain(group), Group::from_bits_retain(mask))
}

bitflags::bitflags! {
    /// Per-object behaviour flags. Bit values match the wire format.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CollisionFlags: u32 {
        /// Static regardless of mass.
        const STATIC_OBJECT = 1;
        /// Host-driven regardless of mass.
        const KINEMATIC_OBJECT = 2;
        /// Detects contacts but never produces a collision response.
        const NO_CONTACT_RESPONSE = 4;
        /// The body never goes to sleep.
        const DISABLE_DEACTIVATION = 64;
    }
}
