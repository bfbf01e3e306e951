use std::fmt;

use bitflags::bitflags;
use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::codec::{self, PositionPrecision, VELOCITY};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u32);

impl EntityId {
    pub fn id(self) -> u32 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct StateFlags: u8 {
        const MOVING = 1 << 0;
        const SPRINTING = 1 << 1;
        const AIRBORNE = 1 << 2;
        const CROUCHING = 1 << 3;
        const TELEPORTED = 1 << 7;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub velocity: Vec3,
    pub discrete_state: u8,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            velocity: Vec3::ZERO,
            discrete_state: 0,
        }
    }
}

impl Transform {
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    pub fn flags(&self) -> StateFlags {
        StateFlags::from_bits_truncate(self.discrete_state)
    }

    pub fn set_flags(&mut self, flags: StateFlags) {
        self.discrete_state = flags.bits();
    }

    pub fn is_finite(&self) -> bool {
        self.position.is_finite() && self.rotation.is_finite() && self.velocity.is_finite()
    }

    /// Rounds every field onto the wire grid, so that a receiver decoding a
    /// full packet of this transform reproduces it exactly.
    pub fn snapped(&self, precision: PositionPrecision) -> Self {
        let field = precision.field();
        let rotation = codec::decode_rotation(codec::encode_rotation(self.rotation))
            .unwrap_or(Quat::IDENTITY);
        Self {
            position: Vec3::from_array(self.position.to_array().map(|c| field.clamp(c))),
            rotation,
            velocity: Vec3::from_array(self.velocity.to_array().map(|c| VELOCITY.clamp(c))),
            discrete_state: self.discrete_state,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Snapshot {
    pub entity_id: EntityId,
    pub transform: Transform,
    pub server_tick: u64,
    pub server_timestamp_ms: f64,
}

impl Snapshot {
    pub fn new(
        entity_id: EntityId,
        transform: Transform,
        server_tick: u64,
        server_timestamp_ms: f64,
    ) -> Self {
        Self {
            entity_id,
            transform,
            server_tick,
            server_timestamp_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapped_transform_is_stable() {
        let transform = Transform {
            position: Vec3::new(10.0004, 43.869, -3.3333),
            rotation: Quat::from_rotation_y(std::f32::consts::FRAC_PI_4),
            velocity: Vec3::new(2.5, -1.004, 0.5),
            discrete_state: StateFlags::MOVING.bits(),
        };

        let once = transform.snapped(PositionPrecision::Wide);
        let twice = once.snapped(PositionPrecision::Wide);

        assert!((once.position - transform.position).length() < 0.001);
        assert!((once.velocity - transform.velocity).length() < 0.01);
        assert!((once.position - twice.position).length() < 1e-6);
        assert_eq!(once.flags(), StateFlags::MOVING);
    }

    #[test]
    fn unknown_state_bits_are_ignored_by_flags() {
        let transform = Transform {
            discrete_state: 0b0111_0001,
            ..Default::default()
        };
        assert_eq!(transform.flags(), StateFlags::MOVING);
    }
}
