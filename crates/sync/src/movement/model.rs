use glam::{Quat, Vec3};
use serde::Deserialize;

use crate::net::{InputFlags, InputVector};
use crate::snapshot::{StateFlags, Transform};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MovementConfig {
    pub walk_speed: f32,
    pub sprint_multiplier: f32,
    pub crouch_multiplier: f32,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            walk_speed: 5.0,
            sprint_multiplier: 2.0,
            crouch_multiplier: 0.5,
        }
    }
}

/// Deterministic kinematic movement. Client prediction, replay and the
/// server all advance entities through this one function, so identical
/// inputs from identical transforms give bit-identical results.
#[derive(Debug, Clone, Default)]
pub struct MovementModel {
    pub config: MovementConfig,
}

impl MovementModel {
    pub fn new(config: MovementConfig) -> Self {
        Self { config }
    }

    pub fn speed(&self, flags: InputFlags) -> f32 {
        let mut speed = self.config.walk_speed;
        if flags.contains(InputFlags::CROUCH) {
            speed *= self.config.crouch_multiplier;
        } else if flags.contains(InputFlags::SPRINT) {
            speed *= self.config.sprint_multiplier;
        }
        speed
    }

    pub fn step(&self, transform: &Transform, input: &InputVector, dt: f32) -> Transform {
        let flags = input.input_flags();
        let yaw = input.yaw();
        let move_vec = input.move_direction();

        let mut next = *transform;
        let mut state = transform.flags() - StateFlags::TELEPORTED;
        state.remove(StateFlags::MOVING | StateFlags::SPRINTING | StateFlags::CROUCHING);
        state.set(StateFlags::AIRBORNE, flags.contains(InputFlags::JUMP));
        state.set(StateFlags::CROUCHING, flags.contains(InputFlags::CROUCH));

        if move_vec.length_squared() > 0.001 {
            let normalized = move_vec.normalize();

            let (sin_yaw, cos_yaw) = yaw.sin_cos();
            let world_move = Vec3::new(
                normalized.x * cos_yaw + normalized.z * sin_yaw,
                normalized.y,
                -normalized.x * sin_yaw + normalized.z * cos_yaw,
            );

            next.velocity = world_move * self.speed(flags);
            next.position += next.velocity * dt;
            state.insert(StateFlags::MOVING);
            state.set(
                StateFlags::SPRINTING,
                flags.contains(InputFlags::SPRINT) && !flags.contains(InputFlags::CROUCH),
            );
        } else {
            next.velocity = Vec3::ZERO;
        }

        next.rotation = Quat::from_rotation_y(yaw);
        next.set_flags(state);
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    const DT: f32 = 1.0 / 60.0;

    #[test]
    fn forward_walk() {
        let model = MovementModel::default();
        let input = InputVector::new(Vec3::new(0.0, 0.0, -1.0), 0.0, InputFlags::empty());

        let next = model.step(&Transform::default(), &input, DT);
        assert!((next.position.z + 5.0 * DT).abs() < 1e-6);
        assert!((next.velocity.length() - 5.0).abs() < 1e-4);
        assert_eq!(next.flags(), StateFlags::MOVING);
    }

    #[test]
    fn yaw_rotates_direction() {
        let model = MovementModel::default();
        let input = InputVector::new(Vec3::new(0.0, 0.0, -1.0), FRAC_PI_2, InputFlags::SPRINT);

        let next = model.step(&Transform::default(), &input, 1.0);
        assert!((next.position.x + 10.0).abs() < 1e-2);
        assert!(next.position.z.abs() < 1e-2);
        assert_eq!(next.flags(), StateFlags::MOVING | StateFlags::SPRINTING);
    }

    #[test]
    fn idle_stops_and_clears_teleport() {
        let model = MovementModel::default();
        let mut moving = Transform::at(Vec3::ONE);
        moving.velocity = Vec3::X;
        moving.set_flags(StateFlags::MOVING | StateFlags::TELEPORTED);

        let next = model.step(&moving, &InputVector::default(), DT);
        assert_eq!(next.position, Vec3::ONE);
        assert_eq!(next.velocity, Vec3::ZERO);
        assert!(next.flags().is_empty());
    }

    #[test]
    fn step_is_deterministic() {
        let model = MovementModel::default();
        let input = InputVector::new(Vec3::new(0.3, 0.0, -0.9), 1.234, InputFlags::CROUCH);
        let start = Transform::at(Vec3::new(10.0, 0.0, 43.869));

        let a = (0..100).fold(start, |t, _| model.step(&t, &input, DT));
        let b = (0..100).fold(start, |t, _| model.step(&t, &input, DT));
        assert_eq!(a, b);
        assert_eq!(a.flags(), StateFlags::MOVING | StateFlags::CROUCHING);
    }
}
