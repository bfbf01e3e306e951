use glam::Vec3;
use tether::{InputFlags, InputVector, MovementModel};

#[derive(Debug, Clone, Default)]
pub struct InputState {
    pub move_direction: [f32; 3],
    pub view_yaw: f32,
    pub sprint: bool,
    pub jump: bool,
    pub crouch: bool,
}

impl InputState {
    pub fn to_input(&self) -> InputVector {
        let mut flags = InputFlags::empty();
        flags.set(InputFlags::SPRINT, self.sprint);
        flags.set(InputFlags::JUMP, self.jump);
        flags.set(InputFlags::CROUCH, self.crouch);
        InputVector::new(Vec3::from_array(self.move_direction), self.view_yaw, flags)
    }
}

/// Walks forward while turning at a constant rate, which traces a circle of
/// `radius` under the shared movement model.
#[derive(Debug, Clone)]
pub struct CircleScript {
    radius: f32,
    sprint: bool,
    turn_rate: f32,
}

impl CircleScript {
    pub fn new(radius: f32, sprint: bool, model: &MovementModel) -> Self {
        let flags = if sprint {
            InputFlags::SPRINT
        } else {
            InputFlags::empty()
        };
        let radius = radius.max(0.1);
        Self {
            radius,
            sprint,
            turn_rate: model.speed(flags) / radius,
        }
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    pub fn input_at(&self, elapsed_secs: f32) -> InputState {
        InputState {
            move_direction: [0.0, 0.0, -1.0],
            view_yaw: self.turn_rate * elapsed_secs,
            sprint: self.sprint,
            ..Default::default()
        }
    }
}
