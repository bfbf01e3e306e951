use std::collections::VecDeque;

use crate::codec::PositionPrecision;
use crate::movement::MovementModel;
use crate::net::{InputVector, sequence_greater_than};
use crate::snapshot::Transform;

pub const DEFAULT_PREDICTION_CAPACITY: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictionFrame {
    pub input_seq: u32,
    pub input: InputVector,
    /// Transform after applying `input`.
    pub predicted: Transform,
    pub captured_at_ms: f64,
}

/// Locally predicted frames of the controlled entity that the server has not
/// acknowledged yet, oldest first.
#[derive(Debug, Clone)]
pub struct PredictionBuffer {
    model: MovementModel,
    dt: f32,
    grid: Option<PositionPrecision>,
    capacity: usize,
    frames: VecDeque<PredictionFrame>,
    next_seq: u32,
    current: Transform,
    overflowed: bool,
    dropped: u64,
}

impl PredictionBuffer {
    pub fn new(model: MovementModel, dt: f32, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            model,
            dt,
            grid: None,
            capacity,
            frames: VecDeque::with_capacity(capacity),
            next_seq: 1,
            current: Transform::default(),
            overflowed: false,
            dropped: 0,
        }
    }

    /// Snaps every predicted transform to the wire grid, the way the server
    /// snaps what it accepts, so matching inputs give identical states.
    pub fn snapped_to(mut self, precision: PositionPrecision) -> Self {
        self.grid = Some(precision);
        self
    }

    pub fn model(&self) -> &MovementModel {
        &self.model
    }

    pub fn dt(&self) -> f32 {
        self.dt
    }

    /// Predicts one step ahead and returns the sequence number to send with
    /// the input.
    pub fn apply_input(&mut self, input: InputVector, captured_at_ms: f64) -> u32 {
        let input_seq = self.next_seq;
        self.next_seq = match self.next_seq.wrapping_add(1) {
            0 => 1,
            seq => seq,
        };

        self.current = step(&self.model, &self.current, &input, self.dt, self.grid);
        self.frames.push_back(PredictionFrame {
            input_seq,
            input,
            predicted: self.current,
            captured_at_ms,
        });

        while self.frames.len() > self.capacity {
            self.frames.pop_front();
            self.dropped += 1;
            if !self.overflowed {
                log::debug!("prediction buffer full, dropping oldest frames");
            }
            self.overflowed = true;
        }

        input_seq
    }

    pub fn frames(&self) -> impl Iterator<Item = &PredictionFrame> {
        self.frames.iter()
    }

    pub fn frame(&self, input_seq: u32) -> Option<&PredictionFrame> {
        self.frames.iter().find(|f| f.input_seq == input_seq)
    }

    /// Discards every frame up to and including `upto_seq`.
    pub fn acknowledge(&mut self, upto_seq: u32) {
        while self
            .frames
            .front()
            .is_some_and(|f| !sequence_greater_than(f.input_seq, upto_seq))
        {
            self.frames.pop_front();
        }
    }

    /// Re-simulates every retained frame from `base`, rewriting their
    /// predictions, and returns the new endpoint.
    pub fn replay(&mut self, base: &Transform) -> Transform {
        let mut transform = *base;
        for frame in &mut self.frames {
            transform = step(&self.model, &transform, &frame.input, self.dt, self.grid);
            frame.predicted = transform;
        }
        self.current = transform;
        transform
    }

    pub fn reset_to(&mut self, base: &Transform) {
        self.frames.clear();
        self.current = *base;
        self.overflowed = false;
    }

    /// True once after frames were dropped for lack of room.
    pub fn take_overflow(&mut self) -> bool {
        std::mem::take(&mut self.overflowed)
    }

    pub fn current(&self) -> &Transform {
        &self.current
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

fn step(
    model: &MovementModel,
    transform: &Transform,
    input: &InputVector,
    dt: f32,
    grid: Option<PositionPrecision>,
) -> Transform {
    let next = model.step(transform, input, dt);
    match grid {
        Some(precision) => next.snapped(precision),
        None => next,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::InputFlags;
    use glam::Vec3;

    fn buffer(capacity: usize) -> PredictionBuffer {
        PredictionBuffer::new(MovementModel::default(), 1.0 / 60.0, capacity)
    }

    fn forward() -> InputVector {
        InputVector::new(Vec3::new(0.0, 0.0, -1.0), 0.0, InputFlags::empty())
    }

    #[test]
    fn sequences_start_at_one_and_increase() {
        let mut buffer = buffer(8);
        let seqs: Vec<u32> = (0..3).map(|i| buffer.apply_input(forward(), i as f64)).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        assert_eq!(buffer.len(), 3);
        assert!(buffer.current().position.z < 0.0);
    }

    #[test]
    fn acknowledge_drops_prefix() {
        let mut buffer = buffer(8);
        for i in 0..5 {
            buffer.apply_input(forward(), i as f64);
        }
        buffer.acknowledge(3);
        let left: Vec<u32> = buffer.frames().map(|f| f.input_seq).collect();
        assert_eq!(left, vec![4, 5]);

        buffer.acknowledge(2);
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn overflow_drops_oldest_and_signals_once() {
        let mut buffer = buffer(4);
        for i in 0..6 {
            buffer.apply_input(forward(), i as f64);
        }
        assert_eq!(buffer.frames().next().unwrap().input_seq, 3);
        assert_eq!(buffer.dropped(), 2);
        assert!(buffer.take_overflow());
        assert!(!buffer.take_overflow());
    }

    #[test]
    fn replay_rewrites_predictions() {
        let mut buffer = buffer(8);
        for i in 0..4 {
            buffer.apply_input(forward(), i as f64);
        }
        buffer.acknowledge(1);

        let base = Transform::at(Vec3::new(2.0, 0.0, 0.0));
        let end = buffer.replay(&base);
        assert_eq!(end, *buffer.current());
        assert_eq!(buffer.frame(4).unwrap().predicted, end);
        assert!((end.position.z + 3.0 * 5.0 / 60.0).abs() < 1e-5);
        assert_eq!(end.position.x, 2.0);
    }

    #[test]
    fn sequence_wraps_past_zero() {
        let mut buffer = buffer(8);
        buffer.next_seq = u32::MAX;
        assert_eq!(buffer.apply_input(forward(), 0.0), u32::MAX);
        assert_eq!(buffer.apply_input(forward(), 1.0), 1);

        buffer.acknowledge(u32::MAX);
        assert_eq!(buffer.frames().map(|f| f.input_seq).collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn grid_snapping_matches_snapped_model_steps() {
        let mut buffer = buffer(8).snapped_to(PositionPrecision::Compact);
        buffer.apply_input(forward(), 0.0);
        buffer.apply_input(forward(), 1.0);

        let model = MovementModel::default();
        let mut expected = Transform::default();
        for _ in 0..2 {
            expected = model
                .step(&expected, &forward(), 1.0 / 60.0)
                .snapped(PositionPrecision::Compact);
        }
        assert_eq!(*buffer.current(), expected);
        assert!((buffer.current().position.z + 0.16).abs() < 1e-6);
    }
}
