use glam::Vec3;

use crate::net::sequence_greater_than;
use crate::snapshot::Transform;

use super::PredictionConfig;
use super::buffer::PredictionBuffer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconcilePhase {
    #[default]
    Converged,
    Correcting,
    Smoothing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardResetReason {
    Initial,
    Overflow,
    Teleport,
}

/// What an authoritative update did to the local prediction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Correction {
    /// Already reconciled against this or a newer sequence.
    Ignored,
    /// Prediction matched within epsilon.
    Converged,
    /// Replayed, and the rendered position moved by less than the visual
    /// threshold.
    Applied { error: f32 },
    /// Replayed, and the visual difference is being faded out.
    Smoothed { error: f32, offset: f32 },
    HardReset(HardResetReason),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconciliationState {
    pub last_acked_seq: u32,
    pub authoritative_base: Transform,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ReconcileStats {
    pub updates: u64,
    pub converged: u64,
    pub corrections: u64,
    pub smoothed: u64,
    pub hard_resets: u64,
    pub max_error: f32,
}

/// Converged / Correcting / Smoothing state machine for the locally
/// controlled entity.
#[derive(Debug, Clone)]
pub struct ReconciliationEngine {
    config: PredictionConfig,
    phase: ReconcilePhase,
    state: Option<ReconciliationState>,
    offset: Vec3,
    smoothing_from: Vec3,
    smoothing_elapsed_ms: f64,
    last_authoritative_ms: Option<f64>,
    stats: ReconcileStats,
}

impl ReconciliationEngine {
    pub fn new(config: PredictionConfig) -> Self {
        Self {
            config,
            phase: ReconcilePhase::Converged,
            state: None,
            offset: Vec3::ZERO,
            smoothing_from: Vec3::ZERO,
            smoothing_elapsed_ms: 0.0,
            last_authoritative_ms: None,
            stats: ReconcileStats::default(),
        }
    }

    pub fn phase(&self) -> ReconcilePhase {
        self.phase
    }

    pub fn state(&self) -> Option<&ReconciliationState> {
        self.state.as_ref()
    }

    pub fn stats(&self) -> ReconcileStats {
        self.stats
    }

    /// Visual offset added to the predicted position while smoothing.
    pub fn offset(&self) -> Vec3 {
        self.offset
    }

    /// Reconciles `buffer` against the server's state of the controlled
    /// entity after it processed inputs up to `acked_seq`.
    pub fn on_authoritative(
        &mut self,
        buffer: &mut PredictionBuffer,
        authoritative: &Transform,
        acked_seq: u32,
        teleport: bool,
        now_ms: f64,
    ) -> Correction {
        self.last_authoritative_ms = Some(now_ms);
        self.stats.updates += 1;

        let overflowed = buffer.take_overflow();
        let reset = match &self.state {
            None => Some(HardResetReason::Initial),
            Some(_) if teleport => Some(HardResetReason::Teleport),
            Some(_) if overflowed => Some(HardResetReason::Overflow),
            Some(_) => None,
        };
        if let Some(reason) = reset {
            return self.hard_reset(buffer, authoritative, acked_seq, reason);
        }

        let Some(state) = self.state.as_mut() else {
            return Correction::Ignored;
        };
        if !sequence_greater_than(acked_seq, state.last_acked_seq) {
            return Correction::Ignored;
        }

        let error = buffer
            .frame(acked_seq)
            .map_or(f32::INFINITY, |frame| {
                frame.predicted.position.distance(authoritative.position)
            });
        state.last_acked_seq = acked_seq;
        state.authoritative_base = *authoritative;
        buffer.acknowledge(acked_seq);

        if error <= self.config.epsilon {
            self.stats.converged += 1;
            return Correction::Converged;
        }

        self.phase = ReconcilePhase::Correcting;
        self.stats.corrections += 1;
        if error.is_finite() {
            self.stats.max_error = self.stats.max_error.max(error);
        }

        let rendered_before = buffer.current().position + self.offset;
        let replayed = buffer.replay(authoritative);
        let offset = rendered_before - replayed.position;

        if offset.length() > self.config.visual_threshold {
            log::debug!(
                "correcting seq {acked_seq}: error {error:.4}, smoothing {:.4}",
                offset.length()
            );
            self.phase = ReconcilePhase::Smoothing;
            self.offset = offset;
            self.smoothing_from = offset;
            self.smoothing_elapsed_ms = 0.0;
            self.stats.smoothed += 1;
            Correction::Smoothed {
                error,
                offset: offset.length(),
            }
        } else {
            self.clear_offset();
            Correction::Applied { error }
        }
    }

    fn hard_reset(
        &mut self,
        buffer: &mut PredictionBuffer,
        authoritative: &Transform,
        acked_seq: u32,
        reason: HardResetReason,
    ) -> Correction {
        log::debug!("hard reset ({reason:?}) at seq {acked_seq}");
        buffer.acknowledge(acked_seq);
        buffer.replay(authoritative);
        self.clear_offset();
        self.state = Some(ReconciliationState {
            last_acked_seq: acked_seq,
            authoritative_base: *authoritative,
        });
        self.stats.hard_resets += 1;
        Correction::HardReset(reason)
    }

    fn clear_offset(&mut self) {
        self.phase = ReconcilePhase::Converged;
        self.offset = Vec3::ZERO;
        self.smoothing_from = Vec3::ZERO;
        self.smoothing_elapsed_ms = 0.0;
    }

    /// Fades the visual offset linearly over the smoothing window.
    pub fn advance(&mut self, elapsed_ms: f64) {
        if self.phase != ReconcilePhase::Smoothing {
            return;
        }
        self.smoothing_elapsed_ms += elapsed_ms.max(0.0);
        let window = self.config.smoothing_window_ms;
        if window <= 0.0 || self.smoothing_elapsed_ms >= window {
            self.clear_offset();
            return;
        }
        let remaining = 1.0 - (self.smoothing_elapsed_ms / window) as f32;
        self.offset = self.smoothing_from * remaining;
    }

    pub fn rendered(&self, buffer: &PredictionBuffer) -> Transform {
        let mut transform = *buffer.current();
        transform.position += self.offset;
        transform
    }

    /// True when no authoritative state has arrived for longer than the
    /// watchdog interval. Never true before the first one.
    pub fn watchdog_expired(&self, now_ms: f64) -> bool {
        self.last_authoritative_ms
            .is_some_and(|last| now_ms - last > self.config.watchdog_ms)
    }

    /// Drops all state; the next authoritative update is a hard reset.
    pub fn reset(&mut self) {
        self.state = None;
        self.last_authoritative_ms = None;
        self.clear_offset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::movement::MovementModel;
    use crate::net::{InputFlags, InputVector};

    const DT: f32 = 1.0 / 60.0;

    fn forward() -> InputVector {
        InputVector::new(Vec3::new(0.0, 0.0, -1.0), 0.0, InputFlags::empty())
    }

    fn setup() -> (PredictionBuffer, ReconciliationEngine) {
        let mut buffer = PredictionBuffer::new(MovementModel::default(), DT, 128);
        let mut engine = ReconciliationEngine::new(PredictionConfig::default());
        let correction = engine.on_authoritative(&mut buffer, &Transform::default(), 0, false, 0.0);
        assert_eq!(correction, Correction::HardReset(HardResetReason::Initial));
        (buffer, engine)
    }

    #[test]
    fn matching_prediction_converges() {
        let (mut buffer, mut engine) = setup();
        for i in 0..3 {
            buffer.apply_input(forward(), i as f64);
        }
        let server = buffer.frame(2).unwrap().predicted;

        assert_eq!(
            engine.on_authoritative(&mut buffer, &server, 2, false, 50.0),
            Correction::Converged
        );
        assert_eq!(buffer.len(), 1);
        assert_eq!(engine.state().unwrap().last_acked_seq, 2);
    }

    #[test]
    fn stale_sequence_is_ignored() {
        let (mut buffer, mut engine) = setup();
        for i in 0..3 {
            buffer.apply_input(forward(), i as f64);
        }
        let server = buffer.frame(2).unwrap().predicted;
        engine.on_authoritative(&mut buffer, &server, 2, false, 50.0);

        let bogus = Transform::at(Vec3::splat(100.0));
        assert_eq!(
            engine.on_authoritative(&mut buffer, &bogus, 2, false, 60.0),
            Correction::Ignored
        );
        assert_eq!(
            engine.on_authoritative(&mut buffer, &bogus, 1, false, 60.0),
            Correction::Ignored
        );
    }

    #[test]
    fn divergence_replays_and_smooths_without_jumping() {
        let (mut buffer, mut engine) = setup();
        for i in 0..6 {
            buffer.apply_input(forward(), i as f64);
        }
        let rendered_before = engine.rendered(&buffer).position;

        let mut server = buffer.frame(3).unwrap().predicted;
        server.position.x += 0.5;
        let correction = engine.on_authoritative(&mut buffer, &server, 3, false, 50.0);

        assert!(matches!(correction, Correction::Smoothed { .. }));
        assert_eq!(engine.phase(), ReconcilePhase::Smoothing);
        assert!((engine.rendered(&buffer).position - rendered_before).length() < 1e-5);
        assert!((buffer.current().position.x - 0.5).abs() < 1e-5);

        engine.advance(75.0);
        assert!((engine.offset().x + 0.25).abs() < 1e-4);
        engine.advance(75.0);
        assert_eq!(engine.phase(), ReconcilePhase::Converged);
        assert_eq!(engine.rendered(&buffer).position, buffer.current().position);
    }

    #[test]
    fn small_divergence_is_applied_directly() {
        let (mut buffer, mut engine) = setup();
        buffer.apply_input(forward(), 0.0);
        let mut server = buffer.frame(1).unwrap().predicted;
        server.position.x += 0.03;

        assert!(matches!(
            engine.on_authoritative(&mut buffer, &server, 1, false, 16.0),
            Correction::Applied { .. }
        ));
        assert_eq!(engine.offset(), Vec3::ZERO);
    }

    #[test]
    fn overflow_and_teleport_snap() {
        let mut buffer = PredictionBuffer::new(MovementModel::default(), DT, 4);
        let mut engine = ReconciliationEngine::new(PredictionConfig::default());
        engine.on_authoritative(&mut buffer, &Transform::default(), 0, false, 0.0);

        for i in 0..10 {
            buffer.apply_input(forward(), i as f64);
        }
        let server = Transform::at(Vec3::new(3.0, 0.0, 0.0));
        assert_eq!(
            engine.on_authoritative(&mut buffer, &server, 8, false, 100.0),
            Correction::HardReset(HardResetReason::Overflow)
        );
        assert_eq!(engine.offset(), Vec3::ZERO);
        assert_eq!(buffer.len(), 2);

        let far = Transform::at(Vec3::new(500.0, 0.0, 0.0));
        assert_eq!(
            engine.on_authoritative(&mut buffer, &far, 9, true, 116.0),
            Correction::HardReset(HardResetReason::Teleport)
        );
        assert!((buffer.current().position.x - 500.0).abs() < 1e-3);
    }

    #[test]
    fn replay_is_idempotent() {
        let (mut buffer, _) = setup();
        for i in 0..20 {
            let yaw = i as f32 * 0.1;
            buffer.apply_input(InputVector::new(Vec3::new(0.2, 0.0, -1.0), yaw, InputFlags::SPRINT), i as f64);
        }
        let base = Transform::at(Vec3::new(4.0, 1.0, 43.869));

        let first = buffer.replay(&base);
        let second = buffer.replay(&base);
        assert_eq!(first, second);
    }

    #[test]
    fn watchdog_tracks_authoritative_updates() {
        let (mut buffer, mut engine) = setup();
        assert!(!engine.watchdog_expired(900.0));
        assert!(engine.watchdog_expired(1001.0));

        engine.on_authoritative(&mut buffer, &Transform::default(), 0, false, 1000.0);
        assert!(!engine.watchdog_expired(1500.0));
    }
}
