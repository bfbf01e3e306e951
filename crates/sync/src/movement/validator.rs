use std::collections::HashMap;
use std::fmt;

use glam::Vec3;
use serde::Deserialize;

use crate::snapshot::{EntityId, Transform};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Units per second.
    pub max_speed: f32,
    /// Added to every displacement budget to absorb timing noise. Must be
    /// positive and well below one tick of travel at `max_speed`.
    pub tolerance_margin: f32,
    /// Displacements this many times over budget are rejected outright.
    pub reject_factor: f32,
    /// How far the client's input clock may run ahead of the server clock,
    /// relative to the offset seen on its first move.
    pub max_clock_lead_ms: f64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            max_speed: 10.0,
            tolerance_margin: 0.05,
            reject_factor: 10.0,
            max_clock_lead_ms: 250.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RejectReason {
    UnknownEntity,
    NonFinite,
    Implausible { displacement: f32, max_displacement: f32 },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::UnknownEntity => write!(f, "unknown entity"),
            RejectReason::NonFinite => write!(f, "non-finite transform"),
            RejectReason::Implausible {
                displacement,
                max_displacement,
            } => write!(f, "moved {displacement:.3} with a budget of {max_displacement:.3}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    Accept,
    Clamp(Transform),
    Reject(RejectReason),
}

impl Decision {
    pub fn is_correction(&self) -> bool {
        !matches!(self, Decision::Accept)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidatorStats {
    pub accepted: u64,
    pub clamped: u64,
    pub rejected: u64,
}

#[derive(Debug, Clone)]
struct Baseline {
    position: Vec3,
    server_ms: f64,
    /// Effective client time of the last accepted move.
    client_ms: Option<f64>,
    /// `client - server` on the first move after (re)baselining.
    clock_offset: Option<f64>,
}

/// Gate for every client-driven position change on the server.
#[derive(Debug, Default)]
pub struct MovementValidator {
    config: ValidatorConfig,
    baselines: HashMap<EntityId, Baseline>,
    stats: ValidatorStats,
}

impl MovementValidator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self {
            config,
            baselines: HashMap::new(),
            stats: ValidatorStats::default(),
        }
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    pub fn stats(&self) -> ValidatorStats {
        self.stats
    }

    pub fn register(&mut self, entity_id: EntityId, position: Vec3, now_ms: f64) {
        self.rebaseline(entity_id, position, now_ms);
    }

    /// Forgets timing history, so a move after a reconnect or teleport is
    /// measured from `now_ms` rather than from before the gap.
    pub fn rebaseline(&mut self, entity_id: EntityId, position: Vec3, now_ms: f64) {
        self.baselines.insert(
            entity_id,
            Baseline {
                position,
                server_ms: now_ms,
                client_ms: None,
                clock_offset: None,
            },
        );
    }

    pub fn forget(&mut self, entity_id: EntityId) {
        self.baselines.remove(&entity_id);
    }

    pub fn last_accepted_position(&self, entity_id: EntityId) -> Option<Vec3> {
        self.baselines.get(&entity_id).map(|b| b.position)
    }

    pub fn validate(
        &mut self,
        entity_id: EntityId,
        requested: &Transform,
        client_timestamp_ms: f64,
        now_ms: f64,
    ) -> Decision {
        let decision = self.judge(entity_id, requested, client_timestamp_ms, now_ms);
        match &decision {
            Decision::Accept => self.stats.accepted += 1,
            Decision::Clamp(clamped) => {
                self.stats.clamped += 1;
                log::warn!(
                    "{entity_id}: clamped move to {:?} (requested {:?})",
                    clamped.position,
                    requested.position
                );
            }
            Decision::Reject(reason) => {
                self.stats.rejected += 1;
                log::warn!("{entity_id}: rejected move, {reason}");
            }
        }
        decision
    }

    fn judge(
        &mut self,
        entity_id: EntityId,
        requested: &Transform,
        client_timestamp_ms: f64,
        now_ms: f64,
    ) -> Decision {
        let config = self.config.clone();
        let Some(baseline) = self.baselines.get_mut(&entity_id) else {
            return Decision::Reject(RejectReason::UnknownEntity);
        };
        if !requested.is_finite() || !client_timestamp_ms.is_finite() {
            return Decision::Reject(RejectReason::NonFinite);
        }

        let (elapsed_ms, client_ms) = match (baseline.client_ms, baseline.clock_offset) {
            (Some(last_client), Some(offset)) => {
                let ceiling = now_ms + offset + config.max_clock_lead_ms;
                let effective = client_timestamp_ms.min(ceiling).max(last_client);
                (effective - last_client, effective)
            }
            _ => {
                baseline.clock_offset = Some(client_timestamp_ms - now_ms);
                ((now_ms - baseline.server_ms).max(0.0), client_timestamp_ms)
            }
        };
        let elapsed_s = (elapsed_ms / 1000.0) as f32;

        let max_displacement = config.max_speed * elapsed_s + config.tolerance_margin;
        let offset = requested.position - baseline.position;
        let displacement = offset.length();

        if displacement > config.reject_factor * max_displacement {
            return Decision::Reject(RejectReason::Implausible {
                displacement,
                max_displacement,
            });
        }

        baseline.client_ms = Some(client_ms);
        baseline.server_ms = now_ms;

        if displacement <= max_displacement {
            baseline.position = requested.position;
            return Decision::Accept;
        }

        let mut clamped = *requested;
        clamped.position = baseline.position + offset / displacement * max_displacement;
        clamped.velocity = requested.velocity.clamp_length_max(config.max_speed);
        baseline.position = clamped.position;
        Decision::Clamp(clamped)
    }
}
