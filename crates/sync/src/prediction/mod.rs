mod buffer;
mod reconcile;

use serde::Deserialize;

pub use buffer::{DEFAULT_PREDICTION_CAPACITY, PredictionBuffer, PredictionFrame};
pub use reconcile::{
    Correction, HardResetReason, ReconcilePhase, ReconcileStats, ReconciliationEngine,
    ReconciliationState,
};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PredictionConfig {
    /// Unacknowledged frames kept before the oldest are dropped.
    pub capacity: usize,
    /// Prediction error tolerated without correcting, in world units.
    pub epsilon: f32,
    /// Rendered jumps below this are applied directly instead of smoothed.
    pub visual_threshold: f32,
    pub smoothing_window_ms: f64,
    pub watchdog_ms: f64,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_PREDICTION_CAPACITY,
            epsilon: 0.01,
            visual_threshold: 0.05,
            smoothing_window_ms: 150.0,
            watchdog_ms: 1000.0,
        }
    }
}
