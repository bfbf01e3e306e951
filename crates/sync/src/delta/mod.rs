//! Full/delta packet selection and the inverse decode.
//!
//! Position and velocity deltas carry the quantized float difference between
//! two transforms. A receiver that adds them to a base identical to the
//! sender's base reconstructs the target within half a quantization step, and
//! the error does not compound along a chain of deltas.

mod decode;
mod encode;

use serde::Deserialize;

use crate::codec::PositionPrecision;

pub use decode::{Decoded, FrameClock};

pub const DEFAULT_MAX_DELTA_TICKS: u64 = 60;
pub const DEFAULT_MAX_DELTA_DISTANCE: f32 = 50.0;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    pub position_precision: PositionPrecision,
    /// Larger tick gaps fall back to a full packet.
    pub max_delta_ticks: u64,
    /// Larger displacements fall back to a full packet.
    pub max_delta_distance: f32,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            position_precision: PositionPrecision::default(),
            max_delta_ticks: DEFAULT_MAX_DELTA_TICKS,
            max_delta_distance: DEFAULT_MAX_DELTA_DISTANCE,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DeltaCodec {
    config: CodecConfig,
}

impl DeltaCodec {
    pub fn new(config: CodecConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    pub fn precision(&self) -> PositionPrecision {
        self.config.position_precision
    }
}
