//! Fixed-point quantization of `f32` fields.
//!
//! A field is described by a scale and a bit width. `quantize` multiplies by the
//! scale, rounds to nearest and saturates to the symmetric range
//! `-(2^(bits-1) - 1) ..= 2^(bits-1) - 1`. Saturation happens before the integer
//! is narrowed to its wire width, so an out-of-range value pins to the boundary
//! instead of wrapping around into the opposite sign. For a 16-bit field at
//! scale 1000 the boundary is ±32.767: `43.869` encodes as `32767`, never as the
//! wrapped `-21667`.
//!
//! The range is symmetric, so `-v` and `v` always saturate to the same magnitude.

use crate::error::CodecError;

/// Position, 16-bit, centimetre resolution, ±327.67 units.
pub const POSITION_COMPACT: FieldSpec = FieldSpec::new(100.0, 16);
/// Position, 32-bit, millimetre resolution. Beyond roughly ±8 000 units the
/// `f32` carrying the value is coarser than a millimetre.
pub const POSITION_WIDE: FieldSpec = FieldSpec::new(1000.0, 32);
/// Linear velocity, 16-bit, ±327.67 units/s.
pub const VELOCITY: FieldSpec = FieldSpec::new(100.0, 16);
/// One component of a unit quaternion.
pub const ROTATION_COMPONENT: FieldSpec = FieldSpec::new(32767.0, 16);
/// One component of a small-angle rotation vector in radians, ±3.2767.
pub const ROTATION_DELTA: FieldSpec = FieldSpec::new(10000.0, 16);

/// Wire width of quantized positions. Both ends must be configured alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionPrecision {
    Compact,
    #[default]
    Wide,
}

impl PositionPrecision {
    pub fn field(self) -> FieldSpec {
        match self {
            Self::Compact => POSITION_COMPACT,
            Self::Wide => POSITION_WIDE,
        }
    }

    pub fn component_bytes(self) -> usize {
        match self {
            Self::Compact => 2,
            Self::Wide => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSpec {
    pub scale: f32,
    pub bits: u8,
}

impl FieldSpec {
    pub const fn new(scale: f32, bits: u8) -> Self {
        Self { scale, bits }
    }

    pub fn step(&self) -> f32 {
        1.0 / self.scale
    }

    pub fn limit(&self) -> f32 {
        limit(self.scale, self.bits)
    }

    pub fn max_quantized(&self) -> i32 {
        max_quantized(self.bits)
    }

    pub fn quantize(&self, value: f32) -> i32 {
        quantize(value, self.scale, self.bits)
    }

    pub fn quantize_strict(&self, value: f32) -> Result<i32, CodecError> {
        quantize_strict(value, self.scale, self.bits)
    }

    pub fn dequantize(&self, quantized: i32) -> f32 {
        dequantize(quantized, self.scale, self.bits)
    }

    pub fn clamp(&self, value: f32) -> f32 {
        self.dequantize(self.quantize(value))
    }
}

/// Largest magnitude representable in `bits` signed bits (2..=32).
pub fn max_quantized(bits: u8) -> i32 {
    let bits = bits.clamp(2, 32);
    ((1i64 << (bits - 1)) - 1) as i32
}

/// Largest magnitude a field can carry before saturating.
pub fn limit(scale: f32, bits: u8) -> f32 {
    (max_quantized(bits) as f64 / scale as f64) as f32
}

/// Clamping quantization. NaN encodes as zero.
pub fn quantize(value: f32, scale: f32, bits: u8) -> i32 {
    if value.is_nan() {
        return 0;
    }
    let max = max_quantized(bits) as f64;
    let scaled = (value as f64 * scale as f64).round();
    scaled.clamp(-max, max) as i32
}

/// Quantization that refuses to saturate.
pub fn quantize_strict(value: f32, scale: f32, bits: u8) -> Result<i32, CodecError> {
    let max = max_quantized(bits) as f64;
    let scaled = (value as f64 * scale as f64).round();
    if !scaled.is_finite() || scaled.abs() > max {
        return Err(CodecError::OutOfRange {
            value,
            limit: limit(scale, bits),
        });
    }
    Ok(scaled as i32)
}

/// Pure division. Wire integers outside the symmetric range (`i16::MIN` on a
/// 16-bit field) read as the boundary.
pub fn dequantize(quantized: i32, scale: f32, bits: u8) -> f32 {
    let max = max_quantized(bits);
    (quantized.clamp(-max, max) as f64 / scale as f64) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundaries() {
        assert_eq!(max_quantized(16), i16::MAX as i32);
        assert_eq!(max_quantized(32), i32::MAX);
        assert_eq!(max_quantized(8), 127);
        assert!((limit(1000.0, 16) - 32.767).abs() < 1e-6);
    }

    #[test]
    fn saturates_instead_of_wrapping() {
        assert_eq!(quantize(43.869, 1000.0, 16), 32767);
        assert_eq!(quantize(-43.869, 1000.0, 16), -32767);
        assert_eq!(quantize(f32::INFINITY, 100.0, 16), 32767);
        assert_eq!(quantize(f32::NEG_INFINITY, 100.0, 16), -32767);
        assert_eq!(quantize(f32::NAN, 100.0, 16), 0);
    }

    #[test]
    fn strict_mode_reports_out_of_range() {
        let err = quantize_strict(43.869, 1000.0, 16).unwrap_err();
        assert!(matches!(err, CodecError::OutOfRange { .. }));
        assert_eq!(quantize_strict(32.767, 1000.0, 16).unwrap(), 32767);
        assert!(quantize_strict(f32::NAN, 1000.0, 16).is_err());
    }

    #[test]
    fn rounds_to_nearest() {
        assert_eq!(quantize(0.0149, 100.0, 16), 1);
        assert_eq!(quantize(0.0151, 100.0, 16), 2);
        assert_eq!(quantize(-0.0151, 100.0, 16), -2);
        assert_eq!(quantize(0.004, 100.0, 16), 0);
    }

    #[test]
    fn dequantize_is_division() {
        assert!((dequantize(43869, 1000.0, 32) - 43.869).abs() < 1e-6);
        assert!((VELOCITY.dequantize(-525) + 5.25).abs() < 1e-6);
    }

    #[test]
    fn asymmetric_wire_minimum_reads_as_boundary() {
        assert!((dequantize(i16::MIN as i32, 100.0, 16) + 327.67).abs() < 1e-4);
    }
}
