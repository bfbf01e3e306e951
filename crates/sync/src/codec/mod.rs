mod quantize;
mod rotation;

pub use quantize::{
    FieldSpec, POSITION_COMPACT, POSITION_WIDE, PositionPrecision, ROTATION_COMPONENT,
    ROTATION_DELTA, VELOCITY, dequantize, limit, max_quantized, quantize, quantize_strict,
};
pub use rotation::{
    angle_between, apply_rotation_delta, decode_rotation, encode_rotation, encode_rotation_delta,
};
