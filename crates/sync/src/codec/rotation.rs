use glam::{Quat, Vec3};

use crate::error::MalformedPacket;

use super::quantize::{ROTATION_COMPONENT, ROTATION_DELTA};

fn canonical(rotation: Quat) -> Quat {
    let rotation = rotation.normalize();
    if rotation.w < 0.0 { -rotation } else { rotation }
}

pub fn encode_rotation(rotation: Quat) -> [i16; 4] {
    let q = if rotation.is_finite() && rotation.length_squared() > f32::EPSILON {
        canonical(rotation)
    } else {
        Quat::IDENTITY
    };
    [q.x, q.y, q.z, q.w].map(|c| ROTATION_COMPONENT.quantize(c) as i16)
}

pub fn decode_rotation(encoded: [i16; 4]) -> Result<Quat, MalformedPacket> {
    let [x, y, z, w] = encoded.map(|c| ROTATION_COMPONENT.dequantize(c as i32));
    let q = Quat::from_xyzw(x, y, z, w);
    if q.length_squared() < 1e-6 {
        return Err(MalformedPacket::DegenerateRotation);
    }
    Ok(q.normalize())
}

/// Rotation vector (axis times angle) taking `base` to `target`.
pub fn encode_rotation_delta(base: Quat, target: Quat) -> [i16; 3] {
    let relative = canonical(target * base.inverse());
    let v = relative.to_scaled_axis();
    [v.x, v.y, v.z].map(|c| ROTATION_DELTA.quantize(c) as i16)
}

pub fn apply_rotation_delta(base: Quat, delta: [i16; 3]) -> Quat {
    let [x, y, z] = delta.map(|c| ROTATION_DELTA.dequantize(c as i32));
    (Quat::from_scaled_axis(Vec3::new(x, y, z)) * base).normalize()
}

pub fn angle_between(a: Quat, b: Quat) -> f32 {
    let r = a.normalize().inverse() * b.normalize();
    2.0 * Vec3::new(r.x, r.y, r.z).length().atan2(r.w.abs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::{FRAC_PI_2, PI};

    #[test]
    fn full_rotation_roundtrip() {
        let q = Quat::from_euler(glam::EulerRot::YXZ, 1.2, -0.4, 0.1);
        let decoded = decode_rotation(encode_rotation(q)).unwrap();
        assert!(angle_between(q, decoded) < 1e-3);
    }

    #[test]
    fn negated_quaternion_encodes_identically() {
        let q = Quat::from_rotation_y(2.0);
        assert_eq!(encode_rotation(q), encode_rotation(-q));
        assert!(encode_rotation(q)[3] >= 0);
    }

    #[test]
    fn zero_quaternion_is_malformed() {
        assert_eq!(
            decode_rotation([0, 0, 0, 0]),
            Err(MalformedPacket::DegenerateRotation)
        );
    }

    #[test]
    fn small_angle_delta() {
        let base = Quat::from_rotation_y(0.3);
        let target = Quat::from_rotation_y(0.35) * Quat::from_rotation_x(0.02);
        let delta = encode_rotation_delta(base, target);
        let rebuilt = apply_rotation_delta(base, delta);
        assert!(angle_between(rebuilt, target) < 5e-4);
    }

    #[test]
    fn large_angle_delta_stays_in_range() {
        let base = Quat::from_rotation_z(-FRAC_PI_2);
        let target = Quat::from_rotation_z(PI - 0.01);
        let rebuilt = apply_rotation_delta(base, encode_rotation_delta(base, target));
        assert!(angle_between(rebuilt, target) < 1e-3);
    }

    #[test]
    fn unchanged_rotation_has_zero_delta() {
        let q = Quat::from_rotation_y(1.0);
        assert_eq!(encode_rotation_delta(q, q), [0, 0, 0]);
    }
}
