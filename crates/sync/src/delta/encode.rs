use glam::Vec3;

use crate::codec::{self, FieldSpec, VELOCITY};
use crate::error::CodecError;
use crate::net::{DeltaPacket, FullPacket, Packet};
use crate::snapshot::{Snapshot, StateFlags};

use super::DeltaCodec;

impl DeltaCodec {
    /// Encodes `curr`, as a delta against `prev` when the two are continuous.
    ///
    /// `prev` must be the snapshot the receiver holds at `prev.server_tick`.
    pub fn encode(&self, prev: Option<&Snapshot>, curr: &Snapshot) -> Packet {
        let precision = self.precision();
        let full = || {
            FullPacket::from_transform(curr.entity_id, curr.server_tick, &curr.transform, precision)
        };

        if curr.transform.flags().contains(StateFlags::TELEPORTED) {
            return Packet::Teleport(full());
        }

        let Some(prev) = prev.filter(|prev| self.is_continuous(prev, curr)) else {
            return Packet::Full(full());
        };

        match self.delta(prev, curr) {
            Ok(delta) => Packet::Delta(delta),
            Err(err) => {
                log::debug!("{}: {err}, sending full state", curr.entity_id);
                Packet::Full(full())
            }
        }
    }

    fn is_continuous(&self, prev: &Snapshot, curr: &Snapshot) -> bool {
        if prev.entity_id != curr.entity_id || curr.server_tick <= prev.server_tick {
            return false;
        }
        if curr.server_tick - prev.server_tick > self.config.max_delta_ticks {
            return false;
        }
        let distance = prev.transform.position.distance(curr.transform.position);
        distance.is_finite() && distance <= self.config.max_delta_distance
    }

    fn delta(&self, prev: &Snapshot, curr: &Snapshot) -> Result<DeltaPacket, CodecError> {
        let (base, target) = (&prev.transform, &curr.transform);
        let mut delta = DeltaPacket::empty(curr.entity_id, prev.server_tick);

        let position = quantize_diff(
            self.precision().field(),
            target.position - base.position,
        )?;
        if position != [0; 3] {
            delta.position = Some(position);
        }

        let rotation = codec::encode_rotation_delta(base.rotation, target.rotation);
        if rotation != [0; 3] {
            delta.rotation = Some(rotation);
        }

        let velocity = quantize_diff(VELOCITY, target.velocity - base.velocity)?;
        if velocity != [0; 3] {
            delta.velocity = Some(velocity.map(|c| c as i16));
        }

        if target.discrete_state != base.discrete_state {
            delta.state = Some(target.discrete_state);
        }
        Ok(delta)
    }
}

fn quantize_diff(field: FieldSpec, diff: Vec3) -> Result<[i32; 3], CodecError> {
    Ok([
        field.quantize_strict(diff.x)?,
        field.quantize_strict(diff.y)?,
        field.quantize_strict(diff.z)?,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::PositionPrecision;
    use crate::delta::CodecConfig;
    use crate::snapshot::{EntityId, Transform};
    use glam::Quat;

    const ID: EntityId = EntityId(1);

    fn snapshot(tick: u64, position: Vec3) -> Snapshot {
        Snapshot::new(ID, Transform::at(position), tick, tick as f64 * 16.0)
    }

    #[test]
    fn first_observation_is_full() {
        let codec = DeltaCodec::default();
        let packet = codec.encode(None, &snapshot(5, Vec3::ONE));
        assert!(matches!(packet, Packet::Full(full) if full.server_tick == 5));
    }

    #[test]
    fn unchanged_entity_sends_empty_delta() {
        let codec = DeltaCodec::default();
        let a = snapshot(1, Vec3::new(3.0, 4.0, 5.0));
        let b = snapshot(2, Vec3::new(3.0, 4.0, 5.0));

        match codec.encode(Some(&a), &b) {
            Packet::Delta(delta) => {
                assert_eq!(delta.base_tick, 1);
                assert!(delta.mask().is_empty());
            }
            other => panic!("expected delta, got {other:?}"),
        }
    }

    #[test]
    fn only_changed_fields_are_present() {
        let codec = DeltaCodec::default();
        let a = snapshot(1, Vec3::ZERO);
        let mut b = snapshot(2, Vec3::new(0.5, 0.0, 0.0));
        b.transform.rotation = Quat::from_rotation_y(0.1);

        let Packet::Delta(delta) = codec.encode(Some(&a), &b) else {
            panic!("expected delta");
        };
        assert_eq!(delta.position, Some([500, 0, 0]));
        assert!(delta.rotation.is_some());
        assert!(delta.velocity.is_none());
        assert!(delta.state.is_none());
    }

    #[test]
    fn discontinuities_fall_back_to_full() {
        let codec = DeltaCodec::default();
        let a = snapshot(10, Vec3::ZERO);

        assert!(codec.encode(Some(&a), &snapshot(10, Vec3::ZERO)).is_full());
        assert!(codec.encode(Some(&a), &snapshot(9, Vec3::ZERO)).is_full());
        assert!(codec.encode(Some(&a), &snapshot(71, Vec3::ZERO)).is_full());
        assert!(!codec.encode(Some(&a), &snapshot(70, Vec3::ZERO)).is_full());
        assert!(codec.encode(Some(&a), &snapshot(11, Vec3::new(60.0, 0.0, 0.0))).is_full());
    }

    #[test]
    fn delta_outside_field_range_falls_back_to_full() {
        let codec = DeltaCodec::new(CodecConfig {
            position_precision: PositionPrecision::Compact,
            max_delta_distance: 1000.0,
            ..Default::default()
        });
        let a = snapshot(1, Vec3::new(-200.0, 0.0, 0.0));
        let b = snapshot(2, Vec3::new(200.0, 0.0, 0.0));
        assert!(codec.encode(Some(&a), &b).is_full());

        let mut fast = snapshot(2, Vec3::ZERO);
        fast.transform.velocity = Vec3::new(300.0, 0.0, 0.0);
        let mut reverse = snapshot(1, Vec3::ZERO);
        reverse.transform.velocity = Vec3::new(-300.0, 0.0, 0.0);
        assert!(codec.encode(Some(&reverse), &fast).is_full());
    }

    #[test]
    fn teleport_flag_selects_teleport_packet() {
        let codec = DeltaCodec::default();
        let a = snapshot(1, Vec3::ZERO);
        let mut b = snapshot(2, Vec3::new(0.1, 0.0, 0.0));
        b.transform.set_flags(StateFlags::TELEPORTED);

        assert!(matches!(codec.encode(Some(&a), &b), Packet::Teleport(_)));
    }

    #[test]
    fn mismatched_entities_never_delta() {
        let codec = DeltaCodec::default();
        let mut other = snapshot(1, Vec3::ZERO);
        other.entity_id = EntityId(2);
        assert!(codec.encode(Some(&other), &snapshot(2, Vec3::ZERO)).is_full());
    }
}
