use crate::error::DecodeError;
use crate::net::{Packet, SyncFrame};
use crate::snapshot::{EntityId, SnapshotStore, Transform};

use super::DeltaCodec;

/// Tick and server time a decoded packet is recorded under.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameClock {
    pub tick: u64,
    pub timestamp_ms: f64,
}

impl FrameClock {
    pub fn new(tick: u64, timestamp_ms: f64) -> Self {
        Self { tick, timestamp_ms }
    }

    pub fn of(frame: &SyncFrame) -> Self {
        Self::new(frame.server_tick, frame.server_timestamp_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decoded {
    Transform {
        entity_id: EntityId,
        transform: Transform,
        teleport: bool,
    },
    Despawned(EntityId),
}

impl Decoded {
    pub fn entity_id(&self) -> EntityId {
        match self {
            Decoded::Transform { entity_id, .. } | Decoded::Despawned(entity_id) => *entity_id,
        }
    }
}

impl DeltaCodec {
    /// Resolves `packet` against `store` and records the result there.
    ///
    /// A delta whose base tick is not in the store fails with
    /// [`DecodeError::StaleBase`] and leaves the store untouched.
    pub fn decode(
        &self,
        packet: &Packet,
        store: &mut SnapshotStore,
        clock: FrameClock,
    ) -> Result<Decoded, DecodeError> {
        let precision = self.precision();
        let (entity_id, transform, teleport, tick) = match packet {
            Packet::Full(full) => (full.entity_id, full.transform(precision)?, false, full.server_tick),
            Packet::Teleport(full) => (full.entity_id, full.transform(precision)?, true, full.server_tick),
            Packet::Delta(delta) => {
                let base = store.at(delta.entity_id, delta.base_tick).ok_or(
                    DecodeError::StaleBase {
                        entity_id: delta.entity_id,
                        base_tick: delta.base_tick,
                    },
                )?;
                (
                    delta.entity_id,
                    delta.apply(&base.transform, precision),
                    false,
                    clock.tick,
                )
            }
            Packet::Despawn(entity_id) => {
                store.forget(*entity_id);
                return Ok(Decoded::Despawned(*entity_id));
            }
        };

        store.record(entity_id, transform, tick, clock.timestamp_ms);
        Ok(Decoded::Transform {
            entity_id,
            transform,
            teleport,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::PositionPrecision;
    use crate::delta::CodecConfig;
    use crate::net::DeltaPacket;
    use crate::snapshot::{Snapshot, StateFlags};
    use glam::{Quat, Vec3};

    const ID: EntityId = EntityId(11);

    fn clock(tick: u64) -> FrameClock {
        FrameClock::new(tick, tick as f64 * 1000.0 / 60.0)
    }

    fn transform(x: f32, y: f32) -> Transform {
        Transform {
            position: Vec3::new(x, y, -x),
            rotation: Quat::from_rotation_y(x * 0.1),
            velocity: Vec3::new(1.5, 0.0, -0.25),
            discrete_state: StateFlags::MOVING.bits(),
        }
    }

    #[test]
    fn full_then_deltas_track_the_sender() {
        let codec = DeltaCodec::default();
        let mut receiver = SnapshotStore::default();

        let mut prev: Option<Snapshot> = None;
        for tick in 1..=30u64 {
            let curr = Snapshot::new(ID, transform(tick as f32 * 0.37, 43.869), tick, 0.0);
            let packet = codec.encode(prev.as_ref(), &curr);
            assert_eq!(packet.is_full(), tick == 1);

            let Decoded::Transform { transform, .. } =
                codec.decode(&packet, &mut receiver, clock(tick)).unwrap()
            else {
                panic!("expected transform");
            };
            assert!((transform.position - curr.transform.position).abs().max_element() <= 0.001);
            assert!(transform.position.y > 0.0);

            prev = receiver.at(ID, tick).copied();
        }
        assert_eq!(receiver.latest(ID).unwrap().server_tick, 30);
    }

    #[test]
    fn missing_base_is_stale() {
        let codec = DeltaCodec::default();
        let mut store = SnapshotStore::default();
        let packet = Packet::Delta(DeltaPacket::empty(ID, 4));

        assert_eq!(
            codec.decode(&packet, &mut store, clock(5)),
            Err(DecodeError::StaleBase {
                entity_id: ID,
                base_tick: 4
            })
        );
        assert!(!store.contains(ID));
    }

    #[test]
    fn delta_is_recorded_at_frame_tick() {
        let codec = DeltaCodec::default();
        let mut store = SnapshotStore::default();
        store.record(ID, transform(1.0, 2.0), 4, 0.0);

        let mut delta = DeltaPacket::empty(ID, 4);
        delta.position = Some([1000, 0, 0]);
        codec.decode(&Packet::Delta(delta), &mut store, clock(9)).unwrap();

        let latest = store.latest(ID).unwrap();
        assert_eq!(latest.server_tick, 9);
        assert!((latest.transform.position.x - 2.0).abs() < 1e-5);
    }

    #[test]
    fn despawn_forgets_entity() {
        let codec = DeltaCodec::default();
        let mut store = SnapshotStore::default();
        store.record(ID, transform(1.0, 2.0), 1, 0.0);

        let decoded = codec.decode(&Packet::Despawn(ID), &mut store, clock(2)).unwrap();
        assert_eq!(decoded, Decoded::Despawned(ID));
        assert!(!store.contains(ID));
    }

    #[test]
    fn teleport_is_reported() {
        let codec = DeltaCodec::new(CodecConfig {
            position_precision: PositionPrecision::Compact,
            ..Default::default()
        });
        let mut store = SnapshotStore::default();
        let mut target = transform(100.0, 1.0);
        target.set_flags(StateFlags::TELEPORTED);

        let packet = codec.encode(None, &Snapshot::new(ID, target, 3, 0.0));
        let decoded = codec.decode(&packet, &mut store, clock(3)).unwrap();
        assert!(matches!(decoded, Decoded::Transform { teleport: true, .. }));
    }

    #[test]
    fn full_packet_at_the_end_of_the_tick_range_decodes() {
        let codec = DeltaCodec::default();
        let mut store = SnapshotStore::default();
        store.record(ID, transform(1.0, 2.0), 10, 0.0);

        let top = u64::MAX - 5;
        let full = crate::net::FullPacket::from_transform(
            ID,
            top,
            &transform(3.0, 2.0),
            PositionPrecision::Wide,
        );
        let decoded = codec.decode(&Packet::Full(full), &mut store, clock(11));

        assert!(matches!(decoded, Ok(Decoded::Transform { .. })));
        assert_eq!(store.latest(ID).unwrap().server_tick, top);
        assert!(store.at(ID, 10).is_none());
    }

    #[test]
    fn degenerate_rotation_is_malformed() {
        let codec = DeltaCodec::default();
        let mut store = SnapshotStore::default();
        let mut full = crate::net::FullPacket::from_transform(
            ID,
            1,
            &Transform::default(),
            PositionPrecision::Wide,
        );
        full.rotation = [0; 4];

        assert!(matches!(
            codec.decode(&Packet::Full(full), &mut store, clock(1)),
            Err(DecodeError::Malformed(_))
        ));
        assert!(store.is_empty());
    }
}
