use bitflags::bitflags;

use crate::codec::PositionPrecision;
use crate::error::MalformedPacket;
use crate::snapshot::EntityId;

use super::packet::Packet;
use super::protocol::{FRAME_MAGIC, FRAME_VERSION, MAX_PACKET_SIZE};
use super::wire::{WireReader, WireWriter};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FrameFlags: u8 {
        /// The frame answers a clamped or rejected move of the recipient.
        const CORRECTION = 1 << 0;
    }
}

/// Everything one recipient receives for one server tick.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncFrame {
    pub flags: FrameFlags,
    pub server_tick: u64,
    pub server_timestamp_ms: f64,
    /// The entity the recipient controls.
    pub owner: EntityId,
    /// Newest input sequence the server has processed for the recipient.
    pub last_input_seq: u32,
    pub packets: Vec<Packet>,
}

impl SyncFrame {
    pub fn new(server_tick: u64, server_timestamp_ms: f64, owner: EntityId) -> Self {
        Self {
            flags: FrameFlags::empty(),
            server_tick,
            server_timestamp_ms,
            owner,
            last_input_seq: 0,
            packets: Vec::new(),
        }
    }

    pub fn is_correction(&self) -> bool {
        self.flags.contains(FrameFlags::CORRECTION)
    }

    pub fn encode(&self, precision: PositionPrecision) -> Vec<u8> {
        let mut writer = WireWriter::with_capacity(32 + self.packets.len() * 24);
        writer.u32(FRAME_MAGIC);
        writer.u8(FRAME_VERSION);
        writer.u8(self.flags.bits());
        writer.u64(self.server_tick);
        writer.f64(self.server_timestamp_ms);
        writer.varint(self.owner.id());
        writer.u32(self.last_input_seq);

        let count = self.packets.len().min(u16::MAX as usize);
        if count < self.packets.len() {
            log::warn!(
                "frame {} carries {} packets, truncating to {count}",
                self.server_tick,
                self.packets.len()
            );
        }
        writer.u16(count as u16);
        for packet in &self.packets[..count] {
            packet.write(&mut writer, precision);
        }

        if writer.len() > MAX_PACKET_SIZE {
            log::warn!(
                "frame {} is {} bytes, above the {MAX_PACKET_SIZE} byte datagram budget",
                self.server_tick,
                writer.len()
            );
        }
        writer.into_bytes()
    }

    /// Parses the whole frame before returning, so a malformed frame is
    /// never partially applied.
    pub fn decode(data: &[u8], precision: PositionPrecision) -> Result<Self, MalformedPacket> {
        let mut reader = WireReader::new(data);

        let magic = reader.u32()?;
        if magic != FRAME_MAGIC {
            return Err(MalformedPacket::BadMagic(magic));
        }
        let version = reader.u8()?;
        if version != FRAME_VERSION {
            return Err(MalformedPacket::UnsupportedVersion(version));
        }
        let flag_bits = reader.u8()?;
        let flags = FrameFlags::from_bits(flag_bits)
            .ok_or(MalformedPacket::UnknownFrameFlags(flag_bits))?;

        let server_tick = reader.u64()?;
        let server_timestamp_ms = reader.f64()?;
        if !server_timestamp_ms.is_finite() {
            return Err(MalformedPacket::NonFiniteTimestamp);
        }
        let owner = EntityId(reader.varint()?);
        let last_input_seq = reader.u32()?;

        let count = reader.u16()? as usize;
        let mut packets = Vec::with_capacity(count.min(reader.remaining()));
        for _ in 0..count {
            packets.push(Packet::read(&mut reader, precision)?);
        }

        match reader.remaining() {
            0 => Ok(Self {
                flags,
                server_tick,
                server_timestamp_ms,
                owner,
                last_input_seq,
                packets,
            }),
            n => Err(MalformedPacket::TrailingBytes(n)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::packet::{DeltaPacket, FullPacket};
    use crate::snapshot::Transform;
    use glam::Vec3;

    fn frame() -> SyncFrame {
        let mut frame = SyncFrame::new(120, 2000.0, EntityId(4));
        frame.flags = FrameFlags::CORRECTION;
        frame.last_input_seq = 77;
        frame.packets.push(Packet::Full(FullPacket::from_transform(
            EntityId(4),
            120,
            &Transform::at(Vec3::new(1.0, 2.0, 3.0)),
            PositionPrecision::Wide,
        )));
        let mut delta = DeltaPacket::empty(EntityId(9), 118);
        delta.position = Some([10, 0, -10]);
        frame.packets.push(Packet::Delta(delta));
        frame.packets.push(Packet::Despawn(EntityId(12)));
        frame
    }

    #[test]
    fn frame_survives_the_wire() {
        let frame = frame();
        let bytes = frame.encode(PositionPrecision::Wide);
        assert_eq!(&bytes[..4], b"TETH");

        let parsed = SyncFrame::decode(&bytes, PositionPrecision::Wide).unwrap();
        assert_eq!(parsed, frame);
        assert!(parsed.is_correction());
    }

    #[test]
    fn header_validation() {
        let bytes = frame().encode(PositionPrecision::Wide);

        let mut bad_magic = bytes.clone();
        bad_magic[0] = b'X';
        assert!(matches!(
            SyncFrame::decode(&bad_magic, PositionPrecision::Wide),
            Err(MalformedPacket::BadMagic(_))
        ));

        let mut bad_version = bytes.clone();
        bad_version[4] = 99;
        assert_eq!(
            SyncFrame::decode(&bad_version, PositionPrecision::Wide),
            Err(MalformedPacket::UnsupportedVersion(99))
        );

        let mut bad_flags = bytes.clone();
        bad_flags[5] = 0x80;
        assert_eq!(
            SyncFrame::decode(&bad_flags, PositionPrecision::Wide),
            Err(MalformedPacket::UnknownFrameFlags(0x80))
        );

        let mut nan_time = bytes.clone();
        nan_time[14..22].copy_from_slice(&f64::NAN.to_le_bytes());
        assert_eq!(
            SyncFrame::decode(&nan_time, PositionPrecision::Wide),
            Err(MalformedPacket::NonFiniteTimestamp)
        );
    }

    #[test]
    fn one_bad_packet_drops_the_frame() {
        let bytes = frame().encode(PositionPrecision::Wide);
        assert!(SyncFrame::decode(&bytes[..bytes.len() - 1], PositionPrecision::Wide).is_err());

        let mut padded = bytes;
        padded.extend_from_slice(&[0, 0]);
        assert_eq!(
            SyncFrame::decode(&padded, PositionPrecision::Wide),
            Err(MalformedPacket::TrailingBytes(2))
        );
    }
}
