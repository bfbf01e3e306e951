use bitflags::bitflags;
use glam::Vec3;

use crate::codec::{self, FieldSpec, PositionPrecision, VELOCITY};
use crate::error::MalformedPacket;
use crate::snapshot::{EntityId, Transform};

use super::wire::{WireReader, WireWriter};

pub const TAG_FULL: u8 = 0;
pub const TAG_DELTA: u8 = 1;
pub const TAG_TELEPORT: u8 = 2;
pub const TAG_DESPAWN: u8 = 3;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DeltaMask: u8 {
        const POSITION = 1 << 0;
        const ROTATION = 1 << 1;
        const VELOCITY = 1 << 2;
        const STATE = 1 << 3;
    }
}

/// Complete quantized transform of one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FullPacket {
    pub entity_id: EntityId,
    pub server_tick: u64,
    pub position: [i32; 3],
    pub rotation: [i16; 4],
    pub velocity: [i16; 3],
    pub state: u8,
}

impl FullPacket {
    /// Quantizes `transform`. Components outside their field range are
    /// clamped and logged.
    pub fn from_transform(
        entity_id: EntityId,
        server_tick: u64,
        transform: &Transform,
        precision: PositionPrecision,
    ) -> Self {
        let position_field = precision.field();
        Self {
            entity_id,
            server_tick,
            position: transform
                .position
                .to_array()
                .map(|c| quantize_logged(entity_id, "position", position_field, c)),
            rotation: codec::encode_rotation(transform.rotation),
            velocity: transform
                .velocity
                .to_array()
                .map(|c| quantize_logged(entity_id, "velocity", VELOCITY, c) as i16),
            state: transform.discrete_state,
        }
    }

    pub fn transform(&self, precision: PositionPrecision) -> Result<Transform, MalformedPacket> {
        let field = precision.field();
        Ok(Transform {
            position: Vec3::from_array(self.position.map(|q| field.dequantize(q))),
            rotation: codec::decode_rotation(self.rotation)?,
            velocity: Vec3::from_array(self.velocity.map(|q| VELOCITY.dequantize(q as i32))),
            discrete_state: self.state,
        })
    }

    fn write_payload(&self, writer: &mut WireWriter, precision: PositionPrecision) {
        writer.u64(self.server_tick);
        write_position(writer, self.position, precision);
        for c in self.rotation {
            writer.i16(c);
        }
        for c in self.velocity {
            writer.i16(c);
        }
        writer.u8(self.state);
    }

    fn read_payload(
        entity_id: EntityId,
        reader: &mut WireReader<'_>,
        precision: PositionPrecision,
    ) -> Result<Self, MalformedPacket> {
        let server_tick = reader.u64()?;
        let position = read_position(reader, precision)?;
        let rotation = [reader.i16()?, reader.i16()?, reader.i16()?, reader.i16()?];
        let velocity = [reader.i16()?, reader.i16()?, reader.i16()?];
        let state = reader.u8()?;
        codec::decode_rotation(rotation)?;
        Ok(Self {
            entity_id,
            server_tick,
            position,
            rotation,
            velocity,
            state,
        })
    }
}

/// Quantized difference from the snapshot at `base_tick`. Absent fields did
/// not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeltaPacket {
    pub entity_id: EntityId,
    pub base_tick: u64,
    pub position: Option<[i32; 3]>,
    pub rotation: Option<[i16; 3]>,
    pub velocity: Option<[i16; 3]>,
    pub state: Option<u8>,
}

impl DeltaPacket {
    pub fn empty(entity_id: EntityId, base_tick: u64) -> Self {
        Self {
            entity_id,
            base_tick,
            position: None,
            rotation: None,
            velocity: None,
            state: None,
        }
    }

    pub fn mask(&self) -> DeltaMask {
        let mut mask = DeltaMask::empty();
        mask.set(DeltaMask::POSITION, self.position.is_some());
        mask.set(DeltaMask::ROTATION, self.rotation.is_some());
        mask.set(DeltaMask::VELOCITY, self.velocity.is_some());
        mask.set(DeltaMask::STATE, self.state.is_some());
        mask
    }

    /// Adds the dequantized differences to `base` field by field.
    pub fn apply(&self, base: &Transform, precision: PositionPrecision) -> Transform {
        let mut transform = *base;
        if let Some(delta) = self.position {
            let field = precision.field();
            transform.position += Vec3::from_array(delta.map(|q| field.dequantize(q)));
        }
        if let Some(delta) = self.rotation {
            transform.rotation = codec::apply_rotation_delta(base.rotation, delta);
        }
        if let Some(delta) = self.velocity {
            transform.velocity += Vec3::from_array(delta.map(|q| VELOCITY.dequantize(q as i32)));
        }
        if let Some(state) = self.state {
            transform.discrete_state = state;
        }
        transform
    }

    fn write_payload(&self, writer: &mut WireWriter, precision: PositionPrecision) {
        writer.u64(self.base_tick);
        writer.u8(self.mask().bits());
        if let Some(position) = self.position {
            write_position(writer, position, precision);
        }
        if let Some(rotation) = self.rotation {
            for c in rotation {
                writer.i16(c);
            }
        }
        if let Some(velocity) = self.velocity {
            for c in velocity {
                writer.i16(c);
            }
        }
        if let Some(state) = self.state {
            writer.u8(state);
        }
    }

    fn read_payload(
        entity_id: EntityId,
        reader: &mut WireReader<'_>,
        precision: PositionPrecision,
    ) -> Result<Self, MalformedPacket> {
        let base_tick = reader.u64()?;
        let bits = reader.u8()?;
        let mask = DeltaMask::from_bits(bits)
            .ok_or(MalformedPacket::UnknownMaskBits(bits & !DeltaMask::all().bits()))?;

        let mut packet = Self::empty(entity_id, base_tick);
        if mask.contains(DeltaMask::POSITION) {
            packet.position = Some(read_position(reader, precision)?);
        }
        if mask.contains(DeltaMask::ROTATION) {
            packet.rotation = Some([reader.i16()?, reader.i16()?, reader.i16()?]);
        }
        if mask.contains(DeltaMask::VELOCITY) {
            packet.velocity = Some([reader.i16()?, reader.i16()?, reader.i16()?]);
        }
        if mask.contains(DeltaMask::STATE) {
            packet.state = Some(reader.u8()?);
        }
        Ok(packet)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Packet {
    Full(FullPacket),
    Delta(DeltaPacket),
    /// Authoritative relocation. Carries a full payload; receivers snap to it.
    Teleport(FullPacket),
    Despawn(EntityId),
}

impl Packet {
    pub fn entity_id(&self) -> EntityId {
        match self {
            Packet::Full(full) | Packet::Teleport(full) => full.entity_id,
            Packet::Delta(delta) => delta.entity_id,
            Packet::Despawn(entity_id) => *entity_id,
        }
    }

    pub fn tag(&self) -> u8 {
        match self {
            Packet::Full(_) => TAG_FULL,
            Packet::Delta(_) => TAG_DELTA,
            Packet::Teleport(_) => TAG_TELEPORT,
            Packet::Despawn(_) => TAG_DESPAWN,
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self, Packet::Full(_) | Packet::Teleport(_))
    }

    pub fn write(&self, writer: &mut WireWriter, precision: PositionPrecision) {
        writer.u8(self.tag());
        writer.varint(self.entity_id().id());
        match self {
            Packet::Full(full) | Packet::Teleport(full) => full.write_payload(writer, precision),
            Packet::Delta(delta) => delta.write_payload(writer, precision),
            Packet::Despawn(_) => {}
        }
    }

    pub fn read(
        reader: &mut WireReader<'_>,
        precision: PositionPrecision,
    ) -> Result<Self, MalformedPacket> {
        let tag = reader.u8()?;
        if tag > TAG_DESPAWN {
            return Err(MalformedPacket::UnknownTag(tag));
        }
        let entity_id = EntityId(reader.varint()?);
        match tag {
            TAG_FULL => Ok(Packet::Full(FullPacket::read_payload(
                entity_id, reader, precision,
            )?)),
            TAG_DELTA => Ok(Packet::Delta(DeltaPacket::read_payload(
                entity_id, reader, precision,
            )?)),
            TAG_TELEPORT => Ok(Packet::Teleport(FullPacket::read_payload(
                entity_id, reader, precision,
            )?)),
            _ => Ok(Packet::Despawn(entity_id)),
        }
    }

    pub fn to_bytes(&self, precision: PositionPrecision) -> Vec<u8> {
        let mut writer = WireWriter::with_capacity(48);
        self.write(&mut writer, precision);
        writer.into_bytes()
    }

    /// Parses exactly one packet; trailing bytes are malformed.
    pub fn from_bytes(data: &[u8], precision: PositionPrecision) -> Result<Self, MalformedPacket> {
        let mut reader = WireReader::new(data);
        let packet = Self::read(&mut reader, precision)?;
        match reader.remaining() {
            0 => Ok(packet),
            n => Err(MalformedPacket::TrailingBytes(n)),
        }
    }
}

fn quantize_logged(entity_id: EntityId, what: &str, field: FieldSpec, value: f32) -> i32 {
    match field.quantize_strict(value) {
        Ok(q) => q,
        Err(err) => {
            log::warn!("{entity_id} {what}: {err}, clamping");
            field.quantize(value)
        }
    }
}

fn write_position(writer: &mut WireWriter, position: [i32; 3], precision: PositionPrecision) {
    match precision {
        PositionPrecision::Compact => {
            let max = precision.field().max_quantized();
            for c in position {
                writer.i16(c.clamp(-max, max) as i16);
            }
        }
        PositionPrecision::Wide => {
            for c in position {
                writer.i32(c);
            }
        }
    }
}

fn read_position(
    reader: &mut WireReader<'_>,
    precision: PositionPrecision,
) -> Result<[i32; 3], MalformedPacket> {
    match precision {
        PositionPrecision::Compact => Ok([
            reader.i16()? as i32,
            reader.i16()? as i32,
            reader.i16()? as i32,
        ]),
        PositionPrecision::Wide => Ok([reader.i32()?, reader.i32()?, reader.i32()?]),
    }
}
