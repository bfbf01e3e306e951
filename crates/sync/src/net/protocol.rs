use bitflags::bitflags;
use glam::Vec3;
use rkyv::util::AlignedVec;
use rkyv::{rancor, Archive, Deserialize, Serialize};

use crate::error::MessageError;
use crate::snapshot::EntityId;

pub const MAX_PACKET_SIZE: usize = 1200;
pub const PROTOCOL_VERSION: u32 = 1;
pub const FRAME_MAGIC: u32 = u32::from_le_bytes(*b"TETH");
pub const FRAME_VERSION: u8 = 1;
pub const DEFAULT_PORT: u16 = 27015;
pub const DEFAULT_TICK_RATE: u32 = 60;

const SEQUENCE_WRAP_THRESHOLD: u32 = u32::MAX / 2;

fn normalize_angle(angle: f32) -> f32 {
    let two_pi = std::f32::consts::TAU;
    let mut normalized = angle % two_pi;
    if normalized > std::f32::consts::PI {
        normalized -= two_pi;
    } else if normalized < -std::f32::consts::PI {
        normalized += two_pi;
    }
    normalized
}

#[inline]
pub fn sequence_greater_than(s1: u32, s2: u32) -> bool {
    ((s1 > s2) && (s1 - s2 <= SEQUENCE_WRAP_THRESHOLD))
        || ((s1 < s2) && (s2 - s1 > SEQUENCE_WRAP_THRESHOLD))
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct InputFlags: u8 {
        const SPRINT = 1 << 0;
        const JUMP = 1 << 1;
        const CROUCH = 1 << 2;
    }
}

/// One frame of player input, kept in its wire form so that prediction on
/// the client and simulation on the server read identical values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct InputVector {
    pub move_direction: [i8; 3],
    pub yaw: i16,
    pub flags: u8,
}

impl InputVector {
    pub fn new(direction: Vec3, yaw: f32, flags: InputFlags) -> Self {
        let mut input = Self {
            flags: flags.bits(),
            ..Default::default()
        };
        input.encode_move_direction(direction);
        input.encode_yaw(yaw);
        input
    }

    pub fn encode_move_direction(&mut self, dir: Vec3) {
        let dir = if dir.is_finite() { dir } else { Vec3::ZERO };
        self.move_direction = dir
            .to_array()
            .map(|c| (c.clamp(-1.0, 1.0) * 127.0).round() as i8);
    }

    pub fn move_direction(&self) -> Vec3 {
        Vec3::from_array(self.move_direction.map(|c| c as f32 / 127.0))
    }

    pub fn encode_yaw(&mut self, yaw: f32) {
        let yaw = if yaw.is_finite() { normalize_angle(yaw) } else { 0.0 };
        self.yaw = (yaw * 10000.0).round() as i16;
    }

    pub fn yaw(&self) -> f32 {
        self.yaw as f32 / 10000.0
    }

    pub fn input_flags(&self) -> InputFlags {
        InputFlags::from_bits_truncate(self.flags)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub enum MoveIntent {
    /// Input to be simulated by the server's movement model.
    Input(InputVector),
    /// Position the client claims to have reached.
    Target([f32; 3]),
}

#[derive(Debug, Clone, Copy, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct MoveRequest {
    pub input_seq: u32,
    pub client_timestamp_ms: f64,
    pub intent: MoveIntent,
}

#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub enum ClientMessage {
    Hello { protocol_version: u32 },
    Move(MoveRequest),
    /// Newest frame tick the client has decoded.
    Ack { tick: u64 },
    /// The client holds no usable base for this entity.
    Resync { entity_id: u32 },
    Goodbye,
}

impl ClientMessage {
    pub fn hello() -> Self {
        ClientMessage::Hello {
            protocol_version: PROTOCOL_VERSION,
        }
    }

    pub fn resync(entity_id: EntityId) -> Self {
        ClientMessage::Resync {
            entity_id: entity_id.id(),
        }
    }

    pub fn serialize(&self) -> Result<Vec<u8>, MessageError> {
        rkyv::to_bytes::<rancor::Error>(self)
            .map(|aligned| aligned.into_vec())
            .map_err(MessageError::Serialize)
    }

    /// Accepts any byte slice; datagram buffers are copied into aligned
    /// storage before validation.
    pub fn deserialize(data: &[u8]) -> Result<Self, MessageError> {
        let mut aligned = AlignedVec::<16>::with_capacity(data.len());
        aligned.extend_from_slice(data);
        rkyv::from_bytes::<Self, rancor::Error>(&aligned).map_err(MessageError::Deserialize)
    }
}
