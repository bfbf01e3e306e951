use crate::snapshot::EntityId;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CodecError {
    #[error("value {value} exceeds encodable range ±{limit}")]
    OutOfRange { value: f32, limit: f32 },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedPacket {
    #[error("unknown packet tag {0}")]
    UnknownTag(u8),
    #[error("truncated: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },
    #[error("unknown delta mask bits {0:#04x}")]
    UnknownMaskBits(u8),
    #[error("varint longer than 5 bytes")]
    VarintOverflow,
    #[error("bad frame magic {0:#010x}")]
    BadMagic(u32),
    #[error("unsupported frame version {0}")]
    UnsupportedVersion(u8),
    #[error("unknown frame flags {0:#04x}")]
    UnknownFrameFlags(u8),
    #[error("rotation has zero length")]
    DegenerateRotation,
    #[error("non-finite timestamp")]
    NonFiniteTimestamp,
    #[error("{0} trailing bytes after frame")]
    TrailingBytes(usize),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error("entity {entity_id}: no snapshot at base tick {base_tick}")]
    StaleBase { entity_id: EntityId, base_tick: u64 },
    #[error("malformed packet: {0}")]
    Malformed(#[from] MalformedPacket),
}

#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("serialization failed: {0}")]
    Serialize(rkyv::rancor::Error),
    #[error("deserialization failed: {0}")]
    Deserialize(rkyv::rancor::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}
