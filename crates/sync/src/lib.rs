pub mod client;
pub mod codec;
pub mod config;
pub mod delta;
pub mod error;
pub mod movement;
pub mod net;
pub mod prediction;
pub mod simulation;
pub mod snapshot;

pub use client::{ClientSession, FrameReport, SessionStats};
pub use codec::PositionPrecision;
pub use config::{StoreConfig, SyncConfig};
pub use delta::{CodecConfig, Decoded, DeltaCodec, FrameClock};
pub use error::{CodecError, ConfigError, DecodeError, MalformedPacket, MessageError};
pub use movement::{Decision, MovementConfig, MovementModel, MovementValidator, ValidatorConfig};
pub use net::{
    ClientMessage, DEFAULT_PORT, DEFAULT_TICK_RATE, InputFlags, InputVector, LinkConditions,
    MoveIntent, MoveRequest, NetworkSimulator, Packet, SyncFrame,
};
pub use prediction::{Correction, PredictionBuffer, PredictionConfig, ReconciliationEngine};
pub use simulation::{
    ClientId, FixedTimestep, Inbound, InboundQueue, InboundSender, OutgoingFrame, WorldShard,
    inbound_queue,
};
pub use snapshot::{EntityId, Snapshot, SnapshotStore, StateFlags, Transform};
