mod frame;
mod packet;
mod protocol;
mod simulator;
mod wire;

pub use frame::{FrameFlags, SyncFrame};
pub use packet::{
    DeltaMask, DeltaPacket, FullPacket, Packet, TAG_DELTA, TAG_DESPAWN, TAG_FULL, TAG_TELEPORT,
};
pub use protocol::{
    ClientMessage, DEFAULT_PORT, DEFAULT_TICK_RATE, FRAME_MAGIC, FRAME_VERSION, InputFlags,
    InputVector, MAX_PACKET_SIZE, MoveIntent, MoveRequest, PROTOCOL_VERSION,
    sequence_greater_than,
};
pub use simulator::{LinkConditions, NetworkSimulator, SimulatorStats};
pub use wire::{WireReader, WireWriter};
