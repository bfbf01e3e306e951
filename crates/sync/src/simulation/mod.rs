mod inbound;
mod shard;
mod tick;

pub use inbound::{ClientId, Inbound, InboundQueue, InboundSender, inbound_queue};
pub use shard::{OutgoingFrame, ShardStats, WorldShard};
pub use tick::FixedTimestep;
