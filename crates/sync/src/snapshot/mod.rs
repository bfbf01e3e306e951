mod entity;
mod interpolation;
mod store;

pub use entity::{EntityId, Snapshot, StateFlags, Transform};
pub use interpolation::{
    DEFAULT_INTERPOLATION_DELAY_MS, InterpolationConfig, RemoteInterpolator, sample_at,
};
pub use store::{DEFAULT_STORE_CAPACITY, SnapshotHistory, SnapshotStore};
