use serde::Deserialize;

use super::entity::{EntityId, Snapshot, Transform};
use super::store::SnapshotStore;

pub const DEFAULT_INTERPOLATION_DELAY_MS: f64 = 100.0;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InterpolationConfig {
    pub delay_ms: f64,
}

impl Default for InterpolationConfig {
    fn default() -> Self {
        Self {
            delay_ms: DEFAULT_INTERPOLATION_DELAY_MS,
        }
    }
}

/// Renders remote entities a fixed delay behind the newest server time, so
/// there are usually two snapshots to blend between. Remote entities are never
/// predicted or reconciled.
#[derive(Debug, Clone)]
pub struct RemoteInterpolator {
    config: InterpolationConfig,
}

impl Default for RemoteInterpolator {
    fn default() -> Self {
        Self::new(InterpolationConfig::default())
    }
}

impl RemoteInterpolator {
    pub fn new(config: InterpolationConfig) -> Self {
        Self { config }
    }

    pub fn render_time(&self, latest_server_ms: f64) -> f64 {
        latest_server_ms - self.config.delay_ms
    }

    pub fn sample(
        &self,
        store: &SnapshotStore,
        entity_id: EntityId,
        latest_server_ms: f64,
    ) -> Option<Transform> {
        sample_at(store, entity_id, self.render_time(latest_server_ms))
    }
}

pub fn sample_at(store: &SnapshotStore, entity_id: EntityId, render_time_ms: f64) -> Option<Transform> {
    let mut before: Option<&Snapshot> = None;
    let mut after: Option<&Snapshot> = None;

    for snapshot in store.history(entity_id) {
        if snapshot.server_timestamp_ms <= render_time_ms {
            before = Some(snapshot);
        } else {
            after = Some(snapshot);
            break;
        }
    }

    match (before, after) {
        (Some(a), Some(b)) => {
            let span = b.server_timestamp_ms - a.server_timestamp_ms;
            let t = if span > 0.0 {
                ((render_time_ms - a.server_timestamp_ms) / span).clamp(0.0, 1.0) as f32
            } else {
                1.0
            };
            Some(blend(&a.transform, &b.transform, t))
        }
        (Some(only), None) | (None, Some(only)) => Some(only.transform),
        (None, None) => None,
    }
}

fn blend(a: &Transform, b: &Transform, t: f32) -> Transform {
    Transform {
        position: a.position.lerp(b.position, t),
        rotation: a.rotation.slerp(b.rotation, t),
        velocity: a.velocity.lerp(b.velocity, t),
        discrete_state: if t < 1.0 { a.discrete_state } else { b.discrete_state },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Quat, Vec3};

    const ID: EntityId = EntityId(3);

    fn store_with(points: &[(u64, f64, f32)]) -> SnapshotStore {
        let mut store = SnapshotStore::new(32);
        for &(tick, time, x) in points {
            store.record(ID, Transform::at(Vec3::new(x, 0.0, 0.0)), tick, time);
        }
        store
    }

    #[test]
    fn blends_between_bracketing_snapshots() {
        let store = store_with(&[(1, 0.0, 0.0), (2, 50.0, 1.0), (3, 100.0, 3.0)]);

        let mid = sample_at(&store, ID, 75.0).unwrap();
        assert!((mid.position.x - 2.0).abs() < 1e-5);
    }

    #[test]
    fn holds_ends_without_extrapolating() {
        let store = store_with(&[(1, 0.0, 0.0), (2, 50.0, 1.0)]);

        assert_eq!(sample_at(&store, ID, -20.0).unwrap().position.x, 0.0);
        assert_eq!(sample_at(&store, ID, 500.0).unwrap().position.x, 1.0);
        assert!(sample_at(&store, EntityId(99), 0.0).is_none());
    }

    #[test]
    fn rotation_uses_slerp() {
        let mut store = SnapshotStore::new(8);
        let mut a = Transform::default();
        let mut b = Transform::default();
        a.rotation = Quat::from_rotation_y(0.0);
        b.rotation = Quat::from_rotation_y(1.0);
        store.record(ID, a, 1, 0.0);
        store.record(ID, b, 2, 100.0);

        let mid = sample_at(&store, ID, 50.0).unwrap();
        let expected = Quat::from_rotation_y(0.5);
        assert!(crate::codec::angle_between(mid.rotation, expected) < 1e-3);
    }

    #[test]
    fn interpolator_applies_delay() {
        let store = store_with(&[(1, 0.0, 0.0), (2, 100.0, 10.0)]);
        let interpolator = RemoteInterpolator::default();

        let sampled = interpolator.sample(&store, ID, 150.0).unwrap();
        assert!((sampled.position.x - 5.0).abs() < 1e-4);
    }
}
