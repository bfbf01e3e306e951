use std::collections::HashMap;

use super::entity::{EntityId, Snapshot, Transform};

pub const DEFAULT_STORE_CAPACITY: usize = 120;

/// Fixed window of one entity's snapshots, one slot per `tick % capacity`.
#[derive(Debug, Clone)]
pub struct SnapshotHistory {
    slots: Vec<Option<Snapshot>>,
    latest_tick: Option<u64>,
}

impl SnapshotHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity.max(1)],
            latest_tick: None,
        }
    }

    fn capacity(&self) -> u64 {
        self.slots.len() as u64
    }

    fn index(&self, tick: u64) -> usize {
        (tick % self.capacity()) as usize
    }

    /// Returns false when `snapshot` is older than the retained window.
    pub fn push(&mut self, snapshot: Snapshot) -> bool {
        let tick = snapshot.server_tick;
        if let Some(latest) = self.latest_tick {
            if latest.saturating_sub(tick) >= self.capacity() {
                return false;
            }
        }

        let index = self.index(tick);
        self.slots[index] = Some(snapshot);
        self.latest_tick = Some(self.latest_tick.map_or(tick, |latest| latest.max(tick)));
        true
    }

    pub fn get(&self, tick: u64) -> Option<&Snapshot> {
        let latest = self.latest_tick?;
        if tick > latest || latest - tick >= self.capacity() {
            return None;
        }
        self.slots[self.index(tick)]
            .as_ref()
            .filter(|s| s.server_tick == tick)
    }

    pub fn latest(&self) -> Option<&Snapshot> {
        self.latest_tick.and_then(|tick| self.get(tick))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Snapshot> {
        let oldest = self
            .latest_tick
            .map_or(0, |latest| latest.saturating_sub(self.capacity() - 1));
        let mut snapshots: Vec<&Snapshot> = self
            .slots
            .iter()
            .filter_map(|s| s.as_ref())
            .filter(|s| s.server_tick >= oldest)
            .collect();
        snapshots.sort_by_key(|s| s.server_tick);
        snapshots.into_iter()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.latest_tick.is_none()
    }
}

/// Per-entity snapshot history. On the server this is the single source of
/// truth and is written only by the world shard after validation; on the
/// client it holds decoded state and serves as the delta base.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    capacity: usize,
    histories: HashMap<EntityId, SnapshotHistory>,
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new(DEFAULT_STORE_CAPACITY)
    }
}

impl SnapshotStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            histories: HashMap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn record(
        &mut self,
        entity_id: EntityId,
        transform: Transform,
        tick: u64,
        timestamp_ms: f64,
    ) -> bool {
        let capacity = self.capacity;
        let accepted = self
            .histories
            .entry(entity_id)
            .or_insert_with(|| SnapshotHistory::new(capacity))
            .push(Snapshot::new(entity_id, transform, tick, timestamp_ms));

        if !accepted {
            log::debug!("dropped snapshot for {entity_id} at evicted tick {tick}");
        }
        accepted
    }

    pub fn latest(&self, entity_id: EntityId) -> Option<&Snapshot> {
        self.histories.get(&entity_id)?.latest()
    }

    pub fn at(&self, entity_id: EntityId, tick: u64) -> Option<&Snapshot> {
        self.histories.get(&entity_id)?.get(tick)
    }

    pub fn forget(&mut self, entity_id: EntityId) -> bool {
        self.histories.remove(&entity_id).is_some()
    }

    pub fn history(&self, entity_id: EntityId) -> impl Iterator<Item = &Snapshot> {
        self.histories
            .get(&entity_id)
            .into_iter()
            .flat_map(|history| history.iter())
    }

    pub fn contains(&self, entity_id: EntityId) -> bool {
        self.histories.contains_key(&entity_id)
    }

    pub fn entities(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.histories.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.histories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.histories.is_empty()
    }

    pub fn clear(&mut self) {
        self.histories.clear();
    }
}
