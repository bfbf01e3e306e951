use std::collections::{BTreeMap, HashSet};

use glam::Vec3;

use crate::config::SyncConfig;
use crate::delta::{DeltaCodec, FrameClock};
use crate::movement::{Decision, MovementModel, MovementValidator};
use crate::net::{
    ClientMessage, FrameFlags, MoveIntent, MoveRequest, PROTOCOL_VERSION, Packet, SyncFrame,
    sequence_greater_than,
};
use crate::snapshot::{EntityId, SnapshotStore, StateFlags, Transform};

use super::inbound::{ClientId, Inbound, InboundQueue};

/// One encoded frame for one client.
#[derive(Debug, Clone)]
pub struct OutgoingFrame {
    pub client_id: ClientId,
    pub tick: u64,
    pub correction: bool,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShardStats {
    pub ticks: u64,
    pub frames_sent: u64,
    pub bytes_sent: u64,
    pub full_packets: u64,
    pub delta_packets: u64,
    pub teleport_packets: u64,
    pub despawn_packets: u64,
    pub corrections: u64,
    pub stale_moves: u64,
}

/// What the shard knows about one connected client.
#[derive(Debug)]
struct Observer {
    entity_id: EntityId,
    /// Exactly what this client has been sent, decoded the way it decodes.
    mirror: SnapshotStore,
    acked_tick: Option<u64>,
    last_input_seq: u32,
    pending_moves: Vec<MoveRequest>,
    correction_pending: bool,
    resync: HashSet<EntityId>,
    /// Entity and the first tick whose frame carries its despawn.
    despawns: Vec<(EntityId, u64)>,
}

impl Observer {
    fn new(entity_id: EntityId, capacity: usize) -> Self {
        Self {
            entity_id,
            mirror: SnapshotStore::new(capacity),
            acked_tick: None,
            last_input_seq: 0,
            pending_moves: Vec::new(),
            correction_pending: false,
            resync: HashSet::new(),
            despawns: Vec::new(),
        }
    }
}

/// Authoritative simulation of one world shard. Single-threaded: I/O tasks
/// only reach it through the inbound queue, drained once per tick, and the
/// validator is the only path from a client request to the snapshot store.
#[derive(Debug)]
pub struct WorldShard {
    config: SyncConfig,
    model: MovementModel,
    validator: MovementValidator,
    codec: DeltaCodec,
    store: SnapshotStore,
    inbound: InboundQueue,
    entities: BTreeMap<EntityId, Transform>,
    observers: BTreeMap<ClientId, Observer>,
    teleported: HashSet<EntityId>,
    next_entity_id: u32,
    tick: u64,
    stats: ShardStats,
}

impl WorldShard {
    pub fn new(config: SyncConfig, inbound: InboundQueue) -> Self {
        Self {
            model: MovementModel::new(config.movement.clone()),
            validator: MovementValidator::new(config.validator.clone()),
            codec: DeltaCodec::new(config.codec.clone()),
            store: SnapshotStore::new(config.store.capacity),
            inbound,
            entities: BTreeMap::new(),
            observers: BTreeMap::new(),
            teleported: HashSet::new(),
            next_entity_id: 1,
            tick: 0,
            stats: ShardStats::default(),
            config,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    pub fn stats(&self) -> ShardStats {
        self.stats
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub fn validator(&self) -> &MovementValidator {
        &self.validator
    }

    pub fn transform(&self, entity_id: EntityId) -> Option<&Transform> {
        self.entities.get(&entity_id)
    }

    pub fn entity_of(&self, client_id: ClientId) -> Option<EntityId> {
        self.observers.get(&client_id).map(|o| o.entity_id)
    }

    pub fn client_count(&self) -> usize {
        self.observers.len()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Adds a server-driven entity.
    pub fn spawn(&mut self, position: Vec3) -> EntityId {
        let entity_id = EntityId(self.next_entity_id);
        self.next_entity_id += 1;
        let transform = Transform::at(position).snapped(self.codec.precision());
        self.entities.insert(entity_id, transform);
        entity_id
    }

    /// Moves a server-driven entity one tick's worth. Observers receive
    /// ordinary deltas.
    pub fn move_to(&mut self, entity_id: EntityId, position: Vec3) -> bool {
        let dt = self.config.dt();
        let precision = self.codec.precision();
        let Some(transform) = self.entities.get_mut(&entity_id) else {
            return false;
        };
        *transform = target_transform(transform, position, dt).snapped(precision);
        true
    }

    pub fn despawn(&mut self, entity_id: EntityId) -> bool {
        if self.entities.remove(&entity_id).is_none() {
            return false;
        }
        self.store.forget(entity_id);
        self.validator.forget(entity_id);
        self.teleported.remove(&entity_id);
        let first_tick = self.tick + 1;
        for observer in self.observers.values_mut() {
            observer.despawns.push((entity_id, first_tick));
        }
        true
    }

    /// Authoritative relocation. Observers receive a teleport packet and the
    /// validator measures the next move from `position`.
    pub fn teleport(&mut self, entity_id: EntityId, position: Vec3, now_ms: f64) -> bool {
        let precision = self.codec.precision();
        let Some(transform) = self.entities.get_mut(&entity_id) else {
            return false;
        };
        transform.position = position;
        transform.velocity = Vec3::ZERO;
        *transform = transform.snapped(precision);
        self.teleported.insert(entity_id);

        if self.validator.last_accepted_position(entity_id).is_some() {
            self.validator
                .rebaseline(entity_id, transform.position, now_ms);
        }
        log::debug!("teleported {entity_id} to {position:?}");
        true
    }

    pub fn connect(&mut self, client_id: ClientId, spawn: Vec3, now_ms: f64) -> EntityId {
        if let Some(entity_id) = self.entity_of(client_id) {
            self.reconnect(client_id, now_ms);
            return entity_id;
        }

        let entity_id = self.spawn(spawn);
        let position = self.entities.get(&entity_id).map_or(spawn, |t| t.position);
        self.validator.register(entity_id, position, now_ms);
        self.observers
            .insert(client_id, Observer::new(entity_id, self.config.store.capacity));
        log::info!("client {client_id} connected, controlling {entity_id}");
        entity_id
    }

    /// Restarts a known client's session: full state on the next frame and
    /// a fresh validator baseline so the gap is not mistaken for a teleport.
    pub fn reconnect(&mut self, client_id: ClientId, now_ms: f64) -> bool {
        let Some(observer) = self.observers.get_mut(&client_id) else {
            return false;
        };
        if let Some(transform) = self.entities.get(&observer.entity_id) {
            self.validator
                .rebaseline(observer.entity_id, transform.position, now_ms);
        }
        observer.mirror.clear();
        observer.acked_tick = None;
        observer.last_input_seq = 0;
        observer.pending_moves.clear();
        observer.correction_pending = false;
        observer.resync.clear();
        log::info!("client {client_id} reconnected");
        true
    }

    pub fn disconnect(&mut self, client_id: ClientId) -> bool {
        let Some(observer) = self.observers.remove(&client_id) else {
            return false;
        };
        self.despawn(observer.entity_id);
        log::info!("client {client_id} disconnected");
        true
    }

    fn handle(&mut self, inbound: Inbound, now_ms: f64) {
        match inbound {
            Inbound::Connect { client_id, spawn } => {
                self.connect(client_id, spawn, now_ms);
            }
            Inbound::Disconnect { client_id } => {
                self.disconnect(client_id);
            }
            Inbound::Message { client_id, message } => {
                self.handle_message(client_id, message, now_ms)
            }
        }
    }

    fn handle_message(&mut self, client_id: ClientId, message: ClientMessage, now_ms: f64) {
        if let ClientMessage::Goodbye = message {
            self.disconnect(client_id);
            return;
        }
        if let ClientMessage::Hello { protocol_version } = message {
            if protocol_version != PROTOCOL_VERSION {
                log::warn!("client {client_id} speaks protocol {protocol_version}");
            }
            self.reconnect(client_id, now_ms);
            return;
        }

        let tick = self.tick;
        let Some(observer) = self.observers.get_mut(&client_id) else {
            log::debug!("message from unknown client {client_id}");
            return;
        };
        match message {
            ClientMessage::Move(request) => observer.pending_moves.push(request),
            ClientMessage::Ack { tick: acked } if acked <= tick => {
                let acked = observer.acked_tick.map_or(acked, |t| t.max(acked));
                observer.acked_tick = Some(acked);
                observer.despawns.retain(|&(_, first)| first > acked);
            }
            ClientMessage::Ack { tick: acked } => {
                log::debug!("client {client_id} acked future tick {acked}");
            }
            ClientMessage::Resync { entity_id } => {
                observer.resync.insert(EntityId(entity_id));
            }
            ClientMessage::Hello { .. } | ClientMessage::Goodbye => {}
        }
    }

    /// Runs one simulation tick and returns a frame for every client.
    pub fn tick(&mut self, now_ms: f64) -> Vec<OutgoingFrame> {
        for inbound in self.inbound.drain() {
            self.handle(inbound, now_ms);
        }

        self.tick += 1;
        self.stats.ticks += 1;

        self.process_moves(now_ms);
        self.record_snapshots(now_ms);
        self.build_frames(now_ms)
    }

    fn process_moves(&mut self, now_ms: f64) {
        let dt = self.config.dt();
        let precision = self.codec.precision();

        for (client_id, observer) in self.observers.iter_mut() {
            if observer.pending_moves.is_empty() {
                continue;
            }
            let entity_id = observer.entity_id;
            let mut moves = std::mem::take(&mut observer.pending_moves);
            let base_seq = observer.last_input_seq;
            moves.sort_by_key(|m| m.input_seq.wrapping_sub(base_seq));

            for request in moves {
                if observer.last_input_seq != 0
                    && !sequence_greater_than(request.input_seq, observer.last_input_seq)
                {
                    self.stats.stale_moves += 1;
                    continue;
                }
                let Some(current) = self.entities.get_mut(&entity_id) else {
                    break;
                };

                let requested = match request.intent {
                    MoveIntent::Input(input) => self.model.step(current, &input, dt),
                    MoveIntent::Target(target) => {
                        target_transform(current, Vec3::from_array(target), dt)
                    }
                };

                match self.validator.validate(
                    entity_id,
                    &requested,
                    request.client_timestamp_ms,
                    now_ms,
                ) {
                    Decision::Accept => *current = requested.snapped(precision),
                    Decision::Clamp(clamped) => {
                        *current = clamped.snapped(precision);
                        observer.correction_pending = true;
                    }
                    Decision::Reject(_) => observer.correction_pending = true,
                }
                observer.last_input_seq = request.input_seq;
            }

            if observer.correction_pending {
                self.stats.corrections += 1;
                log::debug!(
                    "client {client_id}: correcting {entity_id} at seq {}",
                    observer.last_input_seq
                );
            }
        }
    }

    fn record_snapshots(&mut self, now_ms: f64) {
        let tick = self.tick;
        for (&entity_id, transform) in self.entities.iter_mut() {
            let mut recorded = *transform;
            if self.teleported.remove(&entity_id) {
                recorded.set_flags(recorded.flags() | StateFlags::TELEPORTED);
            }
            self.store.record(entity_id, recorded, tick, now_ms);
            transform.set_flags(transform.flags() - StateFlags::TELEPORTED);
        }
    }

    fn build_frames(&mut self, now_ms: f64) -> Vec<OutgoingFrame> {
        let tick = self.tick;
        let clock = FrameClock::new(tick, now_ms);
        let precision = self.codec.precision();
        let mut frames = Vec::with_capacity(self.observers.len());

        for (&client_id, observer) in self.observers.iter_mut() {
            let mut frame = SyncFrame::new(tick, now_ms, observer.entity_id);
            frame.last_input_seq = observer.last_input_seq;
            if observer.correction_pending {
                frame.flags |= FrameFlags::CORRECTION;
            }

            for &entity_id in self.entities.keys() {
                let Some(curr) = self.store.at(entity_id, tick) else {
                    continue;
                };
                let forced = observer.resync.contains(&entity_id)
                    || (observer.correction_pending && entity_id == observer.entity_id);
                let base = if forced {
                    None
                } else {
                    observer
                        .acked_tick
                        .and_then(|acked| observer.mirror.at(entity_id, acked))
                        .copied()
                };

                let packet = self.codec.encode(base.as_ref(), curr);
                match packet {
                    Packet::Full(_) => self.stats.full_packets += 1,
                    Packet::Delta(_) => self.stats.delta_packets += 1,
                    Packet::Teleport(_) => self.stats.teleport_packets += 1,
                    Packet::Despawn(_) => self.stats.despawn_packets += 1,
                }
                if let Err(err) = self.codec.decode(&packet, &mut observer.mirror, clock) {
                    log::warn!("client {client_id}: mirror rejected packet for {entity_id}: {err}");
                }
                frame.packets.push(packet);
            }

            for &(entity_id, _) in &observer.despawns {
                observer.mirror.forget(entity_id);
                frame.packets.push(Packet::Despawn(entity_id));
                self.stats.despawn_packets += 1;
            }

            observer.resync.clear();
            observer.correction_pending = false;

            let bytes = frame.encode(precision);
            self.stats.frames_sent += 1;
            self.stats.bytes_sent += bytes.len() as u64;
            frames.push(OutgoingFrame {
                client_id,
                tick,
                correction: frame.is_correction(),
                bytes,
            });
        }
        frames
    }
}

fn target_transform(current: &Transform, target: Vec3, dt: f32) -> Transform {
    let mut next = *current;
    next.velocity = (target - current.position) / dt;
    next.position = target;
    let mut flags = current.flags() - StateFlags::TELEPORTED;
    flags.set(StateFlags::MOVING, next.velocity.length_squared() > 0.0);
    next.set_flags(flags);
    next
}
