use crate::config::SyncConfig;
use crate::delta::{Decoded, DeltaCodec, FrameClock};
use crate::error::{DecodeError, MalformedPacket};
use crate::movement::MovementModel;
use crate::net::{ClientMessage, InputVector, MoveIntent, MoveRequest, SyncFrame};
use crate::prediction::{Correction, PredictionBuffer, ReconciliationEngine};
use crate::snapshot::{EntityId, RemoteInterpolator, SnapshotStore, Transform};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub frames_received: u64,
    pub frames_malformed: u64,
    pub frames_out_of_order: u64,
    pub correction_frames: u64,
    pub stale_bases: u64,
    pub despawns: u64,
    pub inputs: u64,
}

/// What one received frame did to the session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameReport {
    pub tick: u64,
    /// Outcome for the controlled entity, when the frame carried it.
    pub correction: Option<Correction>,
    pub correction_frame: bool,
    pub decoded: usize,
    pub stale: usize,
    pub despawned: usize,
}

/// Client half of the synchronization protocol for one connection.
#[derive(Debug)]
pub struct ClientSession {
    codec: DeltaCodec,
    store: SnapshotStore,
    prediction: PredictionBuffer,
    engine: ReconciliationEngine,
    interpolator: RemoteInterpolator,
    owner: Option<EntityId>,
    latest_tick: Option<u64>,
    latest_server_ms: f64,
    outgoing: Vec<ClientMessage>,
    stats: SessionStats,
}

impl ClientSession {
    pub fn new(config: &SyncConfig) -> Self {
        let model = MovementModel::new(config.movement.clone());
        Self {
            codec: DeltaCodec::new(config.codec.clone()),
            store: SnapshotStore::new(config.store.capacity),
            prediction: PredictionBuffer::new(model, config.dt(), config.prediction.capacity)
                .snapped_to(config.codec.position_precision),
            engine: ReconciliationEngine::new(config.prediction.clone()),
            interpolator: RemoteInterpolator::new(config.interpolation.clone()),
            owner: None,
            latest_tick: None,
            latest_server_ms: 0.0,
            outgoing: Vec::new(),
            stats: SessionStats::default(),
        }
    }

    pub fn owner(&self) -> Option<EntityId> {
        self.owner
    }

    pub fn latest_tick(&self) -> Option<u64> {
        self.latest_tick
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub fn prediction(&self) -> &PredictionBuffer {
        &self.prediction
    }

    pub fn engine(&self) -> &ReconciliationEngine {
        &self.engine
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn connect(&mut self) {
        self.outgoing.push(ClientMessage::hello());
    }

    pub fn disconnect(&mut self) {
        self.outgoing.push(ClientMessage::Goodbye);
    }

    /// Predicts `input` locally and returns the request to send. The request
    /// is not queued: the caller decides how often moves go out.
    pub fn apply_input(&mut self, input: InputVector, now_ms: f64) -> MoveRequest {
        let input_seq = self.prediction.apply_input(input, now_ms);
        self.stats.inputs += 1;
        MoveRequest {
            input_seq,
            client_timestamp_ms: now_ms,
            intent: MoveIntent::Input(input),
        }
    }

    /// Parses and applies one server frame. A frame that fails to parse is
    /// dropped whole and leaves the session untouched.
    pub fn receive_frame(
        &mut self,
        bytes: &[u8],
        now_ms: f64,
    ) -> Result<FrameReport, MalformedPacket> {
        let frame = match SyncFrame::decode(bytes, self.codec.precision()) {
            Ok(frame) => frame,
            Err(err) => {
                self.stats.frames_malformed += 1;
                log::debug!("dropping malformed frame: {err}");
                return Err(err);
            }
        };
        self.stats.frames_received += 1;

        if self.owner != Some(frame.owner) {
            if let Some(previous) = self.owner {
                log::info!("now controlling {} (was {previous})", frame.owner);
            }
            self.owner = Some(frame.owner);
            self.engine.reset();
        }

        let mut report = FrameReport {
            tick: frame.server_tick,
            correction: None,
            correction_frame: frame.is_correction(),
            decoded: 0,
            stale: 0,
            despawned: 0,
        };
        if report.correction_frame {
            self.stats.correction_frames += 1;
        }

        let clock = FrameClock::of(&frame);
        let mut owned: Option<(Transform, bool)> = None;
        for packet in &frame.packets {
            match self.codec.decode(packet, &mut self.store, clock) {
                Ok(Decoded::Transform {
                    entity_id,
                    transform,
                    teleport,
                }) => {
                    report.decoded += 1;
                    if entity_id == frame.owner {
                        owned = Some((transform, teleport));
                    }
                }
                Ok(Decoded::Despawned(_)) => {
                    report.despawned += 1;
                    self.stats.despawns += 1;
                }
                Err(DecodeError::StaleBase {
                    entity_id,
                    base_tick,
                }) => {
                    report.stale += 1;
                    self.stats.stale_bases += 1;
                    log::debug!("no base for {entity_id} at tick {base_tick}, requesting resync");
                    self.outgoing.push(ClientMessage::resync(entity_id));
                }
                Err(DecodeError::Malformed(err)) => {
                    log::warn!("skipping packet for {}: {err}", packet.entity_id());
                }
            }
        }

        let newest = self.latest_tick.is_none_or(|latest| frame.server_tick > latest);
        self.outgoing.push(ClientMessage::Ack {
            tick: frame.server_tick,
        });
        if !newest {
            self.stats.frames_out_of_order += 1;
            return Ok(report);
        }
        self.latest_tick = Some(frame.server_tick);
        self.latest_server_ms = frame.server_timestamp_ms;

        if let Some((transform, teleport)) = owned {
            report.correction = Some(self.engine.on_authoritative(
                &mut self.prediction,
                &transform,
                frame.last_input_seq,
                teleport,
                now_ms,
            ));
        }
        Ok(report)
    }

    /// Advances visual smoothing by wall-clock time.
    pub fn advance(&mut self, elapsed_ms: f64) {
        self.engine.advance(elapsed_ms);
    }

    /// Predicted transform of the controlled entity plus any smoothing offset.
    pub fn rendered_transform(&self) -> Transform {
        self.engine.rendered(&self.prediction)
    }

    /// Interpolated transform of a remote entity, one render delay behind the
    /// newest server time.
    pub fn remote_transform(&self, entity_id: EntityId) -> Option<Transform> {
        self.interpolator
            .sample(&self.store, entity_id, self.latest_server_ms)
    }

    pub fn take_outgoing(&mut self) -> Vec<ClientMessage> {
        std::mem::take(&mut self.outgoing)
    }

    pub fn watchdog_expired(&self, now_ms: f64) -> bool {
        self.engine.watchdog_expired(now_ms)
    }
}
