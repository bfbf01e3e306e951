use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::net::UdpSocket;
use tokio::time::MissedTickBehavior;

use tether::{ClientMessage, ClientSession, MovementModel};

use crate::config::BotConfig;
use crate::input::CircleScript;
use crate::stats::BotStats;

const MAX_DATAGRAM: usize = 2048;

/// Headless client that walks a scripted circle against a live server.
pub struct Bot {
    socket: UdpSocket,
    session: ClientSession,
    script: CircleScript,
    config: BotConfig,
    stats: BotStats,
    start: Instant,
}

impl Bot {
    pub async fn connect(config: BotConfig) -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .context("failed to bind client socket")?;
        socket
            .connect(config.server)
            .await
            .with_context(|| format!("failed to connect to {}", config.server))?;

        let model = MovementModel::new(config.sync.movement.clone());
        let script = CircleScript::new(config.radius, config.sprint, &model);

        Ok(Self {
            socket,
            session: ClientSession::new(&config.sync),
            script,
            config,
            stats: BotStats::new(),
            start: Instant::now(),
        })
    }

    fn now_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    pub async fn run(mut self) -> Result<BotStats> {
        log::info!(
            "Walking a circle of radius {:.1} around {} for {:?}",
            self.script.radius(),
            self.config.server,
            self.config.duration
        );

        let tick_period = Duration::from_secs_f64(self.config.sync.dt() as f64);
        let mut tick_interval = tokio::time::interval(tick_period);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut hello_interval = tokio::time::interval(self.config.hello_interval);
        let mut stats_interval = tokio::time::interval(self.config.stats_interval);
        stats_interval.tick().await;

        let deadline = tokio::time::sleep(self.config.duration);
        tokio::pin!(deadline);

        let mut buf = [0u8; MAX_DATAGRAM];
        let mut last_tick = Instant::now();
        let mut walking_since: Option<Instant> = None;

        loop {
            tokio::select! {
                _ = &mut deadline => break,
                received = self.socket.recv(&mut buf) => {
                    match received {
                        Ok(len) => self.handle_datagram(&buf[..len]),
                        Err(e) => log::warn!("Receive error: {}", e),
                    }
                }
                _ = hello_interval.tick() => {
                    let now = self.now_ms();
                    if self.session.owner().is_none() {
                        self.session.connect();
                    } else if self.session.watchdog_expired(now) {
                        log::warn!("No authoritative state for too long, reconnecting");
                        self.session.connect();
                    }
                }
                _ = tick_interval.tick() => {
                    let elapsed = last_tick.elapsed();
                    last_tick = Instant::now();

                    if self.session.owner().is_some() {
                        let since = *walking_since.get_or_insert_with(Instant::now);
                        let input = self
                            .script
                            .input_at(since.elapsed().as_secs_f32())
                            .to_input();
                        let request = self.session.apply_input(input, self.now_ms());
                        self.send(&ClientMessage::Move(request)).await;
                    }
                    self.session.advance(elapsed.as_secs_f64() * 1000.0);
                }
                _ = stats_interval.tick() => {
                    self.stats.log("Reconciliation");
                }
            }

            self.flush().await;
        }

        self.session.disconnect();
        self.flush().await;

        let session = self.session.stats();
        log::info!(
            "Session: {} inputs ({} dropped unacknowledged), {} frames, {} out of order, {} despawns",
            session.inputs,
            self.session.prediction().dropped(),
            session.frames_received,
            session.frames_out_of_order,
            session.despawns
        );
        self.stats.log("Final");
        Ok(self.stats)
    }

    fn handle_datagram(&mut self, bytes: &[u8]) {
        let now = self.now_ms();
        match self.session.receive_frame(bytes, now) {
            Ok(report) => self.stats.record_frame(Instant::now(), &report),
            Err(e) => {
                log::debug!("Dropping frame: {}", e);
                self.stats.record_malformed();
            }
        }
    }

    async fn flush(&mut self) {
        for message in self.session.take_outgoing() {
            self.send(&message).await;
        }
    }

    async fn send(&self, message: &ClientMessage) {
        match message.serialize() {
            Ok(bytes) => {
                if let Err(e) = self.socket.send(&bytes).await {
                    log::warn!("Send error: {}", e);
                }
            }
            Err(e) => log::error!("Failed to serialize message: {}", e),
        }
    }
}
