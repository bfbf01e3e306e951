use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use tether::net::{MAX_PACKET_SIZE, PROTOCOL_VERSION};
use tether::simulation::ShardStats;
use tether::{
    ClientMessage, FixedTimestep, Inbound, InboundSender, NetworkSimulator, WorldShard,
    inbound_queue,
};

use crate::config::ServerConfig;
use crate::connections::ConnectionManager;
use crate::events::{DisconnectReason, ServerEvent};

const RECV_BUFFER_SIZE: usize = MAX_PACKET_SIZE * 2;

type SharedConnections = Arc<Mutex<ConnectionManager>>;

fn lock(connections: &SharedConnections) -> MutexGuard<'_, ConnectionManager> {
    connections.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct GameServer {
    socket: Arc<UdpSocket>,
    config: ServerConfig,
    shard: WorldShard,
    inbound: InboundSender,
    connections: SharedConnections,
    events_tx: mpsc::UnboundedSender<ServerEvent>,
    events_rx: mpsc::UnboundedReceiver<ServerEvent>,
    outbound: Option<NetworkSimulator<(SocketAddr, Vec<u8>)>>,
    timestep: FixedTimestep,
    start_time: Instant,
    stats: ServerStats,
}

impl GameServer {
    pub async fn bind(bind_addr: &str, config: ServerConfig) -> io::Result<Self> {
        let socket = UdpSocket::bind(bind_addr).await?;
        let (inbound, queue) = inbound_queue();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let outbound = config
            .outbound_link
            .clone()
            .map(|link| NetworkSimulator::new(link, config.link_seed));
        if let Some(link) = &config.outbound_link {
            log::info!(
                "Simulating outbound link: {}% loss, {}-{} ms latency, {} ms jitter",
                link.loss_percent,
                link.min_latency_ms,
                link.max_latency_ms,
                link.jitter_ms
            );
        }

        Ok(Self {
            socket: Arc::new(socket),
            shard: WorldShard::new(config.sync.clone(), queue),
            inbound,
            connections: Arc::new(Mutex::new(ConnectionManager::new(
                config.max_clients,
                config.client_timeout,
            ))),
            events_tx,
            events_rx,
            outbound,
            timestep: FixedTimestep::new(config.sync.tick_rate),
            start_time: Instant::now(),
            stats: ServerStats::default(),
            config,
        })
    }

    pub fn tick_rate(&self) -> u32 {
        self.timestep.tick_rate()
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Runs until Ctrl-C.
    pub async fn run(mut self) -> io::Result<()> {
        let receiver = tokio::spawn(receive_loop(
            Arc::clone(&self.socket),
            Arc::clone(&self.connections),
            self.inbound.clone(),
            self.events_tx.clone(),
            self.config.clone(),
        ));

        let tick_duration = Duration::from_secs_f64(self.timestep.tick_ms() / 1000.0);
        let mut ticker = tokio::time::interval(tick_duration);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut stats_ticker = tokio::time::interval(self.config.stats_interval);

        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        let mut last_tick_time = Instant::now();
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let now = Instant::now();
                    self.timestep
                        .accumulate(now.duration_since(last_tick_time).as_secs_f64() * 1000.0);
                    last_tick_time = now;

                    while self.timestep.consume_tick() {
                        self.tick().await;
                    }
                    self.flush_outbound().await;
                    self.drain_events();
                }
                _ = stats_ticker.tick() => self.log_stats(),
                result = &mut shutdown => {
                    if let Err(e) = result {
                        log::error!("Failed to listen for shutdown signal: {}", e);
                    }
                    break;
                }
            }
        }

        receiver.abort();
        self.log_stats();
        Ok(())
    }

    fn now_ms(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64() * 1000.0
    }

    async fn tick(&mut self) {
        let timed_out = lock(&self.connections).cleanup_timed_out(Instant::now());
        for client_id in timed_out {
            self.shard.disconnect(client_id);
            self.record(ServerEvent::ClientDisconnected {
                client_id,
                reason: DisconnectReason::Timeout,
            });
        }

        let now_ms = self.now_ms();
        let frames = self.shard.tick(now_ms);
        for frame in frames {
            let Some(addr) = lock(&self.connections).addr_of(frame.client_id) else {
                continue;
            };
            if frame.correction {
                self.stats.corrections_sent += 1;
            }
            if let Some(link) = self.outbound.as_mut() {
                link.send((addr, frame.bytes), now_ms);
                continue;
            }
            self.send_to(&frame.bytes, addr).await;
        }
    }

    async fn flush_outbound(&mut self) {
        let now_ms = self.now_ms();
        let due = match &mut self.outbound {
            Some(link) => link.deliver(now_ms),
            None => return,
        };
        for (addr, bytes) in due {
            self.send_to(&bytes, addr).await;
        }
    }

    async fn send_to(&mut self, bytes: &[u8], addr: SocketAddr) {
        match self.socket.send_to(bytes, addr).await {
            Ok(_) => {
                self.stats.datagrams_sent += 1;
                self.stats.bytes_sent += bytes.len() as u64;
            }
            Err(e) => self.record(ServerEvent::Error {
                message: format!("Failed to send frame to {}: {}", addr, e),
            }),
        }
    }

    fn drain_events(&mut self) {
        while let Ok(event) = self.events_rx.try_recv() {
            self.record(event);
        }
    }

    fn record(&mut self, event: ServerEvent) {
        match &event {
            ServerEvent::ClientConnected { .. } => self.stats.connects += 1,
            ServerEvent::ClientDisconnected { .. } => self.stats.disconnects += 1,
            ServerEvent::ConnectionDenied { .. } => self.stats.denied += 1,
            ServerEvent::Error { .. } => {}
        }
        event.log();
    }

    pub fn stats(&self) -> ServerStats {
        ServerStats {
            tick: self.shard.current_tick(),
            client_count: lock(&self.connections).len(),
            entity_count: self.shard.entity_count(),
            shard: self.shard.stats(),
            ..self.stats
        }
    }

    fn log_stats(&self) {
        let stats = self.stats();
        let rejected = self.shard.validator().stats();
        log::info!(
            "tick {} | {}/{} clients | {} entities | {} frames, {} bytes sent | {} full, {} delta | {} corrections ({} clamped, {} rejected)",
            stats.tick,
            stats.client_count,
            self.config.max_clients,
            stats.entity_count,
            stats.datagrams_sent,
            stats.bytes_sent,
            stats.shard.full_packets,
            stats.shard.delta_packets,
            stats.corrections_sent,
            rejected.clamped,
            rejected.rejected
        );
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ServerStats {
    pub tick: u64,
    pub client_count: usize,
    pub entity_count: usize,
    pub shard: ShardStats,
    pub datagrams_sent: u64,
    pub bytes_sent: u64,
    pub corrections_sent: u64,
    pub connects: u64,
    pub disconnects: u64,
    pub denied: u64,
}

async fn receive_loop(
    socket: Arc<UdpSocket>,
    connections: SharedConnections,
    inbound: InboundSender,
    events: mpsc::UnboundedSender<ServerEvent>,
    config: ServerConfig,
) {
    let mut buf = vec![0u8; RECV_BUFFER_SIZE];
    loop {
        let (len, addr) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                let _ = events.send(ServerEvent::Error {
                    message: format!("Receive error: {}", e),
                });
                continue;
            }
        };

        let message = match ClientMessage::deserialize(&buf[..len]) {
            Ok(message) => message,
            Err(e) => {
                log::debug!("Dropping undecodable datagram from {}: {}", addr, e);
                continue;
            }
        };

        let routed = route(&mut lock(&connections), &config, addr, message, Instant::now());
        if let Some(event) = routed.event {
            let _ = events.send(event);
        }
        if let Some(item) = routed.inbound {
            if !inbound.send(item) {
                break;
            }
        }
    }
}

#[derive(Debug, Default)]
struct Routed {
    inbound: Option<Inbound>,
    event: Option<ServerEvent>,
}

/// Maps one datagram from `addr` onto the shard's inbound queue.
fn route(
    connections: &mut ConnectionManager,
    config: &ServerConfig,
    addr: SocketAddr,
    message: ClientMessage,
    now: Instant,
) -> Routed {
    match message {
        ClientMessage::Hello { protocol_version } if protocol_version != PROTOCOL_VERSION => {
            Routed {
                inbound: None,
                event: Some(ServerEvent::ConnectionDenied {
                    addr,
                    reason: "unsupported protocol version",
                }),
            }
        }
        ClientMessage::Hello { .. } => match connections.accept(addr, now) {
            Ok((client_id, true)) => Routed {
                inbound: Some(Inbound::Connect {
                    client_id,
                    spawn: config.spawn_for(client_id),
                }),
                event: Some(ServerEvent::ClientConnected { client_id, addr }),
            },
            Ok((client_id, false)) => Routed {
                inbound: Some(Inbound::Message { client_id, message }),
                event: None,
            },
            Err(reason) => Routed {
                inbound: None,
                event: Some(ServerEvent::ConnectionDenied {
                    addr,
                    reason: reason.as_str(),
                }),
            },
        },
        ClientMessage::Goodbye => match connections.remove_by_addr(&addr) {
            Some(connection) => {
                log::debug!(
                    "Client {} leaving after {:?} and {} messages",
                    connection.client_id,
                    now.saturating_duration_since(connection.connected_at),
                    connection.messages_received
                );
                Routed {
                    inbound: Some(Inbound::Disconnect {
                        client_id: connection.client_id,
                    }),
                    event: Some(ServerEvent::ClientDisconnected {
                        client_id: connection.client_id,
                        reason: DisconnectReason::Graceful,
                    }),
                }
            }
            None => Routed::default(),
        },
        message => match connections.touch(addr, now) {
            Some(client_id) => Routed {
                inbound: Some(Inbound::Message { client_id, message }),
                event: None,
            },
            None => {
                log::debug!("Ignoring message from unknown address {}", addr);
                Routed::default()
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 5000))
    }

    fn manager() -> ConnectionManager {
        ConnectionManager::new(2, Duration::from_secs(5))
    }

    #[test]
    fn hello_connects_then_reconnects() {
        let config = ServerConfig::default();
        let mut connections = manager();
        let now = Instant::now();

        let first = route(&mut connections, &config, addr(), ClientMessage::hello(), now);
        assert!(matches!(first.inbound, Some(Inbound::Connect { client_id: 1, .. })));
        assert!(matches!(first.event, Some(ServerEvent::ClientConnected { client_id: 1, .. })));

        let again = route(&mut connections, &config, addr(), ClientMessage::hello(), now);
        assert!(matches!(
            again.inbound,
            Some(Inbound::Message {
                client_id: 1,
                message: ClientMessage::Hello { .. }
            })
        ));
        assert!(again.event.is_none());
    }

    #[test]
    fn unknown_senders_and_old_protocols_are_ignored() {
        let config = ServerConfig::default();
        let mut connections = manager();
        let now = Instant::now();

        let ack = route(&mut connections, &config, addr(), ClientMessage::Ack { tick: 4 }, now);
        assert!(ack.inbound.is_none());

        let old = ClientMessage::Hello {
            protocol_version: PROTOCOL_VERSION + 1,
        };
        let denied = route(&mut connections, &config, addr(), old, now);
        assert!(denied.inbound.is_none());
        assert!(matches!(denied.event, Some(ServerEvent::ConnectionDenied { .. })));
        assert!(connections.is_empty());
    }

    #[test]
    fn goodbye_releases_the_address() {
        let config = ServerConfig::default();
        let mut connections = manager();
        let now = Instant::now();
        route(&mut connections, &config, addr(), ClientMessage::hello(), now);

        let bye = route(&mut connections, &config, addr(), ClientMessage::Goodbye, now);
        assert!(matches!(bye.inbound, Some(Inbound::Disconnect { client_id: 1 })));
        assert!(connections.is_empty());
    }
}
