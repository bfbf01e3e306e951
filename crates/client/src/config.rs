use std::net::SocketAddr;
use std::time::Duration;

use tether::SyncConfig;

#[derive(Debug, Clone)]
pub struct BotConfig {
    pub server: SocketAddr,
    pub sync: SyncConfig,
    pub duration: Duration,
    /// Radius of the scripted walk in world units.
    pub radius: f32,
    pub sprint: bool,
    pub hello_interval: Duration,
    pub stats_interval: Duration,
}

impl BotConfig {
    pub fn new(server: SocketAddr, sync: SyncConfig) -> Self {
        Self {
            server,
            sync,
            duration: Duration::from_secs(30),
            radius: 5.0,
            sprint: false,
            hello_interval: Duration::from_millis(500),
            stats_interval: Duration::from_secs(1),
        }
    }
}
