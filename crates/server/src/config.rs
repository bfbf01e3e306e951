use std::time::Duration;

use glam::Vec3;
use tether::{ClientId, LinkConditions, SyncConfig};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub sync: SyncConfig,
    pub max_clients: usize,
    pub client_timeout: Duration,
    pub spawn_point: Vec3,
    pub spawn_spacing: f32,
    /// Impairs every outgoing frame when set.
    pub outbound_link: Option<LinkConditions>,
    pub link_seed: u64,
    pub stats_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            sync: SyncConfig::default(),
            max_clients: 32,
            client_timeout: Duration::from_secs(10),
            spawn_point: Vec3::ZERO,
            spawn_spacing: 2.0,
            outbound_link: None,
            link_seed: 1,
            stats_interval: Duration::from_secs(5),
        }
    }
}

impl ServerConfig {
    /// Lays clients out on an 8-wide grid around the spawn point.
    pub fn spawn_for(&self, client_id: ClientId) -> Vec3 {
        let slot = client_id.saturating_sub(1);
        let column = (slot % 8) as f32;
        let row = (slot / 8 % 8) as f32;
        self.spawn_point + Vec3::new(column, 0.0, row) * self.spawn_spacing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_slots_do_not_overlap() {
        let config = ServerConfig::default();
        assert_eq!(config.spawn_for(1), Vec3::ZERO);
        assert_eq!(config.spawn_for(2), Vec3::new(2.0, 0.0, 0.0));
        assert_eq!(config.spawn_for(9), Vec3::new(0.0, 0.0, 2.0));
    }
}
