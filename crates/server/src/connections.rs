use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tether::ClientId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptError {
    ServerFull,
}

impl AcceptError {
    pub fn as_str(&self) -> &'static str {
        match self {
            AcceptError::ServerFull => "server full",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConnection {
    pub addr: SocketAddr,
    pub client_id: ClientId,
    pub connected_at: Instant,
    pub last_receive_time: Instant,
    pub messages_received: u64,
}

impl ClientConnection {
    fn new(addr: SocketAddr, client_id: ClientId, now: Instant) -> Self {
        Self {
            addr,
            client_id,
            connected_at: now,
            last_receive_time: now,
            messages_received: 0,
        }
    }

    pub fn is_timed_out(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_receive_time) > timeout
    }
}

/// Address to client id mapping shared by the receive task and the tick loop.
#[derive(Debug)]
pub struct ConnectionManager {
    clients_by_addr: HashMap<SocketAddr, ClientId>,
    clients: HashMap<ClientId, ClientConnection>,
    next_client_id: ClientId,
    max_clients: usize,
    timeout: Duration,
}

impl ConnectionManager {
    pub fn new(max_clients: usize, timeout: Duration) -> Self {
        Self {
            clients_by_addr: HashMap::new(),
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
            timeout,
        }
    }

    /// Returns the id for `addr` and whether it was newly assigned.
    pub fn accept(&mut self, addr: SocketAddr, now: Instant) -> Result<(ClientId, bool), AcceptError> {
        if let Some(&client_id) = self.clients_by_addr.get(&addr) {
            self.touch(addr, now);
            return Ok((client_id, false));
        }
        if self.clients.len() >= self.max_clients {
            return Err(AcceptError::ServerFull);
        }

        let client_id = self.next_client_id;
        self.next_client_id = self.next_client_id.wrapping_add(1).max(1);
        self.clients
            .insert(client_id, ClientConnection::new(addr, client_id, now));
        self.clients_by_addr.insert(addr, client_id);
        Ok((client_id, true))
    }

    pub fn client_id(&self, addr: &SocketAddr) -> Option<ClientId> {
        self.clients_by_addr.get(addr).copied()
    }

    pub fn get(&self, client_id: ClientId) -> Option<&ClientConnection> {
        self.clients.get(&client_id)
    }

    pub fn addr_of(&self, client_id: ClientId) -> Option<SocketAddr> {
        self.clients.get(&client_id).map(|c| c.addr)
    }

    /// Records traffic from `addr`. Returns its id when known.
    pub fn touch(&mut self, addr: SocketAddr, now: Instant) -> Option<ClientId> {
        let client_id = *self.clients_by_addr.get(&addr)?;
        let client = self.clients.get_mut(&client_id)?;
        client.last_receive_time = now;
        client.messages_received += 1;
        Some(client_id)
    }

    pub fn remove(&mut self, client_id: ClientId) -> Option<ClientConnection> {
        let connection = self.clients.remove(&client_id)?;
        self.clients_by_addr.remove(&connection.addr);
        Some(connection)
    }

    pub fn remove_by_addr(&mut self, addr: &SocketAddr) -> Option<ClientConnection> {
        let client_id = self.clients_by_addr.get(addr).copied()?;
        self.remove(client_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClientConnection> {
        self.clients.values()
    }

    pub fn cleanup_timed_out(&mut self, now: Instant) -> Vec<ClientId> {
        let timed_out: Vec<ClientId> = self
            .clients
            .values()
            .filter(|c| c.is_timed_out(now, self.timeout))
            .map(|c| c.client_id)
            .collect();

        for client_id in &timed_out {
            self.remove(*client_id);
        }
        timed_out
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn accept_assigns_stable_ids() {
        let now = Instant::now();
        let mut manager = ConnectionManager::new(4, Duration::from_secs(10));

        assert_eq!(manager.accept(addr(1000), now), Ok((1, true)));
        assert_eq!(manager.accept(addr(1001), now), Ok((2, true)));
        assert_eq!(manager.accept(addr(1000), now), Ok((1, false)));
        assert_eq!(manager.addr_of(2), Some(addr(1001)));
        assert_eq!(manager.len(), 2);
    }

    #[test]
    fn full_server_denies() {
        let now = Instant::now();
        let mut manager = ConnectionManager::new(1, Duration::from_secs(10));
        manager.accept(addr(1000), now).unwrap();

        assert_eq!(manager.accept(addr(1001), now), Err(AcceptError::ServerFull));
        manager.remove_by_addr(&addr(1000));
        assert!(manager.accept(addr(1001), now).is_ok());
    }

    #[test]
    fn silent_clients_time_out() {
        let start = Instant::now();
        let mut manager = ConnectionManager::new(4, Duration::from_secs(5));
        manager.accept(addr(1000), start).unwrap();
        manager.accept(addr(1001), start).unwrap();

        let later = start + Duration::from_secs(4);
        assert_eq!(manager.touch(addr(1001), later), Some(2));

        let timed_out = manager.cleanup_timed_out(start + Duration::from_secs(6));
        assert_eq!(timed_out, vec![1]);
        assert_eq!(manager.client_id(&addr(1000)), None);
        assert_eq!(manager.client_id(&addr(1001)), Some(2));
    }
}
