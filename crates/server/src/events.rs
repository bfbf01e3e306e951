use std::net::SocketAddr;

use tether::ClientId;

#[derive(Debug, Clone)]
pub enum ServerEvent {
    ClientConnected {
        client_id: ClientId,
        addr: SocketAddr,
    },
    ClientDisconnected {
        client_id: ClientId,
        reason: DisconnectReason,
    },
    ConnectionDenied {
        addr: SocketAddr,
        reason: &'static str,
    },
    Error {
        message: String,
    },
}

impl ServerEvent {
    pub fn log(&self) {
        match self {
            ServerEvent::ClientConnected { client_id, addr } => {
                log::info!("Client {} connected from {}", client_id, addr);
            }
            ServerEvent::ClientDisconnected { client_id, reason } => {
                log::info!("Client {} {}", client_id, reason.as_str());
            }
            ServerEvent::ConnectionDenied { addr, reason } => {
                log::warn!("Connection denied to {}: {}", addr, reason);
            }
            ServerEvent::Error { message } => log::error!("{}", message),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    Graceful,
    Timeout,
}

impl DisconnectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisconnectReason::Graceful => "disconnected",
            DisconnectReason::Timeout => "timed out",
        }
    }
}
