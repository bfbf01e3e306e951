use glam::Vec3;
use tokio::sync::mpsc;

use crate::net::ClientMessage;

pub type ClientId = u32;

/// Work handed from the I/O tasks to the tick loop.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Connect { client_id: ClientId, spawn: Vec3 },
    Message { client_id: ClientId, message: ClientMessage },
    Disconnect { client_id: ClientId },
}

#[derive(Debug, Clone)]
pub struct InboundSender {
    tx: mpsc::UnboundedSender<Inbound>,
}

impl InboundSender {
    /// Returns false once the shard has been dropped.
    pub fn send(&self, inbound: Inbound) -> bool {
        self.tx.send(inbound).is_ok()
    }

    pub fn message(&self, client_id: ClientId, message: ClientMessage) -> bool {
        self.send(Inbound::Message { client_id, message })
    }
}

/// Receiving half, owned by the world shard and drained once per tick.
#[derive(Debug)]
pub struct InboundQueue {
    rx: mpsc::UnboundedReceiver<Inbound>,
}

pub fn inbound_queue() -> (InboundSender, InboundQueue) {
    let (tx, rx) = mpsc::unbounded_channel();
    (InboundSender { tx }, InboundQueue { rx })
}

impl InboundQueue {
    /// Everything queued so far. Never waits.
    pub fn drain(&mut self) -> Vec<Inbound> {
        let mut items = Vec::new();
        while let Ok(item) = self.rx.try_recv() {
            items.push(item);
        }
        items
    }
}
