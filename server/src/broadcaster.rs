//! Fan-out of packets to player sessions
//!
//! Each session owns one FIFO outbound queue drained by its writer task. The
//! turn loop is the only producer of game events, so every session sees them
//! in the order they happened.

use crate::player::PlayerId;
use log::{debug, warn};
use shared::Packet;
use std::collections::BTreeMap;
use tokio::sync::mpsc::UnboundedSender;

#[derive(Debug, Default)]
pub struct Broadcaster {
    sessions: BTreeMap<PlayerId, UnboundedSender<Packet>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, id: PlayerId, outbound: UnboundedSender<Packet>) {
        debug!("Registered session for player {}", id);
        self.sessions.insert(id, outbound);
    }

    /// Drops the outbound queue; the writer task ends once it drains.
    pub fn unregister(&mut self, id: PlayerId) -> bool {
        self.sessions.remove(&id).is_some()
    }

    pub fn ids(&self) -> Vec<PlayerId> {
        self.sessions.keys().copied().collect()
    }

    /// Queues a packet for one session. A closed session is logged and
    /// reported as false.
    pub fn send_to(&self, id: PlayerId, packet: Packet) -> bool {
        match self.sessions.get(&id) {
            Some(tx) => {
                if tx.send(packet).is_err() {
                    warn!("Session of player {} is closed, dropping packet", id);
                    return false;
                }
                true
            }
            None => false,
        }
    }

    pub fn broadcast(&self, packet: &Packet) {
        self.broadcast_with(|_| packet.clone());
    }

    /// Sends a packet built for each recipient, e.g. a board with their own
    /// marker.
    pub fn broadcast_with<F>(&self, mut build: F)
    where
        F: FnMut(PlayerId) -> Packet,
    {
        for id in self.sessions.keys() {
            self.send_to(*id, build(*id));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::unbounded_channel;

    fn info(text: &str) -> Packet {
        Packet::Info {
            text: text.to_string(),
        }
    }

    #[test]
    fn test_broadcast_reaches_every_session_in_order() {
        let mut broadcaster = Broadcaster::new();
        let (tx1, mut rx1) = unbounded_channel();
        let (tx2, mut rx2) = unbounded_channel();
        broadcaster.register(PlayerId(1), tx1);
        broadcaster.register(PlayerId(2), tx2);

        broadcaster.broadcast(&info("first"));
        broadcaster.broadcast(&info("second"));

        for rx in [&mut rx1, &mut rx2] {
            assert_eq!(rx.try_recv().unwrap(), info("first"));
            assert_eq!(rx.try_recv().unwrap(), info("second"));
            assert!(rx.try_recv().is_err());
        }
    }

    #[test]
    fn test_per_recipient_packets() {
        let mut broadcaster = Broadcaster::new();
        let (tx1, mut rx1) = unbounded_channel();
        let (tx2, mut rx2) = unbounded_channel();
        broadcaster.register(PlayerId(1), tx1);
        broadcaster.register(PlayerId(2), tx2);

        broadcaster.broadcast_with(|id| info(&format!("hello {}", id)));
        assert_eq!(rx1.try_recv().unwrap(), info("hello #1"));
        assert_eq!(rx2.try_recv().unwrap(), info("hello #2"));
        assert!(rx1.try_recv().is_err());
    }

    #[test]
    fn test_closed_and_unknown_sessions() {
        let mut broadcaster = Broadcaster::new();
        let (tx, rx) = unbounded_channel();
        broadcaster.register(PlayerId(1), tx);
        drop(rx);

        assert!(!broadcaster.send_to(PlayerId(1), info("lost")));
        assert!(!broadcaster.send_to(PlayerId(9), info("nobody")));

        assert!(broadcaster.unregister(PlayerId(1)));
        assert!(!broadcaster.unregister(PlayerId(1)));
        assert!(broadcaster.ids().is_empty());
    }
}
