//! Deliveries produced while handling a request or a debugger signal.
//!
//! Handlers never touch peers directly. They record what should be sent
//! to whom, and the server applies the list once the handler returned.

use crate::peer::PeerId;

/// One queued message and its recipients.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    /// Put ahead of everything already queued for the peer.
    Front(PeerId, serde_json::Value),
    /// Append to the peer's queue.
    Back(PeerId, serde_json::Value),
    /// Append to every peer's queue, except `skip`.
    Broadcast {
        /// The message.
        message: serde_json::Value,
        /// Peer left out of the fan-out.
        skip: Option<PeerId>,
    },
}

/// Ordered list of [`Delivery`] values.
#[derive(Debug, Default)]
pub struct Outbox {
    deliveries: Vec<Delivery>,
}

impl Outbox {
    /// Create an empty outbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for `peer`.
    pub fn respond(&mut self, peer: PeerId, message: serde_json::Value) {
        self.deliveries.push(Delivery::Front(peer, message));
    }

    /// Queue an event (or late response) for `peer`.
    pub fn send(&mut self, peer: PeerId, message: serde_json::Value) {
        self.deliveries.push(Delivery::Back(peer, message));
    }

    /// Queue a message for all peers but `skip`.
    pub fn broadcast(&mut self, message: serde_json::Value, skip: Option<PeerId>) {
        self.deliveries.push(Delivery::Broadcast { message, skip });
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.deliveries.is_empty()
    }

    /// Number of queued deliveries.
    pub fn len(&self) -> usize {
        self.deliveries.len()
    }

    /// Queued deliveries, oldest first.
    pub fn deliveries(&self) -> &[Delivery] {
        &self.deliveries
    }

    /// Discard everything queued.
    pub fn clear(&mut self) {
        self.deliveries.clear();
    }

    /// Take every queued delivery, leaving the outbox empty.
    pub fn drain(&mut self) -> std::vec::Drain<'_, Delivery> {
        self.deliveries.drain(..)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn outbox_keeps_order() {
        let mut outbox = Outbox::new();
        outbox.send(PeerId(1), json!({"event": "initialized"}));
        outbox.respond(PeerId(1), json!({"command": "initialize"}));
        outbox.broadcast(json!({"event": "continued"}), Some(PeerId(2)));
        assert_eq!(outbox.len(), 3);

        let drained: Vec<_> = outbox.drain().collect();
        assert!(matches!(drained[0], Delivery::Back(PeerId(1), _)));
        assert!(matches!(drained[1], Delivery::Front(PeerId(1), _)));
        assert!(matches!(
            drained[2],
            Delivery::Broadcast {
                skip: Some(PeerId(2)),
                ..
            }
        ));
        assert!(outbox.is_empty());
    }
}
