//! Broadcast fan-out.
//!
//! # Responsibilities
//! - Enqueue a fully received message on every open connection except its sender
//! - Encode the frame once and share it between recipients
//!
//! # Guarantees
//! - Per-recipient FIFO: messages land in each recipient's queue in the order
//!   they were routed
//! - No ordering across recipients, no acknowledgement, no retry; a recipient
//!   that disconnects takes its undelivered messages with it
//! - A recipient's queue never grows past the configured cap; a recipient at
//!   the cap is reported back instead of queued for

use crate::net::codec::encode_frame;
use crate::net::connection::ConnectionId;
use crate::net::registry::Registry;
use crate::net::stream::ByteStream;

/// Outcome of routing one message.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Connections the message was queued for.
    pub recipients: usize,
    /// Connections whose queue was already full. The caller closes them.
    pub overflowed: Vec<ConnectionId>,
}

/// Routes inbound messages to their recipients.
#[derive(Debug, Clone, Copy)]
pub struct BroadcastRouter {
    max_queued: usize,
}

impl BroadcastRouter {
    /// A router that stops queuing for a recipient holding `max_queued`
    /// frames.
    pub fn new(max_queued: usize) -> Self {
        Self { max_queued }
    }

    pub fn max_queued(&self) -> usize {
        self.max_queued
    }

    /// Append `payload` to the outbound queue of every open connection other
    /// than `sender`.
    ///
    /// Queuing a frame is what puts a recipient into write-interest.
    pub fn route<S: ByteStream>(
        &self,
        registry: &mut Registry<S>,
        sender: ConnectionId,
        payload: &[u8],
    ) -> Delivery {
        let mut delivery = Delivery::default();
        // Decoded payloads are bounded by max_frame_len, which fits the header.
        let Ok(frame) = encode_frame(payload) else {
            return delivery;
        };
        for connection in registry.iter_mut() {
            if connection.id() == sender || !connection.is_open() {
                continue;
            }
            if connection.queued() >= self.max_queued {
                delivery.overflowed.push(connection.id());
                continue;
            }
            connection.enqueue(frame.clone());
            delivery.recipients += 1;
        }

        registry
            .observer()
            .message_routed(sender, payload.len(), delivery.recipients);
        delivery
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CloseReason;
    use crate::net::codec::FrameDecoder;
    use crate::net::connection::Connection;
    use crate::net::stream::mock::MockStream;
    use crate::observability::observer::recording::RecordingObserver;
    use std::sync::Arc;

    fn registry_with(n: usize) -> (Registry<MockStream>, Vec<ConnectionId>) {
        let mut registry = Registry::new(Arc::new(RecordingObserver::default()));
        let ids = (0..n)
            .map(|i| {
                let id = registry.allocate_id();
                let peer = format!("127.0.0.1:{}", 7000 + i).parse().unwrap();
                registry.insert(Connection::new(id, peer, MockStream::default(), 1024));
                id
            })
            .collect();
        (registry, ids)
    }

    fn queued_payloads(registry: &Registry<MockStream>, id: ConnectionId) -> Vec<Vec<u8>> {
        let mut decoder = FrameDecoder::new(1024);
        let mut out = Vec::new();
        for frame in registry.get(id).unwrap().outbound() {
            decoder.feed(frame, &mut out).unwrap();
        }
        out
    }

    #[test]
    fn fans_out_to_everyone_but_the_sender() {
        let (mut registry, ids) = registry_with(3);
        let (a, b, c) = (ids[0], ids[1], ids[2]);

        let delivery = BroadcastRouter::new(16).route(&mut registry, a, b"hello");

        assert_eq!(delivery.recipients, 2);
        assert!(delivery.overflowed.is_empty());
        assert_eq!(queued_payloads(&registry, b), vec![b"hello".to_vec()]);
        assert_eq!(queued_payloads(&registry, c), vec![b"hello".to_vec()]);
        assert!(queued_payloads(&registry, a).is_empty());
        assert_eq!(registry.write_interest(), vec![b, c]);
    }

    #[test]
    fn preserves_per_recipient_order() {
        let (mut registry, ids) = registry_with(3);
        let router = BroadcastRouter::new(16);
        router.route(&mut registry, ids[0], b"m1");
        router.route(&mut registry, ids[2], b"from c");
        router.route(&mut registry, ids[0], b"m2");

        assert_eq!(
            queued_payloads(&registry, ids[1]),
            vec![b"m1".to_vec(), b"from c".to_vec(), b"m2".to_vec()]
        );
        assert_eq!(queued_payloads(&registry, ids[0]), vec![b"from c".to_vec()]);
        assert_eq!(
            queued_payloads(&registry, ids[2]),
            vec![b"m1".to_vec(), b"m2".to_vec()]
        );
    }

    #[test]
    fn closed_recipients_are_skipped_without_affecting_others() {
        let (mut registry, ids) = registry_with(3);
        let router = BroadcastRouter::new(16);
        router.route(&mut registry, ids[0], b"first");
        router.route(&mut registry, ids[0], b"second");
        assert_eq!(registry.get(ids[1]).unwrap().queued(), 2);

        registry.close(ids[1], CloseReason::Local);
        let delivery = router.route(&mut registry, ids[0], b"third");

        assert_eq!(delivery.recipients, 1);
        assert_eq!(
            queued_payloads(&registry, ids[2]),
            vec![b"first".to_vec(), b"second".to_vec(), b"third".to_vec()]
        );
    }

    #[test]
    fn lone_sender_has_no_recipients() {
        let (mut registry, ids) = registry_with(1);
        let delivery = BroadcastRouter::new(16).route(&mut registry, ids[0], b"echo?");
        assert_eq!(delivery, Delivery::default());
        assert!(registry.write_interest().is_empty());
    }

    #[test]
    fn full_recipient_queue_is_reported_not_extended() {
        let (mut registry, ids) = registry_with(3);
        let router = BroadcastRouter::new(2);
        router.route(&mut registry, ids[0], b"m1");
        router.route(&mut registry, ids[0], b"m2");
        // ids[2] drains its queue; ids[1] does not.
        registry
            .get_mut(ids[2])
            .unwrap()
            .flush_outbound()
            .unwrap();

        let delivery = router.route(&mut registry, ids[0], b"m3");

        assert_eq!(delivery.recipients, 1);
        assert_eq!(delivery.overflowed, vec![ids[1]]);
        assert_eq!(
            queued_payloads(&registry, ids[1]),
            vec![b"m1".to_vec(), b"m2".to_vec()]
        );
        assert_eq!(queued_payloads(&registry, ids[2]), vec![b"m3".to_vec()]);
    }
}
