//! Authoritative registry of participants and their connections.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tokio::time::Instant;

use crate::common::logger::EventLog;
use crate::protocol::{Availability, RosterEntry, ServerEvent};
use crate::server::repository::{self, Communication};

/// Outbound mailbox of one connection. A dedicated task owns the socket
/// write half and drains this queue, so frames from any source reach the
/// socket whole and in enqueue order.
pub type FrameSink = mpsc::UnboundedSender<Vec<u8>>;

/// Token naming one accepted connection. Teardown only transitions a
/// participant to offline while its token still matches, which keeps
/// disconnect idempotent and lets a fast reconnect win the race against a
/// stale session's cleanup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionId(u64);

/// One participant record. Created on first connect and never removed;
/// disconnect clears the sink and sets the availability to offline,
/// preserving the personal history for reconnects.
pub struct Participant {
    pub identifier: String,
    pub availability: Availability,
    pub sink: Option<FrameSink>,
    pub connection: ConnectionId,
    pub last_activity: Instant,
    pub remote_addr: SocketAddr,
    pub personal_history: VecDeque<Communication>,
}

impl Participant {
    /// Busy and offline participants are not written to; busy participants
    /// still accumulate history.
    fn can_receive(&self) -> bool {
        !matches!(
            self.availability,
            Availability::Offline | Availability::Busy
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    Fresh(ConnectionId),
    Reactivated(ConnectionId),
    DuplicateRejected,
}

/// What happened to a private communication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrivateDelivery {
    /// Recipient unknown or offline; nothing was stored.
    Undeliverable,
    /// Recipient busy; stored in both histories, echoed to the sender only.
    StoredForLater,
    /// Written to the recipient and echoed to the sender.
    Delivered,
}

pub struct ParticipantRegistry {
    participants: Mutex<HashMap<String, Participant>>,
    next_connection: AtomicU64,
    events: Arc<EventLog>,
}

impl ParticipantRegistry {
    pub fn new(events: Arc<EventLog>) -> Self {
        Self {
            participants: Mutex::new(HashMap::new()),
            next_connection: AtomicU64::new(0),
            events,
        }
    }

    /// Bind `identifier` to a live connection. An existing record that is not
    /// offline wins over the newcomer; an offline record is reactivated in
    /// place, keeping its personal history.
    pub async fn register(
        &self,
        identifier: &str,
        sink: FrameSink,
        remote_addr: SocketAddr,
    ) -> RegisterOutcome {
        let connection = ConnectionId(self.next_connection.fetch_add(1, Ordering::Relaxed));
        let mut participants = self.participants.lock().await;
        match participants.get_mut(identifier) {
            Some(existing) if existing.availability != Availability::Offline => {
                RegisterOutcome::DuplicateRejected
            }
            Some(existing) => {
                existing.availability = Availability::Available;
                existing.sink = Some(sink);
                existing.connection = connection;
                existing.last_activity = Instant::now();
                existing.remote_addr = remote_addr;
                RegisterOutcome::Reactivated(connection)
            }
            None => {
                participants.insert(
                    identifier.to_owned(),
                    Participant {
                        identifier: identifier.to_owned(),
                        availability: Availability::Available,
                        sink: Some(sink),
                        connection,
                        last_activity: Instant::now(),
                        remote_addr,
                        personal_history: VecDeque::new(),
                    },
                );
                RegisterOutcome::Fresh(connection)
            }
        }
    }

    /// Transition to offline and release the connection. Returns whether this
    /// call performed the transition; a stale token (the participant already
    /// reconnected) or a repeated close is a no-op.
    pub async fn disconnect(&self, identifier: &str, connection: ConnectionId) -> bool {
        let mut participants = self.participants.lock().await;
        match participants.get_mut(identifier) {
            Some(participant)
                if participant.connection == connection
                    && participant.availability != Availability::Offline =>
            {
                participant.availability = Availability::Offline;
                participant.sink = None;
                true
            }
            _ => false,
        }
    }

    pub async fn availability_of(&self, identifier: &str) -> Option<Availability> {
        let participants = self.participants.lock().await;
        participants.get(identifier).map(|p| p.availability)
    }

    /// Update a connected participant's availability, refreshing its
    /// last-activity. Offline records cannot be updated this way.
    pub async fn set_availability(&self, identifier: &str, availability: Availability) -> bool {
        let mut participants = self.participants.lock().await;
        match participants.get_mut(identifier) {
            Some(participant) if participant.availability != Availability::Offline => {
                participant.availability = availability;
                participant.last_activity = Instant::now();
                true
            }
            _ => false,
        }
    }

    /// Refresh a participant's last-activity.
    pub async fn touch(&self, identifier: &str) {
        let mut participants = self.participants.lock().await;
        if let Some(participant) = participants.get_mut(identifier) {
            participant.last_activity = Instant::now();
        }
    }

    /// Snapshot of every non-offline participant, sorted by identifier.
    pub async fn roster(&self) -> Vec<RosterEntry> {
        let participants = self.participants.lock().await;
        let mut entries: Vec<RosterEntry> = participants
            .values()
            .filter(|p| p.availability != Availability::Offline)
            .map(|p| RosterEntry {
                identifier: p.identifier.clone(),
                availability: p.availability,
            })
            .collect();
        entries.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        entries
    }

    /// Enqueue `frame` to every non-offline participant. Enqueueing never
    /// blocks; a closed mailbox is logged and the sweep continues.
    pub async fn broadcast(&self, frame: &[u8]) {
        let participants = self.participants.lock().await;
        for participant in participants.values() {
            if participant.availability == Availability::Offline {
                continue;
            }
            let Some(sink) = &participant.sink else {
                continue;
            };
            if sink.send(frame.to_vec()).is_err() {
                self.events
                    .record(&format!("failed to broadcast to {}", participant.identifier));
            }
        }
    }

    /// Enqueue `frame` to one participant. Returns whether it was enqueued.
    pub async fn send_to(&self, identifier: &str, frame: Vec<u8>) -> bool {
        let participants = self.participants.lock().await;
        let Some(participant) = participants.get(identifier) else {
            return false;
        };
        let Some(sink) = &participant.sink else {
            return false;
        };
        if sink.send(frame).is_err() {
            self.events
                .record(&format!("failed to send to {identifier}"));
            return false;
        }
        true
    }

    /// Apply the private-delivery matrix for one communication, all under a
    /// single lock hold: store in both personal histories unless the
    /// recipient is unknown or offline, write to the recipient unless busy,
    /// and echo to the sender.
    pub async fn send_private(
        &self,
        sender: &str,
        recipient: &str,
        comm: Communication,
    ) -> PrivateDelivery {
        let frame = ServerEvent::Communication {
            sender: comm.sender.clone(),
            content: comm.content.clone(),
        }
        .encode();

        let mut participants = self.participants.lock().await;
        let recipient_receives = match participants.get(recipient) {
            Some(record) if record.availability != Availability::Offline => record.can_receive(),
            _ => return PrivateDelivery::Undeliverable,
        };

        if let Some(record) = participants.get_mut(sender) {
            repository::push_bounded(&mut record.personal_history, comm.clone());
        }
        if let Some(record) = participants.get_mut(recipient) {
            if sender != recipient {
                repository::push_bounded(&mut record.personal_history, comm);
            }
            if recipient_receives
                && let Some(sink) = &record.sink
                && sink.send(frame.clone()).is_err()
            {
                self.events
                    .record(&format!("failed to deliver communication to {recipient}"));
            }
        }

        // The sender's echo; a self-addressed communication that was already
        // written above is not echoed a second time.
        if (sender != recipient || !recipient_receives)
            && let Some(record) = participants.get(sender)
            && let Some(sink) = &record.sink
            && sink.send(frame).is_err()
        {
            self.events
                .record(&format!("failed to echo communication to {sender}"));
        }

        if recipient_receives {
            PrivateDelivery::Delivered
        } else {
            PrivateDelivery::StoredForLater
        }
    }

    /// The most recent `limit` entries of a participant's personal history,
    /// oldest first.
    pub async fn private_tail(&self, identifier: &str, limit: usize) -> Vec<Communication> {
        let participants = self.participants.lock().await;
        participants
            .get(identifier)
            .map(|p| repository::tail(&p.personal_history, limit))
            .unwrap_or_default()
    }

    /// Demote available participants whose last activity is older than
    /// `threshold` to away. Returns the demoted identifiers, sorted.
    pub async fn demote_idle(&self, threshold: Duration) -> Vec<String> {
        let now = Instant::now();
        let mut demoted = Vec::new();
        let mut participants = self.participants.lock().await;
        for participant in participants.values_mut() {
            if participant.availability == Availability::Available
                && now.duration_since(participant.last_activity) > threshold
            {
                participant.availability = Availability::Away;
                demoted.push(participant.identifier.clone());
            }
        }
        demoted.sort();
        demoted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::repository::HISTORY_LIMIT;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn registry() -> ParticipantRegistry {
        ParticipantRegistry::new(Arc::new(EventLog::console_only()))
    }

    fn sink() -> (FrameSink, UnboundedReceiver<Vec<u8>>) {
        mpsc::unbounded_channel()
    }

    fn addr() -> SocketAddr {
        "127.0.0.1:9000".parse().unwrap()
    }

    fn comm(sender: &str, recipient: &str, content: &str) -> Communication {
        Communication {
            sender: sender.into(),
            recipient: recipient.into(),
            content: content.into(),
            sent_at_millis: 0,
        }
    }

    async fn register_ok(registry: &ParticipantRegistry, id: &str) -> UnboundedReceiver<Vec<u8>> {
        let (tx, rx) = sink();
        match registry.register(id, tx, addr()).await {
            RegisterOutcome::Fresh(_) | RegisterOutcome::Reactivated(_) => rx,
            RegisterOutcome::DuplicateRejected => panic!("registration of {id} rejected"),
        }
    }

    fn drain(rx: &mut UnboundedReceiver<Vec<u8>>) -> Vec<Vec<u8>> {
        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(frame);
        }
        frames
    }

    #[tokio::test]
    async fn second_registration_of_connected_identifier_is_rejected() {
        let registry = registry();
        let _rx = register_ok(&registry, "alice").await;

        let (tx, _rx2) = sink();
        assert_eq!(
            registry.register("alice", tx, addr()).await,
            RegisterOutcome::DuplicateRejected
        );
    }

    #[tokio::test]
    async fn offline_record_is_reactivated_with_history_preserved() {
        let registry = registry();
        let _alice = register_ok(&registry, "alice").await;
        let mut bob = register_ok(&registry, "bob").await;

        registry
            .send_private("alice", "bob", comm("alice", "bob", "hi"))
            .await;
        drain(&mut bob);

        let connection = match registry.availability_of("bob").await {
            Some(Availability::Available) => {
                let (tx, _rx) = sink();
                // Re-register must fail while connected.
                assert_eq!(
                    registry.register("bob", tx, addr()).await,
                    RegisterOutcome::DuplicateRejected
                );
                let participants = registry.participants.lock().await;
                participants.get("bob").unwrap().connection
            }
            other => panic!("unexpected availability: {other:?}"),
        };

        assert!(registry.disconnect("bob", connection).await);
        assert_eq!(
            registry.availability_of("bob").await,
            Some(Availability::Offline)
        );

        let (tx, _rx) = sink();
        match registry.register("bob", tx, addr()).await {
            RegisterOutcome::Reactivated(_) => {}
            other => panic!("expected reactivation, got {other:?}"),
        }
        assert_eq!(registry.private_tail("bob", 255).await.len(), 1);
    }

    #[tokio::test]
    async fn disconnect_is_idempotent_and_ignores_stale_tokens() {
        let registry = registry();
        let (tx, _rx) = sink();
        let connection = match registry.register("alice", tx, addr()).await {
            RegisterOutcome::Fresh(connection) => connection,
            other => panic!("expected fresh registration, got {other:?}"),
        };

        assert!(registry.disconnect("alice", connection).await);
        assert!(!registry.disconnect("alice", connection).await);

        // Reconnect, then let the stale session's cleanup fire.
        let (tx, _rx) = sink();
        registry.register("alice", tx, addr()).await;
        assert!(!registry.disconnect("alice", connection).await);
        assert_eq!(
            registry.availability_of("alice").await,
            Some(Availability::Available)
        );
    }

    #[tokio::test]
    async fn roster_lists_non_offline_participants_sorted() {
        let registry = registry();
        let _carol = register_ok(&registry, "carol").await;
        let _alice = register_ok(&registry, "alice").await;
        let (tx, _rx) = sink();
        let connection = match registry.register("bob", tx, addr()).await {
            RegisterOutcome::Fresh(connection) => connection,
            other => panic!("expected fresh registration, got {other:?}"),
        };
        registry.disconnect("bob", connection).await;

        let roster = registry.roster().await;

        let identifiers: Vec<&str> = roster.iter().map(|e| e.identifier.as_str()).collect();
        assert_eq!(identifiers, ["alice", "carol"]);
    }

    #[tokio::test]
    async fn broadcast_reaches_every_non_offline_participant_exactly_once() {
        let registry = registry();
        let mut alice = register_ok(&registry, "alice").await;
        let mut bob = register_ok(&registry, "bob").await;
        let (tx, mut carol) = sink();
        let connection = match registry.register("carol", tx, addr()).await {
            RegisterOutcome::Fresh(connection) => connection,
            other => panic!("expected fresh registration, got {other:?}"),
        };
        registry.disconnect("carol", connection).await;

        registry.broadcast(&[54, 0, 1]).await;

        assert_eq!(drain(&mut alice).len(), 1);
        assert_eq!(drain(&mut bob).len(), 1);
        assert_eq!(drain(&mut carol).len(), 0);
    }

    #[tokio::test]
    async fn broadcast_survives_a_closed_mailbox() {
        let registry = registry();
        let mut alice = register_ok(&registry, "alice").await;
        let bob = register_ok(&registry, "bob").await;
        drop(bob);

        registry.broadcast(&[54, 0, 1]).await;

        assert_eq!(drain(&mut alice).len(), 1);
    }

    #[tokio::test]
    async fn private_send_to_unknown_or_offline_recipient_is_undeliverable() {
        let registry = registry();
        let mut alice = register_ok(&registry, "alice").await;

        assert_eq!(
            registry
                .send_private("alice", "ghost", comm("alice", "ghost", "?"))
                .await,
            PrivateDelivery::Undeliverable
        );

        let (tx, _rx) = sink();
        let connection = match registry.register("bob", tx, addr()).await {
            RegisterOutcome::Fresh(connection) => connection,
            other => panic!("expected fresh registration, got {other:?}"),
        };
        registry.disconnect("bob", connection).await;
        assert_eq!(
            registry
                .send_private("alice", "bob", comm("alice", "bob", "?"))
                .await,
            PrivateDelivery::Undeliverable
        );

        // No history was written and no echo was sent.
        assert!(registry.private_tail("alice", 255).await.is_empty());
        assert!(registry.private_tail("bob", 255).await.is_empty());
        assert!(drain(&mut alice).is_empty());
    }

    #[tokio::test]
    async fn private_send_to_busy_recipient_is_stored_and_echoed_to_sender_only() {
        let registry = registry();
        let mut alice = register_ok(&registry, "alice").await;
        let mut bob = register_ok(&registry, "bob").await;
        registry.set_availability("bob", Availability::Busy).await;

        assert_eq!(
            registry
                .send_private("alice", "bob", comm("alice", "bob", "ping"))
                .await,
            PrivateDelivery::StoredForLater
        );

        assert_eq!(drain(&mut alice).len(), 1);
        assert!(drain(&mut bob).is_empty());
        assert_eq!(registry.private_tail("alice", 255).await.len(), 1);
        assert_eq!(registry.private_tail("bob", 255).await.len(), 1);
    }

    #[tokio::test]
    async fn private_send_to_receptive_recipient_reaches_both_sides() {
        let registry = registry();
        let mut alice = register_ok(&registry, "alice").await;
        let mut bob = register_ok(&registry, "bob").await;
        registry.set_availability("bob", Availability::Away).await;

        assert_eq!(
            registry
                .send_private("alice", "bob", comm("alice", "bob", "ping"))
                .await,
            PrivateDelivery::Delivered
        );

        assert_eq!(drain(&mut alice).len(), 1);
        assert_eq!(drain(&mut bob).len(), 1);
    }

    #[tokio::test]
    async fn self_addressed_communication_arrives_exactly_once() {
        let registry = registry();
        let mut alice = register_ok(&registry, "alice").await;

        registry
            .send_private("alice", "alice", comm("alice", "alice", "note"))
            .await;

        assert_eq!(drain(&mut alice).len(), 1);
        assert_eq!(registry.private_tail("alice", 255).await.len(), 1);
    }

    #[tokio::test]
    async fn personal_history_is_bounded() {
        let registry = registry();
        let mut alice = register_ok(&registry, "alice").await;
        let mut bob = register_ok(&registry, "bob").await;

        for index in 0..HISTORY_LIMIT + 5 {
            registry
                .send_private("alice", "bob", comm("alice", "bob", &format!("m{index}")))
                .await;
        }
        drain(&mut alice);
        drain(&mut bob);

        let history = registry.private_tail("bob", HISTORY_LIMIT + 5).await;
        assert_eq!(history.len(), HISTORY_LIMIT);
        assert_eq!(history.first().unwrap().content, "m5");
    }

    #[tokio::test(start_paused = true)]
    async fn idle_available_participants_are_demoted() {
        let registry = registry();
        let _alice = register_ok(&registry, "alice").await;
        let _bob = register_ok(&registry, "bob").await;
        registry.set_availability("bob", Availability::Busy).await;

        tokio::time::advance(Duration::from_secs(61)).await;

        let demoted = registry.demote_idle(Duration::from_secs(60)).await;
        assert_eq!(demoted, ["alice"]);
        assert_eq!(
            registry.availability_of("alice").await,
            Some(Availability::Away)
        );
        assert_eq!(
            registry.availability_of("bob").await,
            Some(Availability::Busy)
        );

        // Already away: a second sweep demotes nobody.
        assert!(registry.demote_idle(Duration::from_secs(60)).await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn touch_defers_idle_demotion() {
        let registry = registry();
        let _alice = register_ok(&registry, "alice").await;

        tokio::time::advance(Duration::from_secs(59)).await;
        registry.touch("alice").await;
        tokio::time::advance(Duration::from_secs(30)).await;

        assert!(registry.demote_idle(Duration::from_secs(60)).await.is_empty());
    }
}
