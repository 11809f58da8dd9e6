//! Application of decoded client requests against the registry and
//! repository.

use std::sync::Arc;

use crate::protocol::{
    self, Availability, ClientRequest, FailureReason, HistoryEntry, ServerEvent,
};
use crate::server::registry::PrivateDelivery;
use crate::server::repository::Communication;
use crate::server::state::AppState;

/// Decode one inbound frame and apply it. A frame that fails to decode is
/// logged with the requester's identifier and dropped; the session
/// continues.
pub async fn apply(state: &Arc<AppState>, requester: &str, frame: &[u8]) {
    let request = match ClientRequest::decode(frame) {
        Ok(request) => request,
        Err(error) => {
            state.events.record(&format!(
                "dropping malformed frame from {requester} (first byte {:?}): {error}",
                frame.first()
            ));
            return;
        }
    };

    state.registry.touch(requester).await;

    match request {
        ClientRequest::ListParticipants => list_participants(state, requester).await,
        ClientRequest::ParticipantInfo { target } => {
            participant_info(state, requester, &target).await
        }
        ClientRequest::SetAvailability { target, status } => {
            set_availability(state, requester, &target, status).await
        }
        ClientRequest::SendCommunication { recipient, content } => {
            send_communication(state, requester, &recipient, content).await
        }
        ClientRequest::FetchCommunications { channel } => {
            fetch_communications(state, requester, &channel).await
        }
    }
}

async fn fail(state: &AppState, requester: &str, reason: FailureReason) {
    state
        .registry
        .send_to(requester, ServerEvent::Failure { reason }.encode())
        .await;
}

async fn list_participants(state: &AppState, requester: &str) {
    state
        .events
        .record(&format!("participant {requester} requests the roster"));

    let mut entries = state.registry.roster().await;
    entries.truncate(protocol::MAX_LIST_LEN);

    state
        .registry
        .send_to(requester, ServerEvent::ParticipantList { entries }.encode())
        .await;
}

async fn participant_info(state: &AppState, requester: &str, target: &str) {
    state
        .events
        .record(&format!("participant {requester} requests info for {target}"));

    match state.registry.availability_of(target).await {
        Some(availability) => {
            let event = ServerEvent::ParticipantDetails {
                identifier: target.to_owned(),
                availability,
            };
            state.registry.send_to(requester, event.encode()).await;
        }
        None => fail(state, requester, FailureReason::UnknownParticipant).await,
    }
}

async fn set_availability(state: &AppState, requester: &str, target: &str, status: u8) {
    state.events.record(&format!(
        "participant {requester} requests availability change for {target} to {status}"
    ));

    // Offline is reached only by disconnecting, never set explicitly.
    let availability = match Availability::from_byte(status) {
        Some(Availability::Offline) | None => {
            return fail(state, requester, FailureReason::InvalidAvailability).await;
        }
        Some(availability) => availability,
    };

    // A participant may change only its own availability.
    if target != requester {
        return fail(state, requester, FailureReason::UnknownParticipant).await;
    }

    if !state.registry.set_availability(target, availability).await {
        return fail(state, requester, FailureReason::UnknownParticipant).await;
    }

    let update = ServerEvent::AvailabilityUpdate {
        identifier: target.to_owned(),
        availability,
    };
    state.registry.broadcast(&update.encode()).await;
}

async fn send_communication(state: &AppState, requester: &str, recipient: &str, content: String) {
    if content.trim().is_empty() {
        return fail(state, requester, FailureReason::EmptyCommunication).await;
    }

    state.events.record(&format!(
        "participant {requester} sends communication to {recipient}: {content}"
    ));

    let comm = Communication {
        sender: requester.to_owned(),
        recipient: recipient.to_owned(),
        content,
        sent_at_millis: state.clock.now_millis(),
    };

    if recipient == protocol::PUBLIC_CHANNEL {
        let frame = ServerEvent::Communication {
            sender: comm.sender.clone(),
            content: comm.content.clone(),
        }
        .encode();
        state.repository.add_public(comm).await;
        // The sender is part of the membership, so the broadcast is also the
        // sender's one echo.
        state.registry.broadcast(&frame).await;
    } else {
        match state.registry.send_private(requester, recipient, comm).await {
            PrivateDelivery::Undeliverable => {
                fail(state, requester, FailureReason::UnavailableParticipant).await;
            }
            PrivateDelivery::StoredForLater => {
                state.events.record(&format!(
                    "communication from {requester} to {recipient} stored, recipient busy"
                ));
            }
            PrivateDelivery::Delivered => {
                state.events.record(&format!(
                    "communication from {requester} to {recipient} delivered"
                ));
            }
        }
    }
}

async fn fetch_communications(state: &AppState, requester: &str, channel: &str) {
    state.events.record(&format!(
        "participant {requester} requests communications for channel {channel}"
    ));

    // The only private history a participant can fetch is its own.
    let history = if channel == protocol::PUBLIC_CHANNEL {
        state.repository.public_tail(protocol::MAX_LIST_LEN).await
    } else {
        state
            .registry
            .private_tail(requester, protocol::MAX_LIST_LEN)
            .await
    };

    let entries = history
        .into_iter()
        .map(|comm| HistoryEntry {
            sender: comm.sender,
            content: comm.content,
        })
        .collect();

    state
        .registry
        .send_to(requester, ServerEvent::CommunicationHistory { entries }.encode())
        .await;
}
