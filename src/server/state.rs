//! Shared server state.

use std::sync::Arc;

use serde::Deserialize;

use crate::common::logger::EventLog;
use crate::common::time::{Clock, SystemClock};
use crate::server::registry::ParticipantRegistry;
use crate::server::repository::CommunicationRepository;

/// Query parameters of the WebSocket upgrade request.
#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    pub name: String,
}

/// Everything the connection handlers and the monitor share.
pub struct AppState {
    pub registry: ParticipantRegistry,
    pub repository: CommunicationRepository,
    pub events: Arc<EventLog>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new(events: EventLog) -> Self {
        Self::with_clock(events, Arc::new(SystemClock))
    }

    pub fn with_clock(events: EventLog, clock: Arc<dyn Clock>) -> Self {
        let events = Arc::new(events);
        Self {
            registry: ParticipantRegistry::new(events.clone()),
            repository: CommunicationRepository::new(),
            events,
            clock,
        }
    }
}
