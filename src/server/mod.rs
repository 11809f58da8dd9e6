//! WebSocket chat server implementation.

mod handler;
mod monitor;
mod registry;
mod repository;
mod request;
mod runner;
mod signal;
mod state;

pub use monitor::{ActivityMonitor, DEFAULT_IDLE_TIMEOUT, MONITOR_TICK};
pub use registry::{
    ConnectionId, FrameSink, ParticipantRegistry, PrivateDelivery, RegisterOutcome,
};
pub use repository::{Communication, CommunicationRepository, HISTORY_LIMIT};
pub use runner::{ServerConfig, ServerError, router, run_server, serve};
pub use state::AppState;
