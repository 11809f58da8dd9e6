//! Bounded conversation history.

use std::collections::VecDeque;

use tokio::sync::Mutex;

/// Maximum number of retained communications, per ring.
pub const HISTORY_LIMIT: usize = 1000;

/// An immutable record of one message. The recipient `~` denotes the public
/// channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Communication {
    pub sender: String,
    pub recipient: String,
    pub content: String,
    pub sent_at_millis: i64,
}

/// Append to a ring, evicting the oldest entry when over [`HISTORY_LIMIT`].
pub(crate) fn push_bounded(history: &mut VecDeque<Communication>, comm: Communication) {
    history.push_back(comm);
    if history.len() > HISTORY_LIMIT {
        history.pop_front();
    }
}

/// The most recent `limit` entries, oldest first.
pub(crate) fn tail(history: &VecDeque<Communication>, limit: usize) -> Vec<Communication> {
    let skip = history.len().saturating_sub(limit);
    history.iter().skip(skip).cloned().collect()
}

/// Owner of the public-channel ring. Personal histories live inside the
/// participant records and are bounded by the same helpers under the
/// registry's lock.
pub struct CommunicationRepository {
    public: Mutex<VecDeque<Communication>>,
}

impl CommunicationRepository {
    pub fn new() -> Self {
        Self {
            public: Mutex::new(VecDeque::new()),
        }
    }

    pub async fn add_public(&self, comm: Communication) {
        let mut public = self.public.lock().await;
        push_bounded(&mut public, comm);
    }

    pub async fn public_tail(&self, limit: usize) -> Vec<Communication> {
        let public = self.public.lock().await;
        tail(&public, limit)
    }
}

impl Default for CommunicationRepository {
    fn default() -> Self {
        Self::new()
    }
}
