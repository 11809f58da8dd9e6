//! Client execution logic with reconnection support.

use std::time::Duration;

use super::error::ClientError;
use super::session::run_client_session;

const MAX_RECONNECT_ATTEMPTS: u32 = 5;
const RECONNECT_INTERVAL_SECS: u64 = 5;

/// Run the client, reconnecting on lost connections.
pub async fn run_client(url: String, identifier: String) -> Result<(), ClientError> {
    let mut reconnect_count = 0;

    loop {
        tracing::info!(
            "connecting to {} as '{}' (attempt {}/{})",
            url,
            identifier,
            reconnect_count + 1,
            MAX_RECONNECT_ATTEMPTS
        );

        match run_client_session(&url, &identifier).await {
            Ok(()) => {
                tracing::info!("session ended");
                return Ok(());
            }
            // No point retrying a rejected identifier.
            Err(error @ ClientError::DuplicateIdentifier(_)) => return Err(error),
            Err(error @ ClientError::Rejected(_)) => return Err(error),
            Err(error) => {
                tracing::warn!("connection lost: {error}");
                reconnect_count += 1;

                if reconnect_count >= MAX_RECONNECT_ATTEMPTS {
                    return Err(error);
                }

                tracing::info!(
                    "reconnecting in {} seconds... (attempt {}/{})",
                    RECONNECT_INTERVAL_SECS,
                    reconnect_count + 1,
                    MAX_RECONNECT_ATTEMPTS
                );
                tokio::time::sleep(Duration::from_secs(RECONNECT_INTERVAL_SECS)).await;
            }
        }
    }
}
