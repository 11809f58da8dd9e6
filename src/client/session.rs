//! One WebSocket client session.

use futures_util::{SinkExt, StreamExt};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite, tungstenite::protocol::Message};

use crate::protocol::{Availability, ClientRequest, PUBLIC_CHANNEL, ServerEvent};

use super::error::ClientError;
use super::formatter::Formatter;

const HELP: &str = "commands: /list, /info <id>, /status <available|busy|away>, \
                    /msg <id> <text>, /history [channel]; anything else goes to the public channel";

/// Run one session against the server. Returns `Ok` when the user ends the
/// session, `Err` when the connection was lost or refused.
pub async fn run_client_session(url: &str, identifier: &str) -> Result<(), ClientError> {
    let request_url = format!(
        "{}/?name={}",
        url.trim_end_matches('/'),
        identifier.replace(' ', "%20")
    );

    let (ws_stream, _response) = match connect_async(&request_url).await {
        Ok(result) => result,
        Err(tungstenite::Error::Http(response)) if response.status().as_u16() == 409 => {
            return Err(ClientError::DuplicateIdentifier(identifier.to_string()));
        }
        Err(tungstenite::Error::Http(response)) => {
            return Err(ClientError::Rejected(response.status().to_string()));
        }
        Err(error) => return Err(ClientError::Connection(error.to_string())),
    };

    tracing::info!("connected to {url}");
    println!("\nYou are '{identifier}'. {HELP}. Ctrl+C exits.\n");

    let (mut write, mut read) = ws_stream.split();

    // Decode and render everything the server pushes at us.
    let own_identifier = identifier.to_string();
    let mut read_task = tokio::spawn(async move {
        let mut connection_lost = false;
        while let Some(message) = read.next().await {
            match message {
                Ok(Message::Binary(frame)) => match ServerEvent::decode(&frame) {
                    Ok(event) => print!("{}", Formatter::render(&event, &own_identifier)),
                    Err(error) => tracing::warn!("undecodable frame from server: {error}"),
                },
                Ok(Message::Close(_)) => {
                    tracing::info!("server closed the connection");
                    connection_lost = true;
                    break;
                }
                Ok(_) => {}
                Err(error) => {
                    tracing::warn!("websocket read error: {error}");
                    connection_lost = true;
                    break;
                }
            }
        }
        connection_lost
    });

    // rustyline is synchronous; bridge it over a channel from its own thread.
    let (input_tx, mut input_rx) = mpsc::unbounded_channel::<String>();
    let prompt_identifier = identifier.to_string();
    std::thread::spawn(move || {
        let mut rl = match DefaultEditor::new() {
            Ok(rl) => rl,
            Err(error) => {
                eprintln!("failed to initialize readline: {error}");
                return;
            }
        };

        let prompt = format!("{prompt_identifier}> ");
        loop {
            match rl.readline(&prompt) {
                Ok(line) => {
                    let line = line.trim().to_string();
                    if line.is_empty() {
                        continue;
                    }
                    rl.add_history_entry(&line).ok();
                    if input_tx.send(line).is_err() {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                Err(error) => {
                    tracing::error!("readline error: {error}");
                    break;
                }
            }
        }
    });

    let write_identifier = identifier.to_string();
    let mut write_task = tokio::spawn(async move {
        let mut connection_lost = false;
        while let Some(line) = input_rx.recv().await {
            let request = match request_for_line(&write_identifier, &line) {
                Ok(request) => request,
                Err(usage) => {
                    println!("{usage}");
                    continue;
                }
            };
            if let Err(error) = write.send(Message::Binary(request.encode().into())).await {
                tracing::warn!("failed to send request: {error}");
                connection_lost = true;
                break;
            }
        }
        connection_lost
    });

    // If any one of the tasks completes, abort the other.
    tokio::select! {
        read_result = &mut read_task => {
            write_task.abort();
            if read_result.unwrap_or(true) {
                return Err(ClientError::Connection("connection lost".to_string()));
            }
        }
        write_result = &mut write_task => {
            read_task.abort();
            if write_result.unwrap_or(true) {
                return Err(ClientError::Connection("connection lost".to_string()));
            }
        }
    }

    Ok(())
}

/// Translate one input line into a request frame. Status changes always
/// target the local participant; the server refuses anything else.
fn request_for_line(identifier: &str, line: &str) -> Result<ClientRequest, String> {
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(ClientRequest::SendCommunication {
            recipient: PUBLIC_CHANNEL.to_string(),
            content: line.to_string(),
        });
    };

    let mut parts = rest.splitn(2, ' ');
    let command = parts.next().unwrap_or_default();
    let argument = parts.next().unwrap_or("").trim();

    match command {
        "list" => Ok(ClientRequest::ListParticipants),
        "info" if !argument.is_empty() => Ok(ClientRequest::ParticipantInfo {
            target: argument.to_string(),
        }),
        "info" => Err("usage: /info <id>".to_string()),
        "status" => {
            let availability = match argument {
                "available" => Availability::Available,
                "busy" => Availability::Busy,
                "away" => Availability::Away,
                _ => return Err("usage: /status <available|busy|away>".to_string()),
            };
            Ok(ClientRequest::SetAvailability {
                target: identifier.to_string(),
                status: availability.as_byte(),
            })
        }
        "msg" => {
            let mut msg_parts = argument.splitn(2, ' ');
            match (msg_parts.next(), msg_parts.next()) {
                (Some(target), Some(text)) if !target.is_empty() && !text.trim().is_empty() => {
                    Ok(ClientRequest::SendCommunication {
                        recipient: target.to_string(),
                        content: text.trim().to_string(),
                    })
                }
                _ => Err("usage: /msg <id> <text>".to_string()),
            }
        }
        "history" => Ok(ClientRequest::FetchCommunications {
            channel: if argument.is_empty() {
                PUBLIC_CHANNEL.to_string()
            } else {
                argument.to_string()
            },
        }),
        _ => Err(HELP.to_string()),
    }
}
