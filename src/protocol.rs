//! Binary frame codec shared by the server and every client.
//!
//! A frame is one WebSocket binary message: a discriminant byte followed by a
//! discriminant-specific payload. All length fields are unsigned 8-bit; a
//! field of the form `<len><bytes>` is one length byte N followed by exactly
//! N bytes. Decoders reject malformed frames instead of truncating silently.

use std::fmt;

use thiserror::Error;

/// The virtual recipient naming the public channel. Also reserved: no
/// participant may register under this identifier.
pub const PUBLIC_CHANNEL: &str = "~";

/// Upper bound of every length-prefixed field (one length byte).
pub const MAX_FIELD_LEN: usize = 255;

/// Upper bound of every counted list in a response (one count byte).
pub const MAX_LIST_LEN: usize = 255;

// Client -> server discriminants.
const GET_PARTICIPANTS: u8 = 1;
const PARTICIPANT_INFO: u8 = 2;
const SET_AVAILABILITY: u8 = 3;
const SEND_COMMUNICATION: u8 = 4;
const FETCH_COMMUNICATIONS: u8 = 5;

// Server -> client discriminants.
const FAILURE: u8 = 50;
const PARTICIPANT_LIST: u8 = 51;
const PARTICIPANT_DETAILS: u8 = 52;
const PARTICIPANT_JOINED: u8 = 53;
const AVAILABILITY_UPDATE: u8 = 54;
const COMMUNICATION: u8 = 55;
const COMMUNICATION_HISTORY: u8 = 56;

/// Presence state of a participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Offline,
    Available,
    Busy,
    Away,
}

impl Availability {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Offline),
            1 => Some(Self::Available),
            2 => Some(Self::Busy),
            3 => Some(Self::Away),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            Self::Offline => 0,
            Self::Available => 1,
            Self::Busy => 2,
            Self::Away => 3,
        }
    }
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Offline => write!(f, "offline"),
            Self::Available => write!(f, "available"),
            Self::Busy => write!(f, "busy"),
            Self::Away => write!(f, "away"),
        }
    }
}

/// Reason byte carried by a `FAILURE` frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    UnknownParticipant,
    InvalidAvailability,
    EmptyCommunication,
    UnavailableParticipant,
}

impl FailureReason {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::UnknownParticipant),
            2 => Some(Self::InvalidAvailability),
            3 => Some(Self::EmptyCommunication),
            4 => Some(Self::UnavailableParticipant),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            Self::UnknownParticipant => 1,
            Self::InvalidAvailability => 2,
            Self::EmptyCommunication => 3,
            Self::UnavailableParticipant => 4,
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownParticipant => write!(f, "unknown participant"),
            Self::InvalidAvailability => write!(f, "invalid availability"),
            Self::EmptyCommunication => write!(f, "empty communication"),
            Self::UnavailableParticipant => write!(f, "participant unavailable"),
        }
    }
}

/// Structural decode failure. Frames that fail to decode are dropped by the
/// receiver; the session continues.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("empty frame")]
    Empty,
    #[error("unknown discriminant {0}")]
    UnknownDiscriminant(u8),
    #[error("frame truncated: {declared} bytes declared, {remaining} remaining")]
    Truncated { declared: usize, remaining: usize },
    #[error("string field is not valid utf-8")]
    InvalidUtf8,
    #[error("field value {0} out of range")]
    InvalidValue(u8),
}

/// One entry of a `PARTICIPANT_LIST` frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub identifier: String,
    pub availability: Availability,
}

/// One entry of a `COMMUNICATION_HISTORY` frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub sender: String,
    pub content: String,
}

/// A request frame, client to server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientRequest {
    ListParticipants,
    ParticipantInfo { target: String },
    /// The status byte is carried raw; whether it names a settable
    /// availability is a semantic question for the server.
    SetAvailability { target: String, status: u8 },
    SendCommunication { recipient: String, content: String },
    FetchCommunications { channel: String },
}

impl ClientRequest {
    pub fn decode(frame: &[u8]) -> Result<Self, FrameError> {
        let mut reader = Reader::new(frame);
        let discriminant = reader.byte().map_err(|_| FrameError::Empty)?;
        match discriminant {
            GET_PARTICIPANTS => Ok(Self::ListParticipants),
            PARTICIPANT_INFO => Ok(Self::ParticipantInfo {
                target: reader.string()?,
            }),
            SET_AVAILABILITY => {
                let target = reader.string()?;
                let status = reader.byte()?;
                Ok(Self::SetAvailability { target, status })
            }
            SEND_COMMUNICATION => {
                let recipient = reader.string()?;
                let content = reader.string()?;
                Ok(Self::SendCommunication { recipient, content })
            }
            FETCH_COMMUNICATIONS => Ok(Self::FetchCommunications {
                channel: reader.string()?,
            }),
            other => Err(FrameError::UnknownDiscriminant(other)),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::ListParticipants => vec![GET_PARTICIPANTS],
            Self::ParticipantInfo { target } => {
                let mut frame = vec![PARTICIPANT_INFO];
                push_str(&mut frame, target);
                frame
            }
            Self::SetAvailability { target, status } => {
                let mut frame = vec![SET_AVAILABILITY];
                push_str(&mut frame, target);
                frame.push(*status);
                frame
            }
            Self::SendCommunication { recipient, content } => {
                let mut frame = vec![SEND_COMMUNICATION];
                push_str(&mut frame, recipient);
                push_str(&mut frame, content);
                frame
            }
            Self::FetchCommunications { channel } => {
                let mut frame = vec![FETCH_COMMUNICATIONS];
                push_str(&mut frame, channel);
                frame
            }
        }
    }
}

/// A response or notification frame, server to client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    Failure {
        reason: FailureReason,
    },
    ParticipantList {
        entries: Vec<RosterEntry>,
    },
    ParticipantDetails {
        identifier: String,
        availability: Availability,
    },
    ParticipantJoined {
        identifier: String,
    },
    AvailabilityUpdate {
        identifier: String,
        availability: Availability,
    },
    Communication {
        sender: String,
        content: String,
    },
    CommunicationHistory {
        entries: Vec<HistoryEntry>,
    },
}

impl ServerEvent {
    pub fn decode(frame: &[u8]) -> Result<Self, FrameError> {
        let mut reader = Reader::new(frame);
        let discriminant = reader.byte().map_err(|_| FrameError::Empty)?;
        match discriminant {
            FAILURE => {
                let byte = reader.byte()?;
                let reason =
                    FailureReason::from_byte(byte).ok_or(FrameError::InvalidValue(byte))?;
                Ok(Self::Failure { reason })
            }
            PARTICIPANT_LIST => {
                let count = reader.byte()?;
                let mut entries = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    let identifier = reader.string()?;
                    entries.push(RosterEntry {
                        identifier,
                        availability: reader.availability()?,
                    });
                }
                Ok(Self::ParticipantList { entries })
            }
            PARTICIPANT_DETAILS => {
                let identifier = reader.string()?;
                Ok(Self::ParticipantDetails {
                    identifier,
                    availability: reader.availability()?,
                })
            }
            PARTICIPANT_JOINED => {
                let identifier = reader.string()?;
                // Joined frames always carry status byte 1.
                reader.availability()?;
                Ok(Self::ParticipantJoined { identifier })
            }
            AVAILABILITY_UPDATE => {
                let identifier = reader.string()?;
                Ok(Self::AvailabilityUpdate {
                    identifier,
                    availability: reader.availability()?,
                })
            }
            COMMUNICATION => {
                let sender = reader.string()?;
                let content = reader.string()?;
                Ok(Self::Communication { sender, content })
            }
            COMMUNICATION_HISTORY => {
                let count = reader.byte()?;
                let mut entries = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    let sender = reader.string()?;
                    let content = reader.string()?;
                    entries.push(HistoryEntry { sender, content });
                }
                Ok(Self::CommunicationHistory { entries })
            }
            other => Err(FrameError::UnknownDiscriminant(other)),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Failure { reason } => vec![FAILURE, reason.as_byte()],
            Self::ParticipantList { entries } => {
                let count = entries.len().min(MAX_LIST_LEN);
                let mut frame = vec![PARTICIPANT_LIST, count as u8];
                for entry in &entries[..count] {
                    push_str(&mut frame, &entry.identifier);
                    frame.push(entry.availability.as_byte());
                }
                frame
            }
            Self::ParticipantDetails {
                identifier,
                availability,
            } => {
                let mut frame = vec![PARTICIPANT_DETAILS];
                push_str(&mut frame, identifier);
                frame.push(availability.as_byte());
                frame
            }
            Self::ParticipantJoined { identifier } => {
                let mut frame = vec![PARTICIPANT_JOINED];
                push_str(&mut frame, identifier);
                frame.push(Availability::Available.as_byte());
                frame
            }
            Self::AvailabilityUpdate {
                identifier,
                availability,
            } => {
                let mut frame = vec![AVAILABILITY_UPDATE];
                push_str(&mut frame, identifier);
                frame.push(availability.as_byte());
                frame
            }
            Self::Communication { sender, content } => {
                let mut frame = vec![COMMUNICATION];
                push_str(&mut frame, sender);
                push_str(&mut frame, content);
                frame
            }
            Self::CommunicationHistory { entries } => {
                let count = entries.len().min(MAX_LIST_LEN);
                let mut frame = vec![COMMUNICATION_HISTORY, count as u8];
                for entry in &entries[..count] {
                    push_str(&mut frame, &entry.sender);
                    push_str(&mut frame, &entry.content);
                }
                frame
            }
        }
    }
}

/// Append a `<len><bytes>` field, capping at [`MAX_FIELD_LEN`] bytes on a
/// char boundary.
fn push_str(frame: &mut Vec<u8>, value: &str) {
    let mut end = value.len().min(MAX_FIELD_LEN);
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    frame.push(end as u8);
    frame.extend_from_slice(&value.as_bytes()[..end]);
}

struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn byte(&mut self) -> Result<u8, FrameError> {
        let (&byte, rest) = self.buf.split_first().ok_or(FrameError::Truncated {
            declared: 1,
            remaining: 0,
        })?;
        self.buf = rest;
        Ok(byte)
    }

    fn string(&mut self) -> Result<String, FrameError> {
        let declared = self.byte()? as usize;
        if self.buf.len() < declared {
            return Err(FrameError::Truncated {
                declared,
                remaining: self.buf.len(),
            });
        }
        let (bytes, rest) = self.buf.split_at(declared);
        self.buf = rest;
        String::from_utf8(bytes.to_vec()).map_err(|_| FrameError::InvalidUtf8)
    }

    fn availability(&mut self) -> Result<Availability, FrameError> {
        let byte = self.byte()?;
        Availability::from_byte(byte).ok_or(FrameError::InvalidValue(byte))
    }
}
