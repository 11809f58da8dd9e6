//! Rendering of server frames for terminal display.

use crate::protocol::{Availability, HistoryEntry, RosterEntry, ServerEvent};

const BANNER: &str = "============================================================";

/// Formats decoded server events for the terminal.
pub struct Formatter;

impl Formatter {
    /// Render one server event. `own_identifier` marks the local participant
    /// in rosters.
    pub fn render(event: &ServerEvent, own_identifier: &str) -> String {
        match event {
            ServerEvent::Failure { reason } => format!("\n! request failed: {reason}\n"),
            ServerEvent::ParticipantList { entries } => {
                Self::render_roster(entries, own_identifier)
            }
            ServerEvent::ParticipantDetails {
                identifier,
                availability,
            } => format!("\n{identifier} is {availability}\n"),
            ServerEvent::ParticipantJoined { identifier } => {
                format!("\n+ {identifier} joined\n")
            }
            ServerEvent::AvailabilityUpdate {
                identifier,
                availability,
            } => match availability {
                Availability::Offline => format!("\n- {identifier} went offline\n"),
                _ => format!("\n~ {identifier} is now {availability}\n"),
            },
            ServerEvent::Communication { sender, content } => {
                format!("\n@{sender}: {content}\n")
            }
            ServerEvent::CommunicationHistory { entries } => Self::render_history(entries),
        }
    }

    fn render_roster(entries: &[RosterEntry], own_identifier: &str) -> String {
        let mut output = String::new();
        output.push_str(&format!("\n{BANNER}\nParticipants:\n"));
        if entries.is_empty() {
            output.push_str("(nobody connected)\n");
        } else {
            for entry in entries {
                let me_suffix = if entry.identifier == own_identifier {
                    " (me)"
                } else {
                    ""
                };
                output.push_str(&format!(
                    "{}{} - {}\n",
                    entry.identifier, me_suffix, entry.availability
                ));
            }
        }
        output.push_str(&format!("{BANNER}\n"));
        output
    }

    fn render_history(entries: &[HistoryEntry]) -> String {
        let mut output = String::new();
        output.push_str(&format!("\n{BANNER}\nHistory:\n"));
        if entries.is_empty() {
            output.push_str("(no communications)\n");
        } else {
            for entry in entries {
                output.push_str(&format!("@{}: {}\n", entry.sender, entry.content));
            }
        }
        output.push_str(&format!("{BANNER}\n"));
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::FailureReason;

    #[test]
    fn roster_marks_the_local_participant() {
        let event = ServerEvent::ParticipantList {
            entries: vec![
                RosterEntry {
                    identifier: "alice".into(),
                    availability: Availability::Available,
                },
                RosterEntry {
                    identifier: "bob".into(),
                    availability: Availability::Busy,
                },
            ],
        };

        let rendered = Formatter::render(&event, "alice");

        assert!(rendered.contains("alice (me) - available"));
        assert!(rendered.contains("bob - busy"));
    }

    #[test]
    fn empty_roster_says_so() {
        let event = ServerEvent::ParticipantList { entries: vec![] };

        let rendered = Formatter::render(&event, "alice");

        assert!(rendered.contains("(nobody connected)"));
    }

    #[test]
    fn offline_update_renders_as_departure() {
        let event = ServerEvent::AvailabilityUpdate {
            identifier: "bob".into(),
            availability: Availability::Offline,
        };

        assert!(Formatter::render(&event, "alice").contains("- bob went offline"));
    }

    #[test]
    fn communication_shows_sender_and_content() {
        let event = ServerEvent::Communication {
            sender: "bob".into(),
            content: "hello".into(),
        };

        assert!(Formatter::render(&event, "alice").contains("@bob: hello"));
    }

    #[test]
    fn failure_renders_its_reason() {
        let event = ServerEvent::Failure {
            reason: FailureReason::UnavailableParticipant,
        };

        assert!(Formatter::render(&event, "alice").contains("participant unavailable"));
    }
}
