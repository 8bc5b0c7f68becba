//! Framed control-plane messages.
//!
//! A frame is the NUL-joined sequence
//! `sender\0recipient\0header\0data0\0…\0priority\0identity\0` with a
//! trailing NUL and no escaping; NUL is the sole framing byte, so field
//! contents must never contain it. The numeric tail is decimal ASCII.
//!
//! Identities are stamped from a process-wide monotonic counter at
//! construction and are what correlates a `response` frame with the request
//! that caused it.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;

/// Process-wide identity counter. Starts at zero, never resets.
static NEXT_IDENTITY: AtomicU64 = AtomicU64::new(0);

fn next_identity() -> u64 {
    NEXT_IDENTITY.fetch_add(1, Ordering::Relaxed)
}

/// Errors produced while parsing a raw frame.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// The frame does not end with the terminating NUL.
    #[error("frame is not NUL-terminated")]
    Unterminated,
    /// The frame is not valid UTF-8.
    #[error("frame is not valid UTF-8")]
    InvalidUtf8,
    /// Fewer than the five mandatory tokens (sender, recipient, header,
    /// priority, identity) are present.
    #[error("frame has {0} token(s), expected at least 5")]
    TooFewTokens(usize),
    /// One of the two trailing numeric tokens failed to parse.
    #[error("frame {field} token {token:?} is not numeric")]
    NonNumeric {
        field: &'static str,
        token: String,
    },
    /// A field contains the framing delimiter and cannot be serialized.
    #[error("{field} contains an embedded NUL byte")]
    EmbeddedNul { field: &'static str },
}

/// An immutable control-plane message.
///
/// `priority` is carried in the frame but is informational; the transport's
/// queue priority is authoritative for delivery order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub sender_name: String,
    pub recipient_name: String,
    pub header: String,
    pub data: Vec<String>,
    pub priority: u32,
    pub identity: u64,
}

impl Message {
    /// Build a message, stamping a fresh identity from the process-wide
    /// counter.
    pub fn new(
        sender_name: impl Into<String>,
        recipient_name: impl Into<String>,
        header: impl Into<String>,
        data: Vec<String>,
        priority: u32,
    ) -> Self {
        Self {
            sender_name: sender_name.into(),
            recipient_name: recipient_name.into(),
            header: header.into(),
            data,
            priority,
            identity: next_identity(),
        }
    }

    /// Build a message carrying an explicit identity. Used when composing a
    /// `response` frame (which must echo the request's identity) and by
    /// `deserialize`.
    pub fn with_identity(
        sender_name: impl Into<String>,
        recipient_name: impl Into<String>,
        header: impl Into<String>,
        data: Vec<String>,
        priority: u32,
        identity: u64,
    ) -> Self {
        Self {
            sender_name: sender_name.into(),
            recipient_name: recipient_name.into(),
            header: header.into(),
            data,
            priority,
            identity,
        }
    }

    /// Compose the reply to this message: sender and recipient swapped,
    /// the given header and data, same priority, same identity.
    pub fn reply(&self, header: impl Into<String>, data: Vec<String>) -> Self {
        Self::with_identity(
            self.recipient_name.clone(),
            self.sender_name.clone(),
            header,
            data,
            self.priority,
            self.identity,
        )
    }

    /// Check every field for the framing delimiter.
    ///
    /// Data entries may be empty, but no field may contain NUL; senders
    /// reject such messages before framing.
    pub fn validate(&self) -> Result<(), FrameError> {
        for (field, value) in [
            ("sender_name", &self.sender_name),
            ("recipient_name", &self.recipient_name),
            ("header", &self.header),
        ] {
            if value.contains('\0') {
                return Err(FrameError::EmbeddedNul { field });
            }
        }
        if self.data.iter().any(|d| d.contains('\0')) {
            return Err(FrameError::EmbeddedNul { field: "data" });
        }
        Ok(())
    }

    /// Serialize to the NUL-framed wire form.
    pub fn serialize(&self) -> Vec<u8> {
        let mut frame = Vec::with_capacity(self.frame_len());
        for field in [&self.sender_name, &self.recipient_name, &self.header] {
            frame.extend_from_slice(field.as_bytes());
            frame.push(0);
        }
        for datum in &self.data {
            frame.extend_from_slice(datum.as_bytes());
            frame.push(0);
        }
        frame.extend_from_slice(self.priority.to_string().as_bytes());
        frame.push(0);
        frame.extend_from_slice(self.identity.to_string().as_bytes());
        frame.push(0);
        frame
    }

    /// Parse a raw frame. `deserialize(serialize(m)) == m` for every
    /// well-formed `m`.
    pub fn deserialize(raw: &[u8]) -> Result<Self, FrameError> {
        let Some((&0, body)) = raw.split_last() else {
            return Err(FrameError::Unterminated);
        };
        let text = std::str::from_utf8(body).map_err(|_| FrameError::InvalidUtf8)?;
        let tokens: Vec<&str> = text.split('\0').collect();
        if tokens.len() < 5 {
            return Err(FrameError::TooFewTokens(tokens.len()));
        }

        let priority_token = tokens[tokens.len() - 2];
        let identity_token = tokens[tokens.len() - 1];
        let priority = priority_token
            .parse::<u32>()
            .map_err(|_| FrameError::NonNumeric {
                field: "priority",
                token: priority_token.to_owned(),
            })?;
        let identity = identity_token
            .parse::<u64>()
            .map_err(|_| FrameError::NonNumeric {
                field: "identity",
                token: identity_token.to_owned(),
            })?;

        Ok(Self {
            sender_name: tokens[0].to_owned(),
            recipient_name: tokens[1].to_owned(),
            header: tokens[2].to_owned(),
            data: tokens[3..tokens.len() - 2]
                .iter()
                .map(|t| (*t).to_owned())
                .collect(),
            priority,
            identity,
        })
    }

    fn frame_len(&self) -> usize {
        self.sender_name.len()
            + self.recipient_name.len()
            + self.header.len()
            + self.data.iter().map(String::len).sum::<usize>()
            // numeric tail upper bound + one NUL per field
            + 40
            + self.data.len()
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{\"sender_name\": \"{}\", \"recipient_name\": \"{}\", \"header\": \"{}\", \"data\": [",
            self.sender_name, self.recipient_name, self.header
        )?;
        for (i, datum) in self.data.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "\"{datum}\"")?;
        }
        write!(
            f,
            "], \"priority\": {}, \"identity\": {}}}",
            self.priority, self.identity
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Message {
        Message::new(
            "motor_controller",
            "marshal",
            "set",
            vec!["torque".to_owned(), "7".to_owned()],
            2,
        )
    }

    #[test]
    fn round_trip_identity() {
        let message = sample();
        let parsed = Message::deserialize(&message.serialize()).unwrap();
        assert_eq!(parsed, message);
    }

    #[test]
    fn round_trip_preserves_empty_data_entries() {
        let message = Message::new(
            "a",
            "b",
            "set",
            vec![String::new(), "v".to_owned(), String::new()],
            0,
        );
        let parsed = Message::deserialize(&message.serialize()).unwrap();
        assert_eq!(parsed.data, message.data);
    }

    #[test]
    fn round_trip_with_no_data() {
        let message = Message::new("a", "b", "status", vec![], 0);
        let parsed = Message::deserialize(&message.serialize()).unwrap();
        assert_eq!(parsed, message);
    }

    /// The documented example frame: decimal "0" and "3" in the numeric tail.
    #[test]
    fn serializes_known_frame() {
        let message = Message::with_identity(
            "a",
            "b",
            "set",
            vec!["k".to_owned(), "v".to_owned()],
            0,
            3,
        );
        assert_eq!(message.serialize(), b"a\0b\0set\0k\0v\x000\x003\0");
        assert_eq!(Message::deserialize(b"a\0b\0set\0k\0v\x000\x003\0").unwrap(), message);
    }

    #[test]
    fn identities_are_strictly_increasing() {
        let first = Message::new("a", "b", "status", vec![], 0);
        let second = Message::new("a", "b", "status", vec![], 0);
        let third = Message::new("a", "b", "status", vec![], 0);
        assert!(first.identity < second.identity);
        assert!(second.identity < third.identity);
    }

    #[test]
    fn reply_swaps_endpoints_and_keeps_identity() {
        let request = sample();
        let response = request.reply("response", vec!["ok".to_owned()]);
        assert_eq!(response.sender_name, "marshal");
        assert_eq!(response.recipient_name, "motor_controller");
        assert_eq!(response.identity, request.identity);
        assert_eq!(response.priority, request.priority);
    }

    #[test]
    fn rejects_unterminated_frame() {
        assert_eq!(
            Message::deserialize(b"a\0b\0set\x000\x003"),
            Err(FrameError::Unterminated)
        );
        assert_eq!(Message::deserialize(b""), Err(FrameError::Unterminated));
    }

    #[test]
    fn rejects_short_frame() {
        assert_eq!(
            Message::deserialize(b"a\0b\0set\0"),
            Err(FrameError::TooFewTokens(3))
        );
    }

    #[test]
    fn rejects_non_numeric_tail() {
        let err = Message::deserialize(b"a\0b\0set\0k\0x\0y\0").unwrap_err();
        assert_eq!(
            err,
            FrameError::NonNumeric {
                field: "priority",
                token: "x".to_owned()
            }
        );
    }

    #[test]
    fn validate_rejects_embedded_nul() {
        let mut message = sample();
        message.data.push("bad\0datum".to_owned());
        assert_eq!(
            message.validate(),
            Err(FrameError::EmbeddedNul { field: "data" })
        );
    }

    #[test]
    fn display_renders_log_form() {
        let message = Message::with_identity(
            "a",
            "b",
            "get",
            vec!["speed".to_owned()],
            1,
            9,
        );
        assert_eq!(
            message.to_string(),
            "{\"sender_name\": \"a\", \"recipient_name\": \"b\", \"header\": \"get\", \
             \"data\": [\"speed\"], \"priority\": 1, \"identity\": 9}"
        );
    }
}
