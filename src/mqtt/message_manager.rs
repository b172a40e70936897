use chrono::{DateTime, Local};
use std::fmt;

const PREVIEW_CHARS: usize = 64;

/// Message received from the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub received_at: DateTime<Local>,
}

impl InboundMessage {
    pub fn from_topic(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        InboundMessage {
            topic: topic.into(),
            payload: payload.into(),
            received_at: Local::now(),
        }
    }

    /// Payload as text, shortened for log lines
    pub fn preview(&self) -> String {
        let text = String::from_utf8_lossy(&self.payload);
        if text.chars().count() > PREVIEW_CHARS {
            let cut: String = text.chars().take(PREVIEW_CHARS).collect();
            format!("{}...", cut)
        } else {
            text.into_owned()
        }
    }
}

impl fmt::Display for InboundMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.received_at.format("%H:%M:%S%.3f"),
            self.topic,
            self.preview()
        )
    }
}

/// Last-will registration for a broker session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WillMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub retained: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_truncates_long_payloads() {
        let msg = InboundMessage::from_topic("ns/device/cmd", vec![b'a'; 100]);
        let preview = msg.preview();
        assert!(preview.ends_with("..."));
        assert_eq!(preview.len(), PREVIEW_CHARS + 3);
    }

    #[test]
    fn preview_keeps_short_payloads() {
        let msg = InboundMessage::from_topic("ns/device/cmd", r#"{"fan":"on"}"#);
        assert_eq!(msg.preview(), r#"{"fan":"on"}"#);
    }
}
