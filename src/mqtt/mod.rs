//! # MQTT Integration Module
//!
//! Broker-facing side of the agent. The device logic only sees the
//! [`MessageChannel`] trait; the rumqttc-backed implementation lives in
//! [`mqtt_handler`].
//!
//! ## Module Architecture
//!
//! ```text
//! mqtt/
//! ├── config.rs           - Broker address, credentials and transport tuning
//! ├── message_manager.rs  - Inbound message and last-will records
//! ├── mqtt_handler.rs     - Session lifecycle over rumqttc's blocking client
//! └── topics.rs           - Channel names derived from the namespace
//! ```
//!
//! ## Session Semantics
//!
//! - A session is established only through [`MessageChannel::connect`], which
//!   always registers a last will.
//! - Publishing without a session fails with [`ChannelError::NotConnected`];
//!   nothing is queued for later.
//! - A transport error ends the session. Reconnection is the caller's job.

pub mod config;
pub mod message_manager;
pub mod mqtt_handler;
pub mod topics;

pub use message_manager::{InboundMessage, WillMessage};
pub use topics::TopicSet;

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("No broker session")]
    NotConnected,

    #[error("Broker refused connection: {0}")]
    Refused(String),

    #[error("Broker did not answer in time")]
    Timeout,

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Client request failed: {0}")]
    Client(#[from] rumqttc::ClientError),
}

/// Publish/subscribe session with a broker
pub trait MessageChannel: Send {
    /// Whether a session is currently established
    fn is_connected(&self) -> bool;

    /// Establish a new session, registering `will` with the broker
    fn connect(&mut self, will: &WillMessage) -> Result<(), ChannelError>;

    fn subscribe(&mut self, topic: &str) -> Result<(), ChannelError>;

    fn publish(&mut self, topic: &str, payload: &[u8], retained: bool) -> Result<(), ChannelError>;

    /// Drive network I/O and hand back everything received since the last call
    fn poll_inbound(&mut self) -> Vec<InboundMessage>;

    /// Close the session cleanly so the broker discards the will
    fn disconnect(&mut self);
}
