use serde::{Deserialize, Serialize};

/// Broker connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    /// Defaults to the device id when unset
    pub client_id: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive_secs: u64,
    /// Upper bound for outgoing packets in bytes
    pub max_packet_size: usize,
    /// Upper bound for incoming packets in bytes. Exceeding it ends the
    /// session, so it must stay well above the command size limit.
    pub max_incoming_packet_size: usize,
    /// How long a connect handshake may block the loop
    pub connect_timeout_ms: u64,
    /// How long each inbound pump waits for network events
    pub poll_timeout_ms: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "broker.hivemq.com".to_string(),
            port: 1883,
            client_id: None,
            username: None,
            password: None,
            keep_alive_secs: 30,
            max_packet_size: 512,
            max_incoming_packet_size: 10 * 1024,
            connect_timeout_ms: 5000,
            poll_timeout_ms: 2,
        }
    }
}
