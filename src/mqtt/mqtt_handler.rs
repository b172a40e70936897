use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use rumqttc::{
    Client, ConnectReturnCode, Connection, Event, LastWill, MqttOptions, Outgoing, Packet, QoS,
};
use tracing::{debug, info, warn};

use super::config::MqttConfig;
use super::message_manager::{InboundMessage, WillMessage};
use super::{ChannelError, MessageChannel};

/// Capacity of the request queue between client handle and event loop
const REQUEST_CAPACITY: usize = 16;
/// Upper bound of network events handled per inbound pump
const MAX_EVENTS_PER_POLL: usize = 32;
/// How long a clean disconnect may take to flush
const DISCONNECT_FLUSH: Duration = Duration::from_millis(500);

#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

#[derive(Clone, Debug, Default)]
pub struct MqttStatus {
    pub connection_state: ConnectionState,
    pub last_error: Option<String>,
    pub messages_received: usize,
    pub messages_sent: usize,
    pub last_activity: Option<DateTime<Local>>,
}

struct Session {
    client: Client,
    connection: Connection,
}

/// Broker session over rumqttc's blocking client
///
/// rumqttc reconnects on its own when its event loop keeps being polled after
/// an error. This channel drops the session instead, so reconnection stays in
/// the hands of the broker watchdog and always runs the full handshake.
pub struct MqttHandler {
    config: MqttConfig,
    client_id: String,
    session: Option<Session>,
    status: MqttStatus,
}

impl MqttHandler {
    pub fn new(config: MqttConfig, client_id: impl Into<String>) -> Self {
        MqttHandler {
            config,
            client_id: client_id.into(),
            session: None,
            status: MqttStatus::default(),
        }
    }

    pub(crate) fn build_options(&self, will: &WillMessage) -> MqttOptions {
        let mut options = MqttOptions::new(&self.client_id, &self.config.host, self.config.port);
        options
            .set_keep_alive(Duration::from_secs(self.config.keep_alive_secs))
            .set_clean_session(true)
            .set_max_packet_size(
                self.config.max_incoming_packet_size,
                self.config.max_packet_size,
            )
            .set_last_will(LastWill::new(
                &will.topic,
                will.payload.clone(),
                QoS::AtLeastOnce,
                will.retained,
            ));

        if let Some(username) = &self.config.username {
            options.set_credentials(username, self.config.password.clone().unwrap_or_default());
        }
        options
    }

    fn mark_failed(&mut self, error: &ChannelError) {
        self.session = None;
        self.status.connection_state = ConnectionState::Failed;
        self.status.last_error = Some(error.to_string());
    }

    fn drop_session(&mut self, reason: String) {
        warn!("Broker session lost: {}", reason);
        self.session = None;
        self.status.connection_state = ConnectionState::Disconnected;
        self.status.last_error = Some(reason);
    }

    /// Drives the fresh connection until the broker answers the CONNECT
    fn await_connack(connection: &mut Connection, timeout: Duration) -> Result<(), ChannelError> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ChannelError::Timeout);
            }
            match connection.recv_timeout(remaining) {
                Ok(Ok(Event::Incoming(Packet::ConnAck(ack)))) => {
                    return if ack.code == ConnectReturnCode::Success {
                        Ok(())
                    } else {
                        Err(ChannelError::Refused(format!("{:?}", ack.code)))
                    };
                }
                Ok(Ok(event)) => debug!("Handshake event: {:?}", event),
                Ok(Err(e)) => return Err(ChannelError::Connection(e.to_string())),
                Err(_) => return Err(ChannelError::Timeout),
            }
        }
    }
}

impl MessageChannel for MqttHandler {
    fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    fn connect(&mut self, will: &WillMessage) -> Result<(), ChannelError> {
        if let (ConnectionState::Failed | ConnectionState::Disconnected, Some(reason)) =
            (self.status.connection_state, &self.status.last_error)
        {
            info!("Reconnecting, previous session ended with: {}", reason);
        }
        self.session = None;
        self.status.connection_state = ConnectionState::Connecting;
        info!(
            "Connecting to broker {}:{} as {}",
            self.config.host, self.config.port, self.client_id
        );

        let (client, mut connection) = Client::new(self.build_options(will), REQUEST_CAPACITY);
        let timeout = Duration::from_millis(self.config.connect_timeout_ms);

        if let Err(e) = Self::await_connack(&mut connection, timeout) {
            self.mark_failed(&e);
            return Err(e);
        }

        self.session = Some(Session { client, connection });
        self.status.connection_state = ConnectionState::Connected;
        self.status.last_error = None;
        self.status.last_activity = Some(Local::now());
        Ok(())
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), ChannelError> {
        let session = self.session.as_ref().ok_or(ChannelError::NotConnected)?;
        session.client.try_subscribe(topic, QoS::AtLeastOnce)?;
        Ok(())
    }

    fn publish(&mut self, topic: &str, payload: &[u8], retained: bool) -> Result<(), ChannelError> {
        let session = self.session.as_ref().ok_or(ChannelError::NotConnected)?;
        let qos = if retained {
            QoS::AtLeastOnce
        } else {
            QoS::AtMostOnce
        };
        session
            .client
            .try_publish(topic, qos, retained, payload.to_vec())?;
        self.status.messages_sent += 1;
        self.status.last_activity = Some(Local::now());
        Ok(())
    }

    fn poll_inbound(&mut self) -> Vec<InboundMessage> {
        let window = Duration::from_millis(self.config.poll_timeout_ms);
        let Some(session) = self.session.as_mut() else {
            return Vec::new();
        };

        let mut inbound = Vec::new();
        let mut lost = None;
        for _ in 0..MAX_EVENTS_PER_POLL {
            match session.connection.recv_timeout(window) {
                Ok(Ok(Event::Incoming(Packet::Publish(publish)))) => {
                    inbound.push(InboundMessage::from_topic(
                        publish.topic,
                        publish.payload.to_vec(),
                    ));
                }
                Ok(Ok(Event::Incoming(Packet::Disconnect))) => {
                    lost = Some("broker sent DISCONNECT".to_string());
                    break;
                }
                Ok(Ok(event)) => debug!("MQTT event: {:?}", event),
                Ok(Err(e)) => {
                    lost = Some(e.to_string());
                    break;
                }
                Err(_) => break,
            }
        }

        if !inbound.is_empty() {
            self.status.messages_received += inbound.len();
            self.status.last_activity = Some(Local::now());
        }
        if let Some(reason) = lost {
            self.drop_session(reason);
        }
        inbound
    }

    fn disconnect(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        if let Err(e) = session.client.try_disconnect() {
            warn!("Could not queue DISCONNECT: {}", e);
        }

        // Pending publishes are queued ahead of the DISCONNECT and go out first
        let deadline = Instant::now() + DISCONNECT_FLUSH;
        while Instant::now() < deadline {
            match session.connection.recv_timeout(DISCONNECT_FLUSH) {
                Ok(Ok(Event::Outgoing(Outgoing::Disconnect))) => break,
                Ok(Ok(_)) => continue,
                _ => break,
            }
        }

        self.status.connection_state = ConnectionState::Disconnected;
        let last_activity = self
            .status
            .last_activity
            .map(|at| at.format("%H:%M:%S").to_string())
            .unwrap_or_else(|| "never".to_string());
        info!(
            "Broker session closed ({} sent, {} received, last activity {})",
            self.status.messages_sent, self.status.messages_received, last_activity
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    fn will() -> WillMessage {
        WillMessage {
            topic: "lab/room1/sys/online".to_string(),
            payload: br#"{"status":"disconnected","online":false}"#.to_vec(),
            retained: true,
        }
    }

    #[test]
    fn options_carry_will_and_tuning() {
        let handler = MqttHandler::new(MqttConfig::default(), "roomnode_001");
        let options = handler.build_options(&will());

        assert_eq!(options.client_id(), "roomnode_001");
        assert_eq!(
            options.broker_address(),
            ("broker.hivemq.com".to_string(), 1883)
        );
        assert_eq!(options.keep_alive(), Duration::from_secs(30));

        let last_will = options.last_will().expect("will registered");
        assert_eq!(last_will.topic, "lab/room1/sys/online");
        assert_eq!(&last_will.message[..], &will().payload[..]);
        assert_eq!(last_will.qos, QoS::AtLeastOnce);
        assert!(last_will.retain);
    }

    #[test]
    fn starts_disconnected_and_refuses_publish() {
        let mut handler = MqttHandler::new(MqttConfig::default(), "node");
        assert!(!handler.is_connected());
        assert!(matches!(
            handler.publish("a/b", b"{}", false),
            Err(ChannelError::NotConnected)
        ));
        assert!(handler.poll_inbound().is_empty());
        assert_eq!(
            handler.status.connection_state,
            ConnectionState::Disconnected
        );
    }

    const COMMAND_TOPIC: &str = "lab/room1/device/cmd";

    fn publish_packet(topic: &str, payload: &[u8]) -> Vec<u8> {
        let mut remaining = 2 + topic.len() + payload.len();
        let mut packet = vec![0x30];
        loop {
            let mut byte = (remaining % 128) as u8;
            remaining /= 128;
            if remaining > 0 {
                byte |= 0x80;
            }
            packet.push(byte);
            if remaining == 0 {
                break;
            }
        }
        packet.extend_from_slice(&(topic.len() as u16).to_be_bytes());
        packet.extend_from_slice(topic.as_bytes());
        packet.extend_from_slice(payload);
        packet
    }

    /// Local broker that accepts one client, acknowledges it and pushes a
    /// single QoS 0 publish of `payload_len` bytes on the command topic
    fn broker_pushing(payload_len: usize) -> (u16, thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let broker = thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).unwrap();
            socket.write_all(&[0x20, 0x02, 0x00, 0x00]).unwrap();
            socket
                .write_all(&publish_packet(COMMAND_TOPIC, &vec![b'x'; payload_len]))
                .unwrap();
            socket
                .set_read_timeout(Some(Duration::from_secs(2)))
                .unwrap();
            while matches!(socket.read(&mut buf), Ok(n) if n > 0) {}
        });
        (port, broker)
    }

    fn receive_from_local_broker(payload_len: usize) -> (bool, Vec<InboundMessage>) {
        let (port, broker) = broker_pushing(payload_len);
        let config = MqttConfig {
            host: "127.0.0.1".to_string(),
            port,
            connect_timeout_ms: 2000,
            poll_timeout_ms: 50,
            ..MqttConfig::default()
        };
        let mut handler = MqttHandler::new(config, "roomnode_001");
        handler.connect(&will()).unwrap();

        let mut delivered = Vec::new();
        for _ in 0..40 {
            delivered.extend(handler.poll_inbound());
            if !delivered.is_empty() || !handler.is_connected() {
                break;
            }
        }
        let connected = handler.is_connected();
        drop(handler);
        broker.join().unwrap();
        (connected, delivered)
    }

    #[test]
    fn small_inbound_message_is_delivered() {
        let (connected, delivered) = receive_from_local_broker(100);
        assert!(connected);
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].topic, COMMAND_TOPIC);
    }

    #[test]
    fn inbound_message_above_command_limit_keeps_session() {
        let (connected, delivered) = receive_from_local_broker(600);
        assert!(connected, "oversized inbound message ended the session");
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].payload.len(), 600);
    }
}
