//! Run configuration of the clients.
//!
//! A [`ClientConfiguration`] is built once, from the command line ([`crate::options`]), from a
//! TOML file or by embedding code, and it is read-only afterwards. Every client instance shares
//! it by reference.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use amqp_engine::{Endpoint, Value};
use anyhow::Result;
use serde::Deserialize;
use url::{Host, Url};

use crate::client_error;
use crate::error::ErrorKind;
use crate::model::{MessageFormat, ObjectControl, ReceiverAction, ReleaseAction};

pub const DEFAULT_PORT: u16 = 5672;

/// The client role a configuration is validated for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Sender,
    Receiver,
    Connector,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ClientConfiguration {
    pub connection: ConnectionConfig,
    pub address: String,
    /// Number of messages to send or receive, number of connections for the connector.
    pub count: u64,
    /// Spread the sends or credit grants evenly over this period.
    #[serde(with = "millis")]
    pub duration: Duration,
    /// Idle timeout, zero means no timeout.
    #[serde(with = "millis")]
    pub timeout: Duration,
    /// Grace period between deciding to close and closing.
    #[serde(with = "millis")]
    pub close_sleep: Duration,
    /// Durable terminus of the link.
    pub durable: bool,
    pub log_msgs: Option<MessageFormat>,
    pub link_at_most_once: bool,
    pub link_at_least_once: bool,
    pub sender: SenderConfig,
    pub receiver: ReceiverConfig,
    pub connector: ConnectorConfig,
}

impl Default for ClientConfiguration {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            address: "examples".to_owned(),
            count: 1,
            duration: Duration::ZERO,
            timeout: Duration::ZERO,
            close_sleep: Duration::ZERO,
            durable: false,
            log_msgs: None,
            link_at_most_once: false,
            link_at_least_once: false,
            sender: SenderConfig::default(),
            receiver: ReceiverConfig::default(),
            connector: ConnectorConfig::default(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// `[scheme://][user[:password]@]host[:port]`
    pub broker: String,
    /// Comma separated failover brokers, tried after the primary one.
    pub conn_urls: Option<String>,
    pub reconnect: ReconnectConfig,
    #[serde(with = "millis")]
    pub heartbeat: Duration,
    pub frame_size: Option<u32>,
    pub tls: TlsConfig,
    pub websocket: WebSocketConfig,
    pub properties: BTreeMap<String, Value>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            broker: format!("localhost:{DEFAULT_PORT}"),
            conn_urls: None,
            reconnect: ReconnectConfig::default(),
            heartbeat: Duration::ZERO,
            frame_size: None,
            tls: TlsConfig::default(),
            websocket: WebSocketConfig::default(),
            properties: BTreeMap::new(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub enabled: bool,
    /// Number of disconnects after which the client gives up.
    pub limit: Option<u32>,
    #[serde(with = "millis::option")]
    pub interval: Option<Duration>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            limit: None,
            interval: None,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    pub enabled: bool,
    pub certificate: Option<PathBuf>,
    pub private_key: Option<PathBuf>,
    pub password: Option<String>,
    pub trust_store: Option<PathBuf>,
    pub verify_peer: bool,
    pub verify_peer_name: bool,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct WebSocketConfig {
    pub enabled: bool,
    pub protocols: Vec<String>,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            protocols: vec!["binary".to_owned(), "AMQPWSB10".to_owned(), "amqp".to_owned()],
        }
    }
}

/// Fields of the messages the sender produces.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct MessageConfig {
    pub id: Option<String>,
    pub user_id: Option<String>,
    pub group_id: Option<String>,
    pub group_sequence: Option<u32>,
    pub reply_to_group_id: Option<String>,
    pub subject: Option<String>,
    pub reply_to: Option<String>,
    pub correlation_id: Option<String>,
    pub content_type: Option<String>,
    pub durable: bool,
    pub ttl: Option<u32>,
    pub priority: Option<u8>,
    /// Text body, `%d` is replaced by the zero based index of the message.
    pub content: Option<String>,
    pub list_content: Vec<Value>,
    pub map_content: BTreeMap<String, Value>,
    pub content_from_file: Option<PathBuf>,
    pub properties: BTreeMap<String, Value>,
    pub annotations: BTreeMap<String, Value>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct SenderConfig {
    pub message: MessageConfig,
    /// Close on the settlement of the last delivery instead of its acceptance.
    pub auto_settle_off: bool,
    /// Send through the anonymous relay of the connection.
    pub anonymous: bool,
    pub release_action: ReleaseAction,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ListenConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: DEFAULT_PORT,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    pub action: ReceiverAction,
    pub recv_browse: bool,
    pub selector: Option<String>,
    pub capacity: u32,
    pub process_reply_to: bool,
    pub listen: ListenConfig,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ConnectorConfig {
    pub obj_ctrl: ObjectControl,
    pub sender_count: u32,
    pub receiver_count: u32,
    /// Every sender sends one more message each second until the timeout.
    pub infinite_send: bool,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            obj_ctrl: ObjectControl::default(),
            sender_count: 1,
            receiver_count: 1,
            infinite_send: false,
        }
    }
}

/// Parsed broker string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BrokerUrl {
    pub endpoint: Endpoint,
    pub username: Option<String>,
    pub password: Option<String>,
}

const SCHEMES: [&str; 4] = ["amqp://", "amqps://", "ws://", "wss://"];

/// Parses `[scheme://][user[:password]@]host[:port]`. IPv6 hosts go in brackets.
pub fn parse_broker_url(s: &str) -> Result<BrokerUrl> {
    let trimmed = s.trim();
    let without_scheme = SCHEMES
        .iter()
        .find_map(|scheme| trimmed.strip_prefix(scheme))
        .unwrap_or(trimmed);

    if without_scheme.is_empty() {
        return client_error!(ErrorKind::Configuration, format!("Empty broker address in {s:?}"));
    }

    let url = match Url::parse(&format!("amqp://{without_scheme}")) {
        Ok(url) => url,
        Err(e) => return client_error!(ErrorKind::Configuration, format!("Invalid broker address {s:?}: {e}")),
    };

    let host = match url.host() {
        Some(Host::Domain(d)) if !d.is_empty() => d.to_owned(),
        Some(Host::Ipv4(addr)) => addr.to_string(),
        Some(Host::Ipv6(addr)) => addr.to_string(),
        _ => return client_error!(ErrorKind::Configuration, format!("Missing host in broker address {s:?}")),
    };

    let username = Some(url.username()).filter(|u| !u.is_empty()).map(str::to_owned);
    let password = url.password().map(str::to_owned);

    Ok(BrokerUrl {
        endpoint: Endpoint {
            host,
            port: url.port().unwrap_or(DEFAULT_PORT),
        },
        username,
        password,
    })
}

impl ClientConfiguration {
    /// Loads a configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => return client_error!(ErrorKind::Io, format!("Cannot read {}: {e}", path.display())),
        };

        match toml::from_str(&content) {
            Ok(config) => Ok(config),
            Err(e) => client_error!(ErrorKind::Configuration, format!("Invalid config {}: {e}", path.display())),
        }
    }

    pub fn broker(&self) -> Result<BrokerUrl> {
        parse_broker_url(&self.connection.broker)
    }

    /// The primary broker followed by the failover brokers. Empty if no failover list is
    /// configured.
    pub fn failover_hosts(&self) -> Result<Vec<Endpoint>> {
        let Some(urls) = &self.connection.conn_urls else {
            return Ok(vec![]);
        };

        let mut hosts = vec![self.broker()?.endpoint];

        for item in urls.split(',') {
            hosts.push(parse_broker_url(item)?.endpoint);
        }

        Ok(hosts)
    }

    /// Checks the configuration before any connection attempt.
    pub fn validate(&self, role: Role) -> Result<()> {
        self.broker()?;
        self.failover_hosts()?;

        let tls = &self.connection.tls;

        if (tls.private_key.is_some() || tls.trust_store.is_some()) && tls.certificate.is_none() {
            return client_error!(
                ErrorKind::Configuration,
                "Private key and trust store need a client certificate"
            );
        }

        if self.link_at_most_once && self.link_at_least_once {
            return client_error!(
                ErrorKind::Configuration,
                "Link cannot be at-most-once and at-least-once at the same time"
            );
        }

        let paced = !self.duration.is_zero();

        match role {
            Role::Sender if paced && self.count == 0 => {
                client_error!(ErrorKind::Configuration, "Duration needs a message count")
            }
            Role::Receiver if paced && (self.receiver.recv_browse || self.count == 0) => client_error!(
                ErrorKind::Configuration,
                "Duration cannot be combined with browsing or receiving all messages"
            ),
            _ => Ok(()),
        }
    }
}

/// Serde helpers for durations written as integer milliseconds.
mod millis {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }

    pub mod option {
        use super::*;

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
            Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
        }
    }
}
