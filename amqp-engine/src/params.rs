use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::message::Value;

/// A host and port pair to connect to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_owned(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Called by the engine before every connection attempt (the first one and every reconnect) to
/// decide where to connect.
pub type FailoverResolver = Arc<dyn Fn() -> Endpoint + Send + Sync>;

/// Where the engine should connect.
#[derive(Clone)]
pub enum ConnectionDetails {
    Static(Endpoint),
    Failover(FailoverResolver),
    WebSocket { url: String, protocols: Vec<String> },
}

impl fmt::Debug for ConnectionDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionDetails::Static(endpoint) => write!(f, "Static({endpoint})"),
            ConnectionDetails::Failover(_) => write!(f, "Failover(<resolver>)"),
            ConnectionDetails::WebSocket { url, protocols } => write!(f, "WebSocket({url}, {protocols:?})"),
        }
    }
}

/// Reconnect policy handed to the engine. The engine does the retrying and the backoff.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReconnectParams {
    pub enabled: bool,
    pub limit: Option<u32>,
    pub initial_delay: Option<Duration>,
    pub max_delay: Option<Duration>,
}

/// TLS transport settings. File contents are already loaded.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TlsParams {
    pub key: Option<Vec<u8>>,
    pub cert: Option<Vec<u8>>,
    pub ca: Option<Vec<u8>>,
    pub passphrase: Option<String>,
    /// Verify the certificate chain of the peer.
    pub verify_peer: bool,
    /// Reject a peer whose certificate does not match its host name.
    pub reject_unauthorized: bool,
}

/// Everything the engine needs to open a connection.
#[derive(Clone, Debug)]
pub struct ConnectionParams {
    pub details: ConnectionDetails,
    pub username: Option<String>,
    pub password: Option<String>,
    pub reconnect: ReconnectParams,
    pub max_frame_size: Option<u32>,
    /// Local idle timeout, the peer sends heartbeats at half of it.
    pub idle_timeout: Option<Duration>,
    /// `None` means plain TCP.
    pub tls: Option<TlsParams>,
    pub sasl_external: bool,
    pub properties: BTreeMap<String, Value>,
}

impl ConnectionParams {
    pub fn new(details: ConnectionDetails) -> Self {
        Self {
            details,
            username: None,
            password: None,
            reconnect: ReconnectParams::default(),
            max_frame_size: None,
            idle_timeout: None,
            tls: None,
            sasl_external: false,
            properties: BTreeMap::new(),
        }
    }
}

/// Sender settle mode of a link.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SettleMode {
    Unsettled,
    Settled,
    #[default]
    Mixed,
}

/// How the source distributes messages to the receiver.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DistributionMode {
    #[default]
    Move,
    /// Browse, messages stay on the queue.
    Copy,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SenderOptions {
    /// `None` for an anonymous link.
    pub target: Option<String>,
    pub durable: bool,
    pub settle_mode: SettleMode,
    pub auto_settle: bool,
}

impl SenderOptions {
    pub fn target(address: &str) -> Self {
        Self {
            target: Some(address.to_owned()),
            auto_settle: true,
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReceiverOptions {
    pub source: String,
    pub durable: bool,
    pub distribution_mode: DistributionMode,
    pub selector: Option<String>,
    /// `Some(0)` switches off automatic credit, the client grants credit by hand. `Some(n)`
    /// keeps a prefetch window of `n`, `None` leaves the engine default.
    pub credit_window: Option<u32>,
    pub auto_accept: bool,
}

impl ReceiverOptions {
    pub fn source(address: &str) -> Self {
        Self {
            source: address.to_owned(),
            ..Default::default()
        }
    }
}
