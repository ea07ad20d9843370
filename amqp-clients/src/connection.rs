use std::path::Path;

use amqp_engine::{ConnectionDetails, ConnectionParams, ReconnectParams, TlsParams};
use anyhow::Result;
use log::debug;

use crate::client_error;
use crate::config::ClientConfiguration;
use crate::error::ErrorKind;
use crate::reconnect::ReconnectTracker;

/// Translates the configuration into the parameters of the engine's connect.
pub struct ConnectionBuilder<'a> {
    config: &'a ClientConfiguration,
}

impl<'a> ConnectionBuilder<'a> {
    pub fn new(config: &'a ClientConfiguration) -> Self {
        Self { config }
    }

    /// Builds the connection parameters. With a failover list the target is a resolver reading
    /// the reconnect count of `reconnect`, otherwise a static host and port.
    pub fn build(&self, reconnect: &ReconnectTracker) -> Result<ConnectionParams> {
        let conn = &self.config.connection;
        let broker = self.config.broker()?;
        let hosts = self.config.failover_hosts()?;

        let details = if conn.websocket.enabled {
            let scheme = if conn.tls.enabled { "wss" } else { "ws" };

            ConnectionDetails::WebSocket {
                url: format!("{scheme}://{}", broker.endpoint),
                protocols: conn.websocket.protocols.clone(),
            }
        } else if hosts.len() > 1 {
            ConnectionDetails::Failover(reconnect.failover_resolver(hosts))
        } else {
            ConnectionDetails::Static(broker.endpoint)
        };

        debug!("Connection target {:?}", details);

        let mut params = ConnectionParams::new(details);

        params.username = broker.username;
        params.password = broker.password;

        if conn.reconnect.enabled {
            // Initial and max delay are the same, there is no exponential backoff.
            params.reconnect = ReconnectParams {
                enabled: true,
                limit: conn.reconnect.limit,
                initial_delay: conn.reconnect.interval,
                max_delay: conn.reconnect.interval,
            };
        }

        params.max_frame_size = conn.frame_size;

        if !conn.heartbeat.is_zero() {
            params.idle_timeout = Some(conn.heartbeat);
        }

        let tls = &conn.tls;

        if tls.certificate.is_some() || tls.trust_store.is_some() {
            params.tls = Some(TlsParams {
                key: tls.private_key.as_deref().map(read_file).transpose()?,
                cert: tls.certificate.as_deref().map(read_file).transpose()?,
                ca: tls.trust_store.as_deref().map(read_file).transpose()?,
                passphrase: tls.password.clone(),
                verify_peer: tls.verify_peer,
                reject_unauthorized: tls.verify_peer_name,
            });
            params.sasl_external = true;
        } else if tls.enabled {
            params.tls = Some(TlsParams {
                reject_unauthorized: false,
                ..Default::default()
            });
        }

        params.properties = conn.properties.clone();

        Ok(params)
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    match std::fs::read(path) {
        Ok(content) => Ok(content),
        Err(e) => client_error!(ErrorKind::Io, format!("Cannot read {}: {e}", path.display())),
    }
}
