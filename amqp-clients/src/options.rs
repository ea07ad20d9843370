//! Command line options of the three clients.
//!
//! Times are given in seconds (fractions allowed). Map items are `key=value` for a string value
//! and `key~value` for a value cast to bool, integer or float where possible. List items cast
//! the same way when they start with `~`.
//!
//! With `--config` the TOML file is the whole configuration and the other options are ignored.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use amqp_engine::Value;
use anyhow::Result;
use clap::{ArgAction, Args, Parser};

use crate::client_error;
use crate::config::{ClientConfiguration, ConnectionConfig};
use crate::error::ErrorKind;
use crate::model::{MessageFormat, ObjectControl, ReceiverAction, ReleaseAction};

#[derive(Args, Clone, Debug)]
pub struct ConnectionArgs {
    /// Broker address `[scheme://][user[:password]@]host[:port]`
    #[clap(short = 'b', long = "broker", default_value = "localhost:5672")]
    pub broker: String,
    /// Comma separated failover brokers
    #[clap(long = "conn-urls")]
    pub conn_urls: Option<String>,
    #[clap(long = "conn-reconnect", action = ArgAction::Set, default_value_t = true)]
    pub conn_reconnect: bool,
    #[clap(long = "conn-reconnect-limit")]
    pub conn_reconnect_limit: Option<u32>,
    /// Delay between reconnect attempts in seconds
    #[clap(long = "conn-reconnect-interval")]
    pub conn_reconnect_interval: Option<f64>,
    /// Idle timeout in seconds
    #[clap(long = "conn-heartbeat", default_value_t = 0.0)]
    pub conn_heartbeat: f64,
    #[clap(long = "conn-max-frame-size")]
    pub conn_max_frame_size: Option<u32>,
    #[clap(long = "conn-ssl")]
    pub conn_ssl: bool,
    #[clap(long = "conn-ssl-certificate")]
    pub conn_ssl_certificate: Option<PathBuf>,
    #[clap(long = "conn-ssl-private-key")]
    pub conn_ssl_private_key: Option<PathBuf>,
    #[clap(long = "conn-ssl-password")]
    pub conn_ssl_password: Option<String>,
    #[clap(long = "conn-ssl-trust-store")]
    pub conn_ssl_trust_store: Option<PathBuf>,
    #[clap(long = "conn-ssl-verify-peer")]
    pub conn_ssl_verify_peer: bool,
    #[clap(long = "conn-ssl-verify-peer-name")]
    pub conn_ssl_verify_peer_name: bool,
    #[clap(long = "conn-web-socket")]
    pub conn_web_socket: bool,
    #[clap(long = "conn-web-socket-protocols", value_delimiter = ',')]
    pub conn_web_socket_protocols: Vec<String>,
    #[clap(long = "conn-property", value_parser = parse_map_item)]
    pub conn_property: Vec<(String, Value)>,
}

#[derive(Args, Clone, Debug)]
pub struct BasicArgs {
    #[clap(short = 'a', long = "address", default_value = "examples")]
    pub address: String,
    #[clap(short = 'c', long = "count", default_value_t = 1)]
    pub count: u64,
    /// Seconds to wait before closing
    #[clap(long = "close-sleep", default_value_t = 0.0)]
    pub close_sleep: f64,
    /// Idle timeout in seconds, 0 waits forever
    #[clap(short = 't', long = "timeout", default_value_t = 0.0)]
    pub timeout: f64,
    /// Spread the messages over this many seconds
    #[clap(long = "duration", default_value_t = 0.0)]
    pub duration: f64,
    #[clap(long = "log-msgs", value_enum)]
    pub log_msgs: Option<MessageFormat>,
    #[clap(long = "link-durable")]
    pub link_durable: bool,
    #[clap(long = "link-at-most-once")]
    pub link_at_most_once: bool,
    #[clap(long = "link-at-least-once")]
    pub link_at_least_once: bool,
    /// TOML configuration file
    #[clap(long = "config")]
    pub config: Option<PathBuf>,
}

#[derive(Parser, Clone, Debug)]
#[clap(name = "amqp-sender", about = "Sends messages to an AMQP 1.0 address")]
pub struct SenderArgs {
    #[clap(flatten)]
    pub connection: ConnectionArgs,
    #[clap(flatten)]
    pub basic: BasicArgs,
    #[clap(long = "msg-id")]
    pub msg_id: Option<String>,
    #[clap(long = "msg-user-id")]
    pub msg_user_id: Option<String>,
    #[clap(long = "msg-group-id")]
    pub msg_group_id: Option<String>,
    #[clap(long = "msg-group-seq")]
    pub msg_group_seq: Option<u32>,
    #[clap(long = "msg-reply-to-group-id")]
    pub msg_reply_to_group_id: Option<String>,
    #[clap(long = "msg-subject")]
    pub msg_subject: Option<String>,
    #[clap(long = "msg-reply-to")]
    pub msg_reply_to: Option<String>,
    #[clap(long = "msg-correlation-id")]
    pub msg_correlation_id: Option<String>,
    #[clap(long = "msg-content-type")]
    pub msg_content_type: Option<String>,
    #[clap(long = "msg-durable", action = ArgAction::Set, default_value_t = false)]
    pub msg_durable: bool,
    /// Time to live in milliseconds
    #[clap(long = "msg-ttl")]
    pub msg_ttl: Option<u32>,
    #[clap(long = "msg-priority")]
    pub msg_priority: Option<u8>,
    /// Text body, `%d` is replaced by the index of the message
    #[clap(long = "msg-content")]
    pub msg_content: Option<String>,
    #[clap(long = "msg-content-list-item", value_parser = parse_list_item)]
    pub msg_content_list_item: Vec<Value>,
    #[clap(long = "msg-content-map-item", value_parser = parse_map_item)]
    pub msg_content_map_item: Vec<(String, Value)>,
    #[clap(long = "msg-content-from-file")]
    pub msg_content_from_file: Option<PathBuf>,
    #[clap(long = "msg-property", value_parser = parse_map_item)]
    pub msg_property: Vec<(String, Value)>,
    #[clap(long = "msg-annotation", value_parser = parse_map_item)]
    pub msg_annotation: Vec<(String, Value)>,
    #[clap(long = "reactor-auto-settle-off")]
    pub reactor_auto_settle_off: bool,
    #[clap(long = "anonymous")]
    pub anonymous: bool,
    #[clap(long = "release-action", value_enum, default_value = "ignore")]
    pub release_action: ReleaseAction,
}

#[derive(Parser, Clone, Debug)]
#[clap(name = "amqp-receiver", about = "Receives messages from an AMQP 1.0 address")]
pub struct ReceiverArgs {
    #[clap(flatten)]
    pub connection: ConnectionArgs,
    #[clap(flatten)]
    pub basic: BasicArgs,
    #[clap(long = "action", value_enum, default_value = "acknowledge")]
    pub action: ReceiverAction,
    /// Browse messages without consuming them
    #[clap(long = "recv-browse")]
    pub recv_browse: bool,
    #[clap(long = "recv-selector")]
    pub recv_selector: Option<String>,
    #[clap(long = "capacity", default_value_t = 0)]
    pub capacity: u32,
    /// Forward every message to its reply-to address
    #[clap(long = "process-reply-to")]
    pub process_reply_to: bool,
    /// Wait for an inbound connection instead of connecting
    #[clap(long = "recv-listen")]
    pub recv_listen: bool,
    #[clap(long = "recv-listen-port", default_value_t = 5672)]
    pub recv_listen_port: u16,
}

#[derive(Parser, Clone, Debug)]
#[clap(name = "amqp-connector", about = "Opens and closes AMQP 1.0 connections and links")]
pub struct ConnectorArgs {
    #[clap(flatten)]
    pub connection: ConnectionArgs,
    #[clap(flatten)]
    pub basic: BasicArgs,
    /// Objects to create: C connection, E session, S sender, R receiver
    #[clap(long = "obj-ctrl", default_value = "C", value_parser = parse_obj_ctrl)]
    pub obj_ctrl: ObjectControl,
    #[clap(long = "sender-count", default_value_t = 1)]
    pub sender_count: u32,
    #[clap(long = "receiver-count", default_value_t = 1)]
    pub receiver_count: u32,
    /// Send one message per sender every second
    #[clap(long = "infinite-send")]
    pub infinite_send: bool,
}

impl SenderArgs {
    pub fn into_configuration(self) -> Result<ClientConfiguration> {
        if let Some(path) = &self.basic.config {
            return ClientConfiguration::from_file(path);
        }

        let mut config = base_configuration(self.connection, self.basic)?;
        let message = &mut config.sender.message;

        message.id = self.msg_id;
        message.user_id = self.msg_user_id;
        message.group_id = self.msg_group_id;
        message.group_sequence = self.msg_group_seq;
        message.reply_to_group_id = self.msg_reply_to_group_id;
        message.subject = self.msg_subject;
        message.reply_to = self.msg_reply_to;
        message.correlation_id = self.msg_correlation_id;
        message.content_type = self.msg_content_type;
        message.durable = self.msg_durable;
        message.ttl = self.msg_ttl;
        message.priority = self.msg_priority;
        message.content = self.msg_content;
        message.list_content = self.msg_content_list_item;
        message.map_content = self.msg_content_map_item.into_iter().collect();
        message.content_from_file = self.msg_content_from_file;
        message.properties = self.msg_property.into_iter().collect();
        message.annotations = self.msg_annotation.into_iter().collect();

        config.sender.auto_settle_off = self.reactor_auto_settle_off;
        config.sender.anonymous = self.anonymous;
        config.sender.release_action = self.release_action;

        Ok(config)
    }
}

impl ReceiverArgs {
    pub fn into_configuration(self) -> Result<ClientConfiguration> {
        if let Some(path) = &self.basic.config {
            return ClientConfiguration::from_file(path);
        }

        let mut config = base_configuration(self.connection, self.basic)?;
        let receiver = &mut config.receiver;

        receiver.action = self.action;
        receiver.recv_browse = self.recv_browse;
        receiver.selector = self.recv_selector;
        receiver.capacity = self.capacity;
        receiver.process_reply_to = self.process_reply_to;
        receiver.listen.enabled = self.recv_listen;
        receiver.listen.port = self.recv_listen_port;

        Ok(config)
    }
}

impl ConnectorArgs {
    pub fn into_configuration(self) -> Result<ClientConfiguration> {
        if let Some(path) = &self.basic.config {
            return ClientConfiguration::from_file(path);
        }

        let mut config = base_configuration(self.connection, self.basic)?;

        config.connector.obj_ctrl = self.obj_ctrl;
        config.connector.sender_count = self.sender_count;
        config.connector.receiver_count = self.receiver_count;
        config.connector.infinite_send = self.infinite_send;

        Ok(config)
    }
}

fn base_configuration(conn: ConnectionArgs, basic: BasicArgs) -> Result<ClientConfiguration> {
    let mut connection = ConnectionConfig {
        broker: conn.broker,
        conn_urls: conn.conn_urls,
        heartbeat: seconds("conn-heartbeat", conn.conn_heartbeat)?,
        frame_size: conn.conn_max_frame_size,
        properties: conn.conn_property.into_iter().collect::<BTreeMap<_, _>>(),
        ..Default::default()
    };

    connection.reconnect.enabled = conn.conn_reconnect;
    connection.reconnect.limit = conn.conn_reconnect_limit;
    connection.reconnect.interval = conn
        .conn_reconnect_interval
        .map(|secs| seconds("conn-reconnect-interval", secs))
        .transpose()?;

    connection.tls.enabled = conn.conn_ssl;
    connection.tls.certificate = conn.conn_ssl_certificate;
    connection.tls.private_key = conn.conn_ssl_private_key;
    connection.tls.password = conn.conn_ssl_password;
    connection.tls.trust_store = conn.conn_ssl_trust_store;
    connection.tls.verify_peer = conn.conn_ssl_verify_peer;
    connection.tls.verify_peer_name = conn.conn_ssl_verify_peer_name;

    connection.websocket.enabled = conn.conn_web_socket;

    if !conn.conn_web_socket_protocols.is_empty() {
        connection.websocket.protocols = conn.conn_web_socket_protocols;
    }

    Ok(ClientConfiguration {
        connection,
        address: basic.address,
        count: basic.count,
        duration: seconds("duration", basic.duration)?,
        timeout: seconds("timeout", basic.timeout)?,
        close_sleep: seconds("close-sleep", basic.close_sleep)?,
        durable: basic.link_durable,
        log_msgs: basic.log_msgs,
        link_at_most_once: basic.link_at_most_once,
        link_at_least_once: basic.link_at_least_once,
        ..Default::default()
    })
}

fn seconds(option: &str, value: f64) -> Result<Duration> {
    match Duration::try_from_secs_f64(value) {
        Ok(d) => Ok(d),
        Err(_) => client_error!(ErrorKind::Configuration, format!("Invalid --{option} {value}")),
    }
}

/// Casts to bool, integer or float if the text looks like one.
pub fn auto_cast(s: &str) -> Value {
    match s {
        "true" | "True" => return Value::Bool(true),
        "false" | "False" => return Value::Bool(false),
        "None" | "null" => return Value::Null,
        _ => (),
    }

    if let Ok(i) = s.parse::<i64>() {
        Value::Int(i)
    } else if let Ok(f) = s.parse::<f64>() {
        Value::Double(f)
    } else {
        Value::String(s.to_owned())
    }
}

pub fn parse_map_item(s: &str) -> std::result::Result<(String, Value), String> {
    let Some(pos) = s.find(['=', '~']) else {
        return Err(format!("'{s}' is neither key=value nor key~value"));
    };

    let (key, rest) = s.split_at(pos);

    if key.is_empty() {
        return Err(format!("missing key in '{s}'"));
    }

    let value = &rest[1..];

    if rest.starts_with('~') {
        Ok((key.to_owned(), auto_cast(value)))
    } else {
        Ok((key.to_owned(), Value::String(value.to_owned())))
    }
}

pub fn parse_list_item(s: &str) -> std::result::Result<Value, String> {
    match s.strip_prefix('~') {
        Some(rest) => Ok(auto_cast(rest)),
        None => Ok(Value::String(s.to_owned())),
    }
}

fn parse_obj_ctrl(s: &str) -> std::result::Result<ObjectControl, String> {
    s.parse()
}
