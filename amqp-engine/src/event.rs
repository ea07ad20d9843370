use std::fmt;

use crate::message::Message;

/// Identifies a connection inside one container.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

/// Identifies a sender or receiver link inside one container.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkId(pub u64);

/// Identifies a single transfer on a link.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeliveryId(pub u64);

/// Error condition as it travels in detach, close and disposition performatives.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ErrorCondition {
    pub condition: String,
    pub description: String,
}

/// The peer closed the connection deliberately, e.g. broker shutdown or admin action.
pub const CONNECTION_FORCED: &str = "amqp:connection:forced";

impl ErrorCondition {
    pub fn new(condition: &str, description: &str) -> Self {
        Self {
            condition: condition.to_owned(),
            description: description.to_owned(),
        }
    }

    pub fn is_connection_forced(&self) -> bool {
        self.condition == CONNECTION_FORCED
    }
}

impl fmt::Display for ErrorCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.condition, self.description)
    }
}

/// Events delivered by the engine. All of them arrive on the event stream of the container in
/// the order the engine produced them.
#[derive(Debug)]
pub enum Event {
    ConnectionOpen {
        connection: ConnectionId,
    },
    ConnectionError {
        connection: ConnectionId,
        error: ErrorCondition,
    },
    /// The transport went away. If reconnect is enabled the engine retries on its own.
    Disconnected {
        connection: ConnectionId,
        error: Option<ErrorCondition>,
    },
    SenderOpen {
        connection: ConnectionId,
        link: LinkId,
    },
    ReceiverOpen {
        connection: ConnectionId,
        link: LinkId,
    },
    /// The sender link has credit.
    Sendable {
        connection: ConnectionId,
        link: LinkId,
    },
    Accepted {
        connection: ConnectionId,
        link: LinkId,
        delivery: DeliveryId,
    },
    Rejected {
        connection: ConnectionId,
        link: LinkId,
        delivery: DeliveryId,
        error: ErrorCondition,
    },
    Released {
        connection: ConnectionId,
        link: LinkId,
        delivery: DeliveryId,
    },
    Settled {
        connection: ConnectionId,
        link: LinkId,
        delivery: DeliveryId,
    },
    Message {
        connection: ConnectionId,
        link: LinkId,
        delivery: DeliveryId,
        message: Box<Message>,
    },
    /// The receiver asked for drain and the sender side ran out of messages.
    ReceiverDrained {
        connection: ConnectionId,
        link: LinkId,
    },
    ProtocolError {
        connection: Option<ConnectionId>,
        description: String,
    },
}

impl Event {
    /// Name of the event as the engine callbacks call it.
    pub fn name(&self) -> &'static str {
        match self {
            Event::ConnectionOpen { .. } => "connection_open",
            Event::ConnectionError { .. } => "connection_error",
            Event::Disconnected { .. } => "disconnected",
            Event::SenderOpen { .. } => "sender_open",
            Event::ReceiverOpen { .. } => "receiver_open",
            Event::Sendable { .. } => "sendable",
            Event::Accepted { .. } => "accepted",
            Event::Rejected { .. } => "rejected",
            Event::Released { .. } => "released",
            Event::Settled { .. } => "settled",
            Event::Message { .. } => "message",
            Event::ReceiverDrained { .. } => "receiver_drained",
            Event::ProtocolError { .. } => "protocol_error",
        }
    }

    pub fn connection(&self) -> Option<ConnectionId> {
        match self {
            Event::ConnectionOpen { connection }
            | Event::ConnectionError { connection, .. }
            | Event::Disconnected { connection, .. }
            | Event::SenderOpen { connection, .. }
            | Event::ReceiverOpen { connection, .. }
            | Event::Sendable { connection, .. }
            | Event::Accepted { connection, .. }
            | Event::Rejected { connection, .. }
            | Event::Released { connection, .. }
            | Event::Settled { connection, .. }
            | Event::Message { connection, .. }
            | Event::ReceiverDrained { connection, .. } => Some(*connection),
            Event::ProtocolError { connection, .. } => *connection,
        }
    }
}

/// The endpoints an event or a timer refers to. Closing a context detaches its links and
/// closes its connection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Context {
    pub connection: Option<ConnectionId>,
    pub sender: Option<LinkId>,
    pub receiver: Option<LinkId>,
}

impl Context {
    pub fn connection(connection: ConnectionId) -> Self {
        Self {
            connection: Some(connection),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.connection.is_none() && self.sender.is_none() && self.receiver.is_none()
    }
}
