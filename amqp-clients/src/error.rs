use std::fmt;

/// Category of a fatal client condition. Every category terminates the run with its own exit
/// status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unexpected failure reported by the protocol engine.
    Engine = 1,
    /// Malformed arguments or configuration, e.g. a bad failover URL list.
    Configuration = 2,
    /// TLS material or content file cannot be read.
    Io = 3,
    /// The peer closed the connection with an error other than a forced close.
    Connection = 4,
    /// The number of disconnects reached the reconnect limit.
    ReconnectLimit = 5,
    /// The broker rejected a delivery.
    Rejected = 6,
    /// The broker released a delivery and the release action is `fail`.
    Released = 7,
    /// The engine detected a protocol violation.
    Protocol = 8,
}

impl ErrorKind {
    pub fn exit_code(self) -> i32 {
        self as i32
    }
}

/// Represents a fatal client condition.
#[derive(Clone, Debug)]
pub struct ClientError {
    pub kind: ErrorKind,
    pub message: String,
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientError")
            .field("kind", &self.kind)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for ClientError {}

/// Shorthand for creating errors in client functions.
#[macro_export]
macro_rules! client_error {
    ($kind:expr, $message:expr) => {
        ::std::result::Result::Err(anyhow::Error::new($crate::ClientError {
            kind: $kind,
            message: ::std::string::String::from($message),
        }))
    };
}

/// Wraps an error of the protocol engine.
pub(crate) fn engine_failure(err: amqp_engine::Error) -> anyhow::Error {
    anyhow::Error::new(ClientError {
        kind: ErrorKind::Engine,
        message: err.to_string(),
    })
}

/// Process exit status belonging to an error returned by a client run.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<ClientError>() {
        Some(e) => e.kind.exit_code(),
        None => ErrorKind::Engine.exit_code(),
    }
}
