//! Data structures and the trait boundary of an AMQP 1.0 protocol engine.
//!
//! The clients never encode frames themselves. They talk to an engine through the
//! [`engine::Engine`] trait and get the outcome of every operation back as an
//! [`event::Event`] on the event stream of the owning [`engine::Container`].
pub mod engine;
pub mod event;
pub mod message;
pub mod params;


pub use engine::{Container, ContainerFactory, Engine, EventSink, EventStream};
pub use event::{ConnectionId, Context, DeliveryId, ErrorCondition, Event, LinkId};
pub use message::{Body, Message, Value};
pub use params::{
    ConnectionDetails, ConnectionParams, DistributionMode, Endpoint, FailoverResolver, ReceiverOptions,
    ReconnectParams, SenderOptions, SettleMode, TlsParams,
};

use std::fmt;

/// Type alias for a sync and send error.
pub type Error = Box<dyn std::error::Error + Send + Sync>;
/// Type alias for a simplified Result with Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Error struct used by engine implementations.
#[derive(Debug)]
pub struct EngineError {
    pub code: u16,
    pub message: String,
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", &self)
    }
}

impl std::error::Error for EngineError {}

/// Shorthand for making errors with error code and error message.
///
/// ```no_run
/// use amqp_engine::engine_error;
/// use amqp_engine::{LinkId, Result};
///
/// fn find_link(link: Option<LinkId>) -> Result<LinkId> {
///     match link {
///         Some(l) => Ok(l),
///         None => engine_error!(404, "Link is not attached"),
///     }
/// }
/// ```
#[macro_export]
macro_rules! engine_error {
    ($code:expr, $message:expr) => {
        ::std::result::Result::Err(Box::new($crate::EngineError {
            code: $code,
            message: ::std::string::String::from($message),
        }))
    };
}
