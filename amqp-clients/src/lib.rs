//! AMQP 1.0 sender, receiver and connector clients on top of an [`amqp_engine::Engine`].
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use amqp_clients::{exit_code, ClientConfiguration, Sender};
//! use amqp_engine::Container;
//!
//! async fn send(container: &mut Container) -> i32 {
//!     let config = ClientConfiguration {
//!         address: "orders".to_owned(),
//!         count: 10,
//!         ..Default::default()
//!     };
//!     let mut sender = Sender::new(Arc::new(config));
//!
//!     match sender.run(container).await {
//!         Ok(()) => 0,
//!         Err(e) => exit_code(&e),
//!     }
//! }
//! ```
mod dev;
pub use dev::setup_logger;

mod error;
pub use error::{exit_code, ClientError, ErrorKind};

pub mod model;
pub use model::{MessageFormat, ObjectControl, ReceiverAction, ReleaseAction};

pub mod config;
pub use config::{ClientConfiguration, Role};

pub mod options;

pub mod formatter;

mod connection;
pub use connection::ConnectionBuilder;

pub mod timeout;
pub use timeout::{Pacer, TimeoutController};

mod reconnect;
pub use reconnect::ReconnectTracker;

mod client;
pub use client::{event_loop, ClientCore, EventHandler};

mod sender;
pub use sender::{create_message, Sender};

mod receiver;
pub use receiver::{CreditMode, Receiver};

mod connector;
pub use connector::{Connector, OpenCounters, ResultCounters};
