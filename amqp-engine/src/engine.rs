//! The operations a protocol engine offers to the clients.
//!
//! Operations are non-blocking: they queue work in the engine and return a handle. The outcome
//! (connection opened, link attached, delivery accepted, ...) arrives later as an [`Event`] on
//! the [`EventStream`] of the container. Engines must push events of one container into the
//! stream in the order they happen, the clients rely on that ordering.

use tokio::sync::mpsc;

use crate::event::{ConnectionId, DeliveryId, ErrorCondition, Event, LinkId};
use crate::message::Message;
use crate::params::{ConnectionParams, ReceiverOptions, SenderOptions};
use crate::Result;

/// The engine side of the event channel.
pub type EventSink = mpsc::UnboundedSender<Event>;
/// The client side of the event channel.
pub type EventStream = mpsc::UnboundedReceiver<Event>;

pub trait Engine: Send {
    /// Starts connecting. The result arrives as `ConnectionOpen`, `ConnectionError` or
    /// `Disconnected`.
    fn connect(&mut self, params: ConnectionParams) -> Result<ConnectionId>;

    /// Accepts inbound connections on a local port instead of connecting out.
    fn listen(&mut self, port: u16) -> Result<()>;

    fn stop_listening(&mut self);

    fn open_sender(&mut self, connection: ConnectionId, options: SenderOptions) -> Result<LinkId>;

    fn open_receiver(&mut self, connection: ConnectionId, options: ReceiverOptions) -> Result<LinkId>;

    /// The link is attached and has credit left.
    fn sendable(&self, link: LinkId) -> bool;

    fn send(&mut self, link: LinkId, message: Message) -> Result<DeliveryId>;

    /// Sends through the anonymous relay of the connection, the target is the `to` field of the
    /// message.
    fn send_anonymous(&mut self, connection: ConnectionId, message: Message) -> Result<DeliveryId>;

    /// Sends the message of an earlier delivery again.
    fn resend(&mut self, link: LinkId, delivery: DeliveryId) -> Result<DeliveryId>;

    /// Sets the credit of a receiver link to `credit`.
    fn flow(&mut self, link: LinkId, credit: u32);

    fn add_credit(&mut self, link: LinkId, credit: u32);

    fn set_drain(&mut self, link: LinkId, drain: bool);

    /// Tells the peer of a sender link that there is nothing more to send.
    fn set_drained(&mut self, link: LinkId, drained: bool);

    fn accept(&mut self, delivery: DeliveryId);

    fn reject(&mut self, delivery: DeliveryId, error: ErrorCondition);

    fn release(&mut self, delivery: DeliveryId);

    fn detach(&mut self, link: LinkId);

    fn close(&mut self, connection: ConnectionId);
}

/// An engine together with the stream of the events it produces.
pub struct Container {
    pub id: String,
    pub engine: Box<dyn Engine>,
    pub events: EventStream,
}

impl Container {
    pub fn new(id: &str, engine: Box<dyn Engine>, events: EventStream) -> Self {
        Self {
            id: id.to_owned(),
            engine,
            events,
        }
    }
}

/// Creates independent containers, each with its own engine and event stream.
pub trait ContainerFactory {
    fn create_container(&mut self, id: &str) -> Result<Container>;
}
