//! Connection and link exerciser.
//!
//! The connector opens `count` connections, each in its own container, attaches senders and
//! receivers to them depending on the object control flags, and tears everything down when the
//! timeout passes. Opening failures are counted, they never stop the remaining opens.

use std::sync::Arc;
use std::time::Duration;

use amqp_engine::{
    ConnectionId, Container, ContainerFactory, DeliveryId, Engine, ErrorCondition, Event, EventStream, LinkId,
    Message, ReceiverOptions, SenderOptions,
};
use anyhow::Result;
use futures::stream::{self, StreamExt};
use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::time::{interval_at, sleep, Instant};
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::config::{ClientConfiguration, Role};
use crate::connection::ConnectionBuilder;
use crate::model::ObjectControl;
use crate::reconnect::ReconnectTracker;

const DEFAULT_ADDRESS: &str = "test_connection";
const INFINITE_SEND_PERIOD: Duration = Duration::from_secs(1);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct OpenCounters {
    pub open: u64,
    pub error: u64,
}

/// Outcome of a connector run, printed as one JSON line at the end.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ResultCounters {
    pub connections: OpenCounters,
    pub senders: OpenCounters,
    pub receivers: OpenCounters,
    pub sent: u64,
    pub received: u64,
}

impl ResultCounters {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// One connection with its links.
struct Slot {
    engine: Box<dyn Engine>,
    /// Disconnects of this connection, it also picks the failover host.
    reconnect: ReconnectTracker,
    connection: Option<ConnectionId>,
    senders: Vec<LinkId>,
    receivers: Vec<LinkId>,
}

pub struct Connector {
    config: Arc<ClientConfiguration>,
    results: ResultCounters,
    slots: Vec<Slot>,
}

impl Connector {
    pub fn new(config: Arc<ClientConfiguration>) -> Self {
        Self {
            config,
            results: ResultCounters::default(),
            slots: vec![],
        }
    }

    pub fn results(&self) -> &ResultCounters {
        &self.results
    }

    fn address(&self) -> &str {
        if self.config.address.is_empty() {
            DEFAULT_ADDRESS
        } else {
            &self.config.address
        }
    }

    pub async fn run(&mut self, factory: &mut dyn ContainerFactory) -> Result<ResultCounters> {
        let config = Arc::clone(&self.config);

        config.validate(Role::Connector)?;

        self.results = ResultCounters::default();
        self.slots.clear();

        let obj_ctrl = config.connector.obj_ctrl;
        let mut streams = vec![];

        for i in 0..config.count {
            let container_id = uuid::Uuid::new_v4().to_string();

            match factory.create_container(&container_id) {
                Ok(Container { engine, events, .. }) => {
                    let index = self.slots.len();

                    streams.push(tagged(index, events));
                    self.slots.push(Slot {
                        engine,
                        reconnect: ReconnectTracker::new(config.connection.reconnect.limit),
                        connection: None,
                        senders: vec![],
                        receivers: vec![],
                    });

                    if let Err(e) = self.connect(index) {
                        self.close_connections();

                        return Err(e);
                    }
                }
                Err(e) => {
                    error!("Cannot create container {i}: {e}");
                    self.results.connections.error += 1;
                }
            }
        }

        if obj_ctrl.contains(ObjectControl::SENDER) {
            self.open_senders();
        }

        if obj_ctrl.contains(ObjectControl::RECEIVER) {
            self.open_receivers();
        }

        let infinite_send = config.connector.infinite_send && obj_ctrl.contains(ObjectControl::SENDER);
        let mut ticker = interval_at(Instant::now() + INFINITE_SEND_PERIOD, INFINITE_SEND_PERIOD);
        let mut events = stream::select_all(streams);
        let deadline = sleep(config.timeout);

        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;

                _ = &mut deadline => break,
                Some((index, event)) = events.next() => self.on_event(index, event),
                _ = ticker.tick(), if infinite_send => self.send_round(),
            }
        }

        self.close_objects();

        let report = self.results.to_json();

        info!("Connector finished {report}");
        println!("{report}");

        Ok(self.results.clone())
    }

    fn connect(&mut self, index: usize) -> Result<()> {
        // A configuration error is fatal, it would fail for every connection.
        let params = ConnectionBuilder::new(&self.config).build(&self.slots[index].reconnect)?;
        let slot = &mut self.slots[index];

        match slot.engine.connect(params) {
            Ok(connection) => slot.connection = Some(connection),
            Err(e) => {
                error!("Connection {index} failed {e}");
                self.results.connections.error += 1;
            }
        }

        Ok(())
    }

    fn open_senders(&mut self) {
        let address = self.address().to_owned();

        for slot in &mut self.slots {
            for _ in 0..self.config.connector.sender_count {
                let opened: amqp_engine::Result<LinkId> = match slot.connection {
                    Some(connection) => slot.engine.open_sender(connection, SenderOptions::target(&address)),
                    None => amqp_engine::engine_error!(404, "Connection is not open"),
                };

                match opened {
                    Ok(link) => slot.senders.push(link),
                    Err(e) => {
                        warn!("Cannot open sender {e}");
                        self.results.senders.error += 1;
                    }
                }
            }
        }
    }

    fn open_receivers(&mut self) {
        let address = self.address().to_owned();

        for slot in &mut self.slots {
            for _ in 0..self.config.connector.receiver_count {
                let opened: amqp_engine::Result<LinkId> = match slot.connection {
                    Some(connection) => slot.engine.open_receiver(connection, ReceiverOptions::source(&address)),
                    None => amqp_engine::engine_error!(404, "Connection is not open"),
                };

                match opened {
                    Ok(link) => slot.receivers.push(link),
                    Err(e) => {
                        warn!("Cannot open receiver {e}");
                        self.results.receivers.error += 1;
                    }
                }
            }
        }
    }

    fn on_event(&mut self, index: usize, event: Event) {
        match event {
            Event::ConnectionOpen { .. } => self.results.connections.open += 1,
            Event::ConnectionError { error, .. } => {
                warn!("Connection {index} error {error}");
                self.results.connections.error += 1;
            }
            Event::Disconnected { error, .. } => self.on_disconnect(index, error),
            Event::SenderOpen { .. } => self.results.senders.open += 1,
            Event::ReceiverOpen { .. } => self.results.receivers.open += 1,
            Event::Sendable { link, .. } => self.send_one(index, link),
            Event::Message { delivery, .. } => self.on_message(index, delivery),
            other => debug!("Connection {index} event {}", other.name()),
        }
    }

    /// The engine retries on its own until the reconnect limit of the connection is hit. Then the
    /// connection is given up and counted as an error, the other connections keep running.
    fn on_disconnect(&mut self, index: usize, error: Option<ErrorCondition>) {
        match error {
            Some(error) => warn!("Connection {index} disconnected {error}"),
            None => warn!("Connection {index} disconnected"),
        }

        if !self.config.connection.reconnect.enabled {
            return;
        }

        let slot = &mut self.slots[index];

        if let Err(e) = slot.reconnect.on_disconnect() {
            error!("Connection {index} given up {e}");

            self.results.connections.error += 1;
            slot.senders.clear();
            slot.receivers.clear();

            if let Some(connection) = slot.connection.take() {
                slot.engine.close(connection);
            }
        }
    }

    fn send_one(&mut self, index: usize, link: LinkId) {
        let slot = &mut self.slots[index];

        if !slot.engine.sendable(link) {
            return;
        }

        let message = Message::from(format!("test message {}", self.results.sent).as_str());

        match slot.engine.send(link, message) {
            Ok(_) => self.results.sent += 1,
            Err(e) => warn!("Send on connection {index} failed {e}"),
        }
    }

    fn on_message(&mut self, index: usize, delivery: DeliveryId) {
        self.slots[index].engine.accept(delivery);
        self.results.received += 1;
    }

    /// One more message on every sender that has credit.
    fn send_round(&mut self) {
        for index in 0..self.slots.len() {
            for link in self.slots[index].senders.clone() {
                self.send_one(index, link);
            }
        }
    }

    fn close_connections(&mut self) {
        for slot in &mut self.slots {
            if let Some(connection) = slot.connection.take() {
                slot.engine.close(connection);
            }
        }
    }

    fn close_objects(&mut self) {
        let obj_ctrl = self.config.connector.obj_ctrl;

        for slot in &mut self.slots {
            if obj_ctrl.contains(ObjectControl::RECEIVER) {
                for link in slot.receivers.drain(..) {
                    slot.engine.detach(link);
                }
            }

            if obj_ctrl.contains(ObjectControl::SENDER) {
                for link in slot.senders.drain(..) {
                    slot.engine.detach(link);
                }
            }

            if obj_ctrl.contains(ObjectControl::CONNECTION) {
                if let Some(connection) = slot.connection.take() {
                    slot.engine.close(connection);
                }
            }
        }
    }
}

fn tagged(index: usize, events: EventStream) -> impl futures::Stream<Item = (usize, Event)> + Unpin {
    UnboundedReceiverStream::new(events).map(move |event| (index, event))
}
