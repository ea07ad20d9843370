use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use amqp_clients::ClientError;
use amqp_engine::{
    engine_error, ConnectionId, ConnectionParams, Container, ContainerFactory, DeliveryId, Engine, ErrorCondition,
    Event, EventSink, LinkId, Message, ReceiverOptions, Result, SenderOptions,
};
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Engine call as the mock recorded it.
#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    Connect(ConnectionId),
    Listen(u16),
    StopListening,
    OpenSender(LinkId, SenderOptions),
    OpenReceiver(LinkId, ReceiverOptions),
    Send(LinkId, Message),
    SendAnonymous(Message),
    Resend(LinkId, DeliveryId),
    Flow(LinkId, u32),
    AddCredit(LinkId, u32),
    SetDrain(LinkId, bool),
    SetDrained(LinkId, bool),
    Accept(DeliveryId),
    Reject(DeliveryId, ErrorCondition),
    Release(DeliveryId),
    Detach(LinkId),
    Close(ConnectionId),
}

#[derive(Clone, Debug)]
pub struct Record {
    pub at: Instant,
    pub call: Call,
}

/// How the broker behind the mock reacts to transfers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Outcome {
    #[default]
    Accept,
    Reject,
    /// No disposition at all.
    Silent,
}

#[derive(Clone, Debug, Default)]
pub struct Behaviour {
    /// Credit of every attached sender, announced with a sendable event.
    pub sender_credit: u32,
    pub outcome: Outcome,
    /// Release the first this many deliveries before applying the outcome.
    pub release_first: usize,
    /// Send a settled event after the disposition.
    pub settle: bool,
    /// Messages waiting on the source of every receiver.
    pub queue: Vec<Message>,
    pub fail_connect: bool,
    pub fail_open_sender: bool,
    /// Transport losses reported right after the connection opens.
    pub disconnects: usize,
}

struct State {
    behaviour: Behaviour,
    sink: EventSink,
    calls: Vec<Record>,
    params: Vec<ConnectionParams>,
    next_id: u64,
    credit: HashMap<LinkId, u32>,
    auto_window: HashSet<LinkId>,
    drain: HashSet<LinkId>,
    link_connection: HashMap<LinkId, ConnectionId>,
    queue: VecDeque<Message>,
    released: usize,
}

impl State {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn record(&mut self, call: Call) {
        self.calls.push(Record {
            at: Instant::now(),
            call,
        });
    }

    fn emit(&self, event: Event) {
        let _ = self.sink.send(event);
    }

    fn connection_of(&self, link: LinkId) -> ConnectionId {
        self.link_connection.get(&link).copied().unwrap_or_default()
    }

    fn dispose(&mut self, link: LinkId, delivery: DeliveryId) {
        let connection = self.connection_of(link);

        if self.released < self.behaviour.release_first {
            self.released += 1;
            self.emit(Event::Released {
                connection,
                link,
                delivery,
            });

            return;
        }

        match self.behaviour.outcome {
            Outcome::Accept => self.emit(Event::Accepted {
                connection,
                link,
                delivery,
            }),
            Outcome::Reject => self.emit(Event::Rejected {
                connection,
                link,
                delivery,
                error: ErrorCondition::new("amqp:not-allowed", "not allowed"),
            }),
            Outcome::Silent => return,
        }

        if self.behaviour.settle {
            self.emit(Event::Settled {
                connection,
                link,
                delivery,
            });
        }
    }

    fn deliver(&mut self, link: LinkId) {
        let connection = self.connection_of(link);

        while !self.queue.is_empty() {
            if !self.auto_window.contains(&link) {
                let credit = self.credit.entry(link).or_default();

                if *credit == 0 {
                    break;
                }

                *credit -= 1;
            }

            let message = self.queue.pop_front().unwrap();
            let delivery = DeliveryId(self.next_id());

            self.emit(Event::Message {
                connection,
                link,
                delivery,
                message: Box::new(message),
            });
        }

        if self.queue.is_empty() && self.drain.remove(&link) {
            self.credit.insert(link, 0);
            self.emit(Event::ReceiverDrained { connection, link });
        }
    }
}

pub struct MockEngine {
    state: Arc<Mutex<State>>,
}

impl Engine for MockEngine {
    fn connect(&mut self, params: ConnectionParams) -> Result<ConnectionId> {
        let mut state = self.state.lock().unwrap();

        if state.behaviour.fail_connect {
            return engine_error!(503, "Connection refused");
        }

        let connection = ConnectionId(state.next_id());

        state.params.push(params);
        state.record(Call::Connect(connection));
        state.emit(Event::ConnectionOpen { connection });

        for _ in 0..state.behaviour.disconnects {
            state.emit(Event::Disconnected {
                connection,
                error: None,
            });
        }

        Ok(connection)
    }

    fn listen(&mut self, port: u16) -> Result<()> {
        self.state.lock().unwrap().record(Call::Listen(port));

        Ok(())
    }

    fn stop_listening(&mut self) {
        self.state.lock().unwrap().record(Call::StopListening);
    }

    fn open_sender(&mut self, connection: ConnectionId, options: SenderOptions) -> Result<LinkId> {
        let mut state = self.state.lock().unwrap();

        if state.behaviour.fail_open_sender {
            return engine_error!(403, "Sender not allowed");
        }

        let link = LinkId(state.next_id());
        let credit = state.behaviour.sender_credit;

        state.link_connection.insert(link, connection);
        state.record(Call::OpenSender(link, options));
        state.emit(Event::SenderOpen { connection, link });

        if credit > 0 {
            state.credit.insert(link, credit);
            state.emit(Event::Sendable { connection, link });
        }

        Ok(link)
    }

    fn open_receiver(&mut self, connection: ConnectionId, options: ReceiverOptions) -> Result<LinkId> {
        let mut state = self.state.lock().unwrap();
        let link = LinkId(state.next_id());

        if options.credit_window != Some(0) {
            state.auto_window.insert(link);
        }

        state.link_connection.insert(link, connection);
        state.record(Call::OpenReceiver(link, options));
        state.emit(Event::ReceiverOpen { connection, link });
        state.deliver(link);

        Ok(link)
    }

    fn sendable(&self, link: LinkId) -> bool {
        self.state.lock().unwrap().credit.get(&link).is_some_and(|c| *c > 0)
    }

    fn send(&mut self, link: LinkId, message: Message) -> Result<DeliveryId> {
        let mut state = self.state.lock().unwrap();
        let delivery = DeliveryId(state.next_id());

        if let Some(credit) = state.credit.get_mut(&link) {
            *credit = credit.saturating_sub(1);
        }

        state.record(Call::Send(link, message));
        state.dispose(link, delivery);

        Ok(delivery)
    }

    fn send_anonymous(&mut self, connection: ConnectionId, message: Message) -> Result<DeliveryId> {
        let mut state = self.state.lock().unwrap();
        let delivery = DeliveryId(state.next_id());

        state.record(Call::SendAnonymous(message));
        state.emit(Event::Accepted {
            connection,
            link: LinkId::default(),
            delivery,
        });

        Ok(delivery)
    }

    fn resend(&mut self, link: LinkId, delivery: DeliveryId) -> Result<DeliveryId> {
        let mut state = self.state.lock().unwrap();
        let retried = DeliveryId(state.next_id());

        state.record(Call::Resend(link, delivery));
        state.dispose(link, retried);

        Ok(retried)
    }

    fn flow(&mut self, link: LinkId, credit: u32) {
        let mut state = self.state.lock().unwrap();

        state.record(Call::Flow(link, credit));
        state.credit.insert(link, credit);
        state.deliver(link);
    }

    fn add_credit(&mut self, link: LinkId, credit: u32) {
        let mut state = self.state.lock().unwrap();

        state.record(Call::AddCredit(link, credit));
        *state.credit.entry(link).or_default() += credit;
        state.deliver(link);
    }

    fn set_drain(&mut self, link: LinkId, drain: bool) {
        let mut state = self.state.lock().unwrap();

        state.record(Call::SetDrain(link, drain));

        if drain {
            state.drain.insert(link);
            state.deliver(link);
        }
    }

    fn set_drained(&mut self, link: LinkId, drained: bool) {
        self.state.lock().unwrap().record(Call::SetDrained(link, drained));
    }

    fn accept(&mut self, delivery: DeliveryId) {
        self.state.lock().unwrap().record(Call::Accept(delivery));
    }

    fn reject(&mut self, delivery: DeliveryId, error: ErrorCondition) {
        self.state.lock().unwrap().record(Call::Reject(delivery, error));
    }

    fn release(&mut self, delivery: DeliveryId) {
        self.state.lock().unwrap().record(Call::Release(delivery));
    }

    fn detach(&mut self, link: LinkId) {
        self.state.lock().unwrap().record(Call::Detach(link));
    }

    fn close(&mut self, connection: ConnectionId) {
        self.state.lock().unwrap().record(Call::Close(connection));
    }
}

/// The test side of a mock engine: inspects the recorded calls and injects events.
#[derive(Clone)]
pub struct MockHandle {
    state: Arc<Mutex<State>>,
}

#[allow(dead_code)]
impl MockHandle {
    pub fn emit(&self, event: Event) {
        self.state.lock().unwrap().emit(event);
    }

    pub fn calls(&self) -> Vec<Record> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn params(&self) -> Vec<ConnectionParams> {
        self.state.lock().unwrap().params.clone()
    }

    pub fn count<F: Fn(&Call) -> bool>(&self, pred: F) -> usize {
        self.calls().iter().filter(|r| pred(&r.call)).count()
    }

    pub fn times<F: Fn(&Call) -> bool>(&self, pred: F) -> Vec<Instant> {
        self.calls().iter().filter(|r| pred(&r.call)).map(|r| r.at).collect()
    }

    pub fn closes(&self) -> usize {
        self.count(|c| matches!(c, Call::Close(_)))
    }

    pub fn sent_messages(&self) -> Vec<Message> {
        self.calls()
            .into_iter()
            .filter_map(|r| match r.call {
                Call::Send(_, m) | Call::SendAnonymous(m) => Some(m),
                _ => None,
            })
            .collect()
    }

    pub fn connection(&self) -> ConnectionId {
        self.calls()
            .iter()
            .find_map(|r| match r.call {
                Call::Connect(c) => Some(c),
                _ => None,
            })
            .expect("no connection")
    }

    pub fn sender_link(&self) -> LinkId {
        self.calls()
            .iter()
            .find_map(|r| match r.call {
                Call::OpenSender(l, _) => Some(l),
                _ => None,
            })
            .expect("no sender")
    }

    pub fn receiver_link(&self) -> LinkId {
        self.calls()
            .iter()
            .find_map(|r| match r.call {
                Call::OpenReceiver(l, _) => Some(l),
                _ => None,
            })
            .expect("no receiver")
    }

    /// Gives credit to a sender link and tells the client about it.
    pub fn grant(&self, link: LinkId, credit: u32) {
        let mut state = self.state.lock().unwrap();
        let connection = state.connection_of(link);

        *state.credit.entry(link).or_default() += credit;
        state.emit(Event::Sendable { connection, link });
    }

    /// A message arriving on the receiver link regardless of credit.
    pub fn incoming(&self, message: Message) {
        let link = self.receiver_link();
        let mut state = self.state.lock().unwrap();
        let connection = state.connection_of(link);
        let delivery = DeliveryId(state.next_id());

        state.emit(Event::Message {
            connection,
            link,
            delivery,
            message: Box::new(message),
        });
    }
}

pub fn container(behaviour: Behaviour) -> (Container, MockHandle) {
    let (sink, events) = mpsc::unbounded_channel();
    let queue = behaviour.queue.iter().cloned().collect();
    let state = Arc::new(Mutex::new(State {
        behaviour,
        sink,
        calls: vec![],
        params: vec![],
        next_id: 0,
        credit: HashMap::new(),
        auto_window: HashSet::new(),
        drain: HashSet::new(),
        link_connection: HashMap::new(),
        queue,
        released: 0,
    }));

    let engine = MockEngine {
        state: Arc::clone(&state),
    };

    (Container::new("test", Box::new(engine), events), MockHandle { state })
}

/// Creates mock containers, optionally failing the creation of one of them.
#[derive(Default)]
pub struct MockFactory {
    pub behaviour: Behaviour,
    pub fail_at: Option<usize>,
    pub handles: Vec<MockHandle>,
    created: usize,
}

impl MockFactory {
    pub fn new(behaviour: Behaviour) -> Self {
        Self {
            behaviour,
            ..Default::default()
        }
    }
}

impl ContainerFactory for MockFactory {
    fn create_container(&mut self, _id: &str) -> Result<Container> {
        let index = self.created;

        self.created += 1;

        if self.fail_at == Some(index) {
            return engine_error!(500, "Container limit reached");
        }

        let (container, handle) = container(self.behaviour.clone());

        self.handles.push(handle);

        Ok(container)
    }
}

#[allow(dead_code)]
pub fn to_client_error<T: std::fmt::Debug>(result: anyhow::Result<T>) -> ClientError {
    result.unwrap_err().downcast::<ClientError>().unwrap()
}
