use std::sync::Arc;
use std::time::Duration;

use amqp_engine::{
    Container, Context, DeliveryId, DistributionMode, Engine, ErrorCondition, Event, LinkId, Message, ReceiverOptions,
    SenderOptions,
};
use anyhow::Result;
use log::{debug, info};

use crate::client::{event_loop, ClientCore, EventHandler};
use crate::config::{ClientConfiguration, Role};
use crate::connection::ConnectionBuilder;
use crate::error::engine_failure;
use crate::formatter::format_message;
use crate::model::ReceiverAction;
use crate::timeout::calculate_delay;

/// Grace period of a listening receiver, time to flush the last reply.
const LISTEN_CLOSE_SLEEP: Duration = Duration::from_secs(1);

/// Credit used when no message count is given.
const DEFAULT_CREDIT: u64 = 10;

/// How the receiver hands out credit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CreditMode {
    /// Keep a credit window open and close after `count` messages.
    Fixed,
    /// Grant one batch, drain the link and close when the source is empty.
    DrainAll,
    /// One credit at open, one more `duration / count` after every message.
    Paced,
}

impl CreditMode {
    pub fn of(config: &ClientConfiguration) -> Self {
        if !config.duration.is_zero() {
            CreditMode::Paced
        } else if config.receiver.recv_browse || config.count == 0 {
            CreditMode::DrainAll
        } else {
            CreditMode::Fixed
        }
    }
}

/// Receives messages from the address, applies the configured action to each of them and
/// optionally forwards them to their reply-to address.
pub struct Receiver {
    core: ClientCore,
    mode: CreditMode,
    expected: u64,
    /// Credit granted in one go in drain-all mode.
    batch: u32,
    received: u64,
    /// Messages of the current batch in drain-all mode.
    window: u32,
    reply_to_sent: u64,
    drained: bool,
}

impl Receiver {
    pub fn new(config: Arc<ClientConfiguration>) -> Self {
        let mode = CreditMode::of(&config);

        Self {
            core: ClientCore::new(config),
            mode,
            expected: 0,
            batch: 0,
            received: 0,
            window: 0,
            reply_to_sent: 0,
            drained: false,
        }
    }

    pub fn received(&self) -> u64 {
        self.received
    }

    pub fn reply_to_sent(&self) -> u64 {
        self.reply_to_sent
    }

    pub fn mode(&self) -> CreditMode {
        self.mode
    }

    pub async fn run(&mut self, container: &mut Container) -> Result<()> {
        let config = Arc::clone(&self.core.config);

        config.validate(Role::Receiver)?;

        self.init(&config);
        self.core.start();

        let engine = container.engine.as_mut();

        if config.receiver.listen.enabled {
            self.core.close_sleep = LISTEN_CLOSE_SLEEP;
            self.core.listen(engine, config.receiver.listen.port)?;
            self.core.arm_timeout();
        } else {
            let params = ConnectionBuilder::new(&config).build(&self.core.reconnect)?;

            info!("Receiver connecting to {}", config.connection.broker);

            let connection = engine.connect(params).map_err(engine_failure)?;
            self.core.context = Context::connection(connection);

            match engine.open_receiver(connection, self.receiver_options()) {
                Ok(link) => self.core.context.receiver = Some(link),
                Err(e) => {
                    self.core.close_now(engine);

                    return Err(engine_failure(e));
                }
            }
        }

        event_loop(self, container).await
    }

    fn init(&mut self, config: &ClientConfiguration) {
        let default_credit = if config.count > 0 { config.count } else { DEFAULT_CREDIT };

        self.mode = CreditMode::of(config);
        self.expected = config.count;
        self.batch = if self.mode == CreditMode::DrainAll || config.receiver.capacity == 0 {
            clamp(default_credit)
        } else {
            config.receiver.capacity
        };
        self.received = 0;
        self.window = 0;
        self.reply_to_sent = 0;
        self.drained = false;
    }

    pub fn receiver_options(&self) -> ReceiverOptions {
        let config = &self.core.config;
        let credit_window = match self.mode {
            CreditMode::Fixed => self.batch,
            CreditMode::DrainAll | CreditMode::Paced => 0,
        };

        ReceiverOptions {
            source: config.address.clone(),
            durable: config.durable,
            distribution_mode: if config.receiver.recv_browse {
                DistributionMode::Copy
            } else {
                DistributionMode::Move
            },
            selector: config.receiver.selector.clone(),
            credit_window: Some(credit_window),
            auto_accept: false,
        }
    }

    fn on_receiver_open(&mut self, engine: &mut dyn Engine, link: LinkId) {
        debug!("Receiver {:?} attached in {:?} mode", link, self.mode);

        self.core.context.receiver = Some(link);

        match self.mode {
            CreditMode::DrainAll => {
                engine.flow(link, self.batch);

                if self.core.config.timeout.is_zero() {
                    engine.set_drain(link, true);
                }
            }
            CreditMode::Paced => engine.add_credit(link, 1),
            CreditMode::Fixed => (),
        }

        if !self.core.config.receiver.listen.enabled {
            self.core.arm_timeout();
        }
    }

    fn on_message(&mut self, engine: &mut dyn Engine, link: LinkId, delivery: DeliveryId, message: Message) -> Result<()> {
        let config = Arc::clone(&self.core.config);

        self.received += 1;

        if let Some(format) = config.log_msgs {
            println!("{}", format_message(&message, format));
        }

        self.core.reset_timeout();

        match config.receiver.action {
            ReceiverAction::Acknowledge => engine.accept(delivery),
            ReceiverAction::Reject => engine.reject(delivery, ErrorCondition::new("amqp:oops:string", "reject message")),
            ReceiverAction::Release => engine.release(delivery),
            ReceiverAction::Noack => (),
        }

        let forwarding = config.receiver.process_reply_to && !config.receiver.listen.enabled;

        if !forwarding && self.received == self.expected {
            info!("All {} messages received", self.received);

            self.core.timeout.cancel();
            self.core.close(engine, self.core.close_sleep);
        }

        match self.mode {
            CreditMode::DrainAll if self.expected == 0 => {
                self.window += 1;

                if self.window == self.batch {
                    self.window = 0;
                    engine.add_credit(link, self.batch);
                }
            }
            CreditMode::Paced => {
                if self.received < config.count && !self.core.timeout.is_ending() {
                    let delay = calculate_delay(config.count, config.duration);

                    self.core.pacer.schedule(delay, self.core.context);
                } else {
                    self.core.pacer.clear();
                }
            }
            _ => (),
        }

        if config.receiver.process_reply_to {
            self.reply(engine, message)?;
        }

        Ok(())
    }

    /// Forwards the message to its reply-to address on a one-shot sender.
    fn reply(&mut self, engine: &mut dyn Engine, message: Message) -> Result<()> {
        let (Some(connection), Some(reply_to)) = (self.core.context.connection, message.reply_to.clone()) else {
            debug!("Message without reply-to, nothing to forward");

            self.reply_to_sent += 1;
            self.close_if_replied(engine);

            return Ok(());
        };

        let options = SenderOptions {
            target: Some(reply_to),
            auto_settle: false,
            ..Default::default()
        };

        let link = engine.open_sender(connection, options).map_err(engine_failure)?;

        engine.send(link, message).map_err(engine_failure)?;
        engine.set_drained(link, true);

        Ok(())
    }

    fn on_settled(&mut self, engine: &mut dyn Engine, link: LinkId) {
        if !self.core.config.receiver.process_reply_to || Some(link) == self.core.context.receiver {
            return;
        }

        self.reply_to_sent += 1;
        self.close_if_replied(engine);
    }

    /// All received messages are forwarded and settled, and no more messages are expected.
    fn close_if_replied(&mut self, engine: &mut dyn Engine) {
        let done = if self.expected > 0 {
            self.received >= self.expected
        } else {
            self.drained
        };

        if done && self.reply_to_sent == self.received {
            info!("All {} replies settled", self.reply_to_sent);

            self.core.timeout.cancel();
            self.core.close_now(engine);
        }
    }

    fn on_drained(&mut self, engine: &mut dyn Engine) {
        debug!("Receiver drained after {} messages", self.received);

        self.drained = true;

        if self.core.config.receiver.process_reply_to {
            self.close_if_replied(engine);
        } else if self.core.config.timeout.is_zero() {
            self.core.timeout.cancel();
            self.core.close(engine, self.core.close_sleep);
        }
    }
}

impl EventHandler for Receiver {
    fn core(&mut self) -> &mut ClientCore {
        &mut self.core
    }

    fn on_event(&mut self, engine: &mut dyn Engine, event: Event) -> Result<()> {
        match event {
            Event::ConnectionOpen { connection } => {
                self.core.context.connection = Some(connection);

                Ok(())
            }
            Event::ReceiverOpen { link, .. } => {
                self.on_receiver_open(engine, link);

                Ok(())
            }
            Event::Message {
                link,
                delivery,
                message,
                ..
            } => self.on_message(engine, link, delivery, *message),
            Event::Settled { link, .. } => {
                self.on_settled(engine, link);

                Ok(())
            }
            Event::ReceiverDrained { .. } => {
                self.on_drained(engine);

                Ok(())
            }
            other => self.core.on_common_event(other),
        }
    }

    fn on_tick(&mut self, engine: &mut dyn Engine, _context: Context) -> Result<()> {
        if self.core.timeout.is_ending() {
            return Ok(());
        }

        if let Some(link) = self.core.context.receiver {
            engine.add_credit(link, 1);
        }

        Ok(())
    }
}

fn clamp(credit: u64) -> u32 {
    u32::try_from(credit).unwrap_or(u32::MAX)
}
