use std::sync::Arc;

use amqp_engine::{Body, Container, Context, Engine, Event, Message, SenderOptions, SettleMode};
use anyhow::Result;
use log::{debug, info};

use crate::client::{event_loop, ClientCore, EventHandler};
use crate::client_error;
use crate::config::{ClientConfiguration, MessageConfig, Role};
use crate::connection::ConnectionBuilder;
use crate::error::{engine_failure, ErrorKind};
use crate::formatter::format_message;
use crate::timeout::calculate_delay;

/// Sends `count` messages to the address and closes when all of them are confirmed.
///
/// Without a duration every credit is used up as soon as it arrives. With a duration the
/// messages go out one by one, `duration / count` apart, no matter how fast the broker
/// confirms them.
pub struct Sender {
    core: ClientCore,
    /// Content of `content_from_file`, loaded before connecting.
    file_body: Option<Body>,
    sent: u64,
    confirmed: u64,
    settled: u64,
}

impl Sender {
    pub fn new(config: Arc<ClientConfiguration>) -> Self {
        Self {
            core: ClientCore::new(config),
            file_body: None,
            sent: 0,
            confirmed: 0,
            settled: 0,
        }
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }

    pub fn confirmed(&self) -> u64 {
        self.confirmed
    }

    pub async fn run(&mut self, container: &mut Container) -> Result<()> {
        let config = Arc::clone(&self.core.config);

        config.validate(Role::Sender)?;

        self.file_body = match &config.sender.message.content_from_file {
            Some(path) => Some(read_body(path)?),
            None => None,
        };

        self.core.start();
        self.sent = 0;
        self.confirmed = 0;
        self.settled = 0;

        let params = ConnectionBuilder::new(&config).build(&self.core.reconnect)?;
        let engine = container.engine.as_mut();

        info!("Sender connecting to {}", config.connection.broker);

        let connection = engine.connect(params).map_err(engine_failure)?;
        self.core.context = Context::connection(connection);

        if !config.sender.anonymous {
            match engine.open_sender(connection, sender_options(&config)) {
                Ok(link) => self.core.context.sender = Some(link),
                Err(e) => {
                    self.core.close_now(engine);

                    return Err(engine_failure(e));
                }
            }
        }

        event_loop(self, container).await
    }

    fn is_paced(&self) -> bool {
        !self.core.config.duration.is_zero()
    }

    fn can_send(&self, engine: &dyn Engine) -> bool {
        if self.core.config.sender.anonymous {
            return true;
        }

        self.core.context.sender.is_some_and(|link| engine.sendable(link))
    }

    fn send_messages(&mut self, engine: &mut dyn Engine) -> Result<()> {
        if self.core.timeout.is_ending() {
            return Ok(());
        }

        let count = self.core.config.count;

        if self.is_paced() {
            // Between two ticks the pacer decides, credit alone does not trigger a send.
            if !self.core.pacer.is_armed() && self.sent < count && self.can_send(engine) {
                self.send_next(engine)?;
            }

            return Ok(());
        }

        while self.sent < count && self.can_send(engine) {
            self.send_next(engine)?;
        }

        Ok(())
    }

    fn send_next(&mut self, engine: &mut dyn Engine) -> Result<()> {
        let config = Arc::clone(&self.core.config);
        let message = create_message(&config, self.file_body.as_ref(), self.sent);
        let printed = config.log_msgs.map(|format| format_message(&message, format));

        if config.sender.anonymous {
            let Some(connection) = self.core.context.connection else {
                return client_error!(ErrorKind::Engine, "Connection is not open");
            };

            engine.send_anonymous(connection, message).map_err(engine_failure)?;
        } else {
            let Some(link) = self.core.context.sender else {
                return client_error!(ErrorKind::Engine, "Sender is not attached");
            };

            engine.send(link, message).map_err(engine_failure)?;
        }

        self.sent += 1;

        if let Some(line) = printed {
            println!("{line}");
        }

        self.core.reset_timeout();

        if self.is_paced() && self.sent < config.count {
            let delay = calculate_delay(config.count, config.duration);

            self.core.pacer.schedule(delay, self.core.context);
        }

        Ok(())
    }

    fn on_accepted(&mut self, engine: &mut dyn Engine) {
        self.confirmed += 1;

        if self.confirmed != self.core.config.count {
            return;
        }

        self.core.pacer.clear();

        if self.core.config.sender.auto_settle_off {
            debug!("All {} messages accepted, waiting for settlement", self.confirmed);

            return;
        }

        info!("All {} messages accepted", self.confirmed);

        self.finish(engine);
    }

    fn on_settled(&mut self, engine: &mut dyn Engine) {
        self.settled += 1;

        if self.core.config.sender.auto_settle_off && self.settled == self.core.config.count {
            info!("All {} messages settled", self.settled);

            self.finish(engine);
        }
    }

    /// Resets the counters so that `run` can be called again, then closes.
    fn finish(&mut self, engine: &mut dyn Engine) {
        self.sent = 0;
        self.confirmed = 0;
        self.settled = 0;

        self.core.timeout.cancel();
        self.core.close(engine, self.core.close_sleep);
    }
}

impl EventHandler for Sender {
    fn core(&mut self) -> &mut ClientCore {
        &mut self.core
    }

    fn on_event(&mut self, engine: &mut dyn Engine, event: Event) -> Result<()> {
        match event {
            Event::ConnectionOpen { connection } => {
                self.core.context.connection = Some(connection);

                if self.core.config.sender.anonymous {
                    self.core.arm_timeout();
                    self.send_messages(engine)?;
                }

                Ok(())
            }
            Event::SenderOpen { link, .. } => {
                debug!("Sender {:?} attached", link);

                self.core.context.sender = Some(link);
                self.core.arm_timeout();

                if self.core.config.count == 0 {
                    self.core.close(engine, self.core.close_sleep);
                }

                Ok(())
            }
            Event::Sendable { .. } => self.send_messages(engine),
            Event::Accepted { .. } => {
                self.on_accepted(engine);

                Ok(())
            }
            Event::Settled { .. } => {
                self.on_settled(engine);

                Ok(())
            }
            Event::Released { link, delivery, .. } => self.core.on_released(engine, link, delivery),
            other => self.core.on_common_event(other),
        }
    }

    fn on_tick(&mut self, engine: &mut dyn Engine, _context: Context) -> Result<()> {
        if !self.core.timeout.is_ending() && self.sent < self.core.config.count && self.can_send(engine) {
            self.send_next(engine)?;
        }

        Ok(())
    }
}

pub fn sender_options(config: &ClientConfiguration) -> SenderOptions {
    let settle_mode = if config.link_at_most_once {
        SettleMode::Settled
    } else if config.link_at_least_once {
        SettleMode::Unsettled
    } else {
        SettleMode::Mixed
    };

    SenderOptions {
        target: Some(config.address.clone()),
        durable: config.durable,
        settle_mode,
        auto_settle: !config.sender.auto_settle_off,
    }
}

/// Builds the message of the given zero based index. The body is taken from the file, the map,
/// the list or the text content, the first one that is set.
pub fn create_message(config: &ClientConfiguration, file_body: Option<&Body>, index: u64) -> Message {
    let m: &MessageConfig = &config.sender.message;

    let body = if let Some(body) = file_body {
        body.clone()
    } else if !m.map_content.is_empty() {
        Body::Map(m.map_content.clone())
    } else if !m.list_content.is_empty() {
        Body::List(m.list_content.clone())
    } else if let Some(content) = &m.content {
        Body::Text(content.replace("%d", &index.to_string()))
    } else {
        Body::Empty
    };

    Message {
        durable: m.durable,
        priority: m.priority,
        ttl: m.ttl,
        message_id: m.id.clone(),
        user_id: m.user_id.clone(),
        to: Some(config.address.clone()),
        subject: m.subject.clone(),
        reply_to: m.reply_to.clone(),
        correlation_id: m.correlation_id.clone(),
        content_type: m.content_type.clone(),
        group_id: m.group_id.clone(),
        group_sequence: m.group_sequence,
        reply_to_group_id: m.reply_to_group_id.clone(),
        application_properties: m.properties.clone(),
        message_annotations: m.annotations.clone(),
        body,
        ..Default::default()
    }
}

fn read_body(path: &std::path::Path) -> Result<Body> {
    match std::fs::read(path) {
        Ok(content) => Ok(match String::from_utf8(content) {
            Ok(text) => Body::Text(text),
            Err(e) => Body::Binary(e.into_bytes().into()),
        }),
        Err(e) => client_error!(ErrorKind::Io, format!("Cannot read {}: {e}", path.display())),
    }
}
