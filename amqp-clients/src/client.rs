//! State and event loop shared by the sender and the receiver.
//!
//! A client instance is driven by one task. Engine events, the close deadline and the pacing
//! deadline are multiplexed with `select!`, so handlers run one at a time and mutate the
//! instance without locking. Fatal conditions come back from the handlers as errors; the loop
//! closes the link and the connection before it hands them to the caller.

use std::sync::Arc;
use std::time::Duration;

use amqp_engine::{Container, Context, DeliveryId, Engine, ErrorCondition, Event, LinkId};
use anyhow::Result;
use log::{debug, error, info, trace, warn};

use crate::client_error;
use crate::config::ClientConfiguration;
use crate::error::{engine_failure, ErrorKind};
use crate::model::ReleaseAction;
use crate::reconnect::ReconnectTracker;
use crate::timeout::{Pacer, TimeoutController, TimerAction};

pub struct ClientCore {
    pub config: Arc<ClientConfiguration>,
    pub timeout: TimeoutController,
    pub pacer: Pacer,
    pub reconnect: ReconnectTracker,
    /// The connection and links the instance works on.
    pub context: Context,
    /// Grace period of a timed out close, the configured one unless a role overrides it.
    pub close_sleep: Duration,
    listening: bool,
    finished: bool,
}

impl ClientCore {
    pub fn new(config: Arc<ClientConfiguration>) -> Self {
        let reconnect = ReconnectTracker::new(config.connection.reconnect.limit);
        let close_sleep = config.close_sleep;

        Self {
            config,
            timeout: TimeoutController::new(),
            pacer: Pacer::default(),
            reconnect,
            context: Context::default(),
            close_sleep,
            listening: false,
            finished: false,
        }
    }

    /// Prepares the instance for a new run.
    pub fn start(&mut self) {
        self.timeout.restart();
        self.pacer.clear();
        self.reconnect.reset();
        self.context = Context::default();
        self.close_sleep = self.config.close_sleep;
        self.listening = false;
        self.finished = false;
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn listen(&mut self, engine: &mut dyn Engine, port: u16) -> Result<()> {
        engine.listen(port).map_err(engine_failure)?;
        self.listening = true;

        info!("Listening on port {port}");

        Ok(())
    }

    /// Arms the idle timeout if one is configured.
    pub fn arm_timeout(&mut self) {
        let timeout = self.config.timeout;

        if !timeout.is_zero() {
            self.timeout.arm(timeout, self.context);
        }
    }

    pub fn reset_timeout(&mut self) {
        self.timeout.reset(self.context);
    }

    /// Closes after `grace`, or right now if it is zero. A close in progress is not restarted.
    pub fn close(&mut self, engine: &mut dyn Engine, grace: Duration) {
        if self.finished || self.timeout.is_ending() {
            return;
        }

        self.pacer.clear();

        if self.timeout.begin_close(grace, self.context) {
            self.close_now(engine);
        }
    }

    /// Detaches the links, closes the connection and stops the listener.
    pub fn close_now(&mut self, engine: &mut dyn Engine) {
        if self.finished {
            return;
        }

        debug!("Closing {:?}", self.context);

        if let Some(link) = self.context.receiver.take() {
            engine.detach(link);
        }

        if let Some(link) = self.context.sender.take() {
            engine.detach(link);
        }

        if let Some(connection) = self.context.connection.take() {
            engine.close(connection);
        }

        if self.listening {
            engine.stop_listening();
            self.listening = false;
        }

        self.pacer.clear();
        self.timeout.closed();
        self.finished = true;
    }

    pub fn on_timer(&mut self, engine: &mut dyn Engine, action: TimerAction, context: Context) {
        trace!("Timer {:?} fired for {:?}", action, context);

        match action {
            TimerAction::CloseAfterGrace => self.close(engine, self.close_sleep),
            TimerAction::CloseNow => self.close_now(engine),
        }
    }

    pub fn on_disconnect(&mut self, error: Option<&ErrorCondition>) -> Result<()> {
        // The idle deadline belongs to the dead connection. A started close still finishes.
        self.timeout.cancel();
        self.pacer.clear();

        if let Some(error) = error {
            warn!("Disconnected: {error}");
        }

        if !self.config.connection.reconnect.enabled {
            info!("Disconnected, reconnect is disabled");

            self.timeout.closed();
            self.finished = true;

            return Ok(());
        }

        self.reconnect.on_disconnect()
    }

    pub fn on_connection_error(&mut self, error: &ErrorCondition) -> Result<()> {
        if error.is_connection_forced() {
            warn!("Connection closed by peer: {error}");

            return Ok(());
        }

        client_error!(ErrorKind::Connection, error.to_string())
    }

    pub fn on_released(&mut self, engine: &mut dyn Engine, link: LinkId, delivery: DeliveryId) -> Result<()> {
        match self.config.sender.release_action {
            ReleaseAction::Ignore => {
                debug!("Delivery {:?} released", delivery);

                Ok(())
            }
            ReleaseAction::Retry => {
                debug!("Delivery {:?} released, sending it again", delivery);

                engine.resend(link, delivery).map_err(engine_failure)?;

                Ok(())
            }
            ReleaseAction::Fail => client_error!(ErrorKind::Released, format!("Delivery {:?} released", delivery)),
        }
    }

    /// Handles the events every role reacts to in the same way.
    pub fn on_common_event(&mut self, event: Event) -> Result<()> {
        match event {
            Event::ConnectionOpen { connection } => {
                debug!("Connection {:?} open", connection);

                Ok(())
            }
            Event::ConnectionError { error, .. } => self.on_connection_error(&error),
            Event::Disconnected { error, .. } => self.on_disconnect(error.as_ref()),
            Event::Rejected { delivery, error, .. } => client_error!(
                ErrorKind::Rejected,
                format!("Delivery {:?} rejected: {error}", delivery)
            ),
            Event::ProtocolError { description, .. } => client_error!(ErrorKind::Protocol, description),
            other => {
                trace!("Unhandled event {}", other.name());

                Ok(())
            }
        }
    }
}

/// A role plugged into [`event_loop`].
pub trait EventHandler {
    fn core(&mut self) -> &mut ClientCore;

    fn on_event(&mut self, engine: &mut dyn Engine, event: Event) -> Result<()>;

    /// The pacing deadline passed.
    fn on_tick(&mut self, engine: &mut dyn Engine, context: Context) -> Result<()>;
}

enum Wake {
    Event(Event),
    Timer(TimerAction, Context),
    Tick(Context),
    Closed,
}

/// Runs `handler` until it closes, fails or the engine drops the event stream.
pub async fn event_loop<H: EventHandler>(handler: &mut H, container: &mut Container) -> Result<()> {
    let Container { id, engine, events } = container;
    let engine = engine.as_mut();

    debug!("Event loop of container {id} started");

    while !handler.core().is_finished() {
        let wake = {
            let core = handler.core();

            tokio::select! {
                biased;

                event = events.recv() => match event {
                    Some(event) => Wake::Event(event),
                    None => Wake::Closed,
                },
                (action, context) = core.timeout.expired() => Wake::Timer(action, context),
                context = core.pacer.expired() => Wake::Tick(context),
            }
        };

        let result = match wake {
            Wake::Event(event) => {
                trace!("Event {} {:?}", event.name(), event.connection());

                handler.on_event(engine, event)
            }
            Wake::Timer(action, context) => {
                handler.core().on_timer(engine, action, context);

                Ok(())
            }
            Wake::Tick(context) => handler.on_tick(engine, context),
            Wake::Closed => {
                debug!("Event stream of container {id} closed");

                break;
            }
        };

        if let Err(e) = result {
            error!("Client failed {:?}", e);

            handler.core().close_now(engine);

            return Err(e);
        }
    }

    debug!("Event loop of container {id} finished");

    Ok(())
}
