//! Timers of a client instance.
//!
//! A client has exactly one close deadline at a time, owned by the [`TimeoutController`].
//! Arming always replaces the previous deadline, so resetting the idle timeout on every message
//! never stacks timers. Pacing of sends and credit grants runs on a separate [`Pacer`].

use std::future::pending;
use std::pin::Pin;
use std::time::Duration;

use amqp_engine::Context;
use log::trace;
use tokio::time::{sleep, Sleep};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerState {
    Idle,
    Armed,
    /// The idle deadline passed or close was requested, the grace deadline is pending.
    Firing,
    Closed,
}

/// What to do when the deadline passes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerAction {
    /// The idle timeout elapsed, close honouring the close-sleep grace period.
    CloseAfterGrace,
    /// The grace period elapsed, close immediately.
    CloseNow,
}

pub struct TimeoutController {
    state: TimerState,
    /// The idle timeout used when the deadline is reset.
    period: Duration,
    /// Set once shutdown started, arming is a no-op afterwards.
    end_state: bool,
    deadline: Option<Pin<Box<Sleep>>>,
    action: TimerAction,
    context: Context,
}

impl Default for TimeoutController {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeoutController {
    pub fn new() -> Self {
        Self {
            state: TimerState::Idle,
            period: Duration::ZERO,
            end_state: false,
            deadline: None,
            action: TimerAction::CloseAfterGrace,
            context: Context::default(),
        }
    }

    /// Forgets everything of a previous run.
    pub fn restart(&mut self) {
        *self = Self::new();
    }

    pub fn state(&self) -> TimerState {
        self.state
    }

    pub fn is_ending(&self) -> bool {
        self.end_state
    }

    /// Arms the idle deadline `period` from now, cancelling the pending one. Zero period only
    /// cancels.
    pub fn arm(&mut self, period: Duration, context: Context) {
        if self.end_state {
            trace!("Timer is not armed, client is closing");
            return;
        }

        self.cancel();

        if period.is_zero() {
            return;
        }

        trace!("Arm timer {:?} for {:?}", period, context);

        self.period = period;
        self.schedule(period, TimerAction::CloseAfterGrace, context);
        self.state = TimerState::Armed;
    }

    /// Re-arms the idle deadline with the last period.
    pub fn reset(&mut self, context: Context) {
        if !self.period.is_zero() {
            self.arm(self.period, context);
        }
    }

    /// Drops the idle deadline. The grace deadline of a started close stays, nothing else
    /// would finish the close.
    pub fn cancel(&mut self) {
        if self.end_state {
            trace!("Keep close deadline in state {:?}", self.state);
            return;
        }

        if self.deadline.take().is_some() {
            trace!("Cancel timer in state {:?}", self.state);
        }

        if self.state == TimerState::Armed {
            self.state = TimerState::Idle;
        }
    }

    /// Starts the shutdown. Returns `true` if the caller has to close now, `false` if a grace
    /// deadline was scheduled instead.
    pub fn begin_close(&mut self, grace: Duration, context: Context) -> bool {
        self.end_state = true;
        self.deadline = None;

        if grace.is_zero() {
            self.state = TimerState::Closed;

            return true;
        }

        trace!("Close after grace period {:?}", grace);

        self.schedule(grace, TimerAction::CloseNow, context);
        self.state = TimerState::Firing;

        false
    }

    pub fn closed(&mut self) {
        self.end_state = true;
        self.deadline = None;
        self.state = TimerState::Closed;
    }

    /// Waits for the pending deadline. Never completes if there is none.
    pub async fn expired(&mut self) -> (TimerAction, Context) {
        match self.deadline.as_mut() {
            Some(deadline) => {
                deadline.as_mut().await;

                self.deadline = None;

                if self.state == TimerState::Armed {
                    self.state = TimerState::Firing;
                }

                (self.action, self.context)
            }
            None => pending().await,
        }
    }

    fn schedule(&mut self, after: Duration, action: TimerAction, context: Context) {
        self.deadline = Some(Box::pin(sleep(after)));
        self.action = action;
        self.context = context;
    }
}

/// Timer of the next paced step (send or credit grant).
#[derive(Default)]
pub struct Pacer {
    deadline: Option<Pin<Box<Sleep>>>,
    context: Context,
}

impl Pacer {
    pub fn schedule(&mut self, after: Duration, context: Context) {
        self.deadline = Some(Box::pin(sleep(after)));
        self.context = context;
    }

    pub fn clear(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub async fn expired(&mut self) -> Context {
        match self.deadline.as_mut() {
            Some(deadline) => {
                deadline.as_mut().await;

                self.deadline = None;
                self.context
            }
            None => pending().await,
        }
    }
}

/// Delay between two paced steps: `duration / count`, zero if either is zero.
pub fn calculate_delay(count: u64, duration: Duration) -> Duration {
    if count == 0 || duration.is_zero() {
        return Duration::ZERO;
    }

    Duration::from_nanos((duration.as_nanos() / count as u128) as u64)
}
