use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use amqp_engine::{Endpoint, FailoverResolver};
use anyhow::Result;
use log::warn;

use crate::client_error;
use crate::error::ErrorKind;

/// Counts the disconnects of one client instance and gives up when the limit is reached.
///
/// The engine does the retrying and the backoff. The tracker only counts, and its counter
/// drives the failover resolver so every retry goes to the next broker of the list.
#[derive(Clone, Debug, Default)]
pub struct ReconnectTracker {
    count: Arc<AtomicU32>,
    limit: Option<u32>,
}

impl ReconnectTracker {
    pub fn new(limit: Option<u32>) -> Self {
        Self {
            count: Arc::new(AtomicU32::new(0)),
            limit,
        }
    }

    pub fn count(&self) -> u32 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn reset(&mut self) {
        self.count.store(0, Ordering::Relaxed);
    }

    /// Counts a disconnect. Fails when the count becomes equal to the limit.
    pub fn on_disconnect(&mut self) -> Result<()> {
        let count = self.count.fetch_add(1, Ordering::Relaxed) + 1;

        warn!("Disconnected, reconnect count {count}");

        // Equality on purpose: the limit is the number of reconnect attempts allowed.
        if Some(count) == self.limit {
            return client_error!(ErrorKind::ReconnectLimit, format!("Disconnect, reconnect limit {count} reached"));
        }

        Ok(())
    }

    /// Resolver picking `hosts[reconnect count mod hosts.len()]` on every connection attempt.
    pub fn failover_resolver(&self, hosts: Vec<Endpoint>) -> FailoverResolver {
        let count = Arc::clone(&self.count);

        Arc::new(move || {
            let index = count.load(Ordering::Relaxed) as usize % hosts.len();

            hosts[index].clone()
        })
    }
}
