//! Best-effort fan-out of ledger notifications to observers.
//!
//! Backed by a `tokio::sync::broadcast` channel. Publishing never waits on an
//! observer: every observer reads from its own position in a bounded ring,
//! and one that falls more than `observer_capacity` notifications behind
//! loses the oldest ones. The loss is counted on that subscription and
//! logged; it is never retried and never reported to the publisher.

use crate::config::CoordinatorConfig;
use crate::{Error, Notification, Result};
use std::time::Duration;
use tokio::runtime::{Builder, Runtime};
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};

/// Receiving end of an observer registration
///
/// Dropping the subscription detaches the observer.
pub struct Subscription {
    name: String,
    initial: Option<Notification>,
    rx: broadcast::Receiver<Notification>,
    // Drives timed receives from synchronous callers
    runtime: Runtime,
    missed: u64,
}

impl Subscription {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Block until a notification arrives. `None` once the broadcaster is
    /// gone and everything queued has been read.
    pub fn recv(&mut self) -> Option<Notification> {
        if let Some(note) = self.initial.take() {
            return Some(note);
        }

        loop {
            match self.runtime.block_on(self.rx.recv()) {
                Ok(note) => return Some(note),
                Err(RecvError::Lagged(n)) => self.record_missed(n),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    pub fn recv_timeout(&mut self, timeout: Duration) -> Option<Notification> {
        if let Some(note) = self.initial.take() {
            return Some(note);
        }

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let rx = &mut self.rx;
            let result = self
                .runtime
                .block_on(async move { tokio::time::timeout_at(deadline, rx.recv()).await });

            match result {
                Ok(Ok(note)) => return Some(note),
                Ok(Err(RecvError::Lagged(n))) => self.record_missed(n),
                Ok(Err(RecvError::Closed)) | Err(_) => return None,
            }
        }
    }

    pub fn try_recv(&mut self) -> Option<Notification> {
        if let Some(note) = self.initial.take() {
            return Some(note);
        }

        loop {
            match self.rx.try_recv() {
                Ok(note) => return Some(note),
                Err(TryRecvError::Lagged(n)) => self.record_missed(n),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    /// Notifications lost because this observer fell too far behind
    pub fn missed(&self) -> u64 {
        self.missed
    }

    fn record_missed(&mut self, n: u64) {
        self.missed += n;
        let err = Error::ObserverTimeout {
            observer: self.name.clone(),
            missed: n,
        };
        tracing::warn!("{}", err);
    }
}

/// Publishing side owned by the coordinator
pub struct Broadcaster {
    sender: broadcast::Sender<Notification>,
}

impl Broadcaster {
    pub fn new(config: &CoordinatorConfig) -> Self {
        let (sender, _) = broadcast::channel(config.observer_capacity.max(1));
        Self { sender }
    }

    /// Queue a notification behind everything published before it
    pub fn publish(&self, note: Notification) {
        // Err only means nobody is listening
        if self.sender.send(note).is_err() {
            tracing::trace!("No observers attached");
        }
    }

    /// Register an observer whose first notification is `initial`
    pub fn subscribe(&self, name: impl Into<String>, initial: Notification) -> Result<Subscription> {
        let runtime = Builder::new_current_thread().enable_time().build()?;
        let name = name.into();
        tracing::debug!("Observer '{}' attached", name);

        Ok(Subscription {
            name,
            initial: Some(initial),
            rx: self.sender.subscribe(),
            runtime,
            missed: 0,
        })
    }

    pub fn observer_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
