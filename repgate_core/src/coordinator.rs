//! Serialized access to the ledger, with change notification.
//!
//! Every mutation runs as one transaction under a single mutex:
//! begin (store lock + latest record) → ledger operation → commit (events,
//! then record). Notifications are queued inside that critical section so
//! observers see them in commit order. Commits made by other processes
//! sharing the store are picked up by `refresh`.

use crate::broadcast::{Broadcaster, Subscription};
use crate::catalog::ExerciseCatalog;
use crate::config::CoordinatorConfig;
use crate::ledger::Ledger;
use crate::store::{LedgerStore, MemoryStore};
use crate::{Award, BalanceSnapshot, CompletionEvent, LedgerEvent, Notification, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

struct Inner {
    ledger: Ledger,
    store: Box<dyn LedgerStore>,
    // Balance observers were last told about
    published: BalanceSnapshot,
}

/// Single entry point for every caller that reads or changes the balance
pub struct TransactionCoordinator {
    inner: Mutex<Inner>,
    broadcaster: Broadcaster,
}

impl TransactionCoordinator {
    pub fn new(store: impl LedgerStore + 'static, config: &CoordinatorConfig) -> Result<Self> {
        let published = store.read()?.snapshot();
        Ok(Self {
            inner: Mutex::new(Inner {
                ledger: Ledger::new(),
                store: Box::new(store),
                published,
            }),
            broadcaster: Broadcaster::new(config),
        })
    }

    /// Coordinator over a fresh in-memory ledger
    pub fn in_memory() -> Result<Self> {
        Self::new(MemoryStore::new(), &CoordinatorConfig::default())
    }

    /// Run `op` as one ledger transaction.
    ///
    /// Events the op records are committed even when the op itself returns
    /// an error (a refused spend is still audited). `notify` builds the
    /// notifications to queue when the counters changed.
    fn transact<T>(
        &self,
        op: impl FnOnce(&mut Ledger) -> Result<T>,
        notify: impl FnOnce(&T, BalanceSnapshot) -> Vec<Notification>,
    ) -> Result<T> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let before = inner.store.begin()?;
        inner.ledger.restore(before.clone());
        inner.ledger.drain_history();

        let outcome = op(&mut inner.ledger);
        let events = inner.ledger.drain_history();
        let after = inner.ledger.record().clone();

        if events.is_empty() && after == before {
            inner.store.rollback();
            return outcome;
        }

        if let Err(e) = inner.store.commit(&after, &events) {
            tracing::error!("Ledger commit failed, rolling back: {}", e);
            inner.ledger.restore(before);
            return Err(e);
        }

        for event in &events {
            tracing::info!(
                kind = event.kind.as_str(),
                amount = event.amount,
                "Ledger event committed"
            );
        }

        let value = outcome?;
        if after != before {
            let snapshot = after.snapshot();
            for note in notify(&value, snapshot) {
                self.broadcaster.publish(note);
            }
            inner.published = snapshot;
        }
        Ok(value)
    }

    /// Add earned credits. Returns the new available balance.
    pub fn credit(&self, amount: i64) -> Result<u64> {
        self.transact(
            |ledger| ledger.credit(amount),
            |_, snapshot| vec![snapshot.into()],
        )
    }

    /// Spend credits if the balance covers them. Returns the remaining balance.
    pub fn spend(&self, amount: i64) -> Result<u64> {
        let result = self.transact(
            |ledger| ledger.spend(amount),
            |_, snapshot| vec![snapshot.into()],
        );
        if let Err(e) = &result {
            tracing::info!("Spend of {} refused: {}", amount, e);
        }
        result
    }

    /// Validate an exercise completion and credit its award
    pub fn record_completion(
        &self,
        event: &CompletionEvent,
        catalog: &ExerciseCatalog,
    ) -> Result<Award> {
        let award = catalog.validate_completion(event)?;

        let award = self.transact(
            |ledger| {
                ledger.credit_for(&award)?;
                Ok(award)
            },
            |award, snapshot| vec![Notification::from(award), snapshot.into()],
        )?;
        tracing::info!("{}", award.message);
        Ok(award)
    }

    /// Zero both counters
    pub fn reset(&self) -> Result<()> {
        self.transact(
            |ledger| {
                ledger.reset();
                Ok(())
            },
            |_, snapshot| vec![snapshot.into()],
        )?;
        tracing::info!("Ledger reset");
        Ok(())
    }

    /// Latest committed balance
    pub fn snapshot(&self) -> Result<BalanceSnapshot> {
        let guard = self.inner.lock();
        Ok(guard.store.read()?.snapshot())
    }

    /// Recorded ledger events, newest first
    pub fn history(&self, since: Option<DateTime<Utc>>) -> Result<Vec<LedgerEvent>> {
        let guard = self.inner.lock();
        guard.store.history(since)
    }

    /// Archive the live event log
    pub fn rollup(&self) -> Result<usize> {
        let mut guard = self.inner.lock();
        guard.store.rollup()
    }

    /// Publish the stored balance if it moved since observers last heard,
    /// e.g. after a commit by another process. Returns whether it did.
    pub fn refresh(&self) -> Result<bool> {
        let mut guard = self.inner.lock();
        let current = guard.store.read()?.snapshot();
        Ok(self.publish_if_changed(&mut guard, current))
    }

    /// Register an observer. Its first notification is the current balance.
    pub fn subscribe(&self, name: impl Into<String>) -> Result<Subscription> {
        // Holding the lock pins the initial snapshot between commits
        let mut guard = self.inner.lock();
        let snapshot = guard.store.read()?.snapshot();
        self.publish_if_changed(&mut guard, snapshot);
        self.broadcaster.subscribe(name, snapshot.into())
    }

    fn publish_if_changed(&self, inner: &mut Inner, current: BalanceSnapshot) -> bool {
        if current == inner.published {
            return false;
        }
        tracing::debug!("Ledger changed outside this process: {:?}", current);
        self.broadcaster.publish(current.into());
        inner.published = current;
        true
    }
}
