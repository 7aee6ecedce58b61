//! Earned/spent ledger aggregate.
//!
//! The ledger is plain data: it performs no I/O and no locking. The
//! [`TransactionCoordinator`](crate::coordinator::TransactionCoordinator)
//! owns a ledger and serializes every call into it.

use crate::{
    Award, BalanceSnapshot, Error, LedgerEvent, LedgerEventKind, LedgerRecord, Result,
};
use chrono::Utc;

#[derive(Clone, Debug, Default)]
pub struct Ledger {
    record: LedgerRecord,
    history: Vec<LedgerEvent>,
}

fn validate_amount(amount: i64) -> Result<u64> {
    if amount <= 0 {
        return Err(Error::InvalidAmount(amount));
    }
    Ok(amount as u64)
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rehydrate from a durable record. Undrained history is kept.
    pub fn restore(&mut self, record: LedgerRecord) {
        self.record = record;
    }

    /// Increase `earned`. Returns the new available balance.
    pub fn credit(&mut self, amount: i64) -> Result<u64> {
        let amount = validate_amount(amount)?;
        self.apply_credit(amount, LedgerEvent::new(LedgerEventKind::Earn, amount))
    }

    /// Credit an exercise award, recording what earned it
    pub fn credit_for(&mut self, award: &Award) -> Result<u64> {
        let amount = validate_amount(award.credits as i64)?;
        let mut event = LedgerEvent::new(LedgerEventKind::Earn, amount);
        event.exercise = Some(award.exercise_kind.clone());
        event.reps = Some(award.reps);
        self.apply_credit(amount, event)
    }

    fn apply_credit(&mut self, amount: u64, event: LedgerEvent) -> Result<u64> {
        let earned = self
            .record
            .earned
            .checked_add(amount)
            .ok_or(Error::CounterOverflow {
                counter: "earned",
                amount,
            })?;

        self.record.earned = earned;
        self.record.updated_at = Some(event.at);
        self.history.push(event);
        Ok(self.record.available())
    }

    /// Increase `spent` if the balance covers it.
    ///
    /// A refused spend leaves the counters alone but is still recorded as a
    /// `spend_rejected` event.
    pub fn spend(&mut self, amount: i64) -> Result<u64> {
        let amount = validate_amount(amount)?;
        let available = self.record.available();

        if available < amount {
            self.history
                .push(LedgerEvent::new(LedgerEventKind::SpendRejected, amount));
            return Err(Error::InsufficientBalance {
                requested: amount,
                available,
            });
        }

        let event = LedgerEvent::new(LedgerEventKind::Spend, amount);
        self.record.spent += amount;
        self.record.updated_at = Some(event.at);
        self.history.push(event);
        Ok(self.record.available())
    }

    pub fn snapshot(&self) -> BalanceSnapshot {
        self.record.snapshot()
    }

    pub fn record(&self) -> &LedgerRecord {
        &self.record
    }

    /// Zero both counters. Operator action: no history is recorded.
    pub fn reset(&mut self) {
        self.record = LedgerRecord {
            earned: 0,
            spent: 0,
            updated_at: Some(Utc::now()),
        };
    }

    /// Events recorded since the last drain, oldest first
    pub fn history(&self) -> &[LedgerEvent] {
        &self.history
    }

    /// Take the events recorded since the last drain
    pub fn drain_history(&mut self) -> Vec<LedgerEvent> {
        std::mem::take(&mut self.history)
    }
}
