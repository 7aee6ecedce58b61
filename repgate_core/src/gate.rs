//! Spend-one-credit gate in front of the guarded capability.

use crate::catalog::ExerciseCatalog;
use crate::coordinator::TransactionCoordinator;
use crate::{Error, Result};
use serde::Serialize;

/// Short refusal text for callers that only need a one-liner
pub const REFUSAL: &str = "Insufficient requests. Exercise to earn more!";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GateDecision {
    /// One credit was spent
    Allow { remaining: u64 },
    /// Nothing was spent; `reason` tells the caller how to earn more
    Block { available: u64, reason: String },
}

impl GateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, GateDecision::Allow { .. })
    }

    /// Hook payload for a blocked request, `None` when allowed
    pub fn hook_output(&self) -> Option<HookOutput> {
        match self {
            GateDecision::Allow { .. } => None,
            GateDecision::Block { reason, .. } => Some(HookOutput::block(reason.clone())),
        }
    }
}

/// JSON printed on stdout for a plugin hook that refuses a request
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct HookOutput {
    pub decision: &'static str,
    pub reason: String,
}

impl HookOutput {
    pub fn block(reason: String) -> Self {
        Self {
            decision: "block",
            reason,
        }
    }
}

fn block_reason(available: u64, catalog: &ExerciseCatalog) -> String {
    format!(
        "No requests available! (Balance: {})\n\n{}",
        available,
        catalog.remediation()
    )
}

/// Spend one credit for a guarded request
pub fn check(coordinator: &TransactionCoordinator, catalog: &ExerciseCatalog) -> Result<GateDecision> {
    match coordinator.spend(1) {
        Ok(remaining) => {
            tracing::debug!("Request allowed, {} remaining", remaining);
            Ok(GateDecision::Allow { remaining })
        }
        Err(Error::InsufficientBalance { available, .. }) => {
            tracing::info!("{}", REFUSAL);
            Ok(GateDecision::Block {
                available,
                reason: block_reason(available, catalog),
            })
        }
        Err(e) => Err(e),
    }
}
