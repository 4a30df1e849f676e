//! # Sale Finalizer States
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sale Finalizer                                    │
//! │                                                                         │
//! │   Idle ──checkout──► Submitting                                         │
//! │                        │                                                │
//! │        cash / mobile   │   card                                         │
//! │        ┌───────────────┴──────────────┐                                 │
//! │        │                              ▼                                 │
//! │        │                       AwaitingPayment ──cancel──► Idle         │
//! │        │                         │         │                            │
//! │        │                         ▼         ▼                            │
//! │        │            PaymentConfirmed    PaymentFailed ──► Idle          │
//! │        │                         │                                      │
//! │        ▼                         ▼                                      │
//! │      Completing ◄────────────────┘                                      │
//! │        │        ▲                                                       │
//! │        ▼        │ retry_completion                                      │
//! │   Completed   Failed                                                    │
//! │        │                                                                │
//! │        ▼                                                                │
//! │      Idle  (next sale)                                                  │
//! │                                                                         │
//! │   Cart mutation is refused from Submitting through Completing.          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{RegisterError, RegisterResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaleState {
    #[default]
    Idle,
    Submitting,
    AwaitingPayment,
    PaymentConfirmed,
    PaymentFailed,
    Completing,
    Completed,
    /// The sink refused the sale. The transaction is kept for a retry.
    Failed,
}

impl SaleState {
    /// A finalize is running; a second trigger must be rejected.
    pub fn is_busy(self) -> bool {
        matches!(
            self,
            SaleState::Submitting
                | SaleState::AwaitingPayment
                | SaleState::PaymentConfirmed
                | SaleState::PaymentFailed
                | SaleState::Completing
        )
    }

    pub fn can_transition_to(self, next: SaleState) -> bool {
        use SaleState::*;
        matches!(
            (self, next),
            (Idle | Completed | Failed, Submitting)
                | (Submitting, AwaitingPayment | Completing | Idle)
                | (AwaitingPayment, PaymentConfirmed | PaymentFailed | Idle)
                | (PaymentConfirmed, Completing)
                | (PaymentFailed, Idle)
                | (Completing, Completed | Failed)
                | (Completed, Idle)
                | (Failed, Completing | Idle)
        )
    }
}

impl fmt::Display for SaleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SaleState::Idle => "idle",
            SaleState::Submitting => "submitting",
            SaleState::AwaitingPayment => "awaiting payment",
            SaleState::PaymentConfirmed => "payment confirmed",
            SaleState::PaymentFailed => "payment failed",
            SaleState::Completing => "completing",
            SaleState::Completed => "completed",
            SaleState::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Guards the transition table.
#[derive(Debug, Default)]
pub struct Finalizer {
    state: SaleState,
}

impl Finalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SaleState {
        self.state
    }

    /// Moves to `next`, refusing transitions the table does not allow.
    pub fn advance(&mut self, next: SaleState, action: &'static str) -> RegisterResult<SaleState> {
        if !self.state.can_transition_to(next) {
            return Err(RegisterError::InvalidState {
                action,
                state: self.state,
            });
        }
        debug!(from = %self.state, to = %next, "Sale state transition");
        self.state = next;
        Ok(next)
    }
}
