//! Invocation-scoped external-call budget.
//!
//! The hosting platform enforces a hard per-invocation limit on outbound
//! calls (50); the ceiling here stays strictly below it to leave headroom
//! for framework overhead. Dedup lookup, record fetch, embed, and upsert
//! each charge one unit.

/// Default ceiling under the hard platform limit of 50.
pub const DEFAULT_CEILING: u32 = 45;

/// Budgeted calls one full per-record pipeline needs
/// (dedup + fetch + embed + upsert).
pub const CALLS_PER_PIPELINE: u32 = 4;

/// A serial counter of budgeted external calls.
#[derive(Debug, Clone)]
pub struct CallBudget {
    used: u32,
    ceiling: u32,
}

impl CallBudget {
    pub fn new(ceiling: u32) -> Self {
        Self { used: 0, ceiling }
    }

    /// Charge one budgeted call.
    pub fn charge(&mut self) {
        self.used += 1;
    }

    pub fn used(&self) -> u32 {
        self.used
    }

    pub fn remaining(&self) -> u32 {
        self.ceiling.saturating_sub(self.used)
    }

    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }

    /// Whether a full per-record pipeline still fits.
    pub fn can_run_pipeline(&self) -> bool {
        self.remaining() >= CALLS_PER_PIPELINE
    }

    /// Whether one more call fits.
    pub fn can_charge(&self) -> bool {
        self.remaining() >= 1
    }
}

impl Default for CallBudget {
    fn default() -> Self {
        Self::new(DEFAULT_CEILING)
    }
}
