//! Per-session token accounting.

use serde::{Deserialize, Serialize};

use crate::provider::{Usage, UsageAccuracy};

/// Cumulative input/output token counts for one session.
///
/// Counters only grow through [`TokenLedger::add`]; the total is always
/// derived so it cannot drift from its parts.
#[derive(Debug, Clone, Default)]
pub struct TokenLedger {
    input_tokens: u64,
    output_tokens: u64,
    invocations: u64,
    estimated_invocations: u64,
}

/// A point-in-time copy of a ledger, safe to hand to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub invocations: u64,
    pub estimated_invocations: u64,
}

impl TokenLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulate raw counts.
    pub fn add(&mut self, input_tokens: u64, output_tokens: u64) {
        self.input_tokens = self.input_tokens.saturating_add(input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(output_tokens);
    }

    /// Accumulate the usage of one model invocation.
    pub fn record(&mut self, usage: &Usage) {
        self.add(usage.input_tokens, usage.output_tokens);
        self.invocations += 1;
        if usage.accuracy == UsageAccuracy::Estimated {
            self.estimated_invocations += 1;
        }
    }

    pub fn input_tokens(&self) -> u64 {
        self.input_tokens
    }

    pub fn output_tokens(&self) -> u64 {
        self.output_tokens
    }

    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    /// Whether any recorded invocation was estimated rather than reported.
    pub fn accuracy(&self) -> UsageAccuracy {
        if self.estimated_invocations > 0 {
            UsageAccuracy::Estimated
        } else {
            UsageAccuracy::Exact
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            input_tokens: self.input_tokens,
            output_tokens: self.output_tokens,
            total_tokens: self.total(),
            invocations: self.invocations,
            estimated_invocations: self.estimated_invocations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_is_sum_of_parts() {
        let mut ledger = TokenLedger::new();
        ledger.add(10, 5);
        ledger.add(7, 3);
        assert_eq!(ledger.input_tokens(), 17);
        assert_eq!(ledger.output_tokens(), 8);
        assert_eq!(ledger.total(), ledger.input_tokens() + ledger.output_tokens());
    }

    #[test]
    fn record_tracks_estimates_separately() {
        let mut ledger = TokenLedger::new();
        ledger.record(&Usage::exact(100, 20));
        assert_eq!(ledger.accuracy(), UsageAccuracy::Exact);

        ledger.record(&Usage::estimated(40, 10));
        let snap = ledger.snapshot();
        assert_eq!(snap.total_tokens, 170);
        assert_eq!(snap.invocations, 2);
        assert_eq!(snap.estimated_invocations, 1);
        assert_eq!(ledger.accuracy(), UsageAccuracy::Estimated);
    }

    #[test]
    fn zero_usage_is_harmless() {
        let mut ledger = TokenLedger::new();
        ledger.record(&Usage::default());
        assert_eq!(ledger.total(), 0);
        assert_eq!(ledger.snapshot().invocations, 1);
    }

    #[test]
    fn reset_clears_everything() {
        let mut ledger = TokenLedger::new();
        ledger.record(&Usage::estimated(1, 1));
        ledger.reset();
        assert_eq!(ledger.snapshot(), TokenLedger::new().snapshot());
    }
}
