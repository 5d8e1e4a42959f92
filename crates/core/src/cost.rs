use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

use crate::config::PricingTable;
use crate::model::TokenUsage;

/// Caller identity attached to every model call for cost attribution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallScope {
    pub user_id: String,
    pub manuscript_id: String,
    /// Operation group, e.g. "editorial" or "assets".
    pub group: String,
    /// Operation within the group, e.g. "developmental".
    pub operation: String,
}

impl CallScope {
    pub fn new(
        user_id: impl Into<String>,
        manuscript_id: impl Into<String>,
        group: impl Into<String>,
        operation: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            manuscript_id: manuscript_id.into(),
            group: group.into(),
            operation: operation.into(),
        }
    }
}

/// Append-only usage row. Never mutated after recording.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CostRecord {
    pub user_id: String,
    pub manuscript_id: String,
    pub group: String,
    pub operation: String,
    pub agent: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
    pub recorded_at: DateTime<Utc>,
}

impl CostRecord {
    pub fn from_usage(
        scope: &CallScope,
        agent: &str,
        usage: TokenUsage,
        pricing: &PricingTable,
        model: &str,
    ) -> Self {
        let rates = pricing.rates_for(model);
        Self {
            user_id: scope.user_id.clone(),
            manuscript_id: scope.manuscript_id.clone(),
            group: scope.group.clone(),
            operation: scope.operation.clone(),
            agent: agent.to_string(),
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            cost_usd: rates.cost_usd(usage.input_tokens, usage.output_tokens),
            recorded_at: Utc::now(),
        }
    }
}

pub trait CostSink: Send + Sync {
    fn record(&self, record: CostRecord);
}

#[derive(Default)]
pub struct NullCostSink;

impl CostSink for NullCostSink {
    fn record(&self, _record: CostRecord) {}
}

/// In-memory ledger; the production sink is whatever structured table the
/// host platform provides.
#[derive(Default)]
pub struct MemoryCostLedger {
    records: Mutex<Vec<CostRecord>>,
}

impl MemoryCostLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<CostRecord> {
        self.records
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    pub fn total_for_manuscript(&self, manuscript_id: &str) -> f64 {
        self.records()
            .iter()
            .filter(|record| record.manuscript_id == manuscript_id)
            .map(|record| record.cost_usd)
            .sum()
    }

    pub fn count_for_agent(&self, agent: &str) -> usize {
        self.records()
            .iter()
            .filter(|record| record.agent == agent)
            .count()
    }
}

impl CostSink for MemoryCostLedger {
    fn record(&self, record: CostRecord) {
        if let Ok(mut guard) = self.records.lock() {
            guard.push(record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope() -> CallScope {
        CallScope::new("u1", "m1", "editorial", "developmental")
    }

    #[test]
    fn ledger_sums_costs_per_manuscript() {
        let ledger = MemoryCostLedger::new();
        let pricing = PricingTable::default();
        let usage = TokenUsage {
            input_tokens: 1_000_000,
            output_tokens: 0,
        };
        ledger.record(CostRecord::from_usage(
            &scope(),
            "developmental",
            usage,
            &pricing,
            "claude-3-5-sonnet-20241022",
        ));
        ledger.record(CostRecord::from_usage(
            &CallScope::new("u1", "m2", "editorial", "developmental"),
            "developmental",
            usage,
            &pricing,
            "claude-3-5-sonnet-20241022",
        ));

        assert!((ledger.total_for_manuscript("m1") - 3.0).abs() < 1e-9);
        assert_eq!(ledger.count_for_agent("developmental"), 2);
    }
}
