//! Per-turn usage accounting

use crate::protocol::UsageItem;
use crate::providers::ProviderType;

/// Collects the usage of every turn in one provider attempt
#[derive(Debug, Clone, PartialEq)]
pub struct UsageAccumulator {
    provider: ProviderType,
    model: String,
    turns: Vec<UsageItem>,
}

impl UsageAccumulator {
    pub fn new(provider: ProviderType, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            turns: Vec::new(),
        }
    }

    /// Record the usage of one vendor call
    pub fn record(&mut self, usage: UsageItem) {
        self.turns.push(usage);
    }

    /// Usage of each recorded turn, in order
    pub fn turns(&self) -> &[UsageItem] {
        &self.turns
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Sum of all turns, attributed to this attempt's provider and model
    pub fn total(&self) -> UsageItem {
        self.turns.iter().fold(
            UsageItem::zero(self.provider, self.model.clone()),
            |mut total, turn| {
                total.input += turn.input;
                total.output += turn.output;
                total.reasoning += turn.reasoning;
                total.total += turn.total;
                total
            },
        )
    }
}
