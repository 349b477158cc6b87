//! Tier table: the ordered capability levels a job can run on.
//!
//! Tier 0 is the cheapest. Each tier maps to an execution preset (the model
//! identifier handed to the backend) and a human-readable label.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// One capability level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tier {
    /// Position in the table; must equal the tier's index.
    pub index: usize,
    /// Backend preset or model identifier used for this tier.
    pub model: String,
    /// Display name.
    pub label: String,
}

impl Tier {
    pub fn new(index: usize, model: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            index,
            model: model.into(),
            label: label.into(),
        }
    }
}

/// Ordered list of tiers, indexed `0..=max_tier`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TierTable {
    tiers: Vec<Tier>,
}

impl TierTable {
    /// Build a validated table.
    pub fn new(tiers: Vec<Tier>) -> Result<Self, ConfigError> {
        let table = Self { tiers };
        table.validate()?;
        Ok(table)
    }

    /// Build a table from labels, using `@preset/<label>` as the model.
    pub fn from_labels<I, S>(labels: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tiers = labels
            .into_iter()
            .enumerate()
            .map(|(index, label)| {
                let label = label.into();
                Tier::new(index, format!("@preset/{}", label), label)
            })
            .collect();
        Self::new(tiers)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tiers.is_empty() {
            return Err(ConfigError::InvariantViolation(
                "tier table must contain at least one tier".to_string(),
            ));
        }
        for (position, tier) in self.tiers.iter().enumerate() {
            if tier.index != position {
                return Err(ConfigError::InvariantViolation(format!(
                    "tier at position {} declares index {}",
                    position, tier.index
                )));
            }
            if tier.model.trim().is_empty() || tier.label.trim().is_empty() {
                return Err(ConfigError::InvariantViolation(format!(
                    "tier {} must have a non-empty model and label",
                    position
                )));
            }
        }
        Ok(())
    }

    /// Highest valid tier index.
    pub fn max_tier(&self) -> usize {
        self.tiers.len().saturating_sub(1)
    }

    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Tier> {
        self.tiers.get(index)
    }

    /// Label for a tier, or `tier-<index>` when it does not exist.
    pub fn label(&self, index: usize) -> String {
        self.get(index)
            .map(|t| t.label.clone())
            .unwrap_or_else(|| format!("tier-{}", index))
    }

    /// Fail with `TierOutOfRange` if `index` is not in the table.
    pub fn check(&self, index: usize) -> Result<&Tier, ConfigError> {
        self.get(index).ok_or(ConfigError::TierOutOfRange {
            tier: index,
            max_tier: self.max_tier(),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tier> {
        self.tiers.iter()
    }
}

impl Default for TierTable {
    fn default() -> Self {
        Self {
            tiers: vec![
                Tier::new(0, "@preset/cheapskate", "cheapskate"),
                Tier::new(1, "@preset/default", "default"),
                Tier::new(2, "@preset/big-brain", "big-brain"),
            ],
        }
    }
}
