//! Rule status and conditions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Condition reporting whether a rule can match and deliver
pub const READY_CONDITION: &str = "Ready";

/// Reasons recorded on conditions
pub mod reasons {
    pub const SUCCEEDED: &str = "Succeeded";
    pub const DELIVERY_FAILED: &str = "DeliveryFailed";
    pub const INVALID_CONFIGURATION: &str = "InvalidConfiguration";
    pub const PROVIDER_NOT_FOUND: &str = "ProviderNotFound";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

/// A named, timestamped status entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: ConditionStatus,
    pub reason: String,
    pub message: String,
    pub last_transition_time: DateTime<Utc>,
    pub observed_generation: i64,
}

impl Condition {
    pub fn new(
        type_: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
        observed_generation: i64,
    ) -> Self {
        Self {
            type_: type_.into(),
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: Utc::now(),
            observed_generation,
        }
    }

    /// Healthy `Ready` condition
    pub fn ready(reason: &str, message: impl Into<String>, generation: i64) -> Self {
        Self::new(READY_CONDITION, ConditionStatus::True, reason, message, generation)
    }

    /// Failing `Ready` condition
    pub fn not_ready(reason: &str, message: impl Into<String>, generation: i64) -> Self {
        Self::new(READY_CONDITION, ConditionStatus::False, reason, message, generation)
    }
}

/// Objects exposing a list of conditions
pub trait Conditions {
    fn conditions(&self) -> &[Condition];

    fn set_conditions(&mut self, conditions: Vec<Condition>);

    fn get_condition(&self, type_: &str) -> Option<&Condition> {
        self.conditions().iter().find(|c| c.type_ == type_)
    }

    fn is_ready(&self) -> bool {
        self.get_condition(READY_CONDITION)
            .map(|c| c.status == ConditionStatus::True)
            .unwrap_or(false)
    }

    /// Insert or replace the condition of the same type.
    ///
    /// The transition time only moves when the status changes.
    fn set_condition(&mut self, mut condition: Condition) {
        let mut conditions = self.conditions().to_vec();
        match conditions.iter_mut().find(|c| c.type_ == condition.type_) {
            Some(existing) => {
                if existing.status == condition.status {
                    condition.last_transition_time = existing.last_transition_time;
                }
                *existing = condition;
            }
            None => conditions.push(condition),
        }
        self.set_conditions(conditions);
    }
}

/// Observed state of a rule, written only by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleStatus {
    /// Last generation fully processed, -1 before the first pass
    pub observed_generation: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    /// Token of the last handled manual reconcile request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_handled_reconcile_at: Option<String>,
}

impl Default for RuleStatus {
    fn default() -> Self {
        Self {
            observed_generation: -1,
            conditions: Vec::new(),
            last_handled_reconcile_at: None,
        }
    }
}

impl RuleStatus {
    /// Record that `generation` was processed. Never moves backwards.
    pub fn observe(&mut self, generation: i64) {
        if generation > self.observed_generation {
            self.observed_generation = generation;
        }
    }

    /// Whether the status lags the latest declared generation
    pub fn needs_reconcile(&self, generation: i64) -> bool {
        self.observed_generation != generation
    }
}

impl Conditions for RuleStatus {
    fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    fn set_conditions(&mut self, conditions: Vec<Condition>) {
        self.conditions = conditions;
    }
}
