//! Alert rules
//!
//! Declared definitions, their validation into a compiled form, the status
//! written back by the engine, and the store holding all of them.

pub mod admission;
pub mod config;
pub mod status;
pub mod store;

pub use admission::{compile, CompiledRule, CompiledSelector, ConfigError};
pub use config::{
    EventSourceSelector, ProviderRef, RuleDefinition, RuleKey, Severity, SourcePattern, WILDCARD,
};
pub use status::{reasons, Condition, ConditionStatus, Conditions, RuleStatus, READY_CONDITION};
pub use store::{ApplyOutcome, RuleEntry, RuleSnapshot, RuleStore, RuleView, StoreError};
