//! Herald: Event-to-Alert Routing Engine
//!
//! Decides, for every operational event about a cluster object and every
//! declared alert rule, whether the event becomes an outbound notification.
//!
//! # Features
//!
//! - **Source Selectors**: Match events by kind, namespace and name, with `*` wildcards
//! - **Severity Threshold**: `info` rules forward everything, `error` rules only errors
//! - **Exclusions**: Drop events whose message matches any linear-time regular expression
//! - **Suspend**: Pause a rule without touching its status
//! - **Retrying Delivery**: Bounded exponential backoff for transient provider failures
//! - **Status Conditions**: `Ready` reports configuration and delivery health per rule
//!
//! # Example
//!
//! ```no_run
//! use herald::engine::{EngineConfig, EventRouter};
//! use herald::events::IncomingEvent;
//! use herald::providers::{ProviderConfig, ProviderRegistry};
//! use herald::rules::{EventSourceSelector, RuleDefinition, RuleKey, RuleStore};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let providers = Arc::new(ProviderRegistry::new());
//! providers.register("audit", ProviderConfig::Log)?;
//!
//! let store = Arc::new(RuleStore::new(Arc::clone(&providers)));
//! store.apply(
//!     RuleKey::new("ops", "api-alerts"),
//!     RuleDefinition::new("audit", vec![EventSourceSelector::new("Deployment", "*", "api")]),
//! )?;
//!
//! let router = EventRouter::new(store, providers, EngineConfig::default());
//! let event = IncomingEvent::new("Deployment", "prod", "api", "info", "rolled out");
//! for report in router.route(&event).await {
//!     println!("{}: {:?}", report.rule, report.decision);
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod engine;
pub mod events;
pub mod providers;
pub mod rules;

// Re-export commonly used types
pub use engine::{Decision, EngineConfig, EventRouter, RouteReport};
pub use events::IncomingEvent;
pub use providers::{DeliveryError, Provider, ProviderConfig, ProviderRegistry};
pub use rules::{ConfigError, RuleDefinition, RuleKey, RuleStore};
