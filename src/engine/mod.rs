//! Event-to-alert decision engine
//!
//! For every (event, rule) pair: match the event's origin, stop at suspended
//! rules, apply the severity threshold and exclusion patterns, then dispatch to
//! the rule's provider with bounded retries and report the result on the rule.

pub mod config;
pub mod dispatcher;
pub mod filters;
pub mod matcher;
pub mod retrier;
pub mod router;
pub mod worker;

pub use config::{EngineConfig, RetryPolicy};
pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use filters::{admits, is_excluded, is_suspended};
pub use matcher::matches;
pub use retrier::{DeliveryOutcome, DeliveryRetrier, DeliveryState, Step};
pub use router::{evaluate, Decision, EventRouter, RouteReport, RouterStatsSnapshot, Verdict};
pub use worker::{EventQueue, QueueError, RouterWorker, DEFAULT_MAX_IN_FLIGHT, DEFAULT_QUEUE_CAPACITY};
