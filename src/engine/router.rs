//! Per-event routing across all rules

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;

use super::config::EngineConfig;
use super::dispatcher::Dispatcher;
use super::filters::{admits, is_excluded, is_suspended};
use super::matcher::matches;
use super::retrier::{DeliveryOutcome, DeliveryRetrier};
use crate::events::IncomingEvent;
use crate::providers::ProviderRegistry;
use crate::rules::{CompiledRule, RuleEntry, RuleKey, RuleStore};

/// Decision of the synchronous gates for one (rule, event) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    NotMatched,
    Suspended,
    BelowSeverity,
    Excluded,
    Admitted,
}

/// Run the matcher and gates in order: origin, suspend, severity, exclusion
pub fn evaluate(rule: &CompiledRule, event: &IncomingEvent) -> Verdict {
    if !matches(rule, event) {
        Verdict::NotMatched
    } else if is_suspended(rule) {
        Verdict::Suspended
    } else if !admits(rule, event) {
        Verdict::BelowSeverity
    } else if is_excluded(rule, event) {
        Verdict::Excluded
    } else {
        Verdict::Admitted
    }
}

/// Final decision for one rule
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum Decision {
    NotMatched,
    Suspended,
    BelowSeverity,
    Excluded,
    Delivered { attempts: u32 },
    PermanentlyFailed { attempts: u32, error: String },
}

impl Decision {
    pub fn is_dispatched(&self) -> bool {
        matches!(
            self,
            Decision::Delivered { .. } | Decision::PermanentlyFailed { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteReport {
    pub rule: RuleKey,
    #[serde(flatten)]
    pub decision: Decision,
}

/// Routing counters
#[derive(Debug, Default)]
pub struct RouterStats {
    events: AtomicU64,
    not_matched: AtomicU64,
    suspended: AtomicU64,
    below_severity: AtomicU64,
    excluded: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
}

impl RouterStats {
    fn record(&self, decision: &Decision) {
        let counter = match decision {
            Decision::NotMatched => &self.not_matched,
            Decision::Suspended => &self.suspended,
            Decision::BelowSeverity => &self.below_severity,
            Decision::Excluded => &self.excluded,
            Decision::Delivered { .. } => &self.delivered,
            Decision::PermanentlyFailed { .. } => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RouterStatsSnapshot {
        RouterStatsSnapshot {
            events: self.events.load(Ordering::Relaxed),
            not_matched: self.not_matched.load(Ordering::Relaxed),
            suspended: self.suspended.load(Ordering::Relaxed),
            below_severity: self.below_severity.load(Ordering::Relaxed),
            excluded: self.excluded.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterStatsSnapshot {
    pub events: u64,
    pub not_matched: u64,
    pub suspended: u64,
    pub below_severity: u64,
    pub excluded: u64,
    pub delivered: u64,
    pub failed: u64,
}

/// Routes events to every rule that wants them
pub struct EventRouter {
    store: Arc<RuleStore>,
    dispatcher: Dispatcher,
    retrier: DeliveryRetrier,
    stats: RouterStats,
}

impl EventRouter {
    pub fn new(store: Arc<RuleStore>, providers: Arc<ProviderRegistry>, config: EngineConfig) -> Self {
        Self {
            store,
            dispatcher: Dispatcher::new(providers, config.dispatch_timeout),
            retrier: DeliveryRetrier::new(config.retry),
            stats: RouterStats::default(),
        }
    }

    pub fn stats(&self) -> RouterStatsSnapshot {
        self.stats.snapshot()
    }

    /// Evaluate `event` against every rule.
    ///
    /// Each rule gets an independent pass and passes run concurrently, so
    /// rules sharing a provider each deliver their own notification. Reports
    /// are sorted by rule.
    pub async fn route(&self, event: &IncomingEvent) -> Vec<RouteReport> {
        self.stats.events.fetch_add(1, Ordering::Relaxed);

        let passes = self
            .store
            .entries()
            .into_iter()
            .map(|entry| self.process(entry, event));
        let mut reports = join_all(passes).await;
        reports.sort_by(|a, b| a.rule.cmp(&b.rule));

        let dispatched = reports.iter().filter(|r| r.decision.is_dispatched()).count();
        tracing::debug!(
            kind = %event.involved_object.kind,
            namespace = %event.involved_object.namespace,
            name = %event.involved_object.name,
            rules = reports.len(),
            dispatched,
            "Event routed"
        );

        reports
    }

    /// One processing pass of `event` for a single rule
    pub async fn process(&self, entry: Arc<RuleEntry>, event: &IncomingEvent) -> RouteReport {
        let snapshot = entry.snapshot();

        // Deleted rules and rules with an invalid definition match nothing
        let decision = match &snapshot.rule {
            Some(rule) if !entry.is_deleted() => match evaluate(rule, event) {
                Verdict::NotMatched => Decision::NotMatched,
                Verdict::Suspended => Decision::Suspended,
                Verdict::BelowSeverity => Decision::BelowSeverity,
                Verdict::Excluded => {
                    tracing::debug!(rule = %snapshot.key, "Event excluded by pattern");
                    Decision::Excluded
                }
                Verdict::Admitted => {
                    self.deliver(&entry, snapshot.generation, rule, event)
                        .await
                }
            },
            _ => Decision::NotMatched,
        };

        self.stats.record(&decision);
        RouteReport {
            rule: snapshot.key,
            decision,
        }
    }

    async fn deliver(
        &self,
        entry: &RuleEntry,
        generation: i64,
        rule: &CompiledRule,
        event: &IncomingEvent,
    ) -> Decision {
        let key = entry.key();
        let notification = Dispatcher::notification(key, rule, event);

        let dispatcher = &self.dispatcher;
        let provider = rule.provider.as_str();
        let payload = &notification;

        let outcome = self
            .retrier
            .run(
                key,
                move |attempt| {
                    tracing::debug!(rule = %key, provider, attempt, "Dispatching notification");
                    dispatcher.send(provider, payload)
                },
                || !entry.is_retired(),
            )
            .await;

        let (recorded, decision) = match outcome {
            DeliveryOutcome::Delivered { attempts } => (
                entry.record_delivery(generation, Ok(provider)),
                Decision::Delivered { attempts },
            ),
            DeliveryOutcome::PermanentlyFailed { attempts, error } => {
                let message = format!(
                    "Delivery to provider '{}' failed after {} attempt(s): {}",
                    provider, attempts, error
                );
                (
                    entry.record_delivery(generation, Err(&message)),
                    Decision::PermanentlyFailed {
                        attempts,
                        error: error.to_string(),
                    },
                )
            }
        };

        if !recorded {
            tracing::debug!(
                rule = %key,
                generation,
                current_generation = entry.generation(),
                retired = entry.is_retired(),
                "Delivery result discarded, rule changed during delivery"
            );
        }

        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::config::RetryPolicy;
    use crate::engine::dispatcher::tests::FlakyProvider;
    use crate::providers::{DeliveryError, Notification, Provider};
    use crate::rules::{
        reasons, ConditionStatus, Conditions, EventSourceSelector, RuleDefinition, Severity,
        READY_CONDITION,
    };
    use futures::future::BoxFuture;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    /// Provider that suspends its rule while the first attempt is in flight,
    /// then fails that attempt transiently
    struct SuspendingProvider {
        store: Arc<RuleStore>,
        calls: AtomicU32,
    }

    impl Provider for SuspendingProvider {
        fn kind(&self) -> &'static str {
            "test"
        }

        fn send<'a>(&'a self, _notification: &'a Notification) -> BoxFuture<'a, Result<(), DeliveryError>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                self.store.set_suspend(&key(), true).unwrap();
                Err(DeliveryError::Connection("connection reset".into()))
            })
        }
    }

    struct Harness {
        store: Arc<RuleStore>,
        providers: Arc<ProviderRegistry>,
        router: Arc<EventRouter>,
    }

    fn harness(max_attempts: u32) -> Harness {
        let providers = Arc::new(ProviderRegistry::new());
        let store = Arc::new(RuleStore::new(Arc::clone(&providers)));
        let config = EngineConfig {
            dispatch_timeout: Duration::from_secs(1),
            retry: RetryPolicy::immediate(max_attempts),
        };
        let router = Arc::new(EventRouter::new(
            Arc::clone(&store),
            Arc::clone(&providers),
            config,
        ));
        Harness {
            store,
            providers,
            router,
        }
    }

    fn api_rule() -> RuleDefinition {
        RuleDefinition::new("sink", vec![EventSourceSelector::new("Deployment", "*", "api")])
    }

    fn key() -> RuleKey {
        RuleKey::new("ops", "api")
    }

    fn ready_status(h: &Harness) -> (ConditionStatus, String) {
        let status = h.store.get_entry(&key()).unwrap().status();
        let ready = status.get_condition(READY_CONDITION).unwrap();
        (ready.status, ready.reason.clone())
    }

    #[tokio::test]
    async fn test_matching_event_is_dispatched() {
        let h = harness(3);
        let sink = Arc::new(FlakyProvider::healthy());
        h.providers.insert("sink", sink.clone());
        h.store.apply(key(), api_rule()).unwrap();

        let event = IncomingEvent::new("Deployment", "prod", "api", "info", "rolled out");
        let reports = h.router.route(&event).await;

        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].decision, Decision::Delivered { attempts: 1 });
        assert_eq!(sink.calls(), 1);
    }

    #[tokio::test]
    async fn test_name_mismatch_is_dropped() {
        let h = harness(3);
        let sink = Arc::new(FlakyProvider::healthy());
        h.providers.insert("sink", sink.clone());
        h.store.apply(key(), api_rule()).unwrap();

        let event = IncomingEvent::new("Deployment", "prod", "web", "info", "rolled out");
        let reports = h.router.route(&event).await;

        assert_eq!(reports[0].decision, Decision::NotMatched);
        assert_eq!(sink.calls(), 0);
    }

    #[tokio::test]
    async fn test_excluded_after_severity_admits() {
        let h = harness(3);
        let sink = Arc::new(FlakyProvider::healthy());
        h.providers.insert("sink", sink.clone());
        h.store
            .apply(
                key(),
                api_rule()
                    .with_severity(Severity::Error)
                    .with_exclusion("timeout"),
            )
            .unwrap();

        let event = IncomingEvent::new("Deployment", "prod", "api", "error", "connection timeout");
        assert_eq!(h.router.route(&event).await[0].decision, Decision::Excluded);

        let event = IncomingEvent::new("Deployment", "prod", "api", "info", "connection refused");
        assert_eq!(h.router.route(&event).await[0].decision, Decision::BelowSeverity);

        assert_eq!(sink.calls(), 0);
    }

    #[tokio::test]
    async fn test_suspended_rule_drops_everything_without_status_change() {
        let h = harness(3);
        let sink = Arc::new(FlakyProvider::healthy());
        h.providers.insert("sink", sink.clone());
        let catch_all = RuleDefinition::new("sink", vec![EventSourceSelector::new("Deployment", "*", "*")])
            .with_suspend(true);
        h.store.apply(key(), catch_all).unwrap();
        let before = h.store.get_entry(&key()).unwrap().status();

        for severity in ["info", "error", "unknown"] {
            let event = IncomingEvent::new("Deployment", "prod", "api", severity, "msg");
            let reports = h.router.route(&event).await;
            assert_eq!(reports[0].decision, Decision::Suspended);
        }

        let event = IncomingEvent::new("Pod", "prod", "api", "error", "msg");
        assert_eq!(h.router.route(&event).await[0].decision, Decision::NotMatched);

        assert_eq!(sink.calls(), 0);
        assert_eq!(h.store.get_entry(&key()).unwrap().status(), before);
    }

    #[tokio::test]
    async fn test_transient_failures_then_delivery() {
        let h = harness(5);
        let sink = Arc::new(FlakyProvider::new(
            3,
            DeliveryError::Status {
                status: 502,
                body: "bad gateway".into(),
            },
        ));
        h.providers.insert("sink", sink.clone());
        h.store.apply(key(), api_rule()).unwrap();

        let event = IncomingEvent::new("Deployment", "prod", "api", "error", "crashloop");
        let reports = h.router.route(&event).await;

        assert_eq!(reports[0].decision, Decision::Delivered { attempts: 4 });
        assert_eq!(sink.calls(), 4);
        assert_eq!(
            ready_status(&h),
            (ConditionStatus::True, reasons::SUCCEEDED.to_string())
        );
    }

    #[tokio::test]
    async fn test_exhausted_retries_degrade_ready() {
        let h = harness(3);
        let sink = Arc::new(FlakyProvider::new(
            u32::MAX,
            DeliveryError::Connection("connection refused".into()),
        ));
        h.providers.insert("sink", sink.clone());
        h.store.apply(key(), api_rule()).unwrap();

        let event = IncomingEvent::new("Deployment", "prod", "api", "error", "crashloop");
        let reports = h.router.route(&event).await;

        assert!(matches!(
            reports[0].decision,
            Decision::PermanentlyFailed { attempts: 3, .. }
        ));
        assert_eq!(sink.calls(), 3);

        let (status, reason) = ready_status(&h);
        assert_eq!(status, ConditionStatus::False);
        assert_eq!(reason, reasons::DELIVERY_FAILED);
        assert_ne!(reason, reasons::INVALID_CONFIGURATION);

        // The rule is still active and recovers on the next delivery
        h.providers.insert("sink", Arc::new(FlakyProvider::healthy()));
        let reports = h.router.route(&event).await;
        assert_eq!(reports[0].decision, Decision::Delivered { attempts: 1 });
        assert_eq!(ready_status(&h).0, ConditionStatus::True);
    }

    #[tokio::test]
    async fn test_provider_removed_fails_without_retry() {
        let h = harness(5);
        h.providers.insert("sink", Arc::new(FlakyProvider::healthy()));
        h.store.apply(key(), api_rule()).unwrap();
        h.providers.remove("sink").unwrap();

        let event = IncomingEvent::new("Deployment", "prod", "api", "error", "crashloop");
        let reports = h.router.route(&event).await;
        assert_eq!(
            reports[0].decision,
            Decision::PermanentlyFailed {
                attempts: 1,
                error: "provider 'sink' not found".into()
            }
        );
    }

    #[tokio::test]
    async fn test_rules_sharing_provider_dispatch_independently() {
        let h = harness(3);
        let sink = Arc::new(FlakyProvider::healthy());
        h.providers.insert("sink", sink.clone());
        h.store.apply(RuleKey::new("ops", "a"), api_rule()).unwrap();
        h.store.apply(RuleKey::new("ops", "b"), api_rule()).unwrap();

        let event = IncomingEvent::new("Deployment", "prod", "api", "info", "rolled out");
        let reports = h.router.route(&event).await;

        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.decision == Decision::Delivered { attempts: 1 }));
        assert_eq!(sink.calls(), 2);

        let rules: Vec<String> = sink.received.lock().iter().map(|n| n.rule.clone()).collect();
        assert!(rules.contains(&"ops/a".to_string()));
        assert!(rules.contains(&"ops/b".to_string()));

        let stats = h.router.stats();
        assert_eq!(stats.events, 1);
        assert_eq!(stats.delivered, 2);
    }

    #[tokio::test]
    async fn test_deleted_rule_is_not_dispatched() {
        let h = harness(3);
        let sink = Arc::new(FlakyProvider::healthy());
        h.providers.insert("sink", sink.clone());
        h.store.apply(key(), api_rule()).unwrap();

        // A pass that picked the entry up before the delete
        let entry = h.store.get_entry(&key()).unwrap();
        h.store.delete(&key()).unwrap();

        let event = IncomingEvent::new("Deployment", "prod", "api", "error", "crashloop");
        let report = h.router.process(entry, &event).await;

        assert_eq!(report.decision, Decision::NotMatched);
        assert_eq!(sink.calls(), 0);
        assert!(h.router.route(&event).await.is_empty());
    }

    #[tokio::test]
    async fn test_suspend_during_retry_stops_delivery() {
        let h = harness(5);
        let provider = Arc::new(SuspendingProvider {
            store: Arc::clone(&h.store),
            calls: AtomicU32::new(0),
        });
        h.providers.insert("sink", provider.clone());
        h.store.apply(key(), api_rule()).unwrap();

        let event = IncomingEvent::new("Deployment", "prod", "api", "error", "crashloop");
        let reports = h.router.route(&event).await;

        assert_eq!(
            reports[0].decision,
            Decision::PermanentlyFailed {
                attempts: 1,
                error: DeliveryError::RuleRetired.to_string()
            }
        );
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

        // Status still reflects the suspend, not the abandoned delivery
        let entry = h.store.get_entry(&key()).unwrap();
        assert_eq!(entry.generation(), 2);
        let status = entry.status();
        let ready = status.get_condition(READY_CONDITION).unwrap();
        assert_eq!(ready.status, ConditionStatus::True);
        assert_eq!(ready.message, "Initialized");
        assert_eq!(ready.observed_generation, 2);
        assert_eq!(status.observed_generation, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_events_keep_status_coherent() {
        let h = harness(2);
        let sink = Arc::new(FlakyProvider::healthy());
        h.providers.insert("sink", sink.clone());
        h.store.apply(key(), api_rule()).unwrap();
        let generation = h.store.get_entry(&key()).unwrap().generation();

        let route_many = |count: usize| {
            let passes = (0..count).map(|i| {
                let router = Arc::clone(&h.router);
                tokio::spawn(async move {
                    let event =
                        IncomingEvent::new("Deployment", "prod", "api", "error", format!("event {i}"));
                    router.route(&event).await
                })
            });
            join_all(passes)
        };

        for reports in route_many(50).await {
            assert_eq!(reports.unwrap()[0].decision, Decision::Delivered { attempts: 1 });
        }
        assert_eq!(sink.calls(), 50);

        let status = h.store.get_entry(&key()).unwrap().status();
        assert_eq!(status.observed_generation, generation);
        assert_eq!(status.conditions.len(), 1);
        assert_eq!(
            ready_status(&h),
            (ConditionStatus::True, reasons::SUCCEEDED.to_string())
        );

        h.providers.insert(
            "sink",
            Arc::new(FlakyProvider::new(
                u32::MAX,
                DeliveryError::Connection("connection refused".into()),
            )),
        );
        for reports in route_many(50).await {
            assert!(matches!(
                reports.unwrap()[0].decision,
                Decision::PermanentlyFailed { attempts: 2, .. }
            ));
        }

        let status = h.store.get_entry(&key()).unwrap().status();
        assert_eq!(status.observed_generation, generation);
        assert_eq!(status.conditions.len(), 1);
        let ready = status.get_condition(READY_CONDITION).unwrap();
        assert_eq!(ready.status, ConditionStatus::False);
        assert_eq!(ready.reason, reasons::DELIVERY_FAILED);
        assert_eq!(ready.observed_generation, generation);

        let stats = h.router.stats();
        assert_eq!(stats.events, 100);
        assert_eq!(stats.delivered, 50);
        assert_eq!(stats.failed, 50);
    }

    #[tokio::test]
    async fn test_invalid_rule_matches_nothing() {
        let h = harness(3);
        h.providers.insert("sink", Arc::new(FlakyProvider::healthy()));
        let _ = h.store.apply(key(), api_rule().with_exclusion("[unclosed"));

        let event = IncomingEvent::new("Deployment", "prod", "api", "info", "rolled out");
        assert_eq!(h.router.route(&event).await[0].decision, Decision::NotMatched);
    }

    #[test]
    fn test_evaluate_is_idempotent() {
        let rule = crate::rules::compile("ops", &api_rule().with_exclusion("noise")).unwrap();
        let event = IncomingEvent::new("Deployment", "prod", "api", "info", "rolled out");

        let first = evaluate(&rule, &event);
        assert_eq!(first, Verdict::Admitted);
        for _ in 0..10 {
            assert_eq!(evaluate(&rule, &event), first);
        }
    }

    #[test]
    fn test_report_wire_format() {
        let report = RouteReport {
            rule: key(),
            decision: Decision::Delivered { attempts: 2 },
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["outcome"], "delivered");
        assert_eq!(json["attempts"], 2);
        assert_eq!(json["rule"]["namespace"], "ops");
    }
}
