//! In-memory rule store
//!
//! Every rule owns two locks: `state` guards the declared definition, its
//! generation and compiled form; `status` guards the observed status. When
//! both are needed, `state` is taken first.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use super::admission::{compile, CompiledRule, ConfigError};
use super::config::{RuleDefinition, RuleKey};
use super::status::{reasons, Condition, Conditions, RuleStatus, READY_CONDITION};
use crate::providers::ProviderRegistry;

struct RuleState {
    definition: RuleDefinition,
    generation: i64,
    /// None while the definition is invalid
    compiled: Option<Arc<CompiledRule>>,
}

/// Point-in-time view of a rule used for one processing pass
#[derive(Debug, Clone)]
pub struct RuleSnapshot {
    pub key: RuleKey,
    pub generation: i64,
    pub rule: Option<Arc<CompiledRule>>,
}

/// A stored rule
pub struct RuleEntry {
    key: RuleKey,
    state: RwLock<RuleState>,
    status: Mutex<RuleStatus>,
    deleted: AtomicBool,
}

impl RuleEntry {
    fn new(key: RuleKey, definition: RuleDefinition) -> Self {
        Self {
            key,
            state: RwLock::new(RuleState {
                definition,
                generation: 1,
                compiled: None,
            }),
            status: Mutex::new(RuleStatus::default()),
            deleted: AtomicBool::new(false),
        }
    }

    pub fn key(&self) -> &RuleKey {
        &self.key
    }

    pub fn generation(&self) -> i64 {
        self.state.read().generation
    }

    pub fn snapshot(&self) -> RuleSnapshot {
        let state = self.state.read();
        RuleSnapshot {
            key: self.key.clone(),
            generation: state.generation,
            rule: state.compiled.clone(),
        }
    }

    /// Whether the rule was removed from the store
    pub fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::SeqCst)
    }

    /// Suspended or deleted rules take no new delivery attempts
    pub fn is_retired(&self) -> bool {
        self.is_deleted() || self.state.read().definition.suspend
    }

    pub fn status(&self) -> RuleStatus {
        self.status.lock().clone()
    }

    pub fn view(&self) -> RuleView {
        let state = self.state.read();
        let status = self.status.lock().clone();
        RuleView {
            namespace: self.key.namespace.clone(),
            name: self.key.name.clone(),
            generation: state.generation,
            definition: state.definition.clone(),
            status,
        }
    }

    /// Record the result of a delivery made for `generation`.
    ///
    /// Returns false when nothing was written: the rule is retired, or it was
    /// changed after the pass started and the result no longer describes it.
    pub fn record_delivery(&self, generation: i64, result: Result<&str, &str>) -> bool {
        let state = self.state.read();
        if self.deleted.load(Ordering::SeqCst)
            || state.definition.suspend
            || state.generation != generation
        {
            return false;
        }

        let mut status = self.status.lock();
        let condition = match result {
            Ok(provider) => Condition::ready(
                reasons::SUCCEEDED,
                format!("Last event delivered to provider '{provider}'"),
                generation,
            ),
            Err(message) => Condition::not_ready(reasons::DELIVERY_FAILED, message, generation),
        };
        status.set_condition(condition);
        status.observe(generation);
        true
    }
}

/// Serializable view of a rule and its status
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleView {
    pub namespace: String,
    pub name: String,
    pub generation: i64,
    pub definition: RuleDefinition,
    pub status: RuleStatus,
}

/// Result of applying a definition
#[derive(Debug, Clone)]
pub struct ApplyOutcome {
    pub rule: RuleView,
    pub created: bool,
    /// Whether the generation moved
    pub changed: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("rule '{0}' not found")]
    NotFound(RuleKey),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// All declared rules, keyed by namespace and name
pub struct RuleStore {
    rules: DashMap<RuleKey, Arc<RuleEntry>>,
    providers: Arc<ProviderRegistry>,
}

impl RuleStore {
    pub fn new(providers: Arc<ProviderRegistry>) -> Self {
        Self {
            rules: DashMap::new(),
            providers,
        }
    }

    /// Create or update a rule.
    ///
    /// An invalid definition is still recorded, with a failing `Ready`
    /// condition, and the rule matches nothing until it is corrected. The
    /// configuration error is returned to the writer.
    pub fn apply(&self, key: RuleKey, definition: RuleDefinition) -> Result<ApplyOutcome, ConfigError> {
        let (entry, created) = match self.rules.entry(key.clone()) {
            Entry::Occupied(e) => (Arc::clone(e.get()), false),
            Entry::Vacant(e) => {
                let entry = Arc::new(RuleEntry::new(key, definition.clone()));
                e.insert(Arc::clone(&entry));
                (entry, true)
            }
        };

        let mut state = entry.state.write();
        let changed = created || state.definition != definition;
        if !created && changed {
            state.definition = definition;
            state.generation += 1;
        }

        let result = self.revalidate(&entry, &mut state, changed);
        drop(state);

        if created {
            tracing::info!(rule = %entry.key, "Rule created");
        } else if changed {
            tracing::info!(rule = %entry.key, generation = entry.generation(), "Rule updated");
        }

        result.map(|()| ApplyOutcome {
            rule: entry.view(),
            created,
            changed,
        })
    }

    /// Re-run validation of the current definition, e.g. after a provider
    /// was added or removed, and record the handled request token
    pub fn reconcile(&self, key: &RuleKey, requested_at: Option<String>) -> Result<RuleView, StoreError> {
        let entry = self
            .get_entry(key)
            .ok_or_else(|| StoreError::NotFound(key.clone()))?;

        let mut state = entry.state.write();
        let result = self.revalidate(&entry, &mut state, false);
        if let Some(token) = requested_at {
            entry.status.lock().last_handled_reconcile_at = Some(token);
        }
        drop(state);

        result?;
        Ok(entry.view())
    }

    /// Re-validate every rule referencing `provider`. Returns how many were
    /// revisited.
    pub fn reconcile_provider(&self, provider: &str) -> usize {
        let mut count = 0;
        for entry in self.entries() {
            let mut state = entry.state.write();
            if state.definition.provider_ref.name == provider {
                let _ = self.revalidate(&entry, &mut state, false);
                count += 1;
            }
        }
        count
    }

    /// Toggle the suspend flag; this is a definition change like any other
    pub fn set_suspend(&self, key: &RuleKey, suspend: bool) -> Result<ApplyOutcome, StoreError> {
        let entry = self
            .get_entry(key)
            .ok_or_else(|| StoreError::NotFound(key.clone()))?;
        let definition = {
            let state = entry.state.read();
            state.definition.clone().with_suspend(suspend)
        };
        Ok(self.apply(key.clone(), definition)?)
    }

    pub fn delete(&self, key: &RuleKey) -> Result<RuleView, StoreError> {
        let (_, entry) = self
            .rules
            .remove(key)
            .ok_or_else(|| StoreError::NotFound(key.clone()))?;
        entry.deleted.store(true, Ordering::SeqCst);
        tracing::info!(rule = %key, "Rule deleted");
        Ok(entry.view())
    }

    pub fn get(&self, key: &RuleKey) -> Option<RuleView> {
        self.get_entry(key).map(|e| e.view())
    }

    pub fn get_entry(&self, key: &RuleKey) -> Option<Arc<RuleEntry>> {
        self.rules.get(key).map(|e| Arc::clone(&e))
    }

    /// All rules sorted by key
    pub fn list(&self) -> Vec<RuleView> {
        let mut entries = self.entries();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        entries.iter().map(|e| e.view()).collect()
    }

    pub fn entries(&self) -> Vec<Arc<RuleEntry>> {
        self.rules.iter().map(|e| Arc::clone(e.value())).collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    fn validate(&self, key: &RuleKey, definition: &RuleDefinition) -> Result<CompiledRule, ConfigError> {
        let compiled = compile(&key.namespace, definition)?;
        if !self.providers.contains(&compiled.provider) {
            return Err(ConfigError::ProviderNotFound(compiled.provider));
        }
        Ok(compiled)
    }

    /// Compile the current definition and write the outcome to status.
    ///
    /// A healthy `Ready` is only rewritten when the generation moved or the
    /// previous failure was a configuration one, so delivery health survives
    /// a no-op re-apply.
    fn revalidate(&self, entry: &RuleEntry, state: &mut RuleState, changed: bool) -> Result<(), ConfigError> {
        let generation = state.generation;
        let result = self.validate(&entry.key, &state.definition);
        let mut status = entry.status.lock();

        match &result {
            Ok(compiled) => {
                let stale = match status.get_condition(READY_CONDITION) {
                    None => true,
                    Some(ready) => {
                        ready.reason == reasons::INVALID_CONFIGURATION
                            || ready.reason == reasons::PROVIDER_NOT_FOUND
                    }
                };
                if changed || stale {
                    status.set_condition(Condition::ready(
                        reasons::SUCCEEDED,
                        "Initialized",
                        generation,
                    ));
                }
                state.compiled = Some(Arc::new(compiled.clone()));
            }
            Err(e) => {
                tracing::warn!(rule = %entry.key, generation, error = %e, "Rule rejected");
                status.set_condition(Condition::not_ready(e.reason(), e.to_string(), generation));
                state.compiled = None;
            }
        }

        status.observe(generation);
        result.map(|_| ())
    }
}
