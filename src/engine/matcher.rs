//! Event origin matching

use crate::events::{IncomingEvent, InvolvedObject};
use crate::rules::{CompiledRule, CompiledSelector};

/// Whether any of the rule's selectors accepts the event's origin
pub fn matches(rule: &CompiledRule, event: &IncomingEvent) -> bool {
    if !event.is_addressable() {
        return false;
    }

    rule.selectors
        .iter()
        .any(|selector| selector_matches(selector, &event.involved_object))
}

/// Exact kind, exact-or-any namespace and name, plus optional api version
/// and label constraints
pub fn selector_matches(selector: &CompiledSelector, object: &InvolvedObject) -> bool {
    if selector.kind != object.kind
        || !selector.namespace.matches(&object.namespace)
        || !selector.name.matches(&object.name)
    {
        return false;
    }

    if let Some(api_version) = &selector.api_version {
        if object.api_version.as_deref() != Some(api_version.as_str()) {
            return false;
        }
    }

    selector
        .match_labels
        .iter()
        .all(|(key, value)| object.labels.get(key) == Some(value))
}
