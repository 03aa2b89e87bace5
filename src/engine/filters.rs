//! Suspend, severity and exclusion gates

use crate::events::IncomingEvent;
use crate::rules::{CompiledRule, Severity};

/// A suspended rule skips all further processing
pub fn is_suspended(rule: &CompiledRule) -> bool {
    rule.suspend
}

/// `info` rules admit everything, `error` rules only errors.
/// Unknown event severities rank below `info`.
pub fn admits(rule: &CompiledRule, event: &IncomingEvent) -> bool {
    match rule.severity {
        Severity::Info => true,
        Severity::Error => event.severity_level() == Some(Severity::Error),
    }
}

/// Whether any exclusion pattern matches anywhere in the message
pub fn is_excluded(rule: &CompiledRule, event: &IncomingEvent) -> bool {
    rule.exclusions
        .as_ref()
        .map(|set| set.is_match(&event.message))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{compile, EventSourceSelector, RuleDefinition};

    fn definition() -> RuleDefinition {
        RuleDefinition::new("slack", vec![EventSourceSelector::new("Deployment", "*", "*")])
    }

    fn event(severity: &str, message: &str) -> IncomingEvent {
        IncomingEvent::new("Deployment", "prod", "api", severity, message)
    }

    #[test]
    fn test_severity_table() {
        let info = compile("default", &definition()).unwrap();
        let error = compile("default", &definition().with_severity(Severity::Error)).unwrap();

        assert!(admits(&info, &event("info", "")));
        assert!(admits(&info, &event("error", "")));
        assert!(admits(&info, &event("bogus", "")));

        assert!(!admits(&error, &event("info", "")));
        assert!(admits(&error, &event("error", "")));
        assert!(!admits(&error, &event("bogus", "")));
        assert!(!admits(&error, &event("", "")));
    }

    #[test]
    fn test_exclusion_is_unanchored() {
        let rule = compile("default", &definition().with_exclusion("timeout")).unwrap();

        assert!(is_excluded(&rule, &event("error", "connection timeout")));
        assert!(is_excluded(&rule, &event("error", "timeout while dialing")));
        assert!(!is_excluded(&rule, &event("error", "connection refused")));
    }

    #[test]
    fn test_exclusion_order_independent() {
        let patterns = ["^health", "timeout", "retry [0-9]+"];
        let messages = [
            "health check passed",
            "request timeout",
            "retry 3 of 5",
            "image pull failed",
        ];

        let forward = patterns
            .iter()
            .fold(definition(), |d, p| d.with_exclusion(*p));
        let reverse = patterns
            .iter()
            .rev()
            .fold(definition(), |d, p| d.with_exclusion(*p));
        let forward = compile("default", &forward).unwrap();
        let reverse = compile("default", &reverse).unwrap();

        for message in messages {
            let e = event("error", message);
            assert_eq!(is_excluded(&forward, &e), is_excluded(&reverse, &e), "{message}");
        }
        assert!(!is_excluded(&forward, &event("error", "image pull failed")));
    }

    #[test]
    fn test_no_exclusions() {
        let rule = compile("default", &definition()).unwrap();
        assert!(!is_excluded(&rule, &event("error", "anything")));
    }

    #[test]
    fn test_suspended() {
        let rule = compile("default", &definition().with_suspend(true)).unwrap();
        assert!(is_suspended(&rule));
        assert!(!is_suspended(&compile("default", &definition()).unwrap()));
    }
}
