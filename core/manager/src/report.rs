//! Per-call outcome reports for lookups and writes.
//!
//! Reports are returned by value from each call; the manager keeps no
//! last-call state, so concurrent callers never see each other's outcomes.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use skm_common::{KeyName, SecretValue};

/// Why a requested provider was not called.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// No provider registered under that name.
    Unknown,
    /// Registered but disabled.
    Disabled,
    /// Enabled but not accepting writes.
    ReadOnly,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SkipReason::Unknown => "unknown provider",
            SkipReason::Disabled => "disabled",
            SkipReason::ReadOnly => "read-only",
        };
        f.write_str(s)
    }
}

/// A provider named in an explicit list that was not called.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedProvider {
    pub provider: String,
    pub reason: SkipReason,
}

/// Result of asking one provider for a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "message")]
pub enum AttemptOutcome {
    Found,
    NotFound,
    /// The provider returned an error or panicked.
    Fault(String),
    TimedOut,
}

impl AttemptOutcome {
    pub fn is_fault(&self) -> bool {
        matches!(self, AttemptOutcome::Fault(_) | AttemptOutcome::TimedOut)
    }
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptOutcome::Found => f.write_str("found"),
            AttemptOutcome::NotFound => f.write_str("not found"),
            AttemptOutcome::Fault(msg) => write!(f, "error: {}", msg),
            AttemptOutcome::TimedOut => f.write_str("timed out"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderAttempt {
    pub provider: String,
    pub outcome: AttemptOutcome,
    #[serde(skip)]
    pub elapsed: Duration,
}

/// Everything that happened while resolving one key.
#[derive(Debug, Clone)]
pub struct LookupReport {
    pub key: KeyName,
    pub value: Option<SecretValue>,
    /// Name of the provider that produced `value`.
    pub source: Option<String>,
    /// Providers called, in call order.
    pub attempts: Vec<ProviderAttempt>,
    pub skipped: Vec<SkippedProvider>,
}

impl LookupReport {
    pub fn found(&self) -> bool {
        self.value.is_some()
    }

    /// Names of the providers that were called.
    pub fn tried(&self) -> Vec<&str> {
        self.attempts.iter().map(|a| a.provider.as_str()).collect()
    }

    /// Attempts that ended in an error, panic or timeout.
    pub fn faults(&self) -> Vec<&ProviderAttempt> {
        self.attempts.iter().filter(|a| a.outcome.is_fault()).collect()
    }

    /// True when at least one provider was called and every one of them
    /// faulted. Distinguishes "backends broken" from "key absent".
    pub fn all_faulted(&self) -> bool {
        !self.attempts.is_empty() && self.attempts.iter().all(|a| a.outcome.is_fault())
    }

    pub fn into_value(self) -> Option<SecretValue> {
        self.value
    }
}

/// Result of writing to one target provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "message")]
pub enum TargetOutcome {
    Written,
    /// `write_key` errored, panicked or timed out.
    Failed(String),
    /// `validate_key` refused the pair; `write_key` was not called.
    Rejected,
}

impl fmt::Display for TargetOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetOutcome::Written => f.write_str("written"),
            TargetOutcome::Failed(msg) => write!(f, "failed: {}", msg),
            TargetOutcome::Rejected => f.write_str("rejected by validation"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteTarget {
    pub provider: String,
    pub outcome: TargetOutcome,
}

/// Per-target outcomes of one `set` call.
#[derive(Debug, Clone, Serialize)]
pub struct WriteReport {
    pub key: String,
    /// Whether persistence was requested at all.
    pub persist: bool,
    pub targets: Vec<WriteTarget>,
    pub skipped: Vec<SkippedProvider>,
}

impl WriteReport {
    /// Overall result: always true without persistence, otherwise true iff
    /// at least one target was written.
    pub fn succeeded(&self) -> bool {
        !self.persist || self.targets.iter().any(|t| t.outcome == TargetOutcome::Written)
    }

    fn with_outcome(&self, pred: impl Fn(&TargetOutcome) -> bool) -> Vec<&str> {
        self.targets
            .iter()
            .filter(|t| pred(&t.outcome))
            .map(|t| t.provider.as_str())
            .collect()
    }

    pub fn written(&self) -> Vec<&str> {
        self.with_outcome(|o| *o == TargetOutcome::Written)
    }

    pub fn failed(&self) -> Vec<&str> {
        self.with_outcome(|o| matches!(o, TargetOutcome::Failed(_)))
    }

    pub fn rejected(&self) -> Vec<&str> {
        self.with_outcome(|o| *o == TargetOutcome::Rejected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt(provider: &str, outcome: AttemptOutcome) -> ProviderAttempt {
        ProviderAttempt {
            provider: provider.to_string(),
            outcome,
            elapsed: Duration::ZERO,
        }
    }

    fn lookup(attempts: Vec<ProviderAttempt>) -> LookupReport {
        LookupReport {
            key: KeyName::new("K").unwrap(),
            value: None,
            source: None,
            attempts,
            skipped: Vec::new(),
        }
    }

    #[test]
    fn test_all_faulted() {
        assert!(!lookup(vec![]).all_faulted());
        assert!(lookup(vec![
            attempt("a", AttemptOutcome::Fault("boom".into())),
            attempt("b", AttemptOutcome::TimedOut),
        ])
        .all_faulted());
        assert!(!lookup(vec![
            attempt("a", AttemptOutcome::Fault("boom".into())),
            attempt("b", AttemptOutcome::NotFound),
        ])
        .all_faulted());
    }

    #[test]
    fn test_tried_keeps_call_order() {
        let report = lookup(vec![
            attempt("json_file", AttemptOutcome::NotFound),
            attempt("environment", AttemptOutcome::NotFound),
        ]);
        assert_eq!(report.tried(), vec!["json_file", "environment"]);
        assert!(report.faults().is_empty());
    }

    #[test]
    fn test_write_report_outcomes() {
        let report = WriteReport {
            key: "K".into(),
            persist: true,
            targets: vec![
                WriteTarget {
                    provider: "a".into(),
                    outcome: TargetOutcome::Failed("disk full".into()),
                },
                WriteTarget {
                    provider: "b".into(),
                    outcome: TargetOutcome::Written,
                },
                WriteTarget {
                    provider: "c".into(),
                    outcome: TargetOutcome::Rejected,
                },
            ],
            skipped: Vec::new(),
        };
        assert!(report.succeeded());
        assert_eq!(report.written(), vec!["b"]);
        assert_eq!(report.failed(), vec!["a"]);
        assert_eq!(report.rejected(), vec!["c"]);
    }

    #[test]
    fn test_empty_write_report() {
        let mut report = WriteReport {
            key: "K".into(),
            persist: true,
            targets: Vec::new(),
            skipped: Vec::new(),
        };
        assert!(!report.succeeded());
        report.persist = false;
        assert!(report.succeeded());
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(AttemptOutcome::TimedOut.to_string(), "timed out");
        assert_eq!(
            TargetOutcome::Failed("x".into()).to_string(),
            "failed: x"
        );
        assert_eq!(SkipReason::ReadOnly.to_string(), "read-only");
    }
}
