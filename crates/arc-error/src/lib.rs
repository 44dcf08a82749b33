//! Unified error taxonomy for the Agentic Research Core.
//!
//! Every error raised by the core carries an [`ErrorCode`] (a stable,
//! machine-readable tag matching spec §7's error kinds), a human-readable
//! message, and arbitrary key-value context. Construct one with
//! [`ResearchError::new`] and the fluent builder methods.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Broad family that an [`ErrorCode`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Bad input supplied to `create_job` or a pure normalizer function.
    Input,
    /// Enrichment-gate failures (missing or stale enrichment).
    Enrichment,
    /// Global budget (steps, web calls, time) exceeded mid-pipeline.
    Budget,
    /// Scheduler could not find a runnable agent (cycle or missing prereq).
    Scheduling,
    /// A single worker's execution failed or timed out.
    Worker,
    /// A data source adapter returned degraded (empty/null) data.
    Adapter,
    /// Catch-all for unexpected internal errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Input => "input",
            Self::Enrichment => "enrichment",
            Self::Budget => "budget",
            Self::Scheduling => "scheduling",
            Self::Worker => "worker",
            Self::Adapter => "adapter",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// Machine-readable, stable error code corresponding to spec §7's error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Malformed input field (bad enrichment TTL, unknown strategy, ...).
    InputInvalid,
    /// Enrichment required but missing or stale at job start.
    EnrichmentGateFailed,
    /// `max_web_calls` surpassed mid-pipeline.
    BudgetExceeded,
    /// Scheduler graph is unschedulable (cycle or missing prerequisite).
    UnresolvedDependencies,
    /// Per-worker deadline expired.
    WorkerTimeout,
    /// Uncaught error inside a worker's execution.
    WorkerError,
    /// Adapter returned empty/null for expected data (non-fatal, informational).
    AdapterDegraded,
    /// Catch-all for unexpected internal errors.
    Internal,
}

impl ErrorCode {
    /// The category this code belongs to.
    #[must_use]
    pub fn category(self) -> ErrorCategory {
        match self {
            Self::InputInvalid => ErrorCategory::Input,
            Self::EnrichmentGateFailed => ErrorCategory::Enrichment,
            Self::BudgetExceeded => ErrorCategory::Budget,
            Self::UnresolvedDependencies => ErrorCategory::Scheduling,
            Self::WorkerTimeout | Self::WorkerError => ErrorCategory::Worker,
            Self::AdapterDegraded => ErrorCategory::Adapter,
            Self::Internal => ErrorCategory::Internal,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::InputInvalid => "INPUT_INVALID",
            Self::EnrichmentGateFailed => "ENRICHMENT_GATE_FAILED",
            Self::BudgetExceeded => "BUDGET_EXCEEDED",
            Self::UnresolvedDependencies => "UNRESOLVED_DEPENDENCIES",
            Self::WorkerTimeout => "WORKER_TIMEOUT",
            Self::WorkerError => "WORKER_ERROR",
            Self::AdapterDegraded => "ADAPTER_DEGRADED",
            Self::Internal => "INTERNAL",
        };
        f.write_str(s)
    }
}

/// A structured, contextual error raised anywhere in the research core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchError {
    /// Stable machine-readable code.
    pub code: ErrorCode,
    /// Human-readable description.
    pub message: String,
    /// Arbitrary key-value context (e.g. `age_hours`, `max_age_hours`).
    #[serde(default)]
    pub context: BTreeMap<String, String>,
}

impl ResearchError {
    /// Start building a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: BTreeMap::new(),
        }
    }

    /// Attach a key-value context entry (builder style).
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        self.context.insert(key.into(), value.to_string());
        self
    }

    /// The [`ErrorCategory`] this error belongs to.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }
}

impl fmt::Display for ResearchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if !self.context.is_empty() {
            write!(f, " (")?;
            for (i, (k, v)) in self.context.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{k}={v}")?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

impl std::error::Error for ResearchError {}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, ResearchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_code_and_context() {
        let err = ResearchError::new(ErrorCode::BudgetExceeded, "exceeded web call limit (3 > 2)")
            .with_context("used", 3)
            .with_context("limit", 2);
        let rendered = err.to_string();
        assert!(rendered.contains("BUDGET_EXCEEDED"));
        assert!(rendered.contains("used=3"));
        assert!(rendered.contains("limit=2"));
    }

    #[test]
    fn category_mapping_matches_spec_kinds() {
        assert_eq!(ErrorCode::EnrichmentGateFailed.category(), ErrorCategory::Enrichment);
        assert_eq!(ErrorCode::WorkerTimeout.category(), ErrorCategory::Worker);
        assert_eq!(ErrorCode::UnresolvedDependencies.category(), ErrorCategory::Scheduling);
    }

    #[test]
    fn serializes_to_screaming_snake_case() {
        let json = serde_json::to_string(&ErrorCode::AdapterDegraded).unwrap();
        assert_eq!(json, "\"ADAPTER_DEGRADED\"");
    }
}
