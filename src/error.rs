//! Error types for the query gateway.
//!
//! Every upstream failure is classified into one [`GatewayError`] kind so
//! that callers can tell a flaky network apart from a season that simply
//! does not exist.

use thiserror::Error;

/// Errors produced while fetching from upstream or aggregating a season.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// Network failure or timeout before a response was received.
    #[error("transport failure for {path}: {detail}")]
    Transport { path: String, detail: String },

    /// Upstream answered with a non-success HTTP status.
    #[error("upstream returned status {status} for {path}")]
    UpstreamStatus { path: String, status: u16 },

    /// The body was not the JSON shape we expected.
    #[error("failed to decode response from {path}: {detail}")]
    Decode { path: String, detail: String },

    /// The envelope decoded but the expected table was empty.
    #[error("{what} not found")]
    NotFound { what: String },

    /// The caller cancelled the query or its deadline expired.
    #[error("query cancelled")]
    Cancelled,

    /// Too many rounds failed for the season report to be meaningful.
    #[error(
        "{} of {scheduled} rounds failed (rounds {})",
        .failures.len(),
        join_rounds(.failures)
    )]
    TooManyRoundFailures {
        scheduled: usize,
        failures: Vec<RoundFailure>,
    },

    /// The request was rejected before any I/O.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl GatewayError {
    /// Whether a retry has any chance of a different outcome.
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::Transport { .. } => true,
            GatewayError::UpstreamStatus { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Convenience result alias.
pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// A single round whose result fetch failed during a season scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundFailure {
    pub round: String,
    pub error: GatewayError,
}

/// Warning attached to an otherwise valid season report: some rounds
/// could not be fetched and contributed nothing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("partial aggregation, {} round(s) failed: {}", .failures.len(), join_rounds(.failures))]
pub struct PartialAggregationError {
    pub failures: Vec<RoundFailure>,
}

impl PartialAggregationError {
    /// Identifiers of the failed rounds, in the order they failed.
    pub fn rounds(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.round.as_str()).collect()
    }
}

fn join_rounds(failures: &[RoundFailure]) -> String {
    failures
        .iter()
        .map(|f| f.round.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport(round: &str) -> RoundFailure {
        RoundFailure {
            round: round.to_string(),
            error: GatewayError::Transport {
                path: format!("2021/{}/results.json", round),
                detail: "connection reset".to_string(),
            },
        }
    }

    #[test]
    fn test_partial_aggregation_lists_rounds() {
        let warning = PartialAggregationError {
            failures: vec![transport("3"), transport("7")],
        };
        assert_eq!(warning.rounds(), vec!["3", "7"]);
        let msg = warning.to_string();
        assert!(msg.contains("2 round(s)"));
        assert!(msg.contains("3, 7"));
    }

    #[test]
    fn test_too_many_failures_display() {
        let err = GatewayError::TooManyRoundFailures {
            scheduled: 4,
            failures: vec![transport("1"), transport("2"), transport("4")],
        };
        assert_eq!(err.to_string(), "3 of 4 rounds failed (rounds 1, 2, 4)");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(transport("1").error.is_retryable());
        assert!(GatewayError::UpstreamStatus {
            path: "x".to_string(),
            status: 503
        }
        .is_retryable());
        assert!(!GatewayError::UpstreamStatus {
            path: "x".to_string(),
            status: 404
        }
        .is_retryable());
        assert!(!GatewayError::Cancelled.is_retryable());
        assert!(!GatewayError::NotFound {
            what: "schedule".to_string()
        }
        .is_retryable());
    }
}
