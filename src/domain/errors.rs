use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced to prediction-request callers. Input-validation variants
/// are rejected synchronously and never retried; upstream-data variants are
/// surfaced as-is, never masked with a default prediction.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PredictionError {
    #[error("invalid teams: home '{home}', away '{away}': {reason}")]
    InvalidTeams {
        home: String,
        away: String,
        reason: String,
    },

    #[error("invalid date '{input}': expected YYYY-MM-DD")]
    InvalidDate { input: String },

    #[error("insufficient context for {team}: missing {missing}")]
    InsufficientContext { team: String, missing: String },

    #[error("context fetch failed: {reason}")]
    ContextFetch { reason: String },

    #[error("computation abandoned before a result was produced")]
    Cancelled,
}

/// Errors from outcome reporting. Duplicate reports are rejected, not
/// double-counted.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum OutcomeError {
    #[error("outcome already reported for prediction {reference}")]
    DuplicateReport { reference: Uuid },

    #[error("no prediction known for reference {reference}")]
    UnknownPrediction { reference: Uuid },
}

/// Errors contained within the retraining controller. A training failure
/// discards the candidate and leaves the active model untouched; it is
/// logged as an operational alert and never retried automatically.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TrainingError {
    #[error("insufficient training samples: {got} < {need}")]
    InsufficientSamples { got: usize, need: usize },

    #[error("degenerate label distribution: only {classes_present} of 3 classes present")]
    DegenerateLabels { classes_present: usize },

    #[error("model fit failed: {reason}")]
    Fit { reason: String },
}

/// Errors from the advisory collaborator. All of these fail open: retraining
/// proceeds without hints.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AdvisoryError {
    #[error("advisory call timed out after {ms}ms")]
    Timeout { ms: u64 },

    #[error("advisory transport error: {reason}")]
    Transport { reason: String },

    #[error("invalid suggestion rejected: {reason}")]
    InvalidSuggestion { reason: String },
}

/// Errors from the manual retraining trigger.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TriggerError {
    #[error("manual trigger rate limit reached: {limit} per {window_secs}s")]
    RateLimited { limit: usize, window_secs: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_carry_context() {
        let err = PredictionError::InsufficientContext {
            team: "Arsenal".to_string(),
            missing: "recent_form".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("Arsenal"));
        assert!(msg.contains("recent_form"));

        let err = TrainingError::InsufficientSamples { got: 12, need: 30 };
        assert!(err.to_string().contains("12 < 30"));
    }
}
