use crate::domain::errors::AdvisoryError;
use crate::domain::types::{FeatureName, FeatureVector, Outcome};
use serde::{Deserialize, Serialize};

/// A structured, typed change proposal from the advisory collaborator.
/// Suggestions reference existing features by name only; they can never
/// carry code or refer to data outside the base feature vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Suggestion {
    /// Multiply one named base feature by a constant before classification.
    ReweightFeature {
        feature: FeatureName,
        multiplier: f64,
    },
    /// Append the product of two distinct named base features as a derived
    /// dimension.
    DeriveInteraction {
        left: FeatureName,
        right: FeatureName,
    },
}

/// One misprediction sent to the advisory collaborator for analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MispredictionReport {
    pub predicted: Outcome,
    pub actual: Outcome,
    pub confidence: f64,
    pub features: FeatureVector,
}

/// Largest reweight multiplier accepted from the collaborator.
const MAX_MULTIPLIER: f64 = 10.0;

/// Validates a raw suggestion batch. The collaborator is untrusted and
/// best-effort; an invalid batch is rejected wholesale so a partially
/// malformed response never influences training.
pub fn validate_suggestions(
    raw: Vec<Suggestion>,
    max_suggestions: usize,
) -> Result<Vec<Suggestion>, AdvisoryError> {
    if raw.len() > max_suggestions {
        return Err(AdvisoryError::InvalidSuggestion {
            reason: format!("batch of {} exceeds limit {max_suggestions}", raw.len()),
        });
    }
    for suggestion in &raw {
        match suggestion {
            Suggestion::ReweightFeature { feature, multiplier } => {
                if !multiplier.is_finite() || *multiplier <= 0.0 || *multiplier > MAX_MULTIPLIER {
                    return Err(AdvisoryError::InvalidSuggestion {
                        reason: format!(
                            "multiplier {multiplier} for {} outside (0, {MAX_MULTIPLIER}]",
                            feature.as_str()
                        ),
                    });
                }
            }
            Suggestion::DeriveInteraction { left, right } => {
                if left == right {
                    return Err(AdvisoryError::InvalidSuggestion {
                        reason: format!("interaction of {} with itself", left.as_str()),
                    });
                }
            }
        }
    }
    Ok(raw)
}
