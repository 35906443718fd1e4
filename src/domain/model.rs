use crate::domain::advisory::Suggestion;
use crate::domain::classifier::SoftmaxClassifier;
use crate::domain::types::{FEATURE_COUNT, FeatureVector};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a model version. Exactly one version is `Active` at
/// any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelStatus {
    Candidate,
    Active,
    Retired,
    RolledBack,
}

/// The feature-space transform a model was trained under, derived from the
/// advisory suggestions accepted for that model. Applied to every base
/// vector before classification so training and serving always see the same
/// feature space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureTransform {
    steps: Vec<Suggestion>,
}

impl FeatureTransform {
    /// Passes the base vector through unchanged.
    pub fn identity() -> Self {
        Self { steps: Vec::new() }
    }

    /// Builds a transform from an already-validated suggestion batch.
    pub fn from_suggestions(steps: Vec<Suggestion>) -> Self {
        Self { steps }
    }

    /// Width of the transformed row: the base dimensions plus one appended
    /// dimension per derived interaction.
    pub fn output_dims(&self) -> usize {
        let interactions = self
            .steps
            .iter()
            .filter(|s| matches!(s, Suggestion::DeriveInteraction { .. }))
            .count();
        FEATURE_COUNT + interactions
    }

    /// Applies the transform. Reweights scale base dimensions in place;
    /// interactions are products of the ORIGINAL base values, so they are
    /// unaffected by reweights and by each other.
    pub fn apply(&self, v: &FeatureVector) -> Vec<f64> {
        let mut out: Vec<f64> = v.values().to_vec();
        for step in &self.steps {
            match step {
                Suggestion::ReweightFeature {
                    feature,
                    multiplier,
                } => {
                    out[feature.index()] *= multiplier;
                }
                Suggestion::DeriveInteraction { left, right } => {
                    out.push(v.get(*left) * v.get(*right));
                }
            }
        }
        out
    }

    pub fn steps(&self) -> &[Suggestion] {
        &self.steps
    }
}

/// One immutable model version: classifier coefficients, the transform it
/// was trained under, and evaluation metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelHandle {
    pub version: u64,
    pub accuracy: f64,
    pub trained_at: DateTime<Utc>,
    pub status: ModelStatus,
    pub classifier: SoftmaxClassifier,
    pub transform: FeatureTransform,
}

impl ModelHandle {
    /// Version-0 bootstrap model for a fresh install with no persisted
    /// versions. Predicts the uniform distribution; its accuracy of 0.0
    /// guarantees the first successful training run replaces it.
    pub fn neutral() -> Self {
        Self {
            version: 0,
            accuracy: 0.0,
            trained_at: Utc::now(),
            status: ModelStatus::Active,
            classifier: SoftmaxClassifier::uniform(FEATURE_COUNT),
            transform: FeatureTransform::identity(),
        }
    }

    /// Probability distribution over [away, draw, home] for a base feature
    /// vector, applying this version's transform first.
    pub fn infer(&self, features: &FeatureVector) -> [f64; 3] {
        let row = self.transform.apply(features);
        self.classifier.predict_proba(&row)
    }
}
