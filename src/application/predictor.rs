use crate::domain::classifier::argmax;
use crate::domain::model::ModelHandle;
use crate::domain::types::{FeatureVector, Outcome, Prediction};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Holds the active model and turns feature vectors into predictions.
///
/// The active handle is swapped atomically behind a read-write lock. A
/// prediction in flight keeps its own `Arc` clone, so a concurrent swap
/// never mixes two versions within one prediction.
pub struct Predictor {
    active: RwLock<Arc<ModelHandle>>,
}

impl Predictor {
    pub fn new(initial: Arc<ModelHandle>) -> Self {
        Self {
            active: RwLock::new(initial),
        }
    }

    pub async fn active(&self) -> Arc<ModelHandle> {
        self.active.read().await.clone()
    }

    /// Installs a new active model, returning the one it replaced.
    pub async fn swap_active(&self, next: Arc<ModelHandle>) -> Arc<ModelHandle> {
        let mut guard = self.active.write().await;
        std::mem::replace(&mut *guard, next)
    }

    /// Runs inference under whichever model is active at call time.
    pub async fn predict(&self, features: &FeatureVector) -> Prediction {
        // Clone out so the lock is not held across inference.
        let model = self.active().await;
        let probabilities = model.infer(features);
        let (label, confidence) = argmax(&probabilities);
        let outcome = Outcome::from_label(label).unwrap_or(Outcome::Draw);

        Prediction {
            reference: Uuid::new_v4(),
            outcome,
            probabilities,
            confidence,
            model_version: model.version,
            computed_at: chrono::Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn prediction_carries_the_active_version() {
        let predictor = Predictor::new(Arc::new(ModelHandle::neutral()));
        let v = FeatureVector::new([1.0, 1.0, 0.2, 0.5, 0.5]);

        let p = predictor.predict(&v).await;
        assert_eq!(p.model_version, 0);
        let sum: f64 = p.probabilities.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
        assert_eq!(p.confidence, p.probability_of(p.outcome));
    }

    #[tokio::test]
    async fn swap_returns_the_previous_model() {
        let predictor = Predictor::new(Arc::new(ModelHandle::neutral()));
        let mut next = ModelHandle::neutral();
        next.version = 7;

        let previous = predictor.swap_active(Arc::new(next)).await;
        assert_eq!(previous.version, 0);
        assert_eq!(predictor.active().await.version, 7);
    }
}
