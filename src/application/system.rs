use crate::application::cache::PredictionCache;
use crate::application::outcome_buffer::OutcomeBuffer;
use crate::application::predictor::Predictor;
use crate::application::retrainer::{ControllerState, ModelRegistry, RetrainingController};
use crate::application::service::PredictionService;
use crate::config::Config;
use crate::domain::features::FeatureExtractor;
use crate::domain::model::ModelHandle;
use crate::domain::ports::{AdvisoryService, MatchDataStore, ModelRepository};
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::info;

/// Wires the full pipeline together: loads persisted model versions, picks
/// the active one (or the version-0 bootstrap on a fresh install) and
/// constructs the service and controller around shared components.
pub struct PredictionSystem {
    service: Arc<PredictionService>,
    controller: Arc<RetrainingController>,
}

impl PredictionSystem {
    pub async fn build(
        config: Config,
        store: Arc<dyn MatchDataStore>,
        advisory: Arc<dyn AdvisoryService>,
        model_repo: Arc<dyn ModelRepository>,
    ) -> Result<Self> {
        config.validate()?;

        let mut handles = model_repo.load_all().await?;
        let active = match handles
            .iter()
            .find(|h| h.status == crate::domain::model::ModelStatus::Active)
        {
            Some(active) => {
                info!(version = active.version, accuracy = active.accuracy, "resuming active model");
                active.clone()
            }
            None => {
                info!("no persisted active model, starting from the uniform bootstrap");
                let neutral = ModelHandle::neutral();
                handles.push(neutral.clone());
                neutral
            }
        };
        let registry = ModelRegistry::from_loaded(handles);

        let extractor = Arc::new(FeatureExtractor::new(config.form_decay_weights.clone())?);
        let predictor = Arc::new(Predictor::new(Arc::new(active)));
        let cache = Arc::new(PredictionCache::new(
            Duration::from_secs(config.cache_ttl_secs),
            config.cache_capacity,
        ));
        let buffer = Arc::new(OutcomeBuffer::new(config.buffer_capacity));

        let controller = Arc::new(RetrainingController::new(
            config,
            store.clone(),
            advisory,
            model_repo,
            predictor.clone(),
            cache.clone(),
            buffer.clone(),
            extractor.clone(),
            registry,
        ));
        let service = Arc::new(PredictionService::new(
            store,
            predictor,
            cache,
            buffer,
            controller.clone(),
            extractor,
        ));

        Ok(Self {
            service,
            controller,
        })
    }

    /// Spawns the retraining event loop.
    pub fn start(&self) -> JoinHandle<()> {
        let controller = self.controller.clone();
        tokio::spawn(controller.run())
    }

    pub fn service(&self) -> Arc<PredictionService> {
        self.service.clone()
    }

    pub fn controller(&self) -> Arc<RetrainingController> {
        self.controller.clone()
    }

    pub fn state(&self) -> watch::Receiver<ControllerState> {
        self.controller.state()
    }
}
