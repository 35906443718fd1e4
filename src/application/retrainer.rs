use crate::application::cache::PredictionCache;
use crate::application::outcome_buffer::OutcomeBuffer;
use crate::application::predictor::Predictor;
use crate::config::Config;
use crate::domain::advisory::{MispredictionReport, Suggestion, validate_suggestions};
use crate::domain::classifier::{FitParams, SoftmaxClassifier};
use crate::domain::errors::{TrainingError, TriggerError};
use crate::domain::features::FeatureExtractor;
use crate::domain::model::{FeatureTransform, ModelHandle, ModelStatus};
use crate::domain::ports::{AdvisoryService, MatchDataStore, ModelRepository};
use crate::domain::types::{FeatureVector, OutcomeRecord};
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify, watch};
use tokio::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Observable state of the retraining controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Training,
    Evaluating,
    Promoting,
    Discarding,
    Monitoring,
    RollingBack,
}

/// All model versions this process knows about. Exactly one is `Active`.
pub struct ModelRegistry {
    handles: Vec<ModelHandle>,
    next_version: u64,
}

impl ModelRegistry {
    pub fn from_loaded(mut handles: Vec<ModelHandle>) -> Self {
        handles.sort_by_key(|h| h.version);
        let next_version = handles.iter().map(|h| h.version + 1).max().unwrap_or(1);
        Self {
            handles,
            next_version,
        }
    }

    pub fn active(&self) -> Option<&ModelHandle> {
        self.handles.iter().find(|h| h.status == ModelStatus::Active)
    }

    pub fn handles(&self) -> &[ModelHandle] {
        &self.handles
    }

    /// Assigns the next version number, retires the current active model and
    /// installs the candidate. Returns the new active handle and the retired
    /// version, if any.
    fn promote(&mut self, mut candidate: ModelHandle) -> (ModelHandle, Option<u64>) {
        let old_version = self
            .handles
            .iter_mut()
            .find(|h| h.status == ModelStatus::Active)
            .map(|h| {
                h.status = ModelStatus::Retired;
                h.version
            });
        candidate.version = self.next_version;
        self.next_version += 1;
        candidate.status = ModelStatus::Active;
        self.handles.push(candidate.clone());
        (candidate, old_version)
    }

    /// Marks the active model rolled back and restores the most recently
    /// retired version. Returns the restored handle and the demoted version.
    fn rollback(&mut self) -> Option<(ModelHandle, u64)> {
        let failed = self
            .handles
            .iter()
            .position(|h| h.status == ModelStatus::Active)?;
        let restored = self
            .handles
            .iter()
            .enumerate()
            .filter(|(_, h)| h.status == ModelStatus::Retired)
            .max_by_key(|(_, h)| h.version)
            .map(|(i, _)| i)?;
        let failed_version = self.handles[failed].version;
        self.handles[failed].status = ModelStatus::RolledBack;
        self.handles[restored].status = ModelStatus::Active;
        Some((self.handles[restored].clone(), failed_version))
    }
}

struct MonitorWindow {
    target_version: u64,
    results: Vec<bool>,
    size: usize,
}

/// Background training pipeline: drains the outcome buffer, fits candidate
/// models, promotes strict improvements, and watches freshly promoted models
/// for an accuracy collapse worth rolling back.
///
/// One cycle runs at a time. A failed cycle discards its candidate, leaves
/// the active model untouched and is never retried automatically.
pub struct RetrainingController {
    config: Config,
    store: Arc<dyn MatchDataStore>,
    advisory: Arc<dyn AdvisoryService>,
    model_repo: Arc<dyn ModelRepository>,
    predictor: Arc<Predictor>,
    cache: Arc<PredictionCache>,
    buffer: Arc<OutcomeBuffer>,
    extractor: Arc<FeatureExtractor>,
    state_tx: watch::Sender<ControllerState>,
    registry: Mutex<ModelRegistry>,
    manual_triggers: Mutex<Vec<Instant>>,
    manual_notify: Notify,
    monitor: Mutex<Option<MonitorWindow>>,
    /// Training cycles and monitoring-window closures serialize on this
    /// lock, so the observable state sequence never interleaves the two.
    lifecycle: Mutex<()>,
}

impl RetrainingController {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        store: Arc<dyn MatchDataStore>,
        advisory: Arc<dyn AdvisoryService>,
        model_repo: Arc<dyn ModelRepository>,
        predictor: Arc<Predictor>,
        cache: Arc<PredictionCache>,
        buffer: Arc<OutcomeBuffer>,
        extractor: Arc<FeatureExtractor>,
        registry: ModelRegistry,
    ) -> Self {
        let (state_tx, _) = watch::channel(ControllerState::Idle);
        Self {
            config,
            store,
            advisory,
            model_repo,
            predictor,
            cache,
            buffer,
            extractor,
            state_tx,
            registry: Mutex::new(registry),
            manual_triggers: Mutex::new(Vec::new()),
            manual_notify: Notify::new(),
            monitor: Mutex::new(None),
            lifecycle: Mutex::new(()),
        }
    }

    pub fn state(&self) -> watch::Receiver<ControllerState> {
        self.state_tx.subscribe()
    }

    fn set_state(&self, state: ControllerState) {
        debug!(?state, "controller state");
        self.state_tx.send_replace(state);
    }

    /// Event loop: wakes when the outcome buffer fills or a manual trigger
    /// fires, then runs one training cycle over the drained records.
    pub async fn run(self: Arc<Self>) {
        loop {
            let records = tokio::select! {
                _ = self.buffer.wait_full() => self.buffer.drain_if_full().await,
                _ = self.manual_notify.notified() => self.buffer.drain_all().await,
            };
            if records.is_empty() {
                continue;
            }
            self.run_cycle(records).await;
        }
    }

    /// Requests an immediate cycle, subject to a sliding-window rate limit.
    pub async fn trigger_manual(&self) -> Result<(), TriggerError> {
        let window = Duration::from_secs(self.config.manual_trigger_window_secs);
        let mut triggers = self.manual_triggers.lock().await;
        let now = Instant::now();
        triggers.retain(|t| now.duration_since(*t) < window);
        if triggers.len() >= self.config.manual_trigger_limit {
            return Err(TriggerError::RateLimited {
                limit: self.config.manual_trigger_limit,
                window_secs: self.config.manual_trigger_window_secs,
            });
        }
        triggers.push(now);
        drop(triggers);
        self.manual_notify.notify_one();
        Ok(())
    }

    /// One full train-evaluate-promote cycle.
    pub async fn run_cycle(&self, records: Vec<OutcomeRecord>) {
        let _cycle = self.lifecycle.lock().await;
        self.set_state(ControllerState::Training);
        match self.train_and_evaluate(&records).await {
            Ok(Some(candidate)) => {
                self.set_state(ControllerState::Promoting);
                self.promote_candidate(candidate).await;
            }
            Ok(None) => {
                self.set_state(ControllerState::Discarding);
                info!("candidate discarded: no improvement over active model");
                self.settle().await;
            }
            Err(err) => {
                self.set_state(ControllerState::Discarding);
                error!(%err, "training cycle failed, active model unchanged");
                self.settle().await;
            }
        }
    }

    /// Called for every accepted outcome report. Feeds the monitoring window
    /// when one is open for the reporting prediction's model version.
    pub async fn observe_outcome(&self, record: &OutcomeRecord) {
        let closed = {
            let mut monitor = self.monitor.lock().await;
            let mut complete = false;
            if let Some(window) = monitor.as_mut() {
                if record.prediction.model_version == window.target_version {
                    window.results.push(record.is_correct());
                    complete = window.results.len() >= window.size;
                }
            }
            if complete { monitor.take() } else { None }
        };

        if let Some(window) = closed {
            // A closure that races an in-flight cycle waits its turn.
            let _cycle = self.lifecycle.lock().await;
            let correct = window.results.iter().filter(|c| **c).count();
            let accuracy = correct as f64 / window.results.len() as f64;
            if accuracy < self.config.rollback_floor {
                warn!(
                    version = window.target_version,
                    accuracy,
                    floor = self.config.rollback_floor,
                    "monitored accuracy below floor, rolling back"
                );
                self.set_state(ControllerState::RollingBack);
                self.rollback().await;
            } else {
                info!(
                    version = window.target_version,
                    accuracy, "monitoring window closed clean"
                );
            }
            self.set_state(ControllerState::Idle);
        }
    }

    async fn train_and_evaluate(
        &self,
        records: &[OutcomeRecord],
    ) -> Result<Option<ModelHandle>, TrainingError> {
        let rows = self.build_dataset(records).await?;
        if rows.len() < self.config.min_training_samples {
            return Err(TrainingError::InsufficientSamples {
                got: rows.len(),
                need: self.config.min_training_samples,
            });
        }

        // Temporal split: rows are ordered oldest to newest, so the holdout
        // is always the most recent slice. Random splits would leak future
        // results into training.
        let holdout = ((rows.len() as f64 * self.config.holdout_fraction).round() as usize)
            .clamp(1, rows.len() - 1);
        let split = rows.len() - holdout;
        let (train, valid) = rows.split_at(split);

        let suggestions = self.collect_suggestions(records).await;
        let params = FitParams {
            epochs: self.config.fit_epochs,
            learning_rate: self.config.fit_learning_rate,
        };

        let base_transform = FeatureTransform::identity();
        let base = self.fit_candidate(&base_transform, train, params)?;

        self.set_state(ControllerState::Evaluating);
        let labels: Vec<usize> = valid.iter().map(|(_, label)| *label).collect();
        let mut best_transform = base_transform;
        let mut best_classifier = base;
        let mut best_accuracy = {
            let x = apply_all(&best_transform, valid);
            best_classifier.accuracy(&x, &labels)
        };

        // One candidate per accepted suggestion. Strict improvement wins;
        // ties keep the earlier (plainer) candidate.
        for suggestion in suggestions {
            let transform = FeatureTransform::from_suggestions(vec![suggestion]);
            let classifier = match self.fit_candidate(&transform, train, params) {
                Ok(c) => c,
                Err(err) => {
                    warn!(%err, ?suggestion, "suggested candidate failed to fit, skipping");
                    continue;
                }
            };
            let x = apply_all(&transform, valid);
            let accuracy = classifier.accuracy(&x, &labels);
            if accuracy > best_accuracy {
                best_accuracy = accuracy;
                best_classifier = classifier;
                best_transform = transform;
            }
        }

        let incumbent = self.predictor.active().await;
        if best_accuracy > incumbent.accuracy + self.config.promotion_margin {
            Ok(Some(ModelHandle {
                version: 0, // assigned by the registry at promotion
                accuracy: best_accuracy,
                trained_at: Utc::now(),
                status: ModelStatus::Candidate,
                classifier: best_classifier,
                transform: best_transform,
            }))
        } else {
            info!(
                candidate = best_accuracy,
                incumbent = incumbent.accuracy,
                margin = self.config.promotion_margin,
                "candidate did not clear the promotion margin"
            );
            Ok(None)
        }
    }

    /// Historical rows within the training window, oldest first, followed by
    /// the drained outcome records. Rows whose context cannot be resolved
    /// are skipped rather than failing the whole cycle.
    async fn build_dataset(
        &self,
        records: &[OutcomeRecord],
    ) -> Result<Vec<(FeatureVector, usize)>, TrainingError> {
        let since = Utc::now().date_naive() - ChronoDuration::days(self.config.training_window_days);
        let matches = self
            .store
            .training_matches(since)
            .await
            .map_err(|err| TrainingError::Fit {
                reason: format!("training data unavailable: {err}"),
            })?;

        let mut rows = Vec::with_capacity(matches.len() + records.len());
        for m in &matches {
            let ctx = match self.store.context(&m.home_team, &m.away_team, m.date).await {
                Ok(ctx) => ctx,
                Err(err) => {
                    debug!(%err, home = %m.home_team, away = %m.away_team, "skipping row without context");
                    continue;
                }
            };
            match self.extractor.extract(&m.home_team, &m.away_team, m.date, &ctx) {
                Ok(features) => rows.push((features, m.result.label())),
                Err(err) => {
                    debug!(%err, home = %m.home_team, away = %m.away_team, "skipping row without features");
                }
            }
        }
        for record in records {
            rows.push((record.features, record.actual.label()));
        }
        Ok(rows)
    }

    /// Asks the advisory collaborator about this cycle's mispredictions.
    /// Every failure mode collapses to an empty suggestion list.
    async fn collect_suggestions(&self, records: &[OutcomeRecord]) -> Vec<Suggestion> {
        let mispredictions: Vec<MispredictionReport> = records
            .iter()
            .filter(|r| !r.is_correct())
            .map(|r| MispredictionReport {
                predicted: r.prediction.outcome,
                actual: r.actual,
                confidence: r.prediction.confidence,
                features: r.features,
            })
            .collect();
        if mispredictions.is_empty() {
            return Vec::new();
        }

        let raw = match self.advisory.suggest(&mispredictions).await {
            Ok(raw) => raw,
            Err(err) => {
                warn!(%err, "advisory unavailable, training without hints");
                return Vec::new();
            }
        };
        match validate_suggestions(raw, self.config.advisory_max_suggestions) {
            Ok(valid) => valid,
            Err(err) => {
                warn!(%err, "advisory batch rejected, training without hints");
                Vec::new()
            }
        }
    }

    fn fit_candidate(
        &self,
        transform: &FeatureTransform,
        train: &[(FeatureVector, usize)],
        params: FitParams,
    ) -> Result<SoftmaxClassifier, TrainingError> {
        let x = apply_all(transform, train);
        let y: Vec<usize> = train.iter().map(|(_, label)| *label).collect();
        SoftmaxClassifier::fit(&x, &y, params)
    }

    /// Installs a promoted candidate: registry first, then the predictor,
    /// then the cache. Invalidation strictly follows the swap so no window
    /// exists in which the cache refills from the superseded model.
    pub async fn promote_candidate(&self, candidate: ModelHandle) {
        let (new_active, old_version, snapshot) = {
            let mut registry = self.registry.lock().await;
            let (new_active, old_version) = registry.promote(candidate);
            (new_active, old_version, registry.handles().to_vec())
        };

        self.predictor.swap_active(Arc::new(new_active.clone())).await;
        self.cache.invalidate_all().await;
        self.persist(&snapshot).await;

        info!(
            old = ?old_version,
            new = new_active.version,
            accuracy = new_active.accuracy,
            "promoted model"
        );

        let mut monitor = self.monitor.lock().await;
        *monitor = Some(MonitorWindow {
            target_version: new_active.version,
            results: Vec::new(),
            size: self.config.monitoring_window,
        });
        drop(monitor);
        self.set_state(ControllerState::Monitoring);
    }

    /// Restores the most recently retired version. Infallible by design:
    /// persistence problems are logged, never allowed to block the swap.
    async fn rollback(&self) {
        let restored = {
            let mut registry = self.registry.lock().await;
            let outcome = registry.rollback();
            outcome.map(|(restored, failed)| (restored, failed, registry.handles().to_vec()))
        };

        match restored {
            Some((restored, failed, snapshot)) => {
                self.predictor.swap_active(Arc::new(restored.clone())).await;
                self.cache.invalidate_all().await;
                self.persist(&snapshot).await;
                warn!(failed, restored = restored.version, "rolled back model");
            }
            None => {
                // Version 0 has no predecessor; the active model stays.
                warn!("rollback requested but no retired version exists");
            }
        }
    }

    async fn persist(&self, handles: &[ModelHandle]) {
        for handle in handles {
            if let Err(err) = self.model_repo.save(handle).await {
                warn!(%err, version = handle.version, "failed to persist model version");
            }
        }
    }

    /// Returns the observable state to its resting value, which is
    /// `Monitoring` while a window is still open.
    async fn settle(&self) {
        let monitoring = self.monitor.lock().await.is_some();
        self.set_state(if monitoring {
            ControllerState::Monitoring
        } else {
            ControllerState::Idle
        });
    }
}

fn apply_all(transform: &FeatureTransform, rows: &[(FeatureVector, usize)]) -> Vec<Vec<f64>> {
    rows.iter().map(|(v, _)| transform.apply(v)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(version: u64, status: ModelStatus, accuracy: f64) -> ModelHandle {
        let mut h = ModelHandle::neutral();
        h.version = version;
        h.status = status;
        h.accuracy = accuracy;
        h
    }

    #[test]
    fn promotion_retires_the_active_version_and_numbers_monotonically() {
        let mut registry = ModelRegistry::from_loaded(vec![handle(0, ModelStatus::Active, 0.0)]);
        let (new_active, old) = registry.promote(handle(0, ModelStatus::Candidate, 0.7));

        assert_eq!(new_active.version, 1);
        assert_eq!(new_active.status, ModelStatus::Active);
        assert_eq!(old, Some(0));
        assert_eq!(registry.active().unwrap().version, 1);
        assert_eq!(
            registry
                .handles()
                .iter()
                .filter(|h| h.status == ModelStatus::Active)
                .count(),
            1
        );

        let (newer, _) = registry.promote(handle(0, ModelStatus::Candidate, 0.75));
        assert_eq!(newer.version, 2);
    }

    #[test]
    fn rollback_restores_the_most_recent_retired_version() {
        let mut registry = ModelRegistry::from_loaded(vec![
            handle(1, ModelStatus::Retired, 0.70),
            handle(2, ModelStatus::Retired, 0.72),
            handle(3, ModelStatus::Active, 0.74),
        ]);

        let (restored, failed) = registry.rollback().unwrap();
        assert_eq!(failed, 3);
        assert_eq!(restored.version, 2);
        assert_eq!(registry.active().unwrap().version, 2);
        assert!(
            registry
                .handles()
                .iter()
                .any(|h| h.version == 3 && h.status == ModelStatus::RolledBack)
        );
    }

    #[test]
    fn rollback_without_a_predecessor_is_a_no_op() {
        let mut registry = ModelRegistry::from_loaded(vec![handle(0, ModelStatus::Active, 0.0)]);
        assert!(registry.rollback().is_none());
        assert_eq!(registry.active().unwrap().version, 0);
    }

    #[test]
    fn loaded_registry_continues_version_numbering() {
        let registry = ModelRegistry::from_loaded(vec![
            handle(4, ModelStatus::Retired, 0.7),
            handle(5, ModelStatus::Active, 0.73),
        ]);
        assert_eq!(registry.next_version, 6);
    }
}
