use crate::application::cache::{Fingerprint, PredictionCache};
use crate::application::outcome_buffer::OutcomeBuffer;
use crate::application::predictor::Predictor;
use crate::application::retrainer::RetrainingController;
use crate::domain::errors::{OutcomeError, PredictionError};
use crate::domain::features::FeatureExtractor;
use crate::domain::ports::MatchDataStore;
use crate::domain::types::{FeatureVector, Outcome, OutcomeRecord, Prediction};
use chrono::NaiveDate;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::instrument;
use uuid::Uuid;

/// Issued predictions retained for outcome joins, FIFO-bounded.
const ISSUED_LEDGER_CAPACITY: usize = 10_000;

struct IssuedPrediction {
    prediction: Prediction,
    features: FeatureVector,
}

#[derive(Default)]
struct IssuedLedger {
    entries: HashMap<Uuid, IssuedPrediction>,
    order: VecDeque<Uuid>,
}

impl IssuedLedger {
    fn insert(&mut self, prediction: Prediction, features: FeatureVector) {
        let reference = prediction.reference;
        if self
            .entries
            .insert(
                reference,
                IssuedPrediction {
                    prediction,
                    features,
                },
            )
            .is_none()
        {
            self.order.push_back(reference);
        }
        while self.order.len() > ISSUED_LEDGER_CAPACITY {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }
}

/// Front door for prediction requests and outcome reports. Validates input
/// synchronously, then routes computation through the cache so identical
/// concurrent requests coalesce into one piece of work.
pub struct PredictionService {
    store: Arc<dyn MatchDataStore>,
    predictor: Arc<Predictor>,
    cache: Arc<PredictionCache>,
    buffer: Arc<OutcomeBuffer>,
    controller: Arc<RetrainingController>,
    extractor: Arc<FeatureExtractor>,
    issued: Arc<Mutex<IssuedLedger>>,
}

impl PredictionService {
    pub fn new(
        store: Arc<dyn MatchDataStore>,
        predictor: Arc<Predictor>,
        cache: Arc<PredictionCache>,
        buffer: Arc<OutcomeBuffer>,
        controller: Arc<RetrainingController>,
        extractor: Arc<FeatureExtractor>,
    ) -> Self {
        Self {
            store,
            predictor,
            cache,
            buffer,
            controller,
            extractor,
            issued: Arc::new(Mutex::new(IssuedLedger::default())),
        }
    }

    #[instrument(skip(self))]
    pub async fn predict(
        &self,
        home: &str,
        away: &str,
        date: &str,
    ) -> Result<Arc<Prediction>, PredictionError> {
        let home = home.trim();
        let away = away.trim();
        if home.is_empty() || away.is_empty() {
            return Err(PredictionError::InvalidTeams {
                home: home.to_string(),
                away: away.to_string(),
                reason: "team name must not be empty".to_string(),
            });
        }
        if home.eq_ignore_ascii_case(away) {
            return Err(PredictionError::InvalidTeams {
                home: home.to_string(),
                away: away.to_string(),
                reason: "a team cannot play itself".to_string(),
            });
        }
        let as_of = NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|_| {
            PredictionError::InvalidDate {
                input: date.to_string(),
            }
        })?;

        // Unknown teams are rejected before the cache so they can never
        // occupy a flight slot.
        for team in [home, away] {
            let known = self
                .store
                .team_exists(team)
                .await
                .map_err(|err| PredictionError::ContextFetch {
                    reason: err.to_string(),
                })?;
            if !known {
                return Err(PredictionError::InvalidTeams {
                    home: home.to_string(),
                    away: away.to_string(),
                    reason: format!("unknown team '{team}'"),
                });
            }
        }

        let key = Fingerprint::new(home, away, as_of);
        let store = self.store.clone();
        let extractor = self.extractor.clone();
        let predictor = self.predictor.clone();
        let issued = self.issued.clone();
        let (home, away) = (home.to_string(), away.to_string());

        self.cache
            .get_or_compute(key, async move {
                let ctx = store.context(&home, &away, as_of).await.map_err(|err| {
                    PredictionError::ContextFetch {
                        reason: err.to_string(),
                    }
                })?;
                let features = extractor.extract(&home, &away, as_of, &ctx)?;
                let prediction = predictor.predict(&features).await;
                issued.lock().await.insert(prediction.clone(), features);
                Ok(prediction)
            })
            .await
    }

    /// Joins a reported actual result with its issued prediction and hands
    /// the pair to the outcome buffer and the monitoring window.
    #[instrument(skip(self))]
    pub async fn report_outcome(
        &self,
        reference: Uuid,
        actual: Outcome,
    ) -> Result<(), OutcomeError> {
        let (prediction, features) = {
            let issued = self.issued.lock().await;
            match issued.entries.get(&reference) {
                Some(entry) => (entry.prediction.clone(), entry.features),
                None => return Err(OutcomeError::UnknownPrediction { reference }),
            }
        };

        let record = OutcomeRecord {
            prediction,
            features,
            actual,
            recorded_at: chrono::Utc::now(),
        };
        self.buffer.append(record.clone()).await?;
        self.controller.observe_outcome(&record).await;
        Ok(())
    }

    pub fn controller(&self) -> &Arc<RetrainingController> {
        &self.controller
    }
}
