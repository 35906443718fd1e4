use crate::domain::advisory::{MispredictionReport, Suggestion};
use crate::domain::errors::AdvisoryError;
use crate::domain::model::ModelHandle;
use crate::domain::types::{LabeledMatch, MatchContext};
use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

/// Read-only access to historical match data. Implementations resolve the
/// per-fixture context the feature extractor needs and supply labeled rows
/// for training. Rows matching the known fabrication pattern are filtered by
/// the implementation before they reach this boundary.
#[async_trait]
pub trait MatchDataStore: Send + Sync {
    async fn team_exists(&self, team: &str) -> Result<bool>;

    /// Resolves both teams' recent context and their head-to-head history as
    /// of the given date.
    async fn context(&self, home: &str, away: &str, as_of: NaiveDate) -> Result<MatchContext>;

    /// Labeled matches on or after `since`, ordered by date ascending.
    async fn training_matches(&self, since: NaiveDate) -> Result<Vec<LabeledMatch>>;
}

/// Optional external collaborator consulted during retraining. Best-effort:
/// every failure mode is contained and retraining proceeds without hints.
#[async_trait]
pub trait AdvisoryService: Send + Sync {
    async fn suggest(
        &self,
        mispredictions: &[MispredictionReport],
    ) -> Result<Vec<Suggestion>, AdvisoryError>;
}

/// Durable storage for model versions.
#[async_trait]
pub trait ModelRepository: Send + Sync {
    async fn save(&self, handle: &ModelHandle) -> Result<()>;

    /// All persisted versions, ordered by version ascending.
    async fn load_all(&self) -> Result<Vec<ModelHandle>>;
}
