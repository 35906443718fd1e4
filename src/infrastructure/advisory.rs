use crate::domain::advisory::{MispredictionReport, Suggestion};
use crate::domain::errors::AdvisoryError;
use crate::domain::ports::AdvisoryService;
use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

/// HTTP client for the external advisory collaborator. A hard timeout is
/// set on the client itself; every failure maps to a typed error the
/// controller contains and fails open on.
pub struct HttpAdvisoryService {
    client: reqwest::Client,
    url: String,
    timeout_ms: u64,
}

#[derive(Serialize)]
struct SuggestRequest<'a> {
    mispredictions: &'a [MispredictionReport],
}

impl HttpAdvisoryService {
    pub fn new(url: String, timeout_ms: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()?;
        Ok(Self {
            client,
            url,
            timeout_ms,
        })
    }
}

#[async_trait]
impl AdvisoryService for HttpAdvisoryService {
    async fn suggest(
        &self,
        mispredictions: &[MispredictionReport],
    ) -> Result<Vec<Suggestion>, AdvisoryError> {
        debug!(count = mispredictions.len(), "requesting advisory suggestions");
        let response = self
            .client
            .post(&self.url)
            .json(&SuggestRequest { mispredictions })
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|err| {
                if err.is_timeout() {
                    AdvisoryError::Timeout {
                        ms: self.timeout_ms,
                    }
                } else {
                    AdvisoryError::Transport {
                        reason: err.to_string(),
                    }
                }
            })?;

        response
            .json::<Vec<Suggestion>>()
            .await
            .map_err(|err| AdvisoryError::InvalidSuggestion {
                reason: format!("undecodable response: {err}"),
            })
    }
}

/// Used when the advisory hook is disabled. Retraining then always runs
/// with the base feature space only.
pub struct NullAdvisoryService;

#[async_trait]
impl AdvisoryService for NullAdvisoryService {
    async fn suggest(
        &self,
        _mispredictions: &[MispredictionReport],
    ) -> Result<Vec<Suggestion>, AdvisoryError> {
        Ok(Vec::new())
    }
}
