use crate::domain::errors::PredictionError;
use crate::domain::types::{FeatureVector, MatchContext, TeamContext};
use anyhow::{Result, bail};
use chrono::NaiveDate;

/// Maximum points per match, used to normalize form scores into [0, 1].
const MAX_POINTS_PER_MATCH: f64 = 3.0;

/// Derives the fixed 5-dimension feature vector from two teams and the
/// context resolved by the data store.
///
/// The extractor never substitutes a neutral value for a genuinely missing
/// signal; absent context surfaces as `InsufficientContext` so data-quality
/// faults are not masked as priors. Head-to-head is the single documented
/// exception: 0.5 when the teams have never met.
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    /// Decay weights applied to recent results, ordered earliest to most
    /// recent, monotonically non-decreasing.
    decay_weights: Vec<f64>,
}

impl FeatureExtractor {
    pub fn new(decay_weights: Vec<f64>) -> Result<Self> {
        validate_decay_weights(&decay_weights)?;
        Ok(Self { decay_weights })
    }

    pub fn extract(
        &self,
        home: &str,
        away: &str,
        _as_of: NaiveDate,
        ctx: &MatchContext,
    ) -> Result<FeatureVector, PredictionError> {
        let home_shots = require(home, "shots_on_target_avg", ctx.home.shots_on_target_avg)?;
        let away_shots = require(away, "shots_on_target_avg", ctx.away.shots_on_target_avg)?;
        let home_rating = require(home, "rating", ctx.home.rating)?;
        let away_rating = require(away, "rating", ctx.away.rating)?;
        let home_form = self.form_score(home, &ctx.home)?;
        let away_form = self.form_score(away, &ctx.away)?;

        let h2h = if ctx.h2h_home_points.is_empty() {
            // Documented neutral default: no head-to-head history exists.
            0.5
        } else {
            let taken: Vec<f64> = ctx.h2h_home_points.iter().take(5).copied().collect();
            taken.iter().sum::<f64>() / taken.len() as f64
        };

        Ok(FeatureVector::new([
            home_shots - away_shots,
            1.0,
            home_form - away_form,
            (home_rating - away_rating) / 100.0,
            h2h,
        ]))
    }

    /// Weighted recent-form score in [0, 1]. Results are supplied most
    /// recent first; the most recent result receives the last (largest)
    /// decay weight.
    fn form_score(&self, team: &str, ctx: &TeamContext) -> Result<f64, PredictionError> {
        if ctx.recent_points.is_empty() {
            return Err(PredictionError::InsufficientContext {
                team: team.to_string(),
                missing: "recent_form".to_string(),
            });
        }

        let n = ctx.recent_points.len().min(self.decay_weights.len());
        let mut weighted = 0.0;
        let mut weight_sum = 0.0;
        for i in 0..n {
            let weight = self.decay_weights[self.decay_weights.len() - 1 - i];
            weighted += f64::from(ctx.recent_points[i]) * weight;
            weight_sum += weight;
        }

        Ok(weighted / (weight_sum * MAX_POINTS_PER_MATCH))
    }
}

fn require(team: &str, field: &str, value: Option<f64>) -> Result<f64, PredictionError> {
    value.ok_or_else(|| PredictionError::InsufficientContext {
        team: team.to_string(),
        missing: field.to_string(),
    })
}

pub fn validate_decay_weights(weights: &[f64]) -> Result<()> {
    if weights.is_empty() || weights.len() > 5 {
        bail!("decay weights must have 1 to 5 entries, got {}", weights.len());
    }
    for pair in weights.windows(2) {
        if pair[1] < pair[0] {
            bail!("decay weights must be non-decreasing earliest to most recent: {weights:?}");
        }
    }
    if weights.iter().any(|w| *w <= 0.0 || !w.is_finite()) {
        bail!("decay weights must be positive and finite: {weights:?}");
    }
    Ok(())
}
