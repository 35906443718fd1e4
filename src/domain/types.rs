use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Match result from the home side's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    Home,
    Draw,
    Away,
}

impl Outcome {
    /// Label encoding used for training and for indexing probability arrays:
    /// A=0, D=1, H=2.
    pub fn label(&self) -> usize {
        match self {
            Outcome::Away => 0,
            Outcome::Draw => 1,
            Outcome::Home => 2,
        }
    }

    pub fn from_label(label: usize) -> Option<Outcome> {
        match label {
            0 => Some(Outcome::Away),
            1 => Some(Outcome::Draw),
            2 => Some(Outcome::Home),
            _ => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Outcome::Home => "H",
            Outcome::Draw => "D",
            Outcome::Away => "A",
        }
    }

    pub fn from_code(code: &str) -> Option<Outcome> {
        match code {
            "H" | "h" => Some(Outcome::Home),
            "D" | "d" => Some(Outcome::Draw),
            "A" | "a" => Some(Outcome::Away),
            _ => None,
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Number of base feature dimensions. Order is part of the model contract;
/// changing it requires a new model version.
pub const FEATURE_COUNT: usize = 5;

/// Version of the base feature schema, part of the cache fingerprint.
pub const FEATURE_SCHEMA_VERSION: u32 = 1;

/// Names of the base feature dimensions, in vector order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureName {
    ShotDifferential,
    HomeAdvantage,
    FormDifferential,
    StrengthDifferential,
    HeadToHead,
}

impl FeatureName {
    pub const ALL: [FeatureName; FEATURE_COUNT] = [
        FeatureName::ShotDifferential,
        FeatureName::HomeAdvantage,
        FeatureName::FormDifferential,
        FeatureName::StrengthDifferential,
        FeatureName::HeadToHead,
    ];

    pub fn index(&self) -> usize {
        match self {
            FeatureName::ShotDifferential => 0,
            FeatureName::HomeAdvantage => 1,
            FeatureName::FormDifferential => 2,
            FeatureName::StrengthDifferential => 3,
            FeatureName::HeadToHead => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureName::ShotDifferential => "shot_differential",
            FeatureName::HomeAdvantage => "home_advantage",
            FeatureName::FormDifferential => "form_differential",
            FeatureName::StrengthDifferential => "strength_differential",
            FeatureName::HeadToHead => "head_to_head",
        }
    }
}

/// Immutable, fixed-order numeric feature tuple.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    values: [f64; FEATURE_COUNT],
}

impl FeatureVector {
    pub fn new(values: [f64; FEATURE_COUNT]) -> Self {
        Self { values }
    }

    pub fn get(&self, name: FeatureName) -> f64 {
        self.values[name.index()]
    }

    pub fn values(&self) -> &[f64; FEATURE_COUNT] {
        &self.values
    }
}

/// A single prediction issued by the predictor. Immutable once created.
///
/// The distribution (probabilities, outcome, confidence, model_version) is
/// fully determined by the feature vector and the active model handle;
/// `reference` and `computed_at` are per-issue metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub reference: Uuid,
    pub outcome: Outcome,
    /// Indexed by label encoding: [away, draw, home]. Sums to 1 within
    /// floating-point tolerance.
    pub probabilities: [f64; 3],
    /// Max probability.
    pub confidence: f64,
    pub model_version: u64,
    pub computed_at: DateTime<Utc>,
}

impl Prediction {
    pub fn probability_of(&self, outcome: Outcome) -> f64 {
        self.probabilities[outcome.label()]
    }
}

/// A (prediction, eventual actual outcome) pair awaiting consumption by
/// retraining. Never mutated after creation. The feature vector the
/// prediction was computed from is retained so drained records can be turned
/// into training rows directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub prediction: Prediction,
    pub features: FeatureVector,
    pub actual: Outcome,
    pub recorded_at: DateTime<Utc>,
}

impl OutcomeRecord {
    pub fn is_correct(&self) -> bool {
        self.prediction.outcome == self.actual
    }
}

/// Per-team context resolved by the data store. `None` means the store has
/// no data for that signal; the extractor treats that as an upstream data
/// fault, never as a neutral prior.
#[derive(Debug, Clone, Default)]
pub struct TeamContext {
    /// Points (3/1/0) from the team's most recent matches, most recent first,
    /// at most 5 entries.
    pub recent_points: Vec<u8>,
    /// Average shots on target over the team's recent fixtures on the
    /// relevant side (home fixtures for the home team, away for the away).
    pub shots_on_target_avg: Option<f64>,
    /// Externally maintained Elo-like rating.
    pub rating: Option<f64>,
}

/// Upstream-resolved context for one fixture.
#[derive(Debug, Clone, Default)]
pub struct MatchContext {
    pub home: TeamContext,
    pub away: TeamContext,
    /// Home side's points (1.0 win / 0.5 draw / 0.0 loss) over the last
    /// meetings between the two teams, most recent first, at most 5 entries.
    /// Empty when the teams have never met; head-to-head is the one signal
    /// with a documented neutral default (0.5).
    pub h2h_home_points: Vec<f64>,
}

/// A validated historical match row used for training. The producing store
/// has already filtered rows matching the known fabrication pattern
/// (shots on target == goals + 2); this crate does not re-detect it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabeledMatch {
    pub home_team: String,
    pub away_team: String,
    pub date: NaiveDate,
    pub home_shots_on_target: u32,
    pub away_shots_on_target: u32,
    pub home_goals: u32,
    pub away_goals: u32,
    pub result: Outcome,
}
