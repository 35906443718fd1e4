use chrono::NaiveDate;
use decisivis::application::system::PredictionSystem;
use decisivis::config::Config;
use decisivis::domain::errors::{OutcomeError, PredictionError};
use decisivis::domain::types::{LabeledMatch, Outcome};
use decisivis::infrastructure::advisory::NullAdvisoryService;
use decisivis::infrastructure::match_store::InMemoryMatchStore;
use decisivis::infrastructure::model_repo::JsonModelRepository;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

fn m(date: &str, home: &str, away: &str, hg: u32, ag: u32, hst: u32, ast: u32) -> LabeledMatch {
    let result = match hg.cmp(&ag) {
        std::cmp::Ordering::Greater => Outcome::Home,
        std::cmp::Ordering::Equal => Outcome::Draw,
        std::cmp::Ordering::Less => Outcome::Away,
    };
    LabeledMatch {
        home_team: home.to_string(),
        away_team: away.to_string(),
        date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
        home_shots_on_target: hst,
        away_shots_on_target: ast,
        home_goals: hg,
        away_goals: ag,
        result,
    }
}

fn fixture_matches() -> Vec<LabeledMatch> {
    vec![
        m("2025-01-04", "Arsenal", "Spurs", 2, 0, 7, 3),
        m("2025-01-08", "Chelsea", "Leeds", 1, 1, 4, 4),
        m("2025-01-11", "Chelsea", "Arsenal", 1, 2, 4, 6),
        m("2025-01-15", "Spurs", "Leeds", 2, 1, 5, 3),
        m("2025-01-18", "Arsenal", "Chelsea", 3, 1, 8, 2),
        m("2025-01-22", "Leeds", "Spurs", 0, 1, 2, 4),
        m("2025-01-25", "Spurs", "Arsenal", 0, 2, 3, 6),
        m("2025-01-29", "Leeds", "Chelsea", 0, 3, 1, 6),
        m("2025-02-01", "Arsenal", "Spurs", 1, 1, 5, 4),
        m("2025-02-05", "Chelsea", "Spurs", 2, 2, 5, 5),
    ]
}

fn scratch_model_dir() -> PathBuf {
    std::env::temp_dir().join(format!("decisivis-test-{}", Uuid::new_v4()))
}

async fn build_system() -> PredictionSystem {
    let mut config = Config::default();
    config.model_dir = scratch_model_dir();
    PredictionSystem::build(
        config,
        Arc::new(InMemoryMatchStore::new(fixture_matches())),
        Arc::new(NullAdvisoryService),
        Arc::new(JsonModelRepository::new(scratch_model_dir())),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn malformed_requests_are_rejected_synchronously() {
    let service = build_system().await.service();

    let err = service.predict("", "Spurs", "2025-03-01").await.unwrap_err();
    assert!(matches!(err, PredictionError::InvalidTeams { .. }));

    let err = service
        .predict("Arsenal", "arsenal", "2025-03-01")
        .await
        .unwrap_err();
    assert!(
        matches!(err, PredictionError::InvalidTeams { .. }),
        "a team cannot play itself"
    );

    let err = service
        .predict("Arsenal", "Spurs", "03/01/2025")
        .await
        .unwrap_err();
    assert_eq!(
        err,
        PredictionError::InvalidDate {
            input: "03/01/2025".to_string()
        }
    );

    let err = service
        .predict("Arsenal", "Barnsley", "2025-03-01")
        .await
        .unwrap_err();
    assert!(
        matches!(err, PredictionError::InvalidTeams { ref reason, .. } if reason.contains("Barnsley"))
    );
}

#[tokio::test]
async fn missing_context_surfaces_instead_of_a_default_prediction() {
    let service = build_system().await.service();

    // No match predates Jan 4, so neither team has any resolvable context.
    let err = service
        .predict("Arsenal", "Spurs", "2025-01-04")
        .await
        .unwrap_err();
    assert!(matches!(err, PredictionError::InsufficientContext { .. }));
}

#[tokio::test]
async fn repeated_requests_are_served_from_the_cache() {
    let service = build_system().await.service();

    let first = service
        .predict("Arsenal", "Spurs", "2025-03-01")
        .await
        .unwrap();
    let sum: f64 = first.probabilities.iter().sum();
    assert!((sum - 1.0).abs() < 1e-9, "distribution must sum to 1");
    assert_eq!(first.confidence, first.probability_of(first.outcome));

    let second = service
        .predict("Arsenal", "Spurs", "2025-03-01")
        .await
        .unwrap();
    assert_eq!(
        first.reference, second.reference,
        "identical request within the TTL must be the same cached prediction"
    );

    let other_date = service
        .predict("Arsenal", "Spurs", "2025-03-08")
        .await
        .unwrap();
    assert_ne!(first.reference, other_date.reference);
}

#[tokio::test]
async fn outcome_reports_are_exactly_once_per_prediction() {
    let service = build_system().await.service();

    let prediction = service
        .predict("Arsenal", "Chelsea", "2025-03-01")
        .await
        .unwrap();

    // 1. Unknown reference is rejected.
    let unknown = Uuid::new_v4();
    let err = service
        .report_outcome(unknown, Outcome::Home)
        .await
        .unwrap_err();
    assert_eq!(err, OutcomeError::UnknownPrediction { reference: unknown });

    // 2. First report is accepted.
    service
        .report_outcome(prediction.reference, Outcome::Draw)
        .await
        .unwrap();

    // 3. Second report for the same prediction is rejected, even with a
    //    different claimed result.
    let err = service
        .report_outcome(prediction.reference, Outcome::Home)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        OutcomeError::DuplicateReport {
            reference: prediction.reference
        }
    );
}
