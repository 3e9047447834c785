//! Audit ledger and freeze controller behaviour against the in-memory store.

use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use smokescreen_common::{
    ADrivers, ChangeType, Event, HypeDrivers, MechanismOfHarm, ScoreInputs, ScoreList,
    ScoredEvent, SmokescreenError, WeekId, WeekStatus,
};
use smokescreen_scoring::evaluate;
use smokescreen_store::{AuditLedger, InMemoryStore, ScoreStore};

fn new_event(title: &str) -> Event {
    let now = Utc::now();
    Event {
        id: Uuid::new_v4(),
        week_id: WeekId::containing(now),
        title: title.to_string(),
        summary: String::new(),
        occurred_at: now,
        mechanism: Some(MechanismOfHarm::PolicyChange),
        scope: None,
        population: None,
        actors: vec!["Department of Records".to_string()],
        institution: None,
        topic_tags: Vec::new(),
        confidence: 0.9,
        article_count: 2,
        institutional_lever: false,
        a_score: None,
        a_breakdown: None,
        b_score: None,
        b_breakdown: None,
        classification: None,
        score_version: 0,
        scored_at: None,
        score_frozen: false,
        frozen_at: None,
        frozen_by: None,
        correction_notice: None,
        correction_at: None,
        created_at: now,
    }
}

fn damage_scores(level: f64) -> ScoredEvent {
    let inputs = ScoreInputs {
        a_drivers: ADrivers::uniform(level),
        hype: HypeDrivers::uniform(1.0),
        ..Default::default()
    };
    evaluate(&inputs, Some(MechanismOfHarm::PolicyChange), None, None)
}

async fn setup(title: &str) -> (Arc<InMemoryStore>, AuditLedger, Event) {
    let store = Arc::new(InMemoryStore::new());
    let ledger = AuditLedger::new(store.clone());
    let event = new_event(title);
    store.insert_event(&event).await.unwrap();
    (store, ledger, event)
}

#[tokio::test]
async fn initial_scoring_sets_version_one_and_audits() {
    let (_store, ledger, event) = setup("Inspector general removed").await;

    let scored = ledger.record_initial(&event, &damage_scores(4.0)).await.unwrap();

    assert_eq!(scored.score_version, 1);
    assert_eq!(scored.a_score, Some(80.0));
    assert_eq!(scored.list(), Some(ScoreList::A));

    let trail = ledger.audit_trail(event.id).await.unwrap();
    assert_eq!(trail.len(), 1);
    assert_eq!(trail[0].change_type, ChangeType::Initial);
    assert_eq!(trail[0].version_before, 0);
    assert_eq!(trail[0].version_after, 1);
    assert_eq!(trail[0].old_a, None);
    assert_eq!(trail[0].new_a, Some(80.0));
}

#[tokio::test]
async fn initial_scoring_twice_is_rejected() {
    let (_store, ledger, event) = setup("Records office closed").await;
    let scored = ledger.record_initial(&event, &damage_scores(4.0)).await.unwrap();

    let err = ledger
        .record_initial(&scored, &damage_scores(3.0))
        .await
        .unwrap_err();
    assert!(matches!(err, SmokescreenError::Validation(_)));
}

#[tokio::test]
async fn frozen_event_rejects_rescore_until_unfrozen() {
    let (_store, ledger, event) = setup("Emergency order extended").await;
    ledger.record_initial(&event, &damage_scores(4.0)).await.unwrap();
    ledger.freeze(event.id, "editor", Some("weekly review")).await.unwrap();

    let err = ledger
        .rescore(event.id, &damage_scores(2.0), "editor", "new reporting")
        .await
        .unwrap_err();
    assert!(matches!(err, SmokescreenError::FrozenStateViolation { event_id } if event_id == event.id));

    let err = ledger
        .override_scores(event.id, 10.0, 10.0, None, "editor", "typo")
        .await
        .unwrap_err();
    assert!(matches!(err, SmokescreenError::FrozenStateViolation { .. }));

    ledger.unfreeze(event.id, "editor", "new reporting").await.unwrap();
    let rescored = ledger
        .rescore(event.id, &damage_scores(2.0), "editor", "new reporting")
        .await
        .unwrap();
    assert_eq!(rescored.score_version, 2);
    assert_eq!(rescored.a_score, Some(40.0));

    let kinds: Vec<ChangeType> = ledger
        .audit_trail(event.id)
        .await
        .unwrap()
        .iter()
        .map(|c| c.change_type)
        .collect();
    assert_eq!(
        kinds,
        vec![
            ChangeType::Rescore,
            ChangeType::Unfreeze,
            ChangeType::Freeze,
            ChangeType::Initial
        ]
    );
}

#[tokio::test]
async fn freezing_twice_writes_one_audit_record() {
    let (_store, ledger, event) = setup("Budget transfer approved").await;
    ledger.record_initial(&event, &damage_scores(3.0)).await.unwrap();

    let first = ledger.freeze(event.id, "editor", None).await.unwrap();
    let second = ledger.freeze(event.id, "someone-else", None).await.unwrap();

    assert!(second.score_frozen);
    assert_eq!(second.frozen_by.as_deref(), Some("editor"));
    assert_eq!(first.score_version, second.score_version);

    let freezes = ledger
        .audit_trail(event.id)
        .await
        .unwrap()
        .into_iter()
        .filter(|c| c.change_type == ChangeType::Freeze)
        .count();
    assert_eq!(freezes, 1);
}

#[tokio::test]
async fn corrections_append_and_leave_frozen_scores_alone() {
    let (_store, ledger, event) = setup("Agency rule rescinded").await;
    let scored = ledger.record_initial(&event, &damage_scores(4.0)).await.unwrap();
    ledger.freeze(event.id, "editor", None).await.unwrap();

    ledger
        .append_correction(event.id, "Date of the order was misreported.", "editor")
        .await
        .unwrap();
    let corrected = ledger
        .append_correction(event.id, "Agency name corrected.", "editor")
        .await
        .unwrap();

    assert!(corrected.score_frozen);
    assert_eq!(corrected.a_score, scored.a_score);
    assert_eq!(corrected.score_version, scored.score_version);
    assert_eq!(
        corrected.correction_notice.as_deref(),
        Some("Date of the order was misreported.\nAgency name corrected.")
    );
    assert!(corrected.correction_at.is_some());
}

#[tokio::test]
async fn override_reclassifies_unless_list_forced() {
    let (_store, ledger, event) = setup("Surveillance program expanded").await;
    ledger.record_initial(&event, &damage_scores(4.0)).await.unwrap();

    let overridden = ledger
        .override_scores(event.id, 12.0, 60.0, None, "editor", "hype misjudged")
        .await
        .unwrap();
    assert_eq!(overridden.list(), Some(ScoreList::B));
    assert_eq!(overridden.score_version, 2);

    let forced = ledger
        .override_scores(event.id, 12.0, 60.0, Some(ScoreList::C), "editor", "editorial call")
        .await
        .unwrap();
    assert_eq!(forced.list(), Some(ScoreList::C));
    assert_eq!(forced.score_version, 3);

    let err = ledger
        .override_scores(event.id, 120.0, 0.0, None, "editor", "bad")
        .await
        .unwrap_err();
    assert!(matches!(err, SmokescreenError::Validation(_)));
}

#[tokio::test]
async fn rescore_requires_a_reason() {
    let (_store, ledger, event) = setup("Watchdog defunded").await;
    ledger.record_initial(&event, &damage_scores(4.0)).await.unwrap();

    let err = ledger
        .rescore(event.id, &damage_scores(3.0), "editor", "   ")
        .await
        .unwrap_err();
    assert!(matches!(err, SmokescreenError::Validation(_)));
}

#[tokio::test]
async fn failed_write_leaves_no_audit_record() {
    let store = Arc::new(InMemoryStore::new().failing_changes());
    let ledger = AuditLedger::new(store.clone());
    let event = new_event("Ethics office merged");
    store.insert_event(&event).await.unwrap();

    assert!(ledger.record_initial(&event, &damage_scores(4.0)).await.is_err());
    assert!(store.all_changes().is_empty());
    let stored = store.get_event(event.id).await.unwrap().unwrap();
    assert!(!stored.is_scored());
}

#[tokio::test]
async fn freeze_week_freezes_scored_events_and_marks_snapshot() {
    let (store, ledger, scored_event) = setup("Court order ignored").await;
    ledger
        .record_initial(&scored_event, &damage_scores(4.0))
        .await
        .unwrap();
    let pending = new_event("Hearing postponed");
    store.insert_event(&pending).await.unwrap();

    let frozen = ledger
        .freeze_week(scored_event.week_id, "editor")
        .await
        .unwrap();
    assert_eq!(frozen, 1);

    let pending = store.get_event(pending.id).await.unwrap().unwrap();
    assert!(!pending.score_frozen);

    let snapshot = store
        .get_snapshot(scored_event.week_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(snapshot.status, WeekStatus::Frozen);
    assert_eq!(snapshot.frozen_count, 1);
    assert_eq!(snapshot.event_count, 2);
}

#[tokio::test]
async fn freeze_aged_only_touches_old_scored_events() {
    let (_store, ledger, event) = setup("Registry sealed").await;
    ledger.record_initial(&event, &damage_scores(4.0)).await.unwrap();

    let frozen = ledger
        .freeze_aged(event.created_at - Duration::hours(1))
        .await
        .unwrap();
    assert_eq!(frozen, 0);

    let frozen = ledger
        .freeze_aged(event.created_at + Duration::seconds(1))
        .await
        .unwrap();
    assert_eq!(frozen, 1);
}
