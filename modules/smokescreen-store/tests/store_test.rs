//! Integration tests for PgStore.
//! Requires a Postgres instance. Set DATABASE_TEST_URL or these tests are skipped.

use std::sync::Arc;

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use smokescreen_common::{
    Article, Event, PairSeverity, RunPhase, RunRecord, RunStatus, SmokescreenPair, SourceArticle,
    WeekId, WeekStatus,
};
use smokescreen_scoring::build_snapshot;
use smokescreen_store::{AuditLedger, PgStore, ScoreStore};

/// Get a migrated, empty test store, or skip if no test DB is available.
async fn test_store() -> Option<PgStore> {
    let url = std::env::var("DATABASE_TEST_URL").ok()?;
    let pool = PgPool::connect(&url).await.ok()?;
    let store = PgStore::new(pool);
    store.migrate().await.ok()?;

    // Clean slate for each test
    sqlx::query(
        "TRUNCATE smokescreen_pairs, score_changes, articles, events, weekly_snapshots, pipeline_runs",
    )
    .execute(store.pool())
    .await
    .ok()?;

    Some(store)
}

fn article(url: &str, headline: &str) -> Article {
    Article::from_source(
        SourceArticle {
            url: url.to_string(),
            headline: headline.to_string(),
            publisher: "Wire".to_string(),
            published_at: Some(Utc::now()),
            source_tag: "rss".to_string(),
        },
        url.trim_start_matches("https://").to_string(),
    )
}

fn event(title: &str) -> Event {
    let now = Utc::now();
    Event {
        id: Uuid::new_v4(),
        week_id: WeekId::containing(now),
        title: title.to_string(),
        summary: "summary".to_string(),
        occurred_at: now,
        mechanism: None,
        scope: None,
        population: None,
        actors: vec!["Agency".to_string()],
        institution: Some("Agency".to_string()),
        topic_tags: vec!["oversight".to_string()],
        confidence: 0.7,
        article_count: 1,
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

#[tokio::test]
async fn duplicate_normalized_urls_are_skipped() {
    let Some(store) = test_store().await else {
        return;
    };

    let first = article("https://example.com/a", "Oversight board dissolved");
    let dup = article("https://example.com/a", "Oversight board dissolved again");
    let written = store.insert_articles(&[first.clone(), dup]).await.unwrap();
    assert_eq!(written, 1);

    let known = store
        .known_urls(&["example.com/a".to_string(), "example.com/b".to_string()])
        .await
        .unwrap();
    assert!(known.contains("example.com/a"));
    assert!(!known.contains("example.com/b"));

    let unassigned = store.unassigned_articles(10).await.unwrap();
    assert_eq!(unassigned.len(), 1);
    assert_eq!(unassigned[0].id, first.id);
}

#[tokio::test]
async fn event_round_trips_and_articles_attach() {
    let Some(store) = test_store().await else {
        return;
    };

    let e = event("Inspector general fired");
    store.insert_event(&e).await.unwrap();
    let a = article("https://example.com/ig", "Inspector general fired late Friday");
    store.insert_articles(&[a.clone()]).await.unwrap();
    store.assign_articles(e.id, &[a.id]).await.unwrap();

    let loaded = store.get_event(e.id).await.unwrap().unwrap();
    assert_eq!(loaded.title, e.title);
    assert_eq!(loaded.week_id, e.week_id);
    assert_eq!(loaded.topic_tags, e.topic_tags);
    assert!(!loaded.is_scored());

    assert_eq!(store.articles_for_event(e.id).await.unwrap().len(), 1);
    assert!(store.unassigned_articles(10).await.unwrap().is_empty());
    assert_eq!(store.unscored_events(10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn failed_attempts_move_work_behind_untried_work() {
    let Some(store) = test_store().await else {
        return;
    };

    let stuck = event("Oracle keeps choking on this one");
    let fresh = event("Regulator waives safety rule");
    store.insert_event(&stuck).await.unwrap();
    store.insert_event(&fresh).await.unwrap();
    store.record_scoring_failure(stuck.id).await.unwrap();

    let pending = store.unscored_events(1).await.unwrap();
    assert_eq!(pending[0].id, fresh.id);
    assert_eq!(store.count_unscored_events().await.unwrap(), 2);
    assert!(store.record_scoring_failure(Uuid::new_v4()).await.is_err());

    let old = article("https://example.com/old", "Garbled wire copy nobody can cluster");
    let new = article("https://example.com/new", "Port authority board replaced overnight");
    store.insert_articles(&[old.clone(), new.clone()]).await.unwrap();
    store.record_cluster_failure(&[old.id]).await.unwrap();

    let unassigned = store.unassigned_articles(1).await.unwrap();
    assert_eq!(unassigned[0].id, new.id);
}

#[tokio::test]
async fn audit_records_newer_than_the_snapshot_mark_the_week_changed() {
    let Some(store) = test_store().await else {
        return;
    };
    let store = Arc::new(store);
    let ledger = AuditLedger::new(store.clone());

    let e = event("Ethics office closed");
    store.insert_event(&e).await.unwrap();
    assert!(store.weeks_changed_since_snapshot().await.unwrap().is_empty());

    ledger
        .append_correction(e.id, "Date corrected.", "editor")
        .await
        .unwrap();
    assert_eq!(
        store.weeks_changed_since_snapshot().await.unwrap(),
        vec![e.week_id]
    );

    let snapshot = build_snapshot(e.week_id, WeekStatus::Frozen, &[e.clone()], &[], Utc::now());
    store.upsert_snapshot(&snapshot).await.unwrap();
    assert!(store.weeks_changed_since_snapshot().await.unwrap().is_empty());

    ledger
        .append_correction(e.id, "Agency name corrected.", "editor")
        .await
        .unwrap();
    assert_eq!(
        store.weeks_changed_since_snapshot().await.unwrap(),
        vec![e.week_id]
    );
}

#[tokio::test]
async fn correction_is_persisted_with_its_audit_record() {
    let Some(store) = test_store().await else {
        return;
    };
    let store = Arc::new(store);
    let ledger = AuditLedger::new(store.clone());

    let e = event("Records law suspended");
    store.insert_event(&e).await.unwrap();
    ledger
        .append_correction(e.id, "Headline clarified.", "editor")
        .await
        .unwrap();

    let loaded = store.get_event(e.id).await.unwrap().unwrap();
    assert_eq!(loaded.correction_notice.as_deref(), Some("Headline clarified."));

    let trail = store.audit_trail(e.id).await.unwrap();
    assert_eq!(trail.len(), 1);
    assert_eq!(trail[0].actor, "editor");
}

#[tokio::test]
async fn replace_pairs_swaps_the_whole_week() {
    let Some(store) = test_store().await else {
        return;
    };

    let distraction = event("Celebrity feud");
    let damage = event("Election office purged");
    store.insert_event(&distraction).await.unwrap();
    store.insert_event(&damage).await.unwrap();
    let week = damage.week_id;

    let pair = |index: f64| SmokescreenPair {
        id: Uuid::new_v4(),
        week_id: week,
        distraction_event_id: distraction.id,
        damage_event_id: damage.id,
        raw_index: index,
        smokescreen_index: index,
        displacement_confidence: 0.5,
        time_delta_hours: 2.0,
        severity: PairSeverity::for_index(index),
        created_at: Utc::now(),
    };

    store.replace_pairs(week, &[pair(30.0), pair(55.0)]).await.unwrap();
    store.replace_pairs(week, &[pair(20.0)]).await.unwrap();

    let stored = store.pairs_for_week(week).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].smokescreen_index, 20.0);
    assert_eq!(stored[0].severity, PairSeverity::Low);
}

#[tokio::test]
async fn stale_runs_are_swept_to_failed() {
    let Some(store) = test_store().await else {
        return;
    };

    let run = RunRecord::start(RunPhase::Process);
    store.start_run(&run).await.unwrap();

    let swept = store
        .sweep_stale_runs(Utc::now() + chrono::Duration::minutes(1))
        .await
        .unwrap();
    assert_eq!(swept, 1);

    let runs = store.recent_runs(5).await.unwrap();
    assert_eq!(runs[0].status, RunStatus::Failed);
    assert!(!runs[0].errors.is_empty());
}
