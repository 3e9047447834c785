//! Postgres-backed `ScoreStore`.
//!
//! Row structs mirror the tables one-to-one and convert into domain types;
//! breakdowns live in JSONB so every intermediate value survives for audit.

use std::collections::HashSet;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use smokescreen_common::{
    ABreakdown, AffectedPopulation, Article, BBreakdown, ChangeType, Classification, Event,
    MechanismOfHarm, PairSeverity, RunPhase, RunRecord, RunStatus, Scope, ScoreChange, ScoreList,
    SmokescreenPair, WeekId, WeekStatus, WeeklySnapshot,
};

use crate::store::ScoreStore;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url)
            .await
            .context("Failed to connect to Postgres")?;
        Ok(Self::new(pool))
    }

    /// Run the embedded SQL migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run migrations")?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

#[derive(sqlx::FromRow)]
struct ArticleRow {
    id: Uuid,
    url: String,
    normalized_url: String,
    headline: String,
    publisher: String,
    published_at: Option<DateTime<Utc>>,
    source_tag: String,
    event_id: Option<Uuid>,
    ingested_at: DateTime<Utc>,
}

impl From<ArticleRow> for Article {
    fn from(r: ArticleRow) -> Self {
        Self {
            id: r.id,
            url: r.url,
            normalized_url: r.normalized_url,
            headline: r.headline,
            publisher: r.publisher,
            published_at: r.published_at,
            source_tag: r.source_tag,
            event_id: r.event_id,
            ingested_at: r.ingested_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct EventRow {
    id: Uuid,
    week_id: NaiveDate,
    title: String,
    summary: String,
    occurred_at: DateTime<Utc>,
    mechanism: Option<String>,
    scope: Option<String>,
    population: Option<String>,
    actors: Vec<String>,
    institution: Option<String>,
    topic_tags: Vec<String>,
    confidence: f64,
    article_count: i32,
    institutional_lever: bool,
    a_score: Option<f64>,
    a_breakdown: Option<Json<ABreakdown>>,
    b_score: Option<f64>,
    b_breakdown: Option<Json<BBreakdown>>,
    list: Option<String>,
    is_mixed: bool,
    noise_flag: bool,
    noise_codes: Vec<String>,
    score_version: i32,
    scored_at: Option<DateTime<Utc>>,
    score_frozen: bool,
    frozen_at: Option<DateTime<Utc>>,
    frozen_by: Option<String>,
    correction_notice: Option<String>,
    correction_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<EventRow> for Event {
    fn from(r: EventRow) -> Self {
        let classification = r
            .list
            .as_deref()
            .and_then(ScoreList::from_tag)
            .map(|list| Classification {
                list,
                is_mixed: r.is_mixed,
                noise_flag: r.noise_flag,
                noise_codes: r.noise_codes.clone(),
            });

        Self {
            id: r.id,
            week_id: WeekId::from_date(r.week_id),
            title: r.title,
            summary: r.summary,
            occurred_at: r.occurred_at,
            mechanism: r.mechanism.as_deref().and_then(MechanismOfHarm::from_tag),
            scope: r.scope.as_deref().and_then(Scope::from_tag),
            population: r.population.as_deref().and_then(AffectedPopulation::from_tag),
            actors: r.actors,
            institution: r.institution,
            topic_tags: r.topic_tags,
            confidence: r.confidence,
            article_count: r.article_count,
            institutional_lever: r.institutional_lever,
            a_score: r.a_score,
            a_breakdown: r.a_breakdown.map(|j| j.0),
            b_score: r.b_score,
            b_breakdown: r.b_breakdown.map(|j| j.0),
            classification,
            score_version: r.score_version,
            scored_at: r.scored_at,
            score_frozen: r.score_frozen,
            frozen_at: r.frozen_at,
            frozen_by: r.frozen_by,
            correction_notice: r.correction_notice,
            correction_at: r.correction_at,
            created_at: r.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ScoreChangeRow {
    id: Uuid,
    event_id: Uuid,
    week_id: NaiveDate,
    change_type: String,
    old_a: Option<f64>,
    new_a: Option<f64>,
    old_b: Option<f64>,
    new_b: Option<f64>,
    old_list: Option<String>,
    new_list: Option<String>,
    version_before: i32,
    version_after: i32,
    actor: String,
    reason: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<ScoreChangeRow> for ScoreChange {
    type Error = anyhow::Error;

    fn try_from(r: ScoreChangeRow) -> Result<Self> {
        let change_type = ChangeType::from_tag(&r.change_type)
            .with_context(|| format!("unknown change_type '{}'", r.change_type))?;
        Ok(Self {
            id: r.id,
            event_id: r.event_id,
            week_id: WeekId::from_date(r.week_id),
            change_type,
            old_a: r.old_a,
            new_a: r.new_a,
            old_b: r.old_b,
            new_b: r.new_b,
            old_list: r.old_list.as_deref().and_then(ScoreList::from_tag),
            new_list: r.new_list.as_deref().and_then(ScoreList::from_tag),
            version_before: r.version_before,
            version_after: r.version_after,
            actor: r.actor,
            reason: r.reason,
            created_at: r.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PairRow {
    id: Uuid,
    week_id: NaiveDate,
    distraction_event_id: Uuid,
    damage_event_id: Uuid,
    raw_index: f64,
    smokescreen_index: f64,
    displacement_confidence: f64,
    time_delta_hours: f64,
    severity: String,
    created_at: DateTime<Utc>,
}

impl From<PairRow> for SmokescreenPair {
    fn from(r: PairRow) -> Self {
        Self {
            id: r.id,
            week_id: WeekId::from_date(r.week_id),
            distraction_event_id: r.distraction_event_id,
            damage_event_id: r.damage_event_id,
            raw_index: r.raw_index,
            smokescreen_index: r.smokescreen_index,
            displacement_confidence: r.displacement_confidence,
            time_delta_hours: r.time_delta_hours,
            // The label is derived; recompute rather than trust a stale tag.
            severity: PairSeverity::from_tag(&r.severity)
                .unwrap_or_else(|| PairSeverity::for_index(r.smokescreen_index)),
            created_at: r.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SnapshotRow {
    week_id: NaiveDate,
    status: String,
    event_count: i32,
    scored_count: i32,
    list_a_count: i32,
    list_b_count: i32,
    list_c_count: i32,
    mixed_count: i32,
    noise_count: i32,
    frozen_count: i32,
    pair_count: i32,
    avg_a: Option<f64>,
    avg_b: Option<f64>,
    max_smokescreen_index: Option<f64>,
    computed_at: DateTime<Utc>,
}

impl From<SnapshotRow> for WeeklySnapshot {
    fn from(r: SnapshotRow) -> Self {
        Self {
            week_id: WeekId::from_date(r.week_id),
            status: WeekStatus::from_tag(&r.status).unwrap_or(WeekStatus::Live),
            event_count: r.event_count,
            scored_count: r.scored_count,
            list_a_count: r.list_a_count,
            list_b_count: r.list_b_count,
            list_c_count: r.list_c_count,
            mixed_count: r.mixed_count,
            noise_count: r.noise_count,
            frozen_count: r.frozen_count,
            pair_count: r.pair_count,
            avg_a: r.avg_a,
            avg_b: r.avg_b,
            max_smokescreen_index: r.max_smokescreen_index,
            computed_at: r.computed_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct RunRow {
    id: Uuid,
    phase: String,
    status: String,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    stats: serde_json::Value,
    errors: Vec<String>,
    events: serde_json::Value,
}

impl TryFrom<RunRow> for RunRecord {
    type Error = anyhow::Error;

    fn try_from(r: RunRow) -> Result<Self> {
        Ok(Self {
            id: r.id,
            phase: RunPhase::from_tag(&r.phase)
                .with_context(|| format!("unknown run phase '{}'", r.phase))?,
            status: RunStatus::from_tag(&r.status)
                .with_context(|| format!("unknown run status '{}'", r.status))?,
            started_at: r.started_at,
            finished_at: r.finished_at,
            stats: r.stats,
            errors: r.errors,
            events: r.events,
        })
    }
}

const EVENT_COLUMNS: &str = r#"
    id, week_id, title, summary, occurred_at, mechanism, scope, population, actors,
    institution, topic_tags, confidence, article_count, institutional_lever,
    a_score, a_breakdown, b_score, b_breakdown, list, is_mixed, noise_flag, noise_codes,
    score_version, scored_at, score_frozen, frozen_at, frozen_by,
    correction_notice, correction_at, created_at
"#;

async fn update_event(tx: &mut Transaction<'_, Postgres>, e: &Event) -> Result<()> {
    let classification = e.classification.as_ref();
    let updated = sqlx::query(
        r#"
        UPDATE events SET
            title = $2, summary = $3, occurred_at = $4,
            mechanism = $5, scope = $6, population = $7,
            actors = $8, institution = $9, topic_tags = $10,
            confidence = $11, article_count = $12, institutional_lever = $13,
            a_score = $14, a_breakdown = $15, b_score = $16, b_breakdown = $17,
            list = $18, is_mixed = $19, noise_flag = $20, noise_codes = $21,
            score_version = $22, scored_at = $23,
            score_frozen = $24, frozen_at = $25, frozen_by = $26,
            correction_notice = $27, correction_at = $28
        WHERE id = $1
        "#,
    )
    .bind(e.id)
    .bind(&e.title)
    .bind(&e.summary)
    .bind(e.occurred_at)
    .bind(e.mechanism.map(|m| m.as_str()))
    .bind(e.scope.map(|s| s.as_str()))
    .bind(e.population.map(|p| p.as_str()))
    .bind(&e.actors)
    .bind(&e.institution)
    .bind(&e.topic_tags)
    .bind(e.confidence)
    .bind(e.article_count)
    .bind(e.institutional_lever)
    .bind(e.a_score)
    .bind(e.a_breakdown.as_ref().map(Json))
    .bind(e.b_score)
    .bind(e.b_breakdown.as_ref().map(Json))
    .bind(classification.map(|c| c.list.as_str()))
    .bind(classification.is_some_and(|c| c.is_mixed))
    .bind(classification.is_some_and(|c| c.noise_flag))
    .bind(classification.map(|c| c.noise_codes.clone()).unwrap_or_default())
    .bind(e.score_version)
    .bind(e.scored_at)
    .bind(e.score_frozen)
    .bind(e.frozen_at)
    .bind(&e.frozen_by)
    .bind(&e.correction_notice)
    .bind(e.correction_at)
    .execute(&mut **tx)
    .await?;

    if updated.rows_affected() == 0 {
        anyhow::bail!("event {} not found", e.id);
    }
    Ok(())
}

async fn insert_change(tx: &mut Transaction<'_, Postgres>, c: &ScoreChange) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO score_changes
            (id, event_id, week_id, change_type, old_a, new_a, old_b, new_b,
             old_list, new_list, version_before, version_after, actor, reason, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
        "#,
    )
    .bind(c.id)
    .bind(c.event_id)
    .bind(c.week_id.sunday())
    .bind(c.change_type.as_str())
    .bind(c.old_a)
    .bind(c.new_a)
    .bind(c.old_b)
    .bind(c.new_b)
    .bind(c.old_list.map(|l| l.as_str()))
    .bind(c.new_list.map(|l| l.as_str()))
    .bind(c.version_before)
    .bind(c.version_after)
    .bind(&c.actor)
    .bind(&c.reason)
    .bind(c.created_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[async_trait]
impl ScoreStore for PgStore {
    async fn known_urls(&self, normalized_urls: &[String]) -> Result<HashSet<String>> {
        if normalized_urls.is_empty() {
            return Ok(HashSet::new());
        }
        let rows = sqlx::query_scalar::<_, String>(
            "SELECT normalized_url FROM articles WHERE normalized_url = ANY($1)",
        )
        .bind(normalized_urls)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().collect())
    }

    async fn insert_articles(&self, articles: &[Article]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        let mut written = 0usize;
        for a in articles {
            let result = sqlx::query(
                r#"
                INSERT INTO articles
                    (id, url, normalized_url, headline, publisher, published_at,
                     source_tag, event_id, ingested_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                ON CONFLICT (normalized_url) DO NOTHING
                "#,
            )
            .bind(a.id)
            .bind(&a.url)
            .bind(&a.normalized_url)
            .bind(&a.headline)
            .bind(&a.publisher)
            .bind(a.published_at)
            .bind(&a.source_tag)
            .bind(a.event_id)
            .bind(a.ingested_at)
            .execute(&mut *tx)
            .await?;
            written += result.rows_affected() as usize;
        }
        tx.commit().await?;
        Ok(written)
    }

    async fn unassigned_articles(&self, limit: usize) -> Result<Vec<Article>> {
        let rows = sqlx::query_as::<_, ArticleRow>(
            r#"
            SELECT * FROM articles
            WHERE event_id IS NULL
            ORDER BY cluster_attempts ASC, ingested_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn record_cluster_failure(&self, article_ids: &[Uuid]) -> Result<()> {
        sqlx::query("UPDATE articles SET cluster_attempts = cluster_attempts + 1 WHERE id = ANY($1)")
            .bind(article_ids)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn assign_articles(&self, event_id: Uuid, article_ids: &[Uuid]) -> Result<()> {
        sqlx::query("UPDATE articles SET event_id = $1 WHERE id = ANY($2)")
            .bind(event_id)
            .bind(article_ids)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn articles_for_event(&self, event_id: Uuid) -> Result<Vec<Article>> {
        let rows = sqlx::query_as::<_, ArticleRow>(
            "SELECT * FROM articles WHERE event_id = $1 ORDER BY published_at ASC NULLS LAST",
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn insert_event(&self, e: &Event) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO events
                (id, week_id, title, summary, occurred_at, mechanism, scope, population,
                 actors, institution, topic_tags, confidence, article_count,
                 institutional_lever, score_version, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(e.id)
        .bind(e.week_id.sunday())
        .bind(&e.title)
        .bind(&e.summary)
        .bind(e.occurred_at)
        .bind(e.mechanism.map(|m| m.as_str()))
        .bind(e.scope.map(|s| s.as_str()))
        .bind(e.population.map(|p| p.as_str()))
        .bind(&e.actors)
        .bind(&e.institution)
        .bind(&e.topic_tags)
        .bind(e.confidence)
        .bind(e.article_count)
        .bind(e.institutional_lever)
        .bind(e.score_version)
        .bind(e.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_event(&self, id: Uuid) -> Result<Option<Event>> {
        let row = sqlx::query_as::<_, EventRow>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn events_for_week(&self, week: WeekId) -> Result<Vec<Event>> {
        let rows = sqlx::query_as::<_, EventRow>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE week_id = $1 ORDER BY created_at ASC"
        ))
        .bind(week.sunday())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn unscored_events(&self, limit: usize) -> Result<Vec<Event>> {
        let rows = sqlx::query_as::<_, EventRow>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE score_version = 0 \
             ORDER BY scoring_attempts ASC, created_at ASC LIMIT $1"
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn count_unscored_events(&self) -> Result<usize> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM events WHERE score_version = 0",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(count as usize)
    }

    async fn record_scoring_failure(&self, event_id: Uuid) -> Result<()> {
        let result =
            sqlx::query("UPDATE events SET scoring_attempts = scoring_attempts + 1 WHERE id = $1")
                .bind(event_id)
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            anyhow::bail!("event {event_id} not found");
        }
        Ok(())
    }

    async fn events_due_for_freeze(&self, cutoff: DateTime<Utc>) -> Result<Vec<Event>> {
        let rows = sqlx::query_as::<_, EventRow>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events \
             WHERE score_version > 0 AND score_frozen = FALSE AND created_at < $1 \
             ORDER BY created_at ASC"
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn apply_change(&self, event: &Event, change: &ScoreChange) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        update_event(&mut tx, event).await?;
        insert_change(&mut tx, change).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn audit_trail(&self, event_id: Uuid) -> Result<Vec<ScoreChange>> {
        let rows = sqlx::query_as::<_, ScoreChangeRow>(
            "SELECT * FROM score_changes WHERE event_id = $1 ORDER BY created_at DESC, version_after DESC",
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn replace_pairs(&self, week: WeekId, pairs: &[SmokescreenPair]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM smokescreen_pairs WHERE week_id = $1")
            .bind(week.sunday())
            .execute(&mut *tx)
            .await?;

        for p in pairs {
            sqlx::query(
                r#"
                INSERT INTO smokescreen_pairs
                    (id, week_id, distraction_event_id, damage_event_id, raw_index,
                     smokescreen_index, displacement_confidence, time_delta_hours,
                     severity, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(p.id)
            .bind(week.sunday())
            .bind(p.distraction_event_id)
            .bind(p.damage_event_id)
            .bind(p.raw_index)
            .bind(p.smokescreen_index)
            .bind(p.displacement_confidence)
            .bind(p.time_delta_hours)
            .bind(p.severity.as_str())
            .bind(p.created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn pairs_for_week(&self, week: WeekId) -> Result<Vec<SmokescreenPair>> {
        let rows = sqlx::query_as::<_, PairRow>(
            "SELECT * FROM smokescreen_pairs WHERE week_id = $1 ORDER BY smokescreen_index DESC",
        )
        .bind(week.sunday())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn upsert_snapshot(&self, s: &WeeklySnapshot) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO weekly_snapshots
                (week_id, status, event_count, scored_count, list_a_count, list_b_count,
                 list_c_count, mixed_count, noise_count, frozen_count, pair_count,
                 avg_a, avg_b, max_smokescreen_index, computed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ON CONFLICT (week_id) DO UPDATE SET
                status = EXCLUDED.status,
                event_count = EXCLUDED.event_count,
                scored_count = EXCLUDED.scored_count,
                list_a_count = EXCLUDED.list_a_count,
                list_b_count = EXCLUDED.list_b_count,
                list_c_count = EXCLUDED.list_c_count,
                mixed_count = EXCLUDED.mixed_count,
                noise_count = EXCLUDED.noise_count,
                frozen_count = EXCLUDED.frozen_count,
                pair_count = EXCLUDED.pair_count,
                avg_a = EXCLUDED.avg_a,
                avg_b = EXCLUDED.avg_b,
                max_smokescreen_index = EXCLUDED.max_smokescreen_index,
                computed_at = EXCLUDED.computed_at
            "#,
        )
        .bind(s.week_id.sunday())
        .bind(s.status.as_str())
        .bind(s.event_count)
        .bind(s.scored_count)
        .bind(s.list_a_count)
        .bind(s.list_b_count)
        .bind(s.list_c_count)
        .bind(s.mixed_count)
        .bind(s.noise_count)
        .bind(s.frozen_count)
        .bind(s.pair_count)
        .bind(s.avg_a)
        .bind(s.avg_b)
        .bind(s.max_smokescreen_index)
        .bind(s.computed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_snapshot(&self, week: WeekId) -> Result<Option<WeeklySnapshot>> {
        let row = sqlx::query_as::<_, SnapshotRow>(
            "SELECT * FROM weekly_snapshots WHERE week_id = $1",
        )
        .bind(week.sunday())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn unfrozen_weeks_before(&self, week: WeekId) -> Result<Vec<WeekId>> {
        let rows = sqlx::query_scalar::<_, NaiveDate>(
            r#"
            SELECT DISTINCT e.week_id
            FROM events e
            LEFT JOIN weekly_snapshots s ON s.week_id = e.week_id
            WHERE e.week_id < $1
              AND (s.status IS NULL OR s.status <> 'frozen')
            ORDER BY e.week_id ASC
            "#,
        )
        .bind(week.sunday())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(WeekId::from_date).collect())
    }

    async fn weeks_changed_since_snapshot(&self) -> Result<Vec<WeekId>> {
        let rows = sqlx::query_scalar::<_, NaiveDate>(
            r#"
            SELECT DISTINCT c.week_id
            FROM score_changes c
            LEFT JOIN weekly_snapshots s ON s.week_id = c.week_id
            WHERE s.week_id IS NULL OR c.created_at > s.computed_at
            ORDER BY c.week_id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(WeekId::from_date).collect())
    }

    async fn start_run(&self, run: &RunRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO pipeline_runs (id, phase, status, started_at, stats, errors, events)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(run.id)
        .bind(run.phase.as_str())
        .bind(run.status.as_str())
        .bind(run.started_at)
        .bind(&run.stats)
        .bind(&run.errors)
        .bind(&run.events)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn finish_run(&self, run: &RunRecord) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE pipeline_runs
            SET status = $2, finished_at = $3, stats = $4, errors = $5, events = $6
            WHERE id = $1
            "#,
        )
        .bind(run.id)
        .bind(run.status.as_str())
        .bind(run.finished_at)
        .bind(&run.stats)
        .bind(&run.errors)
        .bind(&run.events)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn sweep_stale_runs(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE pipeline_runs
            SET status = 'failed',
                finished_at = now(),
                errors = array_append(errors, 'swept: run exceeded its timeout')
            WHERE status = 'running' AND started_at < $1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn recent_runs(&self, limit: usize) -> Result<Vec<RunRecord>> {
        let rows = sqlx::query_as::<_, RunRow>(
            "SELECT * FROM pipeline_runs ORDER BY started_at DESC LIMIT $1",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}
