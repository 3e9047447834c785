use chrono::{DateTime, Utc};

use smokescreen_common::{Event, ScoreList, SmokescreenPair, WeekId, WeekStatus, WeeklySnapshot};

use crate::scoring::round1;

/// Recompute a week's aggregates from its events and stored pairs.
///
/// Events or pairs from other weeks are ignored, so callers can pass a
/// wider slice without filtering first.
pub fn build_snapshot(
    week: WeekId,
    status: WeekStatus,
    events: &[Event],
    pairs: &[SmokescreenPair],
    now: DateTime<Utc>,
) -> WeeklySnapshot {
    let events: Vec<&Event> = events.iter().filter(|e| e.week_id == week).collect();
    let pairs: Vec<&SmokescreenPair> = pairs.iter().filter(|p| p.week_id == week).collect();

    let scored: Vec<&&Event> = events.iter().filter(|e| e.is_scored()).collect();
    let count_list =
        |list: ScoreList| scored.iter().filter(|e| e.list() == Some(list)).count() as i32;

    let a_scores: Vec<f64> = scored.iter().filter_map(|e| e.a_score).collect();
    let b_scores: Vec<f64> = scored.iter().filter_map(|e| e.b_score).collect();

    WeeklySnapshot {
        week_id: week,
        status,
        event_count: events.len() as i32,
        scored_count: scored.len() as i32,
        list_a_count: count_list(ScoreList::A),
        list_b_count: count_list(ScoreList::B),
        list_c_count: count_list(ScoreList::C),
        mixed_count: scored
            .iter()
            .filter(|e| e.classification.as_ref().is_some_and(|c| c.is_mixed))
            .count() as i32,
        noise_count: scored
            .iter()
            .filter(|e| e.classification.as_ref().is_some_and(|c| c.noise_flag))
            .count() as i32,
        frozen_count: events.iter().filter(|e| e.score_frozen).count() as i32,
        pair_count: pairs.len() as i32,
        avg_a: mean(&a_scores),
        avg_b: mean(&b_scores),
        max_smokescreen_index: pairs
            .iter()
            .map(|p| p.smokescreen_index)
            .max_by(f64::total_cmp),
        computed_at: now,
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(round1(values.iter().sum::<f64>() / values.len() as f64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use smokescreen_common::{Classification, PairSeverity};
    use uuid::Uuid;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 14, 9, 0, 0).unwrap()
    }

    fn event(list: Option<ScoreList>, a: f64, b: f64, mixed: bool, frozen: bool) -> Event {
        Event {
            id: Uuid::new_v4(),
            week_id: WeekId::containing(now()),
            title: "Agency budget moved".to_string(),
            summary: String::new(),
            occurred_at: now(),
            mechanism: None,
            scope: None,
            population: None,
            actors: Vec::new(),
            institution: None,
            topic_tags: Vec::new(),
            confidence: 0.8,
            article_count: 2,
            institutional_lever: false,
            a_score: list.map(|_| a),
            a_breakdown: None,
            b_score: list.map(|_| b),
            b_breakdown: None,
            classification: list.map(|list| Classification {
                list,
                is_mixed: mixed,
                noise_flag: false,
                noise_codes: Vec::new(),
            }),
            score_version: if list.is_some() { 1 } else { 0 },
            scored_at: None,
            score_frozen: frozen,
            frozen_at: None,
            frozen_by: None,
            correction_notice: None,
            correction_at: None,
            created_at: now(),
        }
    }

    #[test]
    fn counts_lists_and_averages_scored_events_only() {
        let events = vec![
            event(Some(ScoreList::A), 60.0, 20.0, false, true),
            event(Some(ScoreList::A), 40.0, 35.0, true, false),
            event(Some(ScoreList::B), 10.0, 70.0, false, false),
            event(None, 0.0, 0.0, false, false),
        ];
        let week = events[0].week_id;
        let pair = SmokescreenPair {
            id: Uuid::new_v4(),
            week_id: week,
            distraction_event_id: events[2].id,
            damage_event_id: events[0].id,
            raw_index: 42.0,
            smokescreen_index: 35.7,
            displacement_confidence: 0.5,
            time_delta_hours: 0.0,
            severity: PairSeverity::Significant,
            created_at: now(),
        };

        let snap = build_snapshot(week, WeekStatus::Live, &events, &[pair], now());

        assert_eq!(snap.event_count, 4);
        assert_eq!(snap.scored_count, 3);
        assert_eq!(snap.list_a_count, 2);
        assert_eq!(snap.list_b_count, 1);
        assert_eq!(snap.list_c_count, 0);
        assert_eq!(snap.mixed_count, 1);
        assert_eq!(snap.frozen_count, 1);
        assert_eq!(snap.pair_count, 1);
        assert_eq!(snap.avg_a, Some(36.7));
        assert_eq!(snap.avg_b, Some(41.7));
        assert_eq!(snap.max_smokescreen_index, Some(35.7));
    }

    #[test]
    fn empty_week_has_no_averages() {
        let week = WeekId::containing(now());
        let snap = build_snapshot(week, WeekStatus::Frozen, &[], &[], now());
        assert_eq!(snap.event_count, 0);
        assert_eq!(snap.avg_a, None);
        assert_eq!(snap.max_smokescreen_index, None);
        assert_eq!(snap.status, WeekStatus::Frozen);
    }
}
