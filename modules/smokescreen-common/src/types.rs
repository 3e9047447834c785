use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::week::WeekId;

// --- Editorial Lists ---

/// The three editorial lists an event can land on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScoreList {
    /// Governance damage dominates.
    A,
    /// Manufactured attention dominates.
    B,
    /// Low signal on both axes.
    C,
}

impl ScoreList {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScoreList::A => "A",
            ScoreList::B => "B",
            ScoreList::C => "C",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim() {
            "A" | "a" => Some(ScoreList::A),
            "B" | "b" => Some(ScoreList::B),
            "C" | "c" => Some(ScoreList::C),
            _ => None,
        }
    }
}

impl std::fmt::Display for ScoreList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// --- Event Tags ---

/// Normalize a free-form oracle tag: lowercase, hyphens/spaces to underscores.
fn tag_key(tag: &str) -> String {
    tag.trim()
        .to_lowercase()
        .replace(['-', ' '], "_")
}

/// How an event inflicts governance damage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MechanismOfHarm {
    PolicyChange,
    EnforcementAction,
    PersonnelCapture,
    ResourceReallocation,
    ElectionInterference,
    InformationControl,
    EmergencyPower,
    NormErosionOnly,
}

impl MechanismOfHarm {
    pub const ALL: [MechanismOfHarm; 8] = [
        MechanismOfHarm::PolicyChange,
        MechanismOfHarm::EnforcementAction,
        MechanismOfHarm::PersonnelCapture,
        MechanismOfHarm::ResourceReallocation,
        MechanismOfHarm::ElectionInterference,
        MechanismOfHarm::InformationControl,
        MechanismOfHarm::EmergencyPower,
        MechanismOfHarm::NormErosionOnly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MechanismOfHarm::PolicyChange => "policy_change",
            MechanismOfHarm::EnforcementAction => "enforcement_action",
            MechanismOfHarm::PersonnelCapture => "personnel_capture",
            MechanismOfHarm::ResourceReallocation => "resource_reallocation",
            MechanismOfHarm::ElectionInterference => "election_interference",
            MechanismOfHarm::InformationControl => "information_control",
            MechanismOfHarm::EmergencyPower => "emergency_power",
            MechanismOfHarm::NormErosionOnly => "norm_erosion_only",
        }
    }

    /// Lenient parse of an oracle-supplied tag. Unknown tags map to `None`.
    pub fn from_tag(tag: &str) -> Option<Self> {
        let key = tag_key(tag);
        Self::ALL.into_iter().find(|m| m.as_str() == key)
    }
}

impl std::fmt::Display for MechanismOfHarm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    National,
    Regional,
    Local,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::National => "national",
            Scope::Regional => "regional",
            Scope::Local => "local",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag_key(tag).as_str() {
            "national" | "federal" => Some(Scope::National),
            "regional" | "state" => Some(Scope::Regional),
            "local" | "municipal" => Some(Scope::Local),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AffectedPopulation {
    /// The public at large.
    General,
    /// A vulnerable or protected group.
    Vulnerable,
    /// A narrow, specific group (an agency's staff, one industry).
    Specific,
}

impl AffectedPopulation {
    pub fn as_str(&self) -> &'static str {
        match self {
            AffectedPopulation::General => "general",
            AffectedPopulation::Vulnerable => "vulnerable",
            AffectedPopulation::Specific => "specific",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag_key(tag).as_str() {
            "general" | "general_public" => Some(AffectedPopulation::General),
            "vulnerable" | "vulnerable_group" => Some(AffectedPopulation::Vulnerable),
            "specific" | "specific_group" => Some(AffectedPopulation::Specific),
            _ => None,
        }
    }
}

// --- Articles ---

/// A normalized record as returned by an article source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceArticle {
    pub url: String,
    pub headline: String,
    pub publisher: String,
    pub published_at: Option<DateTime<Utc>>,
    pub source_tag: String,
}

/// A persisted article. `event_id` stays `None` until clustering claims it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub id: Uuid,
    pub url: String,
    pub normalized_url: String,
    pub headline: String,
    pub publisher: String,
    pub published_at: Option<DateTime<Utc>>,
    pub source_tag: String,
    pub event_id: Option<Uuid>,
    pub ingested_at: DateTime<Utc>,
}

impl Article {
    pub fn from_source(src: SourceArticle, normalized_url: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            url: src.url,
            normalized_url,
            headline: src.headline,
            publisher: src.publisher,
            published_at: src.published_at,
            source_tag: src.source_tag,
            event_id: None,
            ingested_at: Utc::now(),
        }
    }
}

// --- Scoring Inputs (oracle-supplied, untrusted) ---

/// The seven governance-damage drivers, each on a 0–5 scale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ADrivers {
    pub institutional_capture: f64,
    pub legal_authority_bypass: f64,
    pub accountability_evasion: f64,
    pub rights_impact: f64,
    pub oversight_obstruction: f64,
    pub resource_misuse: f64,
    pub public_trust_erosion: f64,
}

impl ADrivers {
    /// All drivers set to the same value.
    pub fn uniform(v: f64) -> Self {
        Self {
            institutional_capture: v,
            legal_authority_bypass: v,
            accountability_evasion: v,
            rights_impact: v,
            oversight_obstruction: v,
            resource_misuse: v,
            public_trust_erosion: v,
        }
    }

    pub fn values(&self) -> [f64; 7] {
        [
            self.institutional_capture,
            self.legal_authority_bypass,
            self.accountability_evasion,
            self.rights_impact,
            self.oversight_obstruction,
            self.resource_misuse,
            self.public_trust_erosion,
        ]
    }

    pub fn from_values(v: [f64; 7]) -> Self {
        Self {
            institutional_capture: v[0],
            legal_authority_bypass: v[1],
            accountability_evasion: v[2],
            rights_impact: v[3],
            oversight_obstruction: v[4],
            resource_misuse: v[5],
            public_trust_erosion: v[6],
        }
    }
}

/// Severity multipliers, each on a 0.8–1.3 scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SeverityInputs {
    pub durability: f64,
    pub reversibility: f64,
    pub precedent: f64,
}

impl Default for SeverityInputs {
    fn default() -> Self {
        Self {
            durability: 1.0,
            reversibility: 1.0,
            precedent: 1.0,
        }
    }
}

/// Layer-1 hype drivers, each 0–5.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HypeDrivers {
    pub media_saturation: f64,
    pub emotional_intensity: f64,
    pub novelty_spectacle: f64,
    pub social_amplification: f64,
}

impl HypeDrivers {
    pub fn uniform(v: f64) -> Self {
        Self {
            media_saturation: v,
            emotional_intensity: v,
            novelty_spectacle: v,
            social_amplification: v,
        }
    }

    pub fn values(&self) -> [f64; 4] {
        [
            self.media_saturation,
            self.emotional_intensity,
            self.novelty_spectacle,
            self.social_amplification,
        ]
    }
}

/// Layer-2 strategic drivers, each 0–5.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StrategicDrivers {
    pub timing_convenience: f64,
    pub agenda_displacement: f64,
    pub coordinated_messaging: f64,
    pub official_amplification: f64,
}

impl StrategicDrivers {
    pub fn uniform(v: f64) -> Self {
        Self {
            timing_convenience: v,
            agenda_displacement: v,
            coordinated_messaging: v,
            official_amplification: v,
        }
    }

    pub fn values(&self) -> [f64; 4] {
        [
            self.timing_convenience,
            self.agenda_displacement,
            self.coordinated_messaging,
            self.official_amplification,
        ]
    }
}

/// Everything the scoring engine needs from the oracle for one event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreInputs {
    pub a_drivers: ADrivers,
    pub severity: SeverityInputs,
    pub hype: HypeDrivers,
    pub strategic: StrategicDrivers,
    /// 0–15 intentionality indicator total.
    pub intentionality: f64,
    pub institutional_lever: bool,
    pub noise_codes: Vec<String>,
}

// --- Scoring Outputs ---

/// A-score with every intermediate value, persisted for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ABreakdown {
    /// Drivers after clamping.
    pub drivers: ADrivers,
    pub base: f64,
    pub severity: SeverityInputs,
    pub severity_mult: f64,
    pub mechanism_mod: f64,
    pub scope_mod: f64,
    pub uncapped: f64,
    pub final_score: f64,
}

/// B-score with every intermediate value, persisted for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BBreakdown {
    pub hype: HypeDrivers,
    pub strategic: StrategicDrivers,
    /// mean(hype drivers) / 5
    pub hype_layer: f64,
    /// mean(strategic drivers) / 5
    pub strategic_layer: f64,
    pub intentionality: u8,
    pub intent_weight: f64,
    pub final_score: f64,
}

/// The classifier's verdict for one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub list: ScoreList,
    pub is_mixed: bool,
    pub noise_flag: bool,
    pub noise_codes: Vec<String>,
}

/// Scores plus classification, the unit the audit ledger applies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredEvent {
    pub a: ABreakdown,
    pub b: BBreakdown,
    pub classification: Classification,
    pub institutional_lever: bool,
}

// --- Events ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub week_id: WeekId,
    pub title: String,
    pub summary: String,
    pub occurred_at: DateTime<Utc>,
    pub mechanism: Option<MechanismOfHarm>,
    pub scope: Option<Scope>,
    pub population: Option<AffectedPopulation>,
    pub actors: Vec<String>,
    pub institution: Option<String>,
    pub topic_tags: Vec<String>,
    pub confidence: f64,
    pub article_count: i32,
    pub institutional_lever: bool,
    pub a_score: Option<f64>,
    pub a_breakdown: Option<ABreakdown>,
    pub b_score: Option<f64>,
    pub b_breakdown: Option<BBreakdown>,
    pub classification: Option<Classification>,
    /// 0 until first scored; bumped by every rescore and override.
    pub score_version: i32,
    pub scored_at: Option<DateTime<Utc>>,
    pub score_frozen: bool,
    pub frozen_at: Option<DateTime<Utc>>,
    pub frozen_by: Option<String>,
    pub correction_notice: Option<String>,
    pub correction_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Event {
    pub fn is_scored(&self) -> bool {
        self.score_version > 0
    }

    pub fn list(&self) -> Option<ScoreList> {
        self.classification.as_ref().map(|c| c.list)
    }

    pub fn intentionality(&self) -> Option<u8> {
        self.b_breakdown.as_ref().map(|b| b.intentionality)
    }
}

// --- Audit ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Initial,
    Rescore,
    Override,
    Freeze,
    Unfreeze,
    Correction,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Initial => "initial",
            ChangeType::Rescore => "rescore",
            ChangeType::Override => "override",
            ChangeType::Freeze => "freeze",
            ChangeType::Unfreeze => "unfreeze",
            ChangeType::Correction => "correction",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "initial" => Some(ChangeType::Initial),
            "rescore" => Some(ChangeType::Rescore),
            "override" => Some(ChangeType::Override),
            "freeze" => Some(ChangeType::Freeze),
            "unfreeze" => Some(ChangeType::Unfreeze),
            "correction" => Some(ChangeType::Correction),
            _ => None,
        }
    }
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One immutable audit record. Never updated or deleted once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreChange {
    pub id: Uuid,
    pub event_id: Uuid,
    pub week_id: WeekId,
    pub change_type: ChangeType,
    pub old_a: Option<f64>,
    pub new_a: Option<f64>,
    pub old_b: Option<f64>,
    pub new_b: Option<f64>,
    pub old_list: Option<ScoreList>,
    pub new_list: Option<ScoreList>,
    pub version_before: i32,
    pub version_after: i32,
    pub actor: String,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ScoreChange {
    /// Diff two states of the same event into an audit record.
    pub fn between(
        before: &Event,
        after: &Event,
        change_type: ChangeType,
        actor: &str,
        reason: Option<&str>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_id: after.id,
            week_id: after.week_id,
            change_type,
            old_a: before.a_score,
            new_a: after.a_score,
            old_b: before.b_score,
            new_b: after.b_score,
            old_list: before.list(),
            new_list: after.list(),
            version_before: before.score_version,
            version_after: after.score_version,
            actor: actor.to_string(),
            reason: reason.map(str::to_string),
            created_at: Utc::now(),
        }
    }
}

// --- Smokescreen Pairs ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairSeverity {
    Low,
    Significant,
    Critical,
}

impl PairSeverity {
    /// >50 critical, 25–50 significant, <25 low.
    pub fn for_index(index: f64) -> Self {
        if index > 50.0 {
            PairSeverity::Critical
        } else if index >= 25.0 {
            PairSeverity::Significant
        } else {
            PairSeverity::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PairSeverity::Low => "low",
            PairSeverity::Significant => "significant",
            PairSeverity::Critical => "critical",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "low" => Some(PairSeverity::Low),
            "significant" => Some(PairSeverity::Significant),
            "critical" => Some(PairSeverity::Critical),
            _ => None,
        }
    }
}

impl std::fmt::Display for PairSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmokescreenPair {
    pub id: Uuid,
    pub week_id: WeekId,
    pub distraction_event_id: Uuid,
    pub damage_event_id: Uuid,
    pub raw_index: f64,
    pub smokescreen_index: f64,
    pub displacement_confidence: f64,
    /// Hours from the distraction to the damage event (negative when the distraction came later).
    pub time_delta_hours: f64,
    pub severity: PairSeverity,
    pub created_at: DateTime<Utc>,
}

// --- Weekly Snapshots ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeekStatus {
    Live,
    Frozen,
}

impl WeekStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WeekStatus::Live => "live",
            WeekStatus::Frozen => "frozen",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "live" => Some(WeekStatus::Live),
            "frozen" => Some(WeekStatus::Frozen),
            _ => None,
        }
    }
}

/// Derived per-week aggregates. Always recomputable from events and pairs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklySnapshot {
    pub week_id: WeekId,
    pub status: WeekStatus,
    pub event_count: i32,
    pub scored_count: i32,
    pub list_a_count: i32,
    pub list_b_count: i32,
    pub list_c_count: i32,
    pub mixed_count: i32,
    pub noise_count: i32,
    pub frozen_count: i32,
    pub pair_count: i32,
    pub avg_a: Option<f64>,
    pub avg_b: Option<f64>,
    pub max_smokescreen_index: Option<f64>,
    pub computed_at: DateTime<Utc>,
}

// --- Pipeline Runs ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Ingest,
    Process,
}

impl RunPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunPhase::Ingest => "ingest",
            RunPhase::Process => "process",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "ingest" => Some(RunPhase::Ingest),
            "process" => Some(RunPhase::Process),
            _ => None,
        }
    }
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "running" => Some(RunStatus::Running),
            "completed" => Some(RunStatus::Completed),
            "failed" => Some(RunStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Bookkeeping row for one phase invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: Uuid,
    pub phase: RunPhase,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub stats: serde_json::Value,
    /// Soft errors accumulated during the run, surfaced verbatim to operators.
    pub errors: Vec<String>,
    /// Ordered run-log timeline.
    pub events: serde_json::Value,
}

impl RunRecord {
    pub fn start(phase: RunPhase) -> Self {
        Self {
            id: Uuid::new_v4(),
            phase,
            status: RunStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
            stats: serde_json::Value::Null,
            errors: Vec::new(),
            events: serde_json::Value::Array(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mechanism_tags_parse_leniently() {
        assert_eq!(
            MechanismOfHarm::from_tag("Norm-Erosion Only"),
            Some(MechanismOfHarm::NormErosionOnly)
        );
        assert_eq!(
            MechanismOfHarm::from_tag("election_interference"),
            Some(MechanismOfHarm::ElectionInterference)
        );
        assert_eq!(MechanismOfHarm::from_tag("vibes"), None);
    }

    #[test]
    fn pair_severity_bands() {
        assert_eq!(PairSeverity::for_index(50.1), PairSeverity::Critical);
        assert_eq!(PairSeverity::for_index(50.0), PairSeverity::Significant);
        assert_eq!(PairSeverity::for_index(25.0), PairSeverity::Significant);
        assert_eq!(PairSeverity::for_index(24.9), PairSeverity::Low);
    }

    #[test]
    fn scope_and_population_aliases() {
        assert_eq!(Scope::from_tag("Federal"), Some(Scope::National));
        assert_eq!(
            AffectedPopulation::from_tag("vulnerable group"),
            Some(AffectedPopulation::Vulnerable)
        );
        assert_eq!(AffectedPopulation::from_tag(""), None);
    }
}
