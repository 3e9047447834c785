//! Scoring oracle response: parsed into judgment inputs only. Final scores
//! are always recomputed by the scoring engine.

use schemars::gen::SchemaSettings;
use schemars::JsonSchema;
use serde::Deserialize;

use smokescreen_common::{
    ADrivers, HypeDrivers, ScoreInputs, SeverityInputs, SmokescreenError, StrategicDrivers,
};

use crate::oracle::strip_code_blocks;

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ScoreResponse {
    /// Governance damage drivers, 0-5 each.
    pub a_drivers: ADrivers,
    /// Severity multipliers, 0.8-1.3 each.
    #[serde(default)]
    pub severity: SeverityInputs,
    /// Attention drivers, 0-5 each.
    pub hype: HypeDrivers,
    /// Strategic drivers, 0-5 each.
    pub strategic: StrategicDrivers,
    /// Number of intentionality indicators present, 0-15.
    #[serde(default)]
    pub intentionality: f64,
    #[serde(default)]
    pub institutional_lever: bool,
    #[serde(default)]
    pub noise_codes: Vec<String>,
    /// Free-text reasoning; logged, never scored.
    #[serde(default)]
    pub rationale: Option<String>,
}

impl From<ScoreResponse> for ScoreInputs {
    fn from(r: ScoreResponse) -> Self {
        Self {
            a_drivers: r.a_drivers,
            severity: r.severity,
            hype: r.hype,
            strategic: r.strategic,
            intentionality: r.intentionality,
            institutional_lever: r.institutional_lever,
            noise_codes: r
                .noise_codes
                .into_iter()
                .map(|c| c.trim().to_lowercase())
                .filter(|c| !c.is_empty())
                .collect(),
        }
    }
}

/// JSON schema handed to the oracle as the forced tool's input.
pub fn response_schema() -> serde_json::Value {
    let schema = SchemaSettings::draft07()
        .with(|s| s.inline_subschemas = true)
        .into_generator()
        .into_root_schema_for::<ScoreResponse>();
    let mut value = serde_json::to_value(schema).unwrap_or_default();
    if let serde_json::Value::Object(map) = &mut value {
        map.remove("$schema");
        map.remove("title");
    }
    value
}

pub fn parse_score_response(raw: &str) -> Result<ScoreInputs, SmokescreenError> {
    let response: ScoreResponse = serde_json::from_str(strip_code_blocks(raw))
        .map_err(|e| SmokescreenError::OracleParse(format!("scoring response: {e}")))?;
    Ok(response.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"{
        "a_drivers": {
            "institutional_capture": 4, "legal_authority_bypass": 3,
            "accountability_evasion": 3, "rights_impact": 2,
            "oversight_obstruction": 4, "resource_misuse": 1,
            "public_trust_erosion": 2
        },
        "hype": {
            "media_saturation": 1, "emotional_intensity": 2,
            "novelty_spectacle": 1, "social_amplification": 0
        },
        "strategic": {
            "timing_convenience": 0, "agenda_displacement": 0,
            "coordinated_messaging": 0, "official_amplification": 0
        },
        "intentionality": 2,
        "noise_codes": [" Celebrity "]
    }"#;

    #[test]
    fn valid_response_parses_with_defaults() {
        let inputs = parse_score_response(VALID).unwrap();
        assert_eq!(inputs.a_drivers.institutional_capture, 4.0);
        assert_eq!(inputs.severity, SeverityInputs::default());
        assert!(!inputs.institutional_lever);
        assert_eq!(inputs.noise_codes, vec!["celebrity".to_string()]);
    }

    #[test]
    fn fenced_response_parses() {
        let fenced = format!("```json\n{VALID}\n```");
        assert!(parse_score_response(&fenced).is_ok());
    }

    #[test]
    fn missing_drivers_are_a_parse_error() {
        let err = parse_score_response(r#"{"hype": {}}"#).unwrap_err();
        assert!(matches!(err, SmokescreenError::OracleParse(_)));

        let err = parse_score_response("I think this is a 7/10").unwrap_err();
        assert!(matches!(err, SmokescreenError::OracleParse(_)));
    }

    #[test]
    fn schema_lists_driver_groups() {
        let schema = response_schema();
        let props = schema["properties"].as_object().unwrap();
        assert!(props.contains_key("a_drivers"));
        assert!(props.contains_key("strategic"));
    }
}
