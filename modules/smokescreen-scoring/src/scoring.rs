use smokescreen_common::{
    ABreakdown, ADrivers, AffectedPopulation, BBreakdown, HypeDrivers, MechanismOfHarm, Scope,
    ScoreInputs, ScoredEvent, SeverityInputs, StrategicDrivers,
};

use crate::classify::classify;

/// A-driver weights in `ADrivers::values()` order. Sum to 1.0.
pub const A_WEIGHTS: [f64; 7] = [0.22, 0.18, 0.16, 0.14, 0.14, 0.10, 0.06];

pub const DRIVER_MAX: f64 = 5.0;
pub const SEVERITY_MIN: f64 = 0.8;
pub const SEVERITY_MAX: f64 = 1.3;
pub const SCORE_CAP: f64 = 100.0;

/// Fixed weight of the hype layer in the B-score.
pub const HYPE_WEIGHT: f64 = 0.55;
pub const INTENTIONALITY_MAX: u8 = 15;

/// Round to one decimal place.
pub fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

/// Clamp an untrusted driver value into [0, 5]. Non-finite values count as 0.
pub fn clamp_driver(v: f64) -> f64 {
    if v.is_finite() {
        v.clamp(0.0, DRIVER_MAX)
    } else {
        0.0
    }
}

/// Clamp an untrusted severity multiplier into [0.8, 1.3]. Non-finite values count as neutral.
pub fn clamp_severity(v: f64) -> f64 {
    if v.is_finite() {
        v.clamp(SEVERITY_MIN, SEVERITY_MAX)
    } else {
        1.0
    }
}

/// Floor and clamp an intentionality total into [0, 15].
pub fn clamp_intentionality(v: f64) -> u8 {
    if !v.is_finite() {
        return 0;
    }
    v.floor().clamp(0.0, INTENTIONALITY_MAX as f64) as u8
}

pub fn mechanism_modifier(mechanism: Option<MechanismOfHarm>) -> f64 {
    match mechanism {
        None => 1.0,
        Some(MechanismOfHarm::ElectionInterference) => 1.15,
        Some(MechanismOfHarm::EmergencyPower) => 1.10,
        Some(MechanismOfHarm::PersonnelCapture) => 1.10,
        Some(MechanismOfHarm::EnforcementAction) => 1.05,
        Some(MechanismOfHarm::InformationControl) => 1.05,
        Some(MechanismOfHarm::PolicyChange) => 1.00,
        Some(MechanismOfHarm::ResourceReallocation) => 1.00,
        Some(MechanismOfHarm::NormErosionOnly) => 0.90,
    }
}

/// Scope × population lookup. Anything missing is neutral.
pub fn scope_modifier(scope: Option<Scope>, population: Option<AffectedPopulation>) -> f64 {
    use AffectedPopulation::*;

    match (scope, population) {
        (Some(Scope::National), Some(General)) => 1.10,
        (Some(Scope::National), Some(Vulnerable)) => 1.10,
        (Some(Scope::National), Some(Specific)) => 1.05,
        (Some(Scope::Regional), Some(General)) => 1.05,
        (Some(Scope::Regional), Some(Vulnerable)) => 1.05,
        (Some(Scope::Regional), Some(Specific)) => 1.00,
        (Some(Scope::Local), Some(General)) => 0.95,
        (Some(Scope::Local), Some(Vulnerable)) => 1.00,
        (Some(Scope::Local), Some(Specific)) => 0.90,
        _ => 1.0,
    }
}

/// Governance-damage score.
///
/// `base = 100 × Σ(weight·driver/5)`, scaled by the mean severity multiplier
/// and the mechanism and scope modifiers, capped at 100.
pub fn score_a(
    drivers: &ADrivers,
    severity: &SeverityInputs,
    mechanism: Option<MechanismOfHarm>,
    scope: Option<Scope>,
    population: Option<AffectedPopulation>,
) -> ABreakdown {
    let clamped = drivers.values().map(clamp_driver);
    let base = 100.0
        * clamped
            .iter()
            .zip(A_WEIGHTS.iter())
            .map(|(d, w)| w * d / DRIVER_MAX)
            .sum::<f64>();

    let severity = SeverityInputs {
        durability: clamp_severity(severity.durability),
        reversibility: clamp_severity(severity.reversibility),
        precedent: clamp_severity(severity.precedent),
    };
    let severity_mult = (severity.durability + severity.reversibility + severity.precedent) / 3.0;

    let mechanism_mod = mechanism_modifier(mechanism);
    let scope_mod = scope_modifier(scope, population);

    let uncapped = base * severity_mult * mechanism_mod * scope_mod;

    ABreakdown {
        drivers: ADrivers::from_values(clamped),
        base: round1(base),
        severity,
        severity_mult,
        mechanism_mod,
        scope_mod,
        uncapped: round1(uncapped),
        final_score: round1(uncapped.min(SCORE_CAP)),
    }
}

/// Layer-2 weight as a step function of intentionality.
pub fn intent_weight(intentionality: u8) -> f64 {
    match intentionality {
        8.. => 0.45,
        4..=7 => 0.25,
        _ => 0.10,
    }
}

fn layer_mean(values: &[f64]) -> f64 {
    let sum: f64 = values.iter().copied().map(clamp_driver).sum();
    sum / values.len() as f64 / DRIVER_MAX
}

/// Manufactured-attention score.
pub fn score_b(
    hype: &HypeDrivers,
    strategic: &StrategicDrivers,
    intentionality: f64,
) -> BBreakdown {
    let hype_values = hype.values().map(clamp_driver);
    let strategic_values = strategic.values().map(clamp_driver);

    let hype_layer = layer_mean(&hype_values);
    let strategic_layer = layer_mean(&strategic_values);
    let intentionality = clamp_intentionality(intentionality);
    let weight = intent_weight(intentionality);

    let raw = 100.0 * (HYPE_WEIGHT * hype_layer + weight * strategic_layer);

    BBreakdown {
        hype: HypeDrivers {
            media_saturation: hype_values[0],
            emotional_intensity: hype_values[1],
            novelty_spectacle: hype_values[2],
            social_amplification: hype_values[3],
        },
        strategic: StrategicDrivers {
            timing_convenience: strategic_values[0],
            agenda_displacement: strategic_values[1],
            coordinated_messaging: strategic_values[2],
            official_amplification: strategic_values[3],
        },
        hype_layer,
        strategic_layer,
        intentionality,
        intent_weight: weight,
        final_score: round1(raw.min(SCORE_CAP)),
    }
}

/// Score and classify one event from oracle judgment inputs.
pub fn evaluate(
    inputs: &ScoreInputs,
    mechanism: Option<MechanismOfHarm>,
    scope: Option<Scope>,
    population: Option<AffectedPopulation>,
) -> ScoredEvent {
    let a = score_a(&inputs.a_drivers, &inputs.severity, mechanism, scope, population);
    let b = score_b(&inputs.hype, &inputs.strategic, inputs.intentionality);
    let classification = classify(
        a.final_score,
        b.final_score,
        mechanism,
        inputs.institutional_lever,
        &inputs.noise_codes,
    );

    ScoredEvent {
        a,
        b,
        classification,
        institutional_lever: inputs.institutional_lever,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smokescreen_common::ScoreList;

    fn neutral() -> SeverityInputs {
        SeverityInputs::default()
    }

    #[test]
    fn weights_sum_to_one() {
        let sum: f64 = A_WEIGHTS.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn max_drivers_neutral_modifiers_is_exactly_100() {
        let a = score_a(&ADrivers::uniform(5.0), &neutral(), None, None, None);
        assert_eq!(a.final_score, 100.0);
        assert_eq!(a.severity_mult, 1.0);
        assert_eq!(a.mechanism_mod, 1.0);
        assert_eq!(a.scope_mod, 1.0);
    }

    #[test]
    fn a_score_is_capped_at_100() {
        let severity = SeverityInputs {
            durability: 1.3,
            reversibility: 1.3,
            precedent: 1.3,
        };
        let a = score_a(
            &ADrivers::uniform(5.0),
            &severity,
            Some(MechanismOfHarm::ElectionInterference),
            Some(Scope::National),
            Some(AffectedPopulation::General),
        );
        assert_eq!(a.uncapped, 164.5);
        assert_eq!(a.final_score, 100.0);
    }

    #[test]
    fn a_score_is_monotonic_in_each_driver() {
        for idx in 0..7 {
            let mut prev = -1.0;
            for step in 0..=10 {
                let mut values = [2.5; 7];
                values[idx] = step as f64 * 0.5;
                let a = score_a(&ADrivers::from_values(values), &neutral(), None, None, None);
                assert!(
                    a.final_score >= prev,
                    "driver {idx} at {} dropped score to {}",
                    values[idx],
                    a.final_score
                );
                prev = a.final_score;
            }
        }
    }

    #[test]
    fn drivers_are_clamped_before_weighting() {
        let wild = ADrivers::from_values([9.0, -3.0, f64::NAN, 5.0, 5.0, 5.0, 5.0]);
        let a = score_a(&wild, &neutral(), None, None, None);
        assert_eq!(a.drivers.institutional_capture, 5.0);
        assert_eq!(a.drivers.legal_authority_bypass, 0.0);
        assert_eq!(a.drivers.accountability_evasion, 0.0);
        // 0.22 + 0.14 + 0.14 + 0.10 + 0.06 = 0.66
        assert_eq!(a.final_score, 66.0);
    }

    #[test]
    fn severity_outside_band_is_clamped() {
        let severity = SeverityInputs {
            durability: 4.0,
            reversibility: 0.1,
            precedent: 1.0,
        };
        let a = score_a(&ADrivers::uniform(2.5), &severity, None, None, None);
        assert_eq!(a.severity.durability, 1.3);
        assert_eq!(a.severity.reversibility, 0.8);
        assert!((a.severity_mult - 1.0333333).abs() < 1e-6);
    }

    #[test]
    fn mechanism_and_scope_modifiers_stay_in_range() {
        for m in MechanismOfHarm::ALL {
            let v = mechanism_modifier(Some(m));
            assert!((0.90..=1.15).contains(&v), "{m} out of range: {v}");
        }
        assert_eq!(mechanism_modifier(None), 1.0);
        assert_eq!(scope_modifier(Some(Scope::Local), None), 1.0);
        assert_eq!(scope_modifier(None, Some(AffectedPopulation::General)), 1.0);
        assert_eq!(
            scope_modifier(Some(Scope::Local), Some(AffectedPopulation::Specific)),
            0.90
        );
    }

    #[test]
    fn b_score_maxes_at_100() {
        let b = score_b(&HypeDrivers::uniform(5.0), &StrategicDrivers::uniform(5.0), 10.0);
        assert_eq!(b.final_score, 100.0);
        assert_eq!(b.intent_weight, 0.45);
    }

    #[test]
    fn intent_weight_step_boundaries() {
        assert_eq!(intent_weight(0), 0.10);
        assert_eq!(intent_weight(3), 0.10);
        assert_eq!(intent_weight(4), 0.25);
        assert_eq!(intent_weight(7), 0.25);
        assert_eq!(intent_weight(8), 0.45);
        assert_eq!(intent_weight(15), 0.45);
    }

    #[test]
    fn intentionality_is_floored_and_clamped() {
        assert_eq!(clamp_intentionality(7.9), 7);
        assert_eq!(clamp_intentionality(40.0), 15);
        assert_eq!(clamp_intentionality(-2.0), 0);
        assert_eq!(clamp_intentionality(f64::INFINITY), 0);
    }

    #[test]
    fn low_intentionality_caps_b_below_hype_plus_ten() {
        let b = score_b(&HypeDrivers::uniform(5.0), &StrategicDrivers::uniform(5.0), 2.0);
        assert_eq!(b.final_score, 65.0);
    }

    #[test]
    fn b_drivers_are_clamped() {
        let hype = HypeDrivers {
            media_saturation: 12.0,
            emotional_intensity: -1.0,
            novelty_spectacle: 5.0,
            social_amplification: 5.0,
        };
        let b = score_b(&hype, &StrategicDrivers::default(), 0.0);
        // (5 + 0 + 5 + 5) / 4 / 5 = 0.75 → 0.55 × 0.75 = 41.25
        assert_eq!(b.final_score, 41.3);
    }

    #[test]
    fn evaluate_recomputes_and_classifies() {
        let inputs = ScoreInputs {
            a_drivers: ADrivers::uniform(4.0),
            severity: SeverityInputs::default(),
            hype: HypeDrivers::uniform(1.0),
            strategic: StrategicDrivers::uniform(1.0),
            intentionality: 2.0,
            institutional_lever: true,
            noise_codes: Vec::new(),
        };
        let scored = evaluate(&inputs, Some(MechanismOfHarm::PolicyChange), None, None);
        assert_eq!(scored.a.final_score, 80.0);
        assert_eq!(scored.b.final_score, 13.0);
        assert_eq!(scored.classification.list, ScoreList::A);
        assert!(!scored.classification.is_mixed);
    }
}
