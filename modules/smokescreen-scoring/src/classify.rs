//! List assignment from final scores.
//!
//! Total over every input: each (A, B, mechanism, lever, tags) lands on
//! exactly one list. The ±10 dominance band is hysteresis so that a small
//! rescore near a tie does not flip an event between lists.

use smokescreen_common::{Classification, MechanismOfHarm, ScoreList};

use crate::scoring::round1;

/// Minimum score for an axis to count as significant.
pub const LIST_THRESHOLD: f64 = 25.0;
/// |A − B| at or above which one axis dominates.
pub const DOMINANCE_MARGIN: f64 = 10.0;

/// The noise gate fires only when every condition holds.
fn is_noise(
    a: f64,
    mechanism: Option<MechanismOfHarm>,
    institutional_lever: bool,
    noise_codes: &[String],
) -> bool {
    a < LIST_THRESHOLD
        && matches!(mechanism, None | Some(MechanismOfHarm::NormErosionOnly))
        && !institutional_lever
        && !noise_codes.is_empty()
}

/// Assign an event to a list. First matching rule wins.
pub fn classify(
    a: f64,
    b: f64,
    mechanism: Option<MechanismOfHarm>,
    institutional_lever: bool,
    noise_codes: &[String],
) -> Classification {
    // Scores carry one decimal; round the margin so 35.3 − 25.3 is exactly 10.
    let d = round1(a - b);

    let verdict = |list: ScoreList, is_mixed: bool, noise_flag: bool| Classification {
        list,
        is_mixed,
        noise_flag,
        noise_codes: noise_codes.to_vec(),
    };

    if is_noise(a, mechanism, institutional_lever, noise_codes) {
        return verdict(ScoreList::C, false, true);
    }
    if a >= LIST_THRESHOLD && d >= DOMINANCE_MARGIN {
        return verdict(ScoreList::A, false, false);
    }
    if b >= LIST_THRESHOLD && d <= -DOMINANCE_MARGIN {
        return verdict(ScoreList::B, false, false);
    }
    if a >= LIST_THRESHOLD && b >= LIST_THRESHOLD {
        // |d| < margin here. Ties go to A.
        let list = if b > a { ScoreList::B } else { ScoreList::A };
        return verdict(list, true, false);
    }
    if a < LIST_THRESHOLD && b < LIST_THRESHOLD {
        return verdict(ScoreList::C, false, false);
    }
    // Exactly one axis is significant but the margin is unmet: the larger
    // score wins without a flag. Historical lists depend on this.
    let list = if a >= b { ScoreList::A } else { ScoreList::B };
    verdict(list, false, false)
}
