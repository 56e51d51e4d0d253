pub const FP_FLOOR: f64 = 0.01;
pub const FP_CEILING: f64 = 0.95;

/// Share of the base rate removed per additional detecting adapter, and its
/// cap.
const CONSENSUS_STEP: f64 = 0.15;
const CONSENSUS_CAP: f64 = 0.5;

/// False-positive likelihood of a correlation.
///
/// `base · (1 − min(0.5, 0.15·(n−1))) · (2 − reliability)`, clamped to
/// `[0.01, 0.95]`. `mean_reliability` is clamped to `[0, 1]` first.
#[must_use]
pub fn false_positive_probability(base: f64, detecting: usize, mean_reliability: f64) -> f64 {
    let mut fp = base.clamp(0.0, 1.0);
    if detecting >= 2 {
        let reduction = (CONSENSUS_STEP * (detecting - 1) as f64).min(CONSENSUS_CAP);
        fp *= 1.0 - reduction;
    }
    fp *= 2.0 - mean_reliability.clamp(0.0, 1.0);
    fp.clamp(FP_FLOOR, FP_CEILING)
}
