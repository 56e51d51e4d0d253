use crate::AgreementLevel;
use codecity_model::Severity;

/// Severity levels that participants disagree by before the correlation is
/// flagged.
pub const DISAGREEMENT_SPREAD: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Consensus {
    pub severity: Severity,
    pub spread: u8,
    pub disagreement: bool,
    pub agreement: AgreementLevel,
}

/// `round(mean(rank))` with halves rounded up, in integer arithmetic:
/// `floor((2·sum + n) / 2n)`.
#[must_use]
pub fn round_half_up_mean(ranks: &[u8]) -> Option<u8> {
    if ranks.is_empty() {
        return None;
    }
    let n = ranks.len() as u64;
    let sum: u64 = ranks.iter().map(|&r| u64::from(r)).sum();
    let rounded = (2 * sum + n) / (2 * n);
    Some(u8::try_from(rounded).unwrap_or(u8::MAX))
}

#[must_use]
pub fn consensus(severities: &[Severity]) -> Option<Consensus> {
    let ranks: Vec<u8> = severities.iter().map(|s| s.rank()).collect();
    let severity = Severity::from_rank(round_half_up_mean(&ranks)?);
    let max = ranks.iter().copied().max().unwrap_or(0);
    let min = ranks.iter().copied().min().unwrap_or(0);
    let spread = max - min;

    let at_consensus = severities.iter().filter(|&&s| s == severity).count();
    let agreement = if severities.len() == 1 {
        AgreementLevel::Single
    } else if at_consensus == severities.len() {
        AgreementLevel::Unanimous
    } else if at_consensus * 2 > severities.len() {
        AgreementLevel::Majority
    } else {
        AgreementLevel::Split
    };

    Some(Consensus {
        severity,
        spread,
        disagreement: spread >= DISAGREEMENT_SPREAD,
        agreement,
    })
}
