use crate::{CorrelationConfig, VerdictResolution};
use codecity_model::{Finding, Verdict};

/// Merge participants' verdicts.
///
/// A verified-vs-violated conflict is decided by the trust ranking (ties go
/// to the earlier participant) and always reported as conflicting. A
/// `partial` verdict anywhere in the group caps the outcome at `partial`
/// unless the winner says `violated`.
#[must_use]
pub fn resolve_verdicts(
    participants: &[&Finding],
    config: &CorrelationConfig,
) -> Option<VerdictResolution> {
    let verdicts: Vec<(usize, &Finding, Verdict)> = participants
        .iter()
        .enumerate()
        .filter_map(|(pos, f)| f.verdict.map(|v| (pos, *f, v)))
        .collect();
    if verdicts.is_empty() {
        return None;
    }

    let has = |wanted: Verdict| verdicts.iter().any(|(_, _, v)| *v == wanted);
    let any_partial = has(Verdict::Partial);

    if has(Verdict::Verified) && has(Verdict::Violated) {
        let (_, winner, verdict) = verdicts
            .iter()
            .filter(|(_, _, v)| matches!(v, Verdict::Verified | Verdict::Violated))
            .min_by_key(|(pos, f, _)| (config.trust_rank(&f.adapter), *pos))
            .copied()?;
        let verdict = if verdict == Verdict::Verified && any_partial {
            Verdict::Partial
        } else {
            verdict
        };
        log::debug!(
            "Verdict conflict at {:?} decided by {} as {verdict:?}",
            winner.location.file,
            winner.adapter
        );
        return Some(VerdictResolution {
            verdict,
            decided_by: Some(winner.adapter.clone()),
            conflicting: true,
        });
    }

    let verdict = if has(Verdict::Violated) {
        Verdict::Violated
    } else if any_partial {
        Verdict::Partial
    } else if has(Verdict::Verified) {
        Verdict::Verified
    } else {
        Verdict::Unknown
    };
    Some(VerdictResolution {
        verdict,
        decided_by: None,
        conflicting: false,
    })
}
