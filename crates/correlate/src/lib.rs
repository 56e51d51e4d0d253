//! # Codecity Correlate
//!
//! Cross-adapter correlation over a finished [`AnalysisBundle`].
//!
//! ```text
//! AnalysisBundle (findings in declaration order)
//!     │
//!     ├──> group: same file, equivalent rule or kind, within tolerance,
//!     │           one finding per adapter
//!     ├──> per group: consensus severity, fp probability, verdict merge
//!     │
//!     └──> CorrelatedModel { bundle, correlations, risk?, deployment? }
//! ```
//!
//! Grouping is a pure function of the input order and the
//! [`CorrelationConfig`]; the same bundle always yields the same
//! correlations with the same ids.
//!
//! [`AnalysisBundle`]: codecity_model::AnalysisBundle

mod config;
mod conflict;
mod consensus;
mod deployment;
mod engine;
mod fp;
mod group;
mod model;
mod risk;
#[cfg(test)]
mod testing;
mod types;

pub use config::{
    default_base_fp, default_base_fp_rates, CorrelationConfig, DeploymentPolicy, RiskPolicy,
    RiskThresholds, SeverityPenalties, DEFAULT_LOCATION_TOLERANCE, DEFAULT_RELIABILITY,
};
pub use conflict::resolve_verdicts;
pub use consensus::{consensus, round_half_up_mean, Consensus, DISAGREEMENT_SPREAD};
pub use deployment::{mitigation_for, recommend, safety_score, DeploymentRecommendation};
pub use engine::CorrelationEngine;
pub use fp::{false_positive_probability, FP_CEILING, FP_FLOOR};
pub use group::group_findings;
pub use model::CorrelatedModel;
pub use risk::{assess_risk, RiskAssessment, RiskContribution, RiskLevel};
pub use types::{AgreementLevel, Correlation, CorrelationSummary, VerdictResolution};
