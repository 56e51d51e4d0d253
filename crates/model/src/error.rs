use thiserror::Error;

pub type Result<T> = std::result::Result<T, ModelError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// A normalized finding failed schema validation. The finding is dropped
    /// and counted on its adapter result.
    #[error("invariant violation in finding {finding_id}: {reason}")]
    InvariantViolation { finding_id: String, reason: String },

    #[error("unknown value {value:?} for {field}")]
    UnknownValue { field: &'static str, value: String },
}

impl ModelError {
    pub fn violation(finding_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvariantViolation {
            finding_id: finding_id.into(),
            reason: reason.into(),
        }
    }
}
