use thiserror::Error;

pub use crate::gating::GateError;

/// Invariant violations in progress aggregates.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ModelError {
    #[error("completed content ({completed}) exceeds total content ({total})")]
    CompletedExceedsTotal { completed: u32, total: u32 },
}
