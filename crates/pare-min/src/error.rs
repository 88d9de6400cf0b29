use crate::candidate::{CandidateId, CandidateKind};
use thiserror::Error;

/// Errors raised by a minimization session.
///
/// A removal the verifier rejects is not an error; these are violations of
/// the session's structural assumptions.
#[derive(Debug, Clone, Error)]
pub enum MinimizeError {
    #[error("program '{program}' does not verify before minimization")]
    NotValid { program: String },

    #[error("{kind} candidate {candidate} not found at its recorded location in scope '{scope}'")]
    InventoryInconsistency {
        candidate: CandidateId,
        kind: CandidateKind,
        scope: String,
    },

    #[error("cannot reinsert {kind} candidate {candidate} at index {index} in scope '{scope}'")]
    Reinsertion {
        candidate: CandidateId,
        kind: CandidateKind,
        index: usize,
        scope: String,
    },

    #[error("verification failure in round {round} could not be attributed to a scope: {detail}")]
    DiagnosticLocalization { round: usize, detail: String },

    #[error("wildcard {candidate} reached before its nested wildcard {child} was resolved")]
    UnresolvedWildcardChild {
        candidate: CandidateId,
        child: CandidateId,
    },
}

pub type MinimizeResult<T> = Result<T, MinimizeError>;

impl MinimizeError {
    /// Errors that only invalidate work on one scope.
    pub fn is_scope_local(&self) -> bool {
        matches!(
            self,
            MinimizeError::InventoryInconsistency { .. }
                | MinimizeError::UnresolvedWildcardChild { .. }
        )
    }
}
