//! Verification oracle boundary.
//!
//! The minimizer treats verification as a black box: [`Oracle::validate`]
//! answers whether a program verifies, [`Oracle::diagnose`] additionally says
//! where it failed. A failed verification is an ordinary [`Verdict`], never an
//! error; implementations swallow their own faults (timeouts, crashes,
//! resolution errors) and report them as "not verified".

pub mod command;

use pare_syntax::{Pos, Program};
use std::time::Duration;
use thiserror::Error;

pub use command::CommandOracle;

/// Errors raised while setting up or running an external verifier.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("invalid verifier command: {0}")]
    InvalidCommand(String),

    #[error("invalid diagnostic pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("failed to start verifier '{program}': {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("verifier timed out after {0:?}")]
    Timeout(Duration),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type OracleResult<T> = Result<T, OracleError>;

/// Per-call verifier configuration. Passed explicitly into every oracle call;
/// nothing is toggled globally between calls.
#[derive(Debug, Clone)]
pub struct OracleConfig {
    /// Wall-clock limit for a single verifier run (`None` = unlimited).
    pub timeout: Option<Duration>,
    /// Extra arguments appended to the verifier command line.
    pub extra_args: Vec<String>,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_secs(120)),
            extra_args: Vec::new(),
        }
    }
}

/// A position at which verification failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureLocation {
    /// Position in the program's own coordinates, or `None` if the verifier
    /// reported something outside every scope.
    pub position: Option<Pos>,
    pub message: String,
}

impl FailureLocation {
    pub fn at(position: Pos, message: impl Into<String>) -> Self {
        Self {
            position: Some(position),
            message: message.into(),
        }
    }

    pub fn unlocated(message: impl Into<String>) -> Self {
        Self {
            position: None,
            message: message.into(),
        }
    }
}

/// Outcome of a diagnosing oracle call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Verified,
    /// Verification failed. An empty list means the failure could not be
    /// localized at all.
    Failed { failures: Vec<FailureLocation> },
}

impl Verdict {
    pub fn is_verified(&self) -> bool {
        matches!(self, Verdict::Verified)
    }
}

/// The external validity check.
///
/// Implementations must not mutate the program and must give the same answer
/// for the same program.
pub trait Oracle {
    fn validate(&self, program: &Program, config: &OracleConfig) -> bool;

    /// Validate and localize failures. The default cannot localize anything.
    fn diagnose(&self, program: &Program, config: &OracleConfig) -> Verdict {
        if self.validate(program, config) {
            Verdict::Verified
        } else {
            Verdict::Failed {
                failures: Vec::new(),
            }
        }
    }
}

impl<O: Oracle + ?Sized> Oracle for &O {
    fn validate(&self, program: &Program, config: &OracleConfig) -> bool {
        (**self).validate(program, config)
    }

    fn diagnose(&self, program: &Program, config: &OracleConfig) -> Verdict {
        (**self).diagnose(program, config)
    }
}

impl<O: Oracle + ?Sized> Oracle for Box<O> {
    fn validate(&self, program: &Program, config: &OracleConfig) -> bool {
        (**self).validate(program, config)
    }

    fn diagnose(&self, program: &Program, config: &OracleConfig) -> Verdict {
        (**self).diagnose(program, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(bool);

    impl Oracle for Fixed {
        fn validate(&self, _: &Program, _: &OracleConfig) -> bool {
            self.0
        }
    }

    #[test]
    fn test_default_diagnose_is_unlocalized() {
        let program = Program::new("p", "", vec![]);
        let config = OracleConfig::default();
        assert_eq!(Fixed(true).diagnose(&program, &config), Verdict::Verified);
        assert_eq!(
            Fixed(false).diagnose(&program, &config),
            Verdict::Failed { failures: vec![] }
        );
    }

    #[test]
    fn test_boxed_oracle_delegates() {
        let program = Program::new("p", "", vec![]);
        let oracle: Box<dyn Oracle> = Box::new(Fixed(true));
        assert!(oracle.validate(&program, &OracleConfig::default()));
    }
}
