//! One candidate, one oracle call.
//!
//! The program verifies after every step, but the final set depends on the
//! order candidates are tried in: removing one candidate can make another
//! required.

use crate::candidate::CandidateKind;
use crate::error::MinimizeResult;
use crate::minimizer::{Minimizer, Status};
use pare_oracle::Oracle;
use pare_syntax::ScopeId;
use tracing::debug;

impl<O: Oracle> Minimizer<O> {
    pub(crate) fn run_sequential(&mut self) -> MinimizeResult<()> {
        let kinds = self.config.kinds;
        for index in 0..self.inventory.scopes.len() {
            let scope = ScopeId(index);
            for kind in kinds.regular() {
                let list = self.inventory.scope(scope).list(kind).to_vec();
                if list.is_empty() {
                    continue;
                }
                debug!(
                    scope = %self.inventory.scope(scope).name,
                    %kind,
                    candidates = list.len(),
                    "sequential pass"
                );
                for id in list {
                    if self.should_stop() {
                        return Ok(());
                    }
                    if self.is_aborted(scope) {
                        break;
                    }
                    if self.status(id) != Status::Untried {
                        continue;
                    }
                    let result = self.try_remove(id);
                    self.contain(scope, result)?;
                }
            }
        }
        if kinds.contains(CandidateKind::DecreasesWildcard) {
            self.run_wildcard_pass()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::candidate::{CandidateId, KindSet};
    use crate::minimizer::{MinimizeConfig, Minimizer, Strategy};
    use pare_oracle::{Oracle, OracleConfig};
    use pare_syntax::{Expr, Loop, Program, Scope, Stmt, StmtKind};

    /// Accepts any program whose scopes each keep at least two top-level
    /// asserts.
    struct AtMostOneMissing;

    impl Oracle for AtMostOneMissing {
        fn validate(&self, program: &Program, _: &OracleConfig) -> bool {
            program.scopes.iter().all(|s| {
                let asserts = s
                    .body
                    .stmts
                    .iter()
                    .filter(|st| matches!(st.kind, StmtKind::Assert(_)))
                    .count();
                asserts >= 2
            })
        }
    }

    fn three_asserts() -> Program {
        let lp = Loop::new(Expr::ident("g"), vec![]).with_invariants(vec![Expr::ident("I")]);
        Program::new(
            "p",
            "",
            vec![Scope::new(
                "M",
                vec![
                    Stmt::assert(Expr::ident("A")),
                    Stmt::assert(Expr::ident("B")),
                    Stmt::assert(Expr::ident("C")),
                    Stmt::while_loop(lp),
                ],
            )],
        )
    }

    #[test]
    fn test_first_removal_wins() {
        let config = MinimizeConfig {
            strategy: Strategy::Sequential,
            ..MinimizeConfig::default()
        };
        let mut minimizer = Minimizer::new(three_asserts(), AtMostOneMissing, config).unwrap();
        let outcome = minimizer.run().unwrap();
        // A goes, then B and C are each required; the invariant is free.
        assert_eq!(outcome.removed, vec![CandidateId(0), CandidateId(3)]);
        assert_eq!(minimizer.program().scopes[0].body.stmts.len(), 3);
    }

    #[test]
    fn test_kind_filter() {
        let config = MinimizeConfig {
            strategy: Strategy::Sequential,
            kinds: KindSet::of(&[crate::CandidateKind::Invariant]),
            ..MinimizeConfig::default()
        };
        let mut minimizer = Minimizer::new(three_asserts(), AtMostOneMissing, config).unwrap();
        let outcome = minimizer.run().unwrap();
        assert_eq!(outcome.removed, vec![CandidateId(3)]);
    }
}
