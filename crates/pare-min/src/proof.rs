//! Proof-block reduction for calc statements.
//!
//! A calc that cannot go as a whole is thinned out: interior lines are
//! dropped one at a time (the neighbouring connectors fused), then hints are
//! cleared one at a time. The first and last lines always stay.

use crate::candidate::{CandidateId, CandidateKind};
use crate::error::MinimizeResult;
use crate::minimizer::{Minimizer, Status};
use pare_oracle::Oracle;
use pare_syntax::{Calc, CalcOp, CalcStep, Expr, StmtKind};
use tracing::debug;

/// What was cut out of a calc that had to stay.
#[derive(Debug, Clone, PartialEq)]
pub struct ProofBlockEdit {
    pub candidate: CandidateId,
    pub removed_lines: Vec<Expr>,
    pub cleared_hints: usize,
}

impl ProofBlockEdit {
    pub fn is_empty(&self) -> bool {
        self.removed_lines.is_empty() && self.cleared_hints == 0
    }
}

/// An interior line taken out of a calc, with what is needed to put it back.
#[derive(Debug)]
struct LineRemoval {
    index: usize,
    line: Expr,
    step: CalcStep,
    previous_op: CalcOp,
}

/// Drop line `index` and the step after it, relating line `index - 1`
/// directly to line `index + 1`. `None` if the line is an anchor or the two
/// connectors do not compose.
fn remove_line(calc: &mut Calc, index: usize) -> Option<LineRemoval> {
    if index == 0 || index + 1 >= calc.lines.len() {
        return None;
    }
    let previous_op = calc.steps[index - 1].op;
    let fused = previous_op.compose(calc.steps[index].op)?;
    let line = calc.lines.remove(index);
    let step = calc.steps.remove(index);
    calc.steps[index - 1].op = fused;
    Some(LineRemoval {
        index,
        line,
        step,
        previous_op,
    })
}

fn restore_line(calc: &mut Calc, removal: LineRemoval) {
    calc.steps[removal.index - 1].op = removal.previous_op;
    calc.steps.insert(removal.index, removal.step);
    calc.lines.insert(removal.index, removal.line);
}

impl<O: Oracle> Minimizer<O> {
    pub(crate) fn run_proof_block_pass(&mut self) -> MinimizeResult<()> {
        let blocks: Vec<CandidateId> = self
            .inventory
            .of_kind(CandidateKind::ProofBlock)
            .map(|c| c.id)
            .collect();
        if blocks.is_empty() {
            return Ok(());
        }
        debug!(calcs = blocks.len(), "proof-block pass");
        for id in blocks {
            if self.should_stop() {
                return Ok(());
            }
            let scope = self.inventory.get(id).scope();
            if self.is_aborted(scope) || self.status(id) == Status::Removed {
                continue;
            }
            if self.status(id) == Status::Untried {
                let result = self.try_remove(id);
                match self.contain(scope, result)? {
                    Some(false) => {}
                    _ => continue,
                }
            }
            let result = self.reduce_calc(id);
            if let Some(edit) = self.contain(scope, result)? {
                if !edit.is_empty() {
                    debug!(
                        candidate = %id,
                        lines = edit.removed_lines.len(),
                        hints = edit.cleared_hints,
                        "calc reduced"
                    );
                    self.proof_edits.push(edit);
                }
            }
        }
        Ok(())
    }

    fn calc_mut(&mut self, id: CandidateId) -> MinimizeResult<&mut Calc> {
        let Self {
            program, inventory, ..
        } = self;
        let location = inventory.get(id).location;
        let found = program
            .scope_mut(location.scope)
            .find_stmt_mut(location.node)
            .map(|stmt| &mut stmt.kind);
        match found {
            Some(StmtKind::Calc(calc)) => Ok(calc),
            _ => Err(inventory.inconsistency(id)),
        }
    }

    fn reduce_calc(&mut self, id: CandidateId) -> MinimizeResult<ProofBlockEdit> {
        let mut edit = ProofBlockEdit {
            candidate: id,
            removed_lines: Vec::new(),
            cleared_hints: 0,
        };

        let mut index = 1;
        while index + 1 < self.calc_mut(id)?.lines.len() {
            if self.should_stop() {
                return Ok(edit);
            }
            let Some(removal) = remove_line(self.calc_mut(id)?, index) else {
                index += 1;
                continue;
            };
            if self.verify() {
                edit.removed_lines.push(removal.line);
            } else {
                restore_line(self.calc_mut(id)?, removal);
                index += 1;
            }
        }

        let steps = self.calc_mut(id)?.steps.len();
        for step in 0..steps {
            if self.should_stop() {
                break;
            }
            let hint = std::mem::take(&mut self.calc_mut(id)?.steps[step].hint.stmts);
            if hint.is_empty() {
                continue;
            }
            if self.verify() {
                edit.cleared_hints += 1;
            } else {
                self.calc_mut(id)?.steps[step].hint.stmts = hint;
            }
        }
        Ok(edit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::minimizer::{MinimizeConfig, Strategy};
    use pare_oracle::OracleConfig;
    use pare_syntax::{Block, Program, Scope, Stmt};

    fn ident(name: &str) -> Expr {
        Expr::ident(name)
    }

    #[test]
    fn test_remove_line_fuses_connectors() {
        let mut calc = Calc::chain(CalcOp::Eq, vec![ident("a"), ident("b"), ident("c")]);
        calc.steps[1].op = CalcOp::Lt;
        let original = calc.clone();

        assert!(remove_line(&mut calc, 0).is_none());
        assert!(remove_line(&mut calc, 2).is_none());

        let removal = remove_line(&mut calc, 1).unwrap();
        assert_eq!(calc.lines, vec![ident("a"), ident("c")]);
        assert_eq!(calc.steps.len(), 1);
        assert_eq!(calc.steps[0].op, CalcOp::Lt);

        restore_line(&mut calc, removal);
        assert_eq!(calc, original);
    }

    #[test]
    fn test_remove_line_refuses_incompatible_connectors() {
        let mut calc = Calc::chain(CalcOp::Lt, vec![ident("a"), ident("b"), ident("c")]);
        calc.steps[1].op = CalcOp::Gt;
        assert!(remove_line(&mut calc, 1).is_none());
        assert_eq!(calc.lines.len(), 3);
    }

    /// Verifies while the calc keeps line `b` and the hint on its first
    /// step, and always needs the calc itself.
    struct NeedsB;

    impl Oracle for NeedsB {
        fn validate(&self, program: &Program, _: &OracleConfig) -> bool {
            program.scopes[0].body.stmts.iter().any(|s| match &s.kind {
                StmtKind::Calc(calc) => {
                    calc.lines.contains(&ident("b"))
                        && calc
                            .steps
                            .first()
                            .is_some_and(|step| !step.hint.is_empty())
                }
                _ => false,
            })
        }
    }

    #[test]
    fn test_calc_is_thinned_not_removed() {
        let mut calc = Calc::chain(
            CalcOp::Eq,
            vec![ident("a"), ident("b"), ident("x"), ident("y"), ident("z")],
        );
        calc.steps[0].hint = Block::new(vec![Stmt::lemma("Needed", vec![])]);
        calc.steps[1].hint = Block::new(vec![Stmt::lemma("Useless", vec![])]);
        calc.steps[2].hint = Block::new(vec![Stmt::lemma("GoesWithX", vec![])]);
        let program = Program::new("p", "", vec![Scope::new("M", vec![Stmt::calc(calc)])]);
        let config = MinimizeConfig {
            strategy: Strategy::AllKinds,
            ..MinimizeConfig::default()
        };
        let mut minimizer = Minimizer::new(program, NeedsB, config).unwrap();
        let outcome = minimizer.run().unwrap();

        assert!(outcome.removed.is_empty());
        assert_eq!(outcome.proof_edits.len(), 1);
        let edit = &outcome.proof_edits[0];
        assert_eq!(edit.removed_lines, vec![ident("x"), ident("y")]);
        assert_eq!(edit.cleared_hints, 1);

        let StmtKind::Calc(calc) = &minimizer.program().scopes[0].body.stmts[0].kind else {
            panic!("calc should remain");
        };
        assert_eq!(calc.lines, vec![ident("a"), ident("b"), ident("z")]);
        assert!(!calc.steps[0].hint.is_empty());
        assert!(calc.steps[1].hint.is_empty());
    }
}
