//! Conjunction simplification.
//!
//! An assert or invariant of the form `c1 && c2 && ...` that has to stay may
//! still carry conjuncts nobody needs. The candidate is split into one item
//! per conjunct, the conjuncts are removed one at a time, and the survivors
//! are joined back under the candidate's own node id.

use crate::candidate::{CandidateId, CandidateKind, Item, Location};
use crate::error::{MinimizeError, MinimizeResult};
use crate::minimizer::{Minimizer, Status};
use pare_oracle::Oracle;
use pare_syntax::{BinOp, Expr};
use tracing::debug;

/// A candidate whose payload was replaced by a weaker conjunction.
#[derive(Debug, Clone, PartialEq)]
pub struct SimplificationResult {
    pub candidate: CandidateId,
    pub original: Expr,
    pub replacement: Expr,
    /// Conjuncts dropped, in source order.
    pub dropped: Vec<Expr>,
}

/// How a simplification attempt ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Simplification {
    /// Not an assert or invariant with a top-level conjunction.
    NotConjunction,
    /// The candidate could go entirely; it has been removed.
    Redundant,
    /// Every conjunct is needed; the candidate is unchanged.
    Required,
    Simplified(SimplificationResult),
}

/// Leaves of the top-level `&&` tree, left to right.
pub fn conjuncts(expr: &Expr) -> Vec<&Expr> {
    match expr {
        Expr::Binary {
            op: BinOp::And,
            left,
            right,
        } => {
            let mut leaves = conjuncts(left);
            leaves.extend(conjuncts(right));
            leaves
        }
        _ => vec![expr],
    }
}

/// `c1 && (c2 && (... && cn))`, or `None` for no conjuncts.
pub fn conjoin(exprs: Vec<Expr>) -> Option<Expr> {
    exprs.into_iter().rev().reduce(|right, left| Expr::and(left, right))
}

impl<O: Oracle> Minimizer<O> {
    /// Simplify one assert or invariant candidate, trying whole removal
    /// first.
    pub fn simplify(&mut self, id: CandidateId) -> MinimizeResult<Simplification> {
        self.simplify_candidate(id, false)
    }

    pub(crate) fn run_simplification_pass(&mut self) -> MinimizeResult<()> {
        let targets: Vec<CandidateId> = self
            .inventory
            .candidates
            .iter()
            .filter(|c| matches!(c.kind, CandidateKind::Assert | CandidateKind::Invariant))
            .filter(|c| self.config.kinds.contains(c.kind))
            .filter(|c| is_conjunction(&c.payload))
            .map(|c| c.id)
            .collect();
        if targets.is_empty() {
            return Ok(());
        }
        debug!(candidates = targets.len(), "simplification pass");
        for id in targets {
            if self.should_stop() {
                return Ok(());
            }
            let scope = self.inventory.get(id).scope();
            if self.is_aborted(scope) || self.status(id) == Status::Removed {
                continue;
            }
            let known_required = self.status(id) == Status::Retained;
            let result = self.simplify_candidate(id, known_required);
            if let Some(Simplification::Simplified(result)) = self.contain(scope, result)? {
                self.simplifications.push(result);
            }
        }
        Ok(())
    }

    pub(crate) fn simplify_candidate(
        &mut self,
        id: CandidateId,
        known_required: bool,
    ) -> MinimizeResult<Simplification> {
        let candidate = self.inventory.get(id);
        let location = candidate.location;
        if !matches!(candidate.kind, CandidateKind::Assert | CandidateKind::Invariant) {
            return Ok(Simplification::NotConjunction);
        }
        let Some(rebuild) = candidate.kind.rebuilder() else {
            return Ok(Simplification::NotConjunction);
        };
        if self.status(id) == Status::Removed {
            return Ok(Simplification::Redundant);
        }

        let current = location
            .item(&self.program)
            .ok_or_else(|| self.inventory.inconsistency(id))?;
        let Some(original) = current.expr().cloned() else {
            return Ok(Simplification::NotConjunction);
        };
        let leaves: Vec<Expr> = conjuncts(&original).into_iter().cloned().collect();
        if leaves.len() < 2 {
            return Ok(Simplification::NotConjunction);
        }

        if !known_required && self.try_remove(id)? {
            return Ok(Simplification::Redundant);
        }

        // Split: the candidate's slot now holds one item per conjunct.
        let detached = self.detach(id)?;
        let span = detached.item.span();
        let mut slots: Vec<Location> = Vec::with_capacity(leaves.len());
        for (offset, leaf) in leaves.iter().enumerate() {
            let slot = location.sibling(self.program.fresh_id());
            let item = rebuild(slot.node, span, leaf.clone());
            if slot
                .insert(&mut self.program, detached.index + offset, item)
                .is_err()
            {
                return Err(self.reinsertion(id, detached.index + offset));
            }
            slots.push(slot);
        }

        let mut survivors = Vec::new();
        let mut dropped = Vec::new();
        for (slot, leaf) in slots.iter().zip(leaves) {
            if self.should_stop() {
                survivors.push((*slot, leaf));
                continue;
            }
            let removed = slot
                .detach(&mut self.program)
                .ok_or_else(|| self.inventory.inconsistency(id))?;
            if self.verify() {
                dropped.push(leaf);
            } else {
                let index = removed.index;
                if removed.reattach(&mut self.program).is_err() {
                    return Err(self.reinsertion(id, index));
                }
                survivors.push((*slot, leaf));
            }
        }

        if survivors.is_empty() {
            self.mark_removed(id);
            debug!(candidate = %id, "every conjunct redundant");
            return Ok(Simplification::Redundant);
        }

        // Join: take the surviving conjuncts out again and put one item back.
        for (slot, _) in survivors.iter().rev() {
            slot.detach(&mut self.program)
                .ok_or_else(|| self.inventory.inconsistency(id))?;
        }
        if dropped.is_empty() {
            self.reattach(id, detached)?;
            return Ok(Simplification::Required);
        }

        let kept: Vec<Expr> = survivors.into_iter().map(|(_, leaf)| leaf).collect();
        let replacement = conjoin(kept).ok_or_else(|| self.inventory.inconsistency(id))?;
        let index = detached.index;
        let joined = rebuild(location.node, span, replacement.clone());
        if location.insert(&mut self.program, index, joined).is_err() {
            return Err(self.reinsertion(id, index));
        }
        if self.verify() {
            debug!(candidate = %id, dropped = dropped.len(), "conjunction weakened");
            return Ok(Simplification::Simplified(SimplificationResult {
                candidate: id,
                original,
                replacement,
                dropped,
            }));
        }

        debug!(candidate = %id, "weakened conjunction does not verify, restoring");
        location
            .detach(&mut self.program)
            .ok_or_else(|| self.inventory.inconsistency(id))?;
        self.reattach(id, detached)?;
        Ok(Simplification::Required)
    }

    fn reinsertion(&self, id: CandidateId, index: usize) -> MinimizeError {
        let candidate = self.inventory.get(id);
        MinimizeError::Reinsertion {
            candidate: id,
            kind: candidate.kind,
            index,
            scope: self.inventory.scope(candidate.scope()).name.clone(),
        }
    }
}

/// Whether `item` is a conjunction worth splitting.
pub fn is_conjunction(item: &Item) -> bool {
    item.expr().is_some_and(|e| conjuncts(e).len() > 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::minimizer::MinimizeConfig;
    use pare_oracle::OracleConfig;
    use pare_syntax::{Program, Scope, Stmt, StmtKind};
    use std::collections::HashSet;

    fn ident(name: &str) -> Expr {
        Expr::ident(name)
    }

    /// Verifies iff every atom in `needed` occurs as a conjunct of some
    /// top-level assert.
    struct Needs(HashSet<&'static str>);

    impl Oracle for Needs {
        fn validate(&self, program: &Program, _: &OracleConfig) -> bool {
            let present: HashSet<Expr> = program.scopes[0]
                .body
                .stmts
                .iter()
                .filter_map(|s| match &s.kind {
                    StmtKind::Assert(e) => {
                        Some(conjuncts(e).into_iter().cloned().collect::<Vec<_>>())
                    }
                    _ => None,
                })
                .flatten()
                .collect();
            self.0.iter().all(|atom| present.contains(&ident(atom)))
        }
    }

    fn session(asserted: Expr, needed: &[&'static str]) -> Minimizer<Needs> {
        let program = Program::new(
            "p",
            "",
            vec![Scope::new(
                "M",
                vec![
                    Stmt::assert(ident("pre")),
                    Stmt::assert(asserted),
                    Stmt::assert(ident("post")),
                ],
            )],
        );
        let oracle = Needs(needed.iter().copied().collect());
        Minimizer::new(program, oracle, MinimizeConfig::default()).unwrap()
    }

    #[test]
    fn test_conjuncts_and_conjoin() {
        let expr = Expr::and(Expr::and(ident("a"), ident("b")), ident("c"));
        let leaves: Vec<Expr> = conjuncts(&expr).into_iter().cloned().collect();
        assert_eq!(leaves, vec![ident("a"), ident("b"), ident("c")]);
        assert_eq!(
            conjoin(leaves),
            Some(Expr::and(ident("a"), Expr::and(ident("b"), ident("c"))))
        );
        assert_eq!(conjoin(vec![]), None);
        assert_eq!(conjoin(vec![ident("x")]), Some(ident("x")));
    }

    #[test]
    fn test_drops_unneeded_conjunct() {
        let mut minimizer = session(Expr::and(ident("X"), ident("Y")), &["X"]);
        let before = minimizer.program().clone();
        let result = minimizer.simplify(crate::CandidateId(1)).unwrap();

        let Simplification::Simplified(result) = result else {
            panic!("expected a simplification, got {:?}", result);
        };
        assert_eq!(result.replacement, ident("X"));
        assert_eq!(result.dropped, vec![ident("Y")]);

        let stmts = &minimizer.program().scopes[0].body.stmts;
        assert_eq!(stmts.len(), 3);
        assert_eq!(stmts[1].kind, StmtKind::Assert(ident("X")));
        assert_eq!(stmts[1].id, before.scopes[0].body.stmts[1].id);
    }

    #[test]
    fn test_whole_removal_wins_when_possible() {
        let mut minimizer = session(Expr::and(ident("X"), ident("Y")), &[]);
        assert_eq!(
            minimizer.simplify(crate::CandidateId(1)).unwrap(),
            Simplification::Redundant
        );
        assert_eq!(minimizer.program().scopes[0].body.stmts.len(), 2);
    }

    #[test]
    fn test_all_conjuncts_needed_restores_original() {
        let mut minimizer = session(Expr::and(ident("X"), ident("Y")), &["X", "Y"]);
        let before = minimizer.program().clone();
        assert_eq!(
            minimizer.simplify(crate::CandidateId(1)).unwrap(),
            Simplification::Required
        );
        assert_eq!(minimizer.program(), &before);
    }

    #[test]
    fn test_keeps_source_order_of_survivors() {
        let expr = Expr::and(ident("A"), Expr::and(ident("B"), Expr::and(ident("C"), ident("D"))));
        let mut minimizer = session(expr, &["A", "C", "D"]);
        let Simplification::Simplified(result) = minimizer.simplify(crate::CandidateId(1)).unwrap()
        else {
            panic!("expected a simplification");
        };
        assert_eq!(
            result.replacement,
            Expr::and(ident("A"), Expr::and(ident("C"), ident("D")))
        );
    }

    #[test]
    fn test_plain_assert_is_not_a_conjunction() {
        let mut minimizer = session(ident("X"), &["X"]);
        assert_eq!(
            minimizer.simplify(crate::CandidateId(1)).unwrap(),
            Simplification::NotConjunction
        );
        assert!(!is_conjunction(&minimizer.inventory().get(crate::CandidateId(1)).payload));
    }
}
