//! Simultaneous removal across scopes.
//!
//! Each round takes at most one candidate out of every scope and asks the
//! oracle once. Failures are attributed to scopes by position, and only the
//! removals of the failing scopes are undone. Anything that cannot be
//! attributed undoes the whole round.

use crate::candidate::{CandidateId, CandidateKind, Detached};
use crate::error::{MinimizeError, MinimizeResult};
use crate::minimizer::{Minimizer, Status};
use pare_oracle::{FailureLocation, Oracle, Verdict};
use pare_syntax::{Pos, ScopeId};
use std::collections::BTreeSet;
use tracing::{debug, warn};

type Pending = Vec<(CandidateId, Detached)>;

impl<O: Oracle> Minimizer<O> {
    pub(crate) fn run_batched(&mut self) -> MinimizeResult<()> {
        let kinds = self.config.kinds;
        for kind in kinds.regular() {
            let queues = self
                .inventory
                .scopes
                .iter()
                .map(|s| (s.scope, s.list(kind).to_vec()))
                .collect();
            debug!(%kind, "batched pass");
            self.run_rounds(queues)?;
            if self.stats.stopped {
                return Ok(());
            }
        }
        if kinds.contains(CandidateKind::DecreasesWildcard) {
            self.run_wildcard_pass()?;
        }
        Ok(())
    }

    /// One batched pass over every regular kind but proof blocks, followed
    /// by the wildcard, proof-block and simplification passes.
    pub(crate) fn run_all_kinds(&mut self) -> MinimizeResult<()> {
        let kinds = self.config.kinds;
        let joint = kinds.without(CandidateKind::ProofBlock);
        let queues = self
            .inventory
            .scopes
            .iter()
            .map(|s| (s.scope, s.collect(joint)))
            .collect();
        self.run_rounds(queues)?;

        if kinds.contains(CandidateKind::DecreasesWildcard) && !self.stats.stopped {
            self.run_wildcard_pass()?;
        }
        if kinds.contains(CandidateKind::ProofBlock) && !self.stats.stopped {
            self.run_proof_block_pass()?;
        }
        if self.config.simplify_conjunctions && !self.stats.stopped {
            self.run_simplification_pass()?;
        }
        Ok(())
    }

    /// Round `r` removes the `r`-th queued candidate of every scope that has
    /// one still untried.
    pub(crate) fn run_rounds(
        &mut self,
        queues: Vec<(ScopeId, Vec<CandidateId>)>,
    ) -> MinimizeResult<()> {
        let depth = queues.iter().map(|(_, q)| q.len()).max().unwrap_or(0);
        for round in 0..depth {
            if self.should_stop() {
                return Ok(());
            }
            let mut pending = Pending::new();
            for (scope, queue) in &queues {
                if self.is_aborted(*scope) {
                    continue;
                }
                let Some(&id) = queue.get(round) else {
                    continue;
                };
                if self.status(id) != Status::Untried {
                    continue;
                }
                let result = self.detach(id);
                if let Some(detached) = self.contain(*scope, result)? {
                    pending.push((id, detached));
                }
            }
            if pending.is_empty() {
                continue;
            }
            self.stats.rounds += 1;
            debug!(round, removals = pending.len(), "round");
            self.settle_round(round, pending)?;
        }
        Ok(())
    }

    fn settle_round(&mut self, round: usize, pending: Pending) -> MinimizeResult<()> {
        let failures = match self.diagnose() {
            Verdict::Verified => {
                for (id, _) in pending {
                    self.mark_removed(id);
                }
                return Ok(());
            }
            Verdict::Failed { failures } => failures,
        };

        let culprits = match self.localize(round, &failures, &pending) {
            Ok(culprits) => culprits,
            Err(error) => {
                warn!(%error, "reinserting every removal of the round");
                self.stats.localization_failures += 1;
                return self.restore_all(pending);
            }
        };

        let (failed, kept): (Pending, Pending) = pending
            .into_iter()
            .partition(|(_, d)| culprits.contains(&d.location.scope));
        self.restore_all(failed)?;
        if kept.is_empty() {
            return Ok(());
        }

        // Removals that survived attribution still have to hold together.
        if self.verify() {
            for (id, _) in kept {
                self.mark_removed(id);
            }
            Ok(())
        } else {
            debug!(round, removals = kept.len(), "confirmation failed");
            self.restore_all(kept)
        }
    }

    /// Scopes responsible for `failures`, each of which must have removed
    /// something this round.
    fn localize(
        &self,
        round: usize,
        failures: &[FailureLocation],
        pending: &[(CandidateId, Detached)],
    ) -> MinimizeResult<BTreeSet<ScopeId>> {
        let unlocalized = |detail: String| MinimizeError::DiagnosticLocalization { round, detail };
        if failures.is_empty() {
            return Err(unlocalized("verifier reported no failure locations".to_string()));
        }
        let mut culprits = BTreeSet::new();
        for failure in failures {
            match failure.position.and_then(|pos| self.owning_scope(pos)) {
                Some(scope) if pending.iter().any(|(_, d)| d.location.scope == scope) => {
                    culprits.insert(scope);
                }
                Some(scope) => {
                    return Err(unlocalized(format!(
                        "'{}' is in scope '{}', which removed nothing",
                        failure.message,
                        self.program.scope(scope).name
                    )));
                }
                None => {
                    return Err(unlocalized(format!(
                        "'{}' is outside every scope",
                        failure.message
                    )));
                }
            }
        }
        Ok(culprits)
    }

    /// The innermost scope whose span contains `pos`.
    fn owning_scope(&self, pos: Pos) -> Option<ScopeId> {
        self.program
            .scopes
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.span.is_dummy() && s.span.contains(pos))
            .min_by_key(|(_, s)| s.span.line_count())
            .map(|(i, _)| ScopeId(i))
    }

    fn restore_all(&mut self, pending: Pending) -> MinimizeResult<()> {
        for (id, detached) in pending.into_iter().rev() {
            self.reattach(id, detached)?;
            self.mark_retained(id);
        }
        Ok(())
    }
}
