//! Order exploration.
//!
//! Sequential removal keeps whichever candidates happen to come first. This
//! search walks every removal order of a scope depth-first to find all the
//! maximal removable sets instead. It is exponential and only meant for small
//! scopes; the program is left exactly as it was found.

use crate::candidate::CandidateId;
use crate::error::MinimizeResult;
use crate::minimizer::Minimizer;
use pare_oracle::Oracle;
use pare_syntax::ScopeId;
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Removal sets found for one scope.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderStudy {
    pub scope: ScopeId,
    /// The candidates searched over, in source order.
    pub candidates: Vec<CandidateId>,
    /// Distinct maximal removal sets, each in source order.
    pub solutions: Vec<Vec<CandidateId>>,
    /// The scope had more candidates than the search limit allows.
    pub skipped: bool,
}

impl OrderStudy {
    /// Size of the largest solution.
    pub fn best(&self) -> usize {
        self.solutions.iter().map(Vec::len).max().unwrap_or(0)
    }
}

/// Keep only sets that are not strictly contained in another, dropping
/// duplicates. Order of first appearance is preserved.
pub fn maximal(solutions: Vec<Vec<CandidateId>>) -> Vec<Vec<CandidateId>> {
    let sets: Vec<BTreeSet<CandidateId>> = solutions
        .iter()
        .map(|s| s.iter().copied().collect())
        .collect();
    let mut seen: Vec<&BTreeSet<CandidateId>> = Vec::new();
    let mut out = Vec::new();
    for (solution, set) in solutions.iter().zip(&sets) {
        if seen.contains(&set) {
            continue;
        }
        let dominated = sets
            .iter()
            .any(|other| other.len() > set.len() && set.is_subset(other));
        if !dominated {
            seen.push(set);
            out.push(solution.clone());
        }
    }
    out
}

impl<O: Oracle> Minimizer<O> {
    pub(crate) fn run_explore(&mut self) -> MinimizeResult<()> {
        let kinds = self.config.kinds;
        for index in 0..self.inventory.scopes.len() {
            let scope = ScopeId(index);
            let list = self.inventory.scope(scope).collect(kinds);
            if list.is_empty() {
                continue;
            }
            if self.should_stop() {
                return Ok(());
            }
            if list.len() > self.config.explore_limit {
                warn!(
                    scope = %self.inventory.scope(scope).name,
                    candidates = list.len(),
                    limit = self.config.explore_limit,
                    "scope too large to explore, skipping"
                );
                self.studies.push(OrderStudy {
                    scope,
                    candidates: list,
                    solutions: Vec::new(),
                    skipped: true,
                });
                continue;
            }
            let result = self.explore_scope(scope, list);
            if let Some(study) = self.contain(scope, result)? {
                self.studies.push(study);
            }
        }
        Ok(())
    }

    /// Enumerate the maximal removable subsets of `list`.
    pub fn explore_scope(
        &mut self,
        scope: ScopeId,
        list: Vec<CandidateId>,
    ) -> MinimizeResult<OrderStudy> {
        let mut found = Vec::new();
        let mut path = Vec::new();
        let mut complete = false;
        self.explore_from(&list, 0, &mut path, &mut found, &mut complete)?;
        let solutions = maximal(found);
        debug!(
            scope = %self.inventory.scope(scope).name,
            candidates = list.len(),
            solutions = solutions.len(),
            "scope explored"
        );
        Ok(OrderStudy {
            scope,
            candidates: list,
            solutions,
            skipped: false,
        })
    }

    fn explore_from(
        &mut self,
        list: &[CandidateId],
        next: usize,
        path: &mut Vec<CandidateId>,
        found: &mut Vec<Vec<CandidateId>>,
        complete: &mut bool,
    ) -> MinimizeResult<()> {
        if *complete {
            return Ok(());
        }
        if next == list.len() {
            if path.len() == list.len() {
                *complete = true;
            }
            found.push(path.clone());
            return Ok(());
        }
        if self.should_stop() {
            return Ok(());
        }

        let id = list[next];
        let detached = self.detach(id)?;
        if self.verify() {
            path.push(id);
            let kept = self.explore_from(list, next + 1, path, found, complete);
            path.pop();
            self.reattach(id, detached)?;
            kept?;
        } else {
            self.reattach(id, detached)?;
        }
        self.explore_from(list, next + 1, path, found, complete)
    }
}
