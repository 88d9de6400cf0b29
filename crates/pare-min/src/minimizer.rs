//! Minimization session: owns the program, its inventory and the oracle, and
//! runs one of the removal strategies over them.

use crate::candidate::{CandidateId, Detached, KindSet};
use crate::error::{MinimizeError, MinimizeResult};
use crate::explore::OrderStudy;
use crate::inventory::Inventory;
use crate::proof::ProofBlockEdit;
use crate::simplify::SimplificationResult;
use pare_oracle::{Oracle, OracleConfig, Verdict};
use pare_syntax::{Program, ScopeId};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, trace, warn};

/// Which removal procedure a session runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    /// One candidate at a time, one oracle call each.
    Sequential,
    /// Per kind, one candidate from every scope per oracle call.
    #[default]
    Batched,
    /// All kinds in one batched pass, then wildcards, proof blocks and
    /// conjunction simplification.
    AllKinds,
    /// Enumerate maximal removal sets per scope; leaves the program as is.
    Explore,
}

impl Strategy {
    pub const ALL: [Strategy; 4] = [
        Strategy::Sequential,
        Strategy::Batched,
        Strategy::AllKinds,
        Strategy::Explore,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Strategy::Sequential => "sequential",
            Strategy::Batched => "batched",
            Strategy::AllKinds => "all-kinds",
            Strategy::Explore => "explore",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Strategy::ALL
            .into_iter()
            .find(|k| k.name() == s)
            .ok_or_else(|| format!("unknown strategy '{}'", s))
    }
}

/// Session configuration.
#[derive(Debug, Clone)]
pub struct MinimizeConfig {
    pub strategy: Strategy,
    /// Kinds the sequential, batched and exploring strategies consider.
    pub kinds: KindSet,
    /// Run the conjunction simplifier at the end of [`Strategy::AllKinds`].
    pub simplify_conjunctions: bool,
    /// Largest scope (in candidates) [`Strategy::Explore`] will search.
    pub explore_limit: usize,
    pub oracle: OracleConfig,
}

impl Default for MinimizeConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            kinds: KindSet::all(),
            simplify_conjunctions: true,
            explore_limit: 12,
            oracle: OracleConfig::default(),
        }
    }
}

/// Where a candidate stands in the current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Untried,
    Removed,
    Retained,
}

/// Counters for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    pub oracle_calls: usize,
    pub rounds: usize,
    pub localization_failures: usize,
    /// The stop flag was raised before the strategy finished.
    pub stopped: bool,
}

/// What a strategy run did.
#[derive(Debug, Clone, Default)]
pub struct MinimizeOutcome {
    pub strategy: Strategy,
    /// Removed candidates, in the order they were removed.
    pub removed: Vec<CandidateId>,
    pub simplifications: Vec<SimplificationResult>,
    pub proof_edits: Vec<ProofBlockEdit>,
    pub studies: Vec<OrderStudy>,
    pub stats: RunStats,
    /// Scope-local errors; the scopes they name were left as they were at
    /// the time of the error.
    pub errors: Vec<MinimizeError>,
}

/// A minimization session over one program.
pub struct Minimizer<O: Oracle> {
    pub(crate) program: Program,
    pub(crate) oracle: O,
    pub(crate) config: MinimizeConfig,
    pub(crate) inventory: Inventory,
    pub(crate) status: Vec<Status>,
    pub(crate) removed: Vec<CandidateId>,
    pub(crate) simplifications: Vec<SimplificationResult>,
    pub(crate) proof_edits: Vec<ProofBlockEdit>,
    pub(crate) studies: Vec<OrderStudy>,
    pub(crate) stats: RunStats,
    pub(crate) errors: Vec<MinimizeError>,
    aborted: BTreeSet<ScopeId>,
    stop_flag: Option<Arc<AtomicBool>>,
}

impl<O: Oracle> Minimizer<O> {
    /// Start a session. Fails with [`MinimizeError::NotValid`] if the program
    /// does not verify as given.
    pub fn new(program: Program, oracle: O, config: MinimizeConfig) -> MinimizeResult<Self> {
        let inventory = Inventory::scan(&program);
        let mut minimizer = Self {
            status: vec![Status::Untried; inventory.len()],
            program,
            oracle,
            config,
            inventory,
            removed: Vec::new(),
            simplifications: Vec::new(),
            proof_edits: Vec::new(),
            studies: Vec::new(),
            stats: RunStats::default(),
            errors: Vec::new(),
            aborted: BTreeSet::new(),
            stop_flag: None,
        };
        if !minimizer.verify() {
            return Err(MinimizeError::NotValid {
                program: minimizer.program.name.clone(),
            });
        }
        debug!(
            program = %minimizer.program.name,
            scopes = minimizer.inventory.scopes.len(),
            candidates = minimizer.inventory.len(),
            wildcards = minimizer.inventory.wildcards.len(),
            "inventory built"
        );
        Ok(minimizer)
    }

    /// Set a flag that, when raised, makes the running strategy return after
    /// its current step.
    pub fn set_stop_flag(&mut self, flag: Arc<AtomicBool>) {
        self.stop_flag = Some(flag);
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn into_program(self) -> Program {
        self.program
    }

    pub fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    pub fn config(&self) -> &MinimizeConfig {
        &self.config
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    pub fn status(&self, id: CandidateId) -> Status {
        self.status[id.0]
    }

    /// Run the configured strategy.
    pub fn run(&mut self) -> MinimizeResult<MinimizeOutcome> {
        let strategy = self.config.strategy;
        info!(
            program = %self.program.name,
            %strategy,
            candidates = self.inventory.len(),
            "minimizing"
        );
        let start = Instant::now();

        match strategy {
            Strategy::Sequential => self.run_sequential()?,
            Strategy::Batched => self.run_batched()?,
            Strategy::AllKinds => self.run_all_kinds()?,
            Strategy::Explore => self.run_explore()?,
        }

        info!(
            program = %self.program.name,
            removed = self.removed.len(),
            simplified = self.simplifications.len(),
            oracle_calls = self.stats.oracle_calls,
            elapsed_ms = start.elapsed().as_millis() as u64,
            stopped = self.stats.stopped,
            "minimization finished"
        );
        Ok(MinimizeOutcome {
            strategy,
            removed: self.removed.clone(),
            simplifications: std::mem::take(&mut self.simplifications),
            proof_edits: std::mem::take(&mut self.proof_edits),
            studies: std::mem::take(&mut self.studies),
            stats: self.stats.clone(),
            errors: std::mem::take(&mut self.errors),
        })
    }

    pub(crate) fn should_stop(&mut self) -> bool {
        let raised = self
            .stop_flag
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed));
        if raised && !self.stats.stopped {
            info!("stop requested, returning partial result");
            self.stats.stopped = true;
        }
        raised
    }

    /// One `validate` call on the current program.
    pub(crate) fn verify(&mut self) -> bool {
        self.stats.oracle_calls += 1;
        let verified = self.oracle.validate(&self.program, &self.config.oracle);
        trace!(call = self.stats.oracle_calls, verified, "validate");
        verified
    }

    /// One `diagnose` call on the current program.
    pub(crate) fn diagnose(&mut self) -> Verdict {
        self.stats.oracle_calls += 1;
        let verdict = self.oracle.diagnose(&self.program, &self.config.oracle);
        trace!(
            call = self.stats.oracle_calls,
            verified = verdict.is_verified(),
            "diagnose"
        );
        verdict
    }

    /// Take a candidate out of the program.
    pub(crate) fn detach(&mut self, id: CandidateId) -> MinimizeResult<Detached> {
        let location = self.inventory.get(id).location;
        location
            .detach(&mut self.program)
            .ok_or_else(|| self.inventory.inconsistency(id))
    }

    /// Put a detached candidate back where it was.
    pub(crate) fn reattach(&mut self, id: CandidateId, detached: Detached) -> MinimizeResult<()> {
        detached.reattach(&mut self.program).map_err(|d| {
            let candidate = self.inventory.get(id);
            MinimizeError::Reinsertion {
                candidate: id,
                kind: candidate.kind,
                index: d.index,
                scope: self.inventory.scope(candidate.scope()).name.clone(),
            }
        })
    }

    pub(crate) fn mark_removed(&mut self, id: CandidateId) {
        self.status[id.0] = Status::Removed;
        self.removed.push(id);
        let candidate = self.inventory.get(id);
        debug!(candidate = %id, kind = %candidate.kind, label = %candidate.label, "removed");
    }

    pub(crate) fn mark_retained(&mut self, id: CandidateId) {
        self.status[id.0] = Status::Retained;
        let candidate = self.inventory.get(id);
        debug!(candidate = %id, kind = %candidate.kind, label = %candidate.label, "retained");
    }

    /// Remove one candidate and keep the removal only if the program still
    /// verifies. Returns whether it was removed.
    pub fn try_remove(&mut self, id: CandidateId) -> MinimizeResult<bool> {
        let detached = self.detach(id)?;
        if self.verify() {
            self.mark_removed(id);
            Ok(true)
        } else {
            self.reattach(id, detached)?;
            self.mark_retained(id);
            Ok(false)
        }
    }

    pub(crate) fn is_aborted(&self, scope: ScopeId) -> bool {
        self.aborted.contains(&scope)
    }

    /// Stop all further work on `scope`.
    pub(crate) fn abort_scope(&mut self, scope: ScopeId, error: MinimizeError) {
        warn!(scope = %self.program.scope(scope).name, %error, "abandoning scope");
        self.aborted.insert(scope);
        self.errors.push(error);
    }

    /// Scope-local errors abort their scope; anything else propagates.
    pub(crate) fn contain<T>(
        &mut self,
        scope: ScopeId,
        result: MinimizeResult<T>,
    ) -> MinimizeResult<Option<T>> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(error) if error.is_scope_local() => {
                self.abort_scope(scope, error);
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }
}
