use pare_min::{conjuncts, MinimizeConfig, MinimizeOutcome, MinimizeResult, Minimizer, Strategy};
use pare_oracle::{FailureLocation, Oracle, OracleConfig, Verdict};
use pare_syntax::{render_expr, Block, Calc, CalcOp, Expr, Loop, Program, Scope, Stmt, StmtKind};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};

/// The annotations present in one scope, as rendered atoms.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Facts {
    /// Conjuncts of every assert.
    pub asserts: BTreeSet<String>,
    /// Conjuncts of every loop invariant.
    pub invariants: BTreeSet<String>,
    /// Non-wildcard termination measures.
    pub decreases: BTreeSet<String>,
    /// Owners of each `decreases *`: `"method"` or the loop guard.
    pub wildcards: BTreeSet<String>,
    pub lemmas: BTreeSet<String>,
    pub calc_lines: BTreeSet<String>,
    /// Lemmas called inside calc hints.
    pub hints: BTreeSet<String>,
    pub calcs: usize,
}

impl Facts {
    pub fn of(scope: &Scope) -> Facts {
        let mut facts = Facts::default();
        for clause in &scope.decreases {
            if clause.expr.is_wildcard() {
                facts.wildcards.insert("method".to_string());
            } else {
                facts.decreases.insert(render_expr(&clause.expr));
            }
        }
        facts.collect(&scope.body);
        facts
    }

    fn collect(&mut self, block: &Block) {
        for stmt in &block.stmts {
            match &stmt.kind {
                StmtKind::Assert(e) => self.asserts.extend(atoms(e)),
                StmtKind::LemmaCall { lemma, .. } => {
                    self.lemmas.insert(lemma.clone());
                }
                StmtKind::While(lp) => {
                    for inv in &lp.invariants {
                        self.invariants.extend(atoms(&inv.expr));
                    }
                    for clause in &lp.decreases {
                        if clause.expr.is_wildcard() {
                            self.wildcards.insert(render_expr(&lp.guard));
                        } else {
                            self.decreases.insert(render_expr(&clause.expr));
                        }
                    }
                    self.collect(&lp.body);
                }
                StmtKind::If {
                    then_block,
                    else_block,
                    ..
                } => {
                    self.collect(then_block);
                    if let Some(else_block) = else_block {
                        self.collect(else_block);
                    }
                }
                StmtKind::Calc(calc) => {
                    self.calcs += 1;
                    self.calc_lines.extend(calc.lines.iter().map(render_expr));
                    for step in &calc.steps {
                        for hint in &step.hint.stmts {
                            if let StmtKind::LemmaCall { lemma, .. } = &hint.kind {
                                self.hints.insert(lemma.clone());
                            }
                        }
                    }
                }
                StmtKind::Assign { .. } | StmtKind::Var { .. } | StmtKind::Verbatim(_) => {}
            }
        }
    }

    /// Whether `atom` is an assert or invariant conjunct, a measure, a lemma
    /// call or a calc line.
    pub fn has(&self, atom: &str) -> bool {
        self.asserts.contains(atom)
            || self.invariants.contains(atom)
            || self.decreases.contains(atom)
            || self.lemmas.contains(atom)
            || self.calc_lines.contains(atom)
            || self.hints.contains(atom)
    }

    pub fn has_all(&self, atoms: &[&str]) -> bool {
        atoms.iter().all(|a| self.has(a))
    }

    /// Number of `atoms` present.
    pub fn count(&self, atoms: &[&str]) -> usize {
        atoms.iter().filter(|a| self.has(a)).count()
    }
}

fn atoms(expr: &Expr) -> Vec<String> {
    conjuncts(expr).into_iter().map(render_expr).collect()
}

type Rule = Box<dyn Fn(&Facts) -> bool>;

/// An oracle whose verdict is a rule per scope over the annotations present.
/// Scopes without a rule always verify. Every call is counted and the facts
/// it saw are recorded.
#[derive(Default)]
pub struct ScriptedOracle {
    rules: BTreeMap<String, Rule>,
    blind: bool,
    calls: Cell<usize>,
    history: RefCell<Vec<BTreeMap<String, Facts>>>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rule(mut self, scope: &str, rule: impl Fn(&Facts) -> bool + 'static) -> Self {
        self.rules.insert(scope.to_string(), Box::new(rule));
        self
    }

    /// `scope` verifies while all of `atoms` are present.
    pub fn requiring(self, scope: &str, atoms: &[&str]) -> Self {
        let atoms: Vec<String> = atoms.iter().map(|a| a.to_string()).collect();
        self.rule(scope, move |f| atoms.iter().all(|a| f.has(a)))
    }

    /// Report failures without positions, so nothing can be localized.
    pub fn blind(mut self) -> Self {
        self.blind = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }

    /// Facts per scope name at every call, in call order.
    pub fn history(&self) -> Vec<BTreeMap<String, Facts>> {
        self.history.borrow().clone()
    }

    fn failing<'p>(&self, program: &'p Program) -> Vec<&'p Scope> {
        self.calls.set(self.calls.get() + 1);
        let snapshot: BTreeMap<String, Facts> = program
            .scopes
            .iter()
            .map(|s| (s.name.clone(), Facts::of(s)))
            .collect();
        let failing = program
            .scopes
            .iter()
            .filter(|s| match self.rules.get(&s.name) {
                Some(rule) => !rule(&snapshot[&s.name]),
                None => false,
            })
            .collect();
        self.history.borrow_mut().push(snapshot);
        failing
    }
}

impl Oracle for ScriptedOracle {
    fn validate(&self, program: &Program, _: &OracleConfig) -> bool {
        self.failing(program).is_empty()
    }

    fn diagnose(&self, program: &Program, _: &OracleConfig) -> Verdict {
        let failing = self.failing(program);
        if failing.is_empty() {
            return Verdict::Verified;
        }
        let failures = if self.blind {
            Vec::new()
        } else {
            failing
                .iter()
                .map(|s| FailureLocation::at(s.span.start, format!("{} does not verify", s.name)))
                .collect()
        };
        Verdict::Failed { failures }
    }
}

pub fn assert_stmt(atom: &str) -> Stmt {
    Stmt::assert(Expr::ident(atom))
}

pub fn conjunction(atoms: &[&str]) -> Expr {
    atoms
        .iter()
        .rev()
        .map(|a| Expr::ident(*a))
        .reduce(|right, left| Expr::and(left, right))
        .unwrap_or(Expr::Bool(true))
}

/// One method whose body is a plain sequence of asserts.
pub fn asserts_scope(name: &str, atoms: &[&str]) -> Scope {
    Scope::new(name, atoms.iter().map(|a| assert_stmt(a)).collect())
}

/// Asserts followed by a loop carrying `invariants`.
pub fn loop_scope(name: &str, asserts: &[&str], invariants: &[&str]) -> Scope {
    let lp = Loop::new(Expr::ident(format!("{}_guard", name)), vec![]).with_invariants(
        invariants.iter().map(|i| Expr::ident(*i)).collect(),
    );
    let mut stmts: Vec<Stmt> = asserts.iter().map(|a| assert_stmt(a)).collect();
    stmts.push(Stmt::while_loop(lp));
    Scope::new(name, stmts)
}

/// Method `decreases *` around a loop guarded `P` holding two loops guarded
/// `C1` and `C2`, every one of them with `decreases *`.
pub fn wildcard_forest_scope(name: &str) -> Scope {
    let child = |guard: &str| {
        Stmt::while_loop(
            Loop::new(Expr::ident(guard), vec![]).with_decreases(vec![Expr::Wildcard]),
        )
    };
    let parent = Loop::new(Expr::ident("P"), vec![child("C1"), child("C2")])
        .with_decreases(vec![Expr::Wildcard]);
    Scope::new(name, vec![Stmt::while_loop(parent)]).with_decreases(vec![Expr::Wildcard])
}

/// A calc `lines[0] == lines[1] == ...` with a lemma hint named after each
/// step in `hints`.
pub fn calc_stmt(lines: &[&str], hints: &[(usize, &str)]) -> Stmt {
    let mut calc = Calc::chain(CalcOp::Eq, lines.iter().map(|l| Expr::ident(*l)).collect());
    for (step, lemma) in hints {
        calc.steps[*step].hint = Block::new(vec![Stmt::lemma(*lemma, vec![])]);
    }
    Stmt::calc(calc)
}

pub fn program(scopes: Vec<Scope>) -> Program {
    Program::new("scripted", "", scopes)
}

/// Run one strategy with default settings and return the resulting program.
pub fn minimize<O: Oracle>(
    program: Program,
    oracle: O,
    strategy: Strategy,
) -> MinimizeResult<(Program, MinimizeOutcome)> {
    let config = MinimizeConfig {
        strategy,
        ..MinimizeConfig::default()
    };
    let mut minimizer = Minimizer::new(program, oracle, config)?;
    let outcome = minimizer.run()?;
    Ok((minimizer.into_program(), outcome))
}

/// Labels of the removed candidates, sorted.
pub fn removed_labels<O: Oracle>(
    minimizer: &Minimizer<O>,
    outcome: &MinimizeOutcome,
) -> Vec<String> {
    let mut labels: Vec<String> = outcome
        .removed
        .iter()
        .map(|id| minimizer.inventory().get(*id).label.clone())
        .collect();
    labels.sort();
    labels
}
