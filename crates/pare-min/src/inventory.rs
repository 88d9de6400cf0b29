//! Candidate discovery.
//!
//! One traversal per scope, in source order: method-level decreases clauses,
//! then the body. Calc hint blocks are not scanned; they belong to the
//! proof-block pass. Wildcard measures are kept in a forest that mirrors loop
//! nesting rather than in the per-kind lists.

use crate::candidate::{Candidate, CandidateId, CandidateKind, Host, Item, KindSet, Location};
use crate::error::MinimizeError;
use pare_syntax::{Block, Clause, Program, ScopeId, StmtKind};
use std::collections::BTreeMap;

/// Everything removable in a program.
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    /// All candidates, indexed by [`CandidateId`].
    pub candidates: Vec<Candidate>,
    /// Per-scope lists, in scope order.
    pub scopes: Vec<ScopeInventory>,
    /// `decreases *` clauses and how they nest.
    pub wildcards: WildcardForest,
}

/// Candidates of one scope grouped by kind, each list in source order.
#[derive(Debug, Clone)]
pub struct ScopeInventory {
    pub scope: ScopeId,
    pub name: String,
    pub lists: BTreeMap<CandidateKind, Vec<CandidateId>>,
}

impl ScopeInventory {
    pub fn list(&self, kind: CandidateKind) -> &[CandidateId] {
        self.lists.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Candidates of all `kinds`, interleaved in source order.
    pub fn collect(&self, kinds: KindSet) -> Vec<CandidateId> {
        let mut ids: Vec<CandidateId> = kinds
            .regular()
            .flat_map(|k| self.list(k).iter().copied())
            .collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.lists.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Nesting of wildcard measures. A node's parent is the wildcard of the
/// innermost enclosing loop (or method) that has one.
#[derive(Debug, Clone, Default)]
pub struct WildcardForest {
    pub nodes: Vec<WildcardNode>,
}

#[derive(Debug, Clone)]
pub struct WildcardNode {
    pub candidate: CandidateId,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
}

impl WildcardForest {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn roots(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.nodes.len()).filter(|&i| self.nodes[i].parent.is_none())
    }

    /// Number of nodes in the subtree rooted at `node`.
    pub fn count(&self, node: usize) -> usize {
        1 + self.nodes[node]
            .children
            .iter()
            .map(|&c| self.count(c))
            .sum::<usize>()
    }

    /// Every node after all of its descendants, roots in source order.
    pub fn post_order(&self) -> Vec<usize> {
        fn visit(forest: &WildcardForest, node: usize, out: &mut Vec<usize>) {
            for &child in &forest.nodes[node].children {
                visit(forest, child, out);
            }
            out.push(node);
        }
        let mut out = Vec::with_capacity(self.nodes.len());
        for root in self.roots() {
            visit(self, root, &mut out);
        }
        out
    }

    fn add(&mut self, candidate: CandidateId, parent: Option<usize>) -> usize {
        let index = self.nodes.len();
        self.nodes.push(WildcardNode {
            candidate,
            parent,
            children: Vec::new(),
        });
        if let Some(p) = parent {
            self.nodes[p].children.push(index);
        }
        index
    }
}

impl Inventory {
    /// Enumerate every candidate of `program`.
    pub fn scan(program: &Program) -> Inventory {
        let mut scanner = Scanner {
            inventory: Inventory::default(),
            enclosing: Vec::new(),
        };
        for scope in program.scope_ids() {
            scanner.scan_scope(program, scope);
        }
        scanner.inventory
    }

    pub fn get(&self, id: CandidateId) -> &Candidate {
        &self.candidates[id.0]
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn scope(&self, scope: ScopeId) -> &ScopeInventory {
        &self.scopes[scope.0]
    }

    /// Candidates of one kind across all scopes, in source order.
    pub fn of_kind(&self, kind: CandidateKind) -> impl Iterator<Item = &Candidate> {
        self.candidates.iter().filter(move |c| c.kind == kind)
    }

    /// Wildcard candidates of one scope.
    pub fn wildcards_in(&self, scope: ScopeId) -> impl Iterator<Item = CandidateId> + '_ {
        self.wildcards
            .nodes
            .iter()
            .map(|n| n.candidate)
            .filter(move |&c| self.get(c).scope() == scope)
    }

    /// The error for a candidate that is no longer where it was inventoried.
    pub(crate) fn inconsistency(&self, id: CandidateId) -> MinimizeError {
        let candidate = self.get(id);
        MinimizeError::InventoryInconsistency {
            candidate: id,
            kind: candidate.kind,
            scope: self.scope(candidate.scope()).name.clone(),
        }
    }

    /// Number of candidates of `kind` in `scope`, wildcards included.
    pub fn count(&self, scope: ScopeId, kind: CandidateKind) -> usize {
        match kind {
            CandidateKind::DecreasesWildcard => self.wildcards_in(scope).count(),
            _ => self.scope(scope).list(kind).len(),
        }
    }
}

struct Scanner {
    inventory: Inventory,
    /// Forest nodes of the wildcard measures enclosing the current position.
    enclosing: Vec<usize>,
}

impl Scanner {
    fn scan_scope(&mut self, program: &Program, scope_id: ScopeId) {
        let scope = program.scope(scope_id);
        self.inventory.scopes.push(ScopeInventory {
            scope: scope_id,
            name: scope.name.clone(),
            lists: BTreeMap::new(),
        });
        self.enclosing.clear();

        let pushed = self.scan_decreases(scope_id, Host::ScopeDecreases, &scope.decreases);
        self.scan_block(scope_id, &scope.body);
        if pushed {
            self.enclosing.pop();
        }
    }

    /// Returns whether a wildcard node was pushed onto `enclosing`.
    fn scan_decreases(&mut self, scope: ScopeId, host: Host, clauses: &[Clause]) -> bool {
        let mut pushed = false;
        for clause in clauses {
            let location = Location {
                scope,
                host,
                node: clause.id,
            };
            let item = Item::Clause(clause.clone());
            if clause.expr.is_wildcard() {
                let id = self.add(CandidateKind::DecreasesWildcard, location, item);
                let parent = self.enclosing.last().copied();
                let node = self.inventory.wildcards.add(id, parent);
                if !pushed {
                    self.enclosing.push(node);
                    pushed = true;
                }
            } else {
                self.add(CandidateKind::DecreasesTerm, location, item);
            }
        }
        pushed
    }

    fn scan_block(&mut self, scope: ScopeId, block: &Block) {
        for stmt in &block.stmts {
            let location = Location {
                scope,
                host: Host::Block(block.id),
                node: stmt.id,
            };
            match &stmt.kind {
                StmtKind::Assert(_) => {
                    self.add(CandidateKind::Assert, location, Item::Stmt(stmt.clone()));
                }
                StmtKind::LemmaCall { .. } => {
                    self.add(CandidateKind::LemmaCall, location, Item::Stmt(stmt.clone()));
                }
                StmtKind::Calc(_) => {
                    self.add(CandidateKind::ProofBlock, location, Item::Stmt(stmt.clone()));
                }
                StmtKind::If {
                    then_block,
                    else_block,
                    ..
                } => {
                    self.scan_block(scope, then_block);
                    if let Some(else_block) = else_block {
                        self.scan_block(scope, else_block);
                    }
                }
                StmtKind::While(lp) => {
                    for clause in &lp.invariants {
                        let location = Location {
                            scope,
                            host: Host::Invariants(stmt.id),
                            node: clause.id,
                        };
                        self.add(CandidateKind::Invariant, location, Item::Clause(clause.clone()));
                    }
                    let pushed =
                        self.scan_decreases(scope, Host::Decreases(stmt.id), &lp.decreases);
                    self.scan_block(scope, &lp.body);
                    if pushed {
                        self.enclosing.pop();
                    }
                }
                StmtKind::Assign { .. } | StmtKind::Var { .. } | StmtKind::Verbatim(_) => {}
            }
        }
    }

    fn add(&mut self, kind: CandidateKind, location: Location, payload: Item) -> CandidateId {
        let id = CandidateId(self.inventory.candidates.len());
        let label = payload.label();
        self.inventory.candidates.push(Candidate {
            id,
            kind,
            location,
            payload,
            label,
        });
        if kind != CandidateKind::DecreasesWildcard {
            if let Some(scope) = self.inventory.scopes.last_mut() {
                scope.lists.entry(kind).or_default().push(id);
            }
        }
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pare_syntax::{Calc, CalcOp, Expr, Loop, Scope, Stmt};

    fn nested_loops() -> Program {
        let inner1 = Loop::new(Expr::ident("g1"), vec![Stmt::assert(Expr::ident("in1"))])
            .with_decreases(vec![Expr::Wildcard]);
        let inner2 = Loop::new(Expr::ident("g2"), vec![])
            .with_invariants(vec![Expr::ident("J")])
            .with_decreases(vec![Expr::Wildcard]);
        let outer = Loop::new(
            Expr::ident("g"),
            vec![Stmt::while_loop(inner1), Stmt::while_loop(inner2)],
        )
        .with_invariants(vec![Expr::ident("I")])
        .with_decreases(vec![Expr::Wildcard]);
        let scope = Scope::new(
            "M",
            vec![
                Stmt::assert(Expr::ident("A")),
                Stmt::lemma("L", vec![]),
                Stmt::while_loop(outer),
                Stmt::calc(Calc::chain(
                    CalcOp::Eq,
                    vec![Expr::ident("a"), Expr::ident("b")],
                )),
            ],
        )
        .with_decreases(vec![Expr::ident("n")]);
        Program::new("p", "", vec![scope])
    }

    #[test]
    fn test_scan_lists_by_kind() {
        let inventory = Inventory::scan(&nested_loops());
        let scope = inventory.scope(ScopeId(0));
        assert_eq!(scope.list(CandidateKind::Assert).len(), 2);
        assert_eq!(scope.list(CandidateKind::Invariant).len(), 2);
        assert_eq!(scope.list(CandidateKind::DecreasesTerm).len(), 1);
        assert_eq!(scope.list(CandidateKind::LemmaCall).len(), 1);
        assert_eq!(scope.list(CandidateKind::ProofBlock).len(), 1);
        assert!(scope.list(CandidateKind::DecreasesWildcard).is_empty());
        assert_eq!(inventory.count(ScopeId(0), CandidateKind::DecreasesWildcard), 3);
        assert_eq!(inventory.len(), 10);
    }

    #[test]
    fn test_ids_follow_source_order() {
        let inventory = Inventory::scan(&nested_loops());
        let labels: Vec<&str> = inventory.candidates.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels[0], "n");
        assert_eq!(labels[1], "A");
        assert_eq!(labels[2], "L();");
        let all = inventory.scope(ScopeId(0)).collect(KindSet::all());
        let mut sorted = all.clone();
        sorted.sort();
        assert_eq!(all, sorted);
        assert_eq!(all.len(), 7);
    }

    #[test]
    fn test_wildcard_forest_mirrors_nesting() {
        let inventory = Inventory::scan(&nested_loops());
        let forest = &inventory.wildcards;
        assert_eq!(forest.len(), 3);
        let roots: Vec<usize> = forest.roots().collect();
        assert_eq!(roots.len(), 1);
        assert_eq!(forest.nodes[roots[0]].children.len(), 2);
        assert_eq!(forest.count(roots[0]), 3);

        let order = forest.post_order();
        assert_eq!(order.len(), 3);
        assert_eq!(*order.last().unwrap(), roots[0]);
    }

    #[test]
    fn test_method_wildcard_is_parent_of_loop_wildcards() {
        let lp = Loop::new(Expr::ident("g"), vec![]).with_decreases(vec![Expr::Wildcard]);
        let scope =
            Scope::new("M", vec![Stmt::while_loop(lp)]).with_decreases(vec![Expr::Wildcard]);
        let inventory = Inventory::scan(&Program::new("p", "", vec![scope]));
        let forest = &inventory.wildcards;
        assert_eq!(forest.nodes[1].parent, Some(0));
        assert_eq!(forest.post_order(), vec![1, 0]);
    }

    #[test]
    fn test_wildcards_do_not_leak_across_scopes() {
        let a = Scope::new("A", vec![]).with_decreases(vec![Expr::Wildcard]);
        let lp = Loop::new(Expr::ident("g"), vec![]).with_decreases(vec![Expr::Wildcard]);
        let b = Scope::new("B", vec![Stmt::while_loop(lp)]);
        let inventory = Inventory::scan(&Program::new("p", "", vec![a, b]));
        assert_eq!(inventory.wildcards.roots().count(), 2);
        assert_eq!(inventory.wildcards_in(ScopeId(1)).count(), 1);
    }

    #[test]
    fn test_calc_hints_are_not_scanned() {
        let mut calc = Calc::chain(CalcOp::Eq, vec![Expr::ident("a"), Expr::ident("b")]);
        calc.steps[0].hint = Block::new(vec![Stmt::assert(Expr::ident("h"))]);
        let scope = Scope::new("M", vec![Stmt::calc(calc)]);
        let inventory = Inventory::scan(&Program::new("p", "", vec![scope]));
        assert_eq!(inventory.len(), 1);
        assert_eq!(inventory.candidates[0].kind, CandidateKind::ProofBlock);
    }
}
