//! Removable annotations and their exact removal points.

use pare_syntax::{
    render_expr, render_stmt, Clause, Expr, NodeId, Program, ScopeId, Span, Stmt, StmtKind,
};
use std::fmt;
use std::str::FromStr;

/// Index of a candidate in [`crate::Inventory::candidates`]. Ids are allocated
/// in source order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CandidateId(pub usize);

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What sort of annotation a candidate is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CandidateKind {
    Assert,
    Invariant,
    DecreasesTerm,
    DecreasesWildcard,
    LemmaCall,
    ProofBlock,
}

impl CandidateKind {
    pub const ALL: [CandidateKind; 6] = [
        CandidateKind::Assert,
        CandidateKind::Invariant,
        CandidateKind::DecreasesTerm,
        CandidateKind::DecreasesWildcard,
        CandidateKind::LemmaCall,
        CandidateKind::ProofBlock,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CandidateKind::Assert => "assert",
            CandidateKind::Invariant => "invariant",
            CandidateKind::DecreasesTerm => "decreases",
            CandidateKind::DecreasesWildcard => "decreases-wildcard",
            CandidateKind::LemmaCall => "lemma-call",
            CandidateKind::ProofBlock => "calc",
        }
    }

    /// How a bare payload expression is turned back into an item of this
    /// kind, for kinds whose payload is a single expression.
    pub fn rebuilder(self) -> Option<fn(NodeId, Span, Expr) -> Item> {
        fn statement(id: NodeId, span: Span, expr: Expr) -> Item {
            Item::Stmt(Stmt {
                id,
                span,
                kind: StmtKind::Assert(expr),
            })
        }
        fn clause(id: NodeId, span: Span, expr: Expr) -> Item {
            Item::Clause(Clause { id, span, expr })
        }
        match self {
            CandidateKind::Assert => Some(statement),
            CandidateKind::Invariant | CandidateKind::DecreasesTerm => Some(clause),
            _ => None,
        }
    }
}

impl fmt::Display for CandidateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CandidateKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CandidateKind::ALL
            .into_iter()
            .find(|k| k.name() == s)
            .ok_or_else(|| {
                let names: Vec<_> = CandidateKind::ALL.iter().map(|k| k.name()).collect();
                format!("unknown kind '{}', expected one of: {}", s, names.join(", "))
            })
    }
}

/// A set of candidate kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindSet(u8);

impl KindSet {
    pub const fn empty() -> Self {
        KindSet(0)
    }

    pub fn all() -> Self {
        Self::of(&CandidateKind::ALL)
    }

    pub fn of(kinds: &[CandidateKind]) -> Self {
        kinds.iter().fold(Self::empty(), |set, k| set.with(*k))
    }

    fn bit(kind: CandidateKind) -> u8 {
        1 << kind as u8
    }

    pub fn contains(self, kind: CandidateKind) -> bool {
        self.0 & Self::bit(kind) != 0
    }

    pub fn with(self, kind: CandidateKind) -> Self {
        KindSet(self.0 | Self::bit(kind))
    }

    pub fn without(self, kind: CandidateKind) -> Self {
        KindSet(self.0 & !Self::bit(kind))
    }

    pub fn iter(self) -> impl Iterator<Item = CandidateKind> {
        CandidateKind::ALL.into_iter().filter(move |k| self.contains(*k))
    }

    /// Kinds handled by plain remove-and-verify; wildcards need the forest.
    pub fn regular(self) -> impl Iterator<Item = CandidateKind> {
        self.without(CandidateKind::DecreasesWildcard).iter()
    }
}

impl Default for KindSet {
    fn default() -> Self {
        Self::all()
    }
}

/// The sequence an annotation lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Host {
    /// Statements of the block with this id.
    Block(NodeId),
    /// Invariants of the loop statement with this id.
    Invariants(NodeId),
    /// Decreases clauses of the loop statement with this id.
    Decreases(NodeId),
    /// Method-level decreases clauses of the scope.
    ScopeDecreases,
}

/// A detachable element of a host sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Stmt(Stmt),
    Clause(Clause),
}

impl Item {
    pub fn id(&self) -> NodeId {
        match self {
            Item::Stmt(s) => s.id,
            Item::Clause(c) => c.id,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Item::Stmt(s) => s.span,
            Item::Clause(c) => c.span,
        }
    }

    /// The expression payload of an assert or a clause.
    pub fn expr(&self) -> Option<&Expr> {
        match self {
            Item::Stmt(Stmt {
                kind: StmtKind::Assert(e),
                ..
            }) => Some(e),
            Item::Clause(c) => Some(&c.expr),
            Item::Stmt(_) => None,
        }
    }

    /// Short human-readable form for reports and logs.
    pub fn label(&self) -> String {
        match self {
            Item::Stmt(Stmt {
                kind: StmtKind::Calc(calc),
                ..
            }) => match calc.lines.first() {
                Some(first) => format!("calc {} ({} lines)", render_expr(first), calc.lines.len()),
                None => "calc".to_string(),
            },
            Item::Stmt(Stmt {
                kind: StmtKind::Assert(e),
                ..
            }) => render_expr(e),
            Item::Stmt(s) => render_stmt(s).trim().to_string(),
            Item::Clause(c) => render_expr(&c.expr),
        }
    }
}

/// Exact removal point: which sequence, and which element of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub scope: ScopeId,
    pub host: Host,
    pub node: NodeId,
}

enum Seq<'a> {
    Stmts(&'a mut Vec<Stmt>),
    Clauses(&'a mut Vec<Clause>),
}

impl Location {
    /// Another element of the same host sequence.
    pub fn sibling(&self, node: NodeId) -> Location {
        Location { node, ..*self }
    }

    fn sequence<'p>(&self, program: &'p mut Program) -> Option<Seq<'p>> {
        let scope = program.scopes.get_mut(self.scope.0)?;
        match self.host {
            Host::Block(id) => scope.find_block_mut(id).map(|b| Seq::Stmts(&mut b.stmts)),
            Host::ScopeDecreases => Some(Seq::Clauses(&mut scope.decreases)),
            Host::Invariants(id) | Host::Decreases(id) => match &mut scope.find_stmt_mut(id)?.kind
            {
                StmtKind::While(lp) => {
                    let clauses = if matches!(self.host, Host::Invariants(_)) {
                        &mut lp.invariants
                    } else {
                        &mut lp.decreases
                    };
                    Some(Seq::Clauses(clauses))
                }
                _ => None,
            },
        }
    }

    /// Current index of the element, or `None` if it is not present.
    pub fn index(&self, program: &Program) -> Option<usize> {
        let scope = program.scopes.get(self.scope.0)?;
        match self.host {
            Host::Block(id) => scope
                .find_block(id)?
                .stmts
                .iter()
                .position(|s| s.id == self.node),
            Host::ScopeDecreases => scope.decreases.iter().position(|c| c.id == self.node),
            Host::Invariants(id) | Host::Decreases(id) => match &scope.find_stmt(id)?.kind {
                StmtKind::While(lp) => {
                    let clauses = if matches!(self.host, Host::Invariants(_)) {
                        &lp.invariants
                    } else {
                        &lp.decreases
                    };
                    clauses.iter().position(|c| c.id == self.node)
                }
                _ => None,
            },
        }
    }

    pub fn is_present(&self, program: &Program) -> bool {
        self.index(program).is_some()
    }

    /// The element as it currently stands in the program.
    pub fn item(&self, program: &Program) -> Option<Item> {
        let index = self.index(program)?;
        let scope = program.scopes.get(self.scope.0)?;
        match self.host {
            Host::Block(id) => Some(Item::Stmt(scope.find_block(id)?.stmts[index].clone())),
            Host::ScopeDecreases => Some(Item::Clause(scope.decreases[index].clone())),
            Host::Invariants(id) | Host::Decreases(id) => match &scope.find_stmt(id)?.kind {
                StmtKind::While(lp) if matches!(self.host, Host::Invariants(_)) => {
                    Some(Item::Clause(lp.invariants[index].clone()))
                }
                StmtKind::While(lp) => Some(Item::Clause(lp.decreases[index].clone())),
                _ => None,
            },
        }
    }

    /// Remove the element, remembering where it was.
    pub fn detach(&self, program: &mut Program) -> Option<Detached> {
        let index = self.index(program)?;
        let item = match self.sequence(program)? {
            Seq::Stmts(v) => Item::Stmt(v.remove(index)),
            Seq::Clauses(v) => Item::Clause(v.remove(index)),
        };
        Some(Detached {
            location: *self,
            index,
            item,
        })
    }

    /// Insert `item` into this location's host at `index`. Gives the item back
    /// if the host is gone, the index is out of range or the item does not fit
    /// the host.
    pub fn insert(&self, program: &mut Program, index: usize, item: Item) -> Result<(), Item> {
        match (self.sequence(program), item) {
            (Some(Seq::Stmts(v)), Item::Stmt(s)) if index <= v.len() => {
                v.insert(index, s);
                Ok(())
            }
            (Some(Seq::Clauses(v)), Item::Clause(c)) if index <= v.len() => {
                v.insert(index, c);
                Ok(())
            }
            (_, item) => Err(item),
        }
    }
}

/// A removed element together with the index it was removed from.
#[derive(Debug, Clone)]
pub struct Detached {
    pub location: Location,
    pub index: usize,
    pub item: Item,
}

impl Detached {
    /// Put the element back exactly where it was.
    pub fn reattach(self, program: &mut Program) -> Result<(), Detached> {
        let Detached {
            location,
            index,
            item,
        } = self;
        location
            .insert(program, index, item)
            .map_err(|item| Detached {
                location,
                index,
                item,
            })
    }
}

/// A removable annotation instance.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub id: CandidateId,
    pub kind: CandidateKind,
    pub location: Location,
    /// The annotation as it was when inventoried.
    pub payload: Item,
    pub label: String,
}

impl Candidate {
    pub fn scope(&self) -> ScopeId {
        self.location.scope
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pare_syntax::{Loop, Scope};

    fn program() -> Program {
        let lp = Loop::new(Expr::ident("g"), vec![Stmt::assert(Expr::ident("inner"))])
            .with_invariants(vec![Expr::ident("I1"), Expr::ident("I2")])
            .with_decreases(vec![Expr::ident("n")]);
        Program::new(
            "p",
            "",
            vec![Scope::new(
                "M",
                vec![
                    Stmt::assert(Expr::ident("A")),
                    Stmt::assert(Expr::ident("B")),
                    Stmt::while_loop(lp),
                    Stmt::assert(Expr::ident("C")),
                ],
            )],
        )
    }

    fn body_location(program: &Program, index: usize) -> Location {
        let body = &program.scopes[0].body;
        Location {
            scope: ScopeId(0),
            host: Host::Block(body.id),
            node: body.stmts[index].id,
        }
    }

    #[test]
    fn test_detach_reattach_is_exact() {
        let mut program = program();
        let original = program.clone();
        let loc = body_location(&program, 1);

        let detached = loc.detach(&mut program).unwrap();
        assert_eq!(detached.index, 1);
        assert!(!loc.is_present(&program));
        assert_eq!(program.scopes[0].body.stmts.len(), 3);

        detached.reattach(&mut program).unwrap();
        assert_eq!(program, original);
        assert_eq!(loc.index(&program), Some(1));
    }

    #[test]
    fn test_location_survives_sibling_removal() {
        let mut program = program();
        let first = body_location(&program, 0);
        let last = body_location(&program, 3);
        first.detach(&mut program).unwrap();
        assert_eq!(last.index(&program), Some(2));
        assert_eq!(
            last.item(&program).unwrap().expr(),
            Some(&Expr::ident("C"))
        );
    }

    #[test]
    fn test_invariant_host() {
        let mut program = program();
        let loop_stmt = &program.scopes[0].body.stmts[2];
        let StmtKind::While(lp) = &loop_stmt.kind else {
            panic!("expected loop")
        };
        let loc = Location {
            scope: ScopeId(0),
            host: Host::Invariants(loop_stmt.id),
            node: lp.invariants[1].id,
        };
        let detached = loc.detach(&mut program).unwrap();
        assert_eq!(detached.item.expr(), Some(&Expr::ident("I2")));
        detached.reattach(&mut program).unwrap();
        assert_eq!(loc.index(&program), Some(1));
    }

    #[test]
    fn test_decreases_host_is_separate_from_invariants() {
        let mut program = program();
        let original = program.clone();
        let loop_stmt = &program.scopes[0].body.stmts[2];
        let StmtKind::While(lp) = &loop_stmt.kind else {
            panic!("expected loop")
        };
        let loc = Location {
            scope: ScopeId(0),
            host: Host::Decreases(loop_stmt.id),
            node: lp.decreases[0].id,
        };
        let detached = loc.detach(&mut program).unwrap();
        assert_eq!(detached.item.expr(), Some(&Expr::ident("n")));
        let StmtKind::While(lp) = &program.scopes[0].body.stmts[2].kind else {
            panic!("expected loop")
        };
        assert!(lp.decreases.is_empty());
        assert_eq!(lp.invariants.len(), 2);
        detached.reattach(&mut program).unwrap();
        assert_eq!(program, original);
    }

    #[test]
    fn test_insert_rejects_mismatched_item() {
        let mut program = program();
        let loc = body_location(&program, 0);
        let clause = Item::Clause(Clause::new(Expr::ident("x")));
        assert!(loc.insert(&mut program, 0, clause).is_err());
        let stmt = Item::Stmt(Stmt::assert(Expr::ident("x")));
        assert!(loc.insert(&mut program, 99, stmt).is_err());
    }

    #[test]
    fn test_kind_names_round_trip() {
        for kind in CandidateKind::ALL {
            assert_eq!(kind.name().parse::<CandidateKind>(), Ok(kind));
        }
        assert!("lemma".parse::<CandidateKind>().is_err());
    }

    #[test]
    fn test_kind_set() {
        let set = KindSet::of(&[CandidateKind::Assert, CandidateKind::DecreasesWildcard]);
        assert!(set.contains(CandidateKind::Assert));
        assert!(!set.contains(CandidateKind::Invariant));
        assert_eq!(set.regular().collect::<Vec<_>>(), vec![CandidateKind::Assert]);
        assert_eq!(KindSet::all().iter().count(), 6);
    }

    #[test]
    fn test_rebuilder_matches_kind() {
        let rebuild = CandidateKind::Invariant.rebuilder().unwrap();
        let item = rebuild(NodeId(7), Span::dummy(), Expr::ident("x"));
        assert!(matches!(item, Item::Clause(Clause { id: NodeId(7), .. })));
        assert!(CandidateKind::LemmaCall.rebuilder().is_none());
    }
}
