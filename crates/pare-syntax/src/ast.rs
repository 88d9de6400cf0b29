//! In-memory representation of an annotated program.
//!
//! The program is an arena of scopes (methods). Every element of a mutable
//! sequence (statement, clause, block) carries a [`NodeId`] that is stable
//! across insertions and removals of its siblings, so an annotation can always
//! be found again after the program has been edited.

use crate::render::render;
use crate::span::Span;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable identifier of a statement, clause or block.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct NodeId(pub u32);

/// Index of a scope in [`Program::scopes`]. Scopes are never added or removed
/// after construction.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct ScopeId(pub usize);

/// Error loading a program from its serialized form.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("invalid program JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("calc in scope '{scope}' has {lines} lines but {steps} steps")]
    MalformedCalc {
        scope: String,
        lines: usize,
        steps: usize,
    },
}

pub type LoadResult<T> = Result<T, LoadError>;

/// A whole program: verbatim preamble (datatypes, functions, ...) followed by
/// the scopes whose annotations are subject to minimization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "RawProgram")]
pub struct Program {
    pub name: String,
    pub preamble: String,
    pub scopes: Vec<Scope>,
    #[serde(skip)]
    next_id: u32,
}

#[derive(Deserialize)]
struct RawProgram {
    #[serde(default)]
    name: String,
    #[serde(default)]
    preamble: String,
    scopes: Vec<Scope>,
}

/// Structural equality; the id allocator is not part of a program's value.
impl PartialEq for Program {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.preamble == other.preamble && self.scopes == other.scopes
    }
}

impl From<RawProgram> for Program {
    fn from(raw: RawProgram) -> Self {
        Program::new(raw.name, raw.preamble, raw.scopes)
    }
}

impl Program {
    /// Build a program, numbering every node and giving each scope without a
    /// recorded span the line range it occupies in the rendered text.
    pub fn new(name: impl Into<String>, preamble: impl Into<String>, scopes: Vec<Scope>) -> Self {
        let mut program = Self {
            name: name.into(),
            preamble: preamble.into(),
            scopes,
            next_id: 0,
        };
        let mut next = 1;
        for scope in &mut program.scopes {
            for clause in &mut scope.decreases {
                clause.id = bump(&mut next);
            }
            number_block(&mut scope.body, &mut next);
        }
        program.next_id = next;

        if program.scopes.iter().any(|s| s.span.is_dummy()) {
            let rendered = render(&program);
            for layout in rendered.layout {
                let scope = &mut program.scopes[layout.scope.0];
                if scope.span.is_dummy() {
                    scope.span = layout.span;
                }
            }
        }
        program
    }

    /// Parse a program from JSON and check its structural invariants.
    pub fn from_json(text: &str) -> LoadResult<Self> {
        let program: Program = serde_json::from_str(text)?;
        for scope in &program.scopes {
            check_calcs(&scope.name, &scope.body)?;
        }
        Ok(program)
    }

    /// Allocate a node id not used anywhere in the program.
    pub fn fresh_id(&mut self) -> NodeId {
        bump(&mut self.next_id)
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0]
    }

    pub fn scope_mut(&mut self, id: ScopeId) -> &mut Scope {
        &mut self.scopes[id.0]
    }

    pub fn scope_ids(&self) -> impl Iterator<Item = ScopeId> {
        (0..self.scopes.len()).map(ScopeId)
    }
}

fn bump(next: &mut u32) -> NodeId {
    let id = NodeId(*next);
    *next += 1;
    id
}

fn number_block(block: &mut Block, next: &mut u32) {
    block.id = bump(next);
    for stmt in &mut block.stmts {
        stmt.id = bump(next);
        if let StmtKind::While(lp) = &mut stmt.kind {
            for clause in lp.invariants.iter_mut().chain(lp.decreases.iter_mut()) {
                clause.id = bump(next);
            }
        }
        for child in stmt.kind.blocks_mut() {
            number_block(child, next);
        }
    }
}

fn check_calcs(scope: &str, block: &Block) -> LoadResult<()> {
    for stmt in &block.stmts {
        if let StmtKind::Calc(calc) = &stmt.kind {
            if !calc.is_well_formed() {
                return Err(LoadError::MalformedCalc {
                    scope: scope.to_string(),
                    lines: calc.lines.len(),
                    steps: calc.steps.len(),
                });
            }
        }
        for child in stmt.kind.blocks() {
            check_calcs(scope, child)?;
        }
    }
    Ok(())
}

/// A method: the unit annotations are minimized in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scope {
    pub name: String,
    /// Signature printed verbatim, e.g. `method Sum(n: nat) returns (s: nat)`.
    #[serde(default)]
    pub header: String,
    #[serde(default)]
    pub requires: Vec<Expr>,
    #[serde(default)]
    pub ensures: Vec<Expr>,
    /// Method-level termination measures.
    #[serde(default)]
    pub decreases: Vec<Clause>,
    pub body: Block,
    /// Span of the body; diagnostics inside it belong to this scope.
    #[serde(default)]
    pub span: Span,
}

impl Scope {
    pub fn new(name: impl Into<String>, stmts: Vec<Stmt>) -> Self {
        Self {
            name: name.into(),
            header: String::new(),
            requires: Vec::new(),
            ensures: Vec::new(),
            decreases: Vec::new(),
            body: Block::new(stmts),
            span: Span::dummy(),
        }
    }

    pub fn with_decreases(mut self, decreases: Vec<Expr>) -> Self {
        self.decreases = decreases.into_iter().map(Clause::new).collect();
        self
    }

    /// Find the block with the given id anywhere in the body.
    pub fn find_block(&self, id: NodeId) -> Option<&Block> {
        find_block(&self.body, id)
    }

    pub fn find_block_mut(&mut self, id: NodeId) -> Option<&mut Block> {
        find_block_mut(&mut self.body, id)
    }

    /// Find the statement with the given id anywhere in the body.
    pub fn find_stmt(&self, id: NodeId) -> Option<&Stmt> {
        find_stmt(&self.body, id)
    }

    pub fn find_stmt_mut(&mut self, id: NodeId) -> Option<&mut Stmt> {
        find_stmt_mut(&mut self.body, id)
    }
}

fn find_block(block: &Block, id: NodeId) -> Option<&Block> {
    if block.id == id {
        return Some(block);
    }
    block
        .stmts
        .iter()
        .flat_map(|stmt| stmt.kind.blocks())
        .find_map(|child| find_block(child, id))
}

fn find_block_mut(block: &mut Block, id: NodeId) -> Option<&mut Block> {
    if block.id == id {
        return Some(block);
    }
    for stmt in block.stmts.iter_mut() {
        for child in stmt.kind.blocks_mut() {
            if let Some(found) = find_block_mut(child, id) {
                return Some(found);
            }
        }
    }
    None
}

fn find_stmt(block: &Block, id: NodeId) -> Option<&Stmt> {
    for stmt in &block.stmts {
        if stmt.id == id {
            return Some(stmt);
        }
        if let Some(found) = stmt.kind.blocks().into_iter().find_map(|b| find_stmt(b, id)) {
            return Some(found);
        }
    }
    None
}

fn find_stmt_mut(block: &mut Block, id: NodeId) -> Option<&mut Stmt> {
    for stmt in block.stmts.iter_mut() {
        if stmt.id == id {
            return Some(stmt);
        }
        for child in stmt.kind.blocks_mut() {
            if let Some(found) = find_stmt_mut(child, id) {
                return Some(found);
            }
        }
    }
    None
}

/// An ordered statement sequence.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Block {
    #[serde(skip)]
    pub id: NodeId,
    pub stmts: Vec<Stmt>,
}

impl Block {
    pub fn new(stmts: Vec<Stmt>) -> Self {
        Self {
            id: NodeId::default(),
            stmts,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.stmts.is_empty()
    }
}

/// A statement with its stable id and source span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stmt {
    #[serde(skip)]
    pub id: NodeId,
    #[serde(default)]
    pub span: Span,
    #[serde(flatten)]
    pub kind: StmtKind,
}

impl Stmt {
    pub fn new(kind: StmtKind) -> Self {
        Self {
            id: NodeId::default(),
            span: Span::dummy(),
            kind,
        }
    }

    pub fn assert(expr: Expr) -> Self {
        Self::new(StmtKind::Assert(expr))
    }

    pub fn lemma(lemma: impl Into<String>, args: Vec<Expr>) -> Self {
        Self::new(StmtKind::LemmaCall {
            lemma: lemma.into(),
            args,
        })
    }

    pub fn assign(target: impl Into<String>, value: Expr) -> Self {
        Self::new(StmtKind::Assign {
            target: target.into(),
            value,
        })
    }

    pub fn while_loop(lp: Loop) -> Self {
        Self::new(StmtKind::While(lp))
    }

    pub fn calc(calc: Calc) -> Self {
        Self::new(StmtKind::Calc(calc))
    }
}

/// The kind of statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StmtKind {
    /// `assert e;`
    Assert(Expr),
    /// `Lemma(args);`, a ghost call made only to help the verifier.
    LemmaCall {
        lemma: String,
        #[serde(default)]
        args: Vec<Expr>,
    },
    /// `x := e;`
    Assign { target: String, value: Expr },
    /// `var x := e;`
    Var {
        name: String,
        #[serde(default)]
        init: Option<Expr>,
    },
    /// `if c { ... } else { ... }`
    If {
        cond: Expr,
        then_block: Block,
        #[serde(default)]
        else_block: Option<Block>,
    },
    /// `while g invariant ... decreases ... { ... }`
    While(Loop),
    /// `calc { ... }`
    Calc(Calc),
    /// Source text printed as-is.
    Verbatim(String),
}

impl StmtKind {
    /// Nested blocks directly owned by this statement, in source order.
    pub fn blocks(&self) -> Vec<&Block> {
        match self {
            StmtKind::If {
                then_block,
                else_block,
                ..
            } => std::iter::once(then_block).chain(else_block.as_ref()).collect(),
            StmtKind::While(lp) => vec![&lp.body],
            StmtKind::Calc(calc) => calc.steps.iter().map(|s| &s.hint).collect(),
            _ => Vec::new(),
        }
    }

    pub fn blocks_mut(&mut self) -> Vec<&mut Block> {
        match self {
            StmtKind::If {
                then_block,
                else_block,
                ..
            } => std::iter::once(then_block).chain(else_block.as_mut()).collect(),
            StmtKind::While(lp) => vec![&mut lp.body],
            StmtKind::Calc(calc) => calc.steps.iter_mut().map(|s| &mut s.hint).collect(),
            _ => Vec::new(),
        }
    }
}

/// A loop with its specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loop {
    pub guard: Expr,
    #[serde(default)]
    pub invariants: Vec<Clause>,
    #[serde(default)]
    pub decreases: Vec<Clause>,
    pub body: Block,
}

impl Loop {
    pub fn new(guard: Expr, body: Vec<Stmt>) -> Self {
        Self {
            guard,
            invariants: Vec::new(),
            decreases: Vec::new(),
            body: Block::new(body),
        }
    }

    pub fn with_invariants(mut self, invariants: Vec<Expr>) -> Self {
        self.invariants = invariants.into_iter().map(Clause::new).collect();
        self
    }

    pub fn with_decreases(mut self, decreases: Vec<Expr>) -> Self {
        self.decreases = decreases.into_iter().map(Clause::new).collect();
        self
    }
}

/// A specification clause (`invariant e`, `decreases e`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clause {
    #[serde(skip)]
    pub id: NodeId,
    #[serde(default)]
    pub span: Span,
    pub expr: Expr,
}

impl Clause {
    pub fn new(expr: Expr) -> Self {
        Self {
            id: NodeId::default(),
            span: Span::dummy(),
            expr,
        }
    }
}

/// A calculational proof: `lines[i] steps[i].op lines[i + 1]`, where each
/// step may carry a hint block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calc {
    pub lines: Vec<Expr>,
    pub steps: Vec<CalcStep>,
}

impl Calc {
    /// Build a calc chaining `lines` with the same connector and no hints.
    pub fn chain(op: CalcOp, lines: Vec<Expr>) -> Self {
        let steps = (1..lines.len())
            .map(|_| CalcStep {
                op,
                hint: Block::default(),
            })
            .collect();
        Self { lines, steps }
    }

    /// There is exactly one step between each pair of consecutive lines.
    pub fn is_well_formed(&self) -> bool {
        self.steps.len() + 1 == self.lines.len() || (self.lines.is_empty() && self.steps.is_empty())
    }
}

/// A connector between two calc lines plus its hint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalcStep {
    pub op: CalcOp,
    #[serde(default)]
    pub hint: Block,
}

/// Calc connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalcOp {
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
    Implies,
}

impl CalcOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CalcOp::Eq => "==",
            CalcOp::Lt => "<",
            CalcOp::Le => "<=",
            CalcOp::Gt => ">",
            CalcOp::Ge => ">=",
            CalcOp::Implies => "==>",
        }
    }

    /// The connector relating `a` to `c` given `a self b` and `b next c`, or
    /// `None` if the two do not chain.
    pub fn compose(self, next: CalcOp) -> Option<CalcOp> {
        use CalcOp::*;
        match (self, next) {
            (Eq, op) | (op, Eq) => Some(op),
            (Lt, Lt) | (Lt, Le) | (Le, Lt) => Some(Lt),
            (Le, Le) => Some(Le),
            (Gt, Gt) | (Gt, Ge) | (Ge, Gt) => Some(Gt),
            (Ge, Ge) => Some(Ge),
            (Implies, Implies) => Some(Implies),
            _ => None,
        }
    }
}

/// An expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    Bool(bool),
    Int(i64),
    Ident(String),
    /// `*` in `decreases *`.
    Wildcard,
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        func: String,
        args: Vec<Expr>,
    },
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
    },
    Old(Box<Expr>),
}

impl Expr {
    pub fn ident(name: impl Into<String>) -> Self {
        Expr::Ident(name.into())
    }

    pub fn binary(op: BinOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn and(left: Expr, right: Expr) -> Self {
        Self::binary(BinOp::And, left, right)
    }

    pub fn not(operand: Expr) -> Self {
        Expr::Unary {
            op: UnaryOp::Not,
            operand: Box::new(operand),
        }
    }

    pub fn call(func: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Call {
            func: func.into(),
            args,
        }
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, Expr::Wildcard)
    }
}

/// Binary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinOp {
    // Logical
    And,
    Or,
    Implies,
    Iff,

    // Comparison
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,

    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl BinOp {
    /// Get the precedence of this operator (higher = binds tighter).
    pub fn precedence(self) -> u8 {
        match self {
            BinOp::Iff => 1,
            BinOp::Implies => 2,
            BinOp::Or => 3,
            BinOp::And => 4,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => 5,
            BinOp::In => 5,
            BinOp::Add | BinOp::Sub => 6,
            BinOp::Mul | BinOp::Div | BinOp::Mod => 7,
        }
    }

    /// Check if this operator is right-associative.
    pub fn is_right_assoc(self) -> bool {
        matches!(self, BinOp::Implies | BinOp::Iff | BinOp::And | BinOp::Or)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::And => "&&",
            BinOp::Or => "||",
            BinOp::Implies => "==>",
            BinOp::Iff => "<==>",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::In => "in",
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
        }
    }
}

/// Unary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    Not,
    Neg,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Program {
        let lp = Loop::new(
            Expr::binary(BinOp::Lt, Expr::ident("i"), Expr::ident("n")),
            vec![
                Stmt::assert(Expr::ident("B")),
                Stmt::assign(
                    "i",
                    Expr::binary(BinOp::Add, Expr::ident("i"), Expr::Int(1)),
                ),
            ],
        )
        .with_invariants(vec![Expr::ident("I")])
        .with_decreases(vec![Expr::Wildcard]);
        let scope = Scope::new(
            "M",
            vec![Stmt::assert(Expr::ident("A")), Stmt::while_loop(lp)],
        )
        .with_decreases(vec![Expr::Wildcard]);
        Program::new("test", "", vec![scope])
    }

    #[test]
    fn test_ids_are_unique() {
        let program = sample();
        let scope = &program.scopes[0];
        let mut ids = vec![scope.decreases[0].id, scope.body.id];
        for stmt in &scope.body.stmts {
            ids.push(stmt.id);
            if let StmtKind::While(lp) = &stmt.kind {
                ids.push(lp.invariants[0].id);
                ids.push(lp.decreases[0].id);
                ids.push(lp.body.id);
                ids.extend(lp.body.stmts.iter().map(|s| s.id));
            }
        }
        let count = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), count);
        assert!(!ids.contains(&NodeId(0)));
    }

    #[test]
    fn test_fresh_id_is_unused() {
        let mut program = sample();
        let fresh = program.fresh_id();
        assert!(program.scopes[0].find_stmt(fresh).is_none());
        assert!(program.scopes[0].find_block(fresh).is_none());
        assert_ne!(program.fresh_id(), fresh);
    }

    #[test]
    fn test_find_nested_stmt() {
        let program = sample();
        let scope = &program.scopes[0];
        let StmtKind::While(lp) = &scope.body.stmts[1].kind else {
            panic!("expected loop");
        };
        let inner = lp.body.stmts[0].id;
        let found = scope.find_stmt(inner).expect("nested assert");
        assert_eq!(found.kind, StmtKind::Assert(Expr::ident("B")));
        assert!(scope.find_block(lp.body.id).is_some());
    }

    #[test]
    fn test_scope_span_defaults_to_layout() {
        let program = sample();
        assert!(!program.scopes[0].span.is_dummy());
    }

    #[test]
    fn test_calc_compose() {
        assert_eq!(CalcOp::Eq.compose(CalcOp::Lt), Some(CalcOp::Lt));
        assert_eq!(CalcOp::Le.compose(CalcOp::Lt), Some(CalcOp::Lt));
        assert_eq!(CalcOp::Le.compose(CalcOp::Le), Some(CalcOp::Le));
        assert_eq!(CalcOp::Lt.compose(CalcOp::Gt), None);
        assert_eq!(CalcOp::Implies.compose(CalcOp::Lt), None);
    }

    #[test]
    fn test_from_json() {
        let text = r#"{
            "name": "demo",
            "scopes": [{
                "name": "M",
                "decreases": [{"expr": "wildcard"}],
                "body": [
                    {"assert": {"ident": "A"}},
                    {"lemma_call": {"lemma": "L", "args": [{"int": 3}]}},
                    {"calc": {
                        "lines": [{"ident": "a"}, {"ident": "b"}, {"ident": "c"}],
                        "steps": [{"op": "eq"}, {"op": "lt", "hint": [{"assert": {"bool": true}}]}]
                    }}
                ]
            }]
        }"#;
        let program = Program::from_json(text).unwrap();
        let scope = &program.scopes[0];
        assert_eq!(scope.body.stmts.len(), 3);
        assert!(scope.decreases[0].expr.is_wildcard());
        assert_ne!(scope.body.stmts[2].id, NodeId(0));
    }

    #[test]
    fn test_from_json_rejects_malformed_calc() {
        let text = r#"{"scopes": [{"name": "M", "body": [
            {"calc": {"lines": [{"ident": "a"}, {"ident": "b"}], "steps": []}}
        ]}]}"#;
        assert!(matches!(
            Program::from_json(text),
            Err(LoadError::MalformedCalc { lines: 2, steps: 0, .. })
        ));
    }
}
