//! Printer for programs, producing Dafny-flavoured source text.

use crate::ast::*;
use crate::span::{Pos, Span};
use std::fmt::Write;

/// Rendered program text with the line range each scope occupies.
#[derive(Debug, Clone)]
pub struct Rendered {
    pub text: String,
    pub layout: Vec<ScopeLayout>,
}

/// Where a scope landed in the rendered text.
#[derive(Debug, Clone, Copy)]
pub struct ScopeLayout {
    pub scope: ScopeId,
    pub span: Span,
}

impl Rendered {
    /// The scope whose rendered lines contain `pos`.
    pub fn scope_at(&self, pos: Pos) -> Option<ScopeId> {
        self.layout
            .iter()
            .find(|l| l.span.contains(pos))
            .map(|l| l.scope)
    }
}

/// Render a program.
pub fn render(program: &Program) -> Rendered {
    let mut printer = Printer::new();
    printer.print_program(program);
    Rendered {
        text: printer.output,
        layout: printer.layout,
    }
}

/// Render an expression to a string.
pub fn render_expr(expr: &Expr) -> String {
    let mut printer = Printer::new();
    printer.print_expr(expr);
    printer.output
}

/// Render a single statement (without trailing newline).
pub fn render_stmt(stmt: &Stmt) -> String {
    let mut printer = Printer::new();
    printer.print_stmt(stmt);
    printer.output.trim_end().to_string()
}

struct Printer {
    output: String,
    indent: usize,
    line: u32,
    layout: Vec<ScopeLayout>,
}

impl Printer {
    fn new() -> Self {
        Self {
            output: String::new(),
            indent: 0,
            line: 1,
            layout: Vec::new(),
        }
    }

    fn write(&mut self, s: &str) {
        self.line += s.matches('\n').count() as u32;
        self.output.push_str(s);
    }

    fn newline(&mut self) {
        self.output.push('\n');
        self.line += 1;
    }

    fn write_indent(&mut self) {
        for _ in 0..self.indent {
            self.output.push_str("  ");
        }
    }

    fn line_start(&mut self, s: &str) {
        self.write_indent();
        self.write(s);
    }

    fn print_program(&mut self, program: &Program) {
        if !program.preamble.trim().is_empty() {
            self.write(program.preamble.trim_end());
            self.newline();
            self.newline();
        }
        for (i, scope) in program.scopes.iter().enumerate() {
            if i > 0 {
                self.newline();
            }
            let first = self.line;
            self.print_scope(scope);
            self.layout.push(ScopeLayout {
                scope: ScopeId(i),
                span: Span::lines(first, self.line - 1),
            });
        }
    }

    fn print_scope(&mut self, scope: &Scope) {
        if scope.header.is_empty() {
            let _ = write!(self.output, "method {}()", scope.name);
        } else {
            self.write(&scope.header);
        }
        self.newline();

        self.indent += 1;
        for req in &scope.requires {
            self.line_start("requires ");
            self.print_expr(req);
            self.newline();
        }
        for ens in &scope.ensures {
            self.line_start("ensures ");
            self.print_expr(ens);
            self.newline();
        }
        self.print_decreases(&scope.decreases);
        self.indent -= 1;

        self.writeln_block(&scope.body);
    }

    fn print_decreases(&mut self, clauses: &[Clause]) {
        if clauses.is_empty() {
            return;
        }
        self.line_start("decreases ");
        for (i, clause) in clauses.iter().enumerate() {
            if i > 0 {
                self.write(", ");
            }
            self.print_expr(&clause.expr);
        }
        self.newline();
    }

    /// `{`, the statements one level deeper, `}` and a newline.
    fn writeln_block(&mut self, block: &Block) {
        self.line_start("{");
        self.newline();
        self.indent += 1;
        for stmt in &block.stmts {
            self.print_stmt(stmt);
        }
        self.indent -= 1;
        self.line_start("}");
        self.newline();
    }

    fn print_stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Assert(expr) => {
                self.line_start("assert ");
                self.print_expr(expr);
                self.write(";");
                self.newline();
            }
            StmtKind::LemmaCall { lemma, args } => {
                self.line_start(lemma);
                self.print_args(args);
                self.write(";");
                self.newline();
            }
            StmtKind::Assign { target, value } => {
                self.line_start(target);
                self.write(" := ");
                self.print_expr(value);
                self.write(";");
                self.newline();
            }
            StmtKind::Var { name, init } => {
                self.line_start("var ");
                self.write(name);
                if let Some(init) = init {
                    self.write(" := ");
                    self.print_expr(init);
                }
                self.write(";");
                self.newline();
            }
            StmtKind::If {
                cond,
                then_block,
                else_block,
            } => {
                self.line_start("if ");
                self.print_expr(cond);
                self.newline();
                self.writeln_block(then_block);
                if let Some(else_block) = else_block {
                    self.line_start("else");
                    self.newline();
                    self.writeln_block(else_block);
                }
            }
            StmtKind::While(lp) => {
                self.line_start("while ");
                self.print_expr(&lp.guard);
                self.newline();
                self.indent += 1;
                for inv in &lp.invariants {
                    self.line_start("invariant ");
                    self.print_expr(&inv.expr);
                    self.newline();
                }
                self.print_decreases(&lp.decreases);
                self.indent -= 1;
                self.writeln_block(&lp.body);
            }
            StmtKind::Calc(calc) => self.print_calc(calc),
            StmtKind::Verbatim(text) => {
                for line in text.lines() {
                    self.line_start(line);
                    self.newline();
                }
            }
        }
    }

    fn print_calc(&mut self, calc: &Calc) {
        self.line_start("calc {");
        self.newline();
        self.indent += 1;
        for (i, line) in calc.lines.iter().enumerate() {
            self.write_indent();
            self.print_expr(line);
            self.write(";");
            self.newline();
            if let Some(step) = calc.steps.get(i) {
                self.indent -= 1;
                self.line_start(step.op.symbol());
                self.newline();
                if !step.hint.is_empty() {
                    self.writeln_block(&step.hint);
                }
                self.indent += 1;
            }
        }
        self.indent -= 1;
        self.line_start("}");
        self.newline();
    }

    fn print_args(&mut self, args: &[Expr]) {
        self.write("(");
        for (i, arg) in args.iter().enumerate() {
            if i > 0 {
                self.write(", ");
            }
            self.print_expr(arg);
        }
        self.write(")");
    }

    fn print_expr(&mut self, expr: &Expr) {
        self.print_expr_prec(expr, 0);
    }

    /// Print `expr`, parenthesizing it if it binds looser than `min_prec`.
    fn print_expr_prec(&mut self, expr: &Expr, min_prec: u8) {
        match expr {
            Expr::Bool(b) => self.write(if *b { "true" } else { "false" }),
            Expr::Int(n) => {
                let _ = write!(self.output, "{}", n);
            }
            Expr::Ident(name) => self.write(name),
            Expr::Wildcard => self.write("*"),
            Expr::Unary { op, operand } => {
                self.write(match op {
                    UnaryOp::Not => "!",
                    UnaryOp::Neg => "-",
                });
                self.print_expr_prec(operand, u8::MAX);
            }
            Expr::Binary { op, left, right } => {
                let prec = op.precedence();
                let paren = prec < min_prec;
                if paren {
                    self.write("(");
                }
                let (left_prec, right_prec) = if op.is_right_assoc() {
                    (prec + 1, prec)
                } else {
                    (prec, prec + 1)
                };
                self.print_expr_prec(left, left_prec);
                self.write(" ");
                self.write(op.symbol());
                self.write(" ");
                self.print_expr_prec(right, right_prec);
                if paren {
                    self.write(")");
                }
            }
            Expr::Call { func, args } => {
                self.write(func);
                self.print_args(args);
            }
            Expr::Index { base, index } => {
                self.print_expr_prec(base, u8::MAX);
                self.write("[");
                self.print_expr(index);
                self.write("]");
            }
            Expr::Old(inner) => {
                self.write("old(");
                self.print_expr(inner);
                self.write(")");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope_with(name: &str, stmts: Vec<Stmt>) -> Scope {
        Scope::new(name, stmts)
    }

    #[test]
    fn test_render_layout_covers_each_scope() {
        let program = Program::new(
            "p",
            "function F(x: int): int { x }",
            vec![
                scope_with("A", vec![Stmt::assert(Expr::ident("a"))]),
                scope_with("B", vec![Stmt::assert(Expr::ident("b"))]),
            ],
        );
        let rendered = render(&program);
        assert_eq!(rendered.layout.len(), 2);

        let lines: Vec<&str> = rendered.text.lines().collect();
        let line_of = |needle: &str| {
            lines.iter().position(|l| l.contains(needle)).unwrap() as u32 + 1
        };
        assert_eq!(
            rendered.scope_at(Pos::new(line_of("assert a;"), 3)),
            Some(ScopeId(0))
        );
        assert_eq!(
            rendered.scope_at(Pos::new(line_of("assert b;"), 3)),
            Some(ScopeId(1))
        );
        assert_eq!(rendered.scope_at(Pos::new(1, 1)), None);
    }

    #[test]
    fn test_render_loop_and_calc() {
        let lp = Loop::new(Expr::ident("g"), vec![])
            .with_invariants(vec![Expr::ident("I")])
            .with_decreases(vec![Expr::Wildcard]);
        let mut calc = Calc::chain(
            CalcOp::Eq,
            vec![Expr::ident("a"), Expr::ident("b"), Expr::ident("c")],
        );
        calc.steps[1].hint = Block::new(vec![Stmt::lemma("L", vec![Expr::Int(1)])]);
        let program = Program::new(
            "p",
            "",
            vec![scope_with("M", vec![Stmt::while_loop(lp), Stmt::calc(calc)])],
        );
        let text = render(&program).text;
        assert!(text.contains("while g\n    invariant I\n    decreases *\n"));
        assert!(text.contains("calc {"));
        assert!(text.contains("L(1);"));
    }

    #[test]
    fn test_render_expr_parenthesizes() {
        let expr = Expr::binary(
            BinOp::Mul,
            Expr::binary(BinOp::Add, Expr::ident("a"), Expr::ident("b")),
            Expr::ident("c"),
        );
        assert_eq!(render_expr(&expr), "(a + b) * c");

        let conj = Expr::and(
            Expr::ident("x"),
            Expr::and(Expr::ident("y"), Expr::ident("z")),
        );
        assert_eq!(render_expr(&conj), "x && y && z");

        let sub = Expr::binary(
            BinOp::Sub,
            Expr::ident("a"),
            Expr::binary(BinOp::Sub, Expr::ident("b"), Expr::ident("c")),
        );
        assert_eq!(render_expr(&sub), "a - (b - c)");
    }

    #[test]
    fn test_render_unary_and_call() {
        let negated = Expr::not(Expr::and(Expr::ident("a"), Expr::ident("b")));
        assert_eq!(render_expr(&negated), "!(a && b)");

        let call = Expr::call("Valid", vec![Expr::ident("x"), Expr::not(Expr::ident("y"))]);
        assert_eq!(render_expr(&call), "Valid(x, !y)");
    }
}
