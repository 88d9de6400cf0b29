//! Program model and printer for annotated programs.

pub mod ast;
pub mod render;
pub mod span;

pub use ast::*;
pub use render::{render, render_expr, render_stmt, Rendered, ScopeLayout};
pub use span::{Pos, Span};
