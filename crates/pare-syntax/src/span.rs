//! Source positions and spans.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A position in source text (both components 1-indexed).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Pos {
    pub line: u32,
    pub column: u32,
}

impl Pos {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Debug for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A span in the source code, from `start` to `end` (both inclusive).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Span {
    pub start: Pos,
    pub end: Pos,
}

impl Span {
    /// Create a new span.
    pub fn new(start: Pos, end: Pos) -> Self {
        Self { start, end }
    }

    /// Span covering whole lines `first..=last`.
    pub fn lines(first: u32, last: u32) -> Self {
        Self {
            start: Pos::new(first, 1),
            end: Pos::new(last, u32::MAX),
        }
    }

    /// Create a dummy span for generated code.
    pub fn dummy() -> Self {
        Self::default()
    }

    pub fn is_dummy(&self) -> bool {
        *self == Self::default()
    }

    /// Merge two spans into one that covers both.
    pub fn merge(self, other: Self) -> Self {
        Self {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// Whether `pos` lies inside this span.
    pub fn contains(&self, pos: Pos) -> bool {
        self.start <= pos && pos <= self.end
    }

    /// Number of lines touched by the span, used to pick the innermost of
    /// several containing spans.
    pub fn line_count(&self) -> u32 {
        self.end.line.saturating_sub(self.start.line) + 1
    }
}

impl fmt::Debug for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end.line)
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_is_inclusive() {
        let span = Span::new(Pos::new(3, 1), Pos::new(7, 2));
        assert!(span.contains(Pos::new(3, 1)));
        assert!(span.contains(Pos::new(5, 80)));
        assert!(span.contains(Pos::new(7, 2)));
        assert!(!span.contains(Pos::new(7, 3)));
        assert!(!span.contains(Pos::new(2, 9)));
    }

    #[test]
    fn test_line_span_covers_every_column() {
        let span = Span::lines(4, 6);
        assert!(span.contains(Pos::new(6, 200)));
        assert_eq!(span.line_count(), 3);
    }

    #[test]
    fn test_merge() {
        let a = Span::lines(2, 3);
        let b = Span::lines(5, 9);
        let merged = a.merge(b);
        assert_eq!(merged.start, Pos::new(2, 1));
        assert_eq!(merged.end.line, 9);
    }
}
