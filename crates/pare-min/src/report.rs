//! Per-scope summary of a minimization run.

use crate::candidate::CandidateKind;
use crate::inventory::Inventory;
use crate::minimizer::{MinimizeOutcome, RunStats, Strategy};
use pare_syntax::render_expr;
use std::fmt;
use std::io::{self, Write};

/// Counts for one kind in one scope.
#[derive(Debug, Clone, PartialEq)]
pub struct KindRow {
    pub kind: CandidateKind,
    pub before: usize,
    pub after: usize,
    /// Labels of the removed candidates, in removal order.
    pub removed: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScopeReport {
    pub name: String,
    pub rows: Vec<KindRow>,
    /// `original => replacement` for each weakened conjunction.
    pub simplifications: Vec<(String, String)>,
    /// Calc label with the number of lines and hints cut from it.
    pub proof_edits: Vec<(String, usize, usize)>,
    /// Sizes of the maximal removal sets found by order exploration.
    pub solutions: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub strategy: Strategy,
    pub scopes: Vec<ScopeReport>,
    pub stats: RunStats,
}

impl Report {
    pub fn build(inventory: &Inventory, outcome: &MinimizeOutcome) -> Report {
        let mut scopes: Vec<ScopeReport> = inventory
            .scopes
            .iter()
            .map(|s| ScopeReport {
                name: s.name.clone(),
                rows: CandidateKind::ALL
                    .into_iter()
                    .map(|kind| {
                        let before = inventory.count(s.scope, kind);
                        KindRow {
                            kind,
                            before,
                            after: before,
                            removed: Vec::new(),
                        }
                    })
                    .filter(|row| row.before > 0)
                    .collect(),
                simplifications: Vec::new(),
                proof_edits: Vec::new(),
                solutions: Vec::new(),
            })
            .collect();

        for &id in &outcome.removed {
            let candidate = inventory.get(id);
            let scope = &mut scopes[candidate.scope().0];
            if let Some(row) = scope.rows.iter_mut().find(|r| r.kind == candidate.kind) {
                row.after = row.after.saturating_sub(1);
                row.removed.push(candidate.label.clone());
            }
        }
        for result in &outcome.simplifications {
            let candidate = inventory.get(result.candidate);
            scopes[candidate.scope().0].simplifications.push((
                render_expr(&result.original),
                render_expr(&result.replacement),
            ));
        }
        for edit in &outcome.proof_edits {
            let candidate = inventory.get(edit.candidate);
            scopes[candidate.scope().0].proof_edits.push((
                candidate.label.clone(),
                edit.removed_lines.len(),
                edit.cleared_hints,
            ));
        }
        for study in &outcome.studies {
            scopes[study.scope.0].solutions = study.solutions.iter().map(Vec::len).collect();
        }

        Report {
            strategy: outcome.strategy,
            scopes,
            stats: outcome.stats.clone(),
        }
    }

    pub fn removed(&self) -> usize {
        self.rows().map(|(_, r)| r.removed.len()).sum()
    }

    fn rows(&self) -> impl Iterator<Item = (&ScopeReport, &KindRow)> {
        self.scopes
            .iter()
            .flat_map(|s| s.rows.iter().map(move |r| (s, r)))
    }

    /// `scope,kind,before,after,removed`, one row per scope and kind present.
    pub fn write_csv<W: Write>(&self, mut out: W) -> io::Result<()> {
        writeln!(out, "scope,kind,before,after,removed")?;
        for (scope, row) in self.rows() {
            writeln!(
                out,
                "{},{},{},{},{}",
                csv_field(&scope.name),
                row.kind,
                row.before,
                row.after,
                csv_field(&row.removed.join("; "))
            )?;
        }
        Ok(())
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for scope in &self.scopes {
            if scope.rows.is_empty() {
                continue;
            }
            writeln!(f, "{}:", scope.name)?;
            for row in &scope.rows {
                writeln!(f, "  {:<20} {:>4} -> {:<4}", row.kind.name(), row.before, row.after)?;
                for label in &row.removed {
                    writeln!(f, "      - {}", label)?;
                }
            }
            for (original, replacement) in &scope.simplifications {
                writeln!(f, "  simplified: {} => {}", original, replacement)?;
            }
            for (label, lines, hints) in &scope.proof_edits {
                writeln!(f, "  reduced: {} (-{} lines, -{} hints)", label, lines, hints)?;
            }
            if !scope.solutions.is_empty() {
                let sizes: Vec<String> = scope.solutions.iter().map(usize::to_string).collect();
                writeln!(f, "  maximal removal sets: [{}]", sizes.join(", "))?;
            }
        }
        write!(
            f,
            "{} strategy: {} removed, {} oracle calls",
            self.strategy,
            self.removed(),
            self.stats.oracle_calls
        )?;
        if self.stats.rounds > 0 {
            write!(f, ", {} rounds", self.stats.rounds)?;
        }
        if self.stats.localization_failures > 0 {
            write!(
                f,
                ", {} unlocalized failures",
                self.stats.localization_failures
            )?;
        }
        if self.stats.stopped {
            write!(f, " (stopped early)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::CandidateId;
    use pare_syntax::{Expr, Loop, Program, Scope, Stmt};

    fn inventory() -> Inventory {
        let lp = Loop::new(Expr::ident("g"), vec![])
            .with_invariants(vec![Expr::ident("I")])
            .with_decreases(vec![Expr::Wildcard]);
        let program = Program::new(
            "p",
            "",
            vec![
                Scope::new(
                    "First",
                    vec![
                        Stmt::assert(Expr::ident("a")),
                        Stmt::assert(Expr::ident("b")),
                        Stmt::while_loop(lp),
                    ],
                ),
                Scope::new("Second, too", vec![Stmt::lemma("L", vec![])]),
            ],
        );
        Inventory::scan(&program)
    }

    #[test]
    fn test_rows_count_removals() {
        let inventory = inventory();
        let outcome = MinimizeOutcome {
            removed: vec![CandidateId(1), CandidateId(3)],
            ..MinimizeOutcome::default()
        };
        let report = Report::build(&inventory, &outcome);
        let first = &report.scopes[0];
        let asserts = first.rows.iter().find(|r| r.kind == CandidateKind::Assert).unwrap();
        assert_eq!((asserts.before, asserts.after), (2, 1));
        assert_eq!(asserts.removed, vec!["b".to_string()]);
        let wildcards = first
            .rows
            .iter()
            .find(|r| r.kind == CandidateKind::DecreasesWildcard)
            .unwrap();
        assert_eq!((wildcards.before, wildcards.after), (1, 0));
        assert_eq!(report.removed(), 2);
    }

    #[test]
    fn test_csv_output() {
        let inventory = inventory();
        let outcome = MinimizeOutcome {
            removed: vec![CandidateId(4)],
            ..MinimizeOutcome::default()
        };
        let mut buf = Vec::new();
        Report::build(&inventory, &outcome).write_csv(&mut buf).unwrap();
        let csv = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "scope,kind,before,after,removed");
        assert!(lines.contains(&"First,assert,2,2,"));
        assert!(lines.contains(&"\"Second, too\",lemma-call,1,0,L();"));
        assert_eq!(lines.len(), 5);
    }

    #[test]
    fn test_display_summary() {
        let report = Report::build(&inventory(), &MinimizeOutcome::default());
        let text = report.to_string();
        assert!(text.contains("First:"));
        assert!(text.ends_with("batched strategy: 0 removed, 0 oracle calls"));
    }
}
