#![no_main]
use libfuzzer_sys::fuzz_target;
use pare_min::{MinimizeConfig, Minimizer, Strategy};
use pare_oracle::{Oracle, OracleConfig};
use pare_soundness::{assert_stmt, calc_stmt, conjunction, program, ScriptedOracle};
use pare_syntax::{Expr, Loop, Program, Scope, Stmt};

/// Builds up to four scopes from the input. Each byte adds one statement;
/// its high bit marks the atoms it introduces as required.
fn build(data: &[u8]) -> (Program, ScriptedOracle) {
    let mut oracle = ScriptedOracle::new();
    let mut scopes = Vec::new();
    for (s, chunk) in data.chunks(6).take(4).enumerate() {
        let name = format!("S{s}");
        let mut stmts = Vec::new();
        let mut required: Vec<String> = Vec::new();
        for (i, &byte) in chunk.iter().enumerate() {
            let atom = format!("s{s}_{i}");
            let needed = byte & 0x80 != 0;
            let introduced = match byte % 5 {
                0 => {
                    stmts.push(assert_stmt(&atom));
                    vec![atom]
                }
                1 => {
                    let left = format!("{atom}_l");
                    let right = format!("{atom}_r");
                    stmts.push(Stmt::assert(conjunction(&[&left, &right])));
                    if byte & 0x40 != 0 {
                        vec![right]
                    } else {
                        vec![left, right]
                    }
                }
                2 => {
                    let mut lp = Loop::new(Expr::ident(format!("{atom}_g")), vec![])
                        .with_invariants(vec![Expr::ident(&atom)]);
                    if byte & 0x20 != 0 {
                        lp = lp.with_decreases(vec![Expr::Wildcard]);
                    }
                    stmts.push(Stmt::while_loop(lp));
                    vec![atom]
                }
                3 => {
                    stmts.push(Stmt::lemma(&atom, vec![]));
                    vec![atom]
                }
                _ => {
                    let lines = [format!("{atom}_a"), format!("{atom}_b"), format!("{atom}_c")];
                    let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
                    stmts.push(calc_stmt(&refs, &[(0, atom.as_str())]));
                    vec![lines[1].clone(), atom]
                }
            };
            if needed {
                required.extend(introduced);
            }
        }
        let atoms: Vec<&str> = required.iter().map(String::as_str).collect();
        oracle = oracle.requiring(&name, &atoms);
        scopes.push(Scope::new(name, stmts));
    }
    (program(scopes), oracle)
}

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }
    for strategy in Strategy::ALL {
        let (original, oracle) = build(data);
        let config = MinimizeConfig {
            strategy,
            explore_limit: 6,
            ..MinimizeConfig::default()
        };
        let Ok(mut minimizer) = Minimizer::new(original.clone(), &oracle, config) else {
            return;
        };
        let outcome = minimizer.run().expect("scripted runs never fail structurally");
        assert!(oracle.validate(minimizer.program(), &OracleConfig::default()));
        assert!(outcome.errors.is_empty());
        if strategy == Strategy::Explore {
            assert_eq!(minimizer.program(), &original);
        }
    }
});
