//! Oracle backed by an external verifier process.
//!
//! Each call renders the program to a temporary file, runs the verifier on it
//! with the configured timeout and scans its output for failure locations.

use crate::{FailureLocation, Oracle, OracleConfig, OracleError, OracleResult, Verdict};
use pare_syntax::{render, Pos, Program, Rendered};
use regex::Regex;
use std::io::{Read, Seek, SeekFrom, Write};
use std::process::{Command, Stdio};
use std::time::Instant;
use tracing::{trace, warn};
use wait_timeout::ChildExt;

/// Dafny-style `file(line,col): Error: message`.
pub const DEFAULT_DIAGNOSTIC_PATTERN: &str =
    r"(?m)^\S*\((?P<line>\d+),(?P<col>\d+)\):\s*Error:?\s*(?P<msg>.*)$";

/// Placeholder replaced by the rendered program's path.
const FILE_PLACEHOLDER: &str = "{file}";

/// Runs an external verifier command.
#[derive(Debug, Clone)]
pub struct CommandOracle {
    program: String,
    args: Vec<String>,
    extension: String,
    pattern: Regex,
}

struct RunOutput {
    success: bool,
    output: String,
    rendered: Rendered,
}

impl CommandOracle {
    /// Build from a whitespace-separated command line such as
    /// `dafny verify {file}`. Without a `{file}` placeholder the path is
    /// appended.
    pub fn new(command: &str) -> OracleResult<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| OracleError::InvalidCommand(command.to_string()))?;
        Self::from_parts(program, parts.collect())
    }

    /// Build from an explicit program and argument list.
    pub fn from_parts(program: impl Into<String>, args: Vec<String>) -> OracleResult<Self> {
        let program = program.into();
        if program.trim().is_empty() {
            return Err(OracleError::InvalidCommand(program));
        }
        Ok(Self {
            program,
            args,
            extension: "dfy".to_string(),
            pattern: Regex::new(DEFAULT_DIAGNOSTIC_PATTERN)?,
        })
    }

    /// Set the extension of the rendered temporary file.
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// Set the regex used to find failures in verifier output. It must have
    /// `line` and `col` groups and may have a `msg` group.
    pub fn with_diagnostic_pattern(mut self, pattern: &str) -> OracleResult<Self> {
        self.pattern = Regex::new(pattern)?;
        Ok(self)
    }

    fn run(&self, program: &Program, config: &OracleConfig) -> OracleResult<RunOutput> {
        let rendered = render(program);
        let mut source = tempfile::Builder::new()
            .prefix("pare-")
            .suffix(&format!(".{}", self.extension))
            .tempfile()?;
        source.write_all(rendered.text.as_bytes())?;
        source.flush()?;
        let path = source.path().display().to_string();

        let mut args: Vec<String> = self
            .args
            .iter()
            .map(|a| a.replace(FILE_PLACEHOLDER, &path))
            .collect();
        if !self.args.iter().any(|a| a.contains(FILE_PLACEHOLDER)) {
            args.push(path.clone());
        }
        args.extend(config.extra_args.iter().cloned());

        // Output goes to a file so a chatty verifier cannot block on a full pipe
        // while we wait on it.
        let mut sink = tempfile::tempfile()?;
        let mut cmd = Command::new(&self.program);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(sink.try_clone()?))
            .stderr(Stdio::from(sink.try_clone()?));

        let start = Instant::now();
        let mut child = cmd.spawn().map_err(|source| OracleError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        let status = match config.timeout {
            Some(timeout) => match child.wait_timeout(timeout)? {
                Some(status) => status,
                None => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(OracleError::Timeout(timeout));
                }
            },
            None => child.wait()?,
        };
        trace!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            success = status.success(),
            "verifier finished"
        );

        let mut output = String::new();
        sink.seek(SeekFrom::Start(0))?;
        sink.read_to_string(&mut output)?;
        drop(source);

        Ok(RunOutput {
            success: status.success(),
            output,
            rendered,
        })
    }

    /// Extract failures from verifier output, translating rendered line
    /// numbers into positions inside the owning scope's recorded span.
    fn parse_failures(
        &self,
        output: &str,
        rendered: &Rendered,
        program: &Program,
    ) -> Vec<FailureLocation> {
        self.pattern
            .captures_iter(output)
            .map(|caps| {
                let message = caps
                    .name("msg")
                    .map(|m| m.as_str().trim().to_string())
                    .unwrap_or_default();
                let line = caps.name("line").and_then(|m| m.as_str().parse().ok());
                let col = caps.name("col").and_then(|m| m.as_str().parse().ok());
                let scope = match (line, col) {
                    (Some(line), Some(col)) => rendered.scope_at(Pos::new(line, col)),
                    _ => None,
                };
                match scope {
                    Some(scope) => FailureLocation::at(program.scope(scope).span.start, message),
                    None => FailureLocation::unlocated(message),
                }
            })
            .collect()
    }
}

impl Oracle for CommandOracle {
    fn validate(&self, program: &Program, config: &OracleConfig) -> bool {
        match self.run(program, config) {
            Ok(run) => run.success,
            Err(e) => {
                warn!(error = %e, "verifier run failed, treating as not verified");
                false
            }
        }
    }

    fn diagnose(&self, program: &Program, config: &OracleConfig) -> Verdict {
        match self.run(program, config) {
            Ok(run) if run.success => Verdict::Verified,
            Ok(run) => Verdict::Failed {
                failures: self.parse_failures(&run.output, &run.rendered, program),
            },
            Err(e) => {
                warn!(error = %e, "verifier run failed, treating as not verified");
                Verdict::Failed {
                    failures: Vec::new(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pare_syntax::{Expr, Scope, Stmt};
    use std::time::Duration;

    fn two_scopes() -> Program {
        Program::new(
            "p",
            "",
            vec![
                Scope::new("A", vec![Stmt::assert(Expr::ident("a"))]),
                Scope::new("B", vec![Stmt::assert(Expr::ident("b"))]),
            ],
        )
    }

    #[test]
    fn test_new_splits_command() {
        let oracle = CommandOracle::new("dafny verify --cores 2").unwrap();
        assert_eq!(oracle.program, "dafny");
        assert_eq!(oracle.args, vec!["verify", "--cores", "2"]);
        assert!(CommandOracle::new("   ").is_err());
    }

    #[test]
    fn test_parse_failures_maps_to_scope_span() {
        let program = two_scopes();
        let rendered = render(&program);
        let b_line = rendered
            .text
            .lines()
            .position(|l| l.contains("assert b;"))
            .unwrap()
            + 1;
        let output = format!(
            "p.dfy({b_line},5): Error: assertion might not hold\n\
             p.dfy(999,1): Error: something odd\n\
             Dafny program verifier finished with 1 verified, 1 error\n"
        );
        let oracle = CommandOracle::new("dafny").unwrap();
        let failures = oracle.parse_failures(&output, &rendered, &program);
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0].position, Some(program.scopes[1].span.start));
        assert_eq!(failures[0].message, "assertion might not hold");
        assert_eq!(failures[1].position, None);
    }

    #[test]
    fn test_custom_pattern() {
        let program = two_scopes();
        let rendered = render(&program);
        let oracle = CommandOracle::new("verus")
            .unwrap()
            .with_diagnostic_pattern(r"(?m)^error at (?P<line>\d+):(?P<col>\d+)$")
            .unwrap();
        let failures = oracle.parse_failures("error at 3:1\n", &rendered, &program);
        assert_eq!(failures, vec![FailureLocation::at(program.scopes[0].span.start, "")]);
    }

    #[cfg(unix)]
    #[test]
    fn test_exit_status_decides_validity() {
        let program = two_scopes();
        let config = OracleConfig::default();
        assert!(CommandOracle::new("true").unwrap().validate(&program, &config));
        assert!(!CommandOracle::new("false").unwrap().validate(&program, &config));
    }

    #[cfg(unix)]
    #[test]
    fn test_diagnose_reads_output() {
        let program = two_scopes();
        let oracle = CommandOracle::from_parts(
            "sh",
            vec![
                "-c".to_string(),
                "echo \"$0(3,3): Error: boom\"; exit 1".to_string(),
                "{file}".to_string(),
            ],
        )
        .unwrap();
        let verdict = oracle.diagnose(&program, &OracleConfig::default());
        assert_eq!(
            verdict,
            Verdict::Failed {
                failures: vec![FailureLocation::at(program.scopes[0].span.start, "boom")]
            }
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_is_not_verified() {
        let program = two_scopes();
        let config = OracleConfig {
            timeout: Some(Duration::from_millis(100)),
            ..OracleConfig::default()
        };
        let oracle = CommandOracle::from_parts(
            "sh",
            vec!["-c".to_string(), "sleep 5".to_string(), "{file}".to_string()],
        )
        .unwrap();
        assert!(!oracle.validate(&program, &config));
    }

    #[test]
    fn test_missing_verifier_is_not_verified() {
        let program = two_scopes();
        let oracle = CommandOracle::new("pare-no-such-verifier-binary").unwrap();
        assert!(!oracle.validate(&program, &OracleConfig::default()));
        assert_eq!(
            oracle.diagnose(&program, &OracleConfig::default()),
            Verdict::Failed { failures: vec![] }
        );
    }
}
