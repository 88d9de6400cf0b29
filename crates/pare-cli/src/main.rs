//! Command-line interface for the pare annotation minimizer.

use clap::{Parser, Subcommand};
use miette::{Diagnostic, NamedSource, SourceSpan};
use pare_min::{
    CandidateKind, Inventory, KindSet, MinimizeConfig, MinimizeError, Minimizer, Report, Strategy,
};
use pare_oracle::{CommandOracle, OracleConfig};
use pare_syntax::{render, LoadError, Program};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// CLI error with source context for pretty printing.
#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    #[error("failed to read {path}: {message}")]
    IoError { path: String, message: String },

    #[error("invalid program: {message}")]
    #[diagnostic(code(pare::load_error))]
    JsonError {
        message: String,
        #[source_code]
        src: NamedSource<Arc<String>>,
        #[label("here")]
        span: SourceSpan,
    },

    #[error("invalid program: {message}")]
    #[diagnostic(code(pare::load_error))]
    LoadError { message: String },

    #[error("verifier setup failed: {message}")]
    #[diagnostic(code(pare::oracle_error), help("check --verifier and --pattern"))]
    OracleError { message: String },

    #[error("{file}: {message}")]
    #[diagnostic(code(pare::minimize_error))]
    MinimizeError { file: String, message: String },

    #[error("{failed} of {total} programs could not be minimized")]
    BatchError { failed: usize, total: usize },

    #[error("{message}")]
    Other { message: String },
}

impl CliError {
    fn from_load_error(e: LoadError, source: Arc<String>, filename: &str) -> Self {
        match e {
            LoadError::Json(json) => {
                let offset = byte_offset(&source, json.line(), json.column());
                CliError::JsonError {
                    message: json.to_string(),
                    src: NamedSource::new(filename, source),
                    span: (offset, 0).into(),
                }
            }
            other => CliError::LoadError {
                message: other.to_string(),
            },
        }
    }

    fn from_minimize_error(e: MinimizeError, filename: &str) -> Self {
        CliError::MinimizeError {
            file: filename.to_string(),
            message: e.to_string(),
        }
    }
}

type CliResult<T> = Result<T, CliError>;

/// Byte offset of a 1-based line and column, clamped to the source.
fn byte_offset(source: &str, line: usize, column: usize) -> usize {
    let line_start: usize = source
        .split_inclusive('\n')
        .take(line.saturating_sub(1))
        .map(str::len)
        .sum();
    (line_start + column.saturating_sub(1)).min(source.len())
}

#[derive(Parser)]
#[command(name = "pare", version)]
#[command(about = "Remove verification annotations a program does not need", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Verifier options shared by the subcommands that run one.
#[derive(clap::Args, Clone)]
struct VerifierArgs {
    /// Verifier command line; `{file}` is replaced by the program path,
    /// otherwise the path is appended
    #[arg(long, value_name = "CMD")]
    verifier: String,

    /// Extra argument passed to every verifier run (repeatable)
    #[arg(long = "verifier-arg", value_name = "ARG", allow_hyphen_values = true)]
    verifier_args: Vec<String>,

    /// Per-call verifier timeout in seconds (0 = unlimited)
    #[arg(long, default_value = "120")]
    timeout: u64,

    /// Extension of the rendered program file
    #[arg(long, default_value = "dfy")]
    extension: String,

    /// Regex locating failures in verifier output (needs `line` and `col` groups)
    #[arg(long, value_name = "REGEX")]
    pattern: Option<String>,

    /// Annotation kinds to consider (comma-separated; default all)
    #[arg(long, value_delimiter = ',', value_name = "KIND")]
    kinds: Vec<CandidateKind>,
}

impl VerifierArgs {
    fn oracle(&self) -> CliResult<CommandOracle> {
        let setup = |e: pare_oracle::OracleError| CliError::OracleError {
            message: e.to_string(),
        };
        let oracle = CommandOracle::new(&self.verifier)
            .map_err(setup)?
            .with_extension(self.extension.clone());
        match &self.pattern {
            Some(pattern) => oracle.with_diagnostic_pattern(pattern).map_err(setup),
            None => Ok(oracle),
        }
    }

    fn oracle_config(&self) -> OracleConfig {
        OracleConfig {
            timeout: (self.timeout > 0).then(|| Duration::from_secs(self.timeout)),
            extra_args: self.verifier_args.clone(),
        }
    }

    fn kinds(&self) -> KindSet {
        if self.kinds.is_empty() {
            KindSet::all()
        } else {
            KindSet::of(&self.kinds)
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List the removable annotations of a program
    Inventory {
        /// Program file (JSON)
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Print a program as source text
    Render {
        /// Program file (JSON)
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Write output to file instead of stdout
        #[arg(short, long, value_name = "OUTPUT")]
        output: Option<PathBuf>,
    },

    /// Remove every annotation the verifier does not need
    Minimize {
        /// Program files (JSON)
        #[arg(value_name = "FILE", required = true)]
        files: Vec<PathBuf>,

        #[command(flatten)]
        verifier: VerifierArgs,

        /// Removal strategy: sequential, batched, all-kinds or explore
        #[arg(long, default_value = "batched")]
        strategy: Strategy,

        /// Do not weaken conjunctions that have to stay
        #[arg(long)]
        no_simplify: bool,

        /// Number of programs minimized in parallel (0 = use all cores)
        #[arg(short, long, default_value = "0")]
        jobs: usize,

        /// Directory for minimized programs (default: print the summary only)
        #[arg(short, long, value_name = "DIR")]
        output_dir: Option<PathBuf>,

        /// Also write a CSV report per program into the output directory
        #[arg(long)]
        report: bool,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Search removal orders for the maximal removable sets of each scope
    Explore {
        /// Program file (JSON)
        #[arg(value_name = "FILE")]
        file: PathBuf,

        #[command(flatten)]
        verifier: VerifierArgs,

        /// Largest scope (in candidates) to search
        #[arg(long, default_value = "12")]
        limit: usize,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,
    },
}

fn main() {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .build(),
        )
    }))
    .ok();

    let cli = Cli::parse();

    let filter = if matches!(
        &cli.command,
        Commands::Minimize { verbose: true, .. } | Commands::Explore { verbose: true, .. }
    ) {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Inventory { file } => cmd_inventory(&file),
        Commands::Render { file, output } => cmd_render(&file, output.as_deref()),
        Commands::Minimize {
            files,
            verifier,
            strategy,
            no_simplify,
            jobs,
            output_dir,
            report,
            verbose: _,
        } => cmd_minimize(
            &files,
            &verifier,
            strategy,
            !no_simplify,
            jobs,
            output_dir.as_deref(),
            report,
        ),
        Commands::Explore {
            file,
            verifier,
            limit,
            verbose: _,
        } => cmd_explore(&file, &verifier, limit),
    };

    if let Err(e) = result {
        eprintln!("{:?}", miette::Report::new(e));
        std::process::exit(1);
    }
}

fn load_program(file: &Path) -> CliResult<Program> {
    let filename = file.display().to_string();
    let source = Arc::new(fs::read_to_string(file).map_err(|e| CliError::IoError {
        path: filename.clone(),
        message: e.to_string(),
    })?);
    let mut program = Program::from_json(&source)
        .map_err(|e| CliError::from_load_error(e, source.clone(), &filename))?;
    if program.name.is_empty() {
        program.name = file_stem(file);
    }
    Ok(program)
}

fn file_stem(file: &Path) -> String {
    file.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "program".to_string())
}

fn write_file(path: &Path, contents: &str) -> CliResult<()> {
    fs::write(path, contents).map_err(|e| CliError::IoError {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

fn cmd_inventory(file: &Path) -> CliResult<()> {
    let program = load_program(file)?;
    let inventory = Inventory::scan(&program);

    println!("program {}", program.name);
    for scope in &inventory.scopes {
        println!("  {}", scope.name);
        for kind in CandidateKind::ALL {
            let ids: Vec<_> = match kind {
                CandidateKind::DecreasesWildcard => inventory.wildcards_in(scope.scope).collect(),
                _ => scope.list(kind).to_vec(),
            };
            if ids.is_empty() {
                continue;
            }
            println!("    {} ({})", kind, ids.len());
            for id in ids {
                println!("      {} {}", id, inventory.get(id).label);
            }
        }
    }
    println!("{} candidates", inventory.len());
    Ok(())
}

fn cmd_render(file: &Path, output: Option<&Path>) -> CliResult<()> {
    let program = load_program(file)?;
    let text = render(&program).text;
    match output {
        Some(path) => write_file(path, &text),
        None => {
            print!("{}", text);
            Ok(())
        }
    }
}

/// Result of minimizing one file.
struct FileOutcome {
    file: String,
    report: Report,
    program: Program,
}

fn minimize_file(
    file: &Path,
    oracle: &CommandOracle,
    config: MinimizeConfig,
) -> CliResult<FileOutcome> {
    let filename = file.display().to_string();
    let program = load_program(file)?;
    let mut minimizer = Minimizer::new(program, oracle, config)
        .map_err(|e| CliError::from_minimize_error(e, &filename))?;
    let outcome = minimizer
        .run()
        .map_err(|e| CliError::from_minimize_error(e, &filename))?;
    for error in &outcome.errors {
        error!(file = %filename, %error, "scope abandoned");
    }
    let report = Report::build(minimizer.inventory(), &outcome);
    Ok(FileOutcome {
        file: filename,
        report,
        program: minimizer.into_program(),
    })
}

fn cmd_minimize(
    files: &[PathBuf],
    verifier: &VerifierArgs,
    strategy: Strategy,
    simplify_conjunctions: bool,
    jobs: usize,
    output_dir: Option<&Path>,
    report: bool,
) -> CliResult<()> {
    let oracle = verifier.oracle()?;
    let config = MinimizeConfig {
        strategy,
        kinds: verifier.kinds(),
        simplify_conjunctions,
        oracle: verifier.oracle_config(),
        ..MinimizeConfig::default()
    };
    if let Some(dir) = output_dir {
        fs::create_dir_all(dir).map_err(|e| CliError::IoError {
            path: dir.display().to_string(),
            message: e.to_string(),
        })?;
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs)
        .build()
        .map_err(|e| CliError::Other {
            message: format!("failed to start worker pool: {}", e),
        })?;

    info!(files = files.len(), %strategy, "minimizing");
    let start = Instant::now();
    let results: Vec<CliResult<FileOutcome>> = pool.install(|| {
        files
            .par_iter()
            .map(|file| minimize_file(file, &oracle, config.clone()))
            .collect()
    });

    let mut failed = 0;
    for (file, result) in files.iter().zip(results) {
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                failed += 1;
                eprintln!("{:?}", miette::Report::new(e));
                continue;
            }
        };
        println!();
        println!("{}", outcome.file);
        println!("{}", outcome.report);
        if let Some(dir) = output_dir {
            let stem = file_stem(file);
            let text = render(&outcome.program).text;
            write_file(&dir.join(format!("{}.{}", stem, verifier.extension)), &text)?;
            if report {
                let mut csv = Vec::new();
                outcome
                    .report
                    .write_csv(&mut csv)
                    .map_err(|e| CliError::Other {
                        message: e.to_string(),
                    })?;
                write_file(
                    &dir.join(format!("{}.csv", stem)),
                    &String::from_utf8_lossy(&csv),
                )?;
            }
        }
    }
    info!(
        elapsed_ms = start.elapsed().as_millis() as u64,
        failed,
        "done"
    );

    if failed > 0 {
        return Err(CliError::BatchError {
            failed,
            total: files.len(),
        });
    }
    Ok(())
}

fn cmd_explore(file: &Path, verifier: &VerifierArgs, limit: usize) -> CliResult<()> {
    let filename = file.display().to_string();
    let program = load_program(file)?;
    let oracle = verifier.oracle()?;
    let config = MinimizeConfig {
        strategy: Strategy::Explore,
        kinds: verifier.kinds(),
        explore_limit: limit,
        oracle: verifier.oracle_config(),
        ..MinimizeConfig::default()
    };
    let mut minimizer = Minimizer::new(program, &oracle, config)
        .map_err(|e| CliError::from_minimize_error(e, &filename))?;
    let outcome = minimizer
        .run()
        .map_err(|e| CliError::from_minimize_error(e, &filename))?;

    let inventory = minimizer.inventory();
    for study in &outcome.studies {
        let scope = inventory.scope(study.scope);
        println!();
        if study.skipped {
            println!(
                "{}: {} candidates, over the limit of {}, skipped",
                scope.name,
                study.candidates.len(),
                limit
            );
            continue;
        }
        println!(
            "{}: {} candidates, {} maximal removal sets, best removes {}",
            scope.name,
            study.candidates.len(),
            study.solutions.len(),
            study.best()
        );
        for (i, solution) in study.solutions.iter().enumerate() {
            let labels: Vec<&str> = solution
                .iter()
                .map(|id| inventory.get(*id).label.as_str())
                .collect();
            println!("  {}: {{{}}}", i + 1, labels.join(", "));
        }
    }
    println!();
    println!("{} oracle calls", outcome.stats.oracle_calls);
    Ok(())
}
