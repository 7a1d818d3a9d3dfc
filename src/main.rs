//! lazyground - lazy-grounding first-order theory solver
//!
//! Command-line interface: load a theory, optional evidence and
//! deterministic facts, find one or several models.

use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};

use lazyground::{
    parse_clause, parse_literal, Clause, GroundState, GroundingMode, Literal, RestartSchedule,
    SolverConfig, SubsumptionMode, TheorySolver,
};

#[derive(Parser)]
#[command(name = "lazyground")]
#[command(version = "0.1.0")]
#[command(about = "Lazy-grounding first-order theory solver", long_about = None)]
struct Cli {
    /// Theory file, one clause per line (stdin when absent)
    #[arg(value_name = "FILE")]
    input: Option<PathBuf>,

    /// Evidence file, one ground literal per line
    #[arg(long, value_name = "FILE")]
    evidence: Option<PathBuf>,

    /// Deterministic facts file, one ground atom per line
    #[arg(long, value_name = "FILE")]
    deterministic: Option<PathBuf>,

    /// Enumerate up to N models instead of finding one
    #[arg(long, value_name = "N")]
    all: Option<usize>,

    /// Grounding mode
    #[arg(long, value_enum, default_value = "cutting-planes")]
    mode: Mode,

    /// Object-identity subsumption (distinct variables bind distinct
    /// constants)
    #[arg(long)]
    oi: bool,

    /// Cap per-rule violation gathering at N samples per iteration
    #[arg(long, value_name = "N")]
    sample: Option<usize>,

    /// Restart the active rule set every N iterations
    #[arg(long, value_name = "N")]
    restart: Option<usize>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Lazily ground only violated rule instances
    CuttingPlanes,
    /// Instantiate all rules up front
    GroundAll,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// One literal per line, models separated by blank lines
    Text,
    /// JSON array of models
    Json,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let content = match &cli.input {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read file: {}", path.display()))?,
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read from stdin")?;
            buf
        }
    };
    let rules = parse_clauses(&content).context("Failed to parse theory")?;
    let evidence = read_literals(cli.evidence.as_ref()).context("Failed to parse evidence")?;
    let deterministic =
        read_literals(cli.deterministic.as_ref()).context("Failed to parse deterministic facts")?;

    let config = SolverConfig {
        mode: match cli.mode {
            Mode::CuttingPlanes => GroundingMode::CuttingPlanes,
            Mode::GroundAll => GroundingMode::GroundAll,
        },
        subsumption_mode: if cli.oi {
            SubsumptionMode::ObjectIdentity
        } else {
            SubsumptionMode::Theta
        },
        active_rule_subsample: cli.sample.unwrap_or(usize::MAX),
        restart_schedule: match cli.restart {
            Some(n) => RestartSchedule::Constant(n),
            None => RestartSchedule::Never,
        },
        verbose: cli.verbose,
        ..SolverConfig::default()
    };
    let mut solver = TheorySolver::with_config(config);

    let models: Vec<GroundState> = match cli.all {
        Some(n) => solver.solve_all(&rules, &evidence, &deterministic, None, n, n)?,
        None => solver
            .solve(&rules, &evidence, &deterministic)?
            .into_iter()
            .collect(),
    };

    if models.is_empty() {
        eprintln!("no model");
        return Ok(ExitCode::FAILURE);
    }
    print_models(&models, cli.format)?;
    Ok(ExitCode::SUCCESS)
}

fn parse_clauses(content: &str) -> Result<Vec<Clause>> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| parse_clause(line).map_err(Into::into))
        .collect()
}

fn read_literals(path: Option<&PathBuf>) -> Result<std::collections::BTreeSet<Literal>> {
    let Some(path) = path else {
        return Ok(Default::default());
    };
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| parse_literal(line).map_err(Into::into))
        .collect()
}

fn print_models(models: &[GroundState], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            for (i, model) in models.iter().enumerate() {
                if i > 0 {
                    println!();
                }
                for literal in model {
                    println!("{}", literal);
                }
            }
        }
        OutputFormat::Json => {
            let rendered: Vec<Vec<String>> = models
                .iter()
                .map(|m| m.iter().map(|l| l.to_string()).collect())
                .collect();
            println!("{}", serde_json::to_string_pretty(&rendered)?);
        }
    }
    Ok(())
}
