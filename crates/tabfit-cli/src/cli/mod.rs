//! Command-line driver: load a JSON evaluation job (problem + table +
//! parameter vector), run the engine once, report the residual.

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::thread;
use tabfit_core::{
    Communicator, ControlFlag, EvalOptions, EvaluationEngine, FittingProblem, PotentialTable,
    ResidualBuffer, SoloCommunicator, ThreadGroup,
};

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("failed to read evaluation job '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse evaluation job '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// On-disk description of one evaluation: the fitting problem, the
/// potential table, the flat parameter vector, and the runtime switches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationJob {
    pub problem: FittingProblem,
    pub table: PotentialTable,
    pub parameters: Vec<f64>,
    #[serde(default)]
    pub options: EvalOptions,
}

impl EvaluationJob {
    pub fn load(path: &Path) -> Result<Self, JobError> {
        let source = std::fs::read_to_string(path).map_err(|source| JobError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&source).map_err(|source| JobError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[derive(Debug, Parser)]
#[command(name = "tabfit", about = "Residual evaluation for spline-tabulated potentials")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Evaluate the residual of a job file once and print it as JSON.
    Evaluate {
        /// Path to the evaluation job (JSON).
        job: PathBuf,
        /// Number of in-process ranks to spread the configurations over.
        #[arg(long, default_value_t = 1)]
        ranks: usize,
    },
    /// Validate a job file without evaluating it.
    Check {
        /// Path to the evaluation job (JSON).
        job: PathBuf,
    },
}

pub fn run_from_env() -> i32 {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match dispatch(cli.command) {
        Ok(()) => 0,
        Err(error) => {
            eprintln!("error: {error:#}");
            1
        }
    }
}

fn dispatch(command: Command) -> anyhow::Result<()> {
    match command {
        Command::Evaluate { job, ranks } => evaluate(&job, ranks),
        Command::Check { job } => check(&job),
    }
}

fn evaluate(path: &Path, ranks: usize) -> anyhow::Result<()> {
    let job = EvaluationJob::load(path)?;
    anyhow::ensure!(ranks >= 1, "at least one rank is required");

    let residual = if ranks == 1 {
        evaluate_solo(&job)?
    } else {
        evaluate_group(&job, ranks)?
    };

    let report = serde_json::json!({
        "residual": residual,
        "ranks": ranks,
    });
    println!("{report}");
    Ok(())
}

fn evaluate_solo(job: &EvaluationJob) -> anyhow::Result<f64> {
    let comm = SoloCommunicator;
    let mut engine = EvaluationEngine::new(&comm, &job.problem, job.table.clone(), job.options)
        .context("engine construction")?;
    let mut params = job.parameters.clone();
    let mut residuals = ResidualBuffer::new(job.problem.layout(job.options.stress));
    let outcome = engine
        .evaluate(&mut params, &mut residuals, ControlFlag::Evaluate)
        .context("evaluation")?;
    outcome.context("coordinator produced no residual")
}

fn evaluate_group(job: &EvaluationJob, ranks: usize) -> anyhow::Result<f64> {
    let handles = ThreadGroup::split(ranks);
    let results: Vec<anyhow::Result<Option<f64>>> = thread::scope(|scope| {
        let mut joins = Vec::new();
        for comm in handles {
            joins.push(scope.spawn(move || -> anyhow::Result<Option<f64>> {
                let mut engine =
                    EvaluationEngine::new(&comm, &job.problem, job.table.clone(), job.options)
                        .context("engine construction")?;
                let mut params = job.parameters.clone();
                let mut residuals =
                    ResidualBuffer::new(job.problem.layout(job.options.stress));

                if comm.rank() == 0 {
                    let total = engine
                        .evaluate(&mut params, &mut residuals, ControlFlag::Evaluate)
                        .context("evaluation round")?;
                    engine
                        .evaluate(&mut params, &mut residuals, ControlFlag::Terminate)
                        .context("terminate round")?;
                    Ok(total)
                } else {
                    engine
                        .evaluate(&mut params, &mut residuals, ControlFlag::Evaluate)
                        .context("worker loop")?;
                    Ok(None)
                }
            }));
        }
        joins
            .into_iter()
            .map(|join| match join.join() {
                Ok(result) => result,
                Err(_) => Err(anyhow::anyhow!("a rank panicked during evaluation")),
            })
            .collect()
    });

    let mut residual = None;
    for result in results {
        if let Some(total) = result? {
            residual = Some(total);
        }
    }
    residual.ok_or_else(|| anyhow::anyhow!("no rank produced a residual"))
}

fn check(path: &Path) -> anyhow::Result<()> {
    let job = EvaluationJob::load(path)?;
    job.problem
        .validate(job.options.stress)
        .context("problem validation")?;
    job.table.validate_shape().context("table validation")?;
    let expected = job.table.parameter_len();
    anyhow::ensure!(
        job.parameters.len() == expected,
        "parameter vector has {} entries, table expects {expected}",
        job.parameters.len()
    );

    tracing::info!(path = %path.display(), "job file is consistent");
    let report = serde_json::json!({
        "atoms": job.problem.atoms.len(),
        "configurations": job.problem.configurations.len(),
        "columns": job.table.columns.len(),
        "parameters": job.parameters.len(),
    });
    println!("{report}");
    Ok(())
}
