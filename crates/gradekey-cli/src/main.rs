mod display;
mod export;

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use gradekey_core::{
    DEFAULT_TOLERANCE, Evaluation, GradeOutcome, GradingConfig, RubricNode, canonical_key,
    flatten, grade_submission, normalize, parse_evaluation_str, parse_rubric_str,
    score_table_batch,
};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

/// Exit status for `--strict` runs that produced findings.
const EXIT_FINDINGS: u8 = 2;

#[derive(Parser)]
#[command(name = "gradekey", version, about = "Rubric key normalisation and grade reconciliation")]
struct Cli {
    /// Log at debug level (RUST_LOG overrides).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the canonical key for a base question and optional sub-label.
    Normalize {
        base: String,
        suffix: Option<String>,
    },
    /// Flatten a rubric and list its canonical leaf keys.
    Flatten {
        #[arg(long)]
        rubric: PathBuf,
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },
    /// Map an evaluation onto a rubric and check the totals.
    Reconcile(ReconcileArgs),
}

#[derive(clap::Args)]
struct ReconcileArgs {
    #[arg(long)]
    rubric: PathBuf,
    #[arg(long)]
    evaluation: PathBuf,
    /// Overall grade to check against, instead of the evaluation's own.
    #[arg(long)]
    overall: Option<f64>,
    #[arg(long, env = "GRADEKEY_TOLERANCE", default_value_t = DEFAULT_TOLERANCE)]
    tolerance: f64,
    /// Also register qualified subsection ids (`3.2.1` under `3`) under their literal key.
    #[arg(
        long,
        env = "GRADEKEY_QUALIFIED_ALIAS",
        default_value_t = true,
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    qualified_alias: bool,
    #[arg(long, value_enum, default_value_t = Format::Text)]
    format: Format,
    /// Also write the score table to this Parquet file.
    #[arg(long)]
    parquet: Option<PathBuf>,
    /// Exit with status 2 when any finding is reported.
    #[arg(long)]
    strict: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Normalize { base, suffix } => {
            let normalized = normalize(&base, suffix.as_deref());
            match canonical_key(&base, suffix.as_deref()) {
                Some(key) => println!("{key}"),
                None => {
                    tracing::warn!(%base, ?suffix, %normalized, "no canonical key");
                    println!("{normalized}");
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Flatten { rubric, format } => {
            let rubric = load_rubric(&rubric)?;
            let schema = flatten(&rubric)?;
            match format {
                Format::Text => display::print_schema_card(&schema),
                Format::Json => println!("{}", serde_json::to_string_pretty(&schema)?),
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Reconcile(args) => run_reconcile(args),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// JSON envelope for `reconcile --format json`.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReconcileOutput<'a> {
    generated_at: String,
    #[serde(flatten)]
    outcome: &'a GradeOutcome,
}

fn run_reconcile(args: ReconcileArgs) -> anyhow::Result<ExitCode> {
    let config = GradingConfig {
        tolerance: args.tolerance,
        qualified_alias: args.qualified_alias,
    };

    let rubric = load_rubric(&args.rubric)?;
    let mut evaluation = load_evaluation(&args.evaluation)?;
    if let Some(overall) = args.overall {
        evaluation.overall_grade = Some(overall);
    }

    let outcome = grade_submission(&rubric, &evaluation, &config)?;
    let batch = score_table_batch(&outcome.schema, &outcome.table)?;

    match args.format {
        Format::Text => display::print_report_card(&outcome, &batch)?,
        Format::Json => {
            let output = ReconcileOutput {
                generated_at: chrono::Utc::now().to_rfc3339(),
                outcome: &outcome,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    if let Some(path) = &args.parquet {
        export::write_parquet(path, &batch)?;
    }

    if args.strict && !outcome.is_clean() {
        tracing::warn!(findings = outcome.findings.len(), "strict mode: findings reported");
        return Ok(ExitCode::from(EXIT_FINDINGS));
    }
    Ok(ExitCode::SUCCESS)
}

fn load_rubric(path: &Path) -> anyhow::Result<RubricNode> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    parse_rubric_str(&text).with_context(|| format!("parsing rubric {}", path.display()))
}

fn load_evaluation(path: &Path) -> anyhow::Result<Evaluation> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    parse_evaluation_str(&text).with_context(|| format!("parsing evaluation {}", path.display()))
}
