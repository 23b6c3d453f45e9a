//! vitalrisk: vital-sign risk assessment CLI.
//!
//! Usage:
//!   vitalrisk assess --input <file.json|->
//!   vitalrisk assess --db <vitals.db> --patient <id> [--lookback-days <n>]
//!   vitalrisk assess --db <vitals.db> --all
//!   vitalrisk import --db <vitals.db> --patient <id> --input <file.json|-> [--strict]
//!   vitalrisk config
//!
//! Results are written to stdout as JSON; logs go to stderr or a file.

use std::io::{IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use vitalrisk::adapters::sanitize::RedactingMakeWriter;
use vitalrisk::adapters::SqliteObservationStore;
use vitalrisk::application::AssessmentService;
use vitalrisk::domain::{ObservationSet, RawObservation};
use vitalrisk::ports::ObservationSource;
use vitalrisk::EngineConfig;

#[derive(Parser)]
#[command(name = "vitalrisk")]
#[command(version)]
#[command(about = "Risk scoring, projection and alerts from vital-sign observations", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// JSON config file (defaults are used for anything it omits)
    #[arg(long, global = true, env = "VITALRISK_CONFIG")]
    config: Option<PathBuf>,

    /// Skip the explanation step
    #[arg(long, global = true)]
    no_explain: bool,

    /// Single-line JSON output
    #[arg(long, global = true)]
    compact: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Score one or more observation windows
    Assess(AssessArgs),

    /// Validate observations from a JSON file and store them
    Import {
        /// SQLite database path
        #[arg(long)]
        db: PathBuf,

        /// Patient the observations belong to
        #[arg(long)]
        patient: String,

        /// JSON array of observations, or '-' for stdin
        #[arg(long)]
        input: String,

        /// Refuse the whole file if any record is invalid
        #[arg(long)]
        strict: bool,
    },

    /// Print the effective configuration
    Config,
}

#[derive(Args)]
struct AssessArgs {
    /// JSON array of observations, or '-' for stdin
    #[arg(long, conflicts_with = "db")]
    input: Option<String>,

    /// SQLite database path
    #[arg(long)]
    db: Option<PathBuf>,

    /// Patient to assess (with --db)
    #[arg(long, requires = "db", conflicts_with = "all")]
    patient: Option<String>,

    /// Assess every stored patient (with --db)
    #[arg(long, requires = "db")]
    all: bool,

    /// Only use observations from the last N days (with --db)
    #[arg(long, requires = "db")]
    lookback_days: Option<u32>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ImportSummary<'a> {
    patient_id: &'a str,
    stored: usize,
    skipped: Vec<vitalrisk::application::SkippedRecord>,
}

fn init_logging() -> Result<tracing_appender::non_blocking::WorkerGuard> {
    // stdout carries JSON results, so logs never go there.
    let log_mode = std::env::var("VITALRISK_LOG_MODE").unwrap_or_else(|_| "auto".to_string());
    let use_file = match log_mode.as_str() {
        "file" => true,
        "stderr" => false,
        // auto: log to a file when stderr is not watched by anyone
        _ => !std::io::stderr().is_terminal() && std::env::var_os("VITALRISK_LOG_FILE").is_some(),
    };

    let (writer, guard) = if use_file {
        let log_file =
            std::env::var("VITALRISK_LOG_FILE").unwrap_or_else(|_| "vitalrisk.log".to_string());

        if let Some(parent) = Path::new(&log_file).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Cannot create log directory {}", parent.display()))?;
            }
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .with_context(|| format!("Cannot open log file {log_file}"))?;
        tracing_appender::non_blocking(file)
    } else {
        tracing_appender::non_blocking(std::io::stderr())
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(RedactingMakeWriter::new(writer)),
        )
        .init();

    Ok(guard)
}

fn read_records(input: &str) -> Result<Vec<RawObservation>> {
    let text = if input == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Cannot read observations from stdin")?;
        buf
    } else {
        std::fs::read_to_string(input).with_context(|| format!("Cannot read {input}"))?
    };
    serde_json::from_str(&text).context("Observations must be a JSON array of records")
}

fn print_json<T: Serialize>(value: &T, compact: bool) -> Result<()> {
    let out = if compact {
        serde_json::to_string(value)?
    } else {
        serde_json::to_string_pretty(value)?
    };
    println!("{out}");
    Ok(())
}

fn assess(service: &AssessmentService, args: AssessArgs, compact: bool) -> Result<()> {
    match (args.input, args.db) {
        (Some(input), None) => {
            let records = read_records(&input)?;
            print_json(&service.assess_raw(&records), compact)
        }
        (None, Some(db)) => {
            let store = SqliteObservationStore::new(&db)
                .with_context(|| format!("Cannot open database {}", db.display()))?;
            let since = args
                .lookback_days
                .map(|days| chrono::Utc::now() - chrono::Duration::days(i64::from(days)));

            if args.all {
                let patients = store.patients()?;
                tracing::info!("Assessing {} patient(s)", patients.len());
                print_json(&service.assess_patients(&store, &patients, since)?, compact)
            } else if let Some(patient) = args.patient {
                print_json(&service.assess_patient(&store, &patient, since)?, compact)
            } else {
                bail!("--db needs --patient <id> or --all")
            }
        }
        _ => bail!("assess needs either --input <file> or --db <path>"),
    }
}

fn import(db: &Path, patient: &str, input: &str, strict: bool, compact: bool) -> Result<()> {
    let records = read_records(input)?;

    let (set, rejected) = if strict {
        let observations = records
            .iter()
            .map(RawObservation::validate)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(vitalrisk::VitalRiskError::from)?;
        (ObservationSet::from_observations(observations), Vec::new())
    } else {
        ObservationSet::ingest(&records)
    };

    let store = SqliteObservationStore::new(db)
        .with_context(|| format!("Cannot open database {}", db.display()))?;
    let observations: Vec<_> = set.iter().cloned().collect();
    let stored = store.record_all(patient, &observations)?;
    tracing::info!("Imported {} observation(s), skipped {}", stored, rejected.len());

    print_json(
        &ImportSummary {
            patient_id: patient,
            stored,
            skipped: rejected.into_iter().map(Into::into).collect(),
        },
        compact,
    )
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = init_logging()?;

    // Configuration problems are fatal: nothing is scored with a bad table.
    let config = match EngineConfig::load(cli.config.as_deref()) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            tracing::error!("Refusing to start: {}", e);
            return Err(e).context("Invalid configuration");
        }
    };

    match cli.command {
        Command::Config => print_json(config.as_ref(), cli.compact),
        Command::Assess(args) => {
            let service = AssessmentService::from_config(Arc::clone(&config))?
                .with_explanations(config.explanation.enabled && !cli.no_explain);
            assess(&service, args, cli.compact)
        }
        Command::Import {
            db,
            patient,
            input,
            strict,
        } => import(&db, &patient, &input, strict, cli.compact),
    }
}
