//! QTc CLI - Command-line interface for the QTc engine
//!
//! Commands:
//! - calculate: Compute a QTc and record it in the history
//! - history: Print the recorded computations
//! - curve: Print the reference density curve
//! - doctor: Diagnose configuration, service and history health

use clap::{Parser, Subcommand};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

use qtc_engine::{
    generate_curve, FileKvStore, HistoryStore, QtcConfig, QtcEngine, QtcError, QtcService,
    QtcSession, HISTORY_SCHEMA, PRODUCER_NAME, QTC_VERSION,
};

/// qtc - Rate-corrected QT interval calculator
#[derive(Parser)]
#[command(name = "qtc")]
#[command(version = QTC_VERSION)]
#[command(about = "Compute rate-corrected QT intervals", long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the history store
    #[arg(long, global = true)]
    history_dir: Option<PathBuf>,

    /// Computation service base URL
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Enable debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute a QTc and record it in the history
    Calculate {
        /// QT interval value
        #[arg(long)]
        qt: f64,

        /// QT unit: ms or squares (40 ms small grid squares)
        #[arg(long, default_value = "ms")]
        unit: String,

        /// Heart rate (bpm)
        #[arg(long)]
        hr: f64,

        /// RR interval (seconds)
        #[arg(long)]
        rr: f64,

        /// Correction formula: Bazett, Fridericia, Framingham or Hodges
        #[arg(long, default_value = "Bazett")]
        formula: String,

        /// Evaluate in-process instead of calling the computation service
        #[arg(long)]
        local: bool,

        /// Include the reference density curve in the output
        #[arg(long)]
        curve: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the recorded computations
    History {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the reference density curve as JSON
    Curve,

    /// Diagnose configuration, service and history health
    Doctor {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), QtcCliError> {
    let mut config = QtcConfig::load(cli.config.as_deref())?;
    if let Some(dir) = cli.history_dir {
        config.history_dir = dir;
    }
    if let Some(endpoint) = cli.endpoint {
        config.endpoint = endpoint;
    }

    match cli.command {
        Commands::Calculate {
            qt,
            unit,
            hr,
            rr,
            formula,
            local,
            curve,
            json,
        } => {
            let form = CalculateForm {
                qt,
                unit,
                hr,
                rr,
                formula,
            };
            let store = history_store(&config);
            if local {
                cmd_calculate(QtcEngine::local(), store, &form, curve, json)
            } else {
                cmd_calculate(QtcEngine::remote(&config), store, &form, curve, json)
            }
        }

        Commands::History { json } => cmd_history(&config, json),

        Commands::Curve => {
            println!("{}", serde_json::to_string_pretty(&generate_curve())?);
            Ok(())
        }

        Commands::Doctor { json } => cmd_doctor(&config, json),
    }
}

fn history_store(config: &QtcConfig) -> HistoryStore<FileKvStore> {
    HistoryStore::new(
        FileKvStore::new(&config.history_dir),
        config.history_key.clone(),
    )
}

/// Raw `calculate` arguments, unit and formula still unparsed
struct CalculateForm {
    qt: f64,
    unit: String,
    hr: f64,
    rr: f64,
    formula: String,
}

fn cmd_calculate<C: QtcService>(
    engine: QtcEngine<C>,
    store: HistoryStore<FileKvStore>,
    form: &CalculateForm,
    with_curve: bool,
    json: bool,
) -> Result<(), QtcCliError> {
    let mut session = QtcSession::open(engine, store);
    let result = session.calculate_form(form.qt, &form.unit, form.hr, form.rr, &form.formula)?;
    let state = session.state();

    if json {
        let output = CalculateOutput {
            qtc: result.qtc,
            formula: &form.formula,
            history_entries: state.history.len(),
            curve: with_curve.then(|| state.curve.clone()),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("QTc ({}): {:.1} ms", form.formula, result.qtc);
        println!("History:  {} entries", state.history.len());
        if with_curve {
            println!("\nReference curve (qtc ms, density):");
            for point in &state.curve {
                println!("  {:>6.1}  {:.6}", point.qtc, point.density);
            }
        }
    }

    Ok(())
}

fn cmd_history(config: &QtcConfig, json: bool) -> Result<(), QtcCliError> {
    let log = history_store(config).load();

    // Piped output defaults to JSON
    if json || !atty::is(atty::Stream::Stdout) {
        println!("{}", serde_json::to_string_pretty(&log)?);
        return Ok(());
    }

    if log.is_empty() {
        println!("No computations recorded");
        return Ok(());
    }

    println!("{:<4} {:>8} {:>6} {:>6}  {:<11} {:>8}", "#", "QT", "HR", "RR", "Formula", "QTc");
    for (i, entry) in log.iter().enumerate() {
        println!(
            "{:<4} {:>8.1} {:>6.1} {:>6.3}  {:<11} {:>8.1}",
            i + 1,
            entry.qt,
            entry.fc,
            entry.rr,
            entry.method.as_str(),
            entry.qtc
        );
    }

    Ok(())
}

fn cmd_doctor(config: &QtcConfig, json: bool) -> Result<(), QtcCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "qtc_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("qtc-engine version {}", QTC_VERSION),
    });

    checks.push(DoctorCheck {
        name: "endpoint".to_string(),
        status: CheckStatus::Ok,
        message: format!(
            "{} (timeout {} ms, {} attempts)",
            config.calculate_url(),
            config.request_timeout_ms,
            config.max_attempts
        ),
    });

    // Reference computation: no correction at 60 bpm / RR 1 s
    let reference = QtcEngine::remote(config).compute_qtc_named(400.0, 60.0, 1.0, "Bazett");
    checks.push(match reference {
        Ok(result) if (result.qtc - 400.0).abs() < 1e-6 => DoctorCheck {
            name: "service".to_string(),
            status: CheckStatus::Ok,
            message: "Service reachable and consistent".to_string(),
        },
        Ok(result) => DoctorCheck {
            name: "service".to_string(),
            status: CheckStatus::Error,
            message: format!("Service returned {} for a 400 ms QT at RR 1 s", result.qtc),
        },
        Err(e) => DoctorCheck {
            name: "service".to_string(),
            status: CheckStatus::Warning,
            message: format!("Service unavailable ({}); use --local", e),
        },
    });

    let store = history_store(config);
    let history_path = store.backend().path_for(store.key())?;
    checks.push(match store.try_load() {
        Ok(log) if history_path.exists() => DoctorCheck {
            name: "history".to_string(),
            status: CheckStatus::Ok,
            message: format!(
                "{} valid ({} entries, schema {})",
                history_path.display(),
                log.len(),
                HISTORY_SCHEMA
            ),
        },
        Ok(_) => DoctorCheck {
            name: "history".to_string(),
            status: CheckStatus::Warning,
            message: format!("{} does not exist yet", history_path.display()),
        },
        Err(e) => DoctorCheck {
            name: "history".to_string(),
            status: CheckStatus::Error,
            message: format!("{} unreadable: {}", history_path.display(), e),
        },
    });

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: QTC_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("QTc Doctor Report");
        println!("=================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report.checks.iter().any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(QtcCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Error types

#[derive(Debug)]
enum QtcCliError {
    Engine(QtcError),
    Json(serde_json::Error),
    DoctorFailed,
}

impl From<QtcError> for QtcCliError {
    fn from(e: QtcError) -> Self {
        QtcCliError::Engine(e)
    }
}

impl From<serde_json::Error> for QtcCliError {
    fn from(e: serde_json::Error) -> Self {
        QtcCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<QtcCliError> for CliError {
    fn from(e: QtcCliError) -> Self {
        match e {
            QtcCliError::Engine(e) => {
                let (code, hint) = match &e {
                    QtcError::InvalidUnit(_) => ("INVALID_UNIT", "Use --unit ms or --unit squares"),
                    QtcError::UnknownFormula(_) => (
                        "UNKNOWN_FORMULA",
                        "Use Bazett, Fridericia, Framingham or Hodges",
                    ),
                    QtcError::InvalidMeasurement(_) => (
                        "INVALID_MEASUREMENT",
                        "QT must be >= 0, heart rate and RR must be > 0",
                    ),
                    QtcError::ComputationUnavailable(_) => (
                        "COMPUTATION_UNAVAILABLE",
                        "Check --endpoint or retry with --local",
                    ),
                    QtcError::PersistenceCorrupt(_) => {
                        ("PERSISTENCE_CORRUPT", "Run 'qtc doctor' for details")
                    }
                    QtcError::Busy => ("BUSY", "Wait for the running computation"),
                    QtcError::Config(_) => ("CONFIG_ERROR", "Check the --config file"),
                    QtcError::Io(_) => ("IO_ERROR", "Check file paths and permissions"),
                    QtcError::Json(_) => ("JSON_ERROR", "Check JSON syntax"),
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            QtcCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            QtcCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct CalculateOutput<'a> {
    qtc: f64,
    formula: &'a str,
    history_entries: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    curve: Option<Vec<qtc_engine::DensityPoint>>,
}

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
