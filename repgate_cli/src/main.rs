use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand};
use repgate_core::history::{exercise_history, request_history};
use repgate_core::*;
use serde::Deserialize;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "repgate")]
#[command(about = "Exercise-gated request ledger", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Load configuration from this file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the current balance
    Balance {
        /// Print the balance as JSON
        #[arg(long)]
        json: bool,
    },

    /// Spend one request (plugin hook); prints a block decision when empty
    Check,

    /// Record a completed exercise set and credit its award
    Credit {
        /// Exercise kind (defaults to the first catalog entry)
        #[arg(long)]
        exercise: Option<String>,

        /// Reps completed
        #[arg(long)]
        reps: u32,
    },

    /// Credit requests directly (operator action)
    Grant {
        #[arg(allow_negative_numbers = true)]
        amount: i64,
    },

    /// Count reps from a JSON Lines frame stream and credit completions
    Watch {
        /// Frame file (reads stdin when omitted)
        #[arg(long)]
        input: Option<PathBuf>,

        /// Exercise kind (defaults to the first catalog entry)
        #[arg(long)]
        exercise: Option<String>,
    },

    /// Show exercise and request history
    History {
        /// Only include events from the last N days
        #[arg(long)]
        days: Option<i64>,

        /// Print events as JSON
        #[arg(long)]
        json: bool,
    },

    /// Zero the earned and spent counters (history is kept)
    Reset,

    /// Roll up the event WAL to CSV
    Rollup {
        /// Clean up processed WAL files after rollup
        #[arg(long)]
        cleanup: bool,
    },
}

/// One line of the frame stream consumed by `watch`
#[derive(Debug, Deserialize)]
struct FrameLine {
    timestamp_ms: i64,
    landmarks: LandmarkSet,
}

fn main() -> ExitCode {
    repgate_core::logging::init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let data_dir = cli.data_dir.unwrap_or_else(|| config.data.data_dir.clone());

    let catalog = ExerciseCatalog::from_config(&config)?;

    match cli.command {
        Commands::Check => {
            cmd_check(&data_dir, &config, &catalog);
            Ok(())
        }
        Commands::Balance { json } => cmd_balance(&open(&data_dir, &config)?, json),
        Commands::Credit { exercise, reps } => {
            cmd_credit(&open(&data_dir, &config)?, &catalog, exercise, reps)
        }
        Commands::Grant { amount } => cmd_grant(&open(&data_dir, &config)?, amount),
        Commands::Watch { input, exercise } => cmd_watch(
            open(&data_dir, &config)?,
            &catalog,
            &config,
            input.as_deref(),
            exercise,
        ),
        Commands::History { days, json } => cmd_history(&open(&data_dir, &config)?, days, json),
        Commands::Reset => cmd_reset(&open(&data_dir, &config)?),
        Commands::Rollup { cleanup } => cmd_rollup(&data_dir, &config, cleanup),
    }
}

fn open(data_dir: &Path, config: &Config) -> Result<TransactionCoordinator> {
    TransactionCoordinator::new(FileStore::open(data_dir)?, &config.coordinator)
}

fn select_exercise<'a>(
    catalog: &'a ExerciseCatalog,
    exercise: Option<String>,
) -> Result<&'a ExerciseDefinition> {
    match exercise {
        Some(kind) => catalog.get(&kind).ok_or(Error::UnknownExercise(kind)),
        None => catalog
            .primary()
            .ok_or_else(|| Error::Config("No exercises configured".into())),
    }
}

/// The hook must always answer: any failure becomes a block decision.
fn cmd_check(data_dir: &Path, config: &Config, catalog: &ExerciseCatalog) {
    let decision = open(data_dir, config).and_then(|coordinator| gate::check(&coordinator, catalog));

    let output = match decision {
        Ok(decision) => decision.hook_output(),
        Err(e) => {
            tracing::error!("Gate check failed: {}", e);
            Some(HookOutput::block(format!("Repgate error: {}", e)))
        }
    };

    if let Some(output) = output {
        match serde_json::to_string(&output) {
            Ok(json) => println!("{}", json),
            Err(e) => tracing::error!("Failed to encode hook output: {}", e),
        }
    }
}

fn cmd_balance(coordinator: &TransactionCoordinator, json: bool) -> Result<()> {
    let snapshot = coordinator.snapshot()?;

    if json {
        println!("{}", serde_json::to_string(&snapshot)?);
    } else {
        println!("Requests available: {}", snapshot.available);
        println!("  Earned: {}", snapshot.earned);
        println!("  Spent:  {}", snapshot.spent);
    }
    Ok(())
}

fn cmd_credit(
    coordinator: &TransactionCoordinator,
    catalog: &ExerciseCatalog,
    exercise: Option<String>,
    reps: u32,
) -> Result<()> {
    let definition = select_exercise(catalog, exercise)?;
    let event = CompletionEvent {
        exercise_kind: definition.name.clone(),
        reps_completed: reps,
    };

    let award = coordinator.record_completion(&event, catalog)?;
    println!("✓ {}", award.message);
    println!("  Requests available: {}", coordinator.snapshot()?.available);
    Ok(())
}

fn cmd_grant(coordinator: &TransactionCoordinator, amount: i64) -> Result<()> {
    let available = coordinator.credit(amount)?;
    println!("✓ Granted {} request(s)", amount);
    println!("  Requests available: {}", available);
    Ok(())
}

fn cmd_watch(
    coordinator: TransactionCoordinator,
    catalog: &ExerciseCatalog,
    config: &Config,
    input: Option<&Path>,
    exercise: Option<String>,
) -> Result<()> {
    let definition = select_exercise(catalog, exercise)?;
    let mut session = ExerciseSession::for_exercise(definition, &config.detector)?;

    let reader: Box<dyn BufRead> = match input {
        Some(path) => Box::new(BufReader::new(std::fs::File::open(path)?)),
        None => Box::new(BufReader::new(io::stdin())),
    };

    let coordinator = Arc::new(coordinator);
    let mut subscription = coordinator.subscribe("watch")?;
    let printer = std::thread::Builder::new()
        .name("repgate-watch".into())
        .spawn(move || {
            while let Some(note) = subscription.recv() {
                match serde_json::to_string(&note) {
                    Ok(json) => println!("{}", json),
                    Err(e) => tracing::warn!("Failed to encode notification: {}", e),
                }
            }
        })?;

    // Balance changes committed by other processes (e.g. `repgate check`)
    let (stop_tx, stop_rx) = mpsc::channel::<()>();
    let poller = {
        let coordinator = Arc::clone(&coordinator);
        let interval = config.coordinator.poll_interval();
        std::thread::Builder::new()
            .name("repgate-poll".into())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        if let Err(e) = coordinator.refresh() {
                            tracing::warn!("Failed to refresh ledger: {}", e);
                        }
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })?
    };

    let mut frames = 0usize;
    for (line_num, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let frame: FrameLine = match serde_json::from_str(&line) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("Skipping frame on line {}: {}", line_num + 1, e);
                continue;
            }
        };
        let Some(at) = DateTime::<Utc>::from_timestamp_millis(frame.timestamp_ms) else {
            tracing::warn!(
                "Skipping frame on line {}: timestamp {} out of range",
                line_num + 1,
                frame.timestamp_ms
            );
            continue;
        };

        frames += 1;
        if let Some(completion) = session.on_frame_at(&frame.landmarks, at) {
            if let Err(e) = coordinator.record_completion(&completion, catalog) {
                tracing::error!("Failed to credit {}: {}", completion.exercise_kind, e);
            }
        }
    }

    let (reps, target) = session.progress();
    tracing::info!(
        "Processed {} frames: {} completion(s), {}/{} reps toward the next",
        frames,
        session.completions(),
        reps,
        target
    );

    drop(stop_tx);
    if poller.join().is_err() {
        tracing::error!("Ledger poller panicked");
    }

    // Dropping the last coordinator handle hangs up the subscription
    drop(coordinator);
    if printer.join().is_err() {
        tracing::error!("Notification printer panicked");
    }
    Ok(())
}

fn cmd_history(coordinator: &TransactionCoordinator, days: Option<i64>, json: bool) -> Result<()> {
    let since = days.map(|d| Utc::now() - Duration::days(d));
    let events = coordinator.history(since)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&events)?);
        return Ok(());
    }

    let exercises = exercise_history(&events);
    println!("Exercise history ({} entries)", exercises.len());
    for event in exercises {
        let detail = match (&event.exercise, event.reps) {
            (Some(kind), Some(reps)) => format!("{} × {}", reps, kind.replace('_', " ")),
            _ => "granted".to_string(),
        };
        println!(
            "  {}  +{}  {}",
            event.at.format("%Y-%m-%d %H:%M:%S"),
            event.amount,
            detail
        );
    }

    let requests = request_history(&events);
    println!("Request history ({} entries)", requests.len());
    for event in requests {
        let status = if event.is_blocked() { "blocked" } else { "allowed" };
        println!("  {}  {}", event.at.format("%Y-%m-%d %H:%M:%S"), status);
    }
    Ok(())
}

fn cmd_reset(coordinator: &TransactionCoordinator) -> Result<()> {
    coordinator.reset()?;
    println!("✓ Balance reset to 0");
    Ok(())
}

fn cmd_rollup(data_dir: &Path, config: &Config, cleanup: bool) -> Result<()> {
    let paths = LedgerPaths::new(data_dir);

    if !paths.wal.exists() {
        println!("No WAL file found - nothing to roll up.");
        return Ok(());
    }

    let count = open(data_dir, config)?.rollup()?;

    println!("✓ Rolled up {} events to CSV", count);
    println!("  CSV: {}", paths.csv.display());

    if cleanup {
        let cleaned = repgate_core::csv_rollup::cleanup_processed_wals(&paths.ledger_dir)?;
        if cleaned > 0 {
            println!("✓ Cleaned up {} processed WAL files", cleaned);
        }
    }

    Ok(())
}
