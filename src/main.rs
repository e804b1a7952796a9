//! TAITI - Task/scenario sync and conflict-risk engine
//!
//! Command-line front end: refresh a board, inspect and edit the scenario
//! sets stored on its cards.

use clap::{Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use taiti::progress::ProgressReporter;
use taiti::scenario::{feature, transfer};
use taiti::tracker::trello::{parse_board_id, TrelloClient, TrelloCredentials};
use taiti::{
    BoardEngine, BoardSnapshot, Result, ScenarioReference, ScenarioSet, TaitiConfig, TaitiError,
    Task, TaskBucket,
};

#[derive(Parser)]
#[command(name = "taiti")]
#[command(version)]
#[command(about = "Track test scenarios on tracker cards and spot merge conflicts early", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Project directory (defaults to current directory)
    #[arg(short, long, global = true, env = "TAITI_PROJECT", default_value = ".")]
    project: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default .taiti/settings.json
    Init {
        /// Board URL or id
        #[arg(long)]
        board: Option<String>,

        /// Overwrite an existing settings file
        #[arg(short, long)]
        force: bool,
    },

    /// Check tracker credentials and board access
    Status,

    /// Classify the board and score conflict risk
    Refresh {
        /// Print the snapshot as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the scenarios stored on a card
    Show {
        /// Card id
        item: String,
    },

    /// Replace the scenarios stored on a card
    Push {
        /// Card id
        item: String,

        /// Transfer file to upload (path,[lines] rows)
        #[arg(long, conflicts_with_all = ["scenario", "feature"])]
        file: Option<PathBuf>,

        /// Scenario as path:line (repeatable)
        #[arg(long, value_name = "PATH:LINE")]
        scenario: Vec<String>,

        /// Select every scenario of a feature file (repeatable)
        #[arg(long, value_name = "FEATURE")]
        feature: Vec<String>,
    },

    /// Remove the scenarios stored on a card
    Clear {
        /// Card id
        item: String,
    },

    /// Parse a transfer file offline and report skipped entries
    Check {
        /// Transfer file
        file: PathBuf,
    },
}

/// Spinner-backed progress for interactive runs.
struct SpinnerProgress {
    bar: ProgressBar,
}

impl SpinnerProgress {
    fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            bar.set_style(style);
        }
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar }
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressReporter for SpinnerProgress {
    fn set_fraction(&self, _fraction: f64) {}

    fn set_text(&self, text: &str) {
        self.bar.set_message(text.to_string());
    }

    fn set_detail(&self, detail: &str) {
        tracing::debug!("{}", detail);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose {
        "taiti=debug,info"
    } else {
        "taiti=info,warn"
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Resolve project path
    let project_path = cli.project.canonicalize().unwrap_or(cli.project.clone());

    if !project_path.exists() {
        eprintln!(
            "{} Project directory does not exist: {}",
            "Error:".red().bold(),
            project_path.display()
        );
        std::process::exit(1);
    }

    if let Err(e) = run(cli.command, &project_path).await {
        eprintln!("{} {}", "Error:".red().bold(), e);
        if e.requires_user_warning() {
            eprintln!(
                "{} The card may carry an orphaned scenario file. Run `taiti clear` and push again.",
                "Warning:".yellow().bold()
            );
        }
        std::process::exit(e.exit_code());
    }

    Ok(())
}

async fn run(command: Commands, project_path: &Path) -> Result<()> {
    match command {
        Commands::Init { board, force } => init(project_path, board, force),
        Commands::Check { file } => check(&file),
        command => {
            let config = TaitiConfig::load(project_path)?.with_env_overrides();
            config.validate()?;
            let (client, board_id) = connect(&config)?;
            let engine = BoardEngine::new(client.clone(), board_id.clone(), config.bucket_rules());

            match command {
                Commands::Status => status(&client, &engine, &board_id).await,
                Commands::Refresh { json } => refresh(&engine, json).await,
                Commands::Show { item } => show(&engine, project_path, &item).await,
                Commands::Push {
                    item,
                    file,
                    scenario,
                    feature,
                } => {
                    let scenarios =
                        collect_scenarios(project_path, file.as_deref(), &scenario, &feature)?;
                    engine.write_scenarios(&item, &scenarios).await?;
                    println!(
                        "{} Saved {} scenario(s) on {}",
                        "✓".green().bold(),
                        scenarios.len(),
                        item
                    );
                    Ok(())
                }
                Commands::Clear { item } => {
                    let report = engine.delete_scenarios(&item).await?;
                    if report.comments_deleted + report.attachments_deleted == 0 {
                        println!("{} No scenarios stored on {}", "·".dimmed(), item);
                    } else {
                        println!("{} Cleared scenarios on {}", "✓".green().bold(), item);
                    }
                    for failure in &report.failures {
                        println!("  {} {}", "could not remove".yellow(), failure);
                    }
                    Ok(())
                }
                Commands::Init { .. } | Commands::Check { .. } => Ok(()),
            }
        }
    }
}

fn connect(config: &TaitiConfig) -> Result<(Arc<TrelloClient>, String)> {
    let (board, key, token) = config.require_tracker()?;
    let board_id = parse_board_id(board).ok_or_else(|| TaitiError::InvalidConfig {
        field: "tracker.board".to_string(),
        reason: format!("'{board}' is neither a board URL nor a board id"),
    })?;
    let client = TrelloClient::new(TrelloCredentials::new(key, token))?;
    Ok((Arc::new(client), board_id))
}

fn init(project_path: &Path, board: Option<String>, force: bool) -> Result<()> {
    let settings_path = TaitiConfig::settings_path(project_path);
    if settings_path.exists() && !force {
        return Err(TaitiError::config_with_path(
            "settings file already exists (use --force to overwrite)",
            settings_path,
        ));
    }

    let mut config = TaitiConfig::default();
    config.tracker.board = board;
    config.save(project_path)?;
    println!(
        "{} Wrote {}",
        "✓".green().bold(),
        settings_path.display()
    );
    Ok(())
}

async fn status(client: &TrelloClient, engine: &BoardEngine, board_id: &str) -> Result<()> {
    let user = engine.current_user().await?;
    let board = client
        .board_name(board_id)
        .await
        .map_err(|e| TaitiError::connectivity("get board", &e))?;
    println!("{} Connected", "✓".green().bold());
    println!("  Member: {}", user.cyan());
    println!("  Board:  {} ({})", board.cyan(), board_id);
    Ok(())
}

async fn refresh(engine: &BoardEngine, json: bool) -> Result<()> {
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let progress = SpinnerProgress::new();
    let outcome = engine.refresh(&progress, &cancel).await;
    progress.finish();
    let snapshot = outcome?;

    if json {
        println!("{}", serde_json::to_string_pretty(snapshot.as_ref())?);
    } else {
        print_snapshot(&snapshot);
    }
    Ok(())
}

fn print_snapshot(snapshot: &BoardSnapshot) {
    for bucket in [
        TaskBucket::MineUnstarted,
        TaskBucket::OthersPending,
        TaskBucket::NoScenario,
    ] {
        let tasks = snapshot.bucket(bucket);
        println!("{} ({})", bucket.to_string().bold(), tasks.len());
        for task in tasks {
            print_task(snapshot, bucket, task);
        }
        println!();
    }

    for degraded in &snapshot.classification.degraded {
        println!(
            "{} {}: {}",
            "unreadable scenarios".yellow(),
            degraded.item_id,
            degraded.reason
        );
    }
}

fn print_task(snapshot: &BoardSnapshot, bucket: TaskBucket, task: &Task) {
    if bucket == TaskBucket::NoScenario {
        println!("  {} {}", task.id.dimmed(), task.name);
        return;
    }

    let rate = format!("{:>3.0}%", task.conflict_rate);
    let rate = match task.conflict_rate {
        r if r >= 50.0 => rate.red().bold(),
        r if r > 0.0 => rate.yellow(),
        _ => rate.green(),
    };
    let source = snapshot
        .report(&task.id)
        .map(|r| r.source.to_string())
        .unwrap_or_default();
    println!("  {} {} {} {}", rate, task.id.dimmed(), task.name, source.dimmed());

    if let Some(report) = snapshot.report(&task.id) {
        for pair in &report.pairs {
            println!(
                "      {:>3.0}% {} {}",
                pair.rate,
                pair.other.name,
                pair.conflicting_files.join(", ").dimmed()
            );
        }
    }
}

async fn show(engine: &BoardEngine, project_path: &Path, item: &str) -> Result<()> {
    match engine.read_scenarios(item).await? {
        None => println!("{} No scenarios stored on {}", "·".dimmed(), item),
        Some(scenarios) if scenarios.is_empty() => {
            println!("{} Scenario file on {} is empty", "·".dimmed(), item)
        }
        Some(scenarios) => {
            for file in scenarios.files() {
                println!("{}", file.path.bold());
                for line in &file.lines {
                    let reference = ScenarioReference::new(file.path.clone(), *line);
                    println!(
                        "  {:>5}  {}",
                        line,
                        feature::title_for(project_path, &reference)
                    );
                }
            }
        }
    }
    Ok(())
}

fn collect_scenarios(
    project_path: &Path,
    file: Option<&Path>,
    scenario: &[String],
    features: &[String],
) -> Result<ScenarioSet> {
    if let Some(file) = file {
        let text = std::fs::read_to_string(file)?;
        let parsed = transfer::parse(&text);
        for skipped in &parsed.skipped {
            eprintln!("{} {}", "skipped".yellow(), skipped);
        }
        return Ok(parsed.scenarios);
    }

    if scenario.is_empty() && features.is_empty() {
        return Err(TaitiError::config(
            "nothing to push: pass --file, --scenario or --feature",
        ));
    }

    let mut scenarios = ScenarioSet::new();
    for text in scenario {
        let reference = ScenarioReference::parse_shorthand(text).ok_or_else(|| {
            TaitiError::config(format!("'{text}' is not a PATH:LINE scenario"))
        })?;
        scenarios.insert(reference);
    }
    for path in features {
        scenarios.extend(feature::select_all(project_path, path)?.iter());
    }
    Ok(scenarios)
}

fn check(file: &Path) -> Result<()> {
    let text = std::fs::read_to_string(file)?;
    let parsed = transfer::parse(&text);

    for scenario_file in parsed.scenarios.files() {
        println!(
            "{} {:?}",
            scenario_file.path,
            scenario_file.lines
        );
    }
    for skipped in &parsed.skipped {
        println!("{} {}", "skipped".yellow(), skipped);
    }
    println!(
        "{} reference(s) in {} file(s), {} skipped",
        parsed.scenarios.len(),
        parsed.scenarios.files().len(),
        parsed.skipped.len()
    );
    Ok(())
}
