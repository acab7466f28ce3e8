use anyhow::{Context, Result};
use chrono::Datelike;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod app;
mod attendance;
mod config;
mod enroll;
mod events;
mod pipeline;
mod render;
mod session;
mod shared;

#[cfg(test)]
mod fixtures;

use app::App;
use config::Config;
use enroll::{EnrollDriver, EnrollOutcome, EnrollRequest};
use events::{ConsoleNotifier, Notifier};
use pipeline::{Pipeline, PipelineConfig};
use render::{LogRenderer, PreviewRenderer, Renderer};
use rollcall_core::OnnxFaceModel;
use rollcall_hw::Camera;
use rollcall_store::{PersonId, Schedule};
use session::{LocalClock, ScanSession, StopReason};

#[derive(Parser)]
#[command(name = "rollcall", about = "Liveness-gated face attendance")]
struct Cli {
    /// TOML config file (defaults apply when omitted)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Recognize faces and log attendance until Ctrl-C
    Scan,
    /// Register a new person after a liveness check
    Enroll {
        #[arg(long)]
        id: String,
        #[arg(long)]
        name: String,
        /// Scheduled weekdays, comma separated (e.g. "mon,tue,fri")
        #[arg(long, value_delimiter = ',')]
        days: Vec<String>,
        /// Expected time-in on scheduled days, HH:MM
        #[arg(long)]
        time_in: Option<String>,
    },
    /// List registered people
    Users,
    /// Change a person's display name
    Rename { id: String, name: String },
    /// Set or clear a person's schedule
    Schedule {
        id: String,
        #[arg(long, value_delimiter = ',')]
        days: Vec<String>,
        #[arg(long)]
        time_in: Option<String>,
        /// Remove the schedule instead
        #[arg(long, conflicts_with_all = ["days", "time_in"])]
        clear: bool,
    },
    /// Remove a person with their encoding, photo and attendance rows
    Delete { id: String },
    /// Show attendance for one month (defaults to the current month)
    History {
        #[arg(long)]
        year: Option<i32>,
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..=12))]
        month: Option<u32>,
    },
    /// Write the attendance ledger to a file
    Export {
        path: PathBuf,
        #[arg(long, requires = "month")]
        year: Option<i32>,
        #[arg(long, requires = "year", value_parser = clap::value_parser!(u32).range(1..=12))]
        month: Option<u32>,
    },
    /// List V4L2 capture devices
    Devices,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    if let Commands::Devices = cli.command {
        let devices = Camera::list_devices();
        if devices.is_empty() {
            println!("No capture devices found");
        }
        for d in devices {
            println!("{}  {} ({}, {})", d.path, d.name, d.driver, d.bus);
        }
        return Ok(());
    }

    let notifier: Arc<dyn Notifier> = Arc::new(ConsoleNotifier::new(config.sound));
    let app = App::open(&config.data_dir, notifier.clone())
        .with_context(|| format!("opening data directory {}", config.data_dir.display()))?;

    match cli.command {
        Commands::Scan => scan(&config, &app, notifier).await?,
        Commands::Enroll {
            id,
            name,
            days,
            time_in,
        } => {
            let request = EnrollRequest {
                id: PersonId::parse(&id)?,
                name,
                schedule: schedule_from(&days, time_in.as_deref())?,
            };
            enroll(config, app, notifier, request).await?;
        }
        Commands::Users => {
            let roster = app.people();
            if roster.people().is_empty() {
                println!("No people registered");
            }
            for p in roster.people() {
                match &p.schedule {
                    Some(s) => {
                        let days: Vec<String> = s.days.iter().map(|d| d.to_string()).collect();
                        println!("{}  {}  {} at {}", p.id, p.name, days.join(","), s.time_in);
                    }
                    None => println!("{}  {}", p.id, p.name),
                }
            }
        }
        Commands::Rename { id, name } => {
            let rows = app.rename(&PersonId::parse(&id)?, &name)?;
            println!("Renamed {id}; {rows} attendance rows updated");
        }
        Commands::Schedule {
            id,
            days,
            time_in,
            clear,
        } => {
            let schedule = if clear {
                None
            } else {
                Some(Schedule::parse(&days, time_in.as_deref().unwrap_or_default())?)
            };
            app.set_schedule(&PersonId::parse(&id)?, schedule)?;
            println!("Schedule for {id} updated");
        }
        Commands::Delete { id } => {
            let rows = app.delete(&PersonId::parse(&id)?)?;
            println!("Deleted {id} and {rows} attendance rows");
        }
        Commands::History { year, month } => {
            let today = chrono::Local::now().date_naive();
            let year = year.unwrap_or(today.year());
            let month = month.unwrap_or(today.month());
            let rows = app.history(year, month);
            if rows.is_empty() {
                println!("No attendance for {year}-{month:02}");
            }
            for r in rows {
                let out = r.time_out.map(|t| t.to_string()).unwrap_or_else(|| "-".into());
                let late = if r.late { "  late" } else { "" };
                println!("{}  {}  {}  in {}  out {}{}", r.date, r.id, r.name, r.time_in, out, late);
            }
            let years: Vec<String> = app.years(today.year()).iter().map(|y| y.to_string()).collect();
            println!("Years with records: {}", years.join(", "));
        }
        Commands::Export { path, year, month } => {
            let rows = app.export(&path, year.zip(month))?;
            println!("Exported {rows} rows to {}", path.display());
        }
        Commands::Devices => {}
    }

    Ok(())
}

/// No days and no time means no schedule; anything partial is rejected.
fn schedule_from(days: &[String], time_in: Option<&str>) -> Result<Option<Schedule>> {
    if days.is_empty() && time_in.is_none() {
        return Ok(None);
    }
    Ok(Some(Schedule::parse(days, time_in.unwrap_or_default())?))
}

async fn scan(config: &Config, app: &App, notifier: Arc<dyn Notifier>) -> Result<()> {
    let model = OnnxFaceModel::load(&config.model_dir)
        .with_context(|| format!("loading face models from {}", config.model_dir.display()))?;
    let camera = Camera::open(&config.camera_device, config.camera_width, config.camera_height)?;

    let (tx, rx) = tokio::sync::mpsc::channel(32);
    let pipeline = Pipeline::start(
        camera,
        model,
        app.gallery(),
        PipelineConfig::from_config(config),
        tx,
    )?;

    let renderer: Box<dyn Renderer> = match &config.preview_path {
        Some(path) => Box::new(PreviewRenderer::new(path)?),
        None => Box::new(LogRenderer::default()),
    };
    let session = ScanSession {
        ledger: app.ledger_engine(config.cooldown()),
        notifier,
        renderer,
        clock: LocalClock,
        display_interval: config.display_interval(),
    };

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };
    let summary = session.run(pipeline, rx, shutdown).await?;
    tracing::debug!(threads = ?summary.threads, "pipeline threads");
    println!("Session ended: {} scans recorded", summary.accepted_scans);
    if summary.reason == StopReason::CaptureFailed {
        anyhow::bail!("camera capture failed");
    }
    Ok(())
}

async fn enroll(config: Config, app: App, notifier: Arc<dyn Notifier>, request: EnrollRequest) -> Result<()> {
    let model = OnnxFaceModel::load(&config.model_dir)
        .with_context(|| format!("loading face models from {}", config.model_dir.display()))?;
    let camera = Camera::open(&config.camera_device, config.camera_width, config.camera_height)?;
    let triggers = enroll::stdin_triggers()?;

    let outcome = tokio::task::spawn_blocking(move || {
        let mut driver = EnrollDriver {
            app: &app,
            source: camera,
            model,
            liveness: config.liveness(),
            notifier,
        };
        driver.run(&request, &triggers)
    })
    .await??;

    match outcome {
        EnrollOutcome::Enrolled => println!("Enrolled"),
        EnrollOutcome::Aborted => println!("Enrollment cancelled"),
    }
    Ok(())
}
