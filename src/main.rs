use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use clap::{Args, Parser, Subcommand};
use log::{info, warn};
use plate_ledger::capture::{Frame, FrameBuffer, FrameSource, GstFrameSource, HealthMonitor};
use plate_ledger::config::{self, Config};
use plate_ledger::db::DatabaseService;
use plate_ledger::report::{self, ReportQuery, SearchFilter};
use plate_ledger::{Ledger, VehicleAttributes};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(name = "plate-ledger", about = "License plate entry/exit ledger")]
struct Cli {
    /// Configuration file (.toml or .json)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage the vehicle registry
    #[command(subcommand)]
    Vehicles(VehiclesCommand),
    /// Record a confirmed sighting of a plate
    Sighting { plate: String },
    /// Search entry/exit events
    Report(ReportArgs),
    /// Read frames from the configured camera and report stream health
    CameraCheck {
        #[arg(long, default_value_t = 100)]
        frames: u32,
    },
}

#[derive(Subcommand, Debug)]
enum VehiclesCommand {
    List,
    Show { plate: String },
    Add {
        plate: String,
        #[command(flatten)]
        attributes: AttributeArgs,
    },
    Update {
        plate: String,
        #[command(flatten)]
        attributes: AttributeArgs,
    },
    Remove { plate: String },
    /// Fuzzy search over every text attribute
    Search { text: String },
    Export { path: PathBuf },
}

#[derive(Args, Debug)]
struct AttributeArgs {
    #[arg(long = "type")]
    vehicle_type: Option<String>,
    #[arg(long)]
    color: Option<String>,
    #[arg(long)]
    owner: Option<String>,
    #[arg(long)]
    owner_id: Option<String>,
    #[arg(long)]
    affiliation: Option<String>,
    #[arg(long, value_name = "PATH")]
    image: Option<String>,
}

impl AttributeArgs {
    /// Apply the given flags on top of `base`
    fn merge(self, mut base: VehicleAttributes) -> VehicleAttributes {
        if let Some(value) = self.vehicle_type {
            base.vehicle_type = value;
        }
        if let Some(value) = self.color {
            base.color = value;
        }
        if let Some(value) = self.owner {
            base.owner_name = value;
        }
        if let Some(value) = self.owner_id {
            base.owner_id = value;
        }
        if let Some(value) = self.affiliation {
            base.affiliation = value;
        }
        if self.image.is_some() {
            base.image_path = self.image;
        }
        base
    }
}

#[derive(Args, Debug)]
struct ReportArgs {
    #[arg(long)]
    plate: Option<String>,
    /// `YYYY-MM-DD` or `YYYY-MM-DD HH:MM:SS` (UTC)
    #[arg(long)]
    from: Option<String>,
    /// `YYYY-MM-DD` (whole day) or `YYYY-MM-DD HH:MM:SS` (UTC)
    #[arg(long)]
    to: Option<String>,
    #[arg(long, default_value_t = 1)]
    page: usize,
    /// Write every matching event to this CSV file instead of printing a page
    #[arg(long, value_name = "PATH")]
    export: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::load_config(cli.config.as_deref())?;

    // RUST_LOG wins over the configured level
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.log_level.as_str()),
    )
    .init();

    match cli.command {
        Command::Vehicles(command) => {
            let (ledger, reports) = open_ledger(&config).await?;
            vehicles(&ledger, &reports, command).await
        }
        Command::Sighting { plate } => {
            let (ledger, _) = open_ledger(&config).await?;
            let kind = ledger.record_sighting(&plate, None).await?;
            println!("{} logged for {}", kind, plate);
            Ok(())
        }
        Command::Report(args) => {
            let (_, reports) = open_ledger(&config).await?;
            run_report(&reports, &config, args).await
        }
        Command::CameraCheck { frames } => camera_check(&config, frames).await,
    }
}

/// Connect to the configured database and make sure the ledger schema is there
async fn open_ledger(config: &Config) -> Result<(Ledger, ReportQuery)> {
    let db = DatabaseService::new(&config.database)
        .await
        .context("Failed to open the ledger database")?;
    db.health_check()
        .await
        .with_context(|| format!("Ledger database {} is not usable", config.database.url))?;

    Ok((
        Ledger::new(db.pool.clone()),
        ReportQuery::new(db.pool, &config.reports),
    ))
}

async fn vehicles(ledger: &Ledger, reports: &ReportQuery, command: VehiclesCommand) -> Result<()> {
    match command {
        VehiclesCommand::List => {
            for vehicle in ledger.list_vehicles().await? {
                println!(
                    "{:<12} {:<10} {:<10} {:<20} {}",
                    vehicle.plate,
                    vehicle.vehicle_type,
                    vehicle.color,
                    vehicle.owner_name,
                    vehicle.affiliation
                );
            }
        }
        VehiclesCommand::Show { plate } => {
            let Some(vehicle) = ledger.get_vehicle(&plate).await? else {
                bail!("No vehicle with plate {}", plate);
            };
            println!("{}", serde_json::to_string_pretty(&vehicle)?);

            for event in ledger.history(&plate).await? {
                let view = report::EventView::from(event);
                println!(
                    "  in {}  out {}  ({})",
                    report::format_time(&view.entry_time),
                    view.exit_time
                        .as_ref()
                        .map(report::format_time)
                        .unwrap_or_else(|| report::UNAVAILABLE.to_string()),
                    view.duration_text()
                );
            }
        }
        VehiclesCommand::Add { plate, attributes } => {
            let vehicle = ledger
                .add_vehicle(&plate, attributes.merge(VehicleAttributes::default()))
                .await?;
            println!("Added {}", vehicle.plate);
        }
        VehiclesCommand::Update { plate, attributes } => {
            let Some(current) = ledger.get_vehicle(&plate).await? else {
                bail!("No vehicle with plate {}", plate);
            };
            let vehicle = ledger
                .update_vehicle(&plate, attributes.merge(current.attributes()))
                .await?;
            println!("Updated {}", vehicle.plate);
        }
        VehiclesCommand::Remove { plate } => {
            ledger.delete_vehicle(&plate).await?;
            println!("Removed {} and its history", plate);
        }
        VehiclesCommand::Search { text } => {
            for found in reports.search_vehicles(&text).await? {
                println!(
                    "{:>5.1}  {:<12} {:<20} {}",
                    found.score, found.vehicle.plate, found.vehicle.owner_name, found.vehicle.affiliation
                );
            }
        }
        VehiclesCommand::Export { path } => {
            let vehicles = ledger.list_vehicles().await?;
            let count = reports.export_vehicles_csv(&vehicles, &path).await?;
            println!("Exported {} vehicles to {}", count, path.display());
        }
    }

    Ok(())
}

async fn run_report(reports: &ReportQuery, config: &Config, args: ReportArgs) -> Result<()> {
    let filter = SearchFilter {
        plate: args.plate,
        start: args.from.as_deref().map(|v| parse_time(v, false)).transpose()?,
        end: args.to.as_deref().map(|v| parse_time(v, true)).transpose()?,
    };
    let results = reports.search(&filter).await?;

    if let Some(path) = args.export {
        let count = reports.export_csv(&results, &path).await?;
        println!("Exported {} events to {}", count, path.display());
        return Ok(());
    }

    let page = report::page(&results, args.page, config.reports.page_size);
    println!(
        "{:<12} {:<20} {:<20} {}",
        "plate", "entry", "exit", "duration"
    );
    for event in page.items {
        println!(
            "{:<12} {:<20} {:<20} {}",
            event.plate,
            report::format_time(&event.entry_time),
            event
                .exit_time
                .as_ref()
                .map(report::format_time)
                .unwrap_or_else(|| report::UNAVAILABLE.to_string()),
            event.duration_text()
        );
    }
    println!(
        "page {} of {} ({} events)",
        page.page, page.total_pages, page.total_items
    );
    Ok(())
}

/// Parse a UTC time; a bare date means the start of the day, or its last
/// instant when `end_of_day` is set
fn parse_time(value: &str, end_of_day: bool) -> Result<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(time) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        return Ok(time.and_utc());
    }

    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("Invalid time {:?}", value))?;
    let time = if end_of_day {
        NaiveTime::from_hms_micro_opt(23, 59, 59, 999_999)
    } else {
        NaiveTime::from_hms_opt(0, 0, 0)
    }
    .context("Invalid time of day")?;

    Ok(date.and_time(time).and_utc())
}

async fn camera_check(config: &Config, frames: u32) -> Result<()> {
    let camera = &config.camera;
    let mut source = GstFrameSource::new(Duration::from_millis(camera.read_timeout_ms));
    source
        .open(&camera.device, camera.width, camera.height)
        .await
        .with_context(|| format!("Cannot open camera {}", camera.device))?;

    let buffer = Arc::new(FrameBuffer::new());
    let health = HealthMonitor::new(config.pipeline.max_consecutive_read_failures);
    let started = Instant::now();
    let mut captured = 0u64;

    for _ in 0..frames {
        match source.read_frame().await {
            Ok(image) => {
                captured += 1;
                buffer.put(Frame::new(captured, image));
                health.record_success();
            }
            Err(e) => {
                warn!("{}", e);
                health.record_failure();
            }
        }
    }
    source.close().await;

    let elapsed = started.elapsed().as_secs_f64().max(f64::EPSILON);
    info!("Camera check finished in {:.1}s", elapsed);
    println!(
        "{}: {} of {} frames read ({:.1} fps), health {:?}",
        camera.device,
        captured,
        frames,
        captured as f64 / elapsed,
        health.health()
    );
    if let Some(frame) = buffer.peek_latest() {
        println!("last frame {}x{} at {}", frame.width(), frame.height(), frame.captured_at);
    }
    Ok(())
}
