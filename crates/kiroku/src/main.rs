use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};

mod app;
mod backend;
mod calendar;
mod config;
mod db;
mod html;
mod server;
mod store;
mod types;

use app::{EntryModal, Planner};
use calendar::{CalendarGrid, Cell, MonthCursor, WEEKDAY_LABELS};
use config::{BackendKind, Config};
use store::RecordStore;
use types::RecordForm;

#[derive(Parser, Debug)]
#[command(name = "kiroku")]
#[command(about = "Monthly study calendar with persisted learning records")]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Directory holding the record store (overrides KIROKU_DATA_DIR)
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// Storage backend (overrides KIROKU_BACKEND)
    #[arg(long, global = true)]
    backend: Option<BackendKind>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the web server (default)
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
    },

    /// Print a month grid
    Calendar {
        /// Year, defaults to the current one
        #[arg(long)]
        year: Option<i32>,

        /// Month 1-12, defaults to the current one
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..=12))]
        month: Option<u32>,

        /// Months to move from there (negative goes back)
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        offset: i32,
    },

    /// Record a study session
    Add {
        /// What was studied
        #[arg(long)]
        content: String,

        /// Minutes spent
        #[arg(long)]
        time: String,

        /// Optional note
        #[arg(long, default_value = "")]
        note: String,

        /// Day (YYYY-MM-DD); omitted means now
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// List records of a day, or all records
    Show {
        /// Day (YYYY-MM-DD)
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Generate a static HTML page for a month (no server)
    Build {
        #[arg(long)]
        year: Option<i32>,

        /// Month 1-12
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..=12))]
        month: Option<u32>,

        /// Output directory for index.html
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },
}

fn init_tracing(log_level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level))
        .add_directive("hyper=warn".parse()?)
        .add_directive("tower_http=warn".parse()?);

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_max_level(Level::TRACE)
        .init();
    Ok(())
}

/// Cursor for a CLI year and 1-based month, falling back to today
fn cursor_for(year: Option<i32>, month: Option<u32>) -> MonthCursor {
    let today = MonthCursor::today();
    MonthCursor::new(
        year.unwrap_or(today.year),
        month.map(|m| m - 1).unwrap_or(today.month),
    )
}

/// Plain-text grid; days carrying records are starred
fn format_grid(grid: &CalendarGrid, counts: &BTreeMap<NaiveDate, usize>) -> String {
    let mut out = format!("{:^28}\n", grid.title());
    for label in WEEKDAY_LABELS {
        out.push_str(&format!("{:>4}", label));
    }
    out.push('\n');

    for row in &grid.rows {
        for cell in row {
            match cell {
                Cell::Empty => out.push_str("    "),
                Cell::Day { day, iso_date } => {
                    let marked = NaiveDate::parse_from_str(iso_date, "%Y-%m-%d")
                        .map(|d| counts.contains_key(&d))
                        .unwrap_or(false);
                    out.push_str(&format!("{:>3}{}", day, if marked { '*' } else { ' ' }));
                }
            }
        }
        out.push('\n');
    }
    out
}

fn open_planner(config: &Config, cursor: MonthCursor) -> Result<Planner<Box<dyn backend::Backend>>> {
    let store = RecordStore::new(config.open_backend()?);
    Ok(Planner::starting_at(store, cursor))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_tracing(&args.log_level)?;

    let config = Config::from_env()?.with_overrides(args.data_dir.as_deref(), args.backend);

    match args.command {
        // Default to serve if no command specified
        None => {
            server::serve(8080, config).await?;
        }
        Some(Commands::Serve { port }) => {
            server::serve(port, config).await?;
        }
        Some(Commands::Calendar {
            year,
            month,
            offset,
        }) => {
            let cursor = cursor_for(year, month).offset(offset);
            let planner = open_planner(&config, cursor)?;
            let counts = planner.store().counts_by_day()?;
            print!("{}", format_grid(&planner.grid(), &counts));
        }
        Some(Commands::Add {
            content,
            time,
            note,
            date,
        }) => {
            let mut planner = open_planner(&config, MonthCursor::today())?;
            match date {
                Some(date) => {
                    planner.on_cell_selected(&date.format("%Y-%m-%d").to_string())?;
                }
                None => planner.on_open_quick_entry(),
            }

            let record = planner
                .on_save(RecordForm::new(&content, &time, &note))
                .context("Record not saved")?;
            info!(date = %record.date, "Saved");
            println!("{}", record.list_line());
        }
        Some(Commands::Show { date }) => {
            let mut planner = open_planner(&config, MonthCursor::today())?;
            match date {
                Some(date) => {
                    let view = planner.on_cell_selected(&date.format("%Y-%m-%d").to_string())?;
                    planner.on_cancel();
                    println!("{}", view.date);
                    for line in view.lines() {
                        println!("  {}", line);
                    }
                }
                None => {
                    let records = planner.store().load_all()?;
                    info!(count = records.len(), "Loaded records");
                    for record in records {
                        println!("{}", record.list_line());
                    }
                }
            }
        }
        Some(Commands::Build {
            year,
            month,
            output,
        }) => {
            let planner = open_planner(&config, cursor_for(year, month))?;
            let grid = planner.grid();
            let records = planner.store().load_all()?;
            let counts = planner.store().counts_by_day()?;

            let html_path = output.join("index.html");
            html::generate_html(
                &html::PageView {
                    grid: &grid,
                    counts: &counts,
                    selected: None,
                    modal: &EntryModal::Closed,
                    form: &RecordForm::default(),
                    records: &records,
                },
                &html_path,
            )?;
            info!(path = %html_path.display(), "HTML saved");
        }
    }

    Ok(())
}
