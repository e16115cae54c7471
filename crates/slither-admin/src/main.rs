mod import;

use std::path::PathBuf;

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use slither_db::{AssignOutcome, Database};
use slither_types::models::DifficultyStock;
use slither_types::schedule::slot_for_date;

#[derive(Parser)]
#[command(name = "slither-admin")]
#[command(about = "Puzzle inventory and daily challenge maintenance", long_about = None)]
struct Cli {
    /// SQLite database file. Falls back to SLITHER_DB_PATH, then slither.db.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Assign the daily challenge for one date (default: today, UTC)
    Assign {
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Assign daily challenges for today and the following days
    Pregenerate {
        #[arg(long, default_value_t = 7, value_parser = clap::value_parser!(u32).range(1..=90))]
        days: u32,
    },
    /// Show unused puzzle counts per pool and difficulty
    Stock,
    /// Show daily challenge coverage
    Stats,
    /// Import puzzle JSON files from a directory
    Import { dir: PathBuf },
}

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "slither_admin=info,slither_db=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let db_path = cli.db.unwrap_or_else(|| {
        std::env::var("SLITHER_DB_PATH")
            .unwrap_or_else(|_| "slither.db".into())
            .into()
    });
    let db = Database::open(&db_path)?;

    match cli.command {
        Commands::Assign { date } => assign(&db, date),
        Commands::Pregenerate { days } => pregenerate(&db, days),
        Commands::Stock => stock(&db),
        Commands::Stats => stats(&db),
        Commands::Import { dir } => {
            let summary = import::import_dir(&db, &dir)?;
            println!(
                "Import completed - imported: {}, skipped: {}, failed: {}",
                summary.imported, summary.skipped, summary.failed
            );
            Ok(())
        }
    }
}

fn assign(db: &Database, date: Option<NaiveDate>) -> Result<()> {
    let now = Utc::now();
    let date = date.unwrap_or_else(|| now.date_naive());
    let slot = slot_for_date(date);

    match db.assign_daily_challenge(date, now)? {
        AssignOutcome::Assigned { puzzle, .. } => println!(
            "{}: assigned puzzle {} ({}x{} {}, {})",
            date, puzzle.id, puzzle.grid_size, puzzle.grid_size, puzzle.difficulty, slot.display_name
        ),
        AssignOutcome::Existing(challenge) => {
            println!("{}: already assigned puzzle {}", date, challenge.puzzle_id)
        }
        AssignOutcome::NoPuzzle(slot) => println!(
            "{}: no unused daily {}x{} {} puzzle available",
            date, slot.grid_size, slot.grid_size, slot.difficulty
        ),
    }
    Ok(())
}

fn pregenerate(db: &Database, days: u32) -> Result<()> {
    let now = Utc::now();
    let summary = db.pregenerate_daily_challenges(now.date_naive(), days, now)?;

    for item in &summary.results {
        match (item.puzzle_id, &item.error) {
            (Some(id), _) => println!("  {}  puzzle {}", item.date, id),
            (None, Some(error)) => println!("  {}  FAILED: {}", item.date, error),
            (None, None) => println!("  {}  FAILED", item.date),
        }
    }
    println!(
        "Generated: {}, failed: {}",
        summary.generated, summary.failed
    );
    Ok(())
}

fn stock(db: &Database) -> Result<()> {
    let levels = db.stock_levels()?;

    print_pool("daily", &levels.daily);
    print_pool("regular", &levels.regular);
    println!("total unused: {}", levels.total);
    Ok(())
}

fn print_pool(name: &str, stock: &DifficultyStock) {
    println!(
        "{:<8} easy {:>5}  medium {:>5}  difficult {:>5}  total {:>6}",
        name, stock.easy, stock.medium, stock.difficult, stock.total
    );
}

fn stats(db: &Database) -> Result<()> {
    let stats = db.daily_challenge_stats(Utc::now().date_naive())?;

    println!("Total challenges:    {}", stats.total_challenges);
    println!("Upcoming (7 days):   {}", stats.upcoming_challenges);
    if !stats.recent_challenges.is_empty() {
        println!("Recent:");
        for recent in &stats.recent_challenges {
            println!(
                "  {}  puzzle {}  {}x{} {}",
                recent.date, recent.puzzle_id, recent.grid_size, recent.grid_size, recent.difficulty
            );
        }
    }
    Ok(())
}
