mod aggregate;
mod config;
mod metrics;
mod models;
mod normalize;
mod pipeline;
mod scraper;
mod sections;
mod storage;
mod utils;

use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{AppConfig, NavigatorKind, StorageBackend};
use crate::normalize::clean_token;
use crate::pipeline::{rebuild, BuildReport, WatchlistBuilder};
use crate::scraper::{Credentials, HtmlExtractor, HttpNavigator, PageNavigator, SnapshotNavigator};
use crate::storage::{CsvRecordStore, DuckDbRecordStore, RecordStore, Tabular};

#[derive(Parser)]
#[command(name = "tds-scrape", about = "Brokerage research page scraper and watchlist builder", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Scrape a watchlist into a new dated database
    Scrape {
        /// Watchlist name, used for the database directory
        #[arg(short, long)]
        name: String,

        /// Comma-separated tickers
        #[arg(short, long, conflicts_with = "tickers_file")]
        tickers: Option<String>,

        /// File with one or more tickers per line
        #[arg(long)]
        tickers_file: Option<PathBuf>,
    },

    /// Rebuild the watchlist table from a previously scraped database
    Rebuild {
        /// Database directory (csv) or database name (duckdb)
        #[arg(short, long)]
        database: PathBuf,

        /// Comma-separated tickers (default: every stored ticker)
        #[arg(short, long)]
        tickers: Option<String>,

        /// Write the table here instead of the database's big_df
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Print how raw page tokens clean
    Clean {
        tokens: Vec<String>,
    },

    /// Apply the DuckDB schema
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "tds_research_scraper=info,warn",
        1 => "tds_research_scraper=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(EnvFilter::new(filter))
        .init();

    let config = AppConfig::load()?;

    match cli.command {
        Command::Scrape {
            name,
            tickers,
            tickers_file,
        } => {
            let tickers = match (tickers, tickers_file) {
                (Some(list), _) => utils::parse_ticker_list(&list),
                (None, Some(path)) => utils::read_tickers_file(&path)?,
                (None, None) => bail!("pass --tickers or --tickers-file"),
            };
            if tickers.is_empty() {
                bail!("no tickers to scrape");
            }

            let t = utils::Timer::start(format!("Scrape of watchlist {}", name));
            let report = scrape(&config, &name, &tickers).await?;

            info!(
                "Done: {} tickers scraped, {} already stored, {} skipped in {:.2?}",
                report.table.len(),
                report.finished,
                report.skipped.len(),
                t.elapsed()
            );
            if !report.skipped.is_empty() {
                println!("Skipped: {}", report.skipped.join(", "));
            }
        }

        Command::Rebuild {
            database,
            tickers,
            out,
        } => {
            let tickers = tickers.map(|t| utils::parse_ticker_list(&t));
            let store = open_existing(&config, &database)?;
            let table = rebuild(store.as_ref(), tickers.as_deref())?;
            let data = Tabular::from_watchlist(&table);

            match out {
                Some(path) => {
                    CsvRecordStore::write_csv(&path, &data)
                        .with_context(|| format!("Could not write {:?}", path))?;
                    println!("{} tickers → {}", table.len(), path.display());
                }
                None => {
                    store.write_aggregate(&data)?;
                    println!("{} tickers → big_df", table.len());
                }
            }
        }

        Command::Clean { tokens } => {
            for token in &tokens {
                println!("{:>20}  →  {}", format!("{:?}", token), clean_token(token, true));
            }
        }

        Command::Migrate => {
            DuckDbRecordStore::open(&config.storage.db_path, "")?.run_migrations()?;
            println!("Migrations applied.");
        }
    }

    Ok(())
}

async fn scrape(config: &AppConfig, name: &str, tickers: &[String]) -> Result<BuildReport> {
    let navigator: Box<dyn PageNavigator> = match config.navigator.kind {
        NavigatorKind::Snapshot => Box::new(SnapshotNavigator::new(&config.navigator.snapshot_dir)),
        NavigatorKind::Http => Box::new(
            HttpNavigator::new(&config.navigator, config.watchlist.page_speed)
                .context("Failed to build HTTP navigator")?,
        ),
    };

    let credentials = match Credentials::load(&config.navigator.credentials_path) {
        Ok(c) => c,
        Err(e) if config.navigator.kind == NavigatorKind::Snapshot => {
            warn!("No usable keys file ({}); snapshots need none", e);
            Credentials {
                user: "snapshot".into(),
                pass: String::new(),
            }
        }
        Err(e) => {
            return Err(e).with_context(|| {
                format!("Failed to read keys file {:?}", config.navigator.credentials_path)
            });
        }
    };
    let session = navigator.login(&credentials).await.context("Login failed")?;

    let extractor = HtmlExtractor::new();
    let date = Local::now().date_naive();

    match config.storage.backend {
        StorageBackend::Csv => {
            let store = CsvRecordStore::create(&config.storage.root_dir, name, date)?;
            info!("Database: {}", store.dir().display());
            let builder = WatchlistBuilder::new(navigator.as_ref(), &extractor, &store, config.watchlist.clone());
            Ok(builder.build(&session, tickers).await?)
        }
        StorageBackend::Duckdb => {
            let store = DuckDbRecordStore::open(&config.storage.db_path, utils::run_dir_name(name, date))?;
            store.run_migrations()?;
            let run_id = store.begin_run()?;

            let builder = WatchlistBuilder::new(navigator.as_ref(), &extractor, &store, config.watchlist.clone());
            let result = builder.build(&session, tickers).await;
            let (processed, skipped, error) = match &result {
                Ok(r) => (r.table.len(), r.skipped.len(), None),
                Err(e) => (0, 0, Some(e.to_string())),
            };
            if let Err(e) = store.finish_run(run_id, processed, skipped, error.as_deref()) {
                warn!("Could not close watchlist run {}: {}", run_id, e);
            }
            Ok(result?)
        }
    }
}

fn open_existing(config: &AppConfig, database: &Path) -> Result<Box<dyn RecordStore>> {
    match config.storage.backend {
        StorageBackend::Csv => {
            if !database.is_dir() {
                bail!("no database directory at {:?}", database);
            }
            Ok(Box::new(CsvRecordStore::open(database)))
        }
        StorageBackend::Duckdb => {
            let db = database.to_string_lossy().into_owned();
            Ok(Box::new(DuckDbRecordStore::open(&config.storage.db_path, db)?))
        }
    }
}
