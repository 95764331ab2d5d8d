mod browser;
mod crawl;
mod db;
mod harvest;
mod model;
mod parser;
mod query;
mod reconcile;
mod schedule;
mod server;
mod settings;

use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use crate::db::{ListingFilter, ListingStore, SqliteStore};
use crate::harvest::Harvester;
use crate::settings::Settings;

#[derive(Parser)]
#[command(name = "job_harvester", about = "Job listing harvester with a query API")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the query API and run ingestion on the configured schedule
    Serve {
        /// Skip the ingestion run at startup
        #[arg(long)]
        no_startup_run: bool,
    },
    /// Run one ingestion cycle now
    Run,
    /// Delete stale listings without crawling
    Purge {
        /// Override HARVEST_MAX_AGE_DAYS
        #[arg(long, value_parser = clap::value_parser!(i64).range(0..=settings::MAX_RETENTION_DAYS))]
        max_age_days: Option<i64>,
    },
    /// Print the crawl plan and its page URLs (no browser)
    Plan,
    /// Stored listings table
    List {
        /// Substring of title, company or description
        #[arg(short, long)]
        search: Option<String>,
        /// Substring of title
        #[arg(short, long)]
        title: Option<String>,
        /// Substring of location
        #[arg(short, long)]
        location: Option<String>,
        /// Experience level (e.g. "Entry-Level")
        #[arg(short, long)]
        experience: Option<String>,
        /// Company level (e.g. "Startup")
        #[arg(short, long)]
        company_level: Option<String>,
        #[arg(short, long, default_value = "1")]
        page: u64,
        /// Rows per page
        #[arg(short = 'n', long, default_value = "20")]
        limit: u64,
    },
    /// Store statistics
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load()?;

    let result = match cli.command {
        Commands::Serve { no_startup_run } => serve(settings, !no_startup_run).await,
        Commands::Run => {
            ensure_browser()?;
            let harvester = harvester(&settings, open_store(&settings)?);
            let report = harvester.run_cycle().await?;
            println!("{}", report);
            Ok(())
        }
        Commands::Purge { max_age_days } => {
            let store = open_store(&settings)?;
            let reconciler = reconcile::Reconciler::new(store);
            let days = max_age_days.unwrap_or(settings.retention.max_age_days);
            let deleted = reconciler
                .purge_stale(days, &settings.retention.stale_pattern)
                .await?;
            println!("Deleted {} listings (older than {} days or marked stale)", deleted, days);
            Ok(())
        }
        Commands::Plan => {
            let crawl = &settings.crawl;
            if settings.plan.is_empty() {
                println!("Plan is empty. Set HARVEST_QUERIES, HARVEST_LOCATIONS and HARVEST_EXPERIENCES.");
                return Ok(());
            }
            for (i, entry) in settings.plan.entries().enumerate() {
                println!("{:>3} | {}", i + 1, entry);
                for page in 1..=crawl.pages {
                    println!("      {}", entry.search_url(&crawl.base_url, &crawl.search_path, page));
                }
            }
            println!(
                "\n{} combinations x {} pages",
                settings.plan.len(),
                crawl.pages
            );
            Ok(())
        }
        Commands::List {
            search,
            title,
            location,
            experience,
            company_level,
            page,
            limit,
        } => {
            let store = open_store(&settings)?;
            let filter = ListingFilter {
                search,
                title,
                location,
                experience_level: experience.as_deref().map(str::parse).transpose()?,
                company_level: company_level.as_deref().map(str::parse).transpose()?,
            };
            let result = query::fetch_page(store.as_ref(), &filter, Some(page), Some(limit)).await?;
            if result.jobs.is_empty() {
                println!("No listings found.");
                return Ok(());
            }

            println!(
                "{:<32} | {:<20} | {:<16} | {:<12} | {:<9} | {:<10}",
                "Title", "Company", "Location", "Experience", "Type", "Posted"
            );
            println!("{}", "-".repeat(112));
            for job in &result.jobs {
                let posted = job
                    .posted_date
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| "-".into());
                println!(
                    "{:<32} | {:<20} | {:<16} | {:<12} | {:<9} | {:<10}",
                    truncate(&job.title, 32),
                    truncate(&job.company, 20),
                    truncate(&job.location, 16),
                    job.experience_level,
                    job.job_type,
                    posted
                );
            }
            println!(
                "\npage {}/{} | {} listings",
                result.current_page, result.total_pages, result.total_count
            );
            Ok(())
        }
        Commands::Stats => {
            let store = SqliteStore::open(&settings.store.path, &settings.store.table)?;
            let s = store.stats().await?;
            println!("Total:   {}", s.total);
            for (level, n) in &s.per_experience {
                println!("  {:<14} {}", level, n);
            }
            let fmt = |t: Option<chrono::DateTime<chrono::Utc>>| {
                t.map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
                    .unwrap_or_else(|| "-".into())
            };
            println!("Newest:  {}", fmt(s.newest));
            println!("Oldest:  {}", fmt(s.oldest));
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn open_store(settings: &Settings) -> anyhow::Result<Arc<dyn ListingStore>> {
    let store = SqliteStore::open(&settings.store.path, &settings.store.table)
        .with_context(|| format!("opening store {}", settings.store.path))?;
    Ok(Arc::new(store))
}

fn harvester(settings: &Settings, store: Arc<dyn ListingStore>) -> Harvester {
    let driver = browser::driver_from_settings(&settings.browser);
    Harvester::new(store, driver, settings)
}

fn ensure_browser() -> anyhow::Result<()> {
    if cfg!(feature = "browser") {
        Ok(())
    } else {
        bail!("built without the `browser` feature; crawling is unavailable")
    }
}

async fn serve(settings: Settings, startup_run: bool) -> anyhow::Result<()> {
    let store = open_store(&settings)?;
    let state = server::AppState {
        store: Arc::clone(&store),
    };

    let mut scheduler = None;
    match ensure_browser() {
        Ok(()) => {
            let harvester = Arc::new(harvester(&settings, store));
            scheduler = Some(
                schedule::start_scheduler(Arc::clone(&harvester), &settings.server.schedule)
                    .await?,
            );
            if startup_run && settings.server.run_on_startup {
                info!("Starting ingestion at startup");
                tokio::spawn(async move { schedule::run_logged(&harvester).await });
            }
        }
        Err(e) => warn!("Serving without ingestion: {}", e),
    }

    let served = server::listen(&settings.server.listen_addr, state).await;
    if let Some(mut scheduler) = scheduler {
        if let Err(e) = scheduler.shutdown().await {
            warn!("Scheduler shutdown failed: {}", e);
        }
    }
    served
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
