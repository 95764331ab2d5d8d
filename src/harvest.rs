//! One ingestion cycle: ping the store, sweep stale listings, then crawl the
//! plan one session at a time and reconcile what comes back.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::browser::{BrowserDriver, BrowserError};
use crate::crawl::{CrawlPlan, CrawlSession, ListingSink, PlanEntry, SessionRecord};
use crate::db::{ListingStore, StoreError, UpsertOutcome};
use crate::parser::normalize::normalize;
use crate::reconcile::Reconciler;
use crate::settings::{CrawlSettings, RetentionSettings, Settings};

#[derive(Debug, thiserror::Error)]
pub enum HarvestError {
    #[error("store unreachable: {0}")]
    StoreUnreachable(#[source] StoreError),
    #[error("an ingestion cycle is already running")]
    CycleInProgress,
    #[error("no browser context could be opened: {0}")]
    BrowserUnavailable(#[source] BrowserError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    pub purged: u64,
    pub purge_failed: bool,
    pub sessions_completed: usize,
    pub sessions_failed: usize,
    pub pages_skipped: u32,
    pub inserted: usize,
    pub updated: usize,
    pub dropped: usize,
    pub write_failures: usize,
    #[serde(skip)]
    pub elapsed: Duration,
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "purged {}{}, sessions {} ok / {} failed, {} pages skipped, \
             {} inserted, {} updated, {} dropped, {} write failures in {:.1}s",
            self.purged,
            if self.purge_failed { " (sweep failed)" } else { "" },
            self.sessions_completed,
            self.sessions_failed,
            self.pages_skipped,
            self.inserted,
            self.updated,
            self.dropped,
            self.write_failures,
            self.elapsed.as_secs_f64()
        )
    }
}

/// Validates session records and hands them to the reconciler as they
/// arrive.
struct ReconcileSink<'a> {
    reconciler: &'a Reconciler,
    inserted: usize,
    updated: usize,
    dropped: usize,
    write_failures: usize,
}

impl<'a> ReconcileSink<'a> {
    fn new(reconciler: &'a Reconciler) -> Self {
        Self {
            reconciler,
            inserted: 0,
            updated: 0,
            dropped: 0,
            write_failures: 0,
        }
    }

    fn add_to(&self, report: &mut CycleReport) {
        report.inserted += self.inserted;
        report.updated += self.updated;
        report.dropped += self.dropped;
        report.write_failures += self.write_failures;
    }
}

#[async_trait]
impl ListingSink for ReconcileSink<'_> {
    async fn accept(&mut self, entry: &PlanEntry, record: SessionRecord) {
        let now = Utc::now();
        let listing = match normalize(record.raw, record.experience_level, now) {
            Ok(listing) => listing,
            Err(reason) => {
                warn!(query = %entry.query, location = %entry.location, experience = %entry.experience,
                    page = record.page, url = %record.page_url, "Dropping listing: {}", reason);
                self.dropped += 1;
                return;
            }
        };

        let url = listing.url.clone();
        match self.reconciler.upsert_at(listing, now).await {
            Ok(UpsertOutcome::Inserted) => self.inserted += 1,
            Ok(UpsertOutcome::Updated) => self.updated += 1,
            Err(e) => {
                warn!(query = %entry.query, location = %entry.location, experience = %entry.experience,
                    page = record.page, url = %url, "Failed to save listing: {}", e);
                self.write_failures += 1;
            }
        }
    }
}

pub struct Harvester {
    store: Arc<dyn ListingStore>,
    reconciler: Reconciler,
    driver: Arc<dyn BrowserDriver>,
    crawl: CrawlSettings,
    retention: RetentionSettings,
    plan: CrawlPlan,
    run_lock: Mutex<()>,
}

impl Harvester {
    pub fn new(store: Arc<dyn ListingStore>, driver: Arc<dyn BrowserDriver>, settings: &Settings) -> Self {
        Self {
            reconciler: Reconciler::new(Arc::clone(&store)),
            store,
            driver,
            crawl: settings.crawl.clone(),
            retention: settings.retention.clone(),
            plan: settings.plan.clone(),
            run_lock: Mutex::new(()),
        }
    }

    /// Run the configured plan.
    pub async fn run_cycle(&self) -> Result<CycleReport, HarvestError> {
        self.run_plan(self.plan.entries()).await
    }

    /// Run any sequence of plan entries, strictly one session at a time.
    ///
    /// Only an unreachable store (checked before anything is touched) or a
    /// browser that never opened a single context fails the cycle. A second
    /// call while a cycle is running fails fast with
    /// [`HarvestError::CycleInProgress`].
    pub async fn run_plan<I>(&self, plan: I) -> Result<CycleReport, HarvestError>
    where
        I: IntoIterator<Item = PlanEntry>,
        I::IntoIter: Send,
    {
        let _guard = self
            .run_lock
            .try_lock()
            .map_err(|_| HarvestError::CycleInProgress)?;
        let started = Instant::now();

        if let Err(e) = self.store.ping().await {
            error!("Store unreachable, aborting cycle: {}", e);
            return Err(HarvestError::StoreUnreachable(e));
        }

        let mut report = CycleReport::default();
        match self
            .reconciler
            .purge_stale(self.retention.max_age_days, &self.retention.stale_pattern)
            .await
        {
            Ok(n) => report.purged = n,
            Err(e) => {
                warn!("Retention sweep failed, continuing with crawl: {}", e);
                report.purge_failed = true;
            }
        }

        let mut last_open_error = None;
        for entry in plan {
            info!(query = %entry.query, location = %entry.location, experience = %entry.experience,
                "Scraping jobs");
            let mut sink = ReconcileSink::new(&self.reconciler);
            let session = CrawlSession::new(self.driver.as_ref(), &self.crawl, &entry);

            match session.run(&mut sink).await {
                Ok(s) => {
                    debug!(%entry, "Session done: {} listings, {} pages skipped",
                        s.listings_emitted, s.pages_skipped);
                    report.sessions_completed += 1;
                    report.pages_skipped += s.pages_skipped;
                }
                Err(e) => {
                    error!(query = %entry.query, location = %entry.location, experience = %entry.experience,
                        "Session failed: {}", e);
                    report.sessions_failed += 1;
                    if matches!(e, BrowserError::Launch(_)) {
                        last_open_error = Some(e);
                    }
                }
            }
            sink.add_to(&mut report);
        }

        report.elapsed = started.elapsed();
        if report.sessions_completed == 0 {
            if let Some(e) = last_open_error {
                if report.sessions_failed > 0 {
                    error!("Browser never opened, cycle produced nothing: {}", e);
                    return Err(HarvestError::BrowserUnavailable(e));
                }
            }
        }

        info!("Cycle finished: {}", report);
        Ok(report)
    }
}
