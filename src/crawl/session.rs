//! One crawl session: a browser context walking the result pages of a
//! single plan entry.

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use super::plan::PlanEntry;
use crate::browser::{stealth, BrowserContext, BrowserDriver, BrowserError, ContextOptions, Fragment, Outcome};
use crate::model::{ExperienceLevel, RawListing};
use crate::parser::{self, extract::LISTING_SELECTOR};
use crate::settings::CrawlSettings;

/// A listing seen on a results page, with its classified experience level.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub raw: RawListing,
    pub experience_level: ExperienceLevel,
    pub page: u32,
    pub page_url: String,
}

/// Receives records as soon as a page has been extracted.
#[async_trait]
pub trait ListingSink: Send {
    async fn accept(&mut self, entry: &PlanEntry, record: SessionRecord);
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionReport {
    pub pages_attempted: u32,
    pub pages_skipped: u32,
    pub listings_emitted: usize,
}

pub struct CrawlSession<'a> {
    driver: &'a dyn BrowserDriver,
    settings: &'a CrawlSettings,
    entry: &'a PlanEntry,
}

impl<'a> CrawlSession<'a> {
    pub fn new(driver: &'a dyn BrowserDriver, settings: &'a CrawlSettings, entry: &'a PlanEntry) -> Self {
        Self {
            driver,
            settings,
            entry,
        }
    }

    /// Crawl pages `1..=pages`. The context is closed on every exit path;
    /// only a fatal browser error ends the session early.
    pub async fn run(&self, sink: &mut dyn ListingSink) -> Result<SessionReport, BrowserError> {
        let options = ContextOptions {
            user_agent: self.settings.user_agent.clone(),
            navigation_timeout: self.settings.navigation_timeout,
        };
        let mut ctx = self.driver.open_context(&options).await?;

        let result = self.crawl_pages(ctx.as_mut(), sink).await;

        if let Err(e) = ctx.close().await {
            warn!(query = %self.entry.query, location = %self.entry.location, experience = %self.entry.experience,
                "Closing browser context failed: {}", e);
        }
        result
    }

    async fn crawl_pages(
        &self,
        ctx: &mut dyn BrowserContext,
        sink: &mut dyn ListingSink,
    ) -> Result<SessionReport, BrowserError> {
        let entry = self.entry;
        let mut report = SessionReport::default();

        for page in 1..=self.settings.pages {
            report.pages_attempted += 1;
            let url = entry.search_url(&self.settings.base_url, &self.settings.search_path, page);
            debug!("Scraping {}", url);

            match self.load_page(ctx, &url).await {
                Outcome::Success(fragments) => {
                    info!(query = %entry.query, location = %entry.location, experience = %entry.experience,
                        page, "Found {} job listings", fragments.len());
                    for fragment in &fragments {
                        let (raw, experience_level) = parser::process_fragment(fragment);
                        let record = SessionRecord {
                            raw,
                            experience_level,
                            page,
                            page_url: url.clone(),
                        };
                        sink.accept(entry, record).await;
                        report.listings_emitted += 1;
                    }
                }
                Outcome::Skip(reason) => {
                    warn!(query = %entry.query, location = %entry.location, experience = %entry.experience,
                        page, url = %url, "No job listings on page, continuing: {}", reason);
                    report.pages_skipped += 1;
                }
                Outcome::Fatal(err) => {
                    error!(query = %entry.query, location = %entry.location, experience = %entry.experience,
                        page, url = %url, "Session aborted: {}", err);
                    return Err(err);
                }
            }
        }

        Ok(report)
    }

    async fn load_page(&self, ctx: &mut dyn BrowserContext, url: &str) -> Outcome<Vec<Fragment>> {
        if let Err(e) = ctx.navigate(url).await {
            return Outcome::from_error(e);
        }
        if self.settings.stealth {
            stealth::apply(ctx).await;
        }
        if let Err(e) = ctx
            .wait_for_selector(LISTING_SELECTOR, self.settings.selector_timeout)
            .await
        {
            return Outcome::from_error(e);
        }
        match ctx.query_all(LISTING_SELECTOR).await {
            Ok(fragments) => Outcome::Success(fragments),
            Err(e) => Outcome::from_error(e),
        }
    }
}
