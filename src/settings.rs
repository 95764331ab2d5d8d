use std::time::Duration;

use anyhow::{bail, Context, Result};
use config::{Config, Environment};
use regex::Regex;
use serde::Deserialize;

use crate::crawl::plan::CrawlPlan;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";
/// Upper bound for `HARVEST_MAX_AGE_DAYS` (about a century).
pub const MAX_RETENTION_DAYS: i64 = 36_500;
pub const DEFAULT_SEARCH_PATH: &str = "/{slug}-jobs-in-{location}?k={query}&l={location}&experience={experience}&pageNo={page}&nignbevent_src=jobsearchDeskGNB";

/// Raw key/value view of the environment (`HARVEST_*`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RawSettings {
    pub store_path: String,
    pub store_table: String,
    pub base_url: String,
    pub search_path: String,
    pub queries: String,
    pub locations: String,
    pub experiences: String,
    pub pages: u32,
    pub max_age_days: i64,
    pub stale_posted_pattern: String,
    pub user_agent: String,
    pub navigation_timeout_secs: u64,
    pub selector_timeout_secs: u64,
    pub headless: bool,
    pub stealth: bool,
    pub chrome_executable: Option<String>,
    pub browser_ws_url: Option<String>,
    pub listen_addr: String,
    pub schedule: String,
    pub run_on_startup: bool,
}

impl Default for RawSettings {
    fn default() -> Self {
        Self {
            store_path: "data/jobs.sqlite".into(),
            store_table: "jobs".into(),
            base_url: "https://www.naukri.com".into(),
            search_path: DEFAULT_SEARCH_PATH.into(),
            queries: "software engineer,data analyst".into(),
            locations: "kolkata,mumbai".into(),
            experiences: "0,1".into(),
            pages: 2,
            max_age_days: 30,
            stale_posted_pattern: r"(?i)30\+ Days Ago".into(),
            user_agent: DEFAULT_USER_AGENT.into(),
            navigation_timeout_secs: 60,
            selector_timeout_secs: 15,
            headless: true,
            stealth: true,
            chrome_executable: None,
            browser_ws_url: None,
            listen_addr: "0.0.0.0:3000".into(),
            schedule: "0 0 0,12 * * *".into(),
            run_on_startup: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub path: String,
    pub table: String,
}

#[derive(Debug, Clone)]
pub struct BrowserSettings {
    pub headless: bool,
    pub chrome_executable: Option<String>,
    pub ws_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CrawlSettings {
    pub base_url: String,
    pub search_path: String,
    pub pages: u32,
    pub user_agent: String,
    pub navigation_timeout: Duration,
    pub selector_timeout: Duration,
    pub stealth: bool,
}

#[derive(Debug, Clone)]
pub struct RetentionSettings {
    pub max_age_days: i64,
    pub stale_pattern: Regex,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub listen_addr: String,
    pub schedule: String,
    pub run_on_startup: bool,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub store: StoreSettings,
    pub browser: BrowserSettings,
    pub crawl: CrawlSettings,
    pub plan: CrawlPlan,
    pub retention: RetentionSettings,
    pub server: ServerSettings,
}

impl Settings {
    /// `.env` (if present) then `HARVEST_*` environment variables.
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();
        let conf = Config::builder()
            .add_source(Environment::with_prefix("HARVEST"))
            .build()
            .context("reading HARVEST_* environment")?;
        Self::from_config(conf)
    }

    pub fn from_config(conf: Config) -> Result<Self> {
        let raw: RawSettings = conf
            .try_deserialize()
            .context("invalid HARVEST_* configuration")?;
        Self::from_raw(raw)
    }

    pub fn from_raw(raw: RawSettings) -> Result<Self> {
        if raw.pages == 0 {
            bail!("HARVEST_PAGES must be at least 1");
        }
        if !(0..=MAX_RETENTION_DAYS).contains(&raw.max_age_days) {
            bail!(
                "HARVEST_MAX_AGE_DAYS must be between 0 and {}, got {}",
                MAX_RETENTION_DAYS,
                raw.max_age_days
            );
        }
        let stale_pattern = Regex::new(&raw.stale_posted_pattern)
            .with_context(|| format!("invalid stale pattern '{}'", raw.stale_posted_pattern))?;

        Ok(Self {
            store: StoreSettings {
                path: raw.store_path,
                table: raw.store_table,
            },
            browser: BrowserSettings {
                headless: raw.headless,
                chrome_executable: raw.chrome_executable.filter(|s| !s.trim().is_empty()),
                ws_url: raw.browser_ws_url.filter(|s| !s.trim().is_empty()),
            },
            crawl: CrawlSettings {
                base_url: raw.base_url.trim_end_matches('/').to_string(),
                search_path: raw.search_path,
                pages: raw.pages,
                user_agent: raw.user_agent,
                navigation_timeout: Duration::from_secs(raw.navigation_timeout_secs),
                selector_timeout: Duration::from_secs(raw.selector_timeout_secs),
                stealth: raw.stealth,
            },
            plan: CrawlPlan::new(
                split_list(&raw.queries),
                split_list(&raw.locations),
                split_list(&raw.experiences),
            ),
            retention: RetentionSettings {
                max_age_days: raw.max_age_days,
                stale_pattern,
            },
            server: ServerSettings {
                listen_addr: raw.listen_addr,
                schedule: raw.schedule,
                run_on_startup: raw.run_on_startup,
            },
        })
    }
}

/// Comma-separated list, trimmed, empty items dropped.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
