//! Headless-browser capability used by crawl sessions.
//!
//! Sessions only see [`BrowserDriver`] and [`BrowserContext`]; the
//! chromiumoxide implementation lives in [`chrome`] and a scripted fake for
//! tests in `fake`.

#[cfg(feature = "browser")]
pub mod chrome;
#[cfg(test)]
pub mod fake;
pub mod stealth;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::settings::BrowserSettings;

/// Outer HTML of one matched element plus the URL of the page it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub html: String,
    pub base_url: Option<String>,
}

/// Settings applied when a context is opened.
#[derive(Debug, Clone)]
pub struct ContextOptions {
    pub user_agent: String,
    pub navigation_timeout: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum BrowserError {
    #[error("failed to open browser context: {0}")]
    Launch(String),
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },
    #[error("timed out after {}s waiting for {what}", .after.as_secs())]
    Timeout { what: String, after: Duration },
    #[error("query for '{selector}' failed: {reason}")]
    Query { selector: String, reason: String },
    #[error("script evaluation failed: {0}")]
    Evaluate(String),
    #[error("browser context is gone: {0}")]
    Closed(String),
}

impl BrowserError {
    /// A fatal error means the context itself is unusable; anything else only
    /// spoils the current page.
    pub fn is_fatal(&self) -> bool {
        matches!(self, BrowserError::Launch(_) | BrowserError::Closed(_))
    }
}

/// Result of one unit of crawl work (a page or an element).
#[derive(Debug)]
pub enum Outcome<T> {
    Success(T),
    Skip(String),
    Fatal(BrowserError),
}

impl<T> Outcome<T> {
    /// Sort a browser failure into skip or fatal.
    pub fn from_error(err: BrowserError) -> Self {
        if err.is_fatal() {
            Outcome::Fatal(err)
        } else {
            Outcome::Skip(err.to_string())
        }
    }
}

#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn open_context(
        &self,
        options: &ContextOptions,
    ) -> Result<Box<dyn BrowserContext>, BrowserError>;
}

/// One isolated browsing context. Must be closed by its owner.
#[async_trait]
pub trait BrowserContext: Send {
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError>;

    async fn wait_for_selector(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<(), BrowserError>;

    async fn query_all(&mut self, selector: &str) -> Result<Vec<Fragment>, BrowserError>;

    async fn evaluate(&mut self, script: &str) -> Result<serde_json::Value, BrowserError>;

    async fn close(self: Box<Self>) -> Result<(), BrowserError>;
}

/// The driver the binary crawls with.
pub fn driver_from_settings(settings: &BrowserSettings) -> Arc<dyn BrowserDriver> {
    #[cfg(feature = "browser")]
    {
        Arc::new(chrome::ChromeDriver::new(settings.clone()))
    }
    #[cfg(not(feature = "browser"))]
    {
        let _ = settings;
        Arc::new(UnavailableDriver)
    }
}

/// Driver used when the crate is built without the `browser` feature.
#[cfg(not(feature = "browser"))]
pub struct UnavailableDriver;

#[cfg(not(feature = "browser"))]
#[async_trait]
impl BrowserDriver for UnavailableDriver {
    async fn open_context(
        &self,
        _options: &ContextOptions,
    ) -> Result<Box<dyn BrowserContext>, BrowserError> {
        Err(BrowserError::Launch(
            "built without the `browser` feature".to_string(),
        ))
    }
}
