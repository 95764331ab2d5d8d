//! Scripted in-memory browser for tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use scraper::{Html, Selector};

use super::{BrowserContext, BrowserDriver, BrowserError, ContextOptions, Fragment};

/// Outer HTML of every element matching `selector` in a full page.
pub fn page_fragments(html: &str, selector: &str, base_url: Option<&str>) -> Vec<Fragment> {
    let doc = Html::parse_document(html);
    let sel = Selector::parse(selector).unwrap();
    doc.select(&sel)
        .map(|el| Fragment {
            html: el.html(),
            base_url: base_url.map(str::to_string),
        })
        .collect()
}

#[derive(Debug, Clone)]
pub enum FakePage {
    /// Navigation fails.
    Unreachable,
    /// Navigation works but the page has this HTML.
    Html(String),
    /// The context dies on navigation.
    Crash,
}

#[derive(Debug, Default)]
pub struct FakeStats {
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    pub evaluated: AtomicUsize,
    pub visited: Mutex<Vec<String>>,
}

impl FakeStats {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn visited(&self) -> Vec<String> {
        self.visited.lock().unwrap().clone()
    }
}

/// Pages are matched by URL substring, first rule wins. Unmatched URLs
/// load an empty page.
#[derive(Default)]
pub struct FakeDriver {
    rules: Arc<Vec<(String, FakePage)>>,
    fail_open: bool,
    pub stats: Arc<FakeStats>,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url_contains: &str, page: FakePage) -> Self {
        Arc::make_mut(&mut self.rules).push((url_contains.to_string(), page));
        self
    }

    pub fn failing_open() -> Self {
        Self {
            fail_open: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl BrowserDriver for FakeDriver {
    async fn open_context(
        &self,
        _options: &ContextOptions,
    ) -> Result<Box<dyn BrowserContext>, BrowserError> {
        if self.fail_open {
            return Err(BrowserError::Launch("no chrome in test".into()));
        }
        self.stats.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeContext {
            rules: Arc::clone(&self.rules),
            stats: Arc::clone(&self.stats),
            current: None,
        }))
    }
}

struct FakeContext {
    rules: Arc<Vec<(String, FakePage)>>,
    stats: Arc<FakeStats>,
    current: Option<(String, String)>,
}

#[async_trait]
impl BrowserContext for FakeContext {
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
        self.stats.visited.lock().unwrap().push(url.to_string());
        self.current = None;
        let page = self
            .rules
            .iter()
            .find(|(pat, _)| url.contains(pat.as_str()))
            .map(|(_, page)| page.clone())
            .unwrap_or_else(|| FakePage::Html("<html><body></body></html>".into()));
        match page {
            FakePage::Unreachable => Err(BrowserError::Navigation {
                url: url.to_string(),
                reason: "net::ERR_CONNECTION_REFUSED".into(),
            }),
            FakePage::Crash => Err(BrowserError::Closed("target crashed".into())),
            FakePage::Html(html) => {
                self.current = Some((url.to_string(), html));
                Ok(())
            }
        }
    }

    async fn wait_for_selector(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<(), BrowserError> {
        let found = self
            .current
            .as_ref()
            .is_some_and(|(_, html)| !page_fragments(html, selector, None).is_empty());
        if found {
            Ok(())
        } else {
            Err(BrowserError::Timeout {
                what: selector.to_string(),
                after: timeout,
            })
        }
    }

    async fn query_all(&mut self, selector: &str) -> Result<Vec<Fragment>, BrowserError> {
        Ok(match &self.current {
            Some((url, html)) => page_fragments(html, selector, Some(url)),
            None => Vec::new(),
        })
    }

    async fn evaluate(&mut self, _script: &str) -> Result<serde_json::Value, BrowserError> {
        self.stats.evaluated.fetch_add(1, Ordering::SeqCst);
        Ok(serde_json::Value::Null)
    }

    async fn close(self: Box<Self>) -> Result<(), BrowserError> {
        self.stats.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
