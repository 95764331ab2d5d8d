//! chromiumoxide-backed driver: one browser process (or remote connection)
//! per context.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::error::CdpError;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{BrowserContext, BrowserDriver, BrowserError, ContextOptions, Fragment};
use crate::settings::BrowserSettings;

const SELECTOR_POLL: Duration = Duration::from_millis(250);

pub struct ChromeDriver {
    settings: BrowserSettings,
}

impl ChromeDriver {
    pub fn new(settings: BrowserSettings) -> Self {
        Self { settings }
    }

    fn launch_config(&self, options: &ContextOptions) -> Result<BrowserConfig, BrowserError> {
        let mut builder = BrowserConfig::builder()
            .request_timeout(options.navigation_timeout)
            .window_size(1920, 1080);

        // with_head means NOT headless
        if !self.settings.headless {
            builder = builder.with_head();
        }
        if let Some(ref path) = self.settings.chrome_executable {
            builder = builder.chrome_executable(path);
        }

        builder = builder
            .arg("--no-sandbox")
            .arg("--disable-setuid-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-accelerated-2d-canvas")
            .arg("--disable-gpu")
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--no-first-run");

        builder.build().map_err(BrowserError::Launch)
    }

    async fn start(&self, options: &ContextOptions) -> Result<(Browser, JoinHandle<()>, bool), BrowserError> {
        let (browser, mut handler, owned) = match self.settings.ws_url {
            Some(ref ws_url) => {
                info!("Connecting to browser at {}", ws_url);
                let (browser, handler) = Browser::connect(ws_url.as_str())
                    .await
                    .map_err(|e| BrowserError::Launch(e.to_string()))?;
                (browser, handler, false)
            }
            None => {
                debug!(headless = self.settings.headless, "Launching browser");
                let config = self.launch_config(options)?;
                let (browser, handler) = Browser::launch(config)
                    .await
                    .map_err(|e| BrowserError::Launch(e.to_string()))?;
                (browser, handler, true)
            }
        };

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        Ok((browser, handler_task, owned))
    }
}

#[async_trait]
impl BrowserDriver for ChromeDriver {
    async fn open_context(
        &self,
        options: &ContextOptions,
    ) -> Result<Box<dyn BrowserContext>, BrowserError> {
        let (mut browser, handler_task, owned) = self.start(options).await?;

        let page = match prepare_page(&browser, options).await {
            Ok(page) => page,
            Err(e) => {
                shutdown(&mut browser, owned, handler_task).await;
                return Err(e);
            }
        };

        Ok(Box::new(ChromeContext {
            browser,
            page,
            handler_task,
            owned,
            navigation_timeout: options.navigation_timeout,
        }))
    }
}

async fn prepare_page(browser: &Browser, options: &ContextOptions) -> Result<Page, BrowserError> {
    let page = browser
        .new_page("about:blank")
        .await
        .map_err(|e| BrowserError::Launch(e.to_string()))?;
    page.execute(SetUserAgentOverrideParams::new(options.user_agent.clone()))
        .await
        .map_err(|e| BrowserError::Launch(format!("setting user agent: {}", e)))?;
    Ok(page)
}

async fn shutdown(browser: &mut Browser, owned: bool, handler_task: JoinHandle<()>) {
    if owned {
        if let Err(e) = browser.close().await {
            warn!("Browser close failed: {}", e);
        }
        if let Err(e) = browser.wait().await {
            debug!("Waiting for browser exit failed: {}", e);
        }
    }
    handler_task.abort();
}

struct ChromeContext {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
    owned: bool,
    navigation_timeout: Duration,
}

fn is_disconnect(err: &CdpError) -> bool {
    matches!(err, CdpError::ChannelSendError(_) | CdpError::Ws(_))
}

#[async_trait]
impl BrowserContext for ChromeContext {
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
        debug!("Navigating to {}", url);
        match tokio::time::timeout(self.navigation_timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) if is_disconnect(&e) => Err(BrowserError::Closed(e.to_string())),
            Ok(Err(e)) => Err(BrowserError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            }),
            Err(_) => Err(BrowserError::Timeout {
                what: format!("navigation to {}", url),
                after: self.navigation_timeout,
            }),
        }
    }

    async fn wait_for_selector(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<(), BrowserError> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.page.find_element(selector).await {
                Ok(_) => return Ok(()),
                Err(e) if is_disconnect(&e) => return Err(BrowserError::Closed(e.to_string())),
                Err(_) => {}
            }
            if Instant::now() >= deadline {
                return Err(BrowserError::Timeout {
                    what: selector.to_string(),
                    after: timeout,
                });
            }
            tokio::time::sleep(SELECTOR_POLL).await;
        }
    }

    async fn query_all(&mut self, selector: &str) -> Result<Vec<Fragment>, BrowserError> {
        let query_err = |e: CdpError| {
            if is_disconnect(&e) {
                BrowserError::Closed(e.to_string())
            } else {
                BrowserError::Query {
                    selector: selector.to_string(),
                    reason: e.to_string(),
                }
            }
        };

        let base_url = self.page.url().await.map_err(query_err)?;
        let elements = self.page.find_elements(selector).await.map_err(query_err)?;

        let mut fragments = Vec::with_capacity(elements.len());
        for element in elements {
            match element.outer_html().await {
                Ok(Some(html)) => fragments.push(Fragment {
                    html,
                    base_url: base_url.clone(),
                }),
                Ok(None) => {}
                Err(e) if is_disconnect(&e) => return Err(BrowserError::Closed(e.to_string())),
                // a detached element is skipped, the rest of the page still counts
                Err(e) => debug!("Skipping element for '{}': {}", selector, e),
            }
        }
        Ok(fragments)
    }

    async fn evaluate(&mut self, script: &str) -> Result<serde_json::Value, BrowserError> {
        let result = self
            .page
            .evaluate(script.to_string())
            .await
            .map_err(|e| BrowserError::Evaluate(e.to_string()))?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn close(self: Box<Self>) -> Result<(), BrowserError> {
        let ChromeContext {
            mut browser,
            page,
            handler_task,
            owned,
            ..
        } = *self;
        let page_result = page
            .close()
            .await
            .map_err(|e| BrowserError::Closed(e.to_string()));
        shutdown(&mut browser, owned, handler_task).await;
        page_result
    }
}
