//! Browser session management.
//!
//! [`PageDriver`] is the set of page primitives the site adapters are written
//! against. [`BrowserSession`] implements it on top of chromiumoxide (CDP),
//! one isolated browser context and one page per session.

pub mod wait;

#[cfg(test)]
pub mod fake;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::target::{CreateBrowserContextParams, CreateTargetParams};
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::ScrapeError;
use wait::{WaitOutcome, WaitSpec, wait_until};

/// Cookie captured from the browser context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
}

/// Result of a step that is allowed to find nothing to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionalStep {
    Handled,
    NotFound,
    Failed(String),
}

/// Settings for launching a [`BrowserSession`].
#[derive(Debug, Clone)]
pub struct BrowserSettings {
    pub headless: bool,
    /// Explicit Chrome/Chromium binary; searched for when `None`.
    pub chrome_path: Option<PathBuf>,
    /// CDP request timeout.
    pub request_timeout: Duration,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_path: None,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Page-level primitives the site adapters drive.
///
/// Selectors are CSS. Query methods report absence as `false`, `None` or an
/// empty list; only the action methods (`click`, `fill`, `press_enter`) fail
/// when their target is missing.
#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn goto(&self, url: &str) -> Result<()>;

    /// Wait for the document to finish loading and give scripts a moment to settle.
    async fn wait_for_load(&self) -> Result<()>;

    async fn current_url(&self) -> Result<String>;

    /// Serialized HTML of the current document.
    async fn content(&self) -> Result<String>;

    async fn exists(&self, selector: &str) -> Result<bool>;

    /// Inner text of the first element matching `selector`.
    async fn inner_text(&self, selector: &str) -> Result<Option<String>>;

    /// Values of `attribute` on every matching element that carries it.
    async fn attribute_all(&self, selector: &str, attribute: &str) -> Result<Vec<String>>;

    async fn click(&self, selector: &str) -> Result<()>;

    /// Clear the input matched by `selector` and type `text` into it.
    async fn fill(&self, selector: &str, text: &str) -> Result<()>;

    async fn press_enter(&self, selector: &str) -> Result<()>;

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value>;

    async fn cookies(&self) -> Result<Vec<BrowserCookie>>;
}

/// Wait for `selector` to match at least one element.
pub async fn wait_for_selector<D: PageDriver + ?Sized>(
    driver: &D,
    selector: &str,
    spec: WaitSpec,
) -> WaitOutcome<()> {
    wait_until(spec, move || async move {
        driver.exists(selector).await.ok().filter(|found| *found).map(|_| ())
    })
    .await
}

/// Wait for `selector` to match nothing.
pub async fn wait_for_detached<D: PageDriver + ?Sized>(
    driver: &D,
    selector: &str,
    spec: WaitSpec,
) -> WaitOutcome<()> {
    wait_until(spec, move || async move {
        driver.exists(selector).await.ok().filter(|found| !*found).map(|_| ())
    })
    .await
}

/// Wait for the first element matching `selector` to have exactly `expected` as text.
pub async fn wait_for_text<D: PageDriver + ?Sized>(
    driver: &D,
    selector: &str,
    expected: &str,
    spec: WaitSpec,
) -> WaitOutcome<()> {
    wait_until(spec, move || async move {
        driver
            .inner_text(selector)
            .await
            .ok()
            .flatten()
            .filter(|text| text.trim() == expected)
            .map(|_| ())
    })
    .await
}

/// Wait for `needle` to appear anywhere in the page markup.
pub async fn wait_for_content<D: PageDriver + ?Sized>(
    driver: &D,
    needle: &str,
    spec: WaitSpec,
) -> WaitOutcome<()> {
    wait_until(spec, move || async move {
        driver
            .content()
            .await
            .ok()
            .filter(|html| html.contains(needle))
            .map(|_| ())
    })
    .await
}

/// Click `selector` if it shows up within `spec`.
///
/// Used for consent overlays that may or may not be shown.
pub async fn click_if_present<D: PageDriver + ?Sized>(
    driver: &D,
    selector: &str,
    spec: WaitSpec,
) -> OptionalStep {
    if !wait_for_selector(driver, selector, spec).await.is_ready() {
        return OptionalStep::NotFound;
    }

    match driver.click(selector).await {
        Ok(()) => OptionalStep::Handled,
        Err(e) => OptionalStep::Failed(e.to_string()),
    }
}

/// JavaScript resolving once the document is no longer loading.
const WAIT_FOR_READY_SCRIPT: &str = r"
    new Promise((resolve) => {
        if (document.readyState === 'complete') {
            resolve(document.readyState);
        } else {
            window.addEventListener('load', () => resolve(document.readyState));
            setTimeout(() => resolve('timeout'), 10000);
        }
    })
";

/// Time given to client-side rendering after the load event.
const SETTLE_DELAY: Duration = Duration::from_millis(500);

/// A launched browser with a single page in its own browser context.
pub struct BrowserSession {
    browser: Browser,
    page: Page,
    context: BrowserContextId,
    handler: JoinHandle<()>,
    request_timeout: Duration,
}

impl BrowserSession {
    /// Common Chrome executable paths to check.
    const CHROME_PATHS: &'static [&'static str] = &[
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/snap/bin/chromium",
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
        "/opt/google/chrome/google-chrome",
    ];

    fn find_chrome(explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(path.to_path_buf());
            }
            return Err(ScrapeError::Launch(format!(
                "configured Chrome binary does not exist: {}",
                path.display()
            ))
            .into());
        }

        Self::CHROME_PATHS
            .iter()
            .map(Path::new)
            .find(|p| p.exists())
            .map(Path::to_path_buf)
            .ok_or_else(|| {
                ScrapeError::Launch(
                    "Chrome/Chromium not found; install it or set CHROME_PATH".to_string(),
                )
                .into()
            })
    }

    /// Launch a browser and open one page in a fresh browser context.
    pub async fn launch(settings: &BrowserSettings) -> Result<Self> {
        let chrome = Self::find_chrome(settings.chrome_path.as_deref())?;
        info!(
            "Launching browser {} (headless={})",
            chrome.display(),
            settings.headless
        );

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome)
            .request_timeout(settings.request_timeout)
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--no-sandbox");
        if !settings.headless {
            builder = builder.with_head();
        }

        let config = builder.build().map_err(ScrapeError::Launch)?;

        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| ScrapeError::Launch(e.to_string()))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let context = browser
            .create_browser_context(CreateBrowserContextParams::default())
            .await
            .context("Failed to create browser context")?;

        let target = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(context.clone())
            .build()
            .map_err(anyhow::Error::msg)?;
        let page = browser
            .new_page(target)
            .await
            .context("Failed to open page")?;

        Ok(Self {
            browser,
            page,
            context,
            handler,
            request_timeout: settings.request_timeout,
        })
    }

    /// Close the page and the browser process.
    pub async fn close(mut self) -> Result<()> {
        debug!("Closing browser context {:?}", self.context);
        if let Err(e) = self.page.clone().close().await {
            warn!("Failed to close page: {}", e);
        }
        let closed = match self.browser.close().await {
            Ok(_) => self.browser.wait().await.map(|_| ()).map_err(anyhow::Error::from),
            Err(e) => Err(e.into()),
        };
        stop_handler(&self.handler, closed)?;
        info!("Browser session closed");
        Ok(())
    }

    fn selector_literal(selector: &str) -> Result<String> {
        Ok(serde_json::to_string(selector)?)
    }
}

/// Stop the CDP handler task, then report how the browser shut down.
fn stop_handler(handler: &JoinHandle<()>, closed: Result<()>) -> Result<()> {
    handler.abort();
    closed
}

#[async_trait]
impl PageDriver for BrowserSession {
    async fn goto(&self, url: &str) -> Result<()> {
        debug!("Navigating to {}", url);
        self.page
            .goto(url)
            .await
            .with_context(|| format!("Failed to navigate to {url}"))?;
        Ok(())
    }

    async fn wait_for_load(&self) -> Result<()> {
        match tokio::time::timeout(
            self.request_timeout,
            self.page.evaluate(WAIT_FOR_READY_SCRIPT.to_string()),
        )
        .await
        {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => debug!("Could not check ready state: {}", e),
            Err(_) => warn!("Timeout waiting for page ready state"),
        }
        tokio::time::sleep(SETTLE_DELAY).await;
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.page.url().await?.unwrap_or_default())
    }

    async fn content(&self) -> Result<String> {
        Ok(self.page.content().await?)
    }

    async fn exists(&self, selector: &str) -> Result<bool> {
        Ok(self
            .page
            .find_elements(selector)
            .await
            .map(|found| !found.is_empty())
            .unwrap_or(false))
    }

    async fn inner_text(&self, selector: &str) -> Result<Option<String>> {
        match self.page.find_element(selector).await {
            Ok(element) => Ok(element.inner_text().await?),
            Err(_) => Ok(None),
        }
    }

    async fn attribute_all(&self, selector: &str, attribute: &str) -> Result<Vec<String>> {
        let Ok(elements) = self.page.find_elements(selector).await else {
            return Ok(Vec::new());
        };

        let mut values = Vec::with_capacity(elements.len());
        for element in elements {
            if let Some(value) = element.attribute(attribute).await? {
                values.push(value);
            }
        }
        Ok(values)
    }

    async fn click(&self, selector: &str) -> Result<()> {
        self.page
            .find_element(selector)
            .await
            .map_err(|_| ScrapeError::MissingElement(selector.to_string()))?
            .click()
            .await?;
        Ok(())
    }

    async fn fill(&self, selector: &str, text: &str) -> Result<()> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|_| ScrapeError::MissingElement(selector.to_string()))?;
        element.click().await?;

        let clear = format!(
            "(() => {{ const el = document.querySelector({}); if (el) {{ el.value = ''; }} }})()",
            Self::selector_literal(selector)?
        );
        self.page.evaluate(clear).await?;

        element.type_str(text).await?;
        Ok(())
    }

    async fn press_enter(&self, selector: &str) -> Result<()> {
        self.page
            .find_element(selector)
            .await
            .map_err(|_| ScrapeError::MissingElement(selector.to_string()))?
            .press_key("Enter")
            .await?;
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value> {
        let result = self.page.evaluate(script.to_string()).await?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn cookies(&self) -> Result<Vec<BrowserCookie>> {
        let cookies = self.page.get_cookies().await?;
        Ok(cookies
            .into_iter()
            .map(|c| BrowserCookie {
                name: c.name,
                value: c.value,
                domain: c.domain,
                path: c.path,
            })
            .collect())
    }
}
