//! In-memory [`PageDriver`] over static HTML for tests.
//!
//! Pages are registered by URL. Queries run real CSS selectors against the
//! current page; clicking an anchor whose `href` is a registered page
//! navigates to it, and pressing Enter on a selector wired with
//! [`FakeDriver::navigate_on_enter`] loads the page given there.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use scraper::{Html, Selector};

use super::{BrowserCookie, PageDriver};
use crate::error::ScrapeError;

#[derive(Default)]
struct FakeState {
    pages: HashMap<String, String>,
    navigations: HashMap<String, String>,
    current_url: String,
    html: String,
    visits: Vec<String>,
    clicks: Vec<String>,
    fills: Vec<(String, String)>,
    script_result: serde_json::Value,
    cookies: Vec<BrowserCookie>,
    fail_clicks: bool,
}

#[derive(Default)]
pub struct FakeDriver {
    state: Mutex<FakeState>,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// A driver already showing `html` at `url`.
    pub fn with_page(url: &str, html: &str) -> Self {
        let driver = Self::new();
        driver.add_page(url, html);
        {
            let mut state = driver.state.lock().unwrap();
            state.current_url = url.to_string();
            state.html = html.to_string();
        }
        driver
    }

    pub fn add_page(&self, url: &str, html: &str) {
        self.state
            .lock()
            .unwrap()
            .pages
            .insert(url.to_string(), html.to_string());
    }

    /// Pressing Enter on `selector` loads `url`.
    pub fn navigate_on_enter(&self, selector: &str, url: &str) {
        self.state
            .lock()
            .unwrap()
            .navigations
            .insert(selector.to_string(), url.to_string());
    }

    pub fn set_script_result(&self, value: serde_json::Value) {
        self.state.lock().unwrap().script_result = value;
    }

    pub fn set_cookies(&self, cookies: Vec<BrowserCookie>) {
        self.state.lock().unwrap().cookies = cookies;
    }

    /// Make every click on an existing element fail.
    pub fn fail_clicks(&self) {
        self.state.lock().unwrap().fail_clicks = true;
    }

    pub fn visits(&self) -> Vec<String> {
        self.state.lock().unwrap().visits.clone()
    }

    pub fn clicks(&self) -> Vec<String> {
        self.state.lock().unwrap().clicks.clone()
    }

    pub fn fills(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().fills.clone()
    }

    fn load(state: &mut FakeState, url: &str) -> Result<()> {
        let html = state
            .pages
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow!("no page registered for {url}"))?;
        state.current_url = url.to_string();
        state.html = html;
        state.visits.push(url.to_string());
        Ok(())
    }

    fn query<T>(html: &str, selector: &str, f: impl FnOnce(&Html, &Selector) -> T) -> Result<T> {
        let selector =
            Selector::parse(selector).map_err(|_| ScrapeError::Selector(selector.to_string()))?;
        let document = Html::parse_document(html);
        Ok(f(&document, &selector))
    }

    /// `href` of the first element matching `selector`, failing when nothing matches.
    fn href_of(state: &FakeState, selector: &str) -> Result<Option<String>> {
        Ok(Self::query(&state.html, selector, |doc, sel| {
            doc.select(sel)
                .next()
                .map(|el| el.value().attr("href").map(str::to_string))
        })?
        .ok_or_else(|| ScrapeError::MissingElement(selector.to_string()))?)
    }
}

#[async_trait]
impl PageDriver for FakeDriver {
    async fn goto(&self, url: &str) -> Result<()> {
        Self::load(&mut self.state.lock().unwrap(), url)
    }

    async fn wait_for_load(&self) -> Result<()> {
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.state.lock().unwrap().current_url.clone())
    }

    async fn content(&self) -> Result<String> {
        Ok(self.state.lock().unwrap().html.clone())
    }

    async fn exists(&self, selector: &str) -> Result<bool> {
        let html = self.state.lock().unwrap().html.clone();
        Self::query(&html, selector, |doc, sel| doc.select(sel).next().is_some())
    }

    async fn inner_text(&self, selector: &str) -> Result<Option<String>> {
        let html = self.state.lock().unwrap().html.clone();
        Self::query(&html, selector, |doc, sel| {
            doc.select(sel)
                .next()
                .map(|el| el.text().collect::<String>())
        })
    }

    async fn attribute_all(&self, selector: &str, attribute: &str) -> Result<Vec<String>> {
        let html = self.state.lock().unwrap().html.clone();
        Self::query(&html, selector, |doc, sel| {
            doc.select(sel)
                .filter_map(|el| el.value().attr(attribute).map(str::to_string))
                .collect()
        })
    }

    async fn click(&self, selector: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let target = Self::href_of(&state, selector)?.filter(|h| state.pages.contains_key(h));
        if state.fail_clicks {
            return Err(anyhow!("element {selector} is not clickable"));
        }
        state.clicks.push(selector.to_string());
        if let Some(url) = target {
            Self::load(&mut state, &url)?;
        }
        Ok(())
    }

    async fn fill(&self, selector: &str, text: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        Self::href_of(&state, selector)?;
        state.fills.push((selector.to_string(), text.to_string()));
        Ok(())
    }

    async fn press_enter(&self, selector: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        Self::href_of(&state, selector)?;
        if let Some(url) = state.navigations.get(selector).cloned() {
            Self::load(&mut state, &url)?;
        }
        Ok(())
    }

    async fn evaluate(&self, _script: &str) -> Result<serde_json::Value> {
        Ok(self.state.lock().unwrap().script_result.clone())
    }

    async fn cookies(&self) -> Result<Vec<BrowserCookie>> {
        Ok(self.state.lock().unwrap().cookies.clone())
    }
}
