//! Hospital da Luz (hospitaldaluz.pt) doctor directory
//!
//! Filtering ticks specialty checkboxes in the sidebar. The page count is
//! read once from the pagination bar and listing pages are then loaded by
//! URL. Detail pages are rendered client-side and go through the browser.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, info, warn};
use url::Url;

use crate::browser::wait::WaitOutcome;
use crate::browser::{PageDriver, wait_for_detached, wait_for_selector};
use crate::error::ScrapeError;
use crate::extract::{card_links, parse_detail};
use crate::models::DoctorRecord;
use crate::traits::{
    DetailSelectors, FieldLocator, Listing, ScraperConfig, SiteAdapter, SiteSelectors, WaitRules,
};

/// Spinner shown while the result list refreshes.
const LOADING_ICON: &str = "img.loading-icon";

/// Attribute set on the specialty filter input so it can be addressed by CSS.
const FILTER_INPUT_MARK: &str = "data-scrape-target";

/// Tags the text input under the "Especialidades" filter header.
const MARK_SPECIALTY_INPUT: &str = r"
    (() => {
        const header = [...document.querySelectorAll('h3')]
            .find((h) => h.textContent.includes('Especialidades'));
        const wrapper = header && header.closest('div.form-field.filter-options-wrapper.filter-header-wrapper');
        const input = wrapper && wrapper.querySelector('input');
        if (!input) {
            return false;
        }
        input.setAttribute('data-scrape-target', 'specialty-filter');
        return true;
    })()
";

/// Scraper implementation for hospitaldaluz.pt
pub struct HdlScraper {
    config: ScraperConfig,
    /// `for` attributes of the specialty checkbox labels to tick
    specialties: Vec<String>,
    /// Pause after each checkbox click while the results refresh
    checkbox_pause: Duration,
}

impl HdlScraper {
    /// Create a new Hospital da Luz scraper with default configuration
    pub fn new() -> Self {
        Self::with_config(Self::default_config())
    }

    pub fn with_config(config: ScraperConfig) -> Self {
        Self {
            config,
            specialties: vec![
                "Neuropediatria".to_string(),
                "Pediatria".to_string(),
                "Pediatria-do-Desenvolvimento".to_string(),
            ],
            checkbox_pause: Duration::from_millis(500),
        }
    }

    pub fn default_config() -> ScraperConfig {
        ScraperConfig {
            name: "Hospital da Luz".to_string(),
            base_url: "https://www.hospitaldaluz.pt".to_string(),
            search_url: "https://www.hospitaldaluz.pt/pt/encontre-um-medico".to_string(),
            search_term: "pediatria".to_string(),
            selectors: SiteSelectors {
                consent_button: "button.button.outline.small".to_string(),
                search_input: format!("input[{FILTER_INPUT_MARK}='specialty-filter']"),
                result_card: ".medic-card".to_string(),
                card_link: "a[href]".to_string(),
                pagination_next: None,
                current_page: None,
                page_count: Some("nav.search-pagination li:nth-last-child(2) a".to_string()),
                detail: DetailSelectors {
                    name: "h2.medic-name".to_string(),
                    specialty: FieldLocator::Css("ul.medic-specialities-list li".to_string()),
                    unit: FieldLocator::Css("p.medic-hospitals a".to_string()),
                    registration_number: Some(FieldLocator::Css("p.medic-order span".to_string())),
                },
            },
            waits: WaitRules::default(),
            output_name: "hdl_doctors_data".to_string(),
            max_pages: 200,
        }
    }

    #[cfg(test)]
    fn without_pauses(mut self) -> Self {
        self.checkbox_pause = Duration::ZERO;
        self
    }
}

impl Default for HdlScraper {
    fn default() -> Self {
        Self::new()
    }
}

/// Page count shown in the pagination bar; `None` unless it is a positive number.
fn parse_page_count(text: &str) -> Option<u32> {
    text.trim().parse().ok().filter(|n| *n > 0)
}

/// `listing` with its `page` query parameter set to `page`.
fn page_url(listing: &str, page: u32) -> Result<String> {
    let mut url = Url::parse(listing)?;
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != "page")
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair("page", &page.to_string());
    Ok(url.to_string())
}

#[async_trait]
impl SiteAdapter for HdlScraper {
    fn config(&self) -> &ScraperConfig {
        &self.config
    }

    async fn apply_filter(&self, driver: &dyn PageDriver) -> Result<Listing> {
        let config = &self.config;
        let selectors = &config.selectors;
        let waits = &config.waits;
        info!("Filtering {} for '{}'", config.name, config.search_term);

        driver.goto(&config.search_url).await?;
        driver.wait_for_load().await?;
        self.dismiss_consent(driver).await;

        let marked = driver.evaluate(MARK_SPECIALTY_INPUT).await?;
        if marked != serde_json::Value::Bool(true) {
            return Err(ScrapeError::MissingElement("Especialidades filter input".to_string()).into());
        }
        driver.click(&selectors.search_input).await?;
        driver.fill(&selectors.search_input, &config.search_term).await?;

        for specialty in &self.specialties {
            driver.click(&format!("label[for={specialty}]")).await?;
            tokio::time::sleep(self.checkbox_pause).await;
        }

        let spinner = wait_for_detached(driver, LOADING_ICON, waits.results.spec).await;
        waits.results.resolve(spinner, "loading spinner to disappear")?;
        let cards = wait_for_selector(driver, &selectors.result_card, waits.results.spec).await;
        waits.results.resolve(cards, "filtered result cards")?;

        let url = driver.current_url().await?;
        info!("Filtered URL: {}", url);

        let page_count = match &selectors.page_count {
            Some(sel) => match driver.inner_text(sel).await? {
                Some(text) => parse_page_count(&text).or_else(|| {
                    warn!("Unreadable page count '{}', assuming 1", text.trim());
                    Some(1)
                }),
                None => {
                    warn!("No pagination on {}, assuming a single page", config.name);
                    Some(1)
                }
            },
            None => None,
        };

        let cookies = driver.cookies().await?;
        debug!(
            "Captured cookies: {:?}",
            cookies.iter().map(|c| c.name.as_str()).collect::<Vec<_>>()
        );
        info!(
            "{} result pages, {} cookies captured",
            page_count.unwrap_or(1),
            cookies.len()
        );

        Ok(Listing {
            url,
            page_count,
            cookies,
        })
    }

    async fn collect_links(&self, driver: &dyn PageDriver, listing: &Listing) -> Result<Vec<String>> {
        let config = &self.config;
        let selectors = &config.selectors;
        let results = config.waits.results;
        let base = self.base_url()?;

        let pages = listing.page_count.unwrap_or(1).min(config.max_pages);
        let mut links = Vec::new();

        for page in 1..=pages {
            let url = page_url(&listing.url, page)?;
            info!("Fetching page {}/{}: {}", page, pages, url);

            driver.goto(&url).await?;
            let outcome = wait_for_selector(driver, &selectors.result_card, results.spec).await;
            if page > 1 && !outcome.is_ready() {
                info!("No result cards on page {}, stopping", page);
                break;
            }
            if results
                .resolve(outcome, &format!("result cards on page {page}"))?
                .is_none()
            {
                break;
            }

            let html = driver.content().await?;
            let page_links = card_links(&html, &base, &selectors.result_card, &selectors.card_link)?;
            if page_links.is_empty() {
                warn!("No result cards found on page {}", page);
                break;
            }
            links.extend(page_links);
        }

        info!("Found {} doctor links on {}", links.len(), config.name);
        Ok(links)
    }

    async fn extract_detail(&self, driver: &dyn PageDriver, url: &str) -> Result<DoctorRecord> {
        let detail = &self.config.selectors.detail;

        driver.goto(url).await?;
        let outcome =
            wait_for_selector(driver, &detail.name, self.config.waits.detail_render.spec).await;
        if let WaitOutcome::TimedOut { waited } = outcome {
            return Err(ScrapeError::Timeout {
                what: format!("doctor heading on {url}"),
                waited,
            }
            .into());
        }

        let html = driver.content().await?;
        parse_detail(&html, detail)
    }
}
