//! CUF (cuf.pt) doctor directory
//!
//! The listing is filtered through the free-text search box and paginated by
//! following the "next" link. Detail pages are static, so they are fetched
//! with a plain HTTP client instead of the browser.

use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use tracing::{info, warn};

use crate::browser::PageDriver;
use crate::browser::{wait_for_content, wait_for_text};
use crate::extract::{absolute_url, parse_detail};
use crate::models::DoctorRecord;
use crate::traits::{
    DetailSelectors, FieldLocator, Listing, ScraperConfig, SiteAdapter, SiteSelectors, WaitRules,
};

/// User agent for detail-page requests.
const USER_AGENT: &str = "Mozilla/5.0";

/// Text shown once the filtered results have rendered.
const RESULTS_MARKER: &str = "Limpar filtros";

/// Scraper implementation for cuf.pt
pub struct CufScraper {
    client: Client,
    config: ScraperConfig,
}

impl CufScraper {
    /// Create a new CUF scraper with default configuration
    pub fn new() -> Result<Self> {
        Self::with_config(Self::default_config())
    }

    pub fn with_config(config: ScraperConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.waits.detail_render.spec.timeout)
            .build()?;
        Ok(Self { client, config })
    }

    pub fn default_config() -> ScraperConfig {
        ScraperConfig {
            name: "CUF".to_string(),
            base_url: "https://www.cuf.pt".to_string(),
            search_url: "https://www.cuf.pt/medicos".to_string(),
            search_term: "pediatria".to_string(),
            selectors: SiteSelectors {
                consent_button: "button#onetrust-accept-btn-handler".to_string(),
                search_input: ".text-search-placeholder".to_string(),
                result_card: "div.container-info-doctors".to_string(),
                card_link: "a[href]".to_string(),
                pagination_next: Some("a[rel=next]".to_string()),
                current_page: Some("a[title='Página atual']".to_string()),
                page_count: None,
                detail: DetailSelectors {
                    name: "h1".to_string(),
                    specialty: FieldLocator::AfterLabel {
                        label: "Áreas de Diferenciação".to_string(),
                        tag: "div".to_string(),
                    },
                    unit: FieldLocator::Css("div.field--name-field-sites .field--item".to_string()),
                    registration_number: None,
                },
            },
            waits: WaitRules::default(),
            output_name: "cuf_doctors_data".to_string(),
            max_pages: 200,
        }
    }
}

#[async_trait]
impl SiteAdapter for CufScraper {
    fn config(&self) -> &ScraperConfig {
        &self.config
    }

    async fn apply_filter(&self, driver: &dyn PageDriver) -> Result<Listing> {
        let config = &self.config;
        info!("Filtering {} for '{}'", config.name, config.search_term);

        driver.goto(&config.search_url).await?;
        driver.wait_for_load().await?;
        self.dismiss_consent(driver).await;

        let input = &config.selectors.search_input;
        driver.click(input).await?;
        driver.fill(input, &config.search_term).await?;
        driver.press_enter(input).await?;
        driver.wait_for_load().await?;

        Ok(Listing {
            url: driver.current_url().await?,
            page_count: None,
            cookies: driver.cookies().await?,
        })
    }

    async fn collect_links(
        &self,
        driver: &dyn PageDriver,
        _listing: &Listing,
    ) -> Result<Vec<String>> {
        let config = &self.config;
        let selectors = &config.selectors;
        let waits = &config.waits;
        let base = self.base_url()?;
        let anchors = format!("{} {}", selectors.result_card, selectors.card_link);

        let mut seen = HashSet::new();
        let mut links = Vec::new();
        let mut page: u32 = 1;

        loop {
            let marker = wait_for_content(driver, RESULTS_MARKER, waits.results.spec).await;
            if waits
                .results
                .resolve(marker, &format!("results on page {page}"))?
                .is_none()
            {
                break;
            }

            let hrefs = driver.attribute_all(&anchors, "href").await?;
            let mut fresh = 0;
            for href in &hrefs {
                let url = absolute_url(&base, href)?;
                if seen.insert(url.clone()) {
                    links.push(url);
                    fresh += 1;
                }
            }
            info!(
                "Page {} of {}: {} links ({} new)",
                page,
                config.name,
                hrefs.len(),
                fresh
            );

            let Some(next) = selectors.pagination_next.as_deref() else {
                break;
            };
            if !driver.exists(next).await? {
                info!("No more pages on {} (searched {} pages)", config.name, page);
                break;
            }
            if page >= config.max_pages {
                warn!(
                    "Reached maximum page limit ({}) on {}",
                    config.max_pages, config.name
                );
                break;
            }

            driver.click(next).await?;
            driver.wait_for_load().await?;
            page += 1;

            if let Some(indicator) = selectors.current_page.as_deref() {
                let expected = page.to_string();
                let outcome =
                    wait_for_text(driver, indicator, &expected, waits.page_advance.spec).await;
                if waits
                    .page_advance
                    .resolve(outcome, &format!("current page indicator to read {expected}"))?
                    .is_none()
                {
                    break;
                }
            }
        }

        info!("Found {} unique doctor links on {}", links.len(), config.name);
        Ok(links)
    }

    async fn extract_detail(&self, _driver: &dyn PageDriver, url: &str) -> Result<DoctorRecord> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!(
                "Failed to fetch detail page {}: {}",
                url,
                response.status()
            ));
        }

        let html = response.text().await?;
        parse_detail(&html, &self.config.selectors.detail)
    }
}
