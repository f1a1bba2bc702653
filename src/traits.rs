//! Traits and interfaces for site-agnostic directory scraping

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, info, warn};
use url::Url;

use crate::browser::wait::{TimeoutPolicy, WaitRule, WaitSpec};
use crate::browser::{BrowserCookie, OptionalStep, PageDriver, click_if_present};
use crate::models::DoctorRecord;

/// Configuration for a directory site
#[derive(Debug, Clone)]
pub struct ScraperConfig {
    /// Display name for the site
    pub name: String,
    /// Base URL that relative links are resolved against
    pub base_url: String,
    /// Page holding the search form
    pub search_url: String,
    /// Category typed into the search/filter control
    pub search_term: String,
    /// CSS selectors for listing and detail pages
    pub selectors: SiteSelectors,
    /// Wait bounds and timeout policies per call site
    pub waits: WaitRules,
    /// Basename of the exported files
    pub output_name: String,
    /// Safety limit on listing pages
    pub max_pages: u32,
}

/// Selectors for the listing side of a site
#[derive(Debug, Clone)]
pub struct SiteSelectors {
    /// Cookie/consent overlay button (optional step)
    pub consent_button: String,
    /// Search or filter text input
    pub search_input: String,
    /// Result card container on a listing page
    pub result_card: String,
    /// Detail link inside a result card
    pub card_link: String,
    /// "Next page" control, for sites that paginate by following it
    pub pagination_next: Option<String>,
    /// Element whose text is the current page number
    pub current_page: Option<String>,
    /// Element whose text is the total page count
    pub page_count: Option<String>,
    /// Fields on the detail page
    pub detail: DetailSelectors,
}

/// Where a field lives on a detail page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldLocator {
    /// Every element matching the selector (joined when multi-valued).
    Css(String),
    /// The first `tag` element following a text node reading `label`.
    AfterLabel { label: String, tag: String },
}

#[derive(Debug, Clone)]
pub struct DetailSelectors {
    /// Primary heading; a page without it is not a doctor page
    pub name: String,
    pub specialty: FieldLocator,
    pub unit: FieldLocator,
    /// `None` when the site does not publish registration numbers
    pub registration_number: Option<FieldLocator>,
}

/// Wait bounds for each place a site adapter blocks on the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitRules {
    /// How long to look for the consent overlay
    pub consent: WaitSpec,
    /// Results rendered after filtering or loading a listing page
    pub results: WaitRule,
    /// Current-page indicator reaching the expected number
    pub page_advance: WaitRule,
    /// Detail page heading rendered
    pub detail_render: WaitRule,
}

impl Default for WaitRules {
    fn default() -> Self {
        Self {
            consent: WaitSpec::millis(3_000, 100),
            results: WaitRule::new(WaitSpec::millis(10_000, 100), TimeoutPolicy::Fail),
            page_advance: WaitRule::new(WaitSpec::millis(10_000, 100), TimeoutPolicy::Fail),
            detail_render: WaitRule::new(WaitSpec::millis(10_000, 100), TimeoutPolicy::Skip),
        }
    }
}

/// State of the result listing once filters are applied
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    /// URL of the filtered result listing
    pub url: String,
    /// Total pages, when the site shows it up front
    pub page_count: Option<u32>,
    /// Cookies of the browser context after filtering
    pub cookies: Vec<BrowserCookie>,
}

/// Trait for site-specific directory scrapers
#[async_trait]
pub trait SiteAdapter: Send + Sync {
    /// Get the configuration for this site
    fn config(&self) -> &ScraperConfig;

    /// Open the search page and narrow the results to the target category
    ///
    /// # Returns
    /// * `Result<Listing>` - The filtered listing, ready to paginate
    async fn apply_filter(&self, driver: &dyn PageDriver) -> Result<Listing>;

    /// Walk the listing pages and harvest absolute detail-page URLs
    async fn collect_links(&self, driver: &dyn PageDriver, listing: &Listing)
    -> Result<Vec<String>>;

    /// Load one detail page and extract its record
    ///
    /// # Arguments
    /// * `driver` - The browser page, for sites that render details in it
    /// * `url` - Absolute detail-page URL
    async fn extract_detail(&self, driver: &dyn PageDriver, url: &str) -> Result<DoctorRecord>;

    /// Best-effort click on the consent overlay
    async fn dismiss_consent(&self, driver: &dyn PageDriver) -> OptionalStep {
        let config = self.config();
        let step = click_if_present(
            driver,
            &config.selectors.consent_button,
            config.waits.consent,
        )
        .await;

        match &step {
            OptionalStep::Handled => info!("Dismissed consent overlay on {}", config.name),
            OptionalStep::NotFound => debug!("No consent overlay on {}", config.name),
            OptionalStep::Failed(reason) => {
                warn!("Could not dismiss consent overlay on {}: {}", config.name, reason);
            }
        }
        step
    }

    /// Parsed base URL for resolving relative links
    fn base_url(&self) -> Result<Url> {
        Ok(Url::parse(&self.config().base_url)?)
    }
}
