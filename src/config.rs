//! Runtime configuration from the environment.
//!
//! `.env` is loaded in `main` before [`AppConfig::from_env`] runs. Site URLs
//! and selectors are not configurable; they live with each site adapter.
//!
//! | Variable             | Default      |
//! |----------------------|--------------|
//! | `SCRAPER_HEADLESS`   | `true`       |
//! | `SCRAPER_OUTPUT_DIR` | `output`     |
//! | `SCRAPER_SITES`      | `cuf,hdl`    |
//! | `SCRAPER_MERGE`      | `true`       |
//! | `CHROME_PATH`        | auto-detect  |

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Result, anyhow, bail};

use crate::browser::BrowserSettings;
use crate::scrapers::{CufScraper, HdlScraper};
use crate::traits::SiteAdapter;

/// File name (without extension) of the merged workbook.
pub const MERGED_NAME: &str = "merged_doctors_data";

/// The directories this tool knows how to scrape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteKind {
    Cuf,
    Hdl,
}

impl SiteKind {
    /// Sheet holding this site's rows in the merged workbook.
    pub fn sheet_name(self) -> &'static str {
        match self {
            Self::Cuf => "siteA",
            Self::Hdl => "siteB",
        }
    }

    pub fn adapter(self) -> Result<Box<dyn SiteAdapter>> {
        let adapter: Box<dyn SiteAdapter> = match self {
            Self::Cuf => Box::new(CufScraper::new()?),
            Self::Hdl => Box::new(HdlScraper::new()),
        };
        Ok(adapter)
    }
}

impl FromStr for SiteKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cuf" => Ok(Self::Cuf),
            "hdl" | "hospitaldaluz" => Ok(Self::Hdl),
            other => Err(anyhow!("unknown site '{other}' (expected cuf or hdl)")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub browser: BrowserSettings,
    pub output_dir: PathBuf,
    pub sites: Vec<SiteKind>,
    /// Combine the per-site workbooks once every site has been exported
    pub merge: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            browser: BrowserSettings::default(),
            output_dir: PathBuf::from("output"),
            sites: vec![SiteKind::Cuf, SiteKind::Hdl],
            merge: true,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(value) = lookup("SCRAPER_HEADLESS") {
            config.browser.headless = parse_bool("SCRAPER_HEADLESS", &value)?;
        }
        if let Some(path) = lookup("CHROME_PATH").filter(|p| !p.trim().is_empty()) {
            config.browser.chrome_path = Some(PathBuf::from(path));
        }
        if let Some(dir) = lookup("SCRAPER_OUTPUT_DIR").filter(|d| !d.trim().is_empty()) {
            config.output_dir = PathBuf::from(dir);
        }
        if let Some(list) = lookup("SCRAPER_SITES") {
            let mut sites = Vec::new();
            for name in list.split(',').filter(|s| !s.trim().is_empty()) {
                let site = name.parse::<SiteKind>()?;
                if !sites.contains(&site) {
                    sites.push(site);
                }
            }
            if sites.is_empty() {
                bail!("SCRAPER_SITES names no sites");
            }
            config.sites = sites;
        }
        if let Some(value) = lookup("SCRAPER_MERGE") {
            config.merge = parse_bool("SCRAPER_MERGE", &value)?;
        }

        Ok(config)
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(anyhow!("{key} must be a boolean, got '{other}'")),
    }
}
