use anyhow::Result;
use tracing::{error, info, warn};

use crate::browser::wait::TimeoutPolicy;
use crate::browser::{BrowserSession, PageDriver};
use crate::config::{AppConfig, MERGED_NAME, SiteKind};
use crate::error::ScrapeError;
use crate::export::{ExportPaths, export_records, merge_workbooks};
use crate::models::DoctorRecord;
use crate::traits::SiteAdapter;

/// Runs the per-site pipelines and writes their output.
pub struct DoctorFinder {
    config: AppConfig,
}

impl DoctorFinder {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    /// Scrape every configured site, export each, then merge.
    ///
    /// A site that fails is logged and left out; the others still run.
    pub async fn run(&self) -> Vec<(SiteKind, ExportPaths)> {
        let mut exported = Vec::new();

        for &site in &self.config.sites {
            let result = match site.adapter() {
                Ok(adapter) => self.run_site(adapter.as_ref()).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(paths) => exported.push((site, paths)),
                Err(e) => error!("Scraping {:?} failed: {:#}", site, e),
            }
        }

        if self.config.merge && exported.len() > 1 {
            self.merge(&exported);
        }

        exported
    }

    /// Full pipeline for one site: open, filter, collect, extract, export, close.
    pub async fn run_site(&self, adapter: &dyn SiteAdapter) -> Result<ExportPaths> {
        let name = &adapter.config().name;
        info!("Starting {} pipeline", name);

        let session = BrowserSession::launch(&self.config.browser).await?;
        let scraped = scrape_with(adapter, &session).await;
        if let Err(e) = session.close().await {
            warn!("Failed to close browser for {}: {}", name, e);
        }

        let records = scraped?;
        export_records(
            &records,
            &self.config.output_dir,
            &adapter.config().output_name,
        )
    }

    /// Combine the exported workbooks; failure is reported, never propagated.
    fn merge(&self, exported: &[(SiteKind, ExportPaths)]) {
        let sources: Vec<_> = exported
            .iter()
            .map(|(site, paths)| (site.sheet_name().to_string(), paths.xlsx.clone()))
            .collect();
        let out = self.config.output_dir.join(format!("{MERGED_NAME}.xlsx"));

        match merge_workbooks(&sources, &out) {
            Ok(summary) => info!(
                "Merged {} sheets into {}",
                summary.sheets.len(),
                summary.path.display()
            ),
            Err(e) => error!("Failed to merge workbooks into {}: {:#}", out.display(), e),
        }
    }
}

/// Filter, collect links and extract details with an open page.
pub async fn scrape_with(
    adapter: &dyn SiteAdapter,
    driver: &dyn PageDriver,
) -> Result<Vec<DoctorRecord>> {
    let listing = adapter.apply_filter(driver).await?;
    let links = adapter.collect_links(driver, &listing).await?;
    info!(
        "Collected {} detail links on {}",
        links.len(),
        adapter.config().name
    );
    extract_all(adapter, driver, &links).await
}

/// Extract every link in order, skipping the ones that fail.
///
/// A detail timeout aborts the batch only when the site's `detail_render`
/// policy is [`TimeoutPolicy::Fail`].
pub async fn extract_all(
    adapter: &dyn SiteAdapter,
    driver: &dyn PageDriver,
    links: &[String],
) -> Result<Vec<DoctorRecord>> {
    let config = adapter.config();
    let policy = config.waits.detail_render.policy;
    let mut records = Vec::with_capacity(links.len());

    for (i, url) in links.iter().enumerate() {
        match adapter.extract_detail(driver, url).await {
            Ok(record) => {
                info!(
                    "[{}/{}] Scraped {} from {}",
                    i + 1,
                    links.len(),
                    record.name,
                    config.name
                );
                records.push(record);
            }
            Err(e) => {
                let timed_out = e
                    .downcast_ref::<ScrapeError>()
                    .is_some_and(ScrapeError::is_timeout);
                if timed_out && policy == TimeoutPolicy::Fail {
                    return Err(e.context(format!("Detail page {url} never rendered")));
                }
                error!("Failed to scrape {}: {:#}", url, e);
            }
        }
    }

    if records.len() < links.len() {
        warn!(
            "Skipped {} of {} doctors on {}",
            links.len() - records.len(),
            links.len(),
            config.name
        );
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use anyhow::anyhow;
    use async_trait::async_trait;

    use crate::browser::fake::FakeDriver;
    use crate::scrapers::HdlScraper;
    use crate::traits::{Listing, ScraperConfig};

    /// Adapter serving canned results; URLs containing "broken" fail and
    /// "slow" time out.
    struct CannedSite {
        config: ScraperConfig,
        links: Vec<String>,
    }

    impl CannedSite {
        fn new(links: &[&str], detail_policy: TimeoutPolicy) -> Self {
            let mut config = HdlScraper::default_config();
            config.waits.detail_render.policy = detail_policy;
            Self {
                config,
                links: links.iter().map(|l| (*l).to_string()).collect(),
            }
        }
    }

    #[async_trait]
    impl SiteAdapter for CannedSite {
        fn config(&self) -> &ScraperConfig {
            &self.config
        }

        async fn apply_filter(&self, _driver: &dyn PageDriver) -> Result<Listing> {
            Ok(Listing::default())
        }

        async fn collect_links(
            &self,
            _driver: &dyn PageDriver,
            _listing: &Listing,
        ) -> Result<Vec<String>> {
            Ok(self.links.clone())
        }

        async fn extract_detail(
            &self,
            _driver: &dyn PageDriver,
            url: &str,
        ) -> Result<DoctorRecord> {
            if url.contains("broken") {
                return Err(anyhow!("connection reset"));
            }
            if url.contains("slow") {
                return Err(ScrapeError::Timeout {
                    what: format!("heading on {url}"),
                    waited: Duration::from_secs(10),
                }
                .into());
            }
            Ok(DoctorRecord {
                name: url.rsplit('/').next().unwrap_or_default().to_string(),
                specialty: "Pediatria".to_string(),
                unit: "N/A".to_string(),
                registration_number: None,
            })
        }
    }

    #[tokio::test]
    async fn failed_detail_is_skipped_and_others_kept() {
        let site = CannedSite::new(
            &["https://h/ana", "https://h/broken", "https://h/eva"],
            TimeoutPolicy::Skip,
        );
        let driver = FakeDriver::new();

        let records = scrape_with(&site, &driver).await.unwrap();

        let names: Vec<_> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["ana", "eva"]);
    }

    #[tokio::test]
    async fn detail_timeout_is_skipped_under_skip_policy() {
        let site = CannedSite::new(&["https://h/slow", "https://h/rui"], TimeoutPolicy::Skip);
        let driver = FakeDriver::new();

        let records = extract_all(&site, &driver, &site.links).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "rui");
    }

    #[tokio::test]
    async fn detail_timeout_aborts_under_fail_policy() {
        let site = CannedSite::new(
            &["https://h/ana", "https://h/slow", "https://h/rui"],
            TimeoutPolicy::Fail,
        );
        let driver = FakeDriver::new();

        let err = extract_all(&site, &driver, &site.links).await.unwrap_err();
        assert!(
            err.downcast_ref::<ScrapeError>()
                .is_some_and(ScrapeError::is_timeout)
        );
    }

    #[tokio::test]
    async fn non_timeout_failures_never_abort() {
        let site = CannedSite::new(&["https://h/broken", "https://h/ana"], TimeoutPolicy::Fail);
        let driver = FakeDriver::new();

        let records = extract_all(&site, &driver, &site.links).await.unwrap();
        assert_eq!(records.len(), 1);
    }
}
