use anyhow::Result;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod browser;
mod config;
mod doctor_finder;
mod error;
mod export;
mod extract;
mod models;
mod scrapers;
mod traits;

use config::AppConfig;
use doctor_finder::DoctorFinder;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting hospital doctor directory scraper");

    let config = AppConfig::from_env()?;
    let sites = config.sites.len();
    let finder = DoctorFinder::new(config);

    let exported = finder.run().await;
    if exported.len() < sites {
        warn!("{} of {} sites produced no export", sites - exported.len(), sites);
    }

    for (site, paths) in &exported {
        info!(
            "{:?}: {} / {}",
            site,
            paths.csv.display(),
            paths.xlsx.display()
        );
    }

    Ok(())
}
