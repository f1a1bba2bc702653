//! Typed failures that callers need to tell apart.
//!
//! Most of the crate returns `anyhow::Result`; these variants are raised
//! inside it so the pipeline can `downcast_ref` and decide whether a failure
//! is fatal for the batch or only for one record.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScrapeError {
    /// No browser session could be started.
    #[error("failed to launch browser session: {0}")]
    Launch(String),

    /// A bounded wait expired before its condition held.
    #[error("timed out after {waited:?} waiting for {what}")]
    Timeout { what: String, waited: Duration },

    /// A required element was not present in the page.
    #[error("required element not found: {0}")]
    MissingElement(String),

    #[error("invalid selector `{0}`")]
    Selector(String),
}

impl ScrapeError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
