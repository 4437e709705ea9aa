//! Scrape error types.

use thiserror::Error;

pub type ScrapeResult<T> = Result<T, ScrapeError>;

#[derive(Debug, Error)]
pub enum ScrapeError {
    /// The job is malformed for the selected scraper: unknown
    /// capability or missing required informations. Retrying cannot
    /// help, so callers fail the job without special handling.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The scrape itself failed (connect, HTTP, timeout). The job is
    /// left unacknowledged and the queue redelivers it.
    #[error("scrape failed: {0}")]
    Fetch(String),

    /// Persisting the scraped content failed.
    #[error("result store error: {0}")]
    Store(String),
}
