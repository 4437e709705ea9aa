//! trawler-scrape — the scraping capability and result persistence.
//!
//! Site scrapers implement [`PageScraper`] and are looked up in a
//! [`ScraperRegistry`] by `(job_type, job_name)`. Scrapers and
//! crawlers live in separate tables: the worker's batch loop resolves
//! from the scraper table, the one-shot crawl entry point from the
//! crawler table. Fetched content goes through a [`ResultStore`].
//!
//! The rest of the system knows nothing about sites. A job either
//! names a registered capability or it is invalid input.

pub mod error;
pub mod fetch;
pub mod registry;
pub mod sites;
pub mod store;

pub use error::{ScrapeError, ScrapeResult};
pub use registry::{PageScraper, ScraperRegistry};
pub use store::{FsStore, MemoryStore, ResultStore};
