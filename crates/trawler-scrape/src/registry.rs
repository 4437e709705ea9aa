//! Scraper lookup by job identity.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{ScrapeError, ScrapeResult};
use crate::sites::{CorenRj, CorenSp, CorenSpCrawler, EsajSp};

/// A site-specific scraping capability.
///
/// Implementations validate the `informations` fields they need and
/// return the fetched page content. They never touch the queue or the
/// result store.
#[async_trait]
pub trait PageScraper: Send + Sync {
    async fn scrape(&self, informations: &HashMap<String, String>) -> ScrapeResult<String>;
}

type Table = HashMap<String, HashMap<String, Arc<dyn PageScraper>>>;

/// Two-level lookup from `(job_type, job_name)` to a capability.
///
/// Scrapers and crawlers are separate tables on purpose: a job type
/// may offer one without the other, and resolving the wrong verb is
/// invalid input, not a fallback.
#[derive(Default)]
pub struct ScraperRegistry {
    scrapers: Table,
    crawlers: Table,
}

impl ScraperRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in site wired in.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register_scraper("coren", "sp", Arc::new(CorenSp::new()));
        registry.register_scraper("coren", "rj", Arc::new(CorenRj::new()));
        registry.register_scraper("esaj", "sp", Arc::new(EsajSp::new()));
        registry.register_crawler("coren", "sp", Arc::new(CorenSpCrawler::new()));
        registry
    }

    pub fn register_scraper(
        &mut self,
        job_type: &str,
        job_name: &str,
        scraper: Arc<dyn PageScraper>,
    ) {
        self.scrapers
            .entry(job_type.to_string())
            .or_default()
            .insert(job_name.to_string(), scraper);
    }

    pub fn register_crawler(
        &mut self,
        job_type: &str,
        job_name: &str,
        crawler: Arc<dyn PageScraper>,
    ) {
        self.crawlers
            .entry(job_type.to_string())
            .or_default()
            .insert(job_name.to_string(), crawler);
    }

    pub fn scraper(&self, job_type: &str, job_name: &str) -> ScrapeResult<Arc<dyn PageScraper>> {
        lookup(&self.scrapers, job_type, job_name, "scraper")
    }

    pub fn crawler(&self, job_type: &str, job_name: &str) -> ScrapeResult<Arc<dyn PageScraper>> {
        lookup(&self.crawlers, job_type, job_name, "crawler")
    }
}

fn lookup(
    table: &Table,
    job_type: &str,
    job_name: &str,
    verb: &str,
) -> ScrapeResult<Arc<dyn PageScraper>> {
    let names = table
        .get(job_type)
        .ok_or_else(|| ScrapeError::InvalidInput(format!("unknown job type: {job_type}")))?;
    names
        .get(job_name)
        .cloned()
        .ok_or_else(|| {
            ScrapeError::InvalidInput(format!("{job_name} is not a registered {job_type} {verb}"))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedScraper(&'static str);

    #[async_trait]
    impl PageScraper for FixedScraper {
        async fn scrape(&self, _informations: &HashMap<String, String>) -> ScrapeResult<String> {
            Ok(self.0.to_string())
        }
    }

    #[tokio::test]
    async fn resolves_registered_scrapers() {
        let mut registry = ScraperRegistry::new();
        registry.register_scraper("coren", "sp", Arc::new(FixedScraper("sp page")));
        registry.register_scraper("coren", "rj", Arc::new(FixedScraper("rj page")));

        let scraper = registry.scraper("coren", "rj").unwrap();
        let content = scraper.scrape(&HashMap::new()).await.unwrap();
        assert_eq!(content, "rj page");
    }

    #[test]
    fn unknown_type_is_invalid_input() {
        let registry = ScraperRegistry::builtin();
        let result = registry.scraper("detran", "sp");
        assert!(matches!(result, Err(ScrapeError::InvalidInput(_))));
    }

    #[test]
    fn unknown_name_is_invalid_input() {
        let registry = ScraperRegistry::builtin();
        let result = registry.scraper("coren", "mg");
        assert!(matches!(result, Err(ScrapeError::InvalidInput(_))));
    }

    #[test]
    fn crawler_table_is_separate() {
        let registry = ScraperRegistry::builtin();
        assert!(registry.crawler("coren", "sp").is_ok());
        // esaj-sp is scrapable but not crawlable
        assert!(registry.scraper("esaj", "sp").is_ok());
        assert!(matches!(
            registry.crawler("esaj", "sp"),
            Err(ScrapeError::InvalidInput(_))
        ));
    }

    #[test]
    fn builtin_covers_the_known_sites() {
        let registry = ScraperRegistry::builtin();
        assert!(registry.scraper("coren", "sp").is_ok());
        assert!(registry.scraper("coren", "rj").is_ok());
        assert!(registry.scraper("esaj", "sp").is_ok());
    }
}
