//! COREN-SP registration lookup.

use async_trait::async_trait;
use std::collections::HashMap;
use tracing::info;

use crate::error::{ScrapeError, ScrapeResult};
use crate::fetch::{fetch_page, FETCH_TIMEOUT};
use crate::registry::PageScraper;

const DEFAULT_URL: &str = "http://portal.coren-sp.gov.br/consulta-de-inscritos/";

fn registration_number(informations: &HashMap<String, String>) -> ScrapeResult<&str> {
    informations
        .get("registrationNumber")
        .map(String::as_str)
        .ok_or_else(|| {
            ScrapeError::InvalidInput(
                "scraper requires the registrationNumber information".to_string(),
            )
        })
}

fn consultation_url(base: &str, registration_number: &str) -> String {
    format!("{base}?tipo_pesquisa=inscricao&texto_pesquisa={registration_number}")
}

/// Looks a nursing registration up on the COREN-SP portal.
pub struct CorenSp {
    url: String,
}

impl CorenSp {
    pub fn new() -> Self {
        Self::with_url(DEFAULT_URL)
    }

    pub fn with_url(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl Default for CorenSp {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PageScraper for CorenSp {
    async fn scrape(&self, informations: &HashMap<String, String>) -> ScrapeResult<String> {
        let registration = registration_number(informations)?;
        info!(registration, "starting coren-sp scraper");
        fetch_page(&consultation_url(&self.url, registration), FETCH_TIMEOUT).await
    }
}

/// Crawl entry point for the same consultation. Lives in the crawler
/// table, not the scraper table, so batch jobs cannot resolve it by
/// accident.
pub struct CorenSpCrawler {
    url: String,
}

impl CorenSpCrawler {
    pub fn new() -> Self {
        Self::with_url(DEFAULT_URL)
    }

    pub fn with_url(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl Default for CorenSpCrawler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PageScraper for CorenSpCrawler {
    async fn scrape(&self, informations: &HashMap<String, String>) -> ScrapeResult<String> {
        let registration = informations
            .get("registrationNumber")
            .map(String::as_str)
            .ok_or_else(|| {
                ScrapeError::InvalidInput(
                    "crawler requires the registrationNumber information".to_string(),
                )
            })?;
        info!(registration, "starting coren-sp crawler");
        fetch_page(&consultation_url(&self.url, registration), FETCH_TIMEOUT).await
    }
}
