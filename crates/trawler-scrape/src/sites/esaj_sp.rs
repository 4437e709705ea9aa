//! e-SAJ São Paulo case lookup by party document.

use async_trait::async_trait;
use std::collections::HashMap;
use tracing::info;

use crate::error::{ScrapeError, ScrapeResult};
use crate::fetch::{fetch_page, FETCH_TIMEOUT};
use crate::registry::PageScraper;

const DEFAULT_URL: &str = "http://esaj.tjsp.jus.br/cposg/open.do";

pub struct EsajSp {
    url: String,
}

impl EsajSp {
    pub fn new() -> Self {
        Self::with_url(DEFAULT_URL)
    }

    pub fn with_url(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl Default for EsajSp {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PageScraper for EsajSp {
    async fn scrape(&self, informations: &HashMap<String, String>) -> ScrapeResult<String> {
        let cpf = informations.get("cpf").map(String::as_str).ok_or_else(|| {
            ScrapeError::InvalidInput("scraper requires the cpf information".to_string())
        })?;
        info!(cpf, "starting esaj-sp scraper");
        let url = format!("{}?cbPesquisa=DOCPARTE&campo_DOCPARTE={}", self.url, cpf);
        fetch_page(&url, FETCH_TIMEOUT).await
    }
}
