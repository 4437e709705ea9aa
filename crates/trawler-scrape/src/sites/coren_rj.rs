//! COREN-RJ registration lookup.

use async_trait::async_trait;
use std::collections::HashMap;
use tracing::info;

use crate::error::{ScrapeError, ScrapeResult};
use crate::fetch::{fetch_page, FETCH_TIMEOUT};
use crate::registry::PageScraper;

// the Controller endpoint multiplexes every page behind query params
const DEFAULT_URL: &str = "http://servicos.coren-rj.org.br/appcorenrj/incorpnet.dll/Controller";

pub struct CorenRj {
    url: String,
}

impl CorenRj {
    pub fn new() -> Self {
        Self::with_url(DEFAULT_URL)
    }

    pub fn with_url(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl Default for CorenRj {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PageScraper for CorenRj {
    async fn scrape(&self, informations: &HashMap<String, String>) -> ScrapeResult<String> {
        let registration = informations
            .get("registrationNumber")
            .map(String::as_str)
            .ok_or_else(|| {
                ScrapeError::InvalidInput(
                    "scraper requires the registrationNumber information".to_string(),
                )
            })?;
        info!(registration, "starting coren-rj scraper");
        let url = format!(
            "{}?pagina=pub_mvcLogin.htm&conselho=corenrj&EDT_NumeroInscricao={}&BTN_Consultar=Consultar",
            self.url, registration
        );
        fetch_page(&url, FETCH_TIMEOUT).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_registration_number_is_invalid_input() {
        let scraper = CorenRj::new();
        let mut informations = HashMap::new();
        informations.insert("cpf".to_string(), "12345678900".to_string());

        let result = scraper.scrape(&informations).await;
        assert!(matches!(result, Err(ScrapeError::InvalidInput(_))));
    }
}
