//! Plain HTTP/1.1 page fetch used by the built-in site scrapers.

use std::time::Duration;
use http_body_util::BodyExt;
use tracing::debug;

use crate::error::{ScrapeError, ScrapeResult};

/// Generous by scraping standards; the consultation portals are slow.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// GET `url` and return the response body as text.
///
/// Speaks plain HTTP over a raw TCP connection. TLS fronting belongs
/// to a vendor-grade fetcher behind the same signature.
pub async fn fetch_page(url: &str, timeout: Duration) -> ScrapeResult<String> {
    let uri: http::Uri = url
        .parse()
        .map_err(|e| ScrapeError::InvalidInput(format!("bad url {url}: {e}")))?;
    if uri.scheme_str() == Some("https") {
        return Err(ScrapeError::Fetch(format!(
            "https is not supported by the built-in fetcher: {url}"
        )));
    }
    let host = uri
        .host()
        .ok_or_else(|| ScrapeError::InvalidInput(format!("url has no host: {url}")))?
        .to_string();
    let port = uri.port_u16().unwrap_or(80);
    let address = format!("{host}:{port}");

    let result = tokio::time::timeout(timeout, async {
        let stream = tokio::net::TcpStream::connect(&address)
            .await
            .map_err(|e| ScrapeError::Fetch(format!("connect {address}: {e}")))?;

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| ScrapeError::Fetch(format!("handshake {address}: {e}")))?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let path_and_query = uri
            .path_and_query()
            .map(|p| p.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());
        let request = http::Request::builder()
            .method("GET")
            .uri(&path_and_query)
            .header("host", &host)
            .header("user-agent", "trawler/0.1")
            .body(http_body_util::Empty::<bytes::Bytes>::new())
            .map_err(|e| ScrapeError::Fetch(format!("build request: {e}")))?;

        let response = sender
            .send_request(request)
            .await
            .map_err(|e| ScrapeError::Fetch(format!("request {url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScrapeError::Fetch(format!("{url} answered {status}")));
        }

        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| ScrapeError::Fetch(format!("read body {url}: {e}")))?
            .to_bytes();
        debug!(%url, bytes = body.len(), "page fetched");
        Ok(String::from_utf8_lossy(&body).into_owned())
    })
    .await;

    match result {
        Ok(outcome) => outcome,
        Err(_) => Err(ScrapeError::Fetch(format!("{url} timed out"))),
    }
}
