//! `reqwest` + `scraper`-backed `Fetcher` implementation (§6).
//!
//! Client construction mirrors the Banner API client's builder (cookie-less
//! here since crawling is anonymous, but the same timeout/user-agent/
//! keepalive discipline): a short connect timeout, a bounded per-request
//! read timeout, and an explicit `User-Agent` rather than reqwest's default.

use super::{FetchError, FetchOptions, FetchResult, Fetcher, Link, LinkContext};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use scraper::{Html, Selector};
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> anyhow::Result<Self> {
        let client = Client::builder()
            .tcp_keepalive(Some(Duration::from_secs(60)))
            .connect_timeout(Duration::from_secs(10))
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        Ok(Self { client })
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new().expect("default reqwest client build")
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, options: &FetchOptions) -> Result<FetchResult, FetchError> {
        let started = Instant::now();

        let response = self
            .client
            .get(url)
            .header("User-Agent", &options.user_agent)
            .timeout(options.timeout)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status_code = response.status().as_u16();
        let redirect_url = if response.url().as_str() != url {
            Some(response.url().as_str().to_string())
        } else {
            None
        };
        let cache_status = response
            .headers()
            .get("cf-cache-status")
            .or_else(|| response.headers().get("x-cache"))
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let is_html = content_type
            .as_deref()
            .is_some_and(|ct| ct.starts_with("text/html"));

        let body = response.text().await.map_err(classify_reqwest_error)?;
        let response_time = started.elapsed();

        let links = if options.extract_links && is_html {
            extract_links(&body, url)
        } else {
            Vec::new()
        };

        debug!(url, status_code, links = links.len(), "fetched page");

        Ok(FetchResult {
            status_code,
            response_time,
            cache_status,
            content_type,
            redirect_url,
            links,
        })
    }

    async fn fetch_text(&self, url: &str, timeout: Duration) -> Result<Option<String>, FetchError> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Ok(None);
        }

        let body = response.text().await.map_err(classify_reqwest_error)?;
        Ok(Some(body))
    }
}

fn classify_reqwest_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Transport(err.to_string())
    }
}

/// Extract same-document anchors, tagging each by the nearest structural
/// ancestor (`header`/`footer`/default `body`, §4.2 priority model).
fn extract_links(body: &str, base_url: &str) -> Vec<Link> {
    let base = match url::Url::parse(base_url) {
        Ok(u) => u,
        Err(_) => return Vec::new(),
    };

    let document = Html::parse_document(body);
    let anchor_selector = Selector::parse("a[href]").expect("static selector");
    let header_selector = Selector::parse("header").expect("static selector");
    let footer_selector = Selector::parse("footer").expect("static selector");

    let in_header: std::collections::HashSet<_> = document
        .select(&header_selector)
        .flat_map(|el| el.descendants().map(|n| n.id()))
        .collect();
    let in_footer: std::collections::HashSet<_> = document
        .select(&footer_selector)
        .flat_map(|el| el.descendants().map(|n| n.id()))
        .collect();

    let mut links = Vec::new();
    for element in document.select(&anchor_selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let Ok(resolved) = base.join(href) else {
            continue;
        };
        if resolved.host_str() != base.host_str() {
            continue;
        }

        let node_id = element.id();
        let context = if in_header.contains(&node_id) {
            LinkContext::Header
        } else if in_footer.contains(&node_id) {
            LinkContext::Footer
        } else {
            LinkContext::Body
        };

        links.push(Link {
            url: resolved.to_string(),
            context,
        });
    }
    links
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_only_same_host_links() {
        let html = r#"
            <html><body>
                <header><a href="/about">About</a></header>
                <a href="/pricing">Pricing</a>
                <a href="https://other.example/x">Other</a>
            </body></html>
        "#;
        let links = extract_links(html, "https://example.com/");
        assert_eq!(links.len(), 2);
        assert!(links.iter().any(|l| l.url == "https://example.com/about"
            && l.context == LinkContext::Header));
        assert!(links
            .iter()
            .any(|l| l.url == "https://example.com/pricing" && l.context == LinkContext::Body));
    }
}
