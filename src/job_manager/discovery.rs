//! URL discovery pipeline (§4.4 step 5).

use crate::cache::TtlCache;
use crate::fetcher::sitemap::{self, ParsedSitemap};
use crate::fetcher::Fetcher;
use crate::models::SourceType;
use crate::task_queue::priority::{ROOT_PRIORITY, SEED_PRIORITY};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, warn};

const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(15);
const MAX_SITEMAP_FETCHES: usize = 50;

/// Shared by the Job Manager so repeated job creation for the same domain
/// within a short window doesn't re-fetch `robots.txt` every time.
pub type RobotsCache = TtlCache<String, String>;

/// Default freshness window for cached `robots.txt` bodies.
pub const ROBOTS_CACHE_TTL: Duration = Duration::from_secs(10 * 60);

pub struct DiscoveredUrl {
    pub path: String,
    pub priority: f64,
    pub source_type: SourceType,
}

pub struct DiscoveryOptions<'a> {
    pub domain: &'a str,
    pub use_sitemap: bool,
    pub manual_urls: &'a [String],
    pub include_paths: &'a [String],
    pub exclude_paths: &'a [String],
    pub max_pages: i32,
}

/// Run the discovery pipeline described in §4.4 step 5: sitemap first (with
/// index recursion), a single fallback root task if that yields nothing,
/// or a manual list when sitemaps are disabled.
pub async fn discover(
    fetcher: &dyn Fetcher,
    robots_cache: &RobotsCache,
    options: &DiscoveryOptions<'_>,
) -> Vec<DiscoveredUrl> {
    if !options.use_sitemap {
        return options
            .manual_urls
            .iter()
            .filter(|url| passes_filters(url, options.include_paths, options.exclude_paths))
            .map(|url| DiscoveredUrl {
                path: path_of(url),
                priority: SEED_PRIORITY,
                source_type: SourceType::Manual,
            })
            .collect();
    }

    let urls = discover_via_sitemap(fetcher, robots_cache, options).await;
    if !urls.is_empty() {
        return urls;
    }

    debug!(domain = options.domain, "sitemap discovery yielded no URLs, falling back to root");
    vec![DiscoveredUrl {
        path: "/".to_string(),
        priority: ROOT_PRIORITY,
        source_type: SourceType::Fallback,
    }]
}

/// Fetch `robots.txt` for `domain`, through `robots_cache`. Shared by sitemap
/// discovery and the worker's per-task Disallow/Crawl-delay check so both
/// sides of the pipeline see the same cached body (§4.4 step 5, §4.2 Skip).
pub async fn fetch_robots(fetcher: &dyn Fetcher, robots_cache: &RobotsCache, domain: &str) -> Option<String> {
    let robots_key = format!("https://{domain}/robots.txt");
    match robots_cache.get(&robots_key) {
        Some(cached) => Some((*cached).clone()),
        None => match fetcher.fetch_text(&robots_key, DISCOVERY_TIMEOUT).await {
            Ok(Some(body)) => {
                robots_cache.insert(robots_key, body.clone());
                Some(body)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(domain, error = %e, "failed to fetch robots.txt");
                None
            }
        },
    }
}

async fn discover_via_sitemap(
    fetcher: &dyn Fetcher,
    robots_cache: &RobotsCache,
    options: &DiscoveryOptions<'_>,
) -> Vec<DiscoveredUrl> {
    let origin = format!("https://{}", options.domain);
    let mut candidates = sitemap::standard_locations(&origin);

    let robots = fetch_robots(fetcher, robots_cache, options.domain).await;
    if let Some(robots) = &robots {
        candidates.extend(sitemap::sitemaps_from_robots_txt(robots));
    }
    let disallowed = robots.as_deref().map(sitemap::disallowed_from_robots_txt).unwrap_or_default();

    let mut seen_sitemaps = HashSet::new();
    let mut to_fetch: Vec<String> = candidates;
    let mut discovered_urls = Vec::new();
    let mut seen_paths = HashSet::new();
    let mut fetched = 0;

    while let Some(sitemap_url) = to_fetch.pop() {
        if !seen_sitemaps.insert(sitemap_url.clone()) || fetched >= MAX_SITEMAP_FETCHES {
            continue;
        }
        fetched += 1;

        let body = match fetcher.fetch_text(&sitemap_url, DISCOVERY_TIMEOUT).await {
            Ok(Some(body)) => body,
            Ok(None) => continue,
            Err(e) => {
                warn!(sitemap_url, error = %e, "failed to fetch sitemap");
                continue;
            }
        };

        match sitemap::parse(&body) {
            ParsedSitemap::Index(more) => to_fetch.extend(more),
            ParsedSitemap::Urls(urls) => {
                for url in urls {
                    if !passes_filters(&url, options.include_paths, options.exclude_paths) {
                        continue;
                    }
                    if is_disallowed(&url, &disallowed) {
                        continue;
                    }
                    let path = path_of(&url);
                    if !seen_paths.insert(path.clone()) {
                        continue;
                    }
                    let priority = if path == "/" { ROOT_PRIORITY } else { SEED_PRIORITY };
                    discovered_urls.push(DiscoveredUrl {
                        path,
                        priority,
                        source_type: SourceType::Sitemap,
                    });
                    if options.max_pages > 0 && discovered_urls.len() >= options.max_pages as usize {
                        return discovered_urls;
                    }
                }
            }
        }
    }

    discovered_urls
}

fn path_of(url: &str) -> String {
    url::Url::parse(url)
        .map(|u| {
            let path = u.path();
            if path.is_empty() {
                "/".to_string()
            } else {
                path.to_string()
            }
        })
        .unwrap_or_else(|_| url.to_string())
}

pub(crate) fn passes_filters(url: &str, include: &[String], exclude: &[String]) -> bool {
    let path = path_of(url);
    if exclude.iter().any(|pattern| path.starts_with(pattern.as_str())) {
        return false;
    }
    include.is_empty() || include.iter().any(|pattern| path.starts_with(pattern.as_str()))
}

/// True if `path` (or full `url`) falls under a `robots.txt` Disallow prefix.
pub(crate) fn is_disallowed(url: &str, disallowed: &[String]) -> bool {
    let path = path_of(url);
    disallowed.iter().any(|prefix| path.starts_with(prefix.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exclude_pattern_rejects_matching_path() {
        assert!(!passes_filters(
            "https://example.com/admin/panel",
            &[],
            &["/admin".to_string()]
        ));
    }

    #[test]
    fn include_pattern_requires_match() {
        assert!(!passes_filters(
            "https://example.com/blog/post",
            &["/docs".to_string()],
            &[]
        ));
        assert!(passes_filters(
            "https://example.com/docs/intro",
            &["/docs".to_string()],
            &[]
        ));
    }
}
