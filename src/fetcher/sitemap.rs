//! Sitemap and sitemap-index parsing (§4.4 step 5).
//!
//! Uses `quick-xml`'s serde integration rather than hand-rolled tag
//! matching: sitemaps are a fixed, well-known schema, so a couple of
//! `#[derive(Deserialize)]` structs cover both the index and leaf forms.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct UrlSet {
    #[serde(rename = "url", default)]
    urls: Vec<UrlEntry>,
}

#[derive(Debug, Deserialize)]
struct UrlEntry {
    loc: String,
}

#[derive(Debug, Deserialize)]
struct SitemapIndex {
    #[serde(rename = "sitemap", default)]
    sitemaps: Vec<SitemapEntry>,
}

#[derive(Debug, Deserialize)]
struct SitemapEntry {
    loc: String,
}

pub enum ParsedSitemap {
    /// Leaf sitemap: concrete page URLs.
    Urls(Vec<String>),
    /// Sitemap index: more sitemaps to fetch and parse recursively.
    Index(Vec<String>),
}

/// Parse either a `<urlset>` or `<sitemapindex>` document. Malformed XML is
/// treated as an empty leaf sitemap rather than a hard failure: discovery
/// falls back to the root path regardless (§4.4 step 5).
pub fn parse(xml: &str) -> ParsedSitemap {
    if let Ok(index) = quick_xml::de::from_str::<SitemapIndex>(xml) {
        if !index.sitemaps.is_empty() {
            return ParsedSitemap::Index(index.sitemaps.into_iter().map(|s| s.loc).collect());
        }
    }

    match quick_xml::de::from_str::<UrlSet>(xml) {
        Ok(urlset) => ParsedSitemap::Urls(urlset.urls.into_iter().map(|u| u.loc).collect()),
        Err(_) => ParsedSitemap::Urls(Vec::new()),
    }
}

/// Extract `Sitemap:` directive values from a `robots.txt` body (§4.4 step 5).
pub fn sitemaps_from_robots_txt(body: &str) -> Vec<String> {
    body.lines()
        .filter_map(|line| {
            let line = line.trim();
            let (directive, value) = line.split_once(':')?;
            if directive.trim().eq_ignore_ascii_case("sitemap") {
                Some(value.trim().to_string())
            } else {
                None
            }
        })
        .collect()
}

/// Extract `Crawl-delay:` directive values from a `robots.txt` body, applying
/// to the wildcard (`User-agent: *`) group only (§3, §4.3).
pub fn crawl_delay_from_robots_txt(body: &str) -> Option<f64> {
    robots_directive_values(body, "crawl-delay")
        .into_iter()
        .find_map(|v| v.parse::<f64>().ok())
}

/// Extract `Disallow:` path prefixes from the wildcard (`User-agent: *`)
/// group of a `robots.txt` body (§4.2 Skip).
pub fn disallowed_from_robots_txt(body: &str) -> Vec<String> {
    robots_directive_values(body, "disallow")
        .into_iter()
        .filter(|v| !v.is_empty())
        .collect()
}

/// Values of `directive:` lines within the wildcard `User-agent: *` group.
/// Groups are separated by `User-agent:` lines; only the first wildcard
/// group is honoured, matching the common-case robots.txt this engine talks
/// to rather than implementing full group-precedence resolution.
fn robots_directive_values(body: &str, directive: &str) -> Vec<String> {
    let mut in_wildcard_group = false;
    let mut values = Vec::new();
    for line in body.lines() {
        let line = line.trim();
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_lowercase();
        let value = value.trim();

        if key == "user-agent" {
            in_wildcard_group = value == "*";
            continue;
        }
        if in_wildcard_group && key == directive {
            values.push(value.to_string());
        }
    }
    values
}

/// Standard locations probed before falling back to `robots.txt` (§4.4 step 5).
pub fn standard_locations(origin: &str) -> Vec<String> {
    vec![
        format!("{origin}/sitemap.xml"),
        format!("{origin}/sitemap_index.xml"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_leaf_urlset() {
        let xml = r#"<?xml version="1.0"?>
            <urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
                <url><loc>https://example.com/</loc></url>
                <url><loc>https://example.com/about</loc></url>
            </urlset>"#;
        match parse(xml) {
            ParsedSitemap::Urls(urls) => assert_eq!(urls.len(), 2),
            ParsedSitemap::Index(_) => panic!("expected leaf urlset"),
        }
    }

    #[test]
    fn parses_sitemap_index() {
        let xml = r#"<?xml version="1.0"?>
            <sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
                <sitemap><loc>https://example.com/sitemap-1.xml</loc></sitemap>
            </sitemapindex>"#;
        match parse(xml) {
            ParsedSitemap::Index(urls) => assert_eq!(urls, vec!["https://example.com/sitemap-1.xml"]),
            ParsedSitemap::Urls(_) => panic!("expected index"),
        }
    }

    #[test]
    fn extracts_sitemap_directive_from_robots_txt() {
        let robots = "User-agent: *\nDisallow: /admin\nSitemap: https://example.com/sitemap.xml\n";
        assert_eq!(
            sitemaps_from_robots_txt(robots),
            vec!["https://example.com/sitemap.xml"]
        );
    }

    #[test]
    fn extracts_disallow_from_wildcard_group() {
        let robots = "User-agent: *\nDisallow: /admin\nDisallow: /private\n";
        assert_eq!(
            disallowed_from_robots_txt(robots),
            vec!["/admin".to_string(), "/private".to_string()]
        );
    }

    #[test]
    fn ignores_disallow_outside_wildcard_group() {
        let robots = "User-agent: Googlebot\nDisallow: /admin\n";
        assert!(disallowed_from_robots_txt(robots).is_empty());
    }

    #[test]
    fn extracts_crawl_delay_from_robots_txt() {
        let robots = "User-agent: *\nCrawl-delay: 2.5\n";
        assert_eq!(crawl_delay_from_robots_txt(robots), Some(2.5));
    }

    #[test]
    fn missing_crawl_delay_is_none() {
        assert_eq!(crawl_delay_from_robots_txt("User-agent: *\nDisallow: /admin\n"), None);
    }
}
