//! Domain validation (§4.4 step 1).
//!
//! The pack carries no public-suffix-list crate, so this is a manual
//! syntax check plus a small reject-list rather than a real ICANN PSL
//! lookup: reject `localhost`, bare TLDs (no dot), empty labels, and
//! anything that doesn't parse as a host via `url`.

use crate::error::{EngineError, Result};
use std::net::IpAddr;
use std::str::FromStr;

const REJECTED_HOSTS: &[&str] = &["localhost", "localhost.localdomain", "invalid"];

/// Normalise and validate a user-supplied domain: lowercased, no scheme,
/// no `www.` prefix (§3 Domain.name shape).
pub fn validate_and_normalize(input: &str) -> Result<String> {
    let candidate = input.trim().to_lowercase();
    if candidate.is_empty() {
        return Err(EngineError::InvalidInput("domain is empty".into()));
    }

    // Accept bare hostnames by parsing them as if they had a scheme, since
    // `url::Url::parse` requires one.
    let with_scheme = if candidate.contains("://") {
        candidate.clone()
    } else {
        format!("https://{candidate}")
    };

    let parsed = url::Url::parse(&with_scheme)
        .map_err(|e| EngineError::InvalidInput(format!("invalid domain {input:?}: {e}")))?;

    let host = parsed
        .host_str()
        .ok_or_else(|| EngineError::InvalidInput(format!("invalid domain {input:?}: no host")))?;

    let host = host.strip_prefix("www.").unwrap_or(host);

    if REJECTED_HOSTS.contains(&host) {
        return Err(EngineError::PolicyReject(format!("{host} is not a valid crawl target")));
    }

    let unbracketed = host.strip_prefix('[').and_then(|h| h.strip_suffix(']')).unwrap_or(host);
    if IpAddr::from_str(unbracketed).is_ok() {
        return Err(EngineError::PolicyReject(format!("{host} is an IP literal, not a domain")));
    }

    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() < 2 || labels.iter().any(|label| label.is_empty()) {
        return Err(EngineError::InvalidInput(format!(
            "{host} is not a fully qualified domain"
        )));
    }

    Ok(host.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_bare_hostname() {
        assert_eq!(validate_and_normalize("Example.com").unwrap(), "example.com");
    }

    #[test]
    fn strips_www_and_scheme() {
        assert_eq!(
            validate_and_normalize("https://www.example.com/path").unwrap(),
            "example.com"
        );
    }

    #[test]
    fn rejects_localhost() {
        assert!(validate_and_normalize("localhost").is_err());
    }

    #[test]
    fn rejects_bare_tld() {
        assert!(validate_and_normalize("com").is_err());
    }

    #[test]
    fn rejects_ipv4_literal() {
        assert!(validate_and_normalize("127.0.0.1").is_err());
    }

    #[test]
    fn rejects_ipv6_literal() {
        assert!(validate_and_normalize("http://[::1]/").is_err());
    }

    #[test]
    fn rejects_empty() {
        assert!(validate_and_normalize("   ").is_err());
    }
}
