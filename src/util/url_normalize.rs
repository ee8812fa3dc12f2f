//! URL normalisation helpers (§10.6): lowercase host, strip default ports,
//! strip fragments, collapse duplicate slashes, ensure a leading-slash path
//! — matching how `Page.path` is defined in §3 (a domain-relative path, not
//! a full URL).

/// Normalise a path the way `Page.path` expects it: leading slash, no
/// trailing fragment, no repeated slashes, empty path becomes `/`.
pub fn normalize_path(path: &str) -> String {
    let without_fragment = path.split('#').next().unwrap_or("");
    let collapsed = collapse_slashes(without_fragment);
    if collapsed.is_empty() {
        "/".to_string()
    } else if collapsed.starts_with('/') {
        collapsed
    } else {
        format!("/{collapsed}")
    }
}

fn collapse_slashes(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut last_was_slash = false;
    for ch in path.chars() {
        if ch == '/' {
            if last_was_slash {
                continue;
            }
            last_was_slash = true;
        } else {
            last_was_slash = false;
        }
        out.push(ch);
    }
    out
}

/// Normalise a host the way `Domain.name` expects it: lowercase, no
/// `www.` prefix, no default port (`:80`/`:443`).
pub fn normalize_host(host: &str) -> String {
    let lower = host.to_lowercase();
    let without_port = strip_default_port(&lower);
    without_port.strip_prefix("www.").unwrap_or(&without_port).to_string()
}

fn strip_default_port(host: &str) -> &str {
    host.strip_suffix(":80").or_else(|| host.strip_suffix(":443")).unwrap_or(host)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_repeated_slashes() {
        assert_eq!(normalize_path("//a//b///c"), "/a/b/c");
    }

    #[test]
    fn drops_fragment() {
        assert_eq!(normalize_path("/docs/intro#section-2"), "/docs/intro");
    }

    #[test]
    fn empty_path_becomes_root() {
        assert_eq!(normalize_path(""), "/");
    }

    #[test]
    fn adds_missing_leading_slash() {
        assert_eq!(normalize_path("docs/intro"), "/docs/intro");
    }

    #[test]
    fn host_lowercased_and_www_stripped() {
        assert_eq!(normalize_host("WWW.Example.COM:443"), "example.com");
    }
}
