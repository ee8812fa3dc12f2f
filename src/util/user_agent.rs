//! Fixed User-Agent identification (§1, §10.6). No UA-sniffing crate is
//! warranted here, so this stays a thin string builder rather than a
//! parsing library.

/// Build the default User-Agent string, configurable via `Config::user_agent`
/// but defaulting to identifying this crate and its version.
pub fn default_user_agent() -> String {
    format!("BlueBandedBee/{} (+https://bluebandedbee.co)", env!("CARGO_PKG_VERSION"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifies_crate_and_version() {
        let ua = default_user_agent();
        assert!(ua.starts_with("BlueBandedBee/"));
        assert!(ua.contains(env!("CARGO_PKG_VERSION")));
    }
}
