//! Priority model for discovered links (§4.2).
//!
//! Sitemap seeds get a flat default, except the bare root path which is
//! boosted to the maximum. Links discovered from a page step down from the
//! parent's priority by context bucket, clamped into `[0, 1]`.

/// Default priority for a sitemap-discovered seed.
pub const SEED_PRIORITY: f64 = 0.500;
/// Priority assigned to the bare root path.
pub const ROOT_PRIORITY: f64 = 1.0;

const HEADER_START: f64 = 1.000;
const HEADER_END: f64 = 0.991;
const FOOTER_START: f64 = 0.990;
const FOOTER_END: f64 = 0.981;
const BODY_DECAY: f64 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkContext {
    Header,
    Footer,
    Body,
}

/// Priority for the `index`-th link (0-based, in discovery order) of the
/// given context, found on a page with `parent_priority` and `is_homepage`.
///
/// Non-homepages only ever enqueue body links, at `parent * 0.9` regardless
/// of index (§4.2): callers filter header/footer links out before reaching
/// here when `is_homepage` is false.
pub fn step(parent_priority: f64, context: LinkContext, index: usize, is_homepage: bool) -> f64 {
    let priority = match (is_homepage, context) {
        (true, LinkContext::Header) => step_down(HEADER_START, HEADER_END, index),
        (true, LinkContext::Footer) => step_down(FOOTER_START, FOOTER_END, index),
        _ => parent_priority * BODY_DECAY,
    };
    priority.clamp(0.0, 1.0)
}

/// A deterministic decreasing sequence within `[start, end]`, one step per
/// discovery index, asymptotically approaching (never going below) `end`.
/// The first link (`index` 0) is already one step below `start`, since
/// `start` itself is reserved for the parent page's own priority.
fn step_down(start: f64, end: f64, index: usize) -> f64 {
    let step = (start - end) / 10.0;
    (start - step * (index as f64 + 1.0)).max(end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_path_is_maximal() {
        assert_eq!(ROOT_PRIORITY, 1.0);
    }

    #[test]
    fn header_steps_down_within_bucket() {
        let first = step(1.0, LinkContext::Header, 0, true);
        let later = step(1.0, LinkContext::Header, 5, true);
        assert!((first - 0.999).abs() < 1e-9);
        assert!(first > later);
        assert!(later >= HEADER_END);
    }

    #[test]
    fn footer_first_link_matches_spec_value() {
        let first = step(1.0, LinkContext::Footer, 0, true);
        assert!((first - 0.989).abs() < 1e-9);
    }

    #[test]
    fn non_homepage_body_link_decays_from_parent() {
        let p = step(0.8, LinkContext::Body, 0, false);
        assert!((p - 0.72).abs() < 1e-9);
    }

    #[test]
    fn priority_never_leaves_unit_interval() {
        let p = step(1.5, LinkContext::Body, 0, false);
        assert!(p <= 1.0);
    }
}
