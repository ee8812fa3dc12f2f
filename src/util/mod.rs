//! Small peripheral helpers (§10.6) that don't belong to any one engine
//! component: URL normalisation and the fixed User-Agent string.

pub mod url_normalize;
pub mod user_agent;
