//! Freshness metadata → `Cache-Control` (stale-while-revalidate).

use crate::store::EntryMeta;

/// TTL assumed for a key that has never been published.
const FALLBACK_TTL_SECS: u64 = 2;

/// `public, max-age=max(ttl,1), stale-while-revalidate=max(stale_ttl-ttl,0)`,
/// both truncated to whole seconds.
pub fn cache_control(ttl_secs: f64, stale_ttl_secs: f64) -> String {
    let ttl = whole_secs(ttl_secs);
    let stale_ttl = whole_secs(stale_ttl_secs);
    let max_age = ttl.max(1);
    let swr = stale_ttl.saturating_sub(ttl);
    format!("public, max-age={max_age}, stale-while-revalidate={swr}")
}

/// Header for a snapshot's metadata. Unpublished keys use a 2s TTL with the
/// default 3× stale TTL.
pub fn cache_control_for(meta: &EntryMeta) -> String {
    let ttl = meta.ttl.unwrap_or(FALLBACK_TTL_SECS as f64);
    let stale_ttl = meta.stale_ttl.unwrap_or(ttl * 3.0);
    cache_control(ttl, stale_ttl)
}

fn whole_secs(secs: f64) -> u64 {
    if secs.is_finite() && secs > 0.0 {
        secs.trunc() as u64
    } else {
        0
    }
}
