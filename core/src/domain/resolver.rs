//! The value types the route resolver caches and hands to the reverse
//! proxy. Resolution logic itself (which container, which port, which
//! network) lives in [`infrastructure::resolver`]; this module only fixes
//! the shape of a resolved target and its cache entry.

use std::time::Instant;

use serde::Serialize;

/// Where the proxy should forward a request for a given domain. The
/// container-facing hop is always plain HTTP (§4.4) — TLS, where present,
/// is terminated at the public edge, out of scope for this crate (§1).
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedTarget {
    pub container_name: String,
    pub ip_address: String,
    pub port: u16,
}

impl ResolvedTarget {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.ip_address, self.port)
    }
}

/// A cache entry paired with when it was resolved, so the resolver can
/// apply a soft TTL on top of event-driven invalidation (belt-and-braces
/// against a missed event).
#[derive(Debug, Clone)]
pub struct CachedTarget {
    pub target: ResolvedTarget,
    pub resolved_at: Instant,
}

impl CachedTarget {
    pub fn new(target: ResolvedTarget) -> Self {
        CachedTarget {
            target,
            resolved_at: Instant::now(),
        }
    }

    pub fn is_stale(&self, ttl: std::time::Duration) -> bool {
        self.resolved_at.elapsed() > ttl
    }
}
