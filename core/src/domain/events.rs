//! The event taxonomy published on the internal event bus (§4.1). The
//! resolver subscribes to invalidate its cache; the admin service's log
//! streaming endpoints subscribe to relay activity to connected clients.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GordonEvent {
    ConfigReload,
    RouteAdded { domain: String, image: String },
    RouteUpdated { domain: String, image: String },
    RouteRemoved { domain: String },
    ContainerStarted { name: String },
    ContainerStopped { name: String },
}

impl GordonEvent {
    /// The domain this event invalidates in the resolver's cache, if any.
    /// `ConfigReload` has no single domain — callers should treat it as a
    /// full-cache invalidation.
    pub fn affected_domain(&self) -> Option<&str> {
        match self {
            GordonEvent::RouteAdded { domain, .. }
            | GordonEvent::RouteUpdated { domain, .. }
            | GordonEvent::RouteRemoved { domain } => Some(domain),
            GordonEvent::ConfigReload
            | GordonEvent::ContainerStarted { .. }
            | GordonEvent::ContainerStopped { .. } => None,
        }
    }
}
