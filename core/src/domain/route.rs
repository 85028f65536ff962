//! Route, AttachmentBinding and NetworkGroup — the declarative mapping
//! between public hosts and the containers that serve them.

use serde::{Deserialize, Serialize};

use crate::domain::errors::ConfigError;
use crate::domain::validation::{split_https_prefix, validate_domain, validate_image};

/// A mapping that names how a public host is served.
///
/// `domain` is always the bare host (the `http://` prefix used in the raw
/// config to mark an insecure route is consumed by [`Route::parse`] and
/// reflected in `https`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub domain: String,
    pub image: String,
    pub https: bool,
}

impl Route {
    /// Parse a route from its raw config representation: the key is the
    /// possibly-`http://`-prefixed domain, the value is the image
    /// reference.
    pub fn parse(raw_domain: &str, image: impl Into<String>) -> Result<Self, ConfigError> {
        let image = image.into();
        let (domain, https) = split_https_prefix(raw_domain);
        validate_domain(&domain)?;
        validate_image(&image)?;
        Ok(Route {
            domain,
            image,
            https,
        })
    }

    /// The key this route is stored under in the raw config `[routes]` or
    /// `[external_routes]` table: the bare domain, re-prefixed with
    /// `http://` when insecure.
    pub fn raw_key(&self) -> String {
        if self.https {
            self.domain.clone()
        } else {
            format!("http://{}", self.domain)
        }
    }
}

/// A named set of route domains sharing a container network. Read-only at
/// runtime — declared only in config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkGroup {
    pub name: String,
    pub members: Vec<String>,
}

/// Sidecar images bound to a target, which is either a route domain or a
/// network-group name. Set semantics: duplicate images are rejected, and
/// an empty image list means the binding's key is absent entirely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentBinding {
    pub target: String,
    pub images: Vec<String>,
}

impl AttachmentBinding {
    pub fn new(target: impl Into<String>) -> Self {
        AttachmentBinding {
            target: target.into(),
            images: Vec::new(),
        }
    }

    /// Insert `image`, preserving insertion order and rejecting duplicates.
    pub fn add(&mut self, image: impl Into<String>) -> Result<(), ConfigError> {
        let image = image.into();
        if self.images.iter().any(|i| i == &image) {
            return Err(ConfigError::AttachmentExists {
                target: self.target.clone(),
                image,
            });
        }
        self.images.push(image);
        Ok(())
    }

    /// Remove `image`. Returns whether the binding is now empty (callers
    /// must delete the key entirely in that case per the domain's
    /// "empty list => key absent" invariant).
    pub fn remove(&mut self, image: &str) -> Result<bool, ConfigError> {
        let before = self.images.len();
        self.images.retain(|i| i != image);
        if self.images.len() == before {
            return Err(ConfigError::AttachmentNotFound {
                target: self.target.clone(),
                image: image.to_string(),
            });
        }
        Ok(self.images.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_secure_route() {
        let r = Route::parse("app.example.com", "web:1").unwrap();
        assert_eq!(r.domain, "app.example.com");
        assert_eq!(r.image, "web:1");
        assert!(r.https);
        assert_eq!(r.raw_key(), "app.example.com");
    }

    #[test]
    fn parses_http_prefixed_route() {
        let r = Route::parse("http://legacy.example", "app:1").unwrap();
        assert_eq!(r.domain, "legacy.example");
        assert!(!r.https);
        assert_eq!(r.raw_key(), "http://legacy.example");
    }

    #[test]
    fn rejects_empty_domain_or_image() {
        assert!(matches!(
            Route::parse("", "web:1"),
            Err(ConfigError::RouteDomainEmpty)
        ));
        assert!(matches!(
            Route::parse("app.example.com", ""),
            Err(ConfigError::RouteImageEmpty)
        ));
    }

    #[test]
    fn attachment_binding_set_semantics() {
        let mut b = AttachmentBinding::new("app.example.com");
        b.add("redis:latest").unwrap();
        assert!(b.add("redis:latest").is_err());
        b.add("postgres:18").unwrap();

        let emptied = b.remove("redis:latest").unwrap();
        assert!(!emptied);
        let emptied = b.remove("postgres:18").unwrap();
        assert!(emptied);

        assert!(b.remove("missing").is_err());
    }
}
