//! Validators shared by the domain model: the DNS-ish domain grammar used
//! by routes, the environment-variable key grammar used by secrets, and
//! container-name / path checks used by the secret store and deployment
//! orchestrator.

use std::sync::OnceLock;

use regex::Regex;

use crate::domain::errors::{ConfigError, SecretError};

fn env_key_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static regex"))
}

fn container_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]*$").expect("static regex"))
}

/// Strip a leading `http://` (marking an insecure route) and return the
/// bare hostname plus whether the route should be served over HTTPS.
///
/// `domain` as stored in the route table is always the bare host; the
/// `http://` prefix only exists in the raw config value and is consumed
/// here.
pub fn split_https_prefix(raw: &str) -> (String, bool) {
    match raw.strip_prefix("http://") {
        Some(rest) => (rest.to_string(), false),
        None => (raw.to_string(), true),
    }
}

/// Validate a route domain (after any `http://` prefix has been stripped).
///
/// Rejects empty strings, leading/trailing dots, control characters, NUL,
/// and path-traversal tokens. Domains may carry a `/path` suffix and a
/// `:port` suffix per §3, so validation only inspects the host component
/// preceding the first `/`.
pub fn validate_domain(domain: &str) -> Result<(), ConfigError> {
    if domain.is_empty() {
        return Err(ConfigError::RouteDomainEmpty);
    }

    let host = domain.split('/').next().unwrap_or(domain);
    let host = host.split(':').next().unwrap_or(host);

    if host.is_empty() {
        return Err(ConfigError::InvalidDomain(domain.to_string()));
    }
    if host.starts_with('.') || host.ends_with('.') {
        return Err(ConfigError::InvalidDomain(domain.to_string()));
    }
    if domain.contains("..") {
        return Err(ConfigError::InvalidDomain(domain.to_string()));
    }
    if domain.chars().any(|c| c.is_control() || c == '\0') {
        return Err(ConfigError::InvalidDomain(domain.to_string()));
    }

    Ok(())
}

/// Validate an image reference (`name[:tag]`, optionally with a registry
/// prefix). Only emptiness is checked per §3 — the image registry owns
/// deeper validity (tag/digest existence).
pub fn validate_image(image: &str) -> Result<(), ConfigError> {
    if image.is_empty() {
        return Err(ConfigError::RouteImageEmpty);
    }
    Ok(())
}

/// Validate an environment variable key against `[A-Za-z_][A-Za-z0-9_]*`.
pub fn validate_env_key(key: &str) -> Result<(), SecretError> {
    if env_key_re().is_match(key) {
        Ok(())
    } else {
        Err(SecretError::InvalidEnvKey(key.to_string()))
    }
}

/// Validate a container name: must start with an alphanumeric and contain
/// only alphanumerics, `_`, `.` and `-` afterward.
pub fn validate_container_name(name: &str) -> Result<(), ConfigError> {
    if container_name_re().is_match(name) {
        Ok(())
    } else {
        Err(ConfigError::InvalidDomain(format!(
            "invalid container name: {name}"
        )))
    }
}

/// Map a domain (or attachment container name) to a collision-resistant
/// filesystem-safe string: `.` -> `__`, `:` -> `-_`, `/` -> `_`. Used by the
/// file-backed secret store to derive `<sanitized>.env` filenames so a
/// domain containing these characters never produces a path outside the
/// env directory and never collides with a sibling domain after mapping.
pub fn sanitize_owner(owner: &str) -> String {
    owner.replace('.', "__").replace(':', "-_").replace('/', "_")
}

/// The sanitization scheme `sanitize_owner` replaced (plain substitution of
/// `.` -> `_`, with no special-casing of `:` or `/`). Kept only so the file
/// secret store can discover keys written under the old scheme; never used
/// to produce new paths.
pub fn legacy_sanitize_owner(owner: &str) -> String {
    owner.replace(['.', ':', '/'], "_")
}

/// Reject a path component that contains traversal tokens, an absolute
/// prefix, or shell metacharacters. Used before composing any filesystem
/// or external-credential-manager path.
pub fn reject_path_traversal(component: &str) -> Result<(), SecretError> {
    const ALLOWED_EXTRA: &[char] = &['.', '_', '-', '/'];

    if component.contains("..") {
        return Err(SecretError::PathTraversal(component.to_string()));
    }
    if component.starts_with('/') {
        return Err(SecretError::PathTraversal(component.to_string()));
    }
    let has_bad_char = component
        .chars()
        .any(|c| !(c.is_ascii_alphanumeric() || ALLOWED_EXTRA.contains(&c)));
    if has_bad_char {
        return Err(SecretError::PathTraversal(component.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_http_prefix() {
        let (host, https) = split_https_prefix("http://legacy.example");
        assert_eq!(host, "legacy.example");
        assert!(!https);

        let (host, https) = split_https_prefix("app.example.com");
        assert_eq!(host, "app.example.com");
        assert!(https);
    }

    #[test]
    fn rejects_empty_and_dotted_domains() {
        assert!(validate_domain("").is_err());
        assert!(validate_domain(".example.com").is_err());
        assert!(validate_domain("example.com.").is_err());
        assert!(validate_domain("exa..mple.com").is_err());
        assert!(validate_domain("app.example.com").is_ok());
        assert!(validate_domain("app.example.com/path").is_ok());
        assert!(validate_domain("app.example.com:8080").is_ok());
    }

    #[test]
    fn env_key_grammar() {
        assert!(validate_env_key("API_KEY").is_ok());
        assert!(validate_env_key("_secret1").is_ok());
        assert!(validate_env_key("1BAD").is_err());
        assert!(validate_env_key("bad-key").is_err());
    }

    #[test]
    fn path_traversal_rejected() {
        assert!(reject_path_traversal("../etc/passwd").is_err());
        assert!(reject_path_traversal("/etc/passwd").is_err());
        assert!(reject_path_traversal("gordon/env/example_com/API_KEY").is_ok());
        assert!(reject_path_traversal("rm -rf /").is_err());
    }

    #[test]
    fn sanitizes_owner_collision_resistantly() {
        assert_eq!(sanitize_owner("app.example.com"), "app__example__com");
        assert_eq!(sanitize_owner("reg:5000"), "reg-_5000");
        assert_eq!(sanitize_owner("a/b"), "a_b");
        // `app.b` and `app:b` must not collide after sanitization.
        assert_ne!(sanitize_owner("app.b"), sanitize_owner("app:b"));
    }

    #[test]
    fn legacy_scheme_collapses_all_three_separators_to_underscore() {
        assert_eq!(legacy_sanitize_owner("app.example.com"), "app_example_com");
        assert_eq!(legacy_sanitize_owner("reg:5000"), "reg_5000");
    }
}
