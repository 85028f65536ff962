//! Bearer-token shapes for the admin plane (§4.5). Tokens are signed JWTs
//! carrying a subject and a scope set; [`infrastructure::admin::auth`]
//! owns issuance and verification, this module only fixes the claims
//! shape and the scope grammar.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// Full administrative access: deploy, config, secrets, remotes.
    Admin,
    /// Deploy and inspect containers, but not manage secrets or config.
    Deploy,
    /// Read-only: list routes, read status, stream logs.
    ReadOnly,
}

impl Scope {
    pub fn satisfies(&self, required: Scope) -> bool {
        match (self, required) {
            (Scope::Admin, _) => true,
            (Scope::Deploy, Scope::Deploy) | (Scope::Deploy, Scope::ReadOnly) => true,
            (Scope::ReadOnly, Scope::ReadOnly) => true,
            _ => false,
        }
    }
}

/// The JWT claims issued by `/auth/password` and verified on every admin
/// request (§4.5). `exp` is a Unix timestamp, per standard JWT convention,
/// so the `jsonwebtoken` crate's built-in expiry check applies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub scopes: Vec<Scope>,
    pub exp: i64,
}

impl Claims {
    pub fn has_scope(&self, required: Scope) -> bool {
        self.scopes.iter().any(|s| s.satisfies(required))
    }
}

/// An opaque bearer token as handed to and from the admin client. Never
/// logged or included in `Debug` output beyond a redacted suffix.
#[derive(Clone, Serialize, Deserialize)]
pub struct Token(pub String);

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tail = self.0.len().saturating_sub(4);
        write!(f, "Token(***{})", &self.0[tail..])
    }
}

impl Token {
    pub fn bearer_header(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_satisfies_everything() {
        assert!(Scope::Admin.satisfies(Scope::ReadOnly));
        assert!(Scope::Admin.satisfies(Scope::Deploy));
        assert!(Scope::Admin.satisfies(Scope::Admin));
    }

    #[test]
    fn deploy_satisfies_deploy_and_readonly_only() {
        assert!(Scope::Deploy.satisfies(Scope::Deploy));
        assert!(Scope::Deploy.satisfies(Scope::ReadOnly));
        assert!(!Scope::Deploy.satisfies(Scope::Admin));
    }

    #[test]
    fn readonly_satisfies_only_readonly() {
        assert!(Scope::ReadOnly.satisfies(Scope::ReadOnly));
        assert!(!Scope::ReadOnly.satisfies(Scope::Deploy));
    }

    #[test]
    fn token_debug_redacts() {
        let t = Token("abcdefgh12345".into());
        let dbg = format!("{t:?}");
        assert!(dbg.contains("***2345"));
        assert!(!dbg.contains("abcdefgh"));
    }
}
