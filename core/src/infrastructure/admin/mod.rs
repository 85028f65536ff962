//! The admin plane: HTTP surface plus the token issuance/verification it
//! depends on.

pub mod auth;
pub mod server;
