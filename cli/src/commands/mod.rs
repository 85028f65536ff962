//! CLI subcommand groups. Each module owns one `clap::Subcommand` enum and
//! a `handle_command` entry point that takes the already-resolved
//! [`AdminClient`](crate::daemon::client::AdminClient) and never touches
//! target resolution itself.

pub mod attachment;
pub mod auth;
pub mod daemon;
pub mod deploy;
pub mod logs;
pub mod remote;
pub mod route;
pub mod secret;
pub mod status;
