//! `gordon_cli` — the library half of the `gordon` binary: daemon
//! lifecycle management, the admin HTTP client, remote bookkeeping and
//! the subcommand handlers the binary's `main.rs` dispatches into. Split
//! out so integration tests can exercise CLI logic without going through
//! `clap`'s process-level argument parsing.

pub mod commands;
pub mod daemon;
pub mod logging;
pub mod remotes;
pub mod target;
