//! The domain layer: types and pure logic with no I/O. Everything here is
//! safe to unit-test without a runtime, a filesystem, or Docker.

pub mod auth;
pub mod errors;
pub mod events;
pub mod resolver;
pub mod route;
pub mod runtime;
pub mod secret;
pub mod validation;
