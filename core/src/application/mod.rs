//! The application layer: composes domain and infrastructure pieces into
//! the service bundle the presentation layer serves.

pub mod admin_service;

pub use admin_service::GordonServices;
