//! The presentation layer: the HTTP listeners Gordon exposes, built on
//! top of the application layer's service bundle.

pub mod api;
