//! Destination implementations.

mod internal_api;

pub use internal_api::{InternalApiConfig, InternalApiDestination};
