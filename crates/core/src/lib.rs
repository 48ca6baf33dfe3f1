//! Core business logic for souk-rs.

pub mod services;

pub use services::*;
