//! Shared types for Heirloom

pub mod error;

pub use error::{HeirloomError, Result};
