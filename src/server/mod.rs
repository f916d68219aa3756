//! HTTP server for Heirloom

pub mod http;

pub use http::{dispatch, run, AppState};
