//! Heirloom - access gateway for end-of-life plans
//!
//! An owner records their plan and decides who may see which parts of it.
//! Heirloom sits in front of that data and answers three questions:
//!
//! - **Owners**: is this really the owner? (cookie session + provider token)
//! - **Viewers**: which categories may this trusted contact see right now?
//! - **Executors**: has the plan been released, and is this Google account
//!   the executor the owner chose?
//!
//! Release is a one-way switch flipped by the executor with the owner's
//! unlock code. Scheduled letters go out by email once their date arrives
//! and the plan has been released.

pub mod auth;
pub mod config;
pub mod db;
pub mod routes;
pub mod server;
pub mod services;
pub mod store;
pub mod types;

#[cfg(test)]
mod testing;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{HeirloomError, Result};
