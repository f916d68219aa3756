//! Database layer for Heirloom
//!
//! MongoDB client wrapper and document schemas.

pub mod mongo;
pub mod schemas;

pub use mongo::{MongoClient, MongoCollection};
