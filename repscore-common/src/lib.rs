//! # Repscore Common Library
//!
//! Core of the profile reputation score service:
//! - Score records and their SQLite store
//! - Freshness policy and recomputation orchestrator
//! - Read-path cache and lookup service
//! - Time-boxed maintenance jobs (staleness refresh, duplicate cleanup)
//! - Report aggregation
//! - Configuration loading

pub mod cache;
pub mod calculator;
pub mod config;
pub mod db;
pub mod error;
pub mod fetch;
pub mod freshness;
pub mod identity;
pub mod jobs;
pub mod orchestrator;
pub mod queue;
pub mod reports;
pub mod service;
pub mod store;
pub mod time;

pub use error::{Error, Result};
pub use identity::Identity;
