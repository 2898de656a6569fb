//! # partid common library
//!
//! Shared code for the partid crates:
//! - Error type
//! - Bootstrap configuration (TOML + environment)
//! - Event bus for live record notifications
//! - Database bootstrap

pub mod config;
pub mod db;
pub mod error;
pub mod events;

pub use error::{Error, Result};
