//! # NWRA Common Library
//!
//! Shared code for the NWRA local hazard tools including:
//! - Configuration loading and validation
//! - Logging initialisation
//! - Database initialisation for processing state
//! - Timestamp helpers

pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod time;

pub use error::{Error, Result};
