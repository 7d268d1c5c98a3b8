//! Weekly driving-tour planning for a single field worker.
//!
//! Given a pool of customer appointments across Germany, the planner
//! resolves addresses through a tiered geocoder, measures legs through a
//! cached distance oracle, and builds a Monday-Friday schedule under the
//! 10 h/day and 40 h/week limits, with hotel overnights where a return home
//! does not fit and a guaranteed Friday arrival back home.

pub use anyhow::{Error, Result};

pub mod addresses;
pub mod appointments;
pub mod cache_stores;
pub mod distance;
pub mod geo;
pub mod geocoders;
pub mod planner;
pub mod provider;
pub mod report;
pub mod static_tables;
