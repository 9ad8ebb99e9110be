//! pcache - persistent, range-aware read cache
//!
//! Sits between readers and a slow backing filesystem, keeping every byte
//! range it has fetched on local disk so repeated and overlapping reads are
//! served locally, across restarts.

pub mod backing;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod ui;
pub mod view;

pub use error::{PcacheError, PcacheResult};
