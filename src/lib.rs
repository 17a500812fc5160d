//! B1BOT: inventory-balancing volume trader for the BigONE exchange
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod exchange;
pub mod strategy;
pub mod engine;
pub mod dashboard;
