//! sal-inventory: application inventory ingestion and reporting
//!
//! Agents submit compressed plist snapshots of installed applications;
//! readers browse and export them scoped by business unit, machine group
//! or machine.

pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod models;
pub mod present;
pub mod query;
pub mod scope;
pub mod server;
pub mod submit;

pub use error::{Error, Result};
