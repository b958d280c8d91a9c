//! Workload placement ledger service library.
//!
//! This crate primarily ships a `placement-api` binary, but we expose the
//! router, store and service so integration tests can drive them directly.

pub mod api;
pub mod config;
pub mod db;
pub mod service;
pub mod state;
