//! quotecache library
//!
//! This module exposes the cache store, quote providers and fetch orchestrator
//! for use by the binary and in integration tests.

pub mod cache;
pub mod cli;
pub mod config;
pub mod data;
pub mod fetch;
pub mod report;
