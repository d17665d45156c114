//! Integration tests module
//!
//! This module provides end-to-end integration tests for the wavescope service,
//! including:
//! - Complete ingest → derive → store pipeline against both store backends
//! - Error handling, deadlines and retry scenarios

pub mod error_scenarios;
pub mod fixtures;
pub mod pipeline_test;
