//! Error catalog and definitions for Pumuki hotspot ingestion
//!
//! Every user-facing failure carries a stable `PMK-Exxx` code with a message
//! and remediation steps. See [`catalog`] for the code ranges.

pub mod catalog;

pub use catalog::{ErrorCategory, ErrorCode, ErrorEntry};
