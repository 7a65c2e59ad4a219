//! Shared types for Pumuki hotspot ingestion.
//!
//! This crate holds everything both the ingestion client and the collection
//! backend need to agree on: the versioned payload contract and its canonical
//! hashing, idempotency keys, the credential policy, the error catalog, and
//! configuration/logging plumbing.

#![forbid(unsafe_code)]

pub mod auth;
pub mod canonical;
pub mod config;
pub mod contract;
pub mod errors;
pub mod idempotency;
pub mod logging;
pub mod report;
pub mod testing;

pub use auth::{AuthPolicy, AuthPolicyViolation, AuthScheme, Credentials};
pub use config::{ConfigSource, EnvError, EnvParser, Sourced};
pub use contract::{
    ContractArtifact, ContractError, ContractVersion, IngestionPayload, ParsedContract,
    PayloadBuilder, SourceMode,
};
pub use errors::{ErrorCategory, ErrorCode, ErrorEntry};
pub use idempotency::{idempotency_key, resolve_idempotency_key};
pub use logging::{LogConfig, LogFormat, LoggingGuards, init_logging};
pub use report::{LocalHotspotsReport, TddBddSnapshot, TddBddStatus};
