// src/models/mod.rs

//! Domain models for the collector application.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod endpoint;
mod event;
mod identifier;

// Re-export all public types
pub use config::{
    Config, CredentialsConfig, FetcherConfig, LoggingConfig, PollerConfig, ProbeConfig,
};
pub use endpoint::{Endpoint, FIELD_ID, FIELD_SINCE, Registry, since_field};
pub use event::{EventStatus, OutputEvent};
pub use identifier::{ContentId, ID_LENGTH};
