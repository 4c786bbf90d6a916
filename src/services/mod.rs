//! Service layer for the collector application.
//!
//! This module contains the shared machinery the pipeline runs on:
//! - HTTP fetching through the response cache (`CachingFetcher`)
//! - Serialized event output (`EventSink`)

mod events;
mod fetcher;

pub use events::{EventSink, EventWriter, StdoutWriter};
pub use fetcher::{CachingFetcher, Credentials, FetchOutcome};
