//! Pipeline entry points for collector operations.
//!
//! - `Poller`: cyclically diff notification endpoints for new identifiers
//! - `Probe`: verify one identifier's retrievability with randomized backoff
//! - `StdinSource`: ingest identifiers from standard input

pub mod poll;
pub mod probe;
pub mod snapshot;
pub mod stdin;

pub use poll::Poller;
pub use probe::{Backoff, BackoffParams, Probe, ProbeKind, spawn_article_probes, spawn_feed_probes};
pub use snapshot::SnapshotStore;
pub use stdin::StdinSource;
