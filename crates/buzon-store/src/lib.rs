//! Buzón Store
//!
//! Durable state for the case desk: sequence counters, submitter identities,
//! case rows with their cached status, the hash-chained history ledger and
//! attachment blobs.
//!
//! # Backends
//!
//! - [`InMemoryStore`]: `DashMap` shards, per-key atomicity
//! - [`SqliteStore`]: one `SQLite` connection per instance; several instances
//!   may share a file
//! - [`MemoryBlobStore`] / [`FsBlobStore`]: attachment content
//!
//! Components depend on the traits in [`spi`], never on a backend.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod blob;
mod error;
mod memory;
mod model;
pub mod spi;
mod sqlite;

// Re-exports
pub use blob::{FsBlobStore, MemoryBlobStore};
pub use error::{StoreError, StoreResult};
pub use memory::InMemoryStore;
pub use model::{
    now, truncate_micros, BlobRef, CaseFilter, CaseRecord, CounterKey, HistoryDraft, HistoryRecord,
    NewCase, SubmitterProfile, SubmitterRecord, GENESIS_HASH,
};
pub use spi::{BlobStore, CaseRepository, CounterStore, Datastore, HistoryStore, IdentityStore};
pub use sqlite::{SqliteStore, DEFAULT_BUSY_TIMEOUT};
