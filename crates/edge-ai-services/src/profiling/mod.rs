//! Resource profiling: sample capture, running aggregation and the
//! per-service JSON ledger (`service_data.json`).
//!
//! Flow:
//! - the service wraps each `/profile_run` inference in [`Profiler::profile`]
//!   and returns the resulting [`ProfileSample`]
//! - a client session feeds every response into a [`ProfileAccumulator`]
//! - the finalized [`LedgerEntry`] is upserted into the ledger through
//!   [`LedgerStore::update`]
pub mod sample;
pub mod accumulator;
pub mod ledger;
pub mod ledger_store;
pub mod profiler;

pub use sample::{ProfileSample, ProfileEnvelope, ProfiledResponse};
pub use accumulator::{ProfileAccumulator, RunningAggregate};
pub use ledger::{upsert, EntryKind, LedgerEntry, NodeProfile, ResourceProfile, ServiceData, UpsertOutcome, XaiProfile};
pub use ledger_store::LedgerStore;
pub use profiler::Profiler;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProfilingError {
    #[error("no samples recorded")]
    NoSamples,

    #[error("no node id was reported by the service")]
    MissingNodeId,
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger file not found: {0}")]
    Missing(PathBuf),

    #[error("malformed ledger {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("ledger I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("timed out waiting for ledger lock {0}")]
    LockTimeout(PathBuf),

    #[error("node id '{0}' is not present in the ledger")]
    UnknownNode(String),

    #[error("failed to encode ledger: {0}")]
    Encode(#[source] serde_json::Error),
}
