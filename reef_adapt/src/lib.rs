//! Reef Adaptation Library
//!
//! The slow half of the controller: everything that learns, remembers and
//! hands back gains. Runs on its own thread at human timescales (seconds to
//! minutes) and communicates with the control loop only through the bounded
//! sample channel and the lock-free gain cell, so nothing here can stall a
//! control tick.
//!
//! # Module Structure
//!
//! - [`store`] - Key/value persistence trait with memory and file backends
//! - [`table`] - Context-keyed gain lookup table with confidence tracking
//! - [`adapter`] - Confidence-weighted gain blending against the table
//! - [`persist`] - Table and calibration round-trips through a store
//! - [`history`] - Bounded sample history with CSV export
//! - [`worker`] - The adaptation thread: ingest, learn, publish, persist

pub mod adapter;
pub mod history;
pub mod persist;
pub mod store;
pub mod table;
pub mod worker;

pub use adapter::GainAdapter;
pub use history::SampleHistory;
pub use store::{FileStore, KvStore, MemoryStore, StoreError, StoreResult};
pub use table::{GainTable, LookupEntry};
pub use worker::{WorkerHandle, WorkerSummary, spawn_worker};
