//! # Dirwatch Core
//!
//! Incremental directory census engine. One worker monitors one directory
//! tree for whole-word occurrences of a configurable search token, seeds a
//! per-file occurrence cache with a full recursive scan, then keeps the
//! running total consistent by reconciling add/change/delete events from a
//! filesystem watch, without ever re-walking the whole tree.
//!
//! ## Architecture
//!
//! - [`scan`]: recursive enumeration of eligible files and whole-word
//!   occurrence counting
//! - [`census`]: the occurrence cache and its reconciliation rules
//! - [`watch`]: notify-based change event pipeline
//! - [`worker`]: the scan/monitor state machine and the control-channel
//!   protocol
//! - [`supervisor`]: worker lifecycle, crash recovery, and result forwarding
//! - [`store`]: persistence port implemented by the server crate
//!
//! The worker and supervisor share nothing but ordered message channels; the
//! cache has exactly one mutator at any instant.

pub mod census;
pub mod config;
pub mod error;
pub mod result;
pub mod scan;
pub mod store;
pub mod supervisor;
pub mod watch;
pub mod worker;

pub use census::{CensusCache, FileEvent};
pub use config::MonitorConfig;
pub use error::{CensusError, Result};
pub use result::{ScanResult, ScanStatus};
pub use scan::DirectoryScanner;
pub use scan::reader::OccurrenceReader;
pub use store::ResultStore;
pub use supervisor::{Supervisor, TaskOutcome, WorkerStatus};
pub use watch::DirectoryWatcher;
pub use worker::protocol::{WorkerCommand, WorkerReport};
pub use worker::{CensusWorker, WorkerState};
