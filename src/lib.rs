//! Segmented write-ahead log for a raft replica.
//!
//! Entries and the replica's hard voting state are framed with per-record
//! checksums and appended to fixed-bounded segment files. After a crash,
//! [`wal::LogManager::recover`] rebuilds an in-memory [`wal::MemStore`] from
//! whatever reached disk, discarding at most a torn record at the tail of the
//! last segment.

pub mod config;
pub mod replog;
pub mod wal;
