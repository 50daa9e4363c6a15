//! Write-ahead log subsystem.
//!
//! Append, recovery, rollover, and compaction over a directory of segment
//! files named `"{seg_id}-{seg_start}.wal"`. One caller owns the log; the
//! mutating surface takes `&mut self` and nothing here spawns background
//! work or batches writes behind the caller's back.

use anyhow::Result;

use crate::replog::{Entry, HardState};

pub mod codec;
mod error;
mod manager;
mod mem_log;
mod segment;
mod writer;

pub use error::WalError;
pub use manager::{append_to_mem_store, CompactionHint, LogManager};
pub use mem_log::{MemStore, MemStoreError};
pub use segment::{parse_segment_file_name, segment_file_name, ReadableSegment};
pub use writer::{LogWriter, SegmentMeta};

#[allow(async_fn_in_trait)]
pub trait WriteAheadLog {
    /// Persists a batch of entries and, optionally, the replica's hard state
    /// ahead of them. Durability requires a following [`sync`].
    ///
    /// [`sync`]: WriteAheadLog::sync
    async fn write(&mut self, entries: &[Entry], hard_state: Option<HardState>) -> Result<()>;

    /// Blocks until everything written so far is durable.
    async fn sync(&mut self) -> Result<()>;

    /// Seals the open segment and rejects further writes.
    async fn close(&mut self) -> Result<()>;

    /// Retires segments the caller no longer needs.
    async fn gc(&mut self, hint: CompactionHint) -> Result<()>;
}
