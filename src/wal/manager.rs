//! The durable directory of segments: recovery, append routing, sealing, GC.

use anyhow::{bail, Result};
use tracing::{debug, info, warn};

use super::codec::Record;
use super::error::WalError;
use super::mem_log::MemStore;
use super::segment::{parse_segment_file_name, ReadableSegment};
use super::writer::{LogWriter, SegmentMeta};
use super::WriteAheadLog;
use crate::config::WalOptions;
use crate::replog::{Entry, HardState};

/// Sealed segments whose last entry sits below `up_to_index` may be unlinked.
/// Choosing the index is the caller's policy (usually the snapshot point).
#[derive(Debug, Clone, Copy)]
pub struct CompactionHint {
    pub up_to_index: u64,
}

/// Applies one recovered or incoming entry to the store. A term regression
/// against the retained tail is a protocol violation and is rejected; an
/// index overlap truncates the stored suffix before the entry is appended.
/// Replaying the same segments is therefore idempotent, and entries from
/// later segments win over earlier ones at the same indexes.
pub fn append_to_mem_store(ent: Entry, store: &mut MemStore) -> Result<()> {
    if let Some(last) = store.entries().last() {
        if ent.term < last.term {
            bail!(WalError::TermRegression {
                index: ent.index,
                term: ent.term,
                last_index: last.index,
                last_term: last.term,
            });
        }

        let vec = store.entries_mut();
        while vec.last().map_or(false, |tail| tail.index >= ent.index) {
            vec.pop();
        }
    }

    store.append(ent);
    Ok(())
}

#[derive(Debug)]
pub struct LogManager {
    opts: WalOptions,
    files: Vec<SegmentMeta>,
    current: Option<LogWriter>,
    next_seg_id: u64,
    last_index: u64,
    empty: bool,
    closed: bool,
}

impl LogManager {
    /// Rebuilds the manager and an in-memory store from `opts.log_dir`,
    /// creating the directory when missing.
    ///
    /// Segments are replayed in `seg_id` order. A torn record is tolerated at
    /// the tail of the last segment only; everything beyond the torn point is
    /// discarded. The same damage in any earlier segment aborts recovery.
    pub async fn recover(opts: WalOptions) -> Result<(LogManager, MemStore)> {
        opts.validate()?;
        tokio::fs::create_dir_all(&opts.log_dir).await?;

        let mut segments = Vec::new();
        let mut dir = tokio::fs::read_dir(&opts.log_dir).await?;
        while let Some(dent) = dir.next_entry().await? {
            let name = dent.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some((seg_id, seg_start)) = parse_segment_file_name(name) {
                segments.push((seg_id, seg_start, dent.path()));
            }
        }
        segments.sort_by_key(|seg| seg.0);

        let mut store = MemStore::new();
        let mut manager = LogManager {
            next_seg_id: segments.last().map(|seg| seg.0 + 1).unwrap_or(1),
            opts,
            files: Vec::new(),
            current: None,
            last_index: 0,
            empty: true,
            closed: false,
        };

        if segments.is_empty() {
            warn!("recovering from {:?} with no logs", manager.opts.log_dir);
            return Ok((manager, store));
        }

        info!(
            "recovering from {} segments, starts at {}-{}, ends at {}-{}",
            segments.len(),
            segments[0].0,
            segments[0].1,
            segments[segments.len() - 1].0,
            segments[segments.len() - 1].1,
        );

        let last_pos = segments.len() - 1;
        for (pos, (seg_id, seg_start, path)) in segments.into_iter().enumerate() {
            let mut seg = ReadableSegment::open(&path, &manager.opts).await?;
            let mut seg_last = seg_start.saturating_sub(1);

            loop {
                match seg.next() {
                    Ok(Some(Record::Entry(ent))) => {
                        manager.last_index = ent.index;
                        manager.empty = false;
                        seg_last = ent.index;
                        append_to_mem_store(ent, &mut store)?;
                    }
                    Ok(Some(Record::HardState(hs))) => {
                        store.set_hard_state(hs);
                    }
                    Ok(Some(Record::SegmentHeader(_))) => {
                        // Only valid as the first record, which open() consumed.
                        bail!(WalError::CorruptRecord {
                            path: seg.path().to_path_buf(),
                            offset: seg.offset(),
                        });
                    }
                    Ok(None) => break,
                    Err(err) => match err.downcast_ref::<WalError>() {
                        Some(WalError::TornTail { offset, .. }) if pos == last_pos => {
                            warn!(
                                "discarding torn tail of {:?} at offset {}",
                                seg.path(),
                                offset
                            );
                            break;
                        }
                        Some(WalError::TornTail { path, offset }) => {
                            bail!(WalError::CorruptRecord {
                                path: path.clone(),
                                offset: *offset,
                            });
                        }
                        _ => return Err(err),
                    },
                }
            }

            debug!(
                "replayed segment {}-{}, last index {}",
                seg_id, seg_start, seg_last
            );
            manager.files.push(SegmentMeta {
                seg_id,
                seg_start,
                last_index: seg_last,
                byte_size: seg.byte_size(),
                path,
            });
        }

        info!(
            "recovered {} entries, last index {}",
            store.entries().len(),
            manager.last_index
        );
        Ok((manager, store))
    }

    async fn finish_current(&mut self) -> Result<()> {
        if let Some(writer) = self.current.take() {
            let meta = writer.finish().await?;
            info!(
                "sealed segment {:?}, {} bytes, last index {}",
                meta.path, meta.byte_size, meta.last_index
            );
            self.files.push(meta);
        }

        Ok(())
    }

    pub fn last_index(&self) -> u64 {
        self.last_index
    }

    pub fn is_empty(&self) -> bool {
        self.empty
    }

    /// Sealed segments, oldest first.
    pub fn sealed_segments(&self) -> &[SegmentMeta] {
        &self.files
    }

    pub fn options(&self) -> &WalOptions {
        &self.opts
    }
}

impl WriteAheadLog for LogManager {
    /// Appends a batch of entries, rolling over to fresh segments as the
    /// size limit fills up. The hard state, when present, is written ahead
    /// of the entries, once, in the first segment the batch touches.
    ///
    /// An empty batch is a no-op; durability still requires [`sync`].
    ///
    /// [`sync`]: WriteAheadLog::sync
    async fn write(&mut self, entries: &[Entry], hard_state: Option<HardState>) -> Result<()> {
        if self.closed {
            bail!(WalError::Closed);
        }

        if entries.is_empty() {
            if hard_state.is_some() {
                // Hard state rides with entries; alone it has nowhere to go.
                warn!("dropping hard state submitted without entries");
            }
            return Ok(());
        }

        if self.empty {
            // Start counting at the first entry received.
            self.last_index = entries[0].index - 1;
            self.empty = false;
        }

        if self.current.as_ref().map_or(false, LogWriter::is_full) {
            self.finish_current().await?;
        }

        let mut hard_state = hard_state;
        let mut from = 0;
        while from < entries.len() {
            if self.current.is_none() {
                let writer = LogWriter::create(
                    &self.opts.log_dir,
                    self.next_seg_id,
                    entries[from].index,
                    &self.opts,
                )
                .await?;
                self.next_seg_id += 1;
                self.current = Some(writer);
            }

            let writer = self.current.as_mut().expect("writer installed above");
            let hs = hard_state.take();
            let next = writer.append(entries, from, hs.as_ref()).await?;
            debug_assert!(next > from, "append must make progress");

            self.last_index = entries[next - 1].index;
            from = next;

            if from < entries.len() {
                self.finish_current().await?;
            }
        }

        Ok(())
    }

    /// Durability barrier for everything written so far. No-op without an
    /// open writer.
    async fn sync(&mut self) -> Result<()> {
        if let Some(writer) = self.current.as_mut() {
            writer.sync().await?;
        }

        Ok(())
    }

    /// Seals the open segment, if any. Idempotent; later writes are rejected.
    async fn close(&mut self) -> Result<()> {
        self.finish_current().await?;
        self.closed = true;

        Ok(())
    }

    /// Unlinks sealed segments fully below the hint. The open segment is
    /// never touched.
    async fn gc(&mut self, hint: CompactionHint) -> Result<()> {
        let (covered, retained): (Vec<_>, Vec<_>) = self
            .files
            .drain(..)
            .partition(|meta| meta.last_index < hint.up_to_index);
        self.files = retained;

        for meta in covered {
            info!(
                "gc: unlinking segment {:?}, last index {}",
                meta.path, meta.last_index
            );
            tokio::fs::remove_file(&meta.path).await?;
        }

        Ok(())
    }
}
