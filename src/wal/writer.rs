//! Write side of one segment file.

use std::path::{Path, PathBuf};

use anyhow::Result;
use bytes::BytesMut;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::codec::{self, Record, SegmentHeader};
use super::segment::segment_file_name;
use crate::config::WalOptions;
use crate::replog::{Entry, HardState};

/// Descriptor the manager keeps for every sealed segment.
#[derive(Debug, Clone)]
pub struct SegmentMeta {
    pub seg_id: u64,
    pub seg_start: u64,
    /// Index of the last entry written to this segment.
    pub last_index: u64,
    pub path: PathBuf,
    pub byte_size: u64,
}

/// Owns exactly one open segment file. Created with the `(seg_id, seg_start)`
/// pair handed down by the manager; sealing it moves the segment's metadata
/// out and consumes the writer.
#[derive(Debug)]
pub struct LogWriter {
    file: File,
    path: PathBuf,
    seg_id: u64,
    seg_start: u64,
    last_index: u64,
    bytes_written: u64,
    segment_size_bytes: u64,
}

impl LogWriter {
    /// Creates the segment file and writes its header record.
    pub async fn create(
        dir: impl AsRef<Path>,
        seg_id: u64,
        seg_start: u64,
        opts: &WalOptions,
    ) -> Result<LogWriter> {
        let path = dir.as_ref().join(segment_file_name(seg_id, seg_start));
        let mut file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&path)
            .await?;

        let mut buf = BytesMut::new();
        codec::encode_record(
            &Record::SegmentHeader(SegmentHeader::new(seg_id, seg_start)),
            &mut buf,
        );
        file.write_all(&buf).await?;

        debug!("created segment {:?}", path);

        Ok(LogWriter {
            file,
            path,
            seg_id,
            seg_start,
            last_index: seg_start.saturating_sub(1),
            bytes_written: buf.len() as u64,
            segment_size_bytes: opts.segment_size_bytes,
        })
    }

    /// Appends `hard_state` (if any) followed by `entries[from..]` in order,
    /// as one write. Returns the position of the first entry left unwritten:
    /// `entries.len()` when the whole batch fit, or the cut point once the
    /// next entry would push the segment past its size limit. At least one
    /// entry is written per call while input remains, and an entry is never
    /// split across segments.
    pub async fn append(
        &mut self,
        entries: &[Entry],
        from: usize,
        hard_state: Option<&HardState>,
    ) -> Result<usize> {
        let mut buf = BytesMut::new();
        if let Some(hs) = hard_state {
            codec::encode_record(&Record::HardState(hs.clone()), &mut buf);
        }

        let mut next = from;
        while next < entries.len() {
            let ent = &entries[next];
            let projected = self.bytes_written + buf.len() as u64 + codec::frame_len(ent);
            if next > from && projected > self.segment_size_bytes {
                break;
            }

            codec::encode_record(&Record::Entry(ent.clone()), &mut buf);
            self.last_index = ent.index;
            next += 1;
        }

        self.file.write_all(&buf).await?;
        self.bytes_written += buf.len() as u64;

        Ok(next)
    }

    /// fdatasync semantics: everything appended so far is durable on return.
    pub async fn sync(&mut self) -> Result<()> {
        self.file.flush().await?;
        self.file.sync_data().await?;

        Ok(())
    }

    /// Flushes and closes the file; the segment's metadata transfers out by
    /// move and the writer is gone.
    pub async fn finish(mut self) -> Result<SegmentMeta> {
        self.file.flush().await?;
        self.file.sync_data().await?;

        Ok(SegmentMeta {
            seg_id: self.seg_id,
            seg_start: self.seg_start,
            last_index: self.last_index,
            path: self.path,
            byte_size: self.bytes_written,
        })
    }

    pub fn is_full(&self) -> bool {
        self.bytes_written >= self.segment_size_bytes
    }

    pub fn seg_id(&self) -> u64 {
        self.seg_id
    }

    pub fn last_index(&self) -> u64 {
        self.last_index
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}
