//! Read-side view of one segment file, used during recovery and inspection.

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use bytes::Bytes;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use super::codec::{self, DecodeError, Record, SegmentHeader};
use super::error::WalError;
use crate::config::WalOptions;

static SEGMENT_FILE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)-(\d+)\.wal$").expect("static regex"));

pub fn segment_file_name(seg_id: u64, seg_start: u64) -> String {
    format!("{}-{}.wal", seg_id, seg_start)
}

/// Strict parse of `"{seg_id}-{seg_start}.wal"`. Anything else in the log
/// directory is not a segment and gets ignored.
pub fn parse_segment_file_name(name: &str) -> Option<(u64, u64)> {
    let caps = SEGMENT_FILE_RE.captures(name)?;
    let seg_id = caps[1].parse().ok()?;
    let seg_start = caps[2].parse().ok()?;

    Some((seg_id, seg_start))
}

/// Cursor over the records of one segment.
///
/// The file is drained front to back exactly once; there is no random access.
#[derive(Debug)]
pub struct ReadableSegment {
    path: PathBuf,
    header: SegmentHeader,
    buf: Bytes,
    byte_size: u64,
    max_record_bytes: u64,
    verify_checksum: bool,
    eof: bool,
}

impl ReadableSegment {
    /// Opens the file and validates its header record. The header must carry
    /// the current magic and version, and must agree with the ids encoded in
    /// the file name.
    pub async fn open(path: impl AsRef<Path>, opts: &WalOptions) -> Result<ReadableSegment> {
        let path = path.as_ref().to_path_buf();
        let raw = tokio::fs::read(&path).await?;
        let byte_size = raw.len() as u64;
        let mut buf = Bytes::from(raw);

        let header = match codec::decode_record(&mut buf, opts.max_record_bytes, opts.verify_checksum) {
            Ok(Record::SegmentHeader(header)) => header,
            Ok(_) => bail!(WalError::CorruptSegmentHeader {
                path,
                reason: "first record is not a segment header".to_string(),
            }),
            Err(e) => bail!(WalError::CorruptSegmentHeader {
                path,
                reason: e.to_string(),
            }),
        };

        if !header.is_current() {
            bail!(WalError::CorruptSegmentHeader {
                path,
                reason: format!(
                    "magic {:#010x}, version {}",
                    header.magic, header.version
                ),
            });
        }

        let parsed = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(parse_segment_file_name);
        if let Some((seg_id, seg_start)) = parsed {
            if seg_id != header.seg_id || seg_start != header.seg_start {
                bail!(WalError::CorruptSegmentHeader {
                    path,
                    reason: format!(
                        "file name says {}-{}, header says {}-{}",
                        seg_id, seg_start, header.seg_id, header.seg_start
                    ),
                });
            }
        }

        debug!("opened segment {:?}, {} bytes", path, byte_size);

        Ok(ReadableSegment {
            path,
            header,
            buf,
            byte_size,
            max_record_bytes: opts.max_record_bytes,
            verify_checksum: opts.verify_checksum,
            eof: false,
        })
    }

    /// Yields the next record, `None` at a clean end of file.
    ///
    /// A truncated frame surfaces as [`WalError::TornTail`]; whether that is
    /// tolerable depends on the caller (it is, for the last segment of a
    /// recovery pass). An oversized length prefix means the rest of the file
    /// cannot be framed and is reported the same way. A checksum mismatch
    /// with more frames behind it surfaces as [`WalError::CorruptRecord`].
    pub fn next(&mut self) -> Result<Option<Record>> {
        if self.eof {
            return Ok(None);
        }

        match codec::decode_record(&mut self.buf, self.max_record_bytes, self.verify_checksum) {
            Ok(record) => Ok(Some(record)),
            Err(DecodeError::Eof) => {
                self.eof = true;
                Ok(None)
            }
            Err(DecodeError::Torn) | Err(DecodeError::LengthTooLarge(_)) => {
                bail!(WalError::TornTail {
                    path: self.path.clone(),
                    offset: self.offset(),
                })
            }
            Err(_) => bail!(WalError::CorruptRecord {
                path: self.path.clone(),
                offset: self.offset(),
            }),
        }
    }

    pub fn eof(&self) -> bool {
        self.eof
    }

    /// File offset of the next unparsed byte.
    pub fn offset(&self) -> u64 {
        self.byte_size - self.buf.len() as u64
    }

    pub fn seg_id(&self) -> u64 {
        self.header.seg_id
    }

    pub fn seg_start(&self) -> u64 {
        self.header.seg_start
    }

    pub fn byte_size(&self) -> u64 {
        self.byte_size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use bytes::{BufMut, BytesMut};
    use tempfile::tempdir;

    use super::*;
    use crate::replog::Entry;
    use crate::wal::codec::encode_record;

    #[test]
    pub fn test_segment_file_name_roundtrip() {
        assert_eq!(segment_file_name(1, 1), "1-1.wal");
        assert_eq!(segment_file_name(12, 34056), "12-34056.wal");

        assert_eq!(parse_segment_file_name("1-1.wal"), Some((1, 1)));
        assert_eq!(parse_segment_file_name("12-34056.wal"), Some((12, 34056)));
    }

    #[test]
    pub fn test_segment_file_name_strict() {
        for name in [
            "wal.0",
            "1-2.log",
            "1-2.wal.tmp",
            "x1-2.wal",
            "1-2x.wal",
            "1_2.wal",
            "-1-2.wal",
            "1-.wal",
            "1.wal",
            "99999999999999999999999-1.wal", // overflows u64
        ] {
            assert_eq!(parse_segment_file_name(name), None, "accepted {name:?}");
        }
    }

    async fn write_segment(dir: &Path, seg_id: u64, seg_start: u64, records: &[Record]) -> PathBuf {
        let path = dir.join(segment_file_name(seg_id, seg_start));
        let mut buf = BytesMut::new();
        encode_record(
            &Record::SegmentHeader(SegmentHeader::new(seg_id, seg_start)),
            &mut buf,
        );
        for rec in records {
            encode_record(rec, &mut buf);
        }
        tokio::fs::write(&path, &buf).await.unwrap();
        path
    }

    fn entry(index: u64, term: u64) -> Record {
        Record::Entry(Entry {
            index,
            term,
            data: b"v".to_vec(),
        })
    }

    #[tokio::test]
    pub async fn test_open_and_drain() {
        let dir = tempdir().unwrap();
        let path = write_segment(dir.path(), 3, 11, &[entry(11, 2), entry(12, 2)]).await;

        let opts = WalOptions::new(dir.path());
        let mut seg = ReadableSegment::open(&path, &opts).await.unwrap();
        assert_eq!(seg.seg_id(), 3);
        assert_eq!(seg.seg_start(), 11);
        assert!(!seg.eof());

        assert_eq!(seg.next().unwrap(), Some(entry(11, 2)));
        assert_eq!(seg.next().unwrap(), Some(entry(12, 2)));
        assert_eq!(seg.next().unwrap(), None);
        assert!(seg.eof());
        assert_eq!(seg.offset(), seg.byte_size());
    }

    #[tokio::test]
    pub async fn test_bad_magic_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(segment_file_name(1, 1));

        let mut buf = BytesMut::new();
        let mut header = SegmentHeader::new(1, 1);
        header.magic = 0xdead_beef;
        encode_record(&Record::SegmentHeader(header), &mut buf);
        tokio::fs::write(&path, &buf).await.unwrap();

        let opts = WalOptions::new(dir.path());
        let err = ReadableSegment::open(&path, &opts).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<WalError>(),
            Some(WalError::CorruptSegmentHeader { .. })
        ));
    }

    #[tokio::test]
    pub async fn test_file_name_header_mismatch_rejected() {
        let dir = tempdir().unwrap();
        let path = write_segment(dir.path(), 2, 5, &[entry(5, 1)]).await;

        let renamed = dir.path().join(segment_file_name(7, 5));
        tokio::fs::rename(&path, &renamed).await.unwrap();

        let opts = WalOptions::new(dir.path());
        let err = ReadableSegment::open(&renamed, &opts).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<WalError>(),
            Some(WalError::CorruptSegmentHeader { .. })
        ));
    }

    #[tokio::test]
    pub async fn test_bad_header_crc_tolerated_without_verification() {
        let dir = tempdir().unwrap();
        let path = write_segment(dir.path(), 1, 1, &[entry(1, 1)]).await;

        // Flip a bit of the header record's checksum. The header fields
        // themselves stay intact.
        let header_frame_len = {
            let mut buf = BytesMut::new();
            encode_record(&Record::SegmentHeader(SegmentHeader::new(1, 1)), &mut buf);
            buf.len()
        };
        let mut raw = tokio::fs::read(&path).await.unwrap();
        raw[header_frame_len - 1] ^= 0x01;
        tokio::fs::write(&path, &raw).await.unwrap();

        let opts = WalOptions::new(dir.path());
        let err = ReadableSegment::open(&path, &opts).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<WalError>(),
            Some(WalError::CorruptSegmentHeader { .. })
        ));

        let mut no_verify = WalOptions::new(dir.path());
        no_verify.verify_checksum = false;
        let mut seg = ReadableSegment::open(&path, &no_verify).await.unwrap();
        assert_eq!(seg.seg_id(), 1);
        assert_eq!(seg.seg_start(), 1);
        assert_eq!(seg.next().unwrap(), Some(entry(1, 1)));
        assert_eq!(seg.next().unwrap(), None);
    }

    #[tokio::test]
    pub async fn test_torn_tail_reported() {
        let dir = tempdir().unwrap();
        let path = write_segment(dir.path(), 1, 1, &[entry(1, 1)]).await;

        let mut raw = tokio::fs::read(&path).await.unwrap();
        let mut tail = BytesMut::new();
        tail.put_u8(codec::RECORD_ENTRY);
        tail.put_u16_le(0xffff);
        raw.extend_from_slice(&tail);
        tokio::fs::write(&path, &raw).await.unwrap();

        let opts = WalOptions::new(dir.path());
        let mut seg = ReadableSegment::open(&path, &opts).await.unwrap();
        assert_eq!(seg.next().unwrap(), Some(entry(1, 1)));

        let err = seg.next().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<WalError>(),
            Some(WalError::TornTail { .. })
        ));
    }
}
