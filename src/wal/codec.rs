//! On-disk record framing.
//!
//! A segment file is a sequence of frames:
//!
//! ```text
//! [ type: u8 ][ payload_len: u32 LE ][ payload ][ crc32c: u32 LE ]
//! ```
//!
//! The checksum covers type, length prefix, and payload, so a frame is
//! accepted whole or rejected whole. Entry and hard-state payloads are
//! protobuf; the segment header payload is a fixed little-endian layout.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use prost::Message;
use thiserror::Error;

use crate::replog::{Entry, HardState};

pub const RECORD_ENTRY: u8 = 1;
pub const RECORD_HARD_STATE: u8 = 2;
pub const RECORD_SEGMENT_HEADER: u8 = 3;

/// "WAL_"
pub const SEGMENT_MAGIC: u32 = 0x5741_4C5F;
pub const SEGMENT_VERSION: u16 = 1;

/// type byte plus length prefix.
const FRAME_PREFIX: usize = 5;
/// trailing checksum.
const FRAME_SUFFIX: usize = 4;

/// magic + version + seg_id + seg_start.
const SEGMENT_HEADER_LEN: usize = 4 + 2 + 8 + 8;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DecodeError {
    #[error("no more records")]
    Eof,
    #[error("truncated record frame")]
    Torn,
    #[error("record checksum mismatch")]
    ChecksumMismatch,
    #[error("unknown record type {0}")]
    UnknownType(u8),
    #[error("record payload of {0} bytes exceeds the configured cap")]
    LengthTooLarge(u32),
    #[error("record payload does not parse")]
    Malformed,
}

/// First record of every segment file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentHeader {
    pub magic: u32,
    pub version: u16,
    pub seg_id: u64,
    pub seg_start: u64,
}

impl SegmentHeader {
    pub fn new(seg_id: u64, seg_start: u64) -> Self {
        SegmentHeader {
            magic: SEGMENT_MAGIC,
            version: SEGMENT_VERSION,
            seg_id,
            seg_start,
        }
    }

    pub fn is_current(&self) -> bool {
        self.magic == SEGMENT_MAGIC && self.version == SEGMENT_VERSION
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Entry(Entry),
    HardState(HardState),
    SegmentHeader(SegmentHeader),
}

/// Bytes one frame of `msg` occupies on disk.
pub fn frame_len<M: Message>(msg: &M) -> u64 {
    (FRAME_PREFIX + msg.encoded_len() + FRAME_SUFFIX) as u64
}

pub fn encode_record(record: &Record, buf: &mut BytesMut) {
    let start = buf.len();

    match record {
        Record::Entry(ent) => {
            buf.put_u8(RECORD_ENTRY);
            buf.put_u32_le(ent.encoded_len() as u32);
            ent.encode(buf).unwrap();
        }
        Record::HardState(hs) => {
            buf.put_u8(RECORD_HARD_STATE);
            buf.put_u32_le(hs.encoded_len() as u32);
            hs.encode(buf).unwrap();
        }
        Record::SegmentHeader(hdr) => {
            buf.put_u8(RECORD_SEGMENT_HEADER);
            buf.put_u32_le(SEGMENT_HEADER_LEN as u32);
            buf.put_u32_le(hdr.magic);
            buf.put_u16_le(hdr.version);
            buf.put_u64_le(hdr.seg_id);
            buf.put_u64_le(hdr.seg_start);
        }
    }

    let crc = crc32c::crc32c(&buf[start..]);
    buf.put_u32_le(crc);
}

/// Parses the next frame off the front of `buf` and advances past it.
///
/// `Eof` marks a clean record boundary with nothing left; `Torn` marks a
/// partial frame. A checksum mismatch on a frame that runs exactly to the end
/// of `buf` is also reported as `Torn`: a crash while the final record was
/// being written is indistinguishable from one while it was being overwritten.
pub fn decode_record(
    buf: &mut Bytes,
    max_record_bytes: u64,
    verify_checksum: bool,
) -> Result<Record, DecodeError> {
    if buf.is_empty() {
        return Err(DecodeError::Eof);
    }
    if buf.len() < FRAME_PREFIX {
        return Err(DecodeError::Torn);
    }

    let rtype = buf[0];
    let payload_len = u32::from_le_bytes([buf[1], buf[2], buf[3], buf[4]]);
    if u64::from(payload_len) > max_record_bytes {
        return Err(DecodeError::LengthTooLarge(payload_len));
    }

    let crc_off = FRAME_PREFIX + payload_len as usize;
    let total = crc_off + FRAME_SUFFIX;
    if buf.len() < total {
        return Err(DecodeError::Torn);
    }

    if verify_checksum {
        let stored = u32::from_le_bytes([
            buf[crc_off],
            buf[crc_off + 1],
            buf[crc_off + 2],
            buf[crc_off + 3],
        ]);
        if crc32c::crc32c(&buf[..crc_off]) != stored {
            if buf.len() == total {
                return Err(DecodeError::Torn);
            }
            return Err(DecodeError::ChecksumMismatch);
        }
    }

    let payload = &buf[FRAME_PREFIX..crc_off];
    let record = match rtype {
        RECORD_ENTRY => {
            Record::Entry(Entry::decode(payload).map_err(|_| DecodeError::Malformed)?)
        }
        RECORD_HARD_STATE => {
            Record::HardState(HardState::decode(payload).map_err(|_| DecodeError::Malformed)?)
        }
        RECORD_SEGMENT_HEADER => Record::SegmentHeader(decode_segment_header(payload)?),
        other => return Err(DecodeError::UnknownType(other)),
    };

    buf.advance(total);
    Ok(record)
}

fn decode_segment_header(mut payload: &[u8]) -> Result<SegmentHeader, DecodeError> {
    if payload.len() != SEGMENT_HEADER_LEN {
        return Err(DecodeError::Malformed);
    }

    Ok(SegmentHeader {
        magic: payload.get_u32_le(),
        version: payload.get_u16_le(),
        seg_id: payload.get_u64_le(),
        seg_start: payload.get_u64_le(),
    })
}
