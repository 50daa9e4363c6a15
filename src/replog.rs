//! Replicated-log wire messages.
//!
//! The consensus layer authors these; the WAL only frames and persists them.

use prost::Message;

/// One replicated log record. The payload is opaque to the WAL.
#[derive(Clone, PartialEq, Message)]
pub struct Entry {
    #[prost(uint64, tag = "1")]
    pub index: u64,
    #[prost(uint64, tag = "2")]
    pub term: u64,
    #[prost(bytes = "vec", tag = "3")]
    pub data: Vec<u8>,
}

/// The replica's persistent vote/term/commit snapshot. At most one per
/// append batch, flushed ahead of the batch's entries.
#[derive(Clone, PartialEq, Message)]
pub struct HardState {
    #[prost(uint64, tag = "1")]
    pub term: u64,
    #[prost(uint64, tag = "2")]
    pub vote: u64,
    #[prost(uint64, tag = "3")]
    pub commit: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    pub fn test_entry_codec() {
        let ent = Entry {
            index: 7,
            term: 3,
            data: b"put k v".to_vec(),
        };

        let mut buf = Vec::new();
        ent.encode(&mut buf).unwrap();
        assert_eq!(buf.len(), ent.encoded_len());

        let decoded = Entry::decode(buf.as_slice()).unwrap();
        assert_eq!(decoded, ent);
    }

    #[test]
    pub fn test_hard_state_codec() {
        let hs = HardState {
            term: 9,
            vote: 2,
            commit: 5,
        };

        let mut buf = Vec::new();
        hs.encode(&mut buf).unwrap();

        let decoded = HardState::decode(buf.as_slice()).unwrap();
        assert_eq!(decoded, hs);
    }
}
