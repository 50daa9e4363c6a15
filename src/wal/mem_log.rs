//! Volatile mirror of the replicated log, rebuilt by recovery and read by
//! the consensus driver.

use anyhow::{bail, Result};
use prost::Message;
use thiserror::Error;

use crate::replog::{Entry, HardState};

#[derive(Error, Debug)]
pub enum MemStoreError {
    #[error("entry has been compacted")]
    EntryCompacted,
    #[error("index out of bound")]
    IndexOutOfBound,
    #[error("empty replicate log")]
    EmptyRepLog,
}

#[derive(Default, Debug)]
pub struct MemStore {
    ents: Vec<Entry>,
    hard_state: HardState,
}

impl MemStore {
    pub fn new() -> Self {
        MemStore::default()
    }

    pub fn append(&mut self, ent: Entry) {
        self.ents.push(ent);
    }

    pub fn entries(&self) -> &[Entry] {
        &self.ents
    }

    /// Mutable tail access for suffix truncation on conflicting appends.
    pub fn entries_mut(&mut self) -> &mut Vec<Entry> {
        &mut self.ents
    }

    pub fn set_hard_state(&mut self, hs: HardState) {
        self.hard_state = hs;
    }

    pub fn hard_state(&self) -> &HardState {
        &self.hard_state
    }

    pub fn first_index(&self) -> u64 {
        self.ents.first().map(|e| e.index).unwrap_or(0)
    }

    pub fn last_index(&self) -> u64 {
        self.ents.last().map(|e| e.index).unwrap_or(0)
    }

    /// Entries in `lo..=hi`, cut down to `max_size` encoded bytes. The first
    /// entry of the range is always returned even when it alone is over the
    /// limit.
    pub fn range(&self, lo: u64, hi: u64, max_size: u64) -> Result<Vec<Entry>> {
        if self.ents.is_empty() {
            bail!(MemStoreError::EmptyRepLog);
        }

        let offset = self.ents[0].index;
        if lo < offset {
            bail!(MemStoreError::EntryCompacted);
        }
        if lo > hi || hi > self.last_index() {
            bail!(MemStoreError::IndexOutOfBound);
        }

        let ents = &self.ents[(lo - offset) as usize..=(hi - offset) as usize];
        Ok(Self::limit_size(ents, max_size))
    }

    fn limit_size(ents: &[Entry], max_size: u64) -> Vec<Entry> {
        if ents.is_empty() {
            return Vec::new();
        }

        let mut size = ents[0].encoded_len();
        let mut limit: usize = 1;

        while limit < ents.len() {
            size += ents[limit].encoded_len();
            if size > max_size as usize {
                break;
            }

            limit += 1;
        }

        ents[..limit].to_vec()
    }
}
