use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WalError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("corrupt segment header in {path:?}: {reason}")]
    CorruptSegmentHeader { path: PathBuf, reason: String },

    #[error("corrupt record in {path:?} at offset {offset}")]
    CorruptRecord { path: PathBuf, offset: u64 },

    #[error("torn record at end of {path:?}, offset {offset}")]
    TornTail { path: PathBuf, offset: u64 },

    #[error("new entry [index: {index}, term: {term}] has lower term than last entry [index: {last_index}, term: {last_term}]")]
    TermRegression {
        index: u64,
        term: u64,
        last_index: u64,
        last_term: u64,
    },

    #[error("write-ahead log is closed")]
    Closed,
}
