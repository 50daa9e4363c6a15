use std::fs::read_to_string;
use std::path::{Path, PathBuf};

use anyhow::{ensure, Result};
use serde::Deserialize;
use tracing::{debug, info};

pub const DEFAULT_SEGMENT_SIZE_BYTES: u64 = 64 << 20;
pub const DEFAULT_MAX_RECORD_BYTES: u64 = 64 << 20;

/// Durability knobs for one log directory.
#[derive(Deserialize, Debug, Clone)]
pub struct WalOptions {
    pub log_dir: PathBuf,

    /// Rollover threshold for a single segment file.
    #[serde(default = "default_segment_size_bytes")]
    pub segment_size_bytes: u64,

    /// When false, recovery reads record checksums without validating them.
    #[serde(default = "default_verify_checksum")]
    pub verify_checksum: bool,

    /// Hard cap on a single record payload.
    #[serde(default = "default_max_record_bytes")]
    pub max_record_bytes: u64,
}

fn default_segment_size_bytes() -> u64 {
    DEFAULT_SEGMENT_SIZE_BYTES
}

fn default_verify_checksum() -> bool {
    true
}

fn default_max_record_bytes() -> u64 {
    DEFAULT_MAX_RECORD_BYTES
}

impl WalOptions {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        WalOptions {
            log_dir: log_dir.into(),
            segment_size_bytes: DEFAULT_SEGMENT_SIZE_BYTES,
            verify_checksum: true,
            max_record_bytes: DEFAULT_MAX_RECORD_BYTES,
        }
    }

    // parsing an options file, toml format
    pub fn from_file(file: impl AsRef<Path>) -> Result<WalOptions> {
        info!("parsing wal options file: {:?}", file.as_ref());

        let file_contents = read_to_string(file.as_ref())?;
        let opts: WalOptions = toml::from_str(&file_contents)?;

        opts.validate()?;
        debug!("wal options: {:?}", opts);

        Ok(opts)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.segment_size_bytes > 0,
            "segment_size_bytes must be positive"
        );
        ensure!(self.max_record_bytes > 0, "max_record_bytes must be positive");
        ensure!(
            self.max_record_bytes <= self.segment_size_bytes,
            "max_record_bytes must not exceed segment_size_bytes"
        );

        Ok(())
    }
}
