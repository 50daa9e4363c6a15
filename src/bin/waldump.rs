use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use clap::Parser;
use tracing::warn;

use raftwal::config::WalOptions;
use raftwal::wal::codec::Record;
use raftwal::wal::{parse_segment_file_name, ReadableSegment, WalError};

#[derive(Parser, Debug)]
#[command(author, version, about = "dump the records of a write-ahead log", long_about = None)]
struct Args {
    /// Log directory, or a single segment file.
    path: PathBuf,

    /// Skip record checksum verification.
    #[arg(long, default_value_t = false)]
    no_verify: bool,

    /// Print entry payloads as lossy utf-8.
    #[arg(long, default_value_t = false)]
    payloads: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let mut segment_paths = Vec::new();
    if args.path.is_dir() {
        let mut segments = Vec::new();
        let mut dir = tokio::fs::read_dir(&args.path).await?;
        while let Some(dent) = dir.next_entry().await? {
            let name = dent.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some((seg_id, _)) = parse_segment_file_name(name) {
                segments.push((seg_id, dent.path()));
            }
        }
        segments.sort_by_key(|seg| seg.0);
        segment_paths.extend(segments.into_iter().map(|seg| seg.1));

        if segment_paths.is_empty() {
            bail!("no segment files under {:?}", args.path);
        }
    } else if args.path.is_file() {
        segment_paths.push(args.path.clone());
    } else {
        bail!("no such path: {:?}", args.path);
    }

    let parent = if args.path.is_dir() {
        args.path.clone()
    } else {
        args.path.parent().map(PathBuf::from).unwrap_or_default()
    };
    let mut opts = WalOptions::new(parent);
    opts.verify_checksum = !args.no_verify;

    for path in segment_paths {
        dump_segment(&path, &opts, args.payloads).await?;
    }

    Ok(())
}

async fn dump_segment(path: &Path, opts: &WalOptions, payloads: bool) -> Result<()> {
    let mut seg = ReadableSegment::open(path, opts).await?;
    println!(
        "{:?}: seg_id={} seg_start={} ({} bytes)",
        path,
        seg.seg_id(),
        seg.seg_start(),
        seg.byte_size()
    );

    loop {
        match seg.next() {
            Ok(Some(Record::Entry(ent))) => {
                if payloads {
                    println!(
                        "  entry index={} term={} data={:?}",
                        ent.index,
                        ent.term,
                        String::from_utf8_lossy(&ent.data)
                    );
                } else {
                    println!(
                        "  entry index={} term={} len={}",
                        ent.index,
                        ent.term,
                        ent.data.len()
                    );
                }
            }
            Ok(Some(Record::HardState(hs))) => {
                println!(
                    "  hard_state term={} vote={} commit={}",
                    hs.term, hs.vote, hs.commit
                );
            }
            Ok(Some(Record::SegmentHeader(header))) => {
                println!(
                    "  segment_header seg_id={} seg_start={}",
                    header.seg_id, header.seg_start
                );
            }
            Ok(None) => break,
            Err(err) => match err.downcast_ref::<WalError>() {
                Some(WalError::TornTail { offset, .. }) => {
                    warn!("torn tail at offset {}, rest of file skipped", offset);
                    break;
                }
                _ => return Err(err),
            },
        }
    }

    Ok(())
}
