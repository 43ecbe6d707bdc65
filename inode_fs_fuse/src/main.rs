use clap::{App, Arg};
use inode_fs::{FsError, Geometry, InodeManager, InodeType, BLOCK_NUM, INODE_NUM, MAXFILE_BYTES};
use log::{info, warn, Level, LevelFilter, Log, Metadata, Record};
use std::fs::{read_dir, File};
use std::io::Read;
use std::path::Path;
use std::process;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Seconds since the epoch, as stored in the inode timestamps.
struct SystemClock;

impl inode_fs::Clock for SystemClock {
    fn now(&self) -> u32 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or(0)
    }
}

struct SimpleLogger;

impl Log for SimpleLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let color = match record.level() {
            Level::Error => 31, // Red
            Level::Warn => 93,  // BrightYellow
            Level::Info => 34,  // Blue
            Level::Debug => 32, // Green
            Level::Trace => 90, // BrightBlack
        };
        eprintln!(
            "\u{1B}[{}m[{:>5}] {}\u{1B}[0m",
            color,
            record.level(),
            record.args(),
        );
    }

    fn flush(&self) {}
}

fn init_logger(level: Option<&str>) {
    static LOGGER: SimpleLogger = SimpleLogger;
    // the logger can only be set once
    let _ = log::set_logger(&LOGGER);
    let level = level
        .map(str::to_owned)
        .or_else(|| std::env::var("LOG").ok());
    log::set_max_level(match level.as_deref() {
        Some("error") => LevelFilter::Error,
        Some("warn") => LevelFilter::Warn,
        Some("debug") => LevelFilter::Debug,
        Some("trace") => LevelFilter::Trace,
        _ => LevelFilter::Info,
    });
}

#[derive(Error, Debug)]
enum PackError {
    #[error("host I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store error: {0}")]
    Fs(#[from] FsError),
    #[error("bad argument: {0}")]
    Args(String),
    #[error("{0} did not read back intact")]
    Mismatch(String),
}

fn main() {
    if let Err(e) = inode_fs_pack() {
        eprintln!("inode_fs_fuse: {}", e);
        process::exit(1);
    }
}

fn parse_count(value: Option<&str>, default: u32, name: &str) -> Result<u32, PackError> {
    match value {
        None => Ok(default),
        Some(v) => v
            .parse()
            .map_err(|_| PackError::Args(format!("{} expects a number, got {:?}", name, v))),
    }
}

fn inode_fs_pack() -> Result<(), PackError> {
    let matches = App::new("inode_fs packer")
        .about("Packs a host directory into a fresh in-memory inode store and checks it")
        .arg(
            Arg::with_name("source")
                .short("s")
                .long("source")
                .takes_value(true)
                .required(true)
                .help("Directory whose regular files are packed"),
        )
        .arg(
            Arg::with_name("blocks")
                .short("b")
                .long("blocks")
                .takes_value(true)
                .help("Blocks in the store [default: 32768]"),
        )
        .arg(
            Arg::with_name("inodes")
                .short("i")
                .long("inodes")
                .takes_value(true)
                .help("Inode table size [default: 1024]"),
        )
        .arg(
            Arg::with_name("log")
                .long("log")
                .takes_value(true)
                .possible_values(&["error", "warn", "info", "debug", "trace"])
                .help("Log level, falls back to $LOG"),
        )
        .get_matches();
    init_logger(matches.value_of("log"));

    let src_path = matches
        .value_of("source")
        .ok_or_else(|| PackError::Args("missing --source".into()))?;
    let blocks = parse_count(matches.value_of("blocks"), BLOCK_NUM, "--blocks")?;
    let inodes = parse_count(matches.value_of("inodes"), INODE_NUM, "--inodes")?;
    let geometry = Geometry::new(blocks, inodes)?;
    info!(
        "src_path = {}, {} blocks, {} inodes, data starts at block {}",
        src_path,
        geometry.block_num(),
        geometry.inode_num(),
        geometry.data_start()
    );

    let mut im = InodeManager::with_geometry(geometry, SystemClock);

    let mut entries = read_dir(src_path)?.collect::<Result<Vec<_>, _>>()?;
    entries.sort_by_key(|entry| entry.file_name());
    info!("found {} entries to pack", entries.len());

    let mut packed = Vec::new();
    for entry in entries {
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        let all_data = read_host_file(&entry.path())?;
        if all_data.len() > MAXFILE_BYTES {
            warn!(
                "skipping {}: {} bytes exceed the {} byte file limit",
                name,
                all_data.len(),
                MAXFILE_BYTES
            );
            continue;
        }
        let inum = im.alloc_inode(InodeType::File)?;
        im.write_file(inum, &all_data)?;
        info!("packed {} as inode {}, {} bytes", name, inum, all_data.len());
        packed.push((inum, name, all_data));
    }

    for (inum, name, all_data) in &packed {
        if im.read_file(*inum)? != *all_data {
            return Err(PackError::Mismatch(name.clone()));
        }
        let attr = im.getattr(*inum)?;
        println!("{:>5} {:<32} {:>8} {}", inum, name, attr.size, attr.mtime);
    }

    im.check()?;
    let bm = im.block_allocator();
    let sb = bm.superblock();
    println!(
        "superblock: size {} bytes, {} blocks, {} inodes",
        sb.size, sb.nblocks, sb.ninodes
    );
    println!(
        "{} files packed, {} free blocks, {} free inodes",
        packed.len(),
        bm.num_free_blocks(),
        im.num_free_inodes()
    );
    Ok(())
}

fn read_host_file(path: &Path) -> std::io::Result<Vec<u8>> {
    let mut host_file = File::open(path)?;
    let mut all_data: Vec<u8> = Vec::new();
    host_file.read_to_end(&mut all_data)?;
    Ok(all_data)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_error() -> Result<(), PackError> {
        Geometry::new(64, 1)?;
        Ok(())
    }

    #[test]
    fn errors_convert_and_describe_themselves() {
        let err = store_error().unwrap_err();
        assert!(matches!(err, PackError::Fs(FsError::InvalidArgument)));
        assert_eq!(err.to_string(), "store error: invalid argument");

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no such dir");
        let err = PackError::from(io);
        assert!(std::error::Error::source(&err).is_some());
        assert_eq!(err.to_string(), "host I/O error: no such dir");

        assert_eq!(
            PackError::Mismatch("init".into()).to_string(),
            "init did not read back intact"
        );
    }

    #[test]
    fn counts_fall_back_to_defaults() {
        assert_eq!(parse_count(None, BLOCK_NUM, "--blocks").unwrap(), 32768);
        assert_eq!(parse_count(Some("128"), BLOCK_NUM, "--blocks").unwrap(), 128);
        let err = parse_count(Some("lots"), INODE_NUM, "--inodes").unwrap_err();
        assert_eq!(err.to_string(), "bad argument: --inodes expects a number, got \"lots\"");
    }
}
