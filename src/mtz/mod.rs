//! MTZ reflection files.
//!
//! A file is an 80-byte [prologue](header), the reflection table, then a
//! run of 80-byte ASCII [header records](records) with binary
//! [batch blocks](batch) embedded after `MTZBATS`.  Either byte order is
//! read; files are always written little-endian.

pub mod batch;
pub mod header;
pub mod records;
pub mod symop;

mod reader;
mod writer;

use std::io;

use thiserror::Error;

pub use header::Endian;
pub use reader::{read, read_file};
pub use writer::{write, write_file, write_with};

#[derive(Error, Debug)]
pub enum MtzError {
    #[error("Invalid magic number {0:?}")]
    BadMagic([u8; 4]),
    #[error("Unsupported machine stamp 0x{0:02x}")]
    UnsupportedStamp(u8),
    #[error("File truncated in {0}")]
    Truncated(&'static str),
    #[error("Malformed {keyword} record: {reason}")]
    Malformed {
        keyword: &'static str,
        reason:  String,
    },
    #[error("Header record longer than 80 bytes: {0:?}")]
    RecordOverflow(String),
    #[error("Dataset id {0} is used by more than one dataset")]
    DuplicateDataset(i32),
    #[error("File too large for a 32-bit header pointer ({0} bytes)")]
    TooLarge(u64),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}
