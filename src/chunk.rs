//! Chunk File Writer
//!
//! Every stream of the archive is persisted as a run of numbered files,
//! `<stream>-1`, `<stream>-2`, ..., each holding one flushed buffer without a
//! header. This module owns the naming and the single write per chunk.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, error};

use crate::error::{Result, SrdirError};

/// Stream label of the packed logic samples
pub const LOGIC_STREAM: &str = "logic-1";

/// Stream label of the analog channel with the given 1-based stream number
pub fn analog_stream(stream_number: usize) -> String {
    format!("analog-1-{stream_number}")
}

/// File name of one chunk of a stream
pub fn chunk_file_name(stream: &str, chunk_number: u32) -> String {
    format!("{stream}-{chunk_number}")
}

/// Writes chunk files into one archive directory and counts what it wrote
#[derive(Debug)]
pub struct ChunkWriter {
    dir: PathBuf,
    chunks_written: u64,
    bytes_written: u64,
}

impl ChunkWriter {
    /// Writer for an existing archive directory
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            chunks_written: 0,
            bytes_written: 0,
        }
    }

    /// Archive directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `bytes` as chunk `*chunk_number` of `stream`, then advance the number.
    ///
    /// The file must not exist yet; an existing chunk is never appended to or
    /// overwritten. On failure the chunk number is left unchanged.
    pub fn write_chunk(&mut self, stream: &str, chunk_number: &mut u32, bytes: &[u8]) -> Result<()> {
        let path = self.dir.join(chunk_file_name(stream, *chunk_number));
        debug!(chunk = %path.display(), bytes = bytes.len(), "writing chunk");

        let written = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .and_then(|mut file| {
                file.write_all(bytes)?;
                file.flush()
            });
        if let Err(source) = written {
            error!(chunk = %path.display(), error = %source, "failed to add chunk");
            return Err(SrdirError::ChunkWrite { path, source });
        }

        *chunk_number += 1;
        self.chunks_written += 1;
        self.bytes_written += bytes.len() as u64;
        Ok(())
    }

    /// Number of chunk files written so far
    pub fn chunks_written(&self) -> u64 {
        self.chunks_written
    }

    /// Total payload bytes written so far
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}
