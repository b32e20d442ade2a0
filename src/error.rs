//! Error types for the session-directory writer.
//!
//! This module defines `SrdirError`, the single error type returned by every
//! fallible operation of the crate. It is built with `thiserror`, so the
//! underlying causes (`std::io::Error`, allocation failures, configuration
//! parsing errors) stay reachable through `std::error::Error::source`.
//!
//! ## Error Hierarchy
//!
//! - **Initialization**: `MissingTargetPath`, `DirectoryCreate`, `MetadataWrite`,
//!   `Allocation`. Raised while the archive directory is being set up. The
//!   router stays idle, so the next data packet retries initialization.
//! - **Chunk persistence**: `ChunkWrite`. Fatal to the archive; there is no
//!   retry path.
//! - **Packet validation**: `UnitSizeMismatch`, `UnsupportedMultiChannelAnalog`,
//!   `UnknownChannel`, `Conversion`, `ArchiveClosed`. The offending packet is
//!   rejected and no chunk file is written for it.
//! - **Configuration**: `Config` wraps `figment` extraction failures,
//!   `Configuration` carries semantic validation failures.

use std::collections::TryReserveError;
use std::path::PathBuf;

use thiserror::Error;

use crate::analog::ConversionError;

/// Convenience alias for results using the crate error type.
pub type Result<T> = std::result::Result<T, SrdirError>;

/// Primary error type for archive creation and chunk writing.
#[derive(Error, Debug)]
pub enum SrdirError {
    /// The output target was opened without a destination path.
    #[error("srdir output requires a target path, cannot save")]
    MissingTargetPath,

    /// The archive directory could not be created.
    ///
    /// Also raised when the directory already exists, which is what a retried
    /// initialization runs into after a partially successful first attempt.
    #[error("Could not create archive directory {path}: {source}")]
    DirectoryCreate {
        /// Directory that was being created
        path: PathBuf,
        /// Underlying OS error
        #[source]
        source: std::io::Error,
    },

    /// The `version` marker or the `metadata` record could not be persisted.
    #[error("Error saving {path} into archive directory: {source}")]
    MetadataWrite {
        /// File that was being written
        path: PathBuf,
        /// Underlying OS error
        #[source]
        source: std::io::Error,
    },

    /// A chunk file could not be created or was written short.
    #[error("Failed to add chunk '{path}': {source}")]
    ChunkWrite {
        /// Chunk file path
        path: PathBuf,
        /// Underlying OS error
        #[source]
        source: std::io::Error,
    },

    /// A logic packet declared a unit size different from the archive's.
    #[error("Unexpected unit size {actual} (archive uses {expected}), discarding logic data")]
    UnitSizeMismatch {
        /// Unit size fixed at initialization
        expected: usize,
        /// Unit size carried by the packet
        actual: usize,
    },

    /// An analog packet referenced more than one channel (or none).
    #[error("Analog packets covering {channels} channels are not supported")]
    UnsupportedMultiChannelAnalog {
        /// Number of channels the packet referenced
        channels: usize,
    },

    /// An analog packet referenced a channel with no accumulator slot.
    #[error("Analog channel {index} is not an enabled channel of this archive")]
    UnknownChannel {
        /// Global channel index carried by the packet
        index: usize,
    },

    /// A sample buffer could not be allocated.
    #[error("Failed to allocate {bytes} bytes of sample buffer: {source}")]
    Allocation {
        /// Requested size in bytes
        bytes: usize,
        /// Allocator failure
        #[source]
        source: TryReserveError,
    },

    /// Analog payload could not be converted to floating point.
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    /// A data packet arrived after the stream-end signal.
    #[error("Archive already closed by end of stream")]
    ArchiveClosed,

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    /// Configuration was loaded but holds invalid values.
    #[error("Configuration validation error: {0}")]
    Configuration(String),
}

impl SrdirError {
    /// Whether the error leaves the archive unusable.
    ///
    /// Packet validation errors only reject the packet at hand; everything
    /// touching the filesystem or the allocator ends the archive.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SrdirError::DirectoryCreate { .. }
                | SrdirError::MetadataWrite { .. }
                | SrdirError::ChunkWrite { .. }
                | SrdirError::Allocation { .. }
                | SrdirError::ArchiveClosed
        )
    }
}
