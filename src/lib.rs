//! # srdir
//!
//! Write path of the session-directory archive format. An acquisition feed of
//! logic and analog sample packets is turned into a directory holding a
//! `version` marker, a `metadata` record, and numbered binary chunk files per
//! stream. Zipping the directory contents yields a session archive:
//! `cd <dir> ; zip -9 data.sr *`.
//!
//! ## Crate Structure
//!
//! - **`output`**: `SrdirOutput`, the packet router and entry point. Creates
//!   the archive lazily on the first data packet and drains all buffers on
//!   end of stream.
//! - **`archive`**: the one-time initializer; stream numbering, accumulator
//!   allocation, metadata.
//! - **`buffer`**: fixed-capacity sample accumulators for the logic stream
//!   and each analog channel, plus the channel index map.
//! - **`chunk`**: numbered chunk file writer.
//! - **`channel`**: channel catalog snapshot and the `AcquisitionDevice`
//!   collaborator.
//! - **`analog`**: analog payloads and native-to-`f32` conversion.
//! - **`packet`**: packet types of the feed.
//! - **`metadata`**: key-file style text record.
//! - **`samplerate`**: canonical sample rate strings.
//! - **`config`**, **`logging`**, **`error`**: configuration, tracing setup
//!   and the crate error type.
//!
//! ## Example
//!
//! ```no_run
//! use srdir::{
//!     AnalogPayload, ArchiveConfig, Channel, LogicPayload, Packet, SrdirOutput, StaticDevice,
//! };
//!
//! # fn main() -> srdir::Result<()> {
//! let device = StaticDevice::new(vec![Channel::logic(0, "D0"), Channel::analog(1, "A0")]);
//! let mut output = SrdirOutput::new("capture", device, ArchiveConfig::default())?;
//!
//! output.receive(&Packet::samplerate(1_000_000))?;
//! output.receive(&Packet::Logic(LogicPayload::new(1, vec![0, 1, 0, 1])))?;
//! output.receive(&Packet::Analog(AnalogPayload::from_f32(1, &[0.0, 0.5, 1.0])))?;
//! output.receive(&Packet::End)?;
//! # Ok(())
//! # }
//! ```

pub mod analog;
pub mod archive;
pub mod buffer;
pub mod channel;
pub mod chunk;
pub mod config;
pub mod error;
pub mod logging;
pub mod metadata;
pub mod output;
pub mod packet;
pub mod samplerate;

pub use analog::{AnalogEncoding, AnalogPayload, ConversionError, Rational};
pub use archive::{ArchiveLayout, ArchiveState};
pub use channel::{AcquisitionDevice, Channel, ChannelCatalog, ChannelKind, StaticDevice};
pub use config::{ArchiveConfig, SrdirConfig};
pub use error::{Result, SrdirError};
pub use output::{ArchiveStats, RouterState, SrdirOutput, MODULE_INFO};
pub use packet::{ConfigItem, LogicPayload, Packet};
