//! Packet Router
//!
//! [`SrdirOutput`] is the output target: it receives the acquisition feed one
//! packet at a time and drives the archive through three stages.
//!
//! ```text
//!            first logic/analog packet            end of stream
//!   Idle ─────────────────────────────────▶ Open ─────────────────▶ Closed
//!    │  meta: remember sample rate           │  logic  → LogicAccumulator
//!    │  end:  no-op, nothing created         │  analog → AnalogAccumulatorSet
//!    └── init failure: stays Idle            │
//!                                            └── chunk write failure ──▶ Failed
//! ```
//!
//! `Closed` and `Failed` are terminal: data packets fail with `ArchiveClosed`.
//!
//! The directory is only created once data arrives, so a session that ends
//! before producing samples leaves nothing on disk. Once the archive is
//! `Open` its layout is fixed; a later metadata packet does not rewrite it.

use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use crate::archive::ArchiveState;
use crate::channel::{AcquisitionDevice, ChannelCatalog};
use crate::config::ArchiveConfig;
use crate::error::{Result, SrdirError};
use crate::packet::{ConfigItem, Packet};

/// Static description of an output module
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputModuleInfo {
    /// Identifier used to select the module
    pub id: &'static str,
    /// Display name
    pub name: &'static str,
    /// One-line description
    pub description: &'static str,
    /// File name extensions of the produced output
    pub extensions: &'static [&'static str],
}

/// Descriptor of the session-directory output
pub const MODULE_INFO: OutputModuleInfo = OutputModuleInfo {
    id: "srdir",
    name: "srdir",
    description: "Session file format data stored in a directory. \
                  Convert to srzip by 'cd <dir> ; zip -9 data.sr *'",
    extensions: &[""],
};

/// Externally visible router stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterState {
    /// No directory created yet
    Idle,
    /// Directory created, accumulators live
    Open,
    /// Stream ended, buffers drained
    Closed,
    /// A chunk write failed; nothing more is written
    Failed,
}

/// Counters of an archive
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveStats {
    /// Chunk files written
    pub chunks_written: u64,
    /// Payload bytes written to chunk files
    pub bytes_written: u64,
    /// Logic sample rows accepted
    pub logic_samples: u64,
    /// Analog samples accepted, all channels
    pub analog_samples: u64,
}

#[derive(Debug)]
enum Stage {
    Idle,
    Open(Box<ArchiveState>),
    Closed(ArchiveStats),
    Failed(ArchiveStats),
}

/// Session-directory output target
#[derive(Debug)]
pub struct SrdirOutput<D> {
    target: PathBuf,
    device: D,
    config: ArchiveConfig,
    sample_rate: Option<u64>,
    stage: Stage,
    logic_samples: u64,
    analog_samples: u64,
}

impl<D: AcquisitionDevice> SrdirOutput<D> {
    /// Open an output target writing to the directory `target`.
    ///
    /// Nothing touches the filesystem until the first data packet.
    pub fn new(target: impl Into<PathBuf>, device: D, config: ArchiveConfig) -> Result<Self> {
        let target = target.into();
        if target.as_os_str().is_empty() {
            info!("srdir output requires a target path, cannot save");
            return Err(SrdirError::MissingTargetPath);
        }

        Ok(Self {
            target,
            device,
            config,
            sample_rate: None,
            stage: Stage::Idle,
            logic_samples: 0,
            analog_samples: 0,
        })
    }

    /// Archive directory path
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Current stage
    pub fn state(&self) -> RouterState {
        match self.stage {
            Stage::Idle => RouterState::Idle,
            Stage::Open(_) => RouterState::Open,
            Stage::Closed(_) => RouterState::Closed,
            Stage::Failed(_) => RouterState::Failed,
        }
    }

    /// Live archive, while open
    pub fn archive(&self) -> Option<&ArchiveState> {
        match &self.stage {
            Stage::Open(state) => Some(&**state),
            _ => None,
        }
    }

    /// Sample rate announced by metadata packets so far
    pub fn pending_sample_rate(&self) -> Option<u64> {
        self.sample_rate
    }

    /// Counters of the archive so far
    pub fn stats(&self) -> ArchiveStats {
        match &self.stage {
            Stage::Closed(stats) | Stage::Failed(stats) => *stats,
            Stage::Open(state) => ArchiveStats {
                chunks_written: state.writer().chunks_written(),
                bytes_written: state.writer().bytes_written(),
                logic_samples: self.logic_samples,
                analog_samples: self.analog_samples,
            },
            Stage::Idle => ArchiveStats::default(),
        }
    }

    /// Process one packet of the feed.
    ///
    /// Errors reject the packet at hand; the router makes no attempt to
    /// recover. An initialization failure leaves the router idle, so the
    /// next data packet tries again. A failed chunk write ends the archive
    /// in the `Failed` stage.
    pub fn receive(&mut self, packet: &Packet) -> Result<()> {
        debug!(packet = packet.kind(), state = ?self.state(), "receive");

        match packet {
            Packet::Meta(items) => self.apply_meta(items),
            Packet::Logic(logic) => {
                let state = self.ensure_open()?;
                let queued = state.queue_logic(&logic.data, logic.unit_size, false);
                let rows = self.check_fatal(queued)?;
                self.logic_samples += rows as u64;
            }
            Packet::Analog(analog) => {
                let state = self.ensure_open()?;
                let queued = state.queue_analog(Some(analog), false);
                let samples = self.check_fatal(queued)?;
                self.analog_samples += samples as u64;
            }
            Packet::End => self.finish()?,
            Packet::Header | Packet::Trigger | Packet::FrameBegin | Packet::FrameEnd => {}
        }
        Ok(())
    }

    /// Release the output target, returning its final counters.
    ///
    /// Samples still buffered in an archive that never saw end of stream are
    /// discarded.
    pub fn close(self) -> ArchiveStats {
        let stats = self.stats();
        if let Stage::Open(state) = &self.stage {
            warn!(
                path = %state.dir().display(),
                pending_logic_rows = state.logic().buffer().fill(),
                pending_analog_samples = state.analog().pending_samples(),
                "closing archive before end of stream"
            );
        }
        stats
    }

    fn apply_meta(&mut self, items: &[ConfigItem]) {
        for item in items {
            let ConfigItem::SampleRate(rate) = item else {
                continue;
            };
            match self.stage {
                Stage::Idle => self.sample_rate = Some(*rate),
                _ => debug!(rate, "sample rate change after archive creation ignored"),
            }
        }
    }

    fn ensure_open(&mut self) -> Result<&mut ArchiveState> {
        match self.stage {
            Stage::Open(ref mut state) => Ok(&mut **state),
            Stage::Closed(_) | Stage::Failed(_) => Err(SrdirError::ArchiveClosed),
            Stage::Idle => {
                let state = self.initialize()?;
                self.stage = Stage::Open(Box::new(state));
                self.ensure_open()
            }
        }
    }

    /// Move an open archive to `Failed` when `result` carries a fatal error
    fn check_fatal<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            if err.is_fatal() && matches!(self.stage, Stage::Open(_)) {
                let stats = self.stats();
                error!(
                    path = %self.target.display(),
                    error = %err,
                    chunks = stats.chunks_written,
                    "archive failed, no further chunks will be written"
                );
                self.stage = Stage::Failed(stats);
            }
        }
        result
    }

    fn initialize(&self) -> Result<ArchiveState> {
        let catalog = ChannelCatalog::snapshot(&self.device);
        let sample_rate = match self.sample_rate {
            Some(rate) if rate != 0 => Some(rate),
            pending => self.device.sample_rate().or(pending),
        };
        ArchiveState::create(&self.target, &catalog, sample_rate, &self.config)
    }

    fn finish(&mut self) -> Result<()> {
        let Stage::Open(state) = &mut self.stage else {
            debug!(state = ?self.state(), "end of stream without open archive");
            return Ok(());
        };
        let flushed = state.flush();
        self.check_fatal(flushed)?;

        let stats = self.stats();
        info!(
            path = %self.target.display(),
            chunks = stats.chunks_written,
            bytes = stats.bytes_written,
            "archive closed"
        );
        self.stage = Stage::Closed(stats);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analog::AnalogPayload;
    use crate::channel::{Channel, StaticDevice};
    use crate::packet::LogicPayload;
    use tempfile::TempDir;
    use tracing_test::traced_test;

    fn device() -> StaticDevice {
        StaticDevice::new(vec![Channel::logic(0, "D0"), Channel::analog(1, "A0")])
    }

    #[test]
    fn empty_target_is_rejected() {
        let result = SrdirOutput::new("", device(), ArchiveConfig::default());
        assert!(matches!(result, Err(SrdirError::MissingTargetPath)));
    }

    #[test]
    fn module_descriptor() {
        assert_eq!(MODULE_INFO.id, "srdir");
        assert!(MODULE_INFO.description.contains("zip -9 data.sr"));
        assert_eq!(MODULE_INFO.extensions, &[""]);
    }

    #[test]
    fn meta_before_open_sets_pending_rate() {
        let temp_dir = TempDir::new().unwrap();
        let mut out =
            SrdirOutput::new(temp_dir.path().join("s"), device(), ArchiveConfig::default())
                .unwrap();
        out.receive(&Packet::samplerate(100)).unwrap();
        out.receive(&Packet::samplerate(250)).unwrap();
        assert_eq!(out.pending_sample_rate(), Some(250));
        assert_eq!(out.state(), RouterState::Idle);
        assert!(!out.target().exists());
    }

    #[test]
    fn device_rate_used_when_no_meta_seen() {
        let temp_dir = TempDir::new().unwrap();
        let dev = device().with_sample_rate(48_000);
        let mut out =
            SrdirOutput::new(temp_dir.path().join("s"), dev, ArchiveConfig::default()).unwrap();
        out.receive(&Packet::Logic(LogicPayload::new(1, vec![1])))
            .unwrap();
        assert_eq!(out.archive().unwrap().sample_rate(), Some(48_000));
    }

    #[test]
    fn meta_rate_wins_over_device_rate() {
        let temp_dir = TempDir::new().unwrap();
        let dev = device().with_sample_rate(48_000);
        let mut out =
            SrdirOutput::new(temp_dir.path().join("s"), dev, ArchiveConfig::default()).unwrap();
        out.receive(&Packet::samplerate(1_000)).unwrap();
        out.receive(&Packet::Analog(AnalogPayload::from_f32(1, &[0.5])))
            .unwrap();
        assert_eq!(out.archive().unwrap().sample_rate(), Some(1_000));

        // ignored once open
        out.receive(&Packet::samplerate(2_000)).unwrap();
        assert_eq!(out.archive().unwrap().sample_rate(), Some(1_000));
    }

    #[test]
    fn data_after_close_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let mut out =
            SrdirOutput::new(temp_dir.path().join("s"), device(), ArchiveConfig::default())
                .unwrap();
        out.receive(&Packet::Logic(LogicPayload::new(1, vec![1, 2])))
            .unwrap();
        out.receive(&Packet::End).unwrap();
        assert_eq!(out.state(), RouterState::Closed);

        let err = out
            .receive(&Packet::Logic(LogicPayload::new(1, vec![3])))
            .unwrap_err();
        assert!(matches!(err, SrdirError::ArchiveClosed));

        // a second end of stream is harmless
        out.receive(&Packet::End).unwrap();
        let stats = out.close();
        assert_eq!(stats.chunks_written, 1);
        assert_eq!(stats.logic_samples, 2);
    }

    #[test]
    fn ignored_packets_do_not_open_archive() {
        let temp_dir = TempDir::new().unwrap();
        let mut out =
            SrdirOutput::new(temp_dir.path().join("s"), device(), ArchiveConfig::default())
                .unwrap();
        for packet in [
            Packet::Header,
            Packet::Trigger,
            Packet::FrameBegin,
            Packet::FrameEnd,
        ] {
            out.receive(&packet).unwrap();
        }
        assert_eq!(out.state(), RouterState::Idle);
        assert_eq!(out.stats(), ArchiveStats::default());
    }

    #[test]
    #[traced_test]
    fn close_before_end_reports_pending_samples() {
        let temp_dir = TempDir::new().unwrap();
        let mut out =
            SrdirOutput::new(temp_dir.path().join("s"), device(), ArchiveConfig::default())
                .unwrap();
        out.receive(&Packet::Logic(LogicPayload::new(1, vec![1, 2])))
            .unwrap();
        out.receive(&Packet::Analog(AnalogPayload::from_f32(1, &[0.5, 1.5, 2.5])))
            .unwrap();

        let stats = out.close();
        assert_eq!(stats.chunks_written, 0);
        assert!(logs_contain("closing archive before end of stream"));
        assert!(logs_contain("pending_logic_rows=2"));
        assert!(logs_contain("pending_analog_samples=3"));
    }
}
