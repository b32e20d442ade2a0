//! Archive Initializer and per-archive state.
//!
//! [`ArchiveState::create`] runs once per output target, before the first
//! chunk is written. It creates the directory, writes the `version` marker,
//! derives the stream layout from the channel catalog, allocates every
//! accumulator and persists the `metadata` record. Nothing in the resulting
//! layout changes for the lifetime of the archive.

use std::fs;
use std::path::Path;

use tracing::{error, info};

use crate::analog::AnalogPayload;
use crate::buffer::{AnalogAccumulatorSet, ChannelIndexMap, LogicAccumulator};
use crate::channel::{ChannelCatalog, ChannelKind};
use crate::chunk::{ChunkWriter, LOGIC_STREAM};
use crate::config::ArchiveConfig;
use crate::error::{Result, SrdirError};
use crate::metadata::KeyFile;
use crate::samplerate::samplerate_string;

/// Name of the format version marker file
pub const VERSION_FILE: &str = "version";
/// Name of the metadata record file
pub const METADATA_FILE: &str = "metadata";

const GLOBAL_SECTION: &str = "global";
const DEVICE_SECTION: &str = "device 1";

/// Bytes per logic sample row for `logic_channels` channels
pub fn unit_size_for(logic_channels: usize) -> usize {
    logic_channels.div_ceil(8)
}

/// Stream numbering derived from the channel catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveLayout {
    /// Logic channels in the catalog, enabled or not
    pub logic_channels: usize,
    /// Enabled logic channels
    pub enabled_logic_channels: usize,
    /// Bytes per logic sample row
    pub unit_size: usize,
    /// Stream number of the first analog channel
    pub first_analog_stream_number: usize,
    /// Analog slot to global channel index
    pub index_map: ChannelIndexMap,
}

impl ArchiveLayout {
    /// Derive the layout of a catalog.
    ///
    /// Readers recover the first analog stream number from `total probes`,
    /// so analog numbering continues after the last logic channel whether or
    /// not that channel is enabled.
    pub fn from_catalog(catalog: &ChannelCatalog) -> Self {
        let logic_channels = catalog.logic_count();
        let enabled_logic_channels = catalog.enabled_logic_count();
        let first_analog_stream_number = if enabled_logic_channels > 0 {
            logic_channels + 1
        } else {
            1
        };
        let index_map = ChannelIndexMap::new(
            catalog
                .enabled()
                .filter(|ch| ch.kind == ChannelKind::Analog)
                .map(|ch| ch.index)
                .collect(),
        );

        Self {
            logic_channels,
            enabled_logic_channels,
            unit_size: unit_size_for(logic_channels),
            first_analog_stream_number,
            index_map,
        }
    }

    /// Number of enabled analog channels
    pub fn analog_channel_count(&self) -> usize {
        self.index_map.len()
    }

    /// Build the metadata record for this layout
    pub fn metadata(
        &self,
        catalog: &ChannelCatalog,
        sample_rate: Option<u64>,
        producer_version: &str,
    ) -> KeyFile {
        let mut meta = KeyFile::new();
        meta.set_string(GLOBAL_SECTION, "sigrok version", producer_version);

        if self.enabled_logic_channels > 0 {
            meta.set_string(DEVICE_SECTION, "capturefile", LOGIC_STREAM);
            meta.set_integer(DEVICE_SECTION, "total probes", self.logic_channels);
        }
        meta.set_string(
            DEVICE_SECTION,
            "samplerate",
            &samplerate_string(sample_rate.unwrap_or(0)),
        );
        meta.set_integer(DEVICE_SECTION, "total analog", self.analog_channel_count());

        let mut slot = 0;
        for ch in catalog.enabled() {
            let key = match ch.kind {
                ChannelKind::Logic => format!("probe{}", ch.index + 1),
                ChannelKind::Analog => {
                    slot += 1;
                    format!("analog{}", self.first_analog_stream_number + slot - 1)
                }
            };
            meta.set_string(DEVICE_SECTION, &key, &ch.name);
        }

        if self.unit_size > 0 {
            meta.set_integer(DEVICE_SECTION, "unitsize", self.unit_size);
        }
        meta
    }
}

/// Everything a live archive owns
#[derive(Debug)]
pub struct ArchiveState {
    sample_rate: Option<u64>,
    layout: ArchiveLayout,
    writer: ChunkWriter,
    logic: LogicAccumulator,
    analog: AnalogAccumulatorSet,
}

impl ArchiveState {
    /// Create the archive directory and its fixed files.
    ///
    /// The directory must not exist yet; its parent must. Any failure leaves
    /// whatever was already created on disk and returns the error.
    pub fn create(
        target: &Path,
        catalog: &ChannelCatalog,
        sample_rate: Option<u64>,
        config: &ArchiveConfig,
    ) -> Result<Self> {
        fs::create_dir(target).map_err(|source| {
            error!(path = %target.display(), error = %source, "Could not create directory");
            SrdirError::DirectoryCreate {
                path: target.to_path_buf(),
                source,
            }
        })?;

        write_file(&target.join(VERSION_FILE), config.format_version.as_bytes())?;

        let layout = ArchiveLayout::from_catalog(catalog);
        let logic = LogicAccumulator::new(layout.unit_size, config.chunk_bytes)?;
        let analog = AnalogAccumulatorSet::new(
            layout.index_map.clone(),
            layout.first_analog_stream_number,
            config.chunk_bytes,
        )?;

        let meta = layout.metadata(catalog, sample_rate, &config.producer_version);
        write_file(&target.join(METADATA_FILE), meta.to_data().as_bytes())?;

        info!(
            path = %target.display(),
            unit_size = layout.unit_size,
            logic_channels = layout.logic_channels,
            analog_channels = layout.analog_channel_count(),
            "created archive directory"
        );

        Ok(Self {
            sample_rate,
            layout,
            writer: ChunkWriter::new(target),
            logic,
            analog,
        })
    }

    /// Archive directory
    pub fn dir(&self) -> &Path {
        self.writer.dir()
    }

    /// Sample rate recorded in the metadata
    pub fn sample_rate(&self) -> Option<u64> {
        self.sample_rate
    }

    /// Stream layout
    pub fn layout(&self) -> &ArchiveLayout {
        &self.layout
    }

    /// Logic accumulator
    pub fn logic(&self) -> &LogicAccumulator {
        &self.logic
    }

    /// Analog accumulators
    pub fn analog(&self) -> &AnalogAccumulatorSet {
        &self.analog
    }

    /// Chunk writer of this archive
    pub fn writer(&self) -> &ChunkWriter {
        &self.writer
    }

    /// Queue logic rows, see [`LogicAccumulator::queue`]
    pub fn queue_logic(
        &mut self,
        data: &[u8],
        unit_size: usize,
        force_flush: bool,
    ) -> Result<usize> {
        self.logic
            .queue(data, unit_size, force_flush, &mut self.writer)
    }

    /// Queue an analog packet, see [`AnalogAccumulatorSet::queue`]
    pub fn queue_analog(
        &mut self,
        payload: Option<&AnalogPayload>,
        force_flush: bool,
    ) -> Result<usize> {
        self.analog.queue(payload, force_flush, &mut self.writer)
    }

    /// Drain both accumulator families
    pub fn flush(&mut self) -> Result<()> {
        self.queue_logic(&[], 0, true)?;
        self.queue_analog(None, true)?;
        Ok(())
    }
}

fn write_file(path: &Path, contents: &[u8]) -> Result<()> {
    fs::write(path, contents).map_err(|source| {
        error!(path = %path.display(), error = %source, "Error saving into directory");
        SrdirError::MetadataWrite {
            path: path.to_path_buf(),
            source,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::Channel;
    use tempfile::TempDir;

    fn small_config() -> ArchiveConfig {
        ArchiveConfig {
            chunk_bytes: 64,
            producer_version: "0.6.0".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn unit_size_rounds_up_to_bytes() {
        assert_eq!(unit_size_for(0), 0);
        assert_eq!(unit_size_for(1), 1);
        assert_eq!(unit_size_for(8), 1);
        assert_eq!(unit_size_for(9), 2);
        assert_eq!(unit_size_for(16), 2);
    }

    #[test]
    fn analog_numbering_follows_all_logic_channels() {
        let catalog = ChannelCatalog::from_channels(vec![
            Channel::logic(0, "D0").enabled(false),
            Channel::logic(1, "D1"),
            Channel::logic(2, "D2").enabled(false),
            Channel::analog(3, "A0"),
            Channel::analog(4, "A1").enabled(false),
            Channel::analog(5, "A2"),
        ]);
        let layout = ArchiveLayout::from_catalog(&catalog);
        assert_eq!(layout.first_analog_stream_number, 4);
        assert_eq!(layout.unit_size, 1);
        assert_eq!(layout.index_map, ChannelIndexMap::new(vec![3, 5]));

        let meta = layout.metadata(&catalog, Some(20_000), "0.6.0");
        assert_eq!(meta.get(DEVICE_SECTION, "probe2"), Some("D1"));
        assert_eq!(meta.get(DEVICE_SECTION, "analog4"), Some("A0"));
        assert_eq!(meta.get(DEVICE_SECTION, "analog5"), Some("A2"));
        assert_eq!(meta.get(DEVICE_SECTION, "samplerate"), Some("20 kHz"));
    }

    #[test]
    fn disabled_logic_keeps_unit_size_but_drops_probe_keys() {
        let catalog = ChannelCatalog::from_channels(vec![
            Channel::logic(0, "D0").enabled(false),
            Channel::analog(1, "A0"),
        ]);
        let layout = ArchiveLayout::from_catalog(&catalog);
        assert_eq!(layout.first_analog_stream_number, 1);
        assert_eq!(layout.unit_size, 1);

        let meta = layout.metadata(&catalog, None, "0.6.0");
        assert_eq!(
            meta.keys(DEVICE_SECTION),
            vec!["samplerate", "total analog", "analog1", "unitsize"]
        );
        assert_eq!(meta.get(DEVICE_SECTION, "samplerate"), Some("0 Hz"));
    }

    #[test]
    fn analog_only_archive_has_no_unitsize() {
        let catalog = ChannelCatalog::from_channels(vec![Channel::analog(0, "CH1")]);
        let meta = ArchiveLayout::from_catalog(&catalog).metadata(&catalog, Some(1), "x");
        assert_eq!(meta.get(DEVICE_SECTION, "unitsize"), None);
        assert_eq!(meta.get(DEVICE_SECTION, "total analog"), Some("1"));
    }

    #[test]
    fn create_writes_version_and_metadata() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("session");
        let catalog = ChannelCatalog::from_channels(vec![
            Channel::logic(0, "D0"),
            Channel::analog(1, "A0"),
        ]);

        let state = ArchiveState::create(&target, &catalog, Some(1_000_000), &small_config())
            .unwrap();

        assert_eq!(fs::read(target.join(VERSION_FILE)).unwrap(), b"2");
        let meta = fs::read_to_string(target.join(METADATA_FILE)).unwrap();
        assert_eq!(
            meta,
            "[global]\nsigrok version=0.6.0\n\n[device 1]\ncapturefile=logic-1\n\
             total probes=1\nsamplerate=1 MHz\ntotal analog=1\nprobe1=D0\nanalog2=A0\nunitsize=1\n"
        );
        assert_eq!(state.logic().buffer().capacity(), 64);
        assert_eq!(state.analog().buffer(0).unwrap().capacity(), 16);
    }

    #[test]
    fn create_fails_on_existing_directory() {
        let temp_dir = TempDir::new().unwrap();
        let catalog = ChannelCatalog::from_channels(vec![Channel::logic(0, "D0")]);
        let err = ArchiveState::create(temp_dir.path(), &catalog, None, &small_config())
            .unwrap_err();
        assert!(matches!(err, SrdirError::DirectoryCreate { .. }));
    }

    #[test]
    fn metadata_write_failure_keeps_os_cause() {
        use std::error::Error as _;

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("gone").join(METADATA_FILE);
        let err = write_file(&path, b"[global]\n").unwrap_err();

        assert!(err.is_fatal());
        assert!(err.source().is_some());
        match err {
            SrdirError::MetadataWrite { path: failed, source } => {
                assert_eq!(failed, path);
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
