//! Channel catalog snapshot and the device collaborator it is taken from.
//!
//! The acquisition device owns the live channel list. The archive only needs
//! an immutable view of it, captured once when the archive directory is
//! created, so later changes to the device do not affect stream naming.

use serde::{Deserialize, Serialize};

/// Kind of an acquisition channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelKind {
    /// Digital channel, packed several per byte in a logic sample row
    Logic,
    /// Channel carrying float-convertible sample values
    Analog,
}

/// One channel as described by the acquisition device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    /// Global channel index on the device (0-based)
    pub index: usize,
    /// Channel kind
    pub kind: ChannelKind,
    /// Whether the channel takes part in the acquisition
    pub enabled: bool,
    /// User-visible channel name
    pub name: String,
}

impl Channel {
    /// Create an enabled logic channel
    pub fn logic(index: usize, name: impl Into<String>) -> Self {
        Self {
            index,
            kind: ChannelKind::Logic,
            enabled: true,
            name: name.into(),
        }
    }

    /// Create an enabled analog channel
    pub fn analog(index: usize, name: impl Into<String>) -> Self {
        Self {
            index,
            kind: ChannelKind::Analog,
            enabled: true,
            name: name.into(),
        }
    }

    /// Set the enabled flag
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Source of the channel list and configured sample rate.
///
/// Implemented by whatever drives the acquisition: a hardware driver, an
/// input file reader, or [`StaticDevice`] in tests and demos.
pub trait AcquisitionDevice {
    /// Channels in device enumeration order
    fn channels(&self) -> Vec<Channel>;

    /// Currently configured sample rate in Hz, if the device can report one
    fn sample_rate(&self) -> Option<u64>;
}

/// Device with a fixed channel list and sample rate
#[derive(Debug, Clone, Default)]
pub struct StaticDevice {
    channels: Vec<Channel>,
    sample_rate: Option<u64>,
}

impl StaticDevice {
    /// Create a device from a channel list
    pub fn new(channels: Vec<Channel>) -> Self {
        Self {
            channels,
            sample_rate: None,
        }
    }

    /// Report a configured sample rate
    pub fn with_sample_rate(mut self, rate: u64) -> Self {
        self.sample_rate = Some(rate);
        self
    }
}

impl AcquisitionDevice for StaticDevice {
    fn channels(&self) -> Vec<Channel> {
        self.channels.clone()
    }

    fn sample_rate(&self) -> Option<u64> {
        self.sample_rate
    }
}

/// Read-only channel list captured at archive initialization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelCatalog {
    channels: Vec<Channel>,
}

impl ChannelCatalog {
    /// Snapshot the channel list of a device
    pub fn snapshot<D: AcquisitionDevice + ?Sized>(device: &D) -> Self {
        Self::from_channels(device.channels())
    }

    /// Build a catalog from an explicit channel list
    pub fn from_channels(channels: Vec<Channel>) -> Self {
        Self { channels }
    }

    /// All channels in enumeration order
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// Enabled channels in enumeration order
    pub fn enabled(&self) -> impl Iterator<Item = &Channel> {
        self.channels.iter().filter(|ch| ch.enabled)
    }

    /// Number of logic channels, enabled or not
    pub fn logic_count(&self) -> usize {
        self.count(ChannelKind::Logic, false)
    }

    /// Number of enabled logic channels
    pub fn enabled_logic_count(&self) -> usize {
        self.count(ChannelKind::Logic, true)
    }

    /// Number of enabled analog channels
    pub fn enabled_analog_count(&self) -> usize {
        self.count(ChannelKind::Analog, true)
    }

    fn count(&self, kind: ChannelKind, enabled_only: bool) -> usize {
        self.channels
            .iter()
            .filter(|ch| ch.kind == kind && (ch.enabled || !enabled_only))
            .count()
    }
}
