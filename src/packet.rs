//! Packets of the upstream acquisition feed.

use crate::analog::AnalogPayload;

/// Configuration key carried by a metadata packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigItem {
    /// Sample rate in Hz
    SampleRate(u64),
    /// Any other key, identified by name; ignored by the archive writer
    Other(String),
}

/// Packed logic samples
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicPayload {
    /// Bytes per sample row as declared by the producer
    pub unit_size: usize,
    /// Sample rows, `unit_size` bytes each
    pub data: Vec<u8>,
}

impl LogicPayload {
    /// Logic payload from raw rows
    pub fn new(unit_size: usize, data: Vec<u8>) -> Self {
        Self { unit_size, data }
    }
}

/// One packet of the acquisition feed, in arrival order
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    /// Start of the feed
    Header,
    /// Configuration changes announced by the device
    Meta(Vec<ConfigItem>),
    /// Logic samples
    Logic(LogicPayload),
    /// Analog samples of one channel
    Analog(AnalogPayload),
    /// Trigger position marker
    Trigger,
    /// Start of a frame of samples
    FrameBegin,
    /// End of a frame of samples
    FrameEnd,
    /// End of the feed
    End,
}

impl Packet {
    /// Metadata packet announcing a sample rate
    pub fn samplerate(rate: u64) -> Self {
        Packet::Meta(vec![ConfigItem::SampleRate(rate)])
    }

    /// Short name for log output
    pub fn kind(&self) -> &'static str {
        match self {
            Packet::Header => "header",
            Packet::Meta(_) => "meta",
            Packet::Logic(_) => "logic",
            Packet::Analog(_) => "analog",
            Packet::Trigger => "trigger",
            Packet::FrameBegin => "frame-begin",
            Packet::FrameEnd => "frame-end",
            Packet::End => "end",
        }
    }
}
