//! Sample accumulators.
//!
//! Samples arrive in bursts of arbitrary size. Each stream collects them in
//! a buffer of fixed capacity and hands the buffer to the [`ChunkWriter`]
//! whenever it is full and more input is waiting, so every chunk file except
//! the last of a stream holds exactly one buffer's worth of samples.
//!
//! - [`LogicAccumulator`]: one buffer of packed logic rows, `unit_size`
//!   bytes per sample.
//! - [`AnalogAccumulatorSet`]: one `f32` buffer per enabled analog channel,
//!   addressed through a [`ChannelIndexMap`].

use std::mem::size_of;

use bytemuck::Pod;
use tracing::{debug, warn};

use crate::analog::{self, AnalogPayload};
use crate::chunk::{analog_stream, ChunkWriter, LOGIC_STREAM};
use crate::error::{Result, SrdirError};

/// Fixed-capacity buffer of one stream.
///
/// A sample is `unit_width` consecutive elements of `T`; capacity and fill
/// are counted in samples. The backing vector is reserved once and never
/// grows past `capacity * unit_width` elements.
#[derive(Debug)]
pub struct ChunkAccumulator<T> {
    samples: Vec<T>,
    unit_width: usize,
    capacity: usize,
    next_chunk: u32,
}

impl<T: Pod> ChunkAccumulator<T> {
    /// Reserve a buffer of `capacity` samples of `unit_width` elements.
    ///
    /// A zero `unit_width` yields an inert buffer that accepts and drops
    /// everything. Otherwise the capacity is at least one sample.
    pub fn allocate(unit_width: usize, capacity: usize) -> Result<Self> {
        let capacity = if unit_width == 0 { 0 } else { capacity.max(1) };
        let elements = capacity * unit_width;

        let mut samples = Vec::new();
        samples
            .try_reserve_exact(elements)
            .map_err(|source| SrdirError::Allocation {
                bytes: elements * size_of::<T>(),
                source,
            })?;

        Ok(Self {
            samples,
            unit_width,
            capacity,
            next_chunk: 1,
        })
    }

    /// Capacity in samples
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Samples currently buffered
    pub fn fill(&self) -> usize {
        if self.unit_width == 0 {
            0
        } else {
            self.samples.len() / self.unit_width
        }
    }

    /// Number the next chunk file of this stream will get
    pub fn next_chunk_number(&self) -> u32 {
        self.next_chunk
    }

    /// Append whole samples from `input`, flushing each time the buffer is
    /// full and input remains. A trailing partial sample is dropped.
    ///
    /// With `force_flush` any residue is written once all input is queued,
    /// leaving the buffer empty. Returns the number of samples accepted.
    pub fn queue(
        &mut self,
        input: &[T],
        force_flush: bool,
        stream: &str,
        writer: &mut ChunkWriter,
    ) -> Result<usize> {
        if self.unit_width == 0 {
            return Ok(0);
        }

        let whole = input.len() / self.unit_width * self.unit_width;
        let mut rest = &input[..whole];
        while !rest.is_empty() {
            let room = self.capacity - self.fill();
            if room == 0 {
                self.flush(stream, writer)?;
                continue;
            }
            let take = room.min(rest.len() / self.unit_width) * self.unit_width;
            let (head, tail) = rest.split_at(take);
            self.samples.extend_from_slice(head);
            rest = tail;
        }

        if force_flush {
            self.flush(stream, writer)?;
        }

        Ok(whole / self.unit_width)
    }

    /// Write the buffered samples as the next chunk of `stream`.
    ///
    /// Returns `false` without touching the filesystem when the buffer is
    /// empty. The buffer is only cleared once the chunk is on disk.
    pub fn flush(&mut self, stream: &str, writer: &mut ChunkWriter) -> Result<bool> {
        if self.samples.is_empty() {
            return Ok(false);
        }
        writer.write_chunk(stream, &mut self.next_chunk, bytemuck::cast_slice(&self.samples))?;
        self.samples.clear();
        Ok(true)
    }
}

/// Accumulator of packed logic sample rows
#[derive(Debug)]
pub struct LogicAccumulator {
    unit_size: usize,
    buffer: ChunkAccumulator<u8>,
}

impl LogicAccumulator {
    /// Allocate a logic buffer of `chunk_bytes` for rows of `unit_size` bytes
    pub fn new(unit_size: usize, chunk_bytes: usize) -> Result<Self> {
        let capacity = if unit_size == 0 { 0 } else { chunk_bytes / unit_size };
        Ok(Self {
            unit_size,
            buffer: ChunkAccumulator::allocate(unit_size, capacity)?,
        })
    }

    /// Bytes per sample row
    pub fn unit_size(&self) -> usize {
        self.unit_size
    }

    /// Underlying buffer
    pub fn buffer(&self) -> &ChunkAccumulator<u8> {
        &self.buffer
    }

    /// Queue logic bytes declared with `source_unit_size` bytes per row.
    ///
    /// A non-empty batch with a foreign unit size is rejected whole. A byte
    /// count that is not a multiple of the unit size is tolerated with a
    /// warning; the partial row is dropped. Returns the rows accepted.
    pub fn queue(
        &mut self,
        data: &[u8],
        source_unit_size: usize,
        force_flush: bool,
        writer: &mut ChunkWriter,
    ) -> Result<usize> {
        debug!(unit_size = source_unit_size, length = data.len(), force_flush, "queue logic");

        if !data.is_empty() && source_unit_size != self.unit_size {
            warn!(
                expected = self.unit_size,
                actual = source_unit_size,
                "Unexpected unit size, discarding logic data"
            );
            return Err(SrdirError::UnitSizeMismatch {
                expected: self.unit_size,
                actual: source_unit_size,
            });
        }
        if source_unit_size > 0 && data.len() % source_unit_size != 0 {
            warn!(
                length = data.len(),
                unit_size = source_unit_size,
                "Chunk size not a multiple of the unit size"
            );
        }

        self.buffer.queue(data, force_flush, LOGIC_STREAM, writer)
    }
}

/// Maps analog accumulator slots to global channel indices.
///
/// Slot `i` belongs to the `i`-th enabled analog channel in catalog order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelIndexMap {
    slots: Vec<usize>,
}

impl ChannelIndexMap {
    /// Build from global indices in slot order
    pub fn new(global_indices: Vec<usize>) -> Self {
        Self {
            slots: global_indices,
        }
    }

    /// Slot of the channel with the given global index
    pub fn slot_of(&self, global_index: usize) -> Option<usize> {
        self.slots.iter().position(|&idx| idx == global_index)
    }

    /// Global index of the channel in `slot`
    pub fn global_index(&self, slot: usize) -> Option<usize> {
        self.slots.get(slot).copied()
    }

    /// Number of slots
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether there are no analog channels
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[derive(Debug)]
struct AnalogChannelBuffer {
    stream: String,
    buffer: ChunkAccumulator<f32>,
}

/// One `f32` accumulator per enabled analog channel
#[derive(Debug)]
pub struct AnalogAccumulatorSet {
    map: ChannelIndexMap,
    first_stream_number: usize,
    channels: Vec<AnalogChannelBuffer>,
}

impl AnalogAccumulatorSet {
    /// Allocate one buffer of `chunk_bytes` per slot of `map`.
    ///
    /// Slot `i` writes the stream numbered `first_stream_number + i`.
    pub fn new(map: ChannelIndexMap, first_stream_number: usize, chunk_bytes: usize) -> Result<Self> {
        let capacity = chunk_bytes / size_of::<f32>();
        let channels = (0..map.len())
            .map(|slot| {
                Ok(AnalogChannelBuffer {
                    stream: analog_stream(first_stream_number + slot),
                    buffer: ChunkAccumulator::allocate(1, capacity)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            map,
            first_stream_number,
            channels,
        })
    }

    /// Slot to channel mapping
    pub fn index_map(&self) -> &ChannelIndexMap {
        &self.map
    }

    /// Stream number of the first analog channel
    pub fn first_stream_number(&self) -> usize {
        self.first_stream_number
    }

    /// Buffer of a slot
    pub fn buffer(&self, slot: usize) -> Option<&ChunkAccumulator<f32>> {
        self.channels.get(slot).map(|ch| &ch.buffer)
    }

    /// Queue an analog packet, or drain every buffer.
    ///
    /// `None` together with `force_flush` is the end-of-stream drain: each
    /// buffer holding samples is written out. Otherwise the payload must name
    /// exactly one channel of the map. Returns the samples accepted.
    pub fn queue(
        &mut self,
        payload: Option<&AnalogPayload>,
        force_flush: bool,
        writer: &mut ChunkWriter,
    ) -> Result<usize> {
        let Some(payload) = payload else {
            if force_flush {
                self.flush_all(writer)?;
            }
            return Ok(0);
        };

        // TODO: split packets covering several channels into per-slot queues
        let [index] = payload.channels[..] else {
            return Err(SrdirError::UnsupportedMultiChannelAnalog {
                channels: payload.channels.len(),
            });
        };
        let slot = self
            .map
            .slot_of(index)
            .ok_or(SrdirError::UnknownChannel { index })?;

        let values = analog::to_float(payload)?;
        let channel = &mut self.channels[slot];
        debug!(
            stream = %channel.stream,
            samples = values.len(),
            force_flush,
            "queue analog"
        );
        channel
            .buffer
            .queue(&values, force_flush, &channel.stream, writer)
    }

    /// Samples buffered across all slots and not yet written
    pub fn pending_samples(&self) -> usize {
        self.channels.iter().map(|ch| ch.buffer.fill()).sum()
    }

    /// Write out every buffer that holds samples
    pub fn flush_all(&mut self, writer: &mut ChunkWriter) -> Result<()> {
        for channel in &mut self.channels {
            channel.buffer.flush(&channel.stream, writer)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn chunk_names(dir: &std::path::Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn logic_capacity_from_unit_size() {
        let acc = LogicAccumulator::new(3, 32).unwrap();
        assert_eq!(acc.buffer().capacity(), 10);
        assert_eq!(acc.buffer().next_chunk_number(), 1);

        let none = LogicAccumulator::new(0, 32).unwrap();
        assert_eq!(none.buffer().capacity(), 0);
    }

    #[test]
    fn wide_unit_gets_one_sample_capacity() {
        let acc = LogicAccumulator::new(16, 8).unwrap();
        assert_eq!(acc.buffer().capacity(), 1);
    }

    #[test]
    fn logic_flushes_full_buffer_only_when_more_input_waits() {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = ChunkWriter::new(temp_dir.path());
        let mut acc = LogicAccumulator::new(2, 8).unwrap();

        // exactly one buffer: stays in memory
        acc.queue(&[0, 1, 2, 3, 4, 5, 6, 7], 2, false, &mut writer).unwrap();
        assert_eq!(acc.buffer().fill(), 4);
        assert!(chunk_names(temp_dir.path()).is_empty());

        // one more row pushes the full buffer out
        acc.queue(&[8, 9], 2, false, &mut writer).unwrap();
        assert_eq!(chunk_names(temp_dir.path()), vec!["logic-1-1"]);
        assert_eq!(acc.buffer().fill(), 1);

        acc.queue(&[], 0, true, &mut writer).unwrap();
        assert_eq!(acc.buffer().fill(), 0);
        assert_eq!(
            std::fs::read(temp_dir.path().join("logic-1-2")).unwrap(),
            vec![8, 9]
        );
    }

    #[test]
    fn logic_rejects_foreign_unit_size() {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = ChunkWriter::new(temp_dir.path());
        let mut acc = LogicAccumulator::new(1, 8).unwrap();

        let err = acc.queue(&[1, 2], 2, true, &mut writer).unwrap_err();
        assert!(matches!(
            err,
            SrdirError::UnitSizeMismatch {
                expected: 1,
                actual: 2
            }
        ));
        assert_eq!(acc.buffer().fill(), 0);
        assert!(chunk_names(temp_dir.path()).is_empty());
    }

    #[test]
    fn logic_without_channels_drops_data() {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = ChunkWriter::new(temp_dir.path());
        let mut acc = LogicAccumulator::new(0, 8).unwrap();

        assert_eq!(acc.queue(&[1, 2, 3], 0, true, &mut writer).unwrap(), 0);
        assert!(chunk_names(temp_dir.path()).is_empty());
    }

    #[test]
    fn forced_flush_on_empty_buffer_writes_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = ChunkWriter::new(temp_dir.path());
        let mut acc = LogicAccumulator::new(1, 8).unwrap();

        acc.queue(&[7], 1, true, &mut writer).unwrap();
        acc.queue(&[], 0, true, &mut writer).unwrap();
        acc.queue(&[], 0, true, &mut writer).unwrap();
        assert_eq!(chunk_names(temp_dir.path()), vec!["logic-1-1"]);
        assert_eq!(writer.chunks_written(), 1);
    }

    #[test]
    fn index_map_lookup() {
        let map = ChannelIndexMap::new(vec![4, 2, 9]);
        assert_eq!(map.slot_of(2), Some(1));
        assert_eq!(map.slot_of(3), None);
        assert_eq!(map.global_index(2), Some(9));
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn analog_routes_by_global_index() {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = ChunkWriter::new(temp_dir.path());
        let mut set = AnalogAccumulatorSet::new(ChannelIndexMap::new(vec![5, 7]), 4, 16).unwrap();
        assert_eq!(set.first_stream_number(), 4);
        assert_eq!(set.index_map().global_index(1), Some(7));

        set.queue(Some(&AnalogPayload::from_f32(7, &[1.0, 2.0])), false, &mut writer)
            .unwrap();
        assert_eq!(set.buffer(0).unwrap().fill(), 0);
        assert_eq!(set.buffer(1).unwrap().fill(), 2);

        assert_eq!(set.pending_samples(), 2);

        set.queue(None, true, &mut writer).unwrap();
        assert_eq!(set.pending_samples(), 0);
        assert_eq!(chunk_names(temp_dir.path()), vec!["analog-1-5-1"]);
        let bytes = std::fs::read(temp_dir.path().join("analog-1-5-1")).unwrap();
        let expected: Vec<u8> = [1.0f32, 2.0].iter().flat_map(|v| v.to_ne_bytes()).collect();
        assert_eq!(bytes, expected);
    }

    #[test]
    fn analog_rejects_unknown_and_multi_channel_packets() {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = ChunkWriter::new(temp_dir.path());
        let mut set = AnalogAccumulatorSet::new(ChannelIndexMap::new(vec![1]), 1, 16).unwrap();

        let err = set
            .queue(Some(&AnalogPayload::from_f32(3, &[1.0])), true, &mut writer)
            .unwrap_err();
        assert!(matches!(err, SrdirError::UnknownChannel { index: 3 }));

        let mut multi = AnalogPayload::from_f32(1, &[1.0, 2.0]);
        multi.channels.push(2);
        let err = set.queue(Some(&multi), true, &mut writer).unwrap_err();
        assert!(matches!(
            err,
            SrdirError::UnsupportedMultiChannelAnalog { channels: 2 }
        ));

        assert!(chunk_names(temp_dir.path()).is_empty());
    }

    #[test]
    fn analog_chunk_count_is_ceiling_of_capacity() {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = ChunkWriter::new(temp_dir.path());
        // 3 floats per chunk
        let mut set = AnalogAccumulatorSet::new(ChannelIndexMap::new(vec![0]), 1, 12).unwrap();

        let samples: Vec<f32> = (0..10).map(|i| i as f32).collect();
        for burst in samples.chunks(4) {
            set.queue(Some(&AnalogPayload::from_f32(0, burst)), false, &mut writer)
                .unwrap();
        }
        set.queue(None, true, &mut writer).unwrap();

        assert_eq!(
            chunk_names(temp_dir.path()),
            vec!["analog-1-1-1", "analog-1-1-2", "analog-1-1-3", "analog-1-1-4"]
        );
        let last = std::fs::read(temp_dir.path().join("analog-1-1-4")).unwrap();
        assert_eq!(last, 9.0f32.to_ne_bytes().to_vec());
    }
}
