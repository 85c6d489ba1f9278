
//! Write the pixels of an image as compressed scan line chunks.
//!
//! The entry point is `ScanLineWriter`. It writes a complete file:
//! magic number, version flags, header, offset table, and then
//! one chunk per scan line block. The offset table is reserved
//! with zero placeholders and patched once the last chunk is written.

use std::io::{Write, Seek};
use std::convert::TryFrom;

use crate::io::{Data, Tracking};
use crate::error::*;
use crate::math::Vec2;
use crate::half;
use crate::chunk::ScanLineBlock;
use crate::meta::{MetaData, magic_number, calculate_block_size};
use crate::meta::header::{Header, Blocks};
use crate::meta::attribute::{Text, SampleType, LineOrder};
use ::half::f16;


/// A borrowed buffer of samples, one of the supported in-memory sample types.
#[derive(Debug, Clone, Copy)]
pub enum SampleSlice<'s> {

    /// 32-bit float samples.
    F32(&'s [f32]),

    /// 16-bit float samples.
    F16(&'s [f16]),

    /// 8-bit integer samples, widened on write.
    U8(&'s [u8]),
}

/// Addresses the samples of a single channel inside a borrowed buffer.
///
/// The sample for the pixel at the absolute position `(x, y)` is found at the
/// buffer index `base_offset + (y / y_sampling) * y_stride + (x / x_sampling) * x_stride`.
/// Strides are counted in samples, not bytes, and may be negative.
/// Positions outside the buffer produce the fill value.
#[derive(Debug, Clone, Copy)]
pub struct PixelSource<'s> {
    samples: Option<SampleSlice<'s>>,
    base_offset: i64,
    x_stride: i64,
    y_stride: i64,
    sampling: Vec2<usize>,
    fill_value: f64,
}

/// Maps channel names to the memory holding their samples.
/// Channels are kept sorted by name, the order in which chunks are packed.
#[derive(Debug, Default)]
pub struct FrameBuffer<'s> {
    channels: Vec<(Text, PixelSource<'s>)>,
}

/// One sample, loaded from a `SampleSlice`.
#[derive(Debug, Clone, Copy)]
enum Sample {
    F32(f32),
    F16(f16),
    U8(u8),
}


impl<'s> PixelSource<'s> {

    /// Create a source addressing the specified buffer.
    /// Sampling rates default to `(1, 1)` and the fill value to zero.
    pub fn new(samples: SampleSlice<'s>, base_offset: i64, x_stride: i64, y_stride: i64) -> Self {
        Self {
            samples: Some(samples),
            base_offset, x_stride, y_stride,
            sampling: Vec2(1, 1),
            fill_value: 0.0,
        }
    }

    /// Create a source without a buffer that produces
    /// the specified value for every pixel.
    pub fn filled(fill_value: f64) -> Self {
        Self {
            samples: None,
            base_offset: 0, x_stride: 0, y_stride: 0,
            sampling: Vec2(1, 1),
            fill_value,
        }
    }

    /// Set the subsampling rates used when addressing the buffer.
    pub fn with_sampling(self, sampling: impl Into<Vec2<usize>>) -> Self {
        Self { sampling: sampling.into(), ..self }
    }

    /// Set the value used for pixels outside the buffer.
    pub fn with_fill_value(self, fill_value: f64) -> Self {
        Self { fill_value, ..self }
    }

    /// Whether the samples of this source can be converted to the specified type.
    fn supports(&self, sample_type: SampleType) -> bool {
        match (sample_type, self.samples) {
            (SampleType::F16, Some(SampleSlice::U8(_))) => false,
            (SampleType::U32, Some(SampleSlice::F16(_))) => false,
            (SampleType::U32, Some(SampleSlice::F32(_))) => false,
            _ => true,
        }
    }

    /// Load the sample for the absolute pixel position.
    /// Returns `None` where the position misses the buffer.
    fn sample_at(&self, x: i64, y: i64) -> Option<Sample> {
        let samples = self.samples?;

        let index = self.base_offset
            + y.div_euclid(self.sampling.y() as i64) * self.y_stride
            + x.div_euclid(self.sampling.x() as i64) * self.x_stride;

        let index = usize::try_from(index).ok()?;

        Some(match samples {
            SampleSlice::F32(values) => Sample::F32(*values.get(index)?),
            SampleSlice::F16(values) => Sample::F16(*values.get(index)?),
            SampleSlice::U8(values) => Sample::U8(*values.get(index)?),
        })
    }
}


impl<'s> FrameBuffer<'s> {

    /// Create an empty frame buffer.
    pub fn new() -> Self {
        Self { channels: Vec::new() }
    }

    /// Add a channel to this frame buffer, replacing any previous
    /// source with the same name. Keeps the channels sorted by name.
    pub fn insert(&mut self, name: impl Into<Text>, source: PixelSource<'s>) {
        let name = name.into();

        match self.channels.binary_search_by(|(existing, _)| existing.as_slice().cmp(name.as_slice())) {
            Ok(index) => self.channels[index].1 = source,
            Err(index) => self.channels.insert(index, (name, source)),
        }
    }

    /// Add a channel to this frame buffer.
    pub fn with(mut self, name: impl Into<Text>, source: PixelSource<'s>) -> Self {
        self.insert(name, source);
        self
    }

    /// The source registered for the specified channel name, if any.
    pub fn get(&self, name: &Text) -> Option<&PixelSource<'s>> {
        self.channels
            .binary_search_by(|(existing, _)| existing.as_slice().cmp(name.as_slice()))
            .ok().map(|index| &self.channels[index].1)
    }
}


/// The stages of writing a file, in the order they occur.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum WriterState {

    /// No byte has been written yet.
    Fresh,

    /// Magic number and version flags have been written.
    VersionWritten,

    /// The header attributes have been written.
    HeaderWritten,

    /// The offset table placeholder is reserved and chunks are being written.
    WritingChunks,

    /// All chunks are written and the offset table is patched.
    Done,
}

/// Writes a single-part scan line image to a seekable byte sink.
///
/// Pixels are supplied in one or more `write_pixels` calls, top to bottom.
/// Once all scan lines of the data window have been written,
/// the offset table is patched and the sink is flushed.
#[derive(Debug)]
pub struct ScanLineWriter<W: Write + Seek> {
    sink: Tracking<W>,
    meta: MetaData,
    state: WriterState,

    /// Absolute byte position of the offset table placeholder.
    offset_table_position: usize,

    /// Absolute byte position of each chunk written so far.
    chunk_offsets: Vec<u64>,

    /// Index of the next scan line to write, relative to the data window.
    next_line: usize,
}


impl<W: Write + Seek> ScanLineWriter<W> {

    /// Prepare to write the image described by the header into the sink.
    /// Does not write any byte yet. The header is validated pedantically,
    /// and tiled headers are rejected.
    pub fn new(sink: W, header: Header) -> Result<Self> {
        if header.blocks != Blocks::ScanLines {
            return Err(Error::invalid("scan line writing into a tiled image"));
        }

        if header.line_order == LineOrder::Decreasing {
            return Err(Error::unsupported("decreasing line order"));
        }

        let meta = MetaData::new(header);
        meta.validate(true)?;

        let chunk_count = meta.header.chunk_count;

        Ok(Self {
            sink: Tracking::new(sink),
            meta,
            state: WriterState::Fresh,
            offset_table_position: 0,
            chunk_offsets: Vec::with_capacity(chunk_count),
            next_line: 0,
        })
    }

    /// The header of the image being written.
    pub fn header(&self) -> &Header {
        &self.meta.header
    }

    /// Whether all scan lines of the data window have been written.
    pub fn is_complete(&self) -> bool {
        self.state == WriterState::Done
    }

    /// Unwrap the byte sink. The file in the sink is only
    /// complete if all scan lines have been written.
    pub fn into_inner(self) -> W {
        self.sink.into_inner()
    }

    /// Write the next `line_count` scan lines of the image, top to bottom.
    ///
    /// The magic number, version flags, header and offset table placeholder
    /// are written when required, so the first call produces the file preamble.
    /// Supplied lines must cover whole scan line blocks, except at the bottom
    /// edge of the image. After the last line, the offset table is
    /// patched and the sink is flushed.
    pub fn write_pixels(&mut self, frame_buffer: &FrameBuffer<'_>, line_count: usize) -> UnitResult {
        if self.state == WriterState::Done {
            return Err(Error::invalid("writing into completed image"));
        }

        // check sample conversion once per call instead of once per sample
        for channel in &self.meta.header.channels.list {
            if let Some(source) = frame_buffer.get(&channel.name) {
                if !source.supports(channel.sample_type) {
                    return Err(Error::unsupported(format!(
                        "sample conversion for channel `{}`", channel.name
                    )));
                }
            }
        }

        self.write_preamble()?;

        let height = self.meta.header.data_size.height();
        let lines_per_block = self.meta.header.scan_lines_per_block();
        let end_line = self.next_line + line_count;

        if end_line > height {
            return Err(Error::invalid("scan line count exceeding data window"));
        }

        // chunks are compressed as a whole, so lines must be supplied blockwise
        if end_line % lines_per_block != 0 && end_line != height {
            return Err(Error::invalid("scan line count not aligned to block size"));
        }

        let mut block_start = self.next_line;
        while block_start < end_line {
            let block_height = calculate_block_size(height, lines_per_block, block_start)?;

            let pixels = self.pack_block(frame_buffer, block_start, block_height)?;
            let compressed_pixels = self.meta.header.compression.compress_bytes(pixels)?;

            let y_coordinate = self.meta.header.data_position.y() + usize_to_i32(block_start);

            self.chunk_offsets.push(usize_to_u64(self.sink.byte_position()));
            ScanLineBlock { y_coordinate, compressed_pixels }.write(&mut self.sink)?;

            block_start += block_height;
        }

        self.next_line = end_line;

        if self.next_line == height {
            self.patch_offset_table()?;
            self.state = WriterState::Done;
        }

        Ok(())
    }

    /// Write all stages that precede the pixel chunks, if not already written.
    fn write_preamble(&mut self) -> UnitResult {
        if self.state == WriterState::Fresh {
            magic_number::write(&mut self.sink)?;
            self.meta.requirements.write(&mut self.sink)?;
            self.state = WriterState::VersionWritten;
        }

        if self.state == WriterState::VersionWritten {
            self.meta.header.write(&mut self.sink)?;
            self.state = WriterState::HeaderWritten;
        }

        if self.state == WriterState::HeaderWritten {
            self.offset_table_position = self.sink.byte_position();

            // reserve the offset table with placeholders,
            // as chunk positions are only known after compression
            let placeholders = vec![ 0_u64; self.meta.header.chunk_count ];
            u64::write_slice(&mut self.sink, &placeholders)?;

            self.state = WriterState::WritingChunks;
        }

        Ok(())
    }

    /// Pack the samples of all header channels for one scan line block,
    /// in ascending channel name order, line by line.
    fn pack_block(&self, frame_buffer: &FrameBuffer<'_>, block_start: usize, block_height: usize) -> Result<Vec<u8>> {
        let header = &self.meta.header;
        let width = header.data_size.width();
        let Vec2(x_position, y_position) = header.data_position;

        let mut bytes = Vec::with_capacity(header.max_block_byte_size());

        for line_index in block_start .. block_start + block_height {
            let y = y_position as i64 + line_index as i64;

            // channels are stored per line, sorted by name
            for channel in &header.channels.list {
                let Vec2(x_sampling, y_sampling) = channel.sampling;
                if y.rem_euclid(y_sampling as i64) != 0 { continue; }

                let source = frame_buffer.get(&channel.name);
                let fill = source.map_or(0.0, |source| source.fill_value);

                for sample_index in 0 .. width / x_sampling {
                    let x = x_position as i64 + (sample_index * x_sampling) as i64;
                    let sample = source.and_then(|source| source.sample_at(x, y));

                    match channel.sample_type {
                        SampleType::F16 => sample_to_f16(sample, fill).write(&mut bytes)?,
                        SampleType::F32 => sample_to_f32(sample, fill).write(&mut bytes)?,
                        SampleType::U32 => sample_to_u32(sample, fill).write(&mut bytes)?,
                    }
                }
            }
        }

        Ok(bytes)
    }

    /// Replace the offset table placeholders with the recorded chunk positions.
    fn patch_offset_table(&mut self) -> UnitResult {
        debug_assert_eq!(self.chunk_offsets.len(), self.meta.header.chunk_count, "chunk count bug");

        let end_position = self.sink.byte_position();

        self.sink.seek_write_to(self.offset_table_position)?;
        u64::write_slice(&mut self.sink, &self.chunk_offsets)?;

        self.sink.seek_write_to(end_position)?;
        self.sink.flush()?;
        Ok(())
    }
}


fn sample_to_f16(sample: Option<Sample>, fill: f64) -> f16 {
    match sample {
        Some(Sample::F16(value)) => value,
        Some(Sample::F32(value)) => half::to_f16(value),
        Some(Sample::U8(value)) => half::to_f16(value as f32), // rejected beforehand
        None => half::to_f16(fill as f32),
    }
}

fn sample_to_f32(sample: Option<Sample>, fill: f64) -> f32 {
    match sample {
        Some(Sample::F32(value)) => value,
        Some(Sample::F16(value)) => half::to_f32(value),
        Some(Sample::U8(value)) => value as f32,
        None => fill as f32,
    }
}

fn sample_to_u32(sample: Option<Sample>, fill: f64) -> u32 {
    match sample {
        Some(Sample::U8(value)) => value as u32,
        Some(Sample::F32(value)) => value as u32, // rejected beforehand
        Some(Sample::F16(value)) => half::to_f32(value) as u32, // rejected beforehand
        None => fill as u32,
    }
}


#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;
    use crate::compression::Compression;
    use crate::meta::attribute::{ChannelDescription, TileDescription, LevelMode};
    use crate::math::RoundingMode;

    fn tiny_header(sample_type: SampleType) -> Header {
        Header::new(
            Vec2(2, 2),
            smallvec![ ChannelDescription::named("G", sample_type) ],
        ).with_encoding(Compression::Uncompressed, LineOrder::Increasing)
    }

    #[test]
    fn tiled_header_is_rejected() {
        let mut header = tiny_header(SampleType::F32);
        header.blocks = Blocks::Tiles(TileDescription {
            tile_size: Vec2(16, 16),
            level_mode: LevelMode::Singular,
            rounding_mode: RoundingMode::Down,
        });
        header.chunk_count = crate::meta::compute_chunk_count(
            header.compression, header.data_size, header.blocks
        );

        assert!(matches!(
            ScanLineWriter::new(Cursor::new(Vec::new()), header),
            Err(Error::Invalid(_))
        ));
    }

    #[test]
    fn incompatible_samples_are_rejected() {
        let mut writer = ScanLineWriter::new(
            Cursor::new(Vec::new()),
            tiny_header(SampleType::U32)
        ).unwrap();

        let samples = [ 0.1_f32, 0.2, 0.3, 0.4 ];
        let frame_buffer = FrameBuffer::new()
            .with("G", PixelSource::new(SampleSlice::F32(&samples), 0, 1, 2));

        assert!(matches!(
            writer.write_pixels(&frame_buffer, 2),
            Err(Error::NotSupported(_))
        ));
    }

    #[test]
    fn completed_image_rejects_more_lines() {
        let mut writer = ScanLineWriter::new(
            Cursor::new(Vec::new()),
            tiny_header(SampleType::F32)
        ).unwrap();

        let samples = [ 0.1_f32, 0.2, 0.3, 0.4 ];
        let frame_buffer = FrameBuffer::new()
            .with("G", PixelSource::new(SampleSlice::F32(&samples), 0, 1, 2));

        writer.write_pixels(&frame_buffer, 2).unwrap();
        assert!(writer.is_complete());

        assert!(matches!(
            writer.write_pixels(&frame_buffer, 1),
            Err(Error::Invalid(_))
        ));
    }

    #[test]
    fn missing_channel_uses_fill_value() {
        let header = Header::new(
            Vec2(2, 1),
            smallvec![
                ChannelDescription::named("R", SampleType::F32),
                ChannelDescription::named("Z", SampleType::F32),
            ],
        ).with_encoding(Compression::Uncompressed, LineOrder::Increasing);

        let mut writer = ScanLineWriter::new(Cursor::new(Vec::new()), header).unwrap();

        let red = [ 1.0_f32, 2.0 ];
        let frame_buffer = FrameBuffer::new()
            .with("R", PixelSource::new(SampleSlice::F32(&red), 0, 1, 2))
            .with("Z", PixelSource::filled(0.5));

        writer.write_pixels(&frame_buffer, 1).unwrap();
        let bytes = writer.into_inner().into_inner();

        // the chunk is the last 8 + 16 bytes of the file: y, size, R line, Z line
        let chunk = &bytes[bytes.len() - 24 ..];
        assert_eq!(&chunk[.. 8], &[ 0, 0, 0, 0, 16, 0, 0, 0 ]);
        assert_eq!(&chunk[8 .. 16], &[ 1.0_f32.to_le_bytes(), 2.0_f32.to_le_bytes() ].concat()[..]);
        assert_eq!(&chunk[16 ..], &[ 0.5_f32.to_le_bytes(), 0.5_f32.to_le_bytes() ].concat()[..]);
    }

    #[test]
    fn negative_stride_flips_the_image() {
        let header = Header::new(
            Vec2(1, 2),
            smallvec![ ChannelDescription::named("Y", SampleType::F32) ],
        ).with_encoding(Compression::Uncompressed, LineOrder::Increasing);

        let mut writer = ScanLineWriter::new(Cursor::new(Vec::new()), header).unwrap();

        // bottom-up buffer: base offset points at the last line, y stride walks backwards
        let samples = [ 8.0_f32, 9.0 ];
        let frame_buffer = FrameBuffer::new()
            .with("Y", PixelSource::new(SampleSlice::F32(&samples), 1, 1, -1));

        writer.write_pixels(&frame_buffer, 2).unwrap();
        let bytes = writer.into_inner().into_inner();

        let pixels = &bytes[bytes.len() - 24 ..];
        assert_eq!(&pixels[8 .. 12], &9.0_f32.to_le_bytes());
        assert_eq!(&pixels[20 ..], &8.0_f32.to_le_bytes());
    }
}
