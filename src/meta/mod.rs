
//! Everything a file declares before its pixel data:
//! version requirements, the header, and the offset table.

pub mod attribute;
pub mod header;


use crate::io::*;
use crate::error::*;
use crate::math::*;
use self::attribute::*;
use self::header::{Header, Blocks};
use std::fs::File;
use std::io::BufReader;


/// The complete meta data of a file: the version requirements
/// and the header of the single image part.
#[derive(Debug, Clone, PartialEq)]
pub struct MetaData {

    /// Which features a reader must support to decode this file.
    pub requirements: Requirements,

    /// Describes the image and how its pixels are stored.
    pub header: Header,
}


/// Lists the absolute byte position of every pixel chunk in the file,
/// ordered by increasing scan line position. Readers can use it to load
/// any portion of the image without scanning the whole file.
// when the chunk count attribute is missing, the entry count
// is derived from the data window and the compression method
pub type OffsetTable = Vec<u64>;


/// The feature flags of a file, stored right after the magic number.
/// A reader inspects these to decide whether it can decode the file at all.
/// This implementation handles plain scan line images of version 2.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub struct Requirements {

    /// The file format version. Always written as 2.
    pub file_format_version: u8,

    /// Whether the single image part is tiled.
    /// Tiled meta data can be inspected, but tiled pixels are not decoded.
    pub is_single_layer_and_tiled: bool,

    /// Whether any name in the file is longer than 31 chars.
    /// No name may be longer than 255 chars either way.
    pub has_long_names: bool,

    /// Whether the file stores deep data. Never decoded by this implementation.
    pub has_deep_data: bool,

    /// Whether the file contains multiple image parts.
    /// Never decoded by this implementation.
    pub has_multiple_layers: bool,
}


/// The four bytes at the start of every file in this format.
/// Lets readers reject foreign files before parsing anything.
pub mod magic_number {
    use super::*;

    /// The fixed file signature.
    pub const BYTES: [u8; 4] = [0x76, 0x2f, 0x31, 0x01];

    /// Put the signature into the byte stream.
    pub fn write(write: &mut impl Write) -> UnitResult {
        u8::write_slice(write, &self::BYTES)
    }

    /// Consume four bytes and report whether they are the signature.
    pub fn is_exr(read: &mut impl Read) -> Result<bool> {
        let mut signature = [0; 4];
        u8::read_slice(read, &mut signature)?;
        Ok(signature == self::BYTES)
    }

    /// Consume four bytes, failing if they are not the signature.
    pub fn validate_exr(read: &mut impl Read) -> UnitResult {
        if self::is_exr(read)? { Ok(()) }
        else { Err(Error::invalid("file identifier missing")) }
    }
}

/// A single zero byte terminating a sequence of variable length.
pub mod sequence_end {
    use super::*;

    /// Number of bytes the terminator occupies in a file.
    pub fn byte_size() -> usize {
        1
    }

    /// Put the terminator into the byte stream.
    pub fn write<W: Write>(write: &mut W) -> UnitResult {
        0_u8.write(write)
    }

    /// Consume the next byte only if it is the terminator,
    /// returning whether the sequence has ended.
    pub fn has_come(read: &mut PeekRead<impl Read>) -> Result<bool> {
        Ok(read.skip_if_eq(0)?)
    }
}

pub(crate) fn missing_attribute(name: &str) -> Error {
    Error::invalid(format!("missing or invalid {} attribute", name))
}


/// How many blocks are needed to cover the specified extent.
pub fn compute_block_count(full_res: usize, block_size: usize) -> usize {
    // a partially filled block at the end still counts
    RoundingMode::Up.divide(full_res, block_size)
}

/// The extent of the block starting at the specified position.
/// The last block may be cut short by the end of the image.
#[inline]
pub fn calculate_block_size(total_size: usize, block_size: usize, block_position: usize) -> Result<usize> {
    if block_position >= total_size {
        return Err(Error::invalid("block index"))
    }

    if block_position + block_size <= total_size {
        Ok(block_size)
    }
    else {
        Ok(total_size - block_position)
    }
}

/// How many times the specified extent can be halved, plus one
/// for the full resolution itself.
pub fn compute_level_count(round: RoundingMode, full_res: usize) -> usize {
    round.log2(full_res) + 1
}

/// The extent of the resolution level at the specified index.
pub fn compute_level_size(round: RoundingMode, full_res: usize, level_index: usize) -> usize {
    assert!(level_index < std::mem::size_of::<usize>() * 8, "level index exceeds maximum shift");
    round.divide(full_res, 1 << level_index).max(1)
}

/// All mip map resolutions of an image, largest level first.
pub fn mip_map_levels(round: RoundingMode, max_resolution: Vec2<usize>) -> impl Iterator<Item=Vec2<usize>> {
    let longest_edge = max_resolution.width().max(max_resolution.height());
    let level_count = compute_level_count(round, longest_edge);

    (0..level_count).map(move |level_index| Vec2(
        compute_level_size(round, max_resolution.width(), level_index),
        compute_level_size(round, max_resolution.height(), level_index),
    ))
}

/// All rip map resolutions of an image, in the order they appear in a file
/// with increasing line order.
pub fn rip_map_levels(round: RoundingMode, max_resolution: Vec2<usize>) -> impl Iterator<Item=Vec2<usize>> {
    let x_level_count = compute_level_count(round, max_resolution.width());
    let y_level_count = compute_level_count(round, max_resolution.height());

    (0..y_level_count).flat_map(move |y_level| {
        (0..x_level_count).map(move |x_level| Vec2(
            compute_level_size(round, max_resolution.width(), x_level),
            compute_level_size(round, max_resolution.height(), y_level),
        ))
    })
}

/// How many pixel chunks an image is divided into.
// a file without a chunk count attribute implies this value
// through its data window and compression attributes
pub fn compute_chunk_count(compression: Compression, data_size: Vec2<usize>, blocks: Blocks) -> usize {
    match blocks {

        Blocks::Tiles(tiles) => {
            let round = tiles.rounding_mode;
            let Vec2(tile_width, tile_height) = tiles.tile_size;

            let tiles_in = move |Vec2(level_width, level_height)| {
                compute_block_count(level_width, tile_width)
                    * compute_block_count(level_height, tile_height)
            };

            use self::attribute::LevelMode::*;
            match tiles.level_mode {
                Singular => tiles_in(data_size),
                MipMap => mip_map_levels(round, data_size).map(tiles_in).sum(),
                RipMap => rip_map_levels(round, data_size).map(tiles_in).sum(),
            }
        },

        // scan line images have no resolution levels
        Blocks::ScanLines => {
            compute_block_count(data_size.height(), compression.scan_lines_per_block())
        },
    }
}



impl MetaData {

    /// Pair a header with the version requirements it implies.
    pub fn new(header: Header) -> Self {
        MetaData {
            requirements: Requirements::infer(&header),
            header
        }
    }

    /// Open the file at the specified path and read its meta data.
    pub fn read_from_file(path: impl AsRef<::std::path::Path>) -> Result<Self> {
        Self::read_from_unbuffered(File::open(path)?)
    }

    /// Wrap the byte source in a buffer and read the meta data from it.
    /// Prefer `read_from_buffered` for sources that are already in memory.
    pub fn read_from_unbuffered(unbuffered: impl Read) -> Result<Self> {
        Self::read_from_buffered(BufReader::new(unbuffered))
    }

    /// Read the meta data from an in-memory or otherwise buffered source.
    pub fn read_from_buffered(buffered: impl Read) -> Result<Self> {
        let mut read = PeekRead::new(buffered);
        MetaData::read_validated_from_buffered_peekable(&mut read)
    }

    /// Read the meta data, skipping the final validation step.
    pub fn read_unvalidated_from_buffered_peekable(read: &mut PeekRead<impl Read>) -> Result<Self> {
        magic_number::validate_exr(read)?;

        let requirements = Requirements::read(read)?;

        // stop before parsing a header this implementation cannot interpret
        requirements.validate()?;

        let header = Header::read(read, &requirements, false)?;
        Ok(MetaData { requirements, header })
    }

    /// Read and validate the meta data. The validation is lenient,
    /// accepting slightly malformed files that can still be decoded.
    pub fn read_validated_from_buffered_peekable(read: &mut PeekRead<impl Read>) -> Result<Self> {
        let meta_data = Self::read_unvalidated_from_buffered_peekable(read)?;
        meta_data.validate(false)?;
        Ok(meta_data)
    }

    /// Validate the meta data and then write it to the stream.
    /// Pedantic validation also rejects quirks that other readers might trip over.
    pub(crate) fn write_validating_to_buffered(&self, write: &mut impl Write, pedantic: bool) -> UnitResult {
        self.validate(pedantic)?;

        magic_number::write(write)?;
        self.requirements.write(write)?;
        self.header.write(write)?;
        Ok(())
    }

    /// Read the offset table that follows the header.
    pub fn read_offset_table(read: &mut PeekRead<impl Read>, header: &Header) -> Result<OffsetTable> {
        u64::read_vec(read, header.chunk_count, std::u16::MAX as usize, None, "offset table size")
    }

    /// Advance the reader past the offset table without storing it,
    /// returning the number of entries skipped.
    pub fn skip_offset_table(read: &mut PeekRead<impl Read>, header: &Header) -> Result<usize> {
        crate::io::skip_bytes(read, usize_to_u64(header.chunk_count * u64::BYTE_SIZE))?;
        Ok(header.chunk_count)
    }

    /// Check the requirements and the header for consistency.
    /// Use strict mode when writing, lenient mode when reading.
    pub fn validate(&self, strict: bool) -> UnitResult {
        self.requirements.validate()?;

        let mut long_names = self.requirements.has_long_names;
        self.header.validate(&mut long_names, strict)?;

        if strict && long_names && !self.requirements.has_long_names {
            return Err(Error::invalid("long name flag not set although longer names are used"));
        }

        Ok(())
    }
}


impl Requirements {

    /// The flags a freshly written file needs for the specified header.
    pub fn infer(header: &Header) -> Self {
        Requirements {
            file_format_version: 2,
            is_single_layer_and_tiled: header.blocks.has_tiles(),
            has_long_names: header.has_long_names(),
            has_deep_data: false,
            has_multiple_layers: false,
        }
    }

    /// Decode the version word, without validating the flag combination.
    pub fn read<R: Read>(read: &mut R) -> Result<Self> {
        use ::bit_field::BitField;

        let version_and_flags = u32::read(read)?;

        // lowest byte: the file format version number
        let version = (version_and_flags & 0x00FF) as u8;

        // upper bytes: one feature flag per bit
        let is_single_tile = version_and_flags.get_bit(9);
        let has_long_names = version_and_flags.get_bit(10);
        let has_deep_data = version_and_flags.get_bit(11);
        let has_multiple_layers = version_and_flags.get_bit(12);

        // a set bit above 12 announces a feature
        // this implementation has never heard of
        if version_and_flags >> 13 != 0 {
            return Err(Error::unsupported("too new file feature flags"));
        }

        Ok(Requirements {
            file_format_version: version,
            is_single_layer_and_tiled: is_single_tile, has_long_names,
            has_deep_data, has_multiple_layers,
        })
    }

    /// Encode the version word, without validating the flag combination.
    pub fn write<W: Write>(self, write: &mut W) -> UnitResult {
        use ::bit_field::BitField;

        // lowest byte: the version number. all flag bits start out zero
        let mut version_and_flags = self.file_format_version as u32;

        version_and_flags.set_bit(9, self.is_single_layer_and_tiled);
        version_and_flags.set_bit(10, self.has_long_names);
        version_and_flags.set_bit(11, self.has_deep_data);
        version_and_flags.set_bit(12, self.has_multiple_layers);

        version_and_flags.write(write)?;
        Ok(())
    }

    /// Reject flag combinations this implementation cannot decode.
    pub fn validate(&self) -> UnitResult {
        // the tile flag may never be combined with the deep or multipart flag
        if self.is_single_layer_and_tiled && (self.has_deep_data || self.has_multiple_layers) {
            return Err(Error::invalid("file feature flags"));
        }

        if self.file_format_version != 2 {
            return Err(Error::unsupported(format!("file format version {}", self.file_format_version)));
        }

        if self.has_deep_data {
            return Err(Error::unsupported("deep data"));
        }

        if self.has_multiple_layers {
            return Err(Error::unsupported("multiple image parts"));
        }

        Ok(())
    }
}


#[cfg(test)]
mod test {
    use super::*;
    use crate::meta::attribute::{ChannelDescription, SampleType, LineOrder, Text, AttributeValue};
    use crate::compression::Compression;

    #[test]
    fn round_trip_requirements() {
        let requirements = Requirements {
            file_format_version: 2,
            is_single_layer_and_tiled: true,
            has_long_names: false,
            has_deep_data: true,
            has_multiple_layers: false
        };

        let mut data: Vec<u8> = Vec::new();
        requirements.write(&mut data).unwrap();
        let decoded = Requirements::read(&mut data.as_slice()).unwrap();
        assert_eq!(requirements, decoded);
    }

    #[test]
    fn requirements_validation() {
        let valid = Requirements {
            file_format_version: 2,
            is_single_layer_and_tiled: false,
            has_long_names: false,
            has_deep_data: false,
            has_multiple_layers: false
        };

        valid.validate().unwrap();
        Requirements { is_single_layer_and_tiled: true, .. valid }.validate().unwrap();

        // the tile flag contradicts the deep and multipart flags
        assert!(matches!(
            Requirements { is_single_layer_and_tiled: true, has_multiple_layers: true, .. valid }.validate(),
            Err(Error::Invalid(_))
        ));

        assert!(matches!(
            Requirements { is_single_layer_and_tiled: true, has_deep_data: true, .. valid }.validate(),
            Err(Error::Invalid(_))
        ));

        assert!(matches!(
            Requirements { has_deep_data: true, .. valid }.validate(),
            Err(Error::NotSupported(_))
        ));

        assert!(matches!(
            Requirements { has_multiple_layers: true, .. valid }.validate(),
            Err(Error::NotSupported(_))
        ));

        assert!(matches!(
            Requirements { file_format_version: 3, .. valid }.validate(),
            Err(Error::NotSupported(_))
        ));

        assert!(matches!(
            Requirements { file_format_version: 1, .. valid }.validate(),
            Err(Error::NotSupported(_))
        ));
    }

    #[test]
    fn unknown_version_flags_are_rejected() {
        let mut data: Vec<u8> = Vec::new();

        Requirements {
            file_format_version: 2,
            is_single_layer_and_tiled: false,
            has_long_names: false,
            has_deep_data: false,
            has_multiple_layers: false
        }.write(&mut data).unwrap();

        // set a reserved flag bit
        data[1] |= 0b0010_0000;

        assert!(matches!(
            Requirements::read(&mut data.as_slice()),
            Err(Error::NotSupported(_))
        ));
    }

    #[test]
    fn scan_line_chunk_count() {
        assert_eq!(compute_chunk_count(Compression::Uncompressed, Vec2(2000, 333), Blocks::ScanLines), 333);
        assert_eq!(compute_chunk_count(Compression::RLE, Vec2(2000, 333), Blocks::ScanLines), 333);
        assert_eq!(compute_chunk_count(Compression::ZIP16, Vec2(2000, 333), Blocks::ScanLines), 21);
        assert_eq!(compute_chunk_count(Compression::PIZ, Vec2(500, 64), Blocks::ScanLines), 2);
    }

    #[test]
    fn long_names_are_announced_in_the_version_flags() {
        let short_names = Header::new(
            Vec2(16, 16),
            smallvec![ ChannelDescription::named("Y", SampleType::F16) ],
        );

        assert!(!Requirements::infer(&short_names).has_long_names);

        let long_attribute = short_names.clone().with_attributes(vec![(
            Text::from("thisAttributeNameSpansThirtyTwoChars"),
            AttributeValue::I32(1),
        )]);

        assert!(Requirements::infer(&long_attribute).has_long_names);

        let long_channel = Header::new(
            Vec2(16, 16),
            smallvec![ ChannelDescription::named(
                "aChannelNameOfThirtyTwoCharacters",
                SampleType::F32
            ) ],
        );

        assert!(Requirements::infer(&long_channel).has_long_names);
    }

    #[test]
    fn round_trip_meta_data() {
        let header = Header::new(
            Vec2(2000, 333),
            smallvec![
                ChannelDescription::named("main", SampleType::U32)
            ],
        ).with_encoding(Compression::Uncompressed, LineOrder::Increasing)
            .with_position(Vec2(3, -5));

        let meta = MetaData::new(header);

        let mut data: Vec<u8> = Vec::new();
        meta.write_validating_to_buffered(&mut data, true).unwrap();
        let decoded = MetaData::read_from_buffered(data.as_slice()).unwrap();
        decoded.validate(true).unwrap();
        assert_eq!(meta, decoded);
    }
}
