
//! The attribute values that can appear in a header,
//! along with their binary representation in the file.

use smallvec::SmallVec;


/// Any value an attribute record can hold.
/// Values with an unrecognized type name are kept as raw bytes.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {

    /// Describes all channels of an image.
    ChannelList(ChannelList),

    /// How the pixel chunks of an image are compressed.
    Compression(Compression),

    /// The order of the pixel chunks in the file.
    LineOrder(LineOrder),

    /// A list of texts.
    TextVector(Vec<Text>),

    /// The tile size and resolution levels of a tiled image.
    TileDescription(TileDescription),

    /// A string of single-byte chars.
    Text(Text),

    /// A signed dividend and an unsigned divisor.
    Rational(Rational),

    /// A 64-bit float.
    F64(f64),

    /// A 32-bit float.
    F32(f32),

    /// A 32-bit signed integer.
    I32(i32),

    /// An axis-aligned rectangle in integer pixel space.
    IntegerBounds(IntegerBounds),

    /// An axis-aligned rectangle in float space.
    FloatRect(FloatRect),

    /// A 2D integer vector.
    IntVec2(Vec2<i32>),

    /// A 2D float vector.
    FloatVec2(Vec2<f32>),

    /// A 3D integer vector.
    IntVec3((i32, i32, i32)),

    /// A 3D float vector.
    FloatVec3((f32, f32, f32)),

    /// An attribute of a type this implementation does not interpret.
    /// Carrying the bytes along allows files to be rewritten without loss.
    Custom {

        /// The type name found in the file.
        kind: Text,

        /// The unparsed little-endian value bytes.
        bytes: Vec<u8>
    },
}

/// A string in an exr file. Each byte is one char.
/// Channel and attribute names are texts, as are some attribute values.
#[derive(Clone, PartialEq, Ord, PartialOrd, Default)] // hash implemented manually
pub struct Text {
    bytes: TextBytes,
}

pub use crate::compression::Compression;

/// A ratio of two integers, stored as dividend and divisor.
pub type Rational = (i32, u32);

/// A rectangle in global 2D integer space.
/// All coordinates must stay within plus or minus `i32::MAX / 2`,
/// the limit other readers of this format also enforce.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Default, Hash)]
pub struct IntegerBounds {

    /// Top left corner. Included in the rectangle unless the size is zero.
    pub position: Vec2<i32>,

    /// Extent towards the right and downwards.
    /// The far edge is excluded, like the end of a `Range`.
    pub size: Vec2<usize>,
}

/// A rectangle in 2D float space, stored as two inclusive corners.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FloatRect {

    /// The top left corner (inclusive).
    pub min: Vec2<f32>,

    /// The bottom right corner (inclusive).
    pub max: Vec2<f32>
}

/// All channels of an image. The file format requires
/// the channels to be sorted alphabetically by name.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ChannelList {

    /// The channel descriptions, sorted by name.
    pub list: SmallVec<[ChannelDescription; 5]>,

    /// Byte count of one full pixel, all channels combined.
    pub bytes_per_pixel: usize,
}

/// Describes the samples of one channel,
/// without containing any pixel data itself.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ChannelDescription {

    /// Typically a single char such as "R" or "A".
    pub name: Text,

    /// The binary type of the samples in the file.
    pub sample_type: SampleType,

    /// Hints to lossy compression methods that this channel
    /// should be quantized linearly instead of logarithmically.
    /// Usually false for color channels and true for alpha.
    pub quantize_linearly: bool,

    /// Take only every n-th sample in each direction.
    /// A rate other than one means the channel stores fewer samples
    /// than the image has pixels.
    pub sampling: Vec2<usize>,
}

/// The binary type of the samples of one channel.
#[derive(Clone, Debug, Eq, PartialEq, Copy, Hash)]
pub enum SampleType {

    /// 32-bit unsigned integers, typically object ids.
    U32,

    /// 16-bit floats, the most common pixel type.
    F16,

    /// 32-bit floats, for high precision data such as depth.
    F32,
}

/// The order in which pixel chunks are stored in a file.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum LineOrder {

    /// Chunks appear top to bottom.
    Increasing,

    /// Chunks appear bottom to top.
    Decreasing,

    /// Chunks may appear in any order.
    /// Only allowed when each chunk can be located through the offset table.
    Unspecified,
}

/// The tiling of a tiled image.
/// Files with this attribute can be parsed,
/// but their pixel data is not processed by this crate.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct TileDescription {

    /// Edge lengths of one tile. The same for all resolution levels.
    pub tile_size: Vec2<usize>,

    /// Which smaller versions of the image are stored alongside it.
    pub level_mode: LevelMode,

    /// How to round when halving the image size for each level.
    pub rounding_mode: RoundingMode,
}

/// Which resolution levels a tiled image stores.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum LevelMode {

    /// Only the full resolution image.
    Singular,

    /// A series of levels, each half the size of the previous one.
    MipMap,

    /// Levels for every combination of horizontal and vertical halving.
    RipMap,
}


/// The bytes of a text. Inlined up to 24 chars,
/// which covers channel names and almost all attribute names.
pub type TextBytes = SmallVec<[u8; 24]>;

/// A slice of text bytes.
pub type TextSlice = [u8];


use crate::io::*;
use crate::meta::sequence_end;
use crate::error::*;
use crate::math::{RoundingMode, Vec2};
use ::half::f16;
use std::convert::TryFrom;
use std::borrow::Borrow;
use std::hash::{Hash, Hasher};


impl Text {

    /// Convert a string. Returns `None` if any char does not fit into a single byte.
    pub fn new_or_none(string: impl AsRef<str>) -> Option<Self> {
        let bytes: Option<TextBytes> = string.as_ref().chars()
            .map(|character| u8::try_from(character as u64).ok())
            .collect();

        bytes.map(Self::from_bytes_unchecked)
    }

    /// Convert a string. Panics if any char does not fit into a single byte.
    pub fn new_or_panic(string: impl AsRef<str>) -> Self {
        Self::new_or_none(string).expect("text contains unsupported characters")
    }

    /// Wrap a byte slice without inspecting its contents.
    pub fn from_slice_unchecked(text: &TextSlice) -> Self {
        Self::from_bytes_unchecked(SmallVec::from_slice(text))
    }

    /// Wrap the bytes without inspecting their contents.
    pub fn from_bytes_unchecked(bytes: TextBytes) -> Self {
        Text { bytes }
    }

    /// The chars of this text as a byte slice.
    pub fn as_slice(&self) -> &TextSlice {
        self.bytes.as_slice()
    }

    /// The chars of this text as a byte slice.
    pub fn bytes(&self) -> &[u8] {
        self.bytes.as_slice()
    }

    /// Check the length constraints of this text,
    /// setting `long_names` if a name longer than 31 chars is encountered.
    /// Without `long_names`, any length passes.
    pub fn validate(&self, null_terminated: bool, long_names: Option<&mut bool>) -> UnitResult {
        Self::validate_bytes(self.as_slice(), null_terminated, long_names)
    }

    /// Check the length constraints of some text bytes,
    /// setting `long_names` if a name longer than 31 chars is encountered.
    /// Without `long_names`, any length passes.
    pub fn validate_bytes(text: &TextSlice, null_terminated: bool, long_names: Option<&mut bool>) -> UnitResult {
        // an empty text would serialize to a lone null byte,
        // which marks the end of a sequence instead
        if null_terminated && text.is_empty() {
            return Err(Error::invalid("text must not be empty"));
        }

        if let Some(long_names) = long_names {
            if text.len() >= 256 { return Err(Error::invalid("text must not be longer than 255")); }
            if text.len() >= 32 { *long_names = true; }
        }

        Ok(())
    }

    /// Number of bytes used when stored with a trailing null byte.
    pub fn null_terminated_byte_size(&self) -> usize {
        self.bytes.len() + sequence_end::byte_size()
    }

    /// Number of bytes used when stored with a leading `i32` length.
    pub fn i32_sized_byte_size(&self) -> usize {
        self.bytes.len() + i32::BYTE_SIZE
    }

    /// Store the `i32` length of this text, followed by its chars.
    pub fn write_i32_sized<W: Write>(&self, write: &mut W) -> UnitResult {
        debug_assert!(self.validate(false, None).is_ok(), "text size bug");
        usize_to_i32(self.bytes.len()).write(write)?;
        u8::write_slice(write, self.bytes.as_slice())
    }

    /// Read an `i32` length, then that many chars.
    pub fn read_i32_sized<R: Read>(read: &mut R, max_size: usize) -> Result<Self> {
        let char_count = i32_to_usize(i32::read(read)?, "vector size")?;
        let chars = u8::read_vec(read, char_count, 1024, Some(max_size), "text attribute length")?;
        Ok(Text::from_bytes_unchecked(SmallVec::from_vec(chars)))
    }

    /// Read exactly `size` chars.
    pub fn read_sized<R: Read>(read: &mut R, size: usize) -> Result<Self> {
        const INLINE_SIZE: usize = 24;

        if size <= INLINE_SIZE {
            // read into a stack buffer, avoiding a heap allocation
            let mut buffer = [0_u8; INLINE_SIZE];
            let chars = &mut buffer[.. size];
            read.read_exact(chars)?;
            Ok(Text::from_slice_unchecked(chars))
        }

        else {
            let chars = u8::read_vec(read, size, 1024, None, "text attribute length")?;
            Ok(Text::from_bytes_unchecked(SmallVec::from_vec(chars)))
        }
    }

    /// Store the chars of this text, followed by a null byte.
    pub fn write_null_terminated<W: Write>(&self, write: &mut W) -> UnitResult {
        Self::write_null_terminated_bytes(self.as_slice(), write)
    }

    /// Store the specified chars, followed by a null byte.
    fn write_null_terminated_bytes<W: Write>(bytes: &[u8], write: &mut W) -> UnitResult {
        debug_assert!(!bytes.is_empty(), "empty text bug"); // would be mistaken for a sequence end

        u8::write_slice(write, bytes)?;
        sequence_end::write(write)?;
        Ok(())
    }

    /// Read chars until a null byte is found, consuming the null byte.
    pub fn read_null_terminated<R: Read>(read: &mut R, max_len: usize) -> Result<Self> {
        // text must contain at least one char before the null byte
        let mut bytes = smallvec![ u8::read(read)? ];

        loop {
            match u8::read(read)? {
                0 => break,
                non_terminator => bytes.push(non_terminator),
            }

            if bytes.len() > max_len {
                return Err(Error::invalid("text too long"))
            }
        }

        Ok(Text { bytes })
    }

    /// Read texts until the specified byte count is consumed.
    /// Lengths are never restricted as these are attribute values, not names.
    fn read_vec_of_i32_sized(
        read: &mut PeekRead<impl Read>,
        total_byte_size: usize
    ) -> Result<Vec<Text>>
    {
        let mut texts = Vec::with_capacity(2);
        let mut consumed_bytes = 0;

        // the element count is not stored,
        // it is implied by the attribute byte size
        while consumed_bytes < total_byte_size {
            let text = Text::read_i32_sized(read, total_byte_size)?;
            consumed_bytes += i32::BYTE_SIZE + text.bytes.len();
            texts.push(text);
        }

        if consumed_bytes != total_byte_size {
            return Err(Error::invalid("text array byte size"))
        }

        Ok(texts)
    }

    /// Write texts back to back, without a count.
    /// Lengths are never restricted as these are attribute values, not names.
    fn write_vec_of_i32_sized_texts<W: Write>(write: &mut W, texts: &[Text]) -> UnitResult {
        for text in texts {
            text.write_i32_sized(write)?;
        }

        Ok(())
    }

    /// The chars of this text, borrowed, like `String::chars()`.
    pub fn chars(&self) -> impl '_ + Iterator<Item = char> {
        self.bytes.iter().map(|&byte| byte as char)
    }

    /// Whether this text spells the same chars as the string.
    pub fn eq(&self, string: &str) -> bool {
        string.chars().eq(self.chars())
    }

    /// Whether this text spells the same chars as the string, ignoring case.
    pub fn eq_case_insensitive(&self, string: &str) -> bool {
        // locale-dependent special cases are ignored,
        // as they cannot be encoded in exr texts anyway
        let own_chars = self.chars().map(|char| char.to_ascii_lowercase());
        let string_chars = string.chars().flat_map(|char| char.to_lowercase());
        string_chars.eq(own_chars)
    }
}

impl PartialEq<str> for Text {
    fn eq(&self, other: &str) -> bool {
        self.eq(other)
    }
}

impl PartialEq<Text> for str {
    fn eq(&self, other: &Text) -> bool {
        other.eq(self)
    }
}

impl Eq for Text {}

impl Borrow<TextSlice> for Text {
    fn borrow(&self) -> &TextSlice {
        self.as_slice()
    }
}

// delegate to the byte hash. `Borrow` requires
// that a text and its byte slice hash identically
impl Hash for Text {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bytes.hash(state)
    }
}

impl Into<String> for Text {
    fn into(self) -> String {
        self.to_string()
    }
}

impl<'s> From<&'s str> for Text {

    /// Panics if the string contains an unsupported character.
    fn from(string: &'s str) -> Self {
        Self::new_or_panic(string)
    }
}

impl ::std::fmt::Debug for Text {
    fn fmt(&self, formatter: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
        write!(formatter, "Text(\"{}\")", self)
    }
}

// implements to_string for free
impl ::std::fmt::Display for Text {
    fn fmt(&self, formatter: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
        use std::fmt::Write;

        for &byte in self.bytes.iter() {
            formatter.write_char(byte as char)?;
        }

        Ok(())
    }
}


impl IntegerBounds {

    /// An empty rectangle at the origin.
    pub fn zero() -> Self {
        Self::from_dimensions(Vec2(0, 0))
    }

    /// A rectangle of the specified size, positioned at the origin.
    pub fn from_dimensions(size: impl Into<Vec2<usize>>) -> Self {
        Self::new(Vec2(0, 0), size)
    }

    /// A rectangle of the specified size and position.
    pub fn new(start: impl Into<Vec2<i32>>, size: impl Into<Vec2<usize>>) -> Self {
        Self { position: start.into(), size: size.into() }
    }

    /// The coordinate one to the right of and one below the last included pixel.
    /// Excluded from the rectangle, like the end of a `Range`.
    pub fn end(self) -> Vec2<i32> {
        self.position + self.size.to_i32() // panics above i32::MAX
    }

    /// The largest coordinate still inside the rectangle.
    pub fn max(self) -> Vec2<i32> {
        self.end() - Vec2(1, 1)
    }

    /// Check the coordinate limits, and optionally a maximum size.
    pub fn validate(&self, max_size: Option<Vec2<usize>>) -> UnitResult {
        if let Some(max_size) = max_size {
            if self.size.width() > max_size.width() || self.size.height() > max_size.height() {
                return Err(Error::invalid("window attribute dimension value"));
            }
        }

        let min = Vec2(self.position.x() as i64, self.position.y() as i64);

        let max = Vec2(
            self.position.x() as i64 + self.size.width() as i64,
            self.position.y() as i64 + self.size.height() as i64,
        );

        Self::validate_min_max_i64(min, max)
    }

    // the coordinate limit of the original c++ library
    fn validate_min_max_i64(min: Vec2<i64>, max: Vec2<i64>) -> UnitResult {
        let limit = (i32::MAX / 2) as i64;

        if     max.x() >=  limit
            || max.y() >=  limit
            || min.x() <= -limit
            || min.y() <= -limit
        {
            return Err(Error::invalid("window size exceeding integer maximum"));
        }

        Ok(())
    }

    /// Number of bytes this would occupy in a file.
    pub fn byte_size() -> usize {
        4 * i32::BYTE_SIZE
    }

    /// Store as two inclusive corner points, without validation.
    pub fn write<W: Write>(&self, write: &mut W) -> UnitResult {
        let Vec2(min_x, min_y) = self.position;
        let Vec2(max_x, max_y) = self.max();

        min_x.write(write)?;
        min_y.write(write)?;
        max_x.write(write)?;
        max_y.write(write)?;
        Ok(())
    }

    /// Read two corner points and convert them to position and size.
    /// Corners are reordered if they are stored inverted.
    pub fn read<R: Read>(read: &mut R) -> Result<Self> {
        let corner_a_x = i32::read(read)?;
        let corner_a_y = i32::read(read)?;
        let corner_b_x = i32::read(read)?;
        let corner_b_y = i32::read(read)?;

        let min = Vec2(corner_a_x.min(corner_b_x), corner_a_y.min(corner_b_y));
        let max = Vec2(corner_a_x.max(corner_b_x), corner_a_y.max(corner_b_y));

        // reject coordinates that would overflow the size computation
        Self::validate_min_max_i64(
            Vec2(min.x() as i64, min.y() as i64),
            Vec2(max.x() as i64, max.y() as i64),
        )?;

        // the stored maximum is inclusive, the size is not
        let size = Vec2(max.x() + 1 - min.x(), max.y() + 1 - min.y());
        let size = size.to_usize("box coordinates")?;

        Ok(IntegerBounds { position: min, size })
    }

}


impl FloatRect {

    /// Number of bytes this would occupy in a file.
    pub fn byte_size() -> usize {
        4 * f32::BYTE_SIZE
    }

    /// Store both corner points, without validation.
    pub fn write<W: Write>(&self, write: &mut W) -> UnitResult {
        self.min.x().write(write)?;
        self.min.y().write(write)?;
        self.max.x().write(write)?;
        self.max.y().write(write)?;
        Ok(())
    }

    /// Read both corner points, without validation.
    pub fn read<R: Read>(read: &mut R) -> Result<Self> {
        let min_x = f32::read(read)?;
        let min_y = f32::read(read)?;
        let max_x = f32::read(read)?;
        let max_y = f32::read(read)?;

        Ok(FloatRect {
            min: Vec2(min_x, min_y),
            max: Vec2(max_x, max_y)
        })
    }
}

impl SampleType {

    /// Byte count of a single sample of this type.
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            SampleType::F16 => f16::BYTE_SIZE,
            SampleType::F32 => f32::BYTE_SIZE,
            SampleType::U32 => u32::BYTE_SIZE,
        }
    }

    /// Number of bytes this would occupy in a file.
    pub fn byte_size() -> usize {
        i32::BYTE_SIZE
    }

    /// Store the numeric code of this type, without validation.
    // stored as i32, leaving room for future sample types
    pub fn write<W: Write>(&self, write: &mut W) -> UnitResult {
        let code: i32 = match *self {
            SampleType::U32 => 0,
            SampleType::F16 => 1,
            SampleType::F32 => 2,
        };

        code.write(write)?;
        Ok(())
    }

    /// Read a numeric type code.
    pub fn read<R: Read>(read: &mut R) -> Result<Self> {
        Ok(match i32::read(read)? {
            0 => SampleType::U32,
            1 => SampleType::F16,
            2 => SampleType::F32,
            _ => return Err(Error::invalid("pixel type attribute value")),
        })
    }
}

impl ChannelDescription {

    /// Guess the quantization linearity from the channel name.
    /// Color and depth channels compress logarithmically, everything else linearly.
    pub fn guess_quantization_linearity(name: &Text) -> bool {
        !(
            name.eq_case_insensitive("R") || name.eq_case_insensitive("G") ||
                name.eq_case_insensitive("B") || name.eq_case_insensitive("L") ||
                name.eq_case_insensitive("Y") || name.eq_case_insensitive("X") ||
                name.eq_case_insensitive("Z")
        )
    }

    /// A channel with a sampling rate of one,
    /// guessing the quantization linearity from the name.
    pub fn named(name: impl Into<Text>, sample_type: SampleType) -> Self {
        let name = name.into();
        let linearity = Self::guess_quantization_linearity(&name);
        Self::new(name, sample_type, linearity)
    }

    /// A channel with a sampling rate of one.
    pub fn new(name: impl Into<Text>, sample_type: SampleType, quantize_linearly: bool) -> Self {
        Self { name: name.into(), sample_type, quantize_linearly, sampling: Vec2(1, 1) }
    }

    /// Number of bytes this would occupy in a file.
    pub fn byte_size(&self) -> usize {
        self.name.null_terminated_byte_size()
            + SampleType::byte_size()
            + 1 // linearity
            + 3 // reserved bytes
            + 2 * i32::BYTE_SIZE // sampling rates
    }

    /// Store this channel record, without validation.
    pub fn write<W: Write>(&self, write: &mut W) -> UnitResult {
        self.name.write_null_terminated(write)?;
        self.sample_type.write(write)?;

        let linearity: u8 = if self.quantize_linearly { 1 } else { 0 };
        linearity.write(write)?;

        i8::write_slice(write, &[0_i8, 0_i8, 0_i8])?; // reserved bytes
        usize_to_i32(self.sampling.x()).write(write)?;
        usize_to_i32(self.sampling.y()).write(write)?;
        Ok(())
    }

    /// Read one channel record.
    pub fn read<R: Read>(read: &mut R) -> Result<Self> {
        let name = Text::read_null_terminated(read, 256)?;
        let sample_type = SampleType::read(read)?;

        let quantize_linearly = match u8::read(read)? {
            0 => false,
            1 => true,
            _ => return Err(Error::invalid("channel linearity attribute value")),
        };

        let mut reserved = [0_i8; 3];
        i8::read_slice(read, &mut reserved)?;

        let x_sampling = i32_to_usize(i32::read(read)?, "x channel sampling")?;
        let y_sampling = i32_to_usize(i32::read(read)?, "y channel sampling")?;

        Ok(ChannelDescription {
            name, sample_type, quantize_linearly,
            sampling: Vec2(x_sampling, y_sampling),
        })
    }

    /// Check the name and the sampling rates against the data window.
    pub fn validate(&self, data_window: IntegerBounds) -> UnitResult {
        self.name.validate(true, None)?;

        let Vec2(x_sampling, y_sampling) = self.sampling;

        if x_sampling == 0 || y_sampling == 0 {
            return Err(Error::invalid("zero sampling factor"));
        }

        // data window boundaries must fall on whole samples
        if data_window.position.x() % x_sampling as i32 != 0 || data_window.position.y() % y_sampling as i32 != 0 {
            return Err(Error::invalid("channel sampling factor not dividing data window position"));
        }

        if data_window.size.x() % x_sampling != 0 || data_window.size.y() % y_sampling != 0 {
            return Err(Error::invalid("channel sampling factor not dividing data window size"));
        }

        Ok(())
    }
}

impl ChannelList {

    /// Build a channel list, sorting the channels by name
    /// as the file format requires.
    pub fn new(mut channels: SmallVec<[ChannelDescription; 5]>) -> Self {
        channels.sort_by(|a, b| a.name.as_slice().cmp(b.name.as_slice()));

        ChannelList {
            bytes_per_pixel: channels.iter()
                .map(|channel| channel.sample_type.bytes_per_sample())
                .sum(),

            list: channels,
        }
    }

    /// Number of bytes this would occupy in a file.
    pub fn byte_size(&self) -> usize {
        self.list.iter().map(ChannelDescription::byte_size).sum::<usize>()
            + sequence_end::byte_size()
    }

    /// Store all channel records and a terminating null byte.
    /// Assumes the channels have been validated and sorted.
    pub fn write(&self, write: &mut impl Write) -> UnitResult {
        for channel in &self.list {
            channel.write(write)?;
        }

        sequence_end::write(write)?;
        Ok(())
    }

    /// Read channel records until the terminating null byte.
    pub fn read(read: &mut PeekRead<impl Read>) -> Result<Self> {
        let mut channels = SmallVec::new();
        while !sequence_end::has_come(read)? {
            channels.push(ChannelDescription::read(read)?);
        }

        Ok(ChannelList::new(channels))
    }

    /// Check each channel and require unique, sorted names.
    pub fn validate(&self, data_window: IntegerBounds) -> UnitResult {
        let mut names = self.list.iter()
            .map(|channel| channel.validate(data_window).map(|_| &channel.name));

        let mut previous = names.next()
            .ok_or(Error::invalid("at least one channel is required"))??;

        for name in names {
            let name = name?;
            if previous == name { return Err(Error::invalid("channel names are not unique")); }
            else if previous > name { return Err(Error::invalid("channel names are not sorted alphabetically")); }
            else { previous = name; }
        }

        Ok(())
    }
}

impl Compression {

    /// Number of bytes this would occupy in a file.
    pub fn byte_size() -> usize { u8::BYTE_SIZE }

    /// Store the numeric code of this method, without validation.
    pub fn write<W: Write>(self, write: &mut W) -> UnitResult {
        use self::Compression::*;

        let code: u8 = match self {
            Uncompressed => 0,
            RLE => 1,
            ZIP1 => 2,
            ZIP16 => 3,
            PIZ => 4,
            PXR24 => 5,
            B44 => 6,
            B44A => 7,
        };

        code.write(write)?;
        Ok(())
    }

    /// Read a numeric compression code.
    pub fn read<R: Read>(read: &mut R) -> Result<Self> {
        use self::Compression::*;

        Ok(match u8::read(read)? {
            0 => Uncompressed,
            1 => RLE,
            2 => ZIP1,
            3 => ZIP16,
            4 => PIZ,
            5 => PXR24,
            6 => B44,
            7 => B44A,
            _ => return Err(Error::unsupported("unknown compression method")),
        })
    }
}

impl LineOrder {

    /// Number of bytes this would occupy in a file.
    pub fn byte_size() -> usize {
        u8::BYTE_SIZE
    }

    /// Store the numeric code of this order, without validation.
    pub fn write<W: Write>(self, write: &mut W) -> UnitResult {
        use self::LineOrder::*;

        let code: u8 = match self {
            Increasing => 0,
            Decreasing => 1,
            Unspecified => 2,
        };

        code.write(write)?;
        Ok(())
    }

    /// Read a numeric line order code.
    pub fn read<R: Read>(read: &mut R) -> Result<Self> {
        use self::LineOrder::*;

        Ok(match u8::read(read)? {
            0 => Increasing,
            1 => Decreasing,
            2 => Unspecified,
            _ => return Err(Error::invalid("line order attribute value")),
        })
    }
}

impl TileDescription {

    /// Number of bytes this would occupy in a file.
    pub fn byte_size() -> usize {
        2 * u32::BYTE_SIZE + 1 // tile size + packed mode byte
    }

    /// Store the tile size and the packed mode byte, without validation.
    pub fn write<W: Write>(&self, write: &mut W) -> UnitResult {
        (self.tile_size.width() as u32).write(write)?;
        (self.tile_size.height() as u32).write(write)?;

        let level_mode: u8 = match self.level_mode {
            LevelMode::Singular => 0,
            LevelMode::MipMap => 1,
            LevelMode::RipMap => 2,
        };

        let rounding_mode: u8 = match self.rounding_mode {
            RoundingMode::Down => 0,
            RoundingMode::Up => 1,
        };

        // level and rounding mode share a single byte
        (level_mode + rounding_mode * 16).write(write)?;
        Ok(())
    }

    /// Read the tile size and unpack the mode byte.
    pub fn read<R: Read>(read: &mut R) -> Result<Self> {
        let tile_width = u32::read(read)? as usize;
        let tile_height = u32::read(read)? as usize;

        let mode = u8::read(read)?;

        let level_mode = match mode & 0b0000_1111 {
            0 => LevelMode::Singular,
            1 => LevelMode::MipMap,
            2 => LevelMode::RipMap,
            _ => return Err(Error::invalid("tile description level mode")),
        };

        let rounding_mode = match mode >> 4 {
            0 => RoundingMode::Down,
            1 => RoundingMode::Up,
            _ => return Err(Error::invalid("tile description rounding mode")),
        };

        Ok(TileDescription {
            tile_size: Vec2(tile_width, tile_height),
            level_mode, rounding_mode
        })
    }

    /// Require a non-empty tile size within the coordinate limits.
    pub fn validate(&self) -> UnitResult {
        let limit = i32::MAX as i64 / 2;
        let Vec2(width, height) = self.tile_size;

        if width == 0 || height == 0 || width as i64 >= limit || height as i64 >= limit {
            return Err(Error::invalid("tile size"))
        }

        Ok(())
    }
}


/// Number of bytes a complete attribute record would occupy in a file.
pub fn byte_size(name: &Text, value: &AttributeValue) -> usize {
    name.null_terminated_byte_size()
        + value.kind_name().len() + sequence_end::byte_size()
        + i32::BYTE_SIZE // the stored value byte size
        + value.byte_size()
}

/// Store a complete attribute record: name, type name, byte size, value.
pub fn write<W: Write>(name: &[u8], value: &AttributeValue, write: &mut W) -> UnitResult {
    Text::write_null_terminated_bytes(name, write)?;
    Text::write_null_terminated_bytes(value.kind_name(), write)?;
    usize_to_i32(value.byte_size()).write(write)?;
    value.write(write)
}

/// Read a complete attribute record.
/// The value result may be an error even when the byte source is fine,
/// allowing the caller to skip one broken attribute and continue.
pub fn read(read: &mut PeekRead<impl Read>, max_size: usize) -> Result<(Text, Result<AttributeValue>)> {
    let name = Text::read_null_terminated(read, max_size)?;
    let kind = Text::read_null_terminated(read, max_size)?;
    let size = i32_to_usize(i32::read(read)?, "attribute size")?;
    let value = AttributeValue::read(read, kind, size)?;
    Ok((name, value))
}

/// Check an attribute record. Only the name has a length restriction.
pub fn validate(name: &Text, value: &AttributeValue, long_names: &mut bool, data_window: IntegerBounds) -> UnitResult {
    name.validate(true, Some(long_names))?;
    value.validate(data_window)
}


impl AttributeValue {

    /// Number of bytes the value alone would occupy in a file.
    pub fn byte_size(&self) -> usize {
        use self::AttributeValue::*;

        match *self {
            IntegerBounds(_) => self::IntegerBounds::byte_size(),
            FloatRect(_) => self::FloatRect::byte_size(),

            I32(_) => i32::BYTE_SIZE,
            F32(_) => f32::BYTE_SIZE,
            F64(_) => f64::BYTE_SIZE,

            Rational(_) => i32::BYTE_SIZE + u32::BYTE_SIZE,

            IntVec2(_) => 2 * i32::BYTE_SIZE,
            FloatVec2(_) => 2 * f32::BYTE_SIZE,
            IntVec3(_) => 3 * i32::BYTE_SIZE,
            FloatVec3(_) => 3 * f32::BYTE_SIZE,

            ChannelList(ref channels) => channels.byte_size(),
            Compression(_) => self::Compression::byte_size(),
            LineOrder(_) => self::LineOrder::byte_size(),

            // text values are stored without their length,
            // which is implied by the attribute byte size
            Text(ref text) => text.bytes.len(),

            TextVector(ref texts) => texts.iter().map(self::Text::i32_sized_byte_size).sum(),
            TileDescription(_) => self::TileDescription::byte_size(),
            Custom { ref bytes, .. } => bytes.len(),
        }
    }

    /// The type name stored in the file for this value.
    pub fn kind_name(&self) -> &[u8] {
        use self::AttributeValue::*;
        use self::type_names as ty;

        match *self {
            IntegerBounds(_) => ty::I32BOX2,
            FloatRect(_) => ty::F32BOX2,
            I32(_) => ty::I32,
            F32(_) => ty::F32,
            F64(_) => ty::F64,
            Rational(_) => ty::RATIONAL,
            IntVec2(_) => ty::I32VEC2,
            FloatVec2(_) => ty::F32VEC2,
            IntVec3(_) => ty::I32VEC3,
            FloatVec3(_) => ty::F32VEC3,
            ChannelList(_) => ty::CHANNEL_LIST,
            Compression(_) => ty::COMPRESSION,
            LineOrder(_) => ty::LINE_ORDER,
            Text(_) => ty::TEXT,
            TextVector(_) => ty::TEXT_VECTOR,
            TileDescription(_) => ty::TILES,
            Custom { ref kind, .. } => &kind.bytes,
        }
    }

    /// Store the value bytes, without validation.
    pub fn write<W: Write>(&self, write: &mut W) -> UnitResult {
        use self::AttributeValue::*;

        match *self {
            IntegerBounds(value) => value.write(write)?,
            FloatRect(value) => value.write(write)?,

            I32(value) => value.write(write)?,
            F32(value) => value.write(write)?,
            F64(value) => value.write(write)?,

            Rational((a, b)) => { a.write(write)?; b.write(write)?; },

            IntVec2(Vec2(x, y)) => { x.write(write)?; y.write(write)?; },
            FloatVec2(Vec2(x, y)) => { x.write(write)?; y.write(write)?; },
            IntVec3((x, y, z)) => { x.write(write)?; y.write(write)?; z.write(write)?; },
            FloatVec3((x, y, z)) => { x.write(write)?; y.write(write)?; z.write(write)?; },

            ChannelList(ref channels) => channels.write(write)?,
            Compression(value) => value.write(write)?,
            LineOrder(value) => value.write(write)?,

            // text values are stored without their length,
            // which is implied by the attribute byte size
            Text(ref text) => u8::write_slice(write, text.bytes.as_slice())?,

            TextVector(ref texts) => self::Text::write_vec_of_i32_sized_texts(write, texts)?,
            TileDescription(ref value) => value.write(write)?,
            Custom { ref bytes, .. } => u8::write_slice(write, bytes)?,
        };

        Ok(())
    }

    /// Read a value of the specified type and byte size.
    /// `Ok(Err(_))` means the byte source was fine,
    /// and only this single attribute could not be parsed.
    pub fn read(read: &mut PeekRead<impl Read>, kind: Text, byte_size: usize) -> Result<Result<Self>> {
        use self::AttributeValue::*;
        use self::type_names as ty;

        // consume all value bytes up front, so a parse failure
        // leaves the stream at the start of the next attribute
        let value_bytes = u8::read_vec(read, byte_size, 128, None, "attribute value size")?;

        let parse = move || {
            let bytes = &mut value_bytes.as_slice();

            Ok(match kind.bytes.as_slice() {
                ty::I32BOX2 => IntegerBounds(self::IntegerBounds::read(bytes)?),
                ty::F32BOX2 => FloatRect(self::FloatRect::read(bytes)?),

                ty::I32 => I32(i32::read(bytes)?),
                ty::F32 => F32(f32::read(bytes)?),
                ty::F64 => F64(f64::read(bytes)?),

                ty::RATIONAL => Rational({
                    let dividend = i32::read(bytes)?;
                    let divisor = u32::read(bytes)?;
                    (dividend, divisor)
                }),

                ty::I32VEC2 => IntVec2({
                    let x = i32::read(bytes)?;
                    let y = i32::read(bytes)?;
                    Vec2(x, y)
                }),

                ty::F32VEC2 => FloatVec2({
                    let x = f32::read(bytes)?;
                    let y = f32::read(bytes)?;
                    Vec2(x, y)
                }),

                ty::I32VEC3 => IntVec3({
                    let x = i32::read(bytes)?;
                    let y = i32::read(bytes)?;
                    let z = i32::read(bytes)?;
                    (x, y, z)
                }),

                ty::F32VEC3 => FloatVec3({
                    let x = f32::read(bytes)?;
                    let y = f32::read(bytes)?;
                    let z = f32::read(bytes)?;
                    (x, y, z)
                }),

                ty::CHANNEL_LIST => ChannelList(self::ChannelList::read(
                    &mut PeekRead::new(value_bytes.as_slice())
                )?),

                ty::COMPRESSION => Compression(self::Compression::read(bytes)?),
                ty::LINE_ORDER => LineOrder(self::LineOrder::read(bytes)?),

                ty::TEXT => Text(self::Text::read_sized(bytes, byte_size)?),

                // the text count is implied by the attribute byte size
                ty::TEXT_VECTOR => TextVector(self::Text::read_vec_of_i32_sized(
                    &mut PeekRead::new(value_bytes.as_slice()),
                    byte_size
                )?),

                ty::TILES => TileDescription(self::TileDescription::read(bytes)?),

                _ => Custom { kind: kind.clone(), bytes: value_bytes.clone() }
            })
        };

        Ok(parse())
    }

    /// Check the values that have internal constraints.
    pub fn validate(&self, data_window: IntegerBounds) -> UnitResult {
        use self::AttributeValue::*;

        match *self {
            ChannelList(ref channels) => channels.validate(data_window)?,
            TileDescription(ref value) => value.validate()?,

            TextVector(ref texts) => if texts.is_empty() {
                return Err(Error::invalid("text vector may not be empty"))
            },

            _ => {}
        };

        Ok(())
    }
}



/// The attribute type names used in a file,
/// stored in each attribute record after the attribute name.
pub mod type_names {
    macro_rules! define_attribute_type_names {
        ( $($name: ident : $value: expr),* ) => {
            $(
                /// The byte string for this attribute type, as stored in a file.
                pub const $name: &'static [u8] = $value;
            )*
        };
    }

    define_attribute_type_names! {
        I32BOX2:        b"box2i",
        F32BOX2:        b"box2f",
        I32:            b"int",
        F32:            b"float",
        F64:            b"double",
        RATIONAL:       b"rational",
        I32VEC2:        b"v2i",
        F32VEC2:        b"v2f",
        I32VEC3:        b"v3i",
        F32VEC3:        b"v3f",
        CHANNEL_LIST:   b"chlist",
        COMPRESSION:    b"compression",
        LINE_ORDER:     b"lineOrder",
        TEXT:           b"string",
        TEXT_VECTOR:    b"stringvector",
        TILES:          b"tiledesc"
    }
}
