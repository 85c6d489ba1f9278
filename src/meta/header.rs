
//! The header of a single-part image,
//! with all attributes required to decode the pixel data.

use std::convert::TryFrom;
use smallvec::SmallVec;

use crate::io::*;
use crate::error::*;
use crate::math::Vec2;
use crate::meta::*;
use crate::meta::attribute::*;


/// Describes the image contained in a file.
/// One header describes all channels and the layout of the pixel data.
#[derive(Clone, Debug, PartialEq)]
pub struct Header {

    /// List of channels in this image, sorted alphabetically.
    pub channels: ChannelList,

    /// How the pixel data of all channels in this image is compressed. May be `Compression::Uncompressed`.
    pub compression: Compression,

    /// Describes how the pixels of this image are divided into smaller blocks.
    /// Tiled images can be described, but their pixel data can neither be read nor written.
    pub blocks: Blocks,

    /// In what order the pixel data chunks occur in the file.
    pub line_order: LineOrder,

    /// The resolution of this image. Equals the size of the data window.
    pub data_size: Vec2<usize>,

    /// Where the data window sits in the shared 2D coordinate space,
    /// specified by its top left corner.
    pub data_position: Vec2<i32>,

    /// The region of the shared 2D coordinate space
    /// that a viewer should present.
    pub display_window: IntegerBounds,

    /// Width of a pixel divided by its height.
    pub pixel_aspect: f32,

    /// Center of the screen window, for perspective projection.
    /// Usually `(0, 0)`.
    pub screen_window_center: Vec2<f32>,

    /// Width of the screen window, for perspective projection.
    /// Usually `1`.
    pub screen_window_width: f32,

    /// How many pixel chunks this image consists of.
    /// Derived from the size, compression and block layout,
    /// so prefer `Header::with_encoding` over setting fields directly,
    /// which keeps this number consistent.
    pub chunk_count: usize,

    /// Optional attributes. Contains custom attributes, in the order they appear in the file.
    /// Does not contain the attributes already present in the `Header` struct.
    pub custom_attributes: Vec<(Text, AttributeValue)>,
}

/// How the image pixels are split up into separate blocks.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Blocks {

    /// The image is divided into scan line blocks.
    /// The number of scan lines in a block depends on the compression method.
    ScanLines,

    /// The image is divided into tile blocks.
    /// Also specifies the size of each tile in the image
    /// and whether this image contains multiple resolution levels.
    Tiles(TileDescription)
}

impl Blocks {

    /// Whether this image is tiled. If false, this image is divided into scan line blocks.
    pub fn has_tiles(&self) -> bool {
        match self {
            Blocks::Tiles { .. } => true,
            _ => false
        }
    }
}


impl Header {

    /// A header for an image of the specified size and channels.
    ///
    /// Everything else starts out with defaults: uncompressed scan lines
    /// in increasing order, a display window matching the data window,
    /// and no custom attributes.
    pub fn new(data_size: impl Into<Vec2<usize>>, channels: SmallVec<[ChannelDescription; 5]>) -> Self {
        let data_size: Vec2<usize> = data_size.into();
        let compression = Compression::Uncompressed;
        let blocks = Blocks::ScanLines;

        Self {
            data_size,
            compression,
            blocks,

            channels: ChannelList::new(channels),
            line_order: LineOrder::Increasing,

            data_position: Vec2(0, 0),
            display_window: IntegerBounds::from_dimensions(data_size),
            pixel_aspect: 1.0,
            screen_window_center: Vec2(0.0, 0.0),
            screen_window_width: 1.0,

            chunk_count: compute_chunk_count(compression, data_size, blocks),
            custom_attributes: Vec::new(),
        }
    }

    /// Replace the display window.
    pub fn with_display_window(mut self, display_window: IntegerBounds) -> Self {
        self.display_window = display_window;
        self
    }

    /// Set the position of the data window.
    pub fn with_position(mut self, position: Vec2<i32>) -> Self {
        self.data_position = position;
        self
    }

    /// Set compression and line order. Automatically computes chunk count.
    pub fn with_encoding(self, compression: Compression, line_order: LineOrder) -> Self {
        Self {
            chunk_count: compute_chunk_count(compression, self.data_size, self.blocks),
            compression, line_order,
            .. self
        }
    }

    /// Add some custom attributes to the header.
    pub fn with_attributes(self, custom_attributes: Vec<(Text, AttributeValue)>) -> Self {
        Self { custom_attributes, .. self }
    }

    /// The bounding box of the pixel data
    /// within the shared 2D coordinate space.
    pub fn data_window(&self) -> IntegerBounds {
        IntegerBounds::new(self.data_position, self.data_size)
    }

    /// The number of scan lines in all blocks except the last one.
    pub fn scan_lines_per_block(&self) -> usize {
        self.compression.scan_lines_per_block()
    }

    /// Whether any channel or attribute name is longer than 31 chars,
    /// which old readers only accept when announced in the version flags.
    pub fn has_long_names(&self) -> bool {
        let is_long = |name: &Text| name.as_slice().len() >= 32;

        self.channels.list.iter().any(|channel| is_long(&channel.name))
            || self.custom_attributes.iter().any(|(name, _)| is_long(name))
    }

    /// Upper bound on the byte count of any single block,
    /// whether compressed or not.
    pub fn max_block_byte_size(&self) -> usize {
        self.channels.bytes_per_pixel * match self.blocks {
            Blocks::Tiles(tiles) => tiles.tile_size.area(),
            Blocks::ScanLines => self.compression.scan_lines_per_block() * self.data_size.width()
        }
    }

    /// Validate this instance. Adjusts `long_names` if a long attribute name is used.
    pub fn validate(&self, long_names: &mut bool, strict: bool) -> UnitResult {
        debug_assert_eq!(
            self.chunk_count, compute_chunk_count(self.compression, self.data_size, self.blocks),
            "incorrect chunk count value"
        );

        self.data_window().validate(None)?;
        self.display_window.validate(None)?;

        if let Blocks::Tiles(tiles) = self.blocks {
            tiles.validate()?;
        }

        if strict {
            if self.blocks == Blocks::ScanLines && self.line_order == LineOrder::Unspecified {
                return Err(Error::invalid("unspecified line order in scan line images"));
            }

            if self.data_size == Vec2(0, 0) {
                return Err(Error::invalid("empty data window"));
            }

            if self.display_window.size == Vec2(0, 0) {
                return Err(Error::invalid("empty display window"));
            }

            if !self.pixel_aspect.is_normal() || self.pixel_aspect < 1.0e-6 || self.pixel_aspect > 1.0e6 {
                return Err(Error::invalid("pixel aspect ratio"));
            }

            if self.screen_window_width < 0.0 {
                return Err(Error::invalid("screen window width"));
            }
        }

        self.channels.validate(self.data_window())?;

        for (name, value) in &self.custom_attributes {
            attribute::validate(name, value, long_names, self.data_window())?;
        }

        // required attributes must not be duplicated as custom attributes
        if strict {
            for &reserved in standard_names::ALL.iter() {
                if self.custom_attributes.iter().any(|(name, _)| name.as_slice() == reserved) {
                    return Err(Error::invalid(format!(
                        "attribute name `{}` is reserved and cannot be custom",
                        Text::from_bytes_unchecked(reserved.into())
                    )));
                }
            }
        }

        Ok(())
    }

    /// Parse a header from its attribute records,
    /// skipping the final validation step.
    pub fn read(read: &mut PeekRead<impl Read>, requirements: &Requirements, skip_invalid_attributes: bool) -> Result<Self> {
        let max_string_len = if requirements.has_long_names { 256 } else { 32 };

        // collected while scanning the attribute records
        let mut tiles = None;
        let mut block_type = None;
        let mut chunk_count = None;
        let mut channels = None;
        let mut compression = None;
        let mut data_window = None;
        let mut display_window = None;
        let mut line_order = None;
        let mut pixel_aspect = None;
        let mut screen_window_center = None;
        let mut screen_window_width = None;
        let mut custom_attributes = Vec::new();

        while !sequence_end::has_come(read)? {
            let (attribute_name, value) = attribute::read(read, max_string_len)?;

            match value {
                Ok(value) => {
                    use crate::meta::header::standard_names as name;
                    use crate::meta::attribute::AttributeValue::*;

                    // reserved names go into their dedicated slot, but only
                    // when the value has the expected type. everything else
                    // lands in the custom attribute list
                    match (attribute_name.bytes(), value) {
                        (name::BLOCK_TYPE, Text(value)) => block_type = Some(parse_block_type(value)?),
                        (name::TILES, TileDescription(value)) => tiles = Some(value),
                        (name::CHANNELS, ChannelList(value)) => channels = Some(value),
                        (name::COMPRESSION, Compression(value)) => compression = Some(value),
                        (name::DATA_WINDOW, IntegerBounds(value)) => data_window = Some(value),
                        (name::DISPLAY_WINDOW, IntegerBounds(value)) => display_window = Some(value),
                        (name::LINE_ORDER, LineOrder(value)) => line_order = Some(value),
                        (name::PIXEL_ASPECT, F32(value)) => pixel_aspect = Some(value),
                        (name::WINDOW_CENTER, FloatVec2(value)) => screen_window_center = Some(value),
                        (name::WINDOW_WIDTH, F32(value)) => screen_window_width = Some(value),

                        (name::CHUNKS, I32(value)) => chunk_count = Some(
                            i32_to_usize(value, "chunk count")?
                        ),

                        (_, value) => {
                            custom_attributes.push((attribute_name, value));
                        },
                    }
                },

                // a single broken attribute does not corrupt
                // the rest of the stream, so the caller may
                // choose to ignore it
                Err(error) => {
                    if !skip_invalid_attributes { return Err(error); }
                }
            }
        }

        let compression = compression.ok_or(missing_attribute("compression"))?;
        let data_window = data_window.ok_or(missing_attribute("data window"))?;
        let display_window = display_window.ok_or(missing_attribute("display window"))?;
        let channels = channels.ok_or(missing_attribute("channels"))?;

        let blocks = match block_type {
            Some(BlockType::Tile) => Blocks::Tiles(tiles.ok_or(missing_attribute("tiles"))?),
            None if requirements.is_single_layer_and_tiled => Blocks::Tiles(tiles.ok_or(missing_attribute("tiles"))?),
            _ => Blocks::ScanLines,
        };

        // the chunk count computation would panic on absurd sizes
        data_window.validate(None)?;

        let data_size = data_window.size;

        let computed_chunk_count = compute_chunk_count(compression, data_size, blocks);
        if chunk_count.is_some() && chunk_count != Some(computed_chunk_count) {
            return Err(Error::invalid("chunk count not matching data size"));
        }

        Ok(Header {
            compression,

            // never trust the stored count over the computed one
            chunk_count: computed_chunk_count,

            data_size,
            data_position: data_window.position,
            display_window,

            channels,
            line_order: line_order.unwrap_or(LineOrder::Unspecified),

            pixel_aspect: pixel_aspect.unwrap_or(1.0),
            screen_window_center: screen_window_center.unwrap_or(Vec2(0.0, 0.0)),
            screen_window_width: screen_window_width.unwrap_or(1.0),

            blocks,
            custom_attributes,
        })
    }

    /// Store all attribute records and the terminating null byte,
    /// without validation.
    pub fn write(&self, write: &mut impl Write) -> UnitResult {

        macro_rules! write_attributes {
            ( $($name: ident : $variant: ident = $value: expr),* ) => { $(
                attribute::write($name, & $variant ($value .clone()), write)?;
            )* };
        }

        {
            use crate::meta::header::standard_names::*;
            use AttributeValue::*;

            fn usize_as_i32(value: usize) -> AttributeValue {
                I32(i32::try_from(value).expect("usize exceeds i32 range"))
            }

            write_attributes!(
                DATA_WINDOW: IntegerBounds = &self.data_window(),
                DISPLAY_WINDOW: IntegerBounds = &self.display_window,
                PIXEL_ASPECT: F32 = &self.pixel_aspect,
                WINDOW_WIDTH: F32 = &self.screen_window_width,
                WINDOW_CENTER: FloatVec2 = &self.screen_window_center,
                COMPRESSION: Compression = &self.compression,
                LINE_ORDER: LineOrder = &self.line_order,

                // optional in the file format, but cheap to provide
                CHUNKS: usize_as_i32 = &self.chunk_count,

                CHANNELS: ChannelList = &self.channels
            );

            if let Blocks::Tiles(tiles) = self.blocks {
                attribute::write(TILES, &TileDescription(tiles), write)?;
            }
        }

        for (name, value) in &self.custom_attributes {
            attribute::write(name.bytes(), value, write)?;
        }

        sequence_end::write(write)?;
        Ok(())
    }
}


/// The kind of image stored in a file, as named by the `type` attribute.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum BlockType {

    /// A flat scan line image.
    ScanLine,

    /// A flat tiled image.
    Tile,
}

fn parse_block_type(text: Text) -> Result<BlockType> {
    if text.eq("scanlineimage") { Ok(BlockType::ScanLine) }
    else if text.eq("tiledimage") { Ok(BlockType::Tile) }
    else if text.eq("deepscanline") || text.eq("deeptile") { Err(Error::unsupported("deep data")) }
    else { Err(Error::invalid("image type attribute value")) }
}


/// The attribute names that have a dedicated slot in the header struct.
/// These may not appear as custom attributes.
pub mod standard_names {
    macro_rules! define_required_attribute_names {
        ( $($name: ident  :  $value: expr),* ) => {

            /// Every reserved attribute name.
            pub const ALL: &'static [&'static [u8]] = &[
                $( $value ),*
            ];

            $(
                /// The byte string for this attribute name, as stored in a file.
                pub const $name: &'static [u8] = $value;
            )*
        };
    }

    define_required_attribute_names! {
        TILES: b"tiles",
        BLOCK_TYPE: b"type",
        CHUNKS: b"chunkCount",
        CHANNELS: b"channels",
        COMPRESSION: b"compression",
        DATA_WINDOW: b"dataWindow",
        DISPLAY_WINDOW: b"displayWindow",
        LINE_ORDER: b"lineOrder",
        PIXEL_ASPECT: b"pixelAspectRatio",
        WINDOW_CENTER: b"screenWindowCenter",
        WINDOW_WIDTH: b"screenWindowWidth"
    }
}
