
//! One chunk of compressed pixel data, as it appears in the file.

use crate::io::*;
use crate::error::{UnitResult, Result, Error};
use crate::meta::header::{Header, Blocks};


/// A single scan line block of pixel data.
/// Contains the pixel data of several consecutive scan lines,
/// compressed with the compression method of the header.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanLineBlock {

    /// The block's y coordinate is equal to the pixel space y
    /// coordinate of the top scan line in the block.
    /// The top scan line block in the image is aligned with the top edge
    /// of the data window, that is, the y coordinate of the top scan line block
    /// is equal to the data window's minimum y.
    pub y_coordinate: i32,

    /// One or more scan lines may be stored together as a scan line block.
    /// The number of scan lines per block depends on how the pixel data is compressed.
    pub compressed_pixels: Vec<u8>,
}


impl ScanLineBlock {

    /// Validate the position of this block against the header.
    pub fn validate(&self, header: &Header) -> UnitResult {
        let data_window = header.data_window();

        let relative_y = self.y_coordinate as i64 - data_window.position.y() as i64;
        if relative_y < 0 || relative_y >= data_window.size.height() as i64 {
            return Err(Error::invalid("scan line block y coordinate"));
        }

        // blocks always start at a multiple of the block height
        if relative_y % header.scan_lines_per_block() as i64 != 0 {
            return Err(Error::invalid("scan line block y coordinate"));
        }

        Ok(())
    }

    /// Without validation, write this instance to the byte stream.
    pub fn write<W: Write>(&self, write: &mut W) -> UnitResult {
        self.y_coordinate.write(write)?;
        u8::write_i32_sized_slice(write, &self.compressed_pixels)?;
        Ok(())
    }

    /// Read a scan line block. Tiled and deep images are rejected based on the header.
    pub fn read(read: &mut impl Read, header: &Header) -> Result<Self> {
        if header.blocks != Blocks::ScanLines {
            return Err(Error::unsupported("tiled pixel data"));
        }

        let max_block_byte_size = header.max_block_byte_size().min(std::u16::MAX as usize * 16);

        let y_coordinate = i32::read(read)?;
        let compressed_pixels = u8::read_i32_sized_vec(
            read, max_block_byte_size, Some(max_block_byte_size), "scan line block size"
        )?;

        let block = ScanLineBlock { y_coordinate, compressed_pixels };
        block.validate(header)?;
        Ok(block)
    }
}
