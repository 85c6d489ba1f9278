
//! Encode and decode the OpenEXR scan line binary format:
//! the self-describing attribute stream that forms a file header,
//! 16 bit floating point conversion, the exr flavour of run length
//! encoding, and the chunked scan line pixel layout with its offset table.
//!
//! Writing starts with `output::ScanLineWriter`,
//! reading starts with `meta::MetaData::read_from_buffered`.

#![forbid(unsafe_code)]

pub mod io;
pub mod math;
pub mod half;
pub mod chunk;
pub mod compression;
pub mod meta;
pub mod output;
pub mod error;

#[macro_use]
extern crate smallvec;


pub mod prelude {

    // main entry points
    pub use crate::output::{ScanLineWriter, FrameBuffer, PixelSource, SampleSlice};
    pub use crate::meta::MetaData;

    // secondary data types
    pub use crate::meta::header::Header;
    pub use crate::meta::attribute::{
        Text, AttributeValue, ChannelList, ChannelDescription,
        SampleType, LineOrder, IntegerBounds,
    };

    pub use crate::compression::Compression;
    pub use crate::error::{Error, Result, UnitResult};
    pub use crate::math::Vec2;

    // re-export external stuff
    pub use ::half::f16;
}
