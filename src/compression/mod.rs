
//! The compression methods a file can declare,
//! and the byte-level compressors for the supported ones.


mod rle;

use crate::error::{Error, Result};


/// Owned pixel bytes.
pub type ByteVec = Vec<u8>;

/// Borrowed pixel bytes.
pub type Bytes<'s> = &'s [u8];


/// How the pixel bytes of each chunk are compressed.
/// All eight methods of the file format are recognized,
/// but only the first two are actually encoded and decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Compression {

    /// Plain pixel bytes. The fastest option,
    /// at the cost of the largest files.
    Uncompressed,

    /// Lossless run-length encoding, one scan line per chunk.
    /// Shines on flat content such as masks and alpha mattes,
    /// while staying almost as fast as uncompressed storage.
    RLE,

    /// Uses ZIP compression to compress each line.
    /// Not supported by this implementation, but carried through
    /// so that files using it can still be inspected.
    ZIP1,

    /// Uses ZIP compression to compress blocks of 16 lines.
    /// Not supported by this implementation.
    ZIP16,

    /// Wavelet and Huffman based compression in blocks of 32 lines,
    /// works well for noisy and natural images.
    /// Not supported by this implementation.
    PIZ,

    /// Like `ZIP16`, but reduces the precision of `f32` samples to 24 bits.
    /// Not supported by this implementation.
    PXR24,

    /// Lossy 4x4 block compression for `f16` samples.
    /// Not supported by this implementation.
    B44,

    /// Like `B44`, but uniformly colored blocks are compressed much more.
    /// Not supported by this implementation.
    B44A,
}

impl std::fmt::Display for Compression {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{} compression", match self {
            Compression::Uncompressed => "no",
            Compression::RLE => "rle",
            Compression::ZIP1 => "zip line",
            Compression::ZIP16 => "zip block",
            Compression::PIZ => "piz",
            Compression::PXR24 => "pxr24",
            Compression::B44 => "b44",
            Compression::B44A => "b44a",
        })
    }
}


impl Compression {

    /// Compress the pixel bytes of a single chunk.
    ///
    /// If the compressed data does not get smaller than the raw data,
    /// the raw data is stored instead, as the file format allows
    /// either representation inside a chunk.
    pub fn compress_bytes(self, uncompressed: ByteVec) -> Result<ByteVec> {
        use self::Compression::*;

        let compressed = match self {
            Uncompressed => return Ok(uncompressed),
            RLE => rle::compress_bytes(&uncompressed)?,
            _ => return Err(Error::unsupported(format!("yet unimplemented compression method: {}", self))),
        };

        if compressed.len() < uncompressed.len() {
            Ok(compressed)
        }
        else {
            // only write compressed if it actually is smaller than raw
            Ok(uncompressed)
        }
    }

    /// Decompress the pixel bytes of a single chunk.
    ///
    /// A chunk with exactly as many bytes as the raw pixel data
    /// is always stored uncompressed, no matter the compression method.
    pub fn decompress_bytes(self, compressed: ByteVec, expected_byte_size: usize) -> Result<ByteVec> {
        use self::Compression::*;

        // the compressor fell back to raw data for this chunk
        if compressed.len() == expected_byte_size {
            return Ok(compressed);
        }

        let bytes = match self {
            Uncompressed => Ok(compressed),
            RLE => rle::decompress_bytes(&compressed, expected_byte_size),
            _ => return Err(Error::unsupported(format!("yet unimplemented compression method: {}", self))),
        };

        // map all errors to compression errors
        let bytes = bytes.map_err(|decompression_error| match decompression_error {
            Error::NotSupported(message) =>
                Error::unsupported(format!("yet unimplemented compression special case ({})", message)),

            error => Error::invalid(format!(
                "compressed {:?} data ({})",
                self, error
            )),
        })?;

        if bytes.len() != expected_byte_size {
            Err(Error::invalid("decompressed data"))
        }
        else { Ok(bytes) }
    }

    /// How many scan lines are bundled into one block,
    /// which is fixed by the compression method.
    pub fn scan_lines_per_block(self) -> usize {
        use self::Compression::*;
        match self {
            Uncompressed | RLE | ZIP1 => 1,
            ZIP16 | PXR24             => 16,
            PIZ | B44 | B44A          => 32,
        }
    }
}


/// Reversible byte transformations that make pixel data
/// more amenable to compression.
mod optimize_bytes {

    /// Sum up the deltas to recover the original byte values.
    pub fn differences_to_samples(buffer: &mut [u8]) {
        for index in 1 .. buffer.len() {
            buffer[index] = (buffer[index - 1] as i32 + buffer[index] as i32 - 128) as u8;
        }
    }

    /// Replace each byte with its delta to the previous byte, biased by 128.
    /// Runs back to front so each delta sees the original neighbor,
    /// not an already replaced one.
    pub fn samples_to_differences(buffer: &mut [u8]) {
        for index in (1 .. buffer.len()).rev() {
            buffer[index] = (buffer[index] as i32 - buffer[index - 1] as i32 + 128) as u8;
        }
    }

    /// Merge the two halves of the array back into alternating bytes.
    pub fn interleave_byte_blocks(separated: &mut [u8]) {
        let mut interleaved = Vec::with_capacity(separated.len());

        // the first half is one byte longer for odd lengths
        let (first_half, second_half) = separated.split_at((separated.len() + 1) / 2);
        let mut second_half = second_half.iter();

        for &first in first_half {
            interleaved.push(first);

            if let Some(&second) = second_half.next() {
                interleaved.push(second);
            }
        }

        separated.copy_from_slice(interleaved.as_slice())
    }

    /// Gather the even-indexed bytes into the first half of the array
    /// and the odd-indexed bytes into the second half.
    pub fn separate_bytes_fragments(source: &mut [u8]) {
        let mut separated = Vec::with_capacity(source.len());
        separated.extend(source.iter().copied().step_by(2));
        separated.extend(source.iter().copied().skip(1).step_by(2));
        source.copy_from_slice(separated.as_slice());
    }


}


#[cfg(test)]
pub mod test {
    use super::*;

    #[test]
    fn incompressible_chunk_is_stored_raw(){
        // accelerating values change their difference at every step,
        // so even after the delta predictor no run remains
        // and the encoder cannot shrink the chunk
        let mut value = 0_u32;
        let noise: ByteVec = (0 .. 256_u32).map(|step| {
            value += step;
            value as u8
        }).collect();

        let stored = Compression::RLE.compress_bytes(noise.clone()).unwrap();
        assert_eq!(stored, noise);

        // reading detects the raw fallback by the byte count alone
        let decompressed = Compression::RLE.decompress_bytes(stored, noise.len()).unwrap();
        assert_eq!(decompressed, noise);
    }

    #[test]
    fn compressible_chunk_shrinks(){
        let flat = vec![ 0_u8; 4096 ];

        let stored = Compression::RLE.compress_bytes(flat.clone()).unwrap();
        assert!(stored.len() < flat.len());

        let decompressed = Compression::RLE.decompress_bytes(stored, flat.len()).unwrap();
        assert_eq!(decompressed, flat);
    }

    #[test]
    fn unsupported_methods_error(){
        for &method in &[
            Compression::ZIP1, Compression::ZIP16, Compression::PIZ,
            Compression::PXR24, Compression::B44, Compression::B44A,
        ] {
            let result = method.compress_bytes(vec![ 0, 1, 2, 3 ]);
            assert!(matches!(result, Err(Error::NotSupported(_))), "{}", method);
        }
    }

    #[test]
    fn wrong_decompressed_size_is_invalid(){
        let compressed = Compression::RLE.compress_bytes(vec![ 0_u8; 512 ]).unwrap();
        let result = Compression::RLE.decompress_bytes(compressed, 513);
        assert!(matches!(result, Err(Error::Invalid(_))));
    }
}
