
//! Low-level binary input and output,
//! tied into the error type of this crate.

pub use ::std::io::{Read, Write};

use ::half::f16;
use half::slice::HalfFloatSliceExt;
use lebe::prelude::*;
use crate::error::{Error, Result, UnitResult, IoResult};
use std::convert::TryFrom;
use std::io::{Seek, SeekFrom};


/// Discard the specified number of bytes without allocating a buffer.
#[inline]
pub fn skip_bytes(read: &mut impl Read, count: u64) -> IoResult<()> {
    let mut remaining = read.by_ref().take(count);
    let skipped = std::io::copy(&mut remaining, &mut std::io::sink())?;

    // the source may run dry before the requested count is reached
    if skipped < count {
        return Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "cannot skip more bytes than exist"
        ));
    }

    debug_assert_eq!(skipped, count, "skip bytes bug");
    Ok(())
}


/// A reader that can look at the next byte without consuming it.
#[derive(Debug)]
pub struct PeekRead<T> {

    // never exposed, as the peeked byte would go missing
    inner: T,

    peeked: Option<IoResult<u8>>,
}

impl<T: Read> PeekRead<T> {

    /// Wrap a reader so that single bytes can be inspected in advance.
    #[inline]
    pub fn new(inner: T) -> Self {
        Self { inner, peeked: None }
    }

    /// Look at the next byte without consuming it.
    /// A subsequent `read` call still starts at that byte.
    #[inline]
    pub fn peek_u8(&mut self) -> &IoResult<u8> {
        if self.peeked.is_none() {
            self.peeked = Some(u8::read_from_little_endian(&mut self.inner));
        }

        self.peeked.as_ref().unwrap() // the option was just filled
    }

    /// Consume the next byte only if it equals the expected value,
    /// returning whether it did. Io errors are passed through and
    /// clear the peeked state, as they cannot be cloned.
    #[inline]
    pub fn skip_if_eq(&mut self, expected: u8) -> IoResult<bool> {
        match self.peek_u8() {
            Ok(next) if *next == expected => {
                self.peeked = None;
                Ok(true)
            },

            Ok(_) => Ok(false),

            // the take().unwrap() pair cannot fail,
            // peek_u8 always fills the option
            Err(_) => Err(self.peeked.take().unwrap().err().unwrap()),
        }
    }
}

impl<T: Read> Read for PeekRead<T> {
    fn read(&mut self, buffer: &mut [u8]) -> IoResult<usize> {
        if buffer.is_empty() {
            return Ok(0)
        }

        match self.peeked.take() {
            None => self.inner.read(buffer),

            Some(peeked) => {
                // the buffer has at least one slot at this point
                buffer[0] = peeked?;
                let additional = self.inner.read(&mut buffer[1..])?;
                Ok(additional + 1)
            }
        }
    }
}


/// A reader or writer that knows its current byte position,
/// so that earlier positions can be revisited later.
#[derive(Debug)]
pub struct Tracking<T> {

    // seeking the inner value directly would desynchronize the position
    inner: T,

    position: usize,
}

impl<T> Tracking<T> {

    /// Start tracking at position zero.
    /// If `inner` is a reference, all seeking must go through this wrapper.
    pub fn new(inner: T) -> Self {
        Tracking { inner, position: 0 }
    }

    /// How many bytes have been read or written so far.
    pub fn byte_position(&self) -> usize {
        self.position
    }

    /// Unwrap the inner reader or writer.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: Read> Read for Tracking<T> {
    fn read(&mut self, buffer: &mut [u8]) -> IoResult<usize> {
        let count = self.inner.read(buffer)?;
        self.position += count;
        Ok(count)
    }
}

impl<T: Write> Write for Tracking<T> {
    fn write(&mut self, buffer: &[u8]) -> IoResult<usize> {
        let count = self.inner.write(buffer)?;
        self.position += count;
        Ok(count)
    }

    fn flush(&mut self) -> IoResult<()> {
        self.inner.flush()
    }
}

impl<T: Write + Seek> Tracking<T> {

    /// Move the writing cursor to the specified byte position,
    /// leaving the bytes in between untouched.
    pub fn seek_write_to(&mut self, target_position: usize) -> IoResult<()> {
        if target_position != self.position {
            self.inner.seek(SeekFrom::Start(target_position as u64))?;
            self.position = target_position;
        }

        Ok(())
    }
}


/// Little-endian binary encoding for a primitive value.
pub trait Data: Sized + Default + Clone {

    /// Number of bytes one value occupies in a file.
    const BYTE_SIZE: usize = ::std::mem::size_of::<Self>();

    /// Decode a single value.
    fn read(read: &mut impl Read) -> Result<Self>;

    /// Fill the whole slice with decoded values.
    /// Fails with `Error::Invalid` if the source ends too early.
    fn read_slice(read: &mut impl Read, slice: &mut [Self]) -> UnitResult;

    /// Encode a single value.
    fn write(self, write: &mut impl Write) -> UnitResult;

    /// Encode every value in the slice, back to back.
    fn write_slice(write: &mut impl Write, slice: &[Self]) -> UnitResult;

    /// Decode `data_size` values into a new vector.
    ///
    /// Grows the allocation in steps of at most `soft_max` elements,
    /// so that an absurd size claimed by a corrupt file does not
    /// reserve gigabytes up front. A claimed size above `hard_max`
    /// is rejected outright with the specified purpose in the message.
    #[inline]
    fn read_vec(read: &mut impl Read, data_size: usize, soft_max: usize, hard_max: Option<usize>, purpose: &'static str) -> Result<Vec<Self>> {
        let mut items = Vec::with_capacity(data_size.min(soft_max));
        Self::read_into_vec(read, &mut items, data_size, soft_max, hard_max, purpose)?;
        Ok(items)
    }

    /// Decode `data_size` values, appending them to an existing vector.
    ///
    /// Grows the allocation in steps of at most `soft_max` elements.
    /// A claimed size above `hard_max` is rejected outright.
    #[inline]
    fn read_into_vec(read: &mut impl Read, data: &mut Vec<Self>, data_size: usize, soft_max: usize, hard_max: Option<usize>, purpose: &'static str) -> UnitResult {
        if let Some(max) = hard_max {
            if data_size > max {
                return Err(Error::invalid(purpose))
            }
        }

        let step = hard_max.unwrap_or(soft_max).min(soft_max);
        let end = data.len() + data_size;

        // usually a single iteration, more only for oversized claims
        while data.len() < end {
            let chunk_start = data.len();
            let chunk_end = (chunk_start + step).min(end);

            data.resize(chunk_end, Self::default());
            Self::read_slice(read, &mut data[chunk_start .. chunk_end])?;
        }

        Ok(())
    }

    /// Encode the element count as `i32`, then all elements.
    #[inline]
    fn write_i32_sized_slice<W: Write>(write: &mut W, slice: &[Self]) -> UnitResult {
        let count = i32::try_from(slice.len())
            .map_err(|_| Error::invalid("byte array length"))?;

        count.write(write)?;
        Self::write_slice(write, slice)
    }

    /// Decode an `i32` element count, then that many elements.
    /// Allocation limits work as in `read_vec`.
    #[inline]
    fn read_i32_sized_vec(read: &mut impl Read, soft_max: usize, hard_max: Option<usize>, purpose: &'static str) -> Result<Vec<Self>> {
        let count = usize::try_from(i32::read(read)?)
            .map_err(|_| Error::invalid("negative array size"))?;

        Self::read_vec(read, count, soft_max, hard_max, purpose)
    }
}


macro_rules! implement_data_for_primitive {
    ($kind: ident) => {
        impl Data for $kind {
            #[inline]
            fn read(read: &mut impl Read) -> Result<Self> {
                Ok(read.read_from_little_endian()?)
            }

            #[inline]
            fn write(self, write: &mut impl Write) -> UnitResult {
                write.write_as_little_endian(&self)?;
                Ok(())
            }

            #[inline]
            fn read_slice(read: &mut impl Read, slice: &mut [Self]) -> UnitResult {
                read.read_from_little_endian_into(slice)?;
                Ok(())
            }

            #[inline]
            fn write_slice(write: &mut impl Write, slice: &[Self]) -> UnitResult {
                write.write_as_little_endian(slice)?;
                Ok(())
            }
        }
    };
}

implement_data_for_primitive!(u8);
implement_data_for_primitive!(i8);
implement_data_for_primitive!(i16);
implement_data_for_primitive!(u16);
implement_data_for_primitive!(u32);
implement_data_for_primitive!(i32);
implement_data_for_primitive!(i64);
implement_data_for_primitive!(u64);
implement_data_for_primitive!(f32);
implement_data_for_primitive!(f64);

// f16 values travel as their u16 bit patterns.
// whole slices are reinterpreted instead of converted one by one
impl Data for f16 {
    #[inline]
    fn read(read: &mut impl Read) -> Result<Self> {
        u16::read(read).map(f16::from_bits)
    }

    #[inline]
    fn read_slice(read: &mut impl Read, slice: &mut [Self]) -> UnitResult {
        u16::read_slice(read, slice.reinterpret_cast_mut())
    }

    #[inline]
    fn write(self, write: &mut impl Write) -> UnitResult {
        self.to_bits().write(write)
    }

    #[inline]
    fn write_slice(write: &mut impl Write, slice: &[Self]) -> UnitResult {
        u16::write_slice(write, slice.reinterpret_cast())
    }
}


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn peeking_does_not_consume() {
        let bytes: &[u8] = &[11, 12, 13, 14];
        let mut peek = PeekRead::new(bytes);

        // peeking twice yields the same byte
        assert_eq!(peek.peek_u8().as_ref().unwrap(), &11);
        assert_eq!(peek.peek_u8().as_ref().unwrap(), &11);
        assert_eq!(u8::read(&mut peek).unwrap(), 11);

        let mut middle = [0; 2];
        peek.read_exact(&mut middle).unwrap();
        assert_eq!(middle, [12, 13]);

        assert_eq!(peek.peek_u8().as_ref().unwrap(), &14);
        assert_eq!(u8::read(&mut peek).unwrap(), 14);

        assert!(peek.peek_u8().is_err());
        assert!(peek.peek_u8().is_err());
        assert!(u8::read(&mut peek).is_err());
    }

    #[test]
    fn conditional_skipping() {
        let bytes: &[u8] = &[7, 8];
        let mut peek = PeekRead::new(bytes);

        assert_eq!(peek.skip_if_eq(3).unwrap(), false);
        assert_eq!(peek.skip_if_eq(7).unwrap(), true);
        assert_eq!(peek.skip_if_eq(8).unwrap(), true);
        assert!(peek.peek_u8().is_err());
    }

    #[test]
    fn revisiting_a_position_preserves_other_bytes() {
        let mut tracked = Tracking::new(std::io::Cursor::new(Vec::new()));

        u8::write_slice(&mut tracked, &[0, 0, 5, 6, 7, 8]).unwrap();

        // patch the placeholder bytes, then return to the end
        tracked.seek_write_to(0).unwrap();
        u8::write_slice(&mut tracked, &[1, 2]).unwrap();
        tracked.seek_write_to(6).unwrap();

        assert_eq!(tracked.byte_position(), 6);
        assert_eq!(tracked.into_inner().into_inner(), vec![1, 2, 5, 6, 7, 8]);
    }

    #[test]
    fn oversized_claims_are_rejected() {
        let bytes = [0_u8; 4];

        let result = u8::read_vec(&mut bytes.as_slice(), 1000, 64, Some(512), "test data");
        assert!(result.is_err());

        let fitting = u8::read_vec(&mut bytes.as_slice(), 4, 64, Some(512), "test data").unwrap();
        assert_eq!(fitting, vec![0, 0, 0, 0]);
    }
}
