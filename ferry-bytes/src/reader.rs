//! Internal: Declare the Reader type for ferry-bytes

use crate::{Error, Readable, Result};
use arrayref::array_ref;

/// A type for reading messages from a slice of bytes.
///
/// Unlike io::Read, this object has a simpler error type, and is designed
/// for in-memory parsing only.  A `Truncated` error means that the
/// message may simply not be complete yet: callers that read from a
/// network typically wait for more bytes and retry.
///
/// # Examples
///
/// You can use a Reader to extract information byte-by-byte:
///
/// ```
/// use ferry_bytes::{Reader, Result};
/// let msg = [0x05, 0x01, 0x00, 0x01, 0xbb];
/// let mut r = Reader::from_slice(&msg[..]);
/// // Multi-byte values are always big-endian.
/// assert_eq!(r.take_u8()?, 5);
/// assert_eq!(r.take_u16()?, 0x0100);
/// assert_eq!(r.take_u16()?, 0x01bb);
/// r.should_be_exhausted()?;
/// # Result::Ok(())
/// ```
///
/// You can also use a Reader to extract objects that implement Readable.
///
/// ```
/// use ferry_bytes::{Reader, Result, Readable};
/// let msg = [0x00, 0x2b, 0x04, 0x38];
/// let mut r = Reader::from_slice(&msg[..]);
///
/// let count: u16 = r.extract()?;
/// let port: u16 = r.extract()?;
/// assert_eq!(count, 43);
/// assert_eq!(port, 1080);
/// # Result::Ok(())
/// ```
pub struct Reader<'a> {
    /// The underlying slice that we're reading from
    b: &'a [u8],
    /// The next position in the slice that we intend to read from.
    off: usize,
}

impl<'a> Reader<'a> {
    /// Construct a new Reader from a slice of bytes.
    pub fn from_slice(slice: &'a [u8]) -> Self {
        Reader { b: slice, off: 0 }
    }
    /// Construct a new Reader from a 'Bytes' object.
    pub fn from_bytes(b: &'a bytes::Bytes) -> Self {
        Self::from_slice(b.as_ref())
    }
    /// Return the total length of the slice in this reader, including
    /// consumed bytes and remaining bytes.
    pub fn total_len(&self) -> usize {
        self.b.len()
    }
    /// Return the total number of bytes in this reader that have not
    /// yet been read.
    pub fn remaining(&self) -> usize {
        self.b.len() - self.off
    }
    /// Consume this reader, and return a slice containing the remaining
    /// bytes from its slice that it did not consume.
    pub fn into_rest(self) -> &'a [u8] {
        &self.b[self.off..]
    }
    /// Return the total number of bytes in this reader that have
    /// already been read.
    pub fn consumed(&self) -> usize {
        self.off
    }
    /// Skip `n` bytes from the reader.
    ///
    /// Returns Ok on success.  Returns Err(Error::Truncated) if there were
    /// not enough bytes to skip.
    pub fn advance(&mut self, n: usize) -> Result<()> {
        if n > self.remaining() {
            return Err(Error::Truncated);
        }
        self.off += n;
        Ok(())
    }
    /// Check whether this reader is exhausted (out of bytes).
    ///
    /// Return Ok if it is, and Err(Error::ExtraneousBytes)
    /// if there were extra bytes.
    pub fn should_be_exhausted(&self) -> Result<()> {
        if self.remaining() != 0 {
            return Err(Error::ExtraneousBytes);
        }
        Ok(())
    }
    /// Try to return a slice of `n` bytes from this reader without
    /// consuming them.
    ///
    /// On success, returns Ok(slice).  If there are fewer than n
    /// bytes, returns Err(Error::Truncated).
    pub fn peek(&self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(Error::Truncated);
        }

        Ok(&self.b[self.off..(n + self.off)])
    }
    /// Try to consume and return a slice of `n` bytes from this reader.
    ///
    /// On success, returns Ok(Slice).  If there are fewer than n
    /// bytes, returns Err(Error::Truncated).
    pub fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let b = self.peek(n)?;
        self.advance(n)?;
        Ok(b)
    }
    /// Try to consume and return a u8 from this reader.
    pub fn take_u8(&mut self) -> Result<u8> {
        let b = self.take(1)?;
        Ok(b[0])
    }
    /// Try to consume and return a big-endian u16 from this reader.
    pub fn take_u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        let r = u16::from_be_bytes(*array_ref![b, 0, 2]);
        Ok(r)
    }
    /// Try to consume and return a big-endian u32 from this reader.
    pub fn take_u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        let r = u32::from_be_bytes(*array_ref![b, 0, 4]);
        Ok(r)
    }
    /// Try to consume and return a big-endian u64 from this reader.
    pub fn take_u64(&mut self) -> Result<u64> {
        let b = self.take(8)?;
        let r = u64::from_be_bytes(*array_ref![b, 0, 8]);
        Ok(r)
    }
    /// Try to consume and return a big-endian u128 from this reader.
    pub fn take_u128(&mut self) -> Result<u128> {
        let b = self.take(16)?;
        let r = u128::from_be_bytes(*array_ref![b, 0, 16]);
        Ok(r)
    }
    /// Try to decode and remove a Readable from this reader, using its
    /// take_from() method.
    ///
    /// On failure, consumes nothing.
    pub fn extract<E: Readable>(&mut self) -> Result<E> {
        let off_orig = self.off;
        let result = E::take_from(self);
        if result.is_err() {
            // We encountered an error; we should rewind.
            self.off = off_orig;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_ok() {
        let bytes = b"a field guide to getting lost";
        let mut r = Reader::from_slice(&bytes[..]);

        assert_eq!(r.consumed(), 0);
        assert_eq!(r.remaining(), 29);
        assert_eq!(r.total_len(), 29);

        assert_eq!(r.take(2).unwrap(), &b"a "[..]);
        assert_eq!(r.consumed(), 2);

        assert_eq!(r.take_u16().unwrap(), 0x6669);
        assert_eq!(r.take_u8().unwrap(), 0x65);
        assert_eq!(r.take_u64().unwrap(), 0x6c64206775696465);
        assert_eq!(r.take_u32().unwrap(), 0x20746f20);
        assert_eq!(r.consumed(), 17);
        assert_eq!(r.remaining(), 12);

        assert_eq!(r.peek(7).unwrap(), &b"getting"[..]);
        assert_eq!(r.consumed(), 17); // no change

        r.advance(8).unwrap();
        assert_eq!(r.consumed(), 25);

        let rem = r.into_rest();
        assert_eq!(rem, &b"lost"[..]);

        // We can still take a zero-length slice at the very end.
        let mut r = Reader::from_slice(&bytes[..]);
        r.advance(29).unwrap();
        assert_eq!(r.take(0).unwrap(), &b""[..]);
    }

    #[test]
    fn read_u128() {
        let bytes = bytes::Bytes::from(&b"\x01irreversibility?"[..]); // 17 bytes
        let mut r = Reader::from_bytes(&bytes);

        assert_eq!(r.take_u8().unwrap(), 1);
        assert_eq!(r.take_u128().unwrap(), 0x69727265766572736962696c697479_3f);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn read_missing() {
        let bytes = b"2718281";
        let mut r = Reader::from_slice(&bytes[..]);

        assert_eq!(r.take_u64(), Err(Error::Truncated));
        assert_eq!(r.take(8), Err(Error::Truncated));
        assert_eq!(r.peek(8), Err(Error::Truncated));

        // A failed take consumes nothing.
        assert_eq!(r.consumed(), 0);
        assert_eq!(r.remaining(), 7);

        assert_eq!(r.take_u32().unwrap(), 0x32373138);
        assert_eq!(r.take_u32(), Err(Error::Truncated));
        assert_eq!(r.take_u16().unwrap(), 0x3238);
        assert_eq!(r.take_u16(), Err(Error::Truncated));
        assert_eq!(r.take_u8().unwrap(), 0x31);
        assert_eq!(r.take_u8(), Err(Error::Truncated));

        assert_eq!(r.consumed(), 7);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn advance_too_far() {
        let bytes = b"98765";
        let mut r = Reader::from_slice(&bytes[..]);
        assert_eq!(r.remaining(), 5);
        assert_eq!(r.advance(6), Err(Error::Truncated));
        assert_eq!(r.remaining(), 5);
        assert_eq!(r.advance(5), Ok(()));
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn exhaust() {
        let r = Reader::from_slice(&b""[..]);
        assert_eq!(r.should_be_exhausted(), Ok(()));

        let mut r = Reader::from_slice(&b"rest"[..]);
        assert_eq!(r.should_be_exhausted(), Err(Error::ExtraneousBytes));
        r.take(3).unwrap();
        assert_eq!(r.should_be_exhausted(), Err(Error::ExtraneousBytes));
        r.take(1).unwrap();
        assert_eq!(r.should_be_exhausted(), Ok(()));
    }

    #[test]
    fn extract() {
        // For example purposes, declare a length-then-bytes string type.
        #[derive(Debug)]
        struct LenEnc(Vec<u8>);
        impl Readable for LenEnc {
            fn take_from(b: &mut Reader<'_>) -> Result<Self> {
                let length = b.take_u8()?;
                let content = b.take(length as usize)?.into();
                Ok(LenEnc(content))
            }
        }

        let bytes = b"\x09localhost\x07example";
        let mut r = Reader::from_slice(&bytes[..]);

        let le: LenEnc = r.extract().unwrap();
        assert_eq!(&le.0[..], &b"localhost"[..]);

        let le: LenEnc = r.extract().unwrap();
        assert_eq!(&le.0[..], &b"example"[..]);

        // Make sure that we don't advance on a failing extract().
        let mut r = Reader::from_slice(&b"\x09local"[..]);
        let le: Result<LenEnc> = r.extract();
        assert_eq!(le.unwrap_err(), Error::Truncated);
        assert_eq!(r.remaining(), 6);
    }
}
