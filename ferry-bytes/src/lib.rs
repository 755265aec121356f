//! Utilities to decode/encode things into bytes.
//!
//! We use these to build and parse all the byte-encoded messages of
//! the SOCKS5 protocol.  Everything here works on small in-memory
//! buffers; it is not an I/O layer, and it is unsuitable for objects
//! bigger than a few kilobytes.

mod err;
mod reader;
mod writer;

pub use err::Error;
pub use reader::Reader;
pub use writer::Writer;

/// Result type returned by this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Trait for an object that can be encoded onto a Writer by reference.
pub trait Writeable {
    /// Encode this object onto `b`.
    fn write_onto<B: Writer + ?Sized>(&self, b: &mut B);
}

/// Trait for an object that can be extracted from a Reader.
pub trait Readable: Sized {
    /// Try to decode one of these objects from `b`.
    fn take_from(b: &mut Reader<'_>) -> Result<Self>;
}

/// Make an unsigned integer type Readable and Writeable, in its
/// big-endian encoding, by delegating to the matching Reader and
/// Writer methods.
macro_rules! uint_codec {
    { $($ty:ident => $take:ident / $put:ident;)* } => {
        $(
            impl Writeable for $ty {
                fn write_onto<B: Writer + ?Sized>(&self, b: &mut B) {
                    b.$put(*self)
                }
            }
            impl Readable for $ty {
                fn take_from(b: &mut Reader<'_>) -> Result<Self> {
                    b.$take()
                }
            }
        )*
    };
}

uint_codec! {
    u8 => take_u8 / write_u8;
    u16 => take_u16 / write_u16;
    u32 => take_u32 / write_u32;
    u64 => take_u64 / write_u64;
    u128 => take_u128 / write_u128;
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn writer() {
        let mut v: Vec<u8> = Vec::new();
        v.write_u8(0x05);
        v.write_u16(0x0100);
        v.write_u32(0x7f000001);
        v.write_all(b"localhost");
        v.write_zeros(2);
        assert_eq!(
            &v[..],
            &b"\x05\x01\x00\x7f\x00\x00\x01localhost\0\0"[..]
        );
    }

    #[test]
    fn uint_round_trip() {
        let mut v: Vec<u8> = Vec::new();
        v.write(&7_u8);
        v.write(&1080_u16);
        v.write(&0xdeadbeef_u32);
        v.write(&2_u64.pow(40));
        v.write(&1_u128);
        assert_eq!(v.len(), 1 + 2 + 4 + 8 + 16);

        let mut r = Reader::from_slice(&v[..]);
        assert_eq!(r.extract::<u8>().unwrap(), 7);
        assert_eq!(r.extract::<u16>().unwrap(), 1080);
        assert_eq!(r.extract::<u32>().unwrap(), 0xdeadbeef);
        assert_eq!(r.extract::<u64>().unwrap(), 2_u64.pow(40));
        assert_eq!(r.extract::<u128>().unwrap(), 1);
        r.should_be_exhausted().unwrap();
    }
}
