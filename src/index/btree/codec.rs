//! Binary encoding of keys and values.
//!
//! The tree never looks inside keys or values: it orders keys with `Ord` and
//! moves both in and out of blocks through [`Codec`].

use bytes::{Buf, BufMut, BytesMut};

use crate::common::{Error, Result};

/// Encode into and decode from a node block.
///
/// Implementations must be self-delimiting: `decode` consumes exactly the
/// bytes `encode` produced.
pub trait Codec: Sized {
    /// Append the encoded form to `buf`.
    fn encode(&self, buf: &mut BytesMut);

    /// Read one value from the front of `buf`, advancing it.
    fn decode(buf: &mut &[u8]) -> Result<Self>;

    /// Upper bound on the encoded length, if the type has one.
    ///
    /// When both the key and value types report a bound, the tree checks at
    /// open time that a full node fits in one block.
    fn max_encoded_len() -> Option<usize> {
        None
    }
}

fn ensure(buf: &[u8], needed: usize, what: &str) -> Result<()> {
    if buf.remaining() < needed {
        return Err(Error::Decode(format!(
            "{what} needs {needed} bytes, {} left",
            buf.remaining()
        )));
    }
    Ok(())
}

macro_rules! fixed_width_codec {
    ($ty:ty, $put:ident, $get:ident) => {
        impl Codec for $ty {
            #[inline]
            fn encode(&self, buf: &mut BytesMut) {
                buf.$put(*self);
            }

            #[inline]
            fn decode(buf: &mut &[u8]) -> Result<Self> {
                ensure(*buf, std::mem::size_of::<$ty>(), stringify!($ty))?;
                Ok(buf.$get())
            }

            fn max_encoded_len() -> Option<usize> {
                Some(std::mem::size_of::<$ty>())
            }
        }
    };
}

fixed_width_codec!(u32, put_u32, get_u32);
fixed_width_codec!(i32, put_i32, get_i32);
fixed_width_codec!(u64, put_u64, get_u64);
fixed_width_codec!(i64, put_i64, get_i64);

/// Length-prefixed: u32 byte count, then the bytes.
fn decode_prefixed(buf: &mut &[u8], what: &str) -> Result<Vec<u8>> {
    ensure(*buf, 4, what)?;
    let len = buf.get_u32() as usize;
    ensure(*buf, len, what)?;
    let bytes = buf[..len].to_vec();
    buf.advance(len);
    Ok(bytes)
}

impl Codec for Vec<u8> {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32(self.len() as u32);
        buf.put_slice(self);
    }

    fn decode(buf: &mut &[u8]) -> Result<Self> {
        decode_prefixed(buf, "byte string")
    }
}

impl Codec for String {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32(self.len() as u32);
        buf.put_slice(self.as_bytes());
    }

    fn decode(buf: &mut &[u8]) -> Result<Self> {
        let bytes = decode_prefixed(buf, "string")?;
        String::from_utf8(bytes).map_err(|e| Error::Decode(format!("invalid utf-8: {e}")))
    }
}
