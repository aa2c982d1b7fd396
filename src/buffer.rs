//! Endian-aware byte containers.
//!
//! [`ByteBuffer`] is the exchange format between the value stores in this
//! crate and the encoding layers outside of it: a resizable byte vector
//! tagged with the byte order its contents are meant to be interpreted in.
//! The tag is carried, not enforced; producers and consumers agree on it.

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use std::io::{self, Cursor, Write};

/// Byte order of encoded multi-byte values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endian {
    /// Least significant byte first.
    Little,
    /// Most significant byte first.
    Big,
}

impl Endian {
    /// The byte order of the machine this process is running on.
    pub const LOCAL: Endian = if cfg!(target_endian = "little") {
        Endian::Little
    } else {
        Endian::Big
    };
}

/// A resizable byte container tagged with a byte order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteBuffer {
    data: Vec<u8>,
    endian: Endian,
}

impl ByteBuffer {
    /// Create an empty buffer with the given byte order tag.
    pub fn new(endian: Endian) -> Self {
        ByteBuffer {
            data: Vec::new(),
            endian,
        }
    }

    /// Create a buffer taking ownership of the given bytes.
    pub fn from_vec(data: Vec<u8>, endian: Endian) -> Self {
        ByteBuffer { data, endian }
    }

    /// The number of bytes in the buffer.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the buffer holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The byte order tag of the buffer.
    pub fn endian(&self) -> Endian {
        self.endian
    }

    /// The buffer's contents.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Take the buffer's contents.
    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    /// Append raw bytes at the end of the buffer.
    pub fn append(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Obtain a read stream over the buffer's contents.
    pub fn reader(&self) -> Cursor<&[u8]> {
        Cursor::new(&self.data)
    }

    /// Copy the buffer's contents into the given write stream.
    pub fn copy_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.data)
    }

    /// Decode the buffer's contents as a sequence of unsigned 32-bit
    /// integers according to the buffer's byte order.
    ///
    /// Trailing bytes that do not make up a whole value are ignored.
    pub fn to_u32s(&self) -> Vec<u32> {
        let n = self.data.len() / 4;
        let mut values = vec![0u32; n];
        match self.endian {
            Endian::Little => LittleEndian::read_u32_into(&self.data[..n * 4], &mut values),
            Endian::Big => BigEndian::read_u32_into(&self.data[..n * 4], &mut values),
        }
        values
    }
}
