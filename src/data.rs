//! Hybrid storage for the values of a binary attribute.
//!
//! [`BinaryData`] holds a sequence of fixed-width numeric values. Small
//! sequences live in a plain vector; once the byte size of the sequence
//! crosses [`SPOOL_THRESHOLD`], the values are spooled into a chunked byte
//! stream and stay there for the life of the instance. This keeps random
//! access cheap for the common small attribute while bounding the contiguous
//! memory demanded by multi-megabyte values such as pixel data and lookup
//! tables. The switch is transparent: every operation behaves the same on
//! either representation.

use crate::buffer::{ByteBuffer, Endian};
use crate::stream::{SharedSpool, SpoolBuffer, ViewStream};
use snafu::{ensure, Backtrace, OptionExt, Snafu};
use std::rc::Rc;

/// Byte size at which value storage switches from an in-memory vector
/// to a spooled stream.
pub const SPOOL_THRESHOLD: usize = 65_536;

/// Error type for indexed access to a [`BinaryData`].
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    /// Addressed a position beyond the stored values.
    #[snafu(display("Index {} out of bounds for value count {}", index, count))]
    IndexOutOfBounds {
        /// The requested value index.
        index: usize,
        /// The number of values in the store.
        count: usize,
        /// The backtrace at the point of failure.
        backtrace: Backtrace,
    },
}

/// Result alias for indexed access to a [`BinaryData`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

mod private {
    pub trait Sealed {}
}

/// A fixed-width numeric type which can be stored in a [`BinaryData`].
///
/// Implemented for the primitive integer and floating point types with
/// widths between 1 and 16 bytes. The trait is sealed: attempting to store
/// any other type is a compile error.
pub trait BinaryElement:
    Copy + Default + PartialEq + std::fmt::Debug + private::Sealed + 'static
{
    /// The width of one value, in bytes.
    const SIZE: usize;

    /// Encode this value into `dst` in native byte order.
    ///
    /// `dst` must be exactly [`SIZE`](Self::SIZE) bytes long.
    fn write_bytes(self, dst: &mut [u8]);

    /// Decode a value from `src` in native byte order.
    ///
    /// `src` must be exactly [`SIZE`](Self::SIZE) bytes long.
    fn from_bytes(src: &[u8]) -> Self;
}

macro_rules! impl_binary_element {
    ($($t:ty),* $(,)?) => {
        $(
            impl private::Sealed for $t {}

            impl BinaryElement for $t {
                const SIZE: usize = std::mem::size_of::<$t>();

                fn write_bytes(self, dst: &mut [u8]) {
                    dst.copy_from_slice(&self.to_ne_bytes());
                }

                fn from_bytes(src: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$t>()];
                    raw.copy_from_slice(src);
                    <$t>::from_ne_bytes(raw)
                }
            }
        )*
    };
}

impl_binary_element!(u8, i8, u16, i16, u32, i32, u64, i64, u128, i128, f32, f64);

/// Size of the scratch buffer for bulk copies between representations:
/// about 4 KiB, rounded up to a whole number of elements.
const fn copy_buffer_size(element_size: usize) -> usize {
    4096 + ((element_size - (4096 % element_size)) % element_size)
}

#[derive(Debug)]
enum Repr<T> {
    Values(Vec<T>),
    Spooled(SharedSpool),
}

/// Storage for a sequence of fixed-width numeric values which spools
/// itself into a chunked byte stream once it grows past
/// [`SPOOL_THRESHOLD`] bytes.
///
/// The conversion is one-way: once spooled, an instance never goes back to
/// vector storage. Appending, indexed access and snapshots keep working
/// identically on both representations.
///
/// # Example
///
/// ```
/// use dicom_binary_data::BinaryData;
///
/// let mut data = BinaryData::<u16>::new();
/// data.push(5);
/// data.push(8);
/// assert_eq!(data.count(), 2);
/// assert_eq!(data.try_get(1), Some(8));
/// assert_eq!(data.to_vec(), vec![5, 8]);
/// ```
#[derive(Debug)]
pub struct BinaryData<T: BinaryElement> {
    repr: Repr<T>,
}

impl<T: BinaryElement> BinaryData<T> {
    /// Create an empty store.
    pub fn new() -> Self {
        BinaryData {
            repr: Repr::Values(Vec::new()),
        }
    }

    /// Create a store of `count` zero values.
    ///
    /// The representation is chosen up front from the total byte size.
    pub fn with_count(count: usize) -> Self {
        let byte_len = (count as u128) * (T::SIZE as u128);
        let repr = if byte_len <= SPOOL_THRESHOLD as u128 {
            Repr::Values(vec![T::default(); count])
        } else {
            Repr::Spooled(SpoolBuffer::with_len(byte_len as u64).into_shared())
        };
        BinaryData { repr }
    }

    /// Create a store taking ownership of an existing vector of values.
    ///
    /// The vector is adopted as-is with no size check; the caller already
    /// materialized it, so there is nothing to gain from converting it.
    pub fn from_vec(values: Vec<T>) -> Self {
        BinaryData {
            repr: Repr::Values(values),
        }
    }

    /// Create a store with a copy of the given values.
    ///
    /// If the values exceed [`SPOOL_THRESHOLD`] bytes they are copied
    /// straight into spooled storage, never holding a second vector.
    pub fn from_slice(values: &[T]) -> Self {
        if values.len() * T::SIZE > SPOOL_THRESHOLD {
            BinaryData {
                repr: Repr::Spooled(spool_from_values(values).into_shared()),
            }
        } else {
            BinaryData {
                repr: Repr::Values(values.to_vec()),
            }
        }
    }

    /// Create a store from raw value bytes in native byte order.
    ///
    /// Trailing bytes that do not make up a whole value are discarded.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let usable = bytes.len() - bytes.len() % T::SIZE;
        if bytes.len() < SPOOL_THRESHOLD {
            let values = bytes[..usable]
                .chunks_exact(T::SIZE)
                .map(T::from_bytes)
                .collect();
            BinaryData {
                repr: Repr::Values(values),
            }
        } else {
            let mut spool = SpoolBuffer::new();
            spool.write_at(0, &bytes[..usable]);
            BinaryData {
                repr: Repr::Spooled(spool.into_shared()),
            }
        }
    }

    /// Create a store from the contents of a [`ByteBuffer`].
    pub fn from_buffer(buffer: &ByteBuffer) -> Self {
        Self::from_bytes(buffer.as_bytes())
    }

    /// The number of stored values.
    pub fn count(&self) -> usize {
        match &self.repr {
            Repr::Values(values) => values.len(),
            Repr::Spooled(spool) => (spool.borrow().len() / T::SIZE as u64) as usize,
        }
    }

    /// The length of the stored values, in bytes.
    pub fn byte_len(&self) -> usize {
        match &self.repr {
            Repr::Values(values) => values.len() * T::SIZE,
            Repr::Spooled(spool) => spool.borrow().len() as usize,
        }
    }

    /// Whether the store holds no values.
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Whether the values have been spooled into stream storage.
    pub fn is_spooled(&self) -> bool {
        matches!(self.repr, Repr::Spooled(_))
    }

    /// The value at the given index.
    pub fn get(&self, index: usize) -> Result<T> {
        let count = self.count();
        self.try_get(index)
            .context(IndexOutOfBoundsSnafu { index, count })
    }

    /// The value at the given index, or `None` if out of bounds.
    pub fn try_get(&self, index: usize) -> Option<T> {
        match &self.repr {
            Repr::Values(values) => values.get(index).copied(),
            Repr::Spooled(spool) => {
                let spool = spool.borrow();
                let pos = (index as u64) * T::SIZE as u64;
                // raw writes through a view can leave a partial trailing
                // element in the spool; it does not count as a value
                if pos + T::SIZE as u64 > spool.len() {
                    return None;
                }
                let mut raw = [0u8; 16];
                spool.read_at(pos, &mut raw[..T::SIZE]);
                Some(T::from_bytes(&raw[..T::SIZE]))
            }
        }
    }

    /// Set the value at the given index.
    ///
    /// Setting the value at index [`count`](Self::count) appends it, so a
    /// store can be built by sequential single-value writes, including past
    /// a threshold-triggered conversion.
    pub fn set(&mut self, index: usize, value: T) -> Result<()> {
        let count = self.count();
        if index == count {
            self.push(value);
            return Ok(());
        }
        ensure!(index < count, IndexOutOfBoundsSnafu { index, count });
        match &mut self.repr {
            Repr::Values(values) => values[index] = value,
            Repr::Spooled(spool) => {
                let mut raw = [0u8; 16];
                value.write_bytes(&mut raw[..T::SIZE]);
                spool
                    .borrow_mut()
                    .write_at((index as u64) * T::SIZE as u64, &raw[..T::SIZE]);
            }
        }
        Ok(())
    }

    /// Append a value at the end.
    ///
    /// If the append would push vector storage past [`SPOOL_THRESHOLD`]
    /// bytes, the store is spooled first and the value written to the
    /// stream.
    pub fn push(&mut self, value: T) {
        if let Repr::Values(values) = &self.repr {
            if (values.len() + 1) * T::SIZE > SPOOL_THRESHOLD {
                self.spool();
            }
        }
        match &mut self.repr {
            Repr::Values(values) => values.push(value),
            Repr::Spooled(spool) => {
                let mut spool = spool.borrow_mut();
                let end = spool.len();
                let mut raw = [0u8; 16];
                value.write_bytes(&mut raw[..T::SIZE]);
                spool.write_at(end, &raw[..T::SIZE]);
            }
        }
    }

    /// A fresh snapshot of all values.
    ///
    /// On the spooled representation the copy runs through a bounded
    /// scratch buffer, so no allocation beyond the output vector is made.
    pub fn to_vec(&self) -> Vec<T> {
        match &self.repr {
            Repr::Values(values) => values.clone(),
            Repr::Spooled(spool) => {
                let spool = spool.borrow();
                let mut values = Vec::with_capacity((spool.len() / T::SIZE as u64) as usize);
                let mut buf = vec![0u8; copy_buffer_size(T::SIZE)];
                let mut pos = 0u64;
                loop {
                    let n = spool.read_at(pos, &mut buf);
                    if n == 0 {
                        break;
                    }
                    values.extend(buf[..n].chunks_exact(T::SIZE).map(T::from_bytes));
                    pos += n as u64;
                }
                values
            }
        }
    }

    /// Iterate over the stored values.
    ///
    /// The spooled representation is read in bounded chunks; the whole
    /// sequence is never materialized at once.
    pub fn iter(&self) -> Iter<'_, T> {
        match &self.repr {
            Repr::Values(values) => Iter {
                inner: IterRepr::Values(values.iter()),
            },
            Repr::Spooled(spool) => Iter {
                inner: IterRepr::Spooled {
                    spool,
                    pos: 0,
                    buf: vec![0u8; copy_buffer_size(T::SIZE)],
                    filled: 0,
                    cursor: 0,
                },
            },
        }
    }

    /// Spool the values and obtain a [`ViewStream`] over their bytes.
    ///
    /// Vector storage is irreversibly converted to the spooled
    /// representation; calling this again hands out another view over the
    /// same stream without any further conversion. Views share the bytes
    /// but keep independent cursors.
    pub fn as_stream(&mut self) -> ViewStream {
        self.spool();
        match &self.repr {
            Repr::Spooled(spool) => ViewStream::new(Rc::clone(spool)),
            // spool() always leaves the store in spooled representation
            Repr::Values(_) => unreachable!(),
        }
    }

    /// Copy the value bytes into a [`ByteBuffer`] with the given byte
    /// order tag.
    pub fn to_buffer(&self, endian: Endian) -> ByteBuffer {
        let mut buffer = ByteBuffer::from_vec(Vec::with_capacity(self.byte_len()), endian);
        self.copy_bytes_into(&mut buffer);
        buffer
    }

    /// Copy the value bytes into a [`ByteBuffer`], appending one zero byte
    /// if needed to make the buffer even-length.
    pub fn to_even_length_buffer(&self, endian: Endian) -> ByteBuffer {
        let mut buffer = self.to_buffer(endian);
        if buffer.len() % 2 == 1 {
            buffer.append(&[0]);
        }
        buffer
    }

    fn copy_bytes_into(&self, buffer: &mut ByteBuffer) {
        match &self.repr {
            Repr::Values(values) => {
                let mut raw = [0u8; 16];
                for value in values {
                    value.write_bytes(&mut raw[..T::SIZE]);
                    buffer.append(&raw[..T::SIZE]);
                }
            }
            Repr::Spooled(spool) => {
                let spool = spool.borrow();
                let mut buf = vec![0u8; copy_buffer_size(T::SIZE)];
                let mut pos = 0u64;
                loop {
                    let n = spool.read_at(pos, &mut buf);
                    if n == 0 {
                        break;
                    }
                    buffer.append(&buf[..n]);
                    pos += n as u64;
                }
            }
        }
    }

    /// Convert vector storage into the spooled representation.
    ///
    /// The vector is consumed; both representations are never held at once.
    fn spool(&mut self) {
        if let Repr::Values(values) = &mut self.repr {
            let values = std::mem::take(values);
            tracing::debug!(
                bytes = values.len() * T::SIZE,
                "spooling binary value storage into stream form"
            );
            self.repr = Repr::Spooled(spool_from_values(&values).into_shared());
        }
    }
}

fn spool_from_values<T: BinaryElement>(values: &[T]) -> SpoolBuffer {
    let mut spool = SpoolBuffer::new();
    let mut buf = vec![0u8; copy_buffer_size(T::SIZE)];
    let per_pass = buf.len() / T::SIZE;
    let mut pos = 0u64;
    for window in values.chunks(per_pass) {
        for (i, value) in window.iter().enumerate() {
            value.write_bytes(&mut buf[i * T::SIZE..(i + 1) * T::SIZE]);
        }
        let n = window.len() * T::SIZE;
        spool.write_at(pos, &buf[..n]);
        pos += n as u64;
    }
    spool
}

impl<T: BinaryElement> Default for BinaryData<T> {
    fn default() -> Self {
        BinaryData::new()
    }
}

impl<T: BinaryElement> Clone for BinaryData<T> {
    fn clone(&self) -> Self {
        let repr = match &self.repr {
            Repr::Values(values) => Repr::Values(values.clone()),
            // a deep copy: the clone must not share bytes with the original
            Repr::Spooled(spool) => Repr::Spooled(spool.borrow().clone().into_shared()),
        };
        BinaryData { repr }
    }
}

impl<T: BinaryElement> PartialEq for BinaryData<T> {
    /// Pairwise value equality through each side's own representation.
    fn eq(&self, other: &Self) -> bool {
        if self.count() != other.count() {
            return false;
        }
        self.iter().zip(other.iter()).all(|(a, b)| a == b)
    }
}

impl<T: BinaryElement> std::iter::FromIterator<T> for BinaryData<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut data = BinaryData::new();
        for value in iter {
            data.push(value);
        }
        data
    }
}

/// Iterator over the values of a [`BinaryData`].
#[derive(Debug)]
pub struct Iter<'a, T: BinaryElement> {
    inner: IterRepr<'a, T>,
}

#[derive(Debug)]
enum IterRepr<'a, T> {
    Values(std::slice::Iter<'a, T>),
    Spooled {
        spool: &'a SharedSpool,
        pos: u64,
        buf: Vec<u8>,
        filled: usize,
        cursor: usize,
    },
}

impl<'a, T: BinaryElement> Iterator for Iter<'a, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        match &mut self.inner {
            IterRepr::Values(iter) => iter.next().copied(),
            IterRepr::Spooled {
                spool,
                pos,
                buf,
                filled,
                cursor,
            } => {
                if *cursor >= *filled {
                    *filled = spool.borrow().read_at(*pos, buf);
                    *filled -= *filled % T::SIZE;
                    *pos += *filled as u64;
                    *cursor = 0;
                    if *filled == 0 {
                        return None;
                    }
                }
                let value = T::from_bytes(&buf[*cursor..*cursor + T::SIZE]);
                *cursor += T::SIZE;
                Some(value)
            }
        }
    }
}

impl<'a, T: BinaryElement> IntoIterator for &'a BinaryData<T> {
    type Item = T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Iter<'a, T> {
        self.iter()
    }
}
