//! Spooled byte storage and shared stream views.
//!
//! Large attribute values are kept in a [`SpoolBuffer`]: a byte stream
//! backed by a list of fixed-size chunks, so the value never requires one
//! contiguous allocation no matter how big it grows. Multiple
//! [`ViewStream`]s may be open over the same spool at once; each keeps its
//! own cursor, while the bytes themselves are shared, so a write through one
//! view is immediately visible through every other. There is no internal
//! locking anywhere here; concurrent use from multiple threads must be
//! serialized by the caller.

use std::cell::RefCell;
use std::cmp;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::rc::Rc;

/// Size of each backing chunk of a spool, in bytes.
const SPOOL_CHUNK_SIZE: usize = 64 * 1024;

/// A handle to a spool shared between a value store and its views.
pub(crate) type SharedSpool = Rc<RefCell<SpoolBuffer>>;

/// A byte stream stored as a list of fixed-size chunks.
///
/// Bytes past the logical length are always zero, so growing the stream
/// exposes zero-filled space without an explicit fill pass.
#[derive(Debug, Clone, Default)]
pub(crate) struct SpoolBuffer {
    chunks: Vec<Vec<u8>>,
    len: u64,
}

impl SpoolBuffer {
    pub(crate) fn new() -> Self {
        SpoolBuffer::default()
    }

    /// Create a zero-filled spool of the given length.
    pub(crate) fn with_len(len: u64) -> Self {
        let mut spool = SpoolBuffer::new();
        spool.set_len(len);
        spool
    }

    pub(crate) fn into_shared(self) -> SharedSpool {
        Rc::new(RefCell::new(self))
    }

    pub(crate) fn len(&self) -> u64 {
        self.len
    }

    /// Grow (zero-filled) or truncate the stream to `len` bytes.
    pub(crate) fn set_len(&mut self, len: u64) {
        let chunk_size = SPOOL_CHUNK_SIZE as u64;
        if len < self.len {
            // zero the dropped tail so that regrowing reads zeros again
            let keep = ((len + chunk_size - 1) / chunk_size) as usize;
            self.chunks.truncate(keep);
            if let Some(last) = self.chunks.last_mut() {
                let tail_start = (len % chunk_size) as usize;
                if tail_start != 0 {
                    for byte in &mut last[tail_start..] {
                        *byte = 0;
                    }
                }
            }
        }
        let needed = ((len + chunk_size - 1) / chunk_size) as usize;
        while self.chunks.len() < needed {
            self.chunks.push(vec![0u8; SPOOL_CHUNK_SIZE]);
        }
        self.len = len;
    }

    /// Copy up to `buf.len()` bytes starting at `pos` into `buf`,
    /// returning how many bytes were available.
    pub(crate) fn read_at(&self, pos: u64, buf: &mut [u8]) -> usize {
        if pos >= self.len {
            return 0;
        }
        let total = cmp::min(buf.len() as u64, self.len - pos) as usize;
        let mut copied = 0;
        while copied < total {
            let at = pos + copied as u64;
            let chunk = &self.chunks[(at / SPOOL_CHUNK_SIZE as u64) as usize];
            let offset = (at % SPOOL_CHUNK_SIZE as u64) as usize;
            let n = cmp::min(total - copied, SPOOL_CHUNK_SIZE - offset);
            buf[copied..copied + n].copy_from_slice(&chunk[offset..offset + n]);
            copied += n;
        }
        total
    }

    /// Write all of `buf` at `pos`, growing the stream as needed.
    ///
    /// A write past the current end leaves a zero-filled gap in between.
    pub(crate) fn write_at(&mut self, pos: u64, buf: &[u8]) {
        let end = pos + buf.len() as u64;
        if end > self.len {
            self.set_len(end);
        }
        let mut copied = 0;
        while copied < buf.len() {
            let at = pos + copied as u64;
            let chunk = &mut self.chunks[(at / SPOOL_CHUNK_SIZE as u64) as usize];
            let offset = (at % SPOOL_CHUNK_SIZE as u64) as usize;
            let n = cmp::min(buf.len() - copied, SPOOL_CHUNK_SIZE - offset);
            chunk[offset..offset + n].copy_from_slice(&buf[copied..copied + n]);
            copied += n;
        }
    }
}

/// A view over a shared byte stream with an independent cursor.
///
/// Every view created over the same backing spool sees the same bytes, but
/// tracks its own position: reads and writes through one view never disturb
/// where another view is positioned. Dropping a view releases only its
/// handle on the backing stream.
///
/// Obtained from [`BinaryData::as_stream`](crate::BinaryData::as_stream).
#[derive(Debug)]
pub struct ViewStream {
    spool: SharedSpool,
    pos: u64,
}

impl ViewStream {
    pub(crate) fn new(spool: SharedSpool) -> Self {
        ViewStream { spool, pos: 0 }
    }

    /// The current length of the backing stream, in bytes.
    pub fn len(&self) -> u64 {
        self.spool.borrow().len()
    }

    /// Whether the backing stream holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// This view's cursor position.
    pub fn position(&self) -> u64 {
        self.pos
    }
}

impl Read for ViewStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.spool.borrow().read_at(self.pos, buf);
        self.pos += n as u64;
        Ok(n)
    }
}

impl Write for ViewStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.spool.borrow_mut().write_at(self.pos, buf);
        self.pos += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for ViewStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target: i128 = match pos {
            SeekFrom::Start(offset) => i128::from(offset),
            SeekFrom::Current(delta) => i128::from(self.pos) + i128::from(delta),
            SeekFrom::End(delta) => i128::from(self.len()) + i128::from(delta),
        };
        // moving past the end is fine, moving before the start is not
        if target < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid seek to a negative position",
            ));
        }
        self.pos = target as u64;
        Ok(self.pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spool_roundtrip_across_chunk_boundaries() {
        let mut spool = SpoolBuffer::new();
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        spool.write_at(0, &data);
        assert_eq!(spool.len(), 200_000);

        let mut out = vec![0u8; 200_000];
        assert_eq!(spool.read_at(0, &mut out), 200_000);
        assert_eq!(out, data);

        // a read straddling the first chunk boundary
        let mut window = vec![0u8; 16];
        assert_eq!(spool.read_at(SPOOL_CHUNK_SIZE as u64 - 8, &mut window), 16);
        assert_eq!(&window, &data[SPOOL_CHUNK_SIZE - 8..SPOOL_CHUNK_SIZE + 8]);
    }

    #[test]
    fn spool_truncation_zeroes_the_tail() {
        let mut spool = SpoolBuffer::new();
        spool.write_at(0, &[0xFF; 100]);
        spool.set_len(10);
        spool.set_len(100);
        let mut out = vec![0xAAu8; 100];
        spool.read_at(0, &mut out);
        assert_eq!(&out[..10], &[0xFF; 10][..]);
        assert_eq!(&out[10..], &[0x00; 90][..]);
    }

    #[test]
    fn views_share_bytes_but_not_cursors() {
        let spool = SpoolBuffer::with_len(8).into_shared();
        let mut writer = ViewStream::new(Rc::clone(&spool));
        let mut reader = ViewStream::new(Rc::clone(&spool));

        writer.write_all(&[1, 2, 3, 4]).unwrap();
        assert_eq!(writer.position(), 4);
        assert_eq!(reader.position(), 0);

        let mut out = [0u8; 4];
        reader.read_exact(&mut out).unwrap();
        assert_eq!(out, [1, 2, 3, 4]);

        // the writer's cursor was not moved by the reader
        writer.write_all(&[5, 6]).unwrap();
        reader.read_exact(&mut out[..2]).unwrap();
        assert_eq!(&out[..2], &[5, 6]);
    }

    #[test]
    fn seek_before_start_is_an_error() {
        let mut view = ViewStream::new(SpoolBuffer::with_len(4).into_shared());
        let err = view.seek(SeekFrom::Current(-1)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        let err = view.seek(SeekFrom::End(-5)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        // the cursor is untouched by failed seeks
        assert_eq!(view.position(), 0);
    }

    #[test]
    fn seek_past_end_materializes_on_write() {
        let mut view = ViewStream::new(SpoolBuffer::new().into_shared());
        view.seek(SeekFrom::Start(10)).unwrap();
        assert_eq!(view.len(), 0);
        view.write_all(&[0xCC]).unwrap();
        assert_eq!(view.len(), 11);

        view.seek(SeekFrom::Start(0)).unwrap();
        let mut out = [0xFFu8; 11];
        view.read_exact(&mut out).unwrap();
        assert_eq!(&out[..10], &[0u8; 10][..]);
        assert_eq!(out[10], 0xCC);
    }
}
