//! Individual fragments of encapsulated pixel data.
//!
//! A [`Fragment`] is one opaque, immutable byte range. Its payload either
//! lives in memory or is described by a [`FileReference`] and loaded on
//! demand: the source file is opened, the exact range read, and the handle
//! released within the same call. Nothing is cached between calls, so a
//! multi-frame study with thousands of file-backed fragments never holds
//! more than one file descriptor at a time.

use crate::buffer::{ByteBuffer, Endian};
use snafu::{Backtrace, ResultExt, Snafu};
use std::fs::File;
use std::hash::{Hash, Hasher};
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;

/// Error type for loading a fragment's payload.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    /// Could not open the file holding the fragment's bytes.
    #[snafu(display("Failed to open fragment source file {}", path.display()))]
    OpenSource {
        /// Path of the source file.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
        /// The backtrace at the point of failure.
        backtrace: Backtrace,
    },
    /// Could not read the fragment's byte range from its file.
    #[snafu(display(
        "Failed to read {} bytes at offset {} from fragment source file {}",
        length,
        offset,
        path.display()
    ))]
    ReadSource {
        /// Path of the source file.
        path: PathBuf,
        /// Byte offset of the fragment within the file.
        offset: u64,
        /// Byte length of the fragment.
        length: u32,
        /// The underlying I/O error.
        source: std::io::Error,
        /// The backtrace at the point of failure.
        backtrace: Backtrace,
    },
}

/// Result alias for fragment payload loads.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A byte range within a file, holding pixel data left on disk
/// instead of being read into the data set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReference {
    path: PathBuf,
    offset: u64,
    length: u32,
    endian: Endian,
}

impl FileReference {
    /// Describe a byte range of the given file.
    pub fn new(path: impl Into<PathBuf>, offset: u64, length: u32, endian: Endian) -> Self {
        FileReference {
            path: path.into(),
            offset,
            length,
            endian,
        }
    }

    /// Path of the file holding the bytes.
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Byte offset of the range within the file.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Byte length of the range.
    pub fn length(&self) -> u32 {
        self.length
    }

    /// Byte order the referenced data was encoded in.
    pub fn endian(&self) -> Endian {
        self.endian
    }

    /// Open the file and read exactly the referenced range.
    ///
    /// The file handle lives only for the duration of this call.
    fn read(&self) -> Result<Vec<u8>> {
        let mut file = File::open(&self.path).context(OpenSourceSnafu {
            path: self.path.clone(),
        })?;
        let read = ReadSourceSnafu {
            path: self.path.clone(),
            offset: self.offset,
            length: self.length,
        };
        file.seek(SeekFrom::Start(self.offset)).context(read.clone())?;
        let mut data = vec![0u8; self.length as usize];
        file.read_exact(&mut data).context(read)?;
        Ok(data)
    }
}

#[derive(Debug, Clone)]
enum FragmentSource {
    Memory(Vec<u8>),
    File(FileReference),
}

/// One opaque byte range of an encapsulated pixel data value.
///
/// Fragments are immutable once constructed. Cloning a file-backed fragment
/// copies the reference, not the bytes; the payload is only materialized by
/// [`to_bytes`](Fragment::to_bytes).
#[derive(Debug, Clone)]
pub struct Fragment {
    source: FragmentSource,
}

impl Fragment {
    /// Create a fragment owning the given bytes.
    pub fn from_bytes(data: Vec<u8>) -> Self {
        Fragment {
            source: FragmentSource::Memory(data),
        }
    }

    /// Create a fragment from the contents of a [`ByteBuffer`].
    pub fn from_buffer(buffer: ByteBuffer) -> Self {
        Fragment::from_bytes(buffer.into_vec())
    }

    /// Create a fragment whose bytes stay in the given file region until
    /// requested.
    pub fn from_reference(reference: FileReference) -> Self {
        Fragment {
            source: FragmentSource::File(reference),
        }
    }

    /// The fragment's byte length.
    ///
    /// Known without loading the payload.
    pub fn len(&self) -> usize {
        match &self.source {
            FragmentSource::Memory(data) => data.len(),
            FragmentSource::File(reference) => reference.length as usize,
        }
    }

    /// Whether the fragment has no bytes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The file reference behind this fragment, if it is file-backed.
    pub fn file_reference(&self) -> Option<&FileReference> {
        match &self.source {
            FragmentSource::Memory(_) => None,
            FragmentSource::File(reference) => Some(reference),
        }
    }

    /// Load the fragment's full payload.
    ///
    /// For file-backed fragments this opens the source, reads exactly the
    /// referenced range and releases the handle before returning.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        match &self.source {
            FragmentSource::Memory(data) => Ok(data.clone()),
            FragmentSource::File(reference) => reference.read(),
        }
    }
}

impl From<Vec<u8>> for Fragment {
    fn from(data: Vec<u8>) -> Self {
        Fragment::from_bytes(data)
    }
}

/// Byte-wise payload comparison, loading file-backed payloads on demand.
///
/// This is a test and debugging convenience, not meant for hot paths.
/// Fragments whose payload cannot be loaded compare unequal.
impl PartialEq for Fragment {
    fn eq(&self, other: &Self) -> bool {
        match (&self.source, &other.source) {
            (FragmentSource::Memory(a), FragmentSource::Memory(b)) => a == b,
            _ => match (self.to_bytes(), other.to_bytes()) {
                (Ok(a), Ok(b)) => a == b,
                _ => false,
            },
        }
    }
}

/// Hashes the loaded payload; falls back to the length if it cannot be
/// loaded. Consistent with [`PartialEq`] for readable sources.
impl Hash for Fragment {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self.to_bytes() {
            Ok(data) => data.hash(state),
            Err(_) => (self.len() as u64).hash(state),
        }
    }
}
