#![crate_type = "lib"]
#![deny(trivial_numeric_casts, unsafe_code, unstable_features)]
#![warn(
    missing_debug_implementations,
    missing_docs,
    unused_qualifications,
    unused_import_braces
)]

//! Value storage and pixel fragment reconstruction for DICOM attribute data.
//!
//! DICOM attributes may hold anything from a single numeric value to
//! multi-gigabyte pixel arrays, and compressed pixel data arrives as an
//! ordered list of opaque byte fragments whose mapping back to image frames
//! is frequently under-specified by the producing device. This crate covers
//! the data structures and algorithms for both concerns:
//!
//! - [`data`] provides [`BinaryData`], a numeric value store which keeps
//!   small values in a plain vector and transparently spools large ones into
//!   a chunked byte stream, so that a 200 MB lookup table never demands a
//!   single contiguous allocation.
//! - [`stream`] provides [`ViewStream`], a view over the spooled storage
//!   with an independent cursor, so multiple readers and writers can share
//!   one backing stream without stepping on each other's position.
//! - [`fragment`] provides [`Fragment`], one immutable byte range of
//!   encapsulated pixel data, either held in memory or loaded on demand from
//!   a region of a file.
//! - [`pixel`] provides [`PixelFragmentSequence`], the ordered fragment list
//!   with its basic offset table, and the deterministic cascade which maps a
//!   frame number to the fragments that compose it, tolerating the absent or
//!   corrupt offset tables found in real-world data sets.
//! - [`buffer`] provides the endian-tagged [`ByteBuffer`] used to move raw
//!   value bytes in and out of the stores above.
//!
//! Everything here is synchronous and single-threaded by design; callers
//! that share these structures across threads must serialize access
//! externally.

pub mod buffer;
pub mod data;
pub mod fragment;
pub mod pixel;
pub mod stream;

pub use buffer::{ByteBuffer, Endian};
pub use data::{BinaryData, BinaryElement};
pub use fragment::{FileReference, Fragment};
pub use pixel::PixelFragmentSequence;
pub use stream::ViewStream;

/// An aggregation of one or more elements in a value.
pub type C<T> = smallvec::SmallVec<[T; 2]>;

// re-export crates that are part of the public API
pub use smallvec;
