//! Encapsulated pixel data sequences and frame resolution.
//!
//! Compressed pixel data is stored as an ordered list of opaque
//! [`Fragment`]s, optionally preceded by a basic offset table claiming where
//! each frame starts within the encapsulated stream. Producing devices
//! frequently ship absent, short or plainly wrong offset tables, so mapping
//! a frame number back to its fragments cannot trust the table blindly:
//! [`PixelFragmentSequence::frame_fragments`] applies a deterministic
//! cascade of strategies, verifying the table against the actual fragment
//! layout and falling back to fragment length heuristics when it does not
//! hold up. The exact rule order and tie-breaks are relied upon by decoders
//! for interoperability with non-conformant encoders.

use crate::buffer::ByteBuffer;
use crate::fragment::{self, Fragment};
use crate::C;
use snafu::{ensure, Backtrace, ResultExt, Snafu};

/// Encoded overhead of one fragment item: a 4-byte item tag plus a
/// 4-byte length field.
pub const ITEM_HEADER_SIZE: u32 = 8;

/// Error type for fragment sequence operations.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    /// Encapsulated fragments must have even byte length.
    #[snafu(display("Fragment payload length {} is odd", length))]
    OddFragmentLength {
        /// The rejected payload length.
        length: usize,
        /// The backtrace at the point of failure.
        backtrace: Backtrace,
    },
    /// The requested frame number does not exist.
    #[snafu(display("Frame index {} out of bounds for {} frames", frame, frames))]
    FrameOutOfBounds {
        /// The requested frame index.
        frame: usize,
        /// The declared number of frames.
        frames: usize,
        /// The backtrace at the point of failure.
        backtrace: Backtrace,
    },
    /// Uniformly sized fragments which cannot be split evenly over the
    /// declared frames.
    #[snafu(display(
        "Cannot partition {} equally sized fragments over {} frames",
        fragments,
        frames
    ))]
    UnevenFragmentation {
        /// The number of fragments in the sequence.
        fragments: usize,
        /// The declared number of frames.
        frames: usize,
        /// The backtrace at the point of failure.
        backtrace: Backtrace,
    },
    /// A fragment payload could not be loaded while assembling frame data.
    #[snafu(display("Failed to load fragment payload"))]
    ReadFragment {
        /// The underlying fragment error.
        #[snafu(backtrace)]
        source: fragment::Error,
    },
}

/// Result alias for fragment sequence operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The ordered fragment sequence of one encapsulated pixel data attribute.
///
/// Fragments are kept in append order, which is the encoding order. The
/// offset table records, for each frame, the byte offset at which the
/// frame's data begins within the logical concatenation of fragment items
/// (each fragment counted with its [`ITEM_HEADER_SIZE`] bytes of item
/// overhead). The table may also be supplied wholesale from a parsed
/// stream, in which case it is taken as a claim to be verified during
/// frame resolution, never as truth.
#[derive(Debug, Clone, Default)]
pub struct PixelFragmentSequence {
    fragments: C<Fragment>,
    offset_table: Option<C<u32>>,
    is_null: bool,
}

impl PixelFragmentSequence {
    /// Create an empty sequence with no offset table.
    pub fn new() -> Self {
        PixelFragmentSequence::default()
    }

    /// The fragments, in encoding order.
    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    /// The number of fragments.
    pub fn fragment_count(&self) -> usize {
        self.fragments.len()
    }

    /// The offset table, if one is present.
    pub fn offset_table(&self) -> Option<&[u32]> {
        self.offset_table.as_deref()
    }

    /// The total encapsulated length of the sequence: the sum of every
    /// fragment's payload length plus its item header overhead.
    pub fn encapsulated_len(&self) -> u64 {
        self.fragments
            .iter()
            .map(|f| u64::from(ITEM_HEADER_SIZE) + f.len() as u64)
            .sum()
    }

    /// Whether the value is explicitly present but empty.
    pub fn is_null(&self) -> bool {
        self.is_null
    }

    /// Whether the value is absent.
    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty() && !self.is_null
    }

    /// Append a fragment at the end of the sequence.
    ///
    /// The fragment's start offset within the encapsulated stream is
    /// computed from the fragments already present and appended to the
    /// offset table before the fragment itself is stored.
    ///
    /// Fails if the payload length is odd, which the encapsulation format
    /// forbids.
    pub fn add_fragment(&mut self, fragment: Fragment) -> Result<()> {
        ensure!(
            fragment.len() % 2 == 0,
            OddFragmentLengthSnafu {
                length: fragment.len()
            }
        );
        // offset table entries are 32-bit on the wire
        let offset = self.encapsulated_len() as u32;
        self.offset_table.get_or_insert_with(C::new).push(offset);
        self.fragments.push(fragment);
        self.is_null = false;
        Ok(())
    }

    /// Replace the offset table with externally supplied entries,
    /// typically read from an encoded stream.
    ///
    /// No validation happens here; the table is checked against the actual
    /// fragment layout lazily, during frame resolution.
    pub fn set_offset_table(&mut self, table: Vec<u32>) {
        self.offset_table = Some(table.into_iter().collect());
    }

    /// Set the offset table from the raw bytes of a basic offset table
    /// item, decoding unsigned 32-bit entries per the buffer's byte order.
    pub fn set_offset_table_data(&mut self, data: &ByteBuffer) {
        self.set_offset_table(data.to_u32s());
    }

    /// Discard all fragments and the offset table.
    pub fn clear(&mut self) {
        self.fragments.clear();
        self.offset_table = None;
    }

    /// Discard all content and mark the value as present but empty.
    pub fn set_null(&mut self) {
        self.clear();
        self.is_null = true;
    }

    /// Discard all content and mark the value as absent.
    pub fn set_empty(&mut self) {
        self.clear();
        self.is_null = false;
    }

    /// Resolve which fragments compose the given frame.
    ///
    /// `number_of_frames` is the frame count declared by the data set.
    /// Strategies are tried in a fixed order, each only when the previous
    /// one does not apply:
    ///
    /// 1. a single-frame value takes every fragment;
    /// 2. with exactly one fragment per frame, the mapping is 1:1;
    /// 3. an offset table with one entry per frame is walked and verified
    ///    against the fragment layout; a table that does not land exactly
    ///    on a fragment boundary is abandoned as corrupt (with a warning,
    ///    not an error) in favor of the remaining strategies;
    /// 4. uniformly sized fragments are split into equal consecutive
    ///    groups, failing if the fragment count is not divisible by the
    ///    frame count;
    /// 5. otherwise, a change in fragment length relative to the first
    ///    fragment marks the start of the next frame; if the list ends
    ///    before enough boundaries occur, the trailing fragments stand in
    ///    for the last requested frame.
    ///
    /// An empty sequence resolves every valid frame index to no fragments.
    pub fn frame_fragments(
        &self,
        frame: usize,
        number_of_frames: usize,
    ) -> Result<Vec<&Fragment>> {
        ensure!(
            frame < number_of_frames,
            FrameOutOfBoundsSnafu {
                frame,
                frames: number_of_frames
            }
        );
        if self.fragments.is_empty() {
            return Ok(Vec::new());
        }
        if number_of_frames == 1 {
            return Ok(self.fragments.iter().collect());
        }
        if self.fragments.len() == number_of_frames {
            return Ok(vec![&self.fragments[frame]]);
        }
        if let Some(table) = &self.offset_table {
            if table.len() == number_of_frames {
                match self.fragments_by_offset_table(table, frame, number_of_frames) {
                    Some(fragments) => return Ok(fragments),
                    None => tracing::warn!(
                        frame,
                        "offset table does not line up with the fragment layout, \
                         falling back to fragment length heuristics"
                    ),
                }
            }
        }
        let reference = self.fragments[0].len();
        if self.fragments.iter().all(|f| f.len() == reference) {
            ensure!(
                self.fragments.len() % number_of_frames == 0,
                UnevenFragmentationSnafu {
                    fragments: self.fragments.len(),
                    frames: number_of_frames
                }
            );
            let per_frame = self.fragments.len() / number_of_frames;
            let group = &self.fragments[frame * per_frame..(frame + 1) * per_frame];
            return Ok(group.iter().collect());
        }
        Ok(self.fragments_by_length_change(frame, reference))
    }

    /// Assemble the payload bytes of one frame by concatenating its
    /// resolved fragments.
    pub fn frame_data(&self, frame: usize, number_of_frames: usize) -> Result<Vec<u8>> {
        let fragments = self.frame_fragments(frame, number_of_frames)?;
        let mut data = Vec::with_capacity(fragments.iter().map(|f| f.len()).sum());
        for fragment in fragments {
            data.extend(fragment.to_bytes().context(ReadFragmentSnafu)?);
        }
        Ok(data)
    }

    /// Walk the fragment layout against the offset table entry for
    /// `frame`, returning `None` if the table turns out not to match.
    fn fragments_by_offset_table(
        &self,
        table: &[u32],
        frame: usize,
        number_of_frames: usize,
    ) -> Option<Vec<&Fragment>> {
        let start = u64::from(table[frame]);
        let stop = if frame + 1 < number_of_frames {
            u64::from(table[frame + 1])
        } else {
            u64::MAX
        };

        let mut running = 0u64;
        let mut index = 0;
        while running < start {
            // a table entry pointing past the data is just as corrupt as
            // one landing inside a fragment
            let fragment = self.fragments.get(index)?;
            running += u64::from(ITEM_HEADER_SIZE) + fragment.len() as u64;
            index += 1;
        }
        if running != start {
            return None;
        }

        let mut selected = Vec::new();
        while running < stop {
            match self.fragments.get(index) {
                None => break,
                Some(fragment) => {
                    selected.push(fragment);
                    running += u64::from(ITEM_HEADER_SIZE) + fragment.len() as u64;
                    index += 1;
                }
            }
        }
        Some(selected)
    }

    /// Group fragments by length change relative to the first fragment's
    /// length and return the group for `frame`.
    fn fragments_by_length_change(&self, frame: usize, reference: usize) -> Vec<&Fragment> {
        let mut group = 0;
        let mut current = Vec::new();
        for fragment in &self.fragments {
            if fragment.len() != reference && !current.is_empty() {
                if group == frame {
                    return current;
                }
                group += 1;
                current.clear();
            }
            current.push(fragment);
        }
        // ran out of boundaries: the trailing fragments stand in for the
        // last requested frame
        current
    }
}
