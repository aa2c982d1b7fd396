//! Frame resolution behavior over the strategy cascade,
//! exercised the way decoding callers drive it.

use dicom_binary_data::pixel::Error;
use dicom_binary_data::{Endian, FileReference, Fragment, PixelFragmentSequence};
use rstest::rstest;
use std::io::Write;

/// Build a sequence by appending one in-memory fragment per length,
/// filling each fragment with its own index.
fn sequence_of(lengths: &[usize]) -> PixelFragmentSequence {
    let mut sequence = PixelFragmentSequence::new();
    for (i, &len) in lengths.iter().enumerate() {
        sequence
            .add_fragment(Fragment::from_bytes(vec![i as u8; len]))
            .unwrap();
    }
    sequence
}

/// The fragment indices a resolution returns, for compact assertions.
fn resolved_indices(
    sequence: &PixelFragmentSequence,
    frame: usize,
    number_of_frames: usize,
) -> Vec<usize> {
    sequence
        .frame_fragments(frame, number_of_frames)
        .unwrap()
        .iter()
        .map(|fragment| {
            sequence
                .fragments()
                .iter()
                .position(|f| std::ptr::eq(*fragment, f))
                .unwrap()
        })
        .collect()
}

#[test]
fn single_frame_takes_all_fragments() {
    let sequence = sequence_of(&[10, 20, 30]);
    assert_eq!(resolved_indices(&sequence, 0, 1), vec![0, 1, 2]);
}

#[rstest]
#[case(0)]
#[case(1)]
#[case(2)]
fn one_fragment_per_frame_maps_one_to_one(#[case] frame: usize) {
    let mut sequence = sequence_of(&[10, 20, 30]);
    // the 1:1 rule wins regardless of what the offset table says
    sequence.set_offset_table(vec![0, 0, 0]);
    assert_eq!(resolved_indices(&sequence, frame, 3), vec![frame]);
}

#[test]
fn valid_offset_table_delimits_frames() {
    let mut sequence = sequence_of(&[10, 10, 20]);
    sequence.set_offset_table(vec![0, 36]);
    assert_eq!(resolved_indices(&sequence, 0, 2), vec![0, 1]);
    assert_eq!(resolved_indices(&sequence, 1, 2), vec![2]);
}

#[test]
fn offset_table_with_wrong_entry_count_is_ignored() {
    // appending keeps one offset per fragment; with two declared frames
    // that three-entry table does not apply, and the length change
    // between the second and third fragment delimits the frames
    let sequence = sequence_of(&[10, 10, 20]);
    assert_eq!(sequence.offset_table(), Some(&[0, 18, 36][..]));
    assert_eq!(resolved_indices(&sequence, 0, 2), vec![0, 1]);
    assert_eq!(resolved_indices(&sequence, 1, 2), vec![2]);
}

#[rstest]
#[case(vec![0, 26])]
#[case(vec![2, 36])]
fn corrupt_offset_table_falls_back_to_heuristics(#[case] table: Vec<u32>) {
    // entries landing inside a fragment or past the data are abandoned,
    // and resolution still succeeds through the length change heuristic
    let mut sequence = sequence_of(&[10, 10, 20]);
    sequence.set_offset_table(table);
    assert_eq!(resolved_indices(&sequence, 0, 2), vec![0, 1]);
    assert_eq!(resolved_indices(&sequence, 1, 2), vec![2]);
}

#[test]
fn stop_offset_past_the_data_takes_the_remaining_fragments() {
    // a well-aligned start with an oversized stop is not treated as
    // corrupt: the frame simply runs to the end of the fragment list
    let mut sequence = sequence_of(&[10, 10, 20]);
    sequence.set_offset_table(vec![0, 100]);
    assert_eq!(resolved_indices(&sequence, 0, 2), vec![0, 1, 2]);
    // the second entry overshoots, so that frame falls back to heuristics
    assert_eq!(resolved_indices(&sequence, 1, 2), vec![2]);
}

#[rstest]
#[case(0, vec![0, 1])]
#[case(1, vec![2, 3])]
#[case(2, vec![4, 5])]
fn uniform_fragments_partition_evenly(#[case] frame: usize, #[case] expected: Vec<usize>) {
    let sequence = sequence_of(&[100; 6]);
    assert_eq!(resolved_indices(&sequence, frame, 3), expected);
}

#[test]
fn uniform_fragments_not_divisible_by_frames_is_an_error() {
    let sequence = sequence_of(&[100; 5]);
    let err = sequence.frame_fragments(0, 3).unwrap_err();
    assert!(matches!(
        err,
        Error::UnevenFragmentation {
            fragments: 5,
            frames: 3,
            ..
        }
    ));
}

#[test]
fn length_change_marks_frame_boundaries() {
    let sequence = sequence_of(&[50, 50, 80]);
    assert_eq!(resolved_indices(&sequence, 0, 2), vec![0, 1]);
    assert_eq!(resolved_indices(&sequence, 1, 2), vec![2]);
}

#[test]
fn consecutive_length_changes_each_start_a_frame() {
    let sequence = sequence_of(&[50, 50, 80, 80]);
    assert_eq!(resolved_indices(&sequence, 0, 3), vec![0, 1]);
    assert_eq!(resolved_indices(&sequence, 1, 3), vec![2]);
    assert_eq!(resolved_indices(&sequence, 2, 3), vec![3]);
}

#[test]
fn missing_boundaries_leave_trailing_fragments_to_the_last_frame() {
    // only one length change for three declared frames: the trailing
    // fragments stand in for every remaining frame
    let sequence = sequence_of(&[50, 80, 50]);
    assert_eq!(resolved_indices(&sequence, 0, 3), vec![0]);
    assert_eq!(resolved_indices(&sequence, 1, 3), vec![1, 2]);
    assert_eq!(resolved_indices(&sequence, 2, 3), vec![1, 2]);
}

#[rstest]
#[case(0)]
#[case(4)]
fn empty_sequence_resolves_to_no_fragments(#[case] frame: usize) {
    let sequence = PixelFragmentSequence::new();
    assert!(sequence.frame_fragments(frame, 5).unwrap().is_empty());
}

#[test]
fn frame_index_is_validated_before_any_strategy() {
    let empty = PixelFragmentSequence::new();
    assert!(matches!(
        empty.frame_fragments(5, 5).unwrap_err(),
        Error::FrameOutOfBounds {
            frame: 5,
            frames: 5,
            ..
        }
    ));

    // even a sequence that would fail heuristic A rejects the index first
    let sequence = sequence_of(&[100; 5]);
    assert!(matches!(
        sequence.frame_fragments(3, 3).unwrap_err(),
        Error::FrameOutOfBounds { .. }
    ));
}

#[test]
fn frame_data_loads_file_backed_fragments_per_call() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("encapsulated.bin");
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(&[0x11, 0x11, 0x22, 0x22, 0x22, 0x22]).unwrap();
    drop(file);

    let mut sequence = PixelFragmentSequence::new();
    sequence
        .add_fragment(Fragment::from_reference(FileReference::new(
            &path,
            0,
            2,
            Endian::Little,
        )))
        .unwrap();
    sequence
        .add_fragment(Fragment::from_reference(FileReference::new(
            &path,
            2,
            4,
            Endian::Little,
        )))
        .unwrap();

    assert_eq!(
        sequence.frame_data(0, 2).unwrap(),
        vec![0x11, 0x11]
    );
    assert_eq!(
        sequence.frame_data(1, 2).unwrap(),
        vec![0x22, 0x22, 0x22, 0x22]
    );
}
