//! Property tests over the integer codecs and the delta engine.

use proptest::prelude::*;
use quay_pack::delta::{apply_delta, make_delta};
use quay_pack::varint::{read_ofs_offset, read_varint_le7, write_ofs_offset, write_varint_le7};

proptest! {
    #[test]
    fn le7_roundtrip(value in any::<u64>()) {
        let bytes = write_varint_le7(value);
        let (decoded, consumed) = read_varint_le7(&bytes).unwrap();
        prop_assert_eq!(decoded, value);
        prop_assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn ofs_roundtrip(value in any::<u64>()) {
        let bytes = write_ofs_offset(value);
        let (decoded, consumed) = read_ofs_offset(&bytes).unwrap();
        prop_assert_eq!(decoded, value);
        prop_assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn delta_apply_inverts_make(
        source in proptest::collection::vec(any::<u8>(), 0..2048),
        mut target in proptest::collection::vec(any::<u8>(), 0..2048),
        splice in any::<bool>(),
    ) {
        // Make the pair share material half the time, so both the
        // copy-heavy and the declined paths get exercised.
        if splice && !source.is_empty() {
            target.extend_from_slice(&source[..source.len() / 2]);
        }
        if let Some(delta) = make_delta(&source, &target) {
            prop_assert!(delta.len() < target.len());
            prop_assert_eq!(apply_delta(&source, &delta).unwrap(), target);
        }
    }

    #[test]
    fn delta_never_panics_on_junk(delta in proptest::collection::vec(any::<u8>(), 0..256)) {
        let base = vec![0u8; 64];
        let _ = apply_delta(&base, &delta);
    }
}
