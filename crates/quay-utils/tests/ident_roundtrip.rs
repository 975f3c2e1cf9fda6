//! Identity serialization properties.

use bstr::{BString, ByteSlice};
use proptest::prelude::*;
use quay_utils::ident::{Identity, Timestamp};

proptest! {
    #[test]
    fn identity_roundtrips(
        name in "[A-Za-z][A-Za-z ]{0,20}[A-Za-z]",
        email in "[a-z]{1,10}@[a-z]{1,10}\\.[a-z]{2,4}",
        seconds in 0i64..=4_000_000_000,
        offset_quarters in -48i32..=48,
    ) {
        let ident = Identity {
            name: BString::from(name.as_str()),
            email: BString::from(email.as_str()),
            when: Timestamp::new(seconds, offset_quarters * 15),
        };
        let encoded = ident.to_bytes();
        let parsed = Identity::parse(encoded.as_bstr()).unwrap();
        prop_assert_eq!(parsed, ident);
    }

    #[test]
    fn raw_timestamp_roundtrips(
        seconds in 0i64..=4_000_000_000,
        offset_quarters in -48i32..=48,
    ) {
        let t = Timestamp::new(seconds, offset_quarters * 15);
        let ident = Identity {
            name: BString::from("N"),
            email: BString::from("n@e.x"),
            when: t,
        };
        let bytes = ident.to_bytes();
        let tail = bytes.rfind(b"> ").unwrap() + 2;
        let reparsed =
            Timestamp::parse_raw(std::str::from_utf8(&bytes[tail..]).unwrap()).unwrap();
        prop_assert_eq!(reparsed, t);
    }
}
