//! Fuzz test for the binary record key encoding
//!
//! Run with: cargo +nightly fuzz run record_key_fuzz -- -max_total_time=60

#![no_main]

use gungnir_core::RecordKey;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes either decode to a key that re-encodes identically or are rejected
    if let Some(key) = RecordKey::decode(data) {
        assert_eq!(key.encode(), data, "Decoded key should re-encode to its input");
        assert!(
            data.starts_with(&RecordKey::table_prefix(key.table())),
            "Encoded key should start with its table prefix"
        );
    }
});
