//! Fuzz test for the record document codec
//!
//! Feeds arbitrary bytes to `Record::from_document` to find:
//! - Panics or crashes
//! - Documents that decode but cannot be encoded again
//!
//! Run with: cargo +nightly fuzz run record_document_fuzz -- -max_total_time=60

#![no_main]

use gungnir_core::{Record, ID_KEY};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Malformed documents must be rejected with an error, never a panic
    let Ok(record) = Record::from_document(data) else {
        return;
    };

    // The identifier is never stored as an ordinary field
    assert!(
        !record.fields().contains_key(ID_KEY),
        "Decoded record should keep _id out of its fields"
    );

    // Anything that decodes must encode and decode again to the same shape
    let encoded = record.to_document().expect("Decoded record should encode");
    let decoded = Record::from_document(&encoded).expect("Encoded record should decode");
    assert_eq!(decoded.id(), record.id());
    assert!(
        decoded.fields().keys().eq(record.fields().keys()),
        "Field keys should survive re-encoding"
    );
});
