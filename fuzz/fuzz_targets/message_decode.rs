//! Fuzz target for HyparviewMessage decoding.
//!
//! Ensures no panics or overflows occur when parsing malformed wire data,
//! and that anything that decodes re-encodes to a decodable message.

#![no_main]

use libfuzzer_sys::fuzz_target;

use hyparview::HyparviewMessage;

fuzz_target!(|data: &[u8]| {
    if let Some(msg) = HyparviewMessage::decode_from_slice(data) {
        let encoded = msg.encode_to_bytes();
        let reparsed =
            HyparviewMessage::decode_from_slice(&encoded).expect("re-encoded message must decode");
        assert_eq!(msg, reparsed);
    }
});
