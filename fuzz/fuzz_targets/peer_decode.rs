//! Fuzz target for Peer identity decoding.

#![no_main]

use libfuzzer_sys::fuzz_target;

use hyparview::Peer;

fuzz_target!(|data: &[u8]| {
    let mut buf = data;
    if let Some(peer) = Peer::decode(&mut buf) {
        let encoded = peer.encode_to_bytes();
        let mut slice = &encoded[..];
        let reparsed = Peer::decode(&mut slice).expect("re-encoded peer must decode");
        assert_eq!(peer, reparsed);
    }
});
