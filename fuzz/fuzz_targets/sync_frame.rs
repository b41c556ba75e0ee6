#![no_main]

use libfuzzer_sys::fuzz_target;
use lockstep_wire::SyncFrame;

fuzz_target!(|data: &[u8]| {
    if let Ok(frame) = SyncFrame::parse(data) {
        // anything accepted must survive a re-encode unchanged
        let encoded = frame.encode();
        assert_eq!(&encoded[..], data);
    }
});
