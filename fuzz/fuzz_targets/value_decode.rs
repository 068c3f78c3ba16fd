#![no_main]

use customcrud_value::{NumberMode, ValueCodec};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(json) = serde_json::from_slice::<serde_json::Value>(data) else {
        return;
    };
    for mode in [NumberMode::Float64, NumberMode::HighPrecision] {
        let codec = ValueCodec::new(mode);
        let decoded = codec.decode(&json);
        let encoded = codec.encode(&decoded);
        let hinted = codec.decode_hinted(&encoded, Some(&decoded));
        assert_eq!(codec.encode(&hinted), encoded);
        assert_eq!(codec.encode(&codec.decode(&encoded)), encoded);
    }
});
