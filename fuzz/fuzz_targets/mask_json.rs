#![no_main]

use customcrud_exec::{SensitiveMasker, REDACTION_MARKER};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let raw = String::from_utf8_lossy(data);
    let masker = SensitiveMasker::new(["password", "token"], ["hunter2"]);

    let masked = masker.mask_json(&raw);
    if serde_json::from_str::<serde_json::Value>(&raw).is_ok() {
        assert!(serde_json::from_str::<serde_json::Value>(&masked).is_ok());
    }
    let scrubbed = masker.mask_values(&raw);
    assert!(!scrubbed.contains("hunter2"));
    if raw.contains("hunter2") {
        assert!(scrubbed.contains(REDACTION_MARKER));
    }
});
