#![no_main]

use libfuzzer_sys::fuzz_target;
use streamable_http_transport::codec::{decode_document, JsonRpcCodec, JsonValueCodec};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let _ = decode_document(&JsonRpcCodec, text);

    // Every element of an array document is delivered, in order.
    if let Ok(values) = decode_document(&JsonValueCodec, text) {
        if let Ok(serde_json::Value::Array(items)) = serde_json::from_str(text) {
            assert_eq!(values, items);
        }
    }
});
