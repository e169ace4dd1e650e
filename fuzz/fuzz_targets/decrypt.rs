#![no_main]

use digime_consent::crypto::{CryptoProvider, HybridCipher};
use libfuzzer_sys::fuzz_target;

static KEY_HEX: &str = include_str!("../../tests/data/private_key.hex");

fuzz_target!(|data: &[u8]| {
    if let Ok(key) = digime_consent::encoding::hex_to_bytes(KEY_HEX) {
        let _ = HybridCipher.decrypt(data, &key);
    }
});
