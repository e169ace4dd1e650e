#![no_main]

use digime_consent::handoff::HandoffResponse;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(link) = std::str::from_utf8(data) {
        let _ = HandoffResponse::parse(link, "digime-ca-");
    }
});
