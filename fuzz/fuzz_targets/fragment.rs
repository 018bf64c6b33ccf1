#![no_main]

use libfuzzer_sys::fuzz_target;
use dotsplice::source::Fragment;

fuzz_target!(|data: &[u8]| {
    if let Ok(source) = std::str::from_utf8(data) {
        let _ = Fragment::parse(source);
    }
});
