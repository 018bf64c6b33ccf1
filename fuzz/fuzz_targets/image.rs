#![no_main]

use libfuzzer_sys::fuzz_target;
use dotsplice::image;

fuzz_target!(|data: &[u8]| {
    if let Ok(module) = image::read_module(data) {
        let _ = image::write_module(&module);
    }
});
