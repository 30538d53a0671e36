#![no_main]

use libfuzzer_sys::fuzz_target;
use pixpipe::codecs::ico::decode_ico;

fuzz_target!(|data: &[u8]| {
    if let Ok(buffer) = decode_ico(data) {
        let (width, height) = buffer.dimensions();
        assert!(width > 0 && height > 0);
        let channels = buffer.format().channels();
        assert_eq!(buffer.as_bytes().len(), width as usize * height as usize * channels);
    }
});
