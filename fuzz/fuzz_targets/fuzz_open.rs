#![no_main]
use libfuzzer_sys::fuzz_target;
use std::io::Cursor;
use zenheif::{Container, OpenOptions, ReadMode};

fuzz_target!(|data: &[u8]| {
    // Sniffing and opening must never panic
    let _ = zenheif::is_supported(data);
    let _ = zenheif::mime_type(data);

    if let Ok(mut file) = Container::from_bytes(data) {
        let _ = file.load_all();
        let _ = file.to_string();
    }

    let options = OpenOptions::new()
        .read_mode(ReadMode::Streaming)
        .convert_hdr_to_8bit(false)
        .bgr_mode(true);
    if let Ok(mut file) = Container::open_reader(zenheif::default_engine(), Cursor::new(data), &options) {
        let _ = file.load_all();
    }
});
