#![no_main]
use libfuzzer_sys::fuzz_target;
use zenheif::{Container, SaveOptions};

fuzz_target!(|data: &[u8]| {
    // Anything that opens and decodes must save and decode to the same pixels
    let Ok(mut file) = Container::from_bytes(data) else {
        return;
    };
    if file.load_all().is_err() {
        return;
    }
    let saved = file
        .save_to_vec(SaveOptions::new().lossless())
        .expect("re-encoding a decoded file failed");
    let mut again = Container::from_bytes(&saved).expect("re-reading a saved file failed");
    assert_eq!(again.len(), file.len());
    for index in 0..file.len() {
        let before = file.get(index).and_then(|i| i.loaded_pixels()).map(|p| p.to_packed());
        let after = again.get_mut(index).and_then(|i| i.pixels().ok()).map(|p| p.to_packed());
        assert_eq!(before, after, "image {index} changed");
    }
});
