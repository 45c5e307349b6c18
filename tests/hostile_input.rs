//! Malformed and adversarial files fail with errors instead of panicking

use std::io::Cursor;
use zenheif::{
    Container, Error, OpenOptions, PixelFormat, ReadMode, SaveOptions, default_engine,
};

fn boxed(kind: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut out = ((body.len() + 8) as u32).to_be_bytes().to_vec();
    out.extend_from_slice(kind);
    out.extend_from_slice(body);
    out
}

/// Uncompressed-engine file holding a single image item
fn single_item(id: u32, size: (u32, u32), bits: u8, channels: u8, pxls: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&id.to_be_bytes());
    body.extend_from_slice(&size.0.to_be_bytes());
    body.extend_from_slice(&size.1.to_be_bytes());
    body.extend_from_slice(&[bits, channels, 0, 0]);
    body.extend_from_slice(&0u32.to_be_bytes());
    body.extend_from_slice(&boxed(b"pxls", pxls));

    let mut out = boxed(b"ftyp", b"heic\0\0\0\0");
    out.extend_from_slice(&boxed(b"iimg", &body));
    out
}

fn open_both_ways(bytes: &[u8]) -> [zenheif::Result<Container>; 2] {
    [ReadMode::InMemory, ReadMode::Streaming].map(|mode| {
        let options = OpenOptions::new().read_mode(mode);
        Container::open_reader(default_engine(), Cursor::new(bytes.to_vec()), &options)
    })
}

#[test]
fn oversized_dimensions_are_a_format_error() {
    for (bits, channels) in [(10, 4), (8, 3)] {
        let bytes = single_item(1, (0x8000_0000, 0x8000_0000), bits, channels, &[]);
        for result in open_both_ways(&bytes) {
            let err = result.unwrap_err().into_inner();
            assert!(matches!(err, Error::Format(_)), "{bits}x{channels}: {err}");
        }
    }
}

#[test]
fn short_sample_payload_is_a_format_error() {
    let bytes = single_item(1, (2, 2), 8, 3, &[0; 11]);
    let err = Container::from_bytes(&bytes).unwrap_err().into_inner();
    assert!(matches!(err, Error::Format(_)));

    // the pxls box claims more bytes than the file has
    let bytes = single_item(1, (2, 2), 8, 3, &[0; 12]);
    assert_eq!(Container::from_bytes(&bytes).unwrap().len(), 1);
    for result in open_both_ways(&bytes[..bytes.len() - 7]) {
        assert!(matches!(result.unwrap_err().into_inner(), Error::Format(_)));
    }
}

#[test]
fn largest_item_id_leaves_no_room_for_new_images() {
    let pixels = [10, 20, 30];
    let bytes = single_item(u32::MAX, (1, 1), 8, 3, &pixels);
    let mut file = Container::from_bytes(&bytes).unwrap();
    assert_eq!(file.get(0).unwrap().id(), u32::MAX);
    assert_eq!(file.get_mut(0).unwrap().pixels().unwrap().to_packed(), pixels);

    let err = file
        .add_from_bytes(PixelFormat::RGB8, (8, 8), &[0; 8 * 8 * 3], None)
        .unwrap_err()
        .into_inner();
    assert!(matches!(err, Error::Usage(_)));

    let mut other = Container::new();
    let mut image = other
        .add_from_bytes(PixelFormat::RGB8, (1, 1), &[1, 2, 3], None)
        .unwrap()
        .duplicate()
        .unwrap();
    let err = file.add_image(&mut image).unwrap_err().into_inner();
    assert!(matches!(err, Error::Usage(_)));
    assert_eq!(file.len(), 1);

    // the file itself is still writable
    let out = file.save_to_vec(SaveOptions::new()).unwrap();
    assert_eq!(Container::from_bytes(&out).unwrap().len(), 1);
}

#[test]
fn ids_just_below_the_limit_are_still_usable() {
    let bytes = single_item(u32::MAX - 2, (1, 1), 8, 3, &[1, 2, 3]);
    let mut file = Container::from_bytes(&bytes).unwrap();
    let added = file
        .add_from_bytes(PixelFormat::RGB8, (1, 1), &[4, 5, 6], None)
        .unwrap();
    assert_eq!(added.id(), u32::MAX);
    assert_ne!(file.get(0).unwrap().id(), file.get(1).unwrap().id());
}

#[test]
fn every_prefix_of_a_file_opens_or_fails_cleanly() {
    let mut file = Container::new();
    let image = file
        .add_from_bytes(PixelFormat::RGB8, (6, 4), &[90; 6 * 4 * 3], None)
        .unwrap();
    image.set_exif(Some(b"Exif\0\0MM\0*".to_vec()));
    image.add_thumbnails(&[4]).unwrap();
    let bytes = file.save_to_vec(SaveOptions::new()).unwrap();

    for len in 0..bytes.len() {
        for result in open_both_ways(&bytes[..len]) {
            if let Ok(mut opened) = result {
                let _ = opened.load_all();
            }
        }
    }
    for result in open_both_ways(&bytes) {
        result.unwrap().load_all().unwrap();
    }
}
