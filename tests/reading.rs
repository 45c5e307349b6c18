//! Open paths, read modes, sniffing and decode-time layout options

use std::io::{Cursor, Seek, SeekFrom};
use zenheif::{
    Container, Error, OpenOptions, PixelFormat, ReadMode, SaveOptions, default_engine,
};

fn make_rgb8(w: u32, h: u32) -> Vec<u8> {
    (0..w * h)
        .flat_map(|i| [(i % 251) as u8, (i % 13) as u8 * 10, 255 - (i % 97) as u8])
        .collect()
}

/// Unpadded little-endian RGB;10 samples
fn make_rgb10(w: u32, h: u32) -> Vec<u16> {
    (0..w * h * 3).map(|i| ((i * 37) % 1024) as u16).collect()
}

fn le_bytes(samples: &[u16]) -> Vec<u8> {
    samples.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn le_samples(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect()
}

fn saved(format: PixelFormat, size: (u32, u32), data: &[u8]) -> Vec<u8> {
    zenheif::encode_to_vec(format, size, data, SaveOptions::new()).unwrap()
}

#[test]
fn streaming_and_in_memory_reads_agree() {
    let mut file = Container::new();
    for seed in 0..2u32 {
        let image = file
            .add_from_bytes(PixelFormat::RGB8, (20 + seed, 10), &make_rgb8(20 + seed, 10), None)
            .unwrap();
        image.set_xmp(Some(b"<xmp/>".to_vec()));
        image.add_thumbnails(&[6]).unwrap();
    }
    let bytes = file.save_to_vec(SaveOptions::new()).unwrap();

    let mut memory = Container::from_bytes(&bytes).unwrap();
    for mode in [ReadMode::InMemory, ReadMode::Streaming] {
        let options = OpenOptions::new().read_mode(mode);
        let mut streamed =
            Container::open_reader(default_engine(), Cursor::new(bytes.clone()), &options)
                .unwrap();
        assert_eq!(streamed.len(), memory.len());
        assert_eq!(streamed.mime_type(), Some("image/heic"));
        for index in 0..memory.len() {
            let a = memory.get_mut(index).unwrap();
            let b = streamed.get_mut(index).unwrap();
            assert_eq!(a.size(), b.size());
            assert_eq!(a.xmp(), b.xmp());
            assert_eq!(a.thumbnails().len(), b.thumbnails().len());
            assert_eq!(a.pixels().unwrap(), b.pixels().unwrap());
        }
    }
}

#[test]
fn open_reader_starts_from_the_beginning() {
    let bytes = saved(PixelFormat::RGB8, (4, 4), &make_rgb8(4, 4));
    let mut cursor = Cursor::new(bytes);
    cursor.seek(SeekFrom::Start(7)).unwrap();
    let file = Container::from_reader(cursor).unwrap();
    assert_eq!(file.len(), 1);
}

#[test]
fn truncated_or_foreign_input_is_rejected() {
    let bytes = saved(PixelFormat::RGB8, (4, 4), &make_rgb8(4, 4));
    assert!(zenheif::is_supported(&bytes));
    assert!(!zenheif::is_supported(&bytes[..4]));
    assert!(!zenheif::is_supported(&bytes[..6]));
    assert!(!zenheif::is_supported(b"\x89PNG\r\n\x1a\n\0\0\0\0"));
    assert!(!zenheif::is_supported(&[]));

    let err = Container::from_bytes(&bytes[..6]).unwrap_err().into_inner();
    assert!(matches!(err, Error::Format(_)));

    // header intact, image boxes cut short
    let err = Container::from_bytes(&bytes[..bytes.len() - 5])
        .unwrap_err()
        .into_inner();
    assert!(matches!(err, Error::Format(_)));

    let mut cursor = Cursor::new(&bytes[..6]);
    assert!(!zenheif::is_supported_reader(&mut cursor));
    assert_eq!(cursor.position(), 0);
}

#[test]
fn bgr_mode_swaps_channels() {
    let data = make_rgb8(5, 3);
    let bytes = saved(PixelFormat::RGB8, (5, 3), &data);
    let mut file =
        Container::open_bytes(default_engine(), &bytes, &OpenOptions::new().bgr_mode(true))
            .unwrap();
    let image = file.primary_mut().unwrap();
    assert_eq!(image.format(), PixelFormat::BGR8);
    let expected: Vec<u8> = data.chunks_exact(3).flat_map(|p| [p[2], p[1], p[0]]).collect();
    assert_eq!(image.pixels().unwrap().to_packed(), expected);
}

#[test]
fn high_bit_depth_is_narrowed_by_default() {
    let samples = make_rgb10(6, 4);
    let bytes = saved(PixelFormat::RGB10, (6, 4), &le_bytes(&samples));

    let mut file = Container::from_bytes(&bytes).unwrap();
    let image = file.primary_mut().unwrap();
    assert_eq!(image.format(), PixelFormat::RGB8);
    assert_eq!(image.bit_depth(), 8);
    assert_eq!(image.original_bit_depth(), 10);
    let expected: Vec<u8> = samples.iter().map(|&v| (v >> 2) as u8).collect();
    assert_eq!(image.pixels().unwrap().to_packed(), expected);
}

#[test]
fn high_bit_depth_is_kept_on_request() {
    let samples = make_rgb10(6, 4);
    let bytes = saved(PixelFormat::RGB10, (6, 4), &le_bytes(&samples));
    let options = OpenOptions::new().convert_hdr_to_8bit(false);

    let mut file = Container::open_bytes(default_engine(), &bytes, &options).unwrap();
    let image = file.primary_mut().unwrap();
    assert_eq!(image.format(), PixelFormat::RGB10);
    assert_eq!(image.bit_depth(), 10);
    assert_eq!(le_samples(&image.pixels().unwrap().to_packed()), samples);

    let mut file =
        Container::open_bytes(default_engine(), &bytes, &options.bgr_mode(true)).unwrap();
    let image = file.primary_mut().unwrap();
    assert_eq!(image.format(), PixelFormat::BGR16);
    let expected: Vec<u16> = samples
        .chunks_exact(3)
        .flat_map(|p| [p[2] << 6, p[1] << 6, p[0] << 6])
        .collect();
    assert_eq!(le_samples(&image.pixels().unwrap().to_packed()), expected);
}

#[test]
fn sixteen_bit_input_is_stored_as_ten_bit() {
    let samples: Vec<u16> = (0..4 * 4 * 3).map(|i| (i as u16) * 1000).collect();
    let bytes = saved(PixelFormat::RGB16, (4, 4), &le_bytes(&samples));
    let options = OpenOptions::new().convert_hdr_to_8bit(false);
    let mut file = Container::open_bytes(default_engine(), &bytes, &options).unwrap();
    let image = file.primary_mut().unwrap();
    assert_eq!(image.original_bit_depth(), 10);
    assert_eq!(image.format(), PixelFormat::RGB10);
    let expected: Vec<u16> = samples.iter().map(|v| v >> 6).collect();
    assert_eq!(le_samples(&image.pixels().unwrap().to_packed()), expected);
}

#[test]
fn converting_to_the_current_format_does_not_decode() {
    let bytes = saved(PixelFormat::RGB8, (8, 8), &make_rgb8(8, 8));
    let mut file = Container::from_bytes(&bytes).unwrap();
    let image = file.primary_mut().unwrap();
    image.convert_to(PixelFormat::RGB8).unwrap();
    assert!(!image.is_loaded());

    file.convert_to(PixelFormat::BGR8).unwrap();
    let image = file.primary_mut().unwrap();
    assert!(image.is_loaded());
    assert_eq!(image.format(), PixelFormat::BGR8);
    // pixels now live only in memory
    image.unload();
    assert!(image.is_loaded());
}

#[test]
fn thumbnail_requests_on_a_decoded_image() {
    let bytes = saved(PixelFormat::RGB8, (512, 512), &make_rgb8(512, 512));
    let mut file = Container::from_bytes(&bytes).unwrap();
    let image = file.primary_mut().unwrap();
    image.add_thumbnails(&[2]).unwrap();
    assert!(image.thumbnails().is_empty());
    image.add_thumbnails(&[64, 64]).unwrap();
    assert_eq!(image.thumbnails().len(), 1);
    assert_eq!(image.thumbnails()[0].size(), (64, 64));

    let out = file.save_to_vec(SaveOptions::new()).unwrap();
    let reopened = Container::from_bytes(&out).unwrap();
    assert_eq!(reopened.get(0).unwrap().thumbnails().len(), 1);
}

#[test]
fn scaling_the_primary_image() {
    let bytes = saved(PixelFormat::RGB8, (16, 8), &make_rgb8(16, 8));
    let mut file = Container::from_bytes(&bytes).unwrap();
    file.scale(8, 4).unwrap();
    let image = file.primary_mut().unwrap();
    assert_eq!(image.size(), (8, 4));
    assert_eq!(image.pixels().unwrap().width(), 8);

    let err = file.scale(0, 4).unwrap_err().into_inner();
    assert!(matches!(err, Error::Usage(_)));
}
