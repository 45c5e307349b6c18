//! # zenheif
//!
//! HEIF/AVIF container model: multi-image files with a primary image,
//! thumbnails, EXIF/XMP/ICC metadata and pixel-format negotiation, on top
//! of a pluggable codec [`Engine`].
//!
//! Opening a file reads image properties and metadata; pixels are decoded
//! lazily, the first time they are needed.
//!
//! ## Quick Start
//!
//! ```no_run
//! use zenheif::{Container, PixelFormat, SaveOptions};
//!
//! let data = std::fs::read("image.heic").unwrap();
//! let mut file = Container::from_bytes(&data).unwrap();
//! let image = file.primary_mut().unwrap();
//! println!("{}x{} {}", image.width(), image.height(), image.format());
//!
//! image.convert_to(PixelFormat::RGBA8).unwrap();
//! image.add_thumbnails(&[256]).unwrap();
//! let out = file.save_to_vec(SaveOptions::new().quality(90)).unwrap();
//! ```
//!
//! ## Configuration
//!
//! ```no_run
//! use zenheif::{Container, OpenOptions, ReadMode};
//!
//! let options = OpenOptions::new()
//!     .convert_hdr_to_8bit(false)
//!     .bgr_mode(true)
//!     .read_mode(ReadMode::Streaming);
//! let file = Container::open_path(zenheif::default_engine(), "image.heic", &options).unwrap();
//! ```
//!
//! ## Engines
//!
//! [`UncompressedEngine`] is the built-in engine. It stores samples without
//! compression, which makes it suitable for tests and for tooling that only
//! rewrites container structure.

mod adapter;
mod config;
mod container;
pub mod convert;
pub mod engine;
mod error;
mod handle;
mod image;
mod io;
mod metadata;
mod pixel;
pub mod registry;

pub use adapter::{is_supported, mime_type};
pub use config::{Appendable, ChromaSubsampling, OpenOptions, Quality, SaveOptions};
pub use container::{Container, default_engine};
pub use engine::{CompressionFormat, Engine, UncompressedEngine};
pub use error::{Error, ErrorCategory, Result};
pub use handle::ScopedHandle;
pub use image::{Image, Thumbnail};
pub use io::{HeifReader, HeifWriter, ReadMode, SizeStatus, StreamReader};
pub use metadata::{ColorProfile, IccKind, MetadataBlock, MetadataKind};
pub use pixel::{ChannelOrder, Endianness, PixelBuffer, PixelFormat};

use std::io::{Read, Seek, Write};
use std::path::Path;

/// Open an in-memory file with default settings
///
/// # Example
///
/// ```no_run
/// let data = std::fs::read("image.heic").unwrap();
/// let file = zenheif::open(&data).unwrap();
/// println!("{file}");
/// ```
pub fn open(data: &[u8]) -> Result<Container> {
    Container::from_bytes(data)
}

/// Open a file and decode every image and thumbnail up front
pub fn read_path(path: impl AsRef<Path>) -> Result<Container> {
    let mut file = Container::from_path(path)?;
    file.load_all()?;
    Ok(file)
}

/// Whether the stream starts like a readable file
///
/// The stream position is left where it was. I/O errors count as "no".
pub fn is_supported_reader<R: Read + Seek>(reader: &mut R) -> bool {
    io::peek_prefix(reader, 12).is_ok_and(|prefix| is_supported(&prefix))
}

/// Encode one image from raw pixels and return the file bytes
///
/// `data` holds unpadded rows of `format`.
pub fn encode_to_vec(
    format: PixelFormat,
    size: (u32, u32),
    data: &[u8],
    options: SaveOptions<'_>,
) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    encode(format, size, data, &mut out, options)?;
    Ok(out)
}

/// Encode one image from raw pixels into `writer`
pub fn encode<W: Write>(
    format: PixelFormat,
    size: (u32, u32),
    data: &[u8],
    writer: &mut W,
    options: SaveOptions<'_>,
) -> Result<()> {
    let mut file = Container::new();
    file.add_from_bytes(format, size, data, None)?;
    file.save(writer, options)
}
