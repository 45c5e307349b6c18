//! Native codec engine boundary
//!
//! The bitstream encoder/decoder is an external collaborator. It is
//! reached only through [`Engine`], whose shape mirrors a C library:
//! every object lives behind an opaque [`RawHandle`] that the caller must
//! hand back to [`Engine::release`] exactly once, and every call reports
//! failure as an [`EngineError`] code rather than panicking.
//!
//! Callers inside this crate never hold a bare `RawHandle` for longer than
//! one expression; they wrap it in [`crate::ScopedHandle`].

mod uncompressed;

pub use uncompressed::UncompressedEngine;

use crate::io::{HeifReader, HeifWriter};
use crate::metadata::ColorProfile;
use crate::registry::{Chroma, Colorspace};
use core::fmt;
use core::num::NonZeroU64;
use core::str::FromStr;

/// Native item id, unique within one file
pub type ItemId = u32;

/// Opaque native object reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawHandle(NonZeroU64);

impl RawHandle {
    /// Handle value issued by an [`Engine`] implementation
    pub fn from_raw(value: NonZeroU64) -> Self {
        Self(value)
    }

    pub fn get(self) -> u64 {
        self.0.get()
    }
}

/// What a [`RawHandle`] refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleKind {
    /// File being read or written
    Context,
    /// Configured encoder
    Encoder,
    /// Image item inside a context
    ImageHandle,
    /// Decoded or caller-supplied pixels
    Image,
}

/// Native error code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ErrorCode {
    Io = 1,
    InvalidInput = 2,
    UnsupportedFiletype = 3,
    UnsupportedFeature = 4,
    Usage = 5,
    MemoryAllocation = 6,
    Decoder = 7,
    Encoder = 8,
}

/// Native error report: code, subcode and message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineError {
    pub code: ErrorCode,
    pub subcode: i32,
    pub message: String,
}

impl EngineError {
    pub fn new(code: ErrorCode, subcode: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            subcode,
            message: message.into(),
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}.{}: {}", self.code, self.subcode, self.message)
    }
}

pub type EngineResult<T> = core::result::Result<T, EngineError>;

/// Compression used for the image items of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompressionFormat {
    /// HEVC, written with a `heic` brand
    #[default]
    Hevc,
    /// AV1, written with an `avif` brand
    Av1,
}

impl CompressionFormat {
    /// User-facing format name
    pub fn name(self) -> &'static str {
        match self {
            CompressionFormat::Hevc => "HEIF",
            CompressionFormat::Av1 => "AVIF",
        }
    }
}

impl FromStr for CompressionFormat {
    type Err = whereat::At<crate::Error>;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "HEIF" | "HEIC" | "HEVC" => Ok(CompressionFormat::Hevc),
            "AVIF" | "AV1" => Ok(CompressionFormat::Av1),
            _ => Err(whereat::at(crate::Error::usage(format!(
                "unknown compression format `{s}`"
            )))),
        }
    }
}

/// Properties of an image item, available without decoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandleInfo {
    pub width: u32,
    pub height: u32,
    pub has_alpha: bool,
    pub premultiplied_alpha: bool,
    pub monochrome: bool,
    /// Stored luma bit depth
    pub bit_depth: u8,
    pub is_primary: bool,
}

/// Options for [`Engine::decode`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DecodeOptions {
    /// Reduce samples above 8 bits to 8 bits
    pub convert_hdr_to_8bit: bool,
    /// Worker threads, 0 = engine default
    pub threads: u32,
}

/// Interleaved pixel plane copied out of an engine image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plane {
    pub width: u32,
    pub height: u32,
    /// Significant bits per sample
    pub bits: u8,
    pub stride: usize,
    pub data: Vec<u8>,
}

/// Metadata item attached to an image item, as stored in the file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMetadata {
    /// Item type, e.g. `Exif` or `mime`
    pub item_type: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// Native encode/decode engine.
///
/// Implementations are single-threaded: contexts are not assumed to be
/// reentrant, so handles must not cross threads.
pub trait Engine: fmt::Debug {
    /// Whether files with this compression can be read
    fn supports_decoding(&self, format: CompressionFormat) -> bool;

    /// Whether an encoder for this compression is available
    fn supports_encoding(&self, format: CompressionFormat) -> bool;

    /// Free a native object. Unknown handles are ignored.
    fn release(&self, handle: RawHandle, kind: HandleKind);

    fn alloc_context(&self) -> EngineResult<RawHandle>;

    /// Parse a complete file held in memory
    fn read_from_memory(&self, ctx: RawHandle, data: &[u8]) -> EngineResult<()>;

    /// Parse a file through reader callbacks
    fn read_from_reader(&self, ctx: RawHandle, reader: &mut dyn HeifReader) -> EngineResult<()>;

    fn primary_image_id(&self, ctx: RawHandle) -> EngineResult<ItemId>;

    fn top_level_image_ids(&self, ctx: RawHandle) -> EngineResult<Vec<ItemId>>;

    fn image_handle(&self, ctx: RawHandle, id: ItemId) -> EngineResult<RawHandle>;

    fn handle_info(&self, handle: RawHandle) -> EngineResult<HandleInfo>;

    fn thumbnail_ids(&self, handle: RawHandle) -> EngineResult<Vec<ItemId>>;

    fn thumbnail_handle(&self, handle: RawHandle, id: ItemId) -> EngineResult<RawHandle>;

    fn color_profile(&self, handle: RawHandle) -> EngineResult<ColorProfile>;

    fn metadata_blocks(&self, handle: RawHandle) -> EngineResult<Vec<RawMetadata>>;

    /// Decode an image item into a new engine image
    fn decode(
        &self,
        handle: RawHandle,
        colorspace: Colorspace,
        chroma: Chroma,
        options: DecodeOptions,
    ) -> EngineResult<RawHandle>;

    /// Copy the interleaved plane out of an engine image
    fn plane(&self, image: RawHandle) -> EngineResult<Plane>;

    /// Resize an engine image into a new one
    fn scale(&self, image: RawHandle, width: u32, height: u32) -> EngineResult<RawHandle>;

    /// Create an engine image from caller pixels
    #[allow(clippy::too_many_arguments)]
    fn create_image(
        &self,
        width: u32,
        height: u32,
        colorspace: Colorspace,
        chroma: Chroma,
        bits: u8,
        data: &[u8],
        stride: usize,
    ) -> EngineResult<RawHandle>;

    fn set_color_profile(&self, image: RawHandle, profile: &ColorProfile) -> EngineResult<()>;

    fn set_premultiplied_alpha(&self, image: RawHandle, premultiplied: bool) -> EngineResult<()>;

    fn encoder_for_format(&self, ctx: RawHandle, format: CompressionFormat)
    -> EngineResult<RawHandle>;

    fn set_lossless(&self, encoder: RawHandle, lossless: bool) -> EngineResult<()>;

    fn set_lossy_quality(&self, encoder: RawHandle, quality: u8) -> EngineResult<()>;

    fn set_parameter(&self, encoder: RawHandle, name: &str, value: &str) -> EngineResult<()>;

    /// Encode an engine image as a new top-level item, returning its item handle
    fn encode_image(
        &self,
        ctx: RawHandle,
        encoder: RawHandle,
        image: RawHandle,
    ) -> EngineResult<RawHandle>;

    fn set_primary_image(&self, ctx: RawHandle, handle: RawHandle) -> EngineResult<()>;

    /// Attach EXIF; the engine prepends the 4-byte TIFF header offset
    fn add_exif(&self, ctx: RawHandle, handle: RawHandle, data: &[u8]) -> EngineResult<()>;

    fn add_xmp(&self, ctx: RawHandle, handle: RawHandle, data: &[u8]) -> EngineResult<()>;

    fn add_generic_metadata(
        &self,
        ctx: RawHandle,
        handle: RawHandle,
        block: &RawMetadata,
    ) -> EngineResult<()>;

    /// Encode a thumbnail of `image` fitting a `bbox` square and link it to `parent`.
    ///
    /// Returns `None` when the image already fits the box.
    fn encode_thumbnail(
        &self,
        ctx: RawHandle,
        encoder: RawHandle,
        image: RawHandle,
        parent: RawHandle,
        bbox: u32,
    ) -> EngineResult<Option<RawHandle>>;

    fn write(&self, ctx: RawHandle, writer: &mut dyn HeifWriter) -> EngineResult<()>;
}
