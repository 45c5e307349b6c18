//! Pixel format registry
//!
//! Maps every in-memory [`PixelFormat`] the crate understands to the
//! engine's colorspace/chroma pair, and records which layouts an engine can
//! encode directly. Formats that cannot be encoded carry the format they
//! are converted to before saving.

use crate::pixel::PixelFormat;

/// Engine colorspace classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Colorspace {
    YCbCr,
    Rgb,
    Monochrome,
}

/// Engine chroma/interleaving classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Chroma {
    Monochrome,
    Cs420,
    Cs422,
    Cs444,
    /// 8-bit R, G, B
    InterleavedRgb,
    /// 8-bit R, G, B, A
    InterleavedRgba,
    /// 16-bit big-endian R, G, B
    InterleavedRrggbbBe,
    /// 16-bit big-endian R, G, B, A
    InterleavedRrggbbaaBe,
    /// 16-bit little-endian R, G, B
    InterleavedRrggbbLe,
    /// 16-bit little-endian R, G, B, A
    InterleavedRrggbbaaLe,
}

impl Chroma {
    /// Interleaved channel count, `None` for planar layouts
    pub fn interleaved_channels(self) -> Option<u8> {
        match self {
            Chroma::Monochrome => Some(1),
            Chroma::InterleavedRgb | Chroma::InterleavedRrggbbBe | Chroma::InterleavedRrggbbLe => {
                Some(3)
            }
            Chroma::InterleavedRgba
            | Chroma::InterleavedRrggbbaaBe
            | Chroma::InterleavedRrggbbaaLe => Some(4),
            Chroma::Cs420 | Chroma::Cs422 | Chroma::Cs444 => None,
        }
    }

    /// Whether each sample occupies a 16-bit word
    pub fn is_wide(self) -> bool {
        matches!(
            self,
            Chroma::InterleavedRrggbbBe
                | Chroma::InterleavedRrggbbaaBe
                | Chroma::InterleavedRrggbbLe
                | Chroma::InterleavedRrggbbaaLe
        )
    }

    pub fn is_big_endian(self) -> bool {
        matches!(
            self,
            Chroma::InterleavedRrggbbBe | Chroma::InterleavedRrggbbaaBe
        )
    }
}

/// One row of the registry
#[derive(Debug, Clone, Copy)]
pub struct FormatEntry {
    pub format: PixelFormat,
    pub colorspace: Colorspace,
    pub chroma: Chroma,
    /// Format the engine accepts for encoding, `None` when `format` itself is accepted
    pub save_as: Option<PixelFormat>,
}

impl FormatEntry {
    /// Whether the engine can encode this layout without a conversion
    pub fn is_natively_savable(&self) -> bool {
        self.save_as.is_none()
    }

    /// Unpadded stride: `width * channels * ceil(bits / 8)`
    pub fn stride(&self, width: u32) -> usize {
        width as usize
            * self.format.channels() as usize
            * (self.format.bits_per_channel() as usize).div_ceil(8)
    }
}

const fn entry(
    format: PixelFormat,
    colorspace: Colorspace,
    chroma: Chroma,
    save_as: Option<PixelFormat>,
) -> FormatEntry {
    FormatEntry {
        format,
        colorspace,
        chroma,
        save_as,
    }
}

use Chroma::*;
use Colorspace::{Monochrome as Mono, Rgb};

static FORMATS: [FormatEntry; 20] = [
    entry(PixelFormat::BGRA16, Rgb, InterleavedRrggbbaaLe, Some(PixelFormat::RGBA10)),
    entry(PixelFormat::BGR16, Rgb, InterleavedRrggbbLe, Some(PixelFormat::RGB10)),
    entry(PixelFormat::RGBA16, Rgb, InterleavedRrggbbaaLe, Some(PixelFormat::RGBA10)),
    entry(PixelFormat::RGB16, Rgb, InterleavedRrggbbLe, Some(PixelFormat::RGB10)),
    entry(PixelFormat::L16, Mono, Monochrome, Some(PixelFormat::L10)),
    entry(PixelFormat::RGBA12, Rgb, InterleavedRrggbbaaLe, None),
    entry(PixelFormat::RGB12, Rgb, InterleavedRrggbbLe, None),
    entry(PixelFormat::RGBA12_BE, Rgb, InterleavedRrggbbaaBe, None),
    entry(PixelFormat::RGB12_BE, Rgb, InterleavedRrggbbBe, None),
    entry(PixelFormat::L12, Mono, Monochrome, None),
    entry(PixelFormat::RGBA10, Rgb, InterleavedRrggbbaaLe, None),
    entry(PixelFormat::RGB10, Rgb, InterleavedRrggbbLe, None),
    entry(PixelFormat::RGBA10_BE, Rgb, InterleavedRrggbbaaBe, None),
    entry(PixelFormat::RGB10_BE, Rgb, InterleavedRrggbbBe, None),
    entry(PixelFormat::L10, Mono, Monochrome, None),
    entry(PixelFormat::RGBA8, Rgb, InterleavedRgba, None),
    entry(PixelFormat::RGB8, Rgb, InterleavedRgb, None),
    entry(PixelFormat::BGRA8, Rgb, InterleavedRgba, Some(PixelFormat::RGBA8)),
    entry(PixelFormat::BGR8, Rgb, InterleavedRgb, Some(PixelFormat::RGB8)),
    entry(PixelFormat::L8, Mono, Monochrome, None),
];

/// Registry row for `format`.
///
/// Premultiplied alpha shares the row of its straight-alpha layout.
pub fn lookup(format: PixelFormat) -> Option<&'static FormatEntry> {
    let key = format.with_premultiplied(false);
    FORMATS.iter().find(|e| e.format == key)
}

/// All registered formats
pub fn formats() -> impl Iterator<Item = PixelFormat> {
    FORMATS.iter().map(|e| e.format)
}

/// Format a decoder produces for an image with these properties
pub(crate) fn native_format(bits: u8, has_alpha: bool, monochrome: bool) -> PixelFormat {
    let base = match (monochrome, has_alpha) {
        (true, _) => PixelFormat::L8,
        (false, true) => PixelFormat::RGBA8,
        (false, false) => PixelFormat::RGB8,
    };
    base.with_bits(bits)
}
