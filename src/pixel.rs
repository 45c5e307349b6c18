//! Pixel format descriptors and stride-aware pixel buffers

use crate::error::{Error, Result};
use core::fmt;
use core::str::FromStr;
use imgref::ImgVec;
use whereat::at;

/// Order of the color channels in an interleaved pixel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelOrder {
    Rgb,
    Bgr,
    Mono,
}

/// Byte order of samples wider than 8 bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Endianness {
    #[default]
    Little,
    Big,
}

/// Portable description of an interleaved pixel layout
///
/// Samples of 10 and 12 bits live in the low bits of 16-bit words.
/// Two formats with identical fields are the same format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelFormat {
    channels: u8,
    bits: u8,
    order: ChannelOrder,
    alpha: bool,
    premultiplied: bool,
    endianness: Endianness,
}

impl PixelFormat {
    const fn new(order: ChannelOrder, alpha: bool, bits: u8, endianness: Endianness) -> Self {
        let color = match order {
            ChannelOrder::Mono => 1,
            _ => 3,
        };
        Self {
            channels: color + alpha as u8,
            bits,
            order,
            alpha,
            premultiplied: false,
            endianness,
        }
    }

    pub const L8: Self = Self::new(ChannelOrder::Mono, false, 8, Endianness::Little);
    pub const L10: Self = Self::new(ChannelOrder::Mono, false, 10, Endianness::Little);
    pub const L12: Self = Self::new(ChannelOrder::Mono, false, 12, Endianness::Little);
    pub const L16: Self = Self::new(ChannelOrder::Mono, false, 16, Endianness::Little);
    pub const RGB8: Self = Self::new(ChannelOrder::Rgb, false, 8, Endianness::Little);
    pub const RGBA8: Self = Self::new(ChannelOrder::Rgb, true, 8, Endianness::Little);
    pub const BGR8: Self = Self::new(ChannelOrder::Bgr, false, 8, Endianness::Little);
    pub const BGRA8: Self = Self::new(ChannelOrder::Bgr, true, 8, Endianness::Little);
    pub const RGB10: Self = Self::new(ChannelOrder::Rgb, false, 10, Endianness::Little);
    pub const RGBA10: Self = Self::new(ChannelOrder::Rgb, true, 10, Endianness::Little);
    pub const RGB10_BE: Self = Self::new(ChannelOrder::Rgb, false, 10, Endianness::Big);
    pub const RGBA10_BE: Self = Self::new(ChannelOrder::Rgb, true, 10, Endianness::Big);
    pub const RGB12: Self = Self::new(ChannelOrder::Rgb, false, 12, Endianness::Little);
    pub const RGBA12: Self = Self::new(ChannelOrder::Rgb, true, 12, Endianness::Little);
    pub const RGB12_BE: Self = Self::new(ChannelOrder::Rgb, false, 12, Endianness::Big);
    pub const RGBA12_BE: Self = Self::new(ChannelOrder::Rgb, true, 12, Endianness::Big);
    pub const RGB16: Self = Self::new(ChannelOrder::Rgb, false, 16, Endianness::Little);
    pub const RGBA16: Self = Self::new(ChannelOrder::Rgb, true, 16, Endianness::Little);
    pub const BGR16: Self = Self::new(ChannelOrder::Bgr, false, 16, Endianness::Little);
    pub const BGRA16: Self = Self::new(ChannelOrder::Bgr, true, 16, Endianness::Little);

    /// Number of interleaved channels (1, 3 or 4)
    pub fn channels(&self) -> u8 {
        self.channels
    }

    /// Significant bits per channel (8, 10, 12 or 16)
    pub fn bits_per_channel(&self) -> u8 {
        self.bits
    }

    pub fn channel_order(&self) -> ChannelOrder {
        self.order
    }

    pub fn has_alpha(&self) -> bool {
        self.alpha
    }

    pub fn premultiplied_alpha(&self) -> bool {
        self.premultiplied
    }

    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    /// Storage bytes per channel sample: `ceil(bits / 8)`
    pub fn bytes_per_sample(&self) -> usize {
        (self.bits as usize).div_ceil(8)
    }

    pub fn bytes_per_pixel(&self) -> usize {
        self.channels as usize * self.bytes_per_sample()
    }

    /// Row length in bytes with no padding
    pub fn min_stride(&self, width: u32) -> usize {
        width as usize * self.bytes_per_pixel()
    }

    /// Same layout with the premultiplied flag set or cleared.
    ///
    /// Formats without alpha are returned unchanged.
    pub fn with_premultiplied(mut self, premultiplied: bool) -> Self {
        self.premultiplied = self.alpha && premultiplied;
        self
    }

    /// Same format with the RGB/BGR channel order replaced
    pub(crate) fn with_order(mut self, order: ChannelOrder) -> Self {
        if self.order != ChannelOrder::Mono && order != ChannelOrder::Mono {
            self.order = order;
        }
        self
    }

    pub(crate) fn with_bits(mut self, bits: u8) -> Self {
        self.bits = bits;
        self
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let base = match self.order {
            ChannelOrder::Mono => "L",
            ChannelOrder::Rgb => "RGB",
            ChannelOrder::Bgr => "BGR",
        };
        f.write_str(base)?;
        if self.alpha {
            f.write_str(if self.premultiplied { "a" } else { "A" })?;
        }
        if self.bits != 8 {
            write!(f, ";{}", self.bits)?;
            if self.endianness == Endianness::Big {
                f.write_str("B")?;
            }
        }
        Ok(())
    }
}

impl FromStr for PixelFormat {
    type Err = whereat::At<Error>;

    /// Parse a mode string such as `RGB`, `BGRA;16`, `RGB;10B`, `RGBa` or `I;16L`
    fn from_str(mode: &str) -> Result<Self> {
        let invalid = || at(Error::usage(format!("unknown pixel format `{mode}`")));
        if matches!(mode, "I;16" | "I;16L") {
            return Ok(Self::L16);
        }
        let (base, depth) = match mode.split_once(';') {
            Some((base, depth)) => (base, depth),
            None => (mode, "8"),
        };
        let (digits, endianness) = match depth.strip_suffix('B') {
            Some(digits) => (digits, Endianness::Big),
            None => (depth, Endianness::Little),
        };
        let bits: u8 = digits.parse().map_err(|_| invalid())?;
        if !matches!(bits, 8 | 10 | 12 | 16) || (bits == 8 && mode.contains(';')) {
            return Err(invalid());
        }
        let (order, alpha, premultiplied) = match base {
            "L" => (ChannelOrder::Mono, false, false),
            "RGB" => (ChannelOrder::Rgb, false, false),
            "RGBA" => (ChannelOrder::Rgb, true, false),
            "RGBa" => (ChannelOrder::Rgb, true, true),
            "BGR" => (ChannelOrder::Bgr, false, false),
            "BGRA" => (ChannelOrder::Bgr, true, false),
            "BGRa" => (ChannelOrder::Bgr, true, true),
            _ => return Err(invalid()),
        };
        Ok(Self::new(order, alpha, bits, endianness).with_premultiplied(premultiplied))
    }
}

/// An owned, row-padded pixel buffer
///
/// Invariants: `stride >= width * bytes_per_pixel` and the backing
/// storage holds at least `stride * height` bytes.
#[derive(Debug, Clone)]
pub struct PixelBuffer {
    /// Rows of `width * bytes_per_pixel` bytes, `stride` bytes apart
    img: ImgVec<u8>,
    width: u32,
    format: PixelFormat,
}

impl PixelBuffer {
    /// Zero-filled buffer with unpadded rows
    pub fn new(format: PixelFormat, width: u32, height: u32) -> Self {
        let stride = format.min_stride(width);
        Self::zeroed(format, width, height, stride)
    }

    pub(crate) fn zeroed(format: PixelFormat, width: u32, height: u32, stride: usize) -> Self {
        let data = vec![0u8; stride * height as usize];
        Self {
            img: ImgVec::new_stride(data, format.min_stride(width), height as usize, stride),
            width,
            format,
        }
    }

    /// Take ownership of `data` laid out with the given stride
    pub fn from_vec(
        format: PixelFormat,
        width: u32,
        height: u32,
        stride: usize,
        mut data: Vec<u8>,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(at(Error::usage("empty images are not supported")));
        }
        let row_bytes = format.min_stride(width);
        if stride < row_bytes {
            return Err(at(Error::usage(format!(
                "stride {stride} is smaller than a {width}px {format} row ({row_bytes} bytes)"
            ))));
        }
        let needed = stride * height as usize;
        if data.len() < needed {
            return Err(at(Error::usage(format!(
                "pixel data holds {} bytes, {width}x{height} {format} with stride {stride} needs {needed}",
                data.len()
            ))));
        }
        data.truncate(needed);
        Ok(Self {
            img: ImgVec::new_stride(data, row_bytes, height as usize, stride),
            width,
            format,
        })
    }

    /// Copy `data` laid out with the given stride
    pub fn from_slice(
        format: PixelFormat,
        width: u32,
        height: u32,
        stride: usize,
        data: &[u8],
    ) -> Result<Self> {
        let needed = stride.saturating_mul(height as usize).min(data.len());
        Self::from_vec(format, width, height, stride, data[..needed].to_vec())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.img.height() as u32
    }

    pub fn stride(&self) -> usize {
        self.img.stride()
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Bytes of pixel data in one row, excluding padding
    pub fn row_bytes(&self) -> usize {
        self.img.width()
    }

    /// Whole backing store, padding included
    pub fn data(&self) -> &[u8] {
        self.img.buf()
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        self.img.buf_mut()
    }

    /// Pixel bytes of row `y` without padding
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride();
        &self.data()[start..start + self.row_bytes()]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[u8]> {
        self.img.rows()
    }

    /// Pixel data with padding removed
    pub fn to_packed(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.row_bytes() * self.height() as usize);
        for row in self.rows() {
            out.extend_from_slice(row);
        }
        out
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.img.into_buf()
    }

    pub(crate) fn set_format_flags(&mut self, format: PixelFormat) {
        debug_assert_eq!(format.bytes_per_pixel(), self.format.bytes_per_pixel());
        self.format = format;
    }
}

impl PartialEq for PixelBuffer {
    /// Equal when format, size and every pixel row match; padding is ignored
    fn eq(&self, other: &Self) -> bool {
        self.format == other.format
            && self.width == other.width
            && self.height() == other.height()
            && self.rows().eq(other.rows())
    }
}

impl Eq for PixelBuffer {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_strings_roundtrip() {
        for mode in [
            "L", "L;10", "L;12", "L;16", "RGB", "RGBA", "RGBa", "BGR", "BGRA", "RGB;10",
            "RGBA;10", "RGB;10B", "RGBA;12B", "RGB;12", "RGB;16", "BGRA;16",
        ] {
            let format: PixelFormat = mode.parse().unwrap();
            assert_eq!(format.to_string(), mode);
        }
    }

    #[test]
    fn legacy_mono_aliases() {
        assert_eq!("I;16".parse::<PixelFormat>().unwrap(), PixelFormat::L16);
        assert_eq!("I;16L".parse::<PixelFormat>().unwrap(), PixelFormat::L16);
    }

    #[test]
    fn rejects_unknown_modes() {
        for mode in ["CMYK", "RGB;9", "RGB;8", "", "RGB;x"] {
            assert!(mode.parse::<PixelFormat>().is_err(), "{mode}");
        }
    }

    #[test]
    fn sample_geometry() {
        assert_eq!(PixelFormat::RGB10.bytes_per_pixel(), 6);
        assert_eq!(PixelFormat::RGBA8.bytes_per_pixel(), 4);
        assert_eq!(PixelFormat::L12.min_stride(7), 14);
        assert_eq!(PixelFormat::BGRA16.channels(), 4);
    }

    #[test]
    fn premultiplied_needs_alpha() {
        assert!(!PixelFormat::RGB8.with_premultiplied(true).premultiplied_alpha());
        assert!(PixelFormat::RGBA8.with_premultiplied(true).premultiplied_alpha());
    }

    #[test]
    fn buffer_checks_stride_and_length() {
        assert!(PixelBuffer::from_vec(PixelFormat::RGB8, 4, 2, 11, vec![0; 24]).is_err());
        assert!(PixelBuffer::from_vec(PixelFormat::RGB8, 4, 2, 16, vec![0; 31]).is_err());
        assert!(PixelBuffer::from_vec(PixelFormat::RGB8, 0, 2, 16, vec![0; 32]).is_err());
        let buf = PixelBuffer::from_vec(PixelFormat::RGB8, 4, 2, 16, vec![7; 40]).unwrap();
        assert_eq!(buf.data().len(), 32);
        assert_eq!(buf.row(1).len(), 12);
    }

    #[test]
    fn equality_ignores_padding() {
        let mut padded = vec![0u8; 2 * 8];
        padded[..6].copy_from_slice(&[1, 2, 3, 4, 5, 6]);
        padded[8..14].copy_from_slice(&[7, 8, 9, 10, 11, 12]);
        padded[6] = 0xAA;
        let a = PixelBuffer::from_vec(PixelFormat::RGB8, 2, 2, 8, padded).unwrap();
        let b = PixelBuffer::from_vec(
            PixelFormat::RGB8,
            2,
            2,
            6,
            vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12],
        )
        .unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_packed(), b.to_packed());
    }
}
