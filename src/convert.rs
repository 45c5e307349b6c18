//! Pixel format conversion matrix
//!
//! Each supported (source, target) pair maps to one [`Transcode`]: a
//! per-sample depth operation combined with an optional RGB/BGR swap.
//! Conversion walks the buffers row by row, honoring both strides.

use crate::error::{Error, Result};
use crate::pixel::{PixelBuffer, PixelFormat};
use whereat::at;

/// What happens to each sample value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepthOp {
    /// Same bit depth, samples copied
    Same,
    /// 8-bit sample placed verbatim in a 16-bit word
    Promote,
    /// 16-bit word shifted left (10/12-bit to 16-bit)
    Widen(u32),
    /// 16-bit word shifted right (16-bit to 10-bit)
    Narrow(u32),
}

/// One entry of the conversion matrix
#[derive(Debug, Clone, Copy)]
pub struct Transcode {
    pub from: PixelFormat,
    pub to: PixelFormat,
    pub op: DepthOp,
    /// Exchange the first and third channel
    pub swap: bool,
}

const fn t(from: PixelFormat, to: PixelFormat, op: DepthOp, swap: bool) -> Transcode {
    Transcode { from, to, op, swap }
}

use DepthOp::*;
type F = PixelFormat;

static MATRIX: &[Transcode] = &[
    // 16 -> 10
    t(F::BGRA16, F::RGBA10, Narrow(6), true),
    t(F::BGR16, F::RGB10, Narrow(6), true),
    t(F::RGBA16, F::RGBA10, Narrow(6), false),
    t(F::RGB16, F::RGB10, Narrow(6), false),
    t(F::L16, F::L10, Narrow(6), false),
    // 12 -> 16
    t(F::RGBA12, F::RGBA16, Widen(4), false),
    t(F::RGBA12, F::BGRA16, Widen(4), true),
    t(F::RGB12, F::RGB16, Widen(4), false),
    t(F::RGB12, F::BGR16, Widen(4), true),
    t(F::L12, F::L16, Widen(4), false),
    // 10 -> 16
    t(F::RGBA10, F::RGBA16, Widen(6), false),
    t(F::RGBA10, F::BGRA16, Widen(6), true),
    t(F::RGB10, F::RGB16, Widen(6), false),
    t(F::RGB10, F::BGR16, Widen(6), true),
    t(F::L10, F::L16, Widen(6), false),
    // 8-bit channel order
    t(F::BGRA8, F::RGBA8, Same, true),
    t(F::BGR8, F::RGB8, Same, true),
    t(F::RGBA8, F::BGRA8, Same, true),
    t(F::RGB8, F::BGR8, Same, true),
    // 8 -> 16
    t(F::RGBA8, F::RGBA16, Promote, false),
    t(F::RGBA8, F::BGRA16, Promote, true),
    t(F::RGB8, F::RGB16, Promote, false),
    t(F::RGB8, F::BGR16, Promote, true),
];

/// Matrix entry converting `from` into `to`.
///
/// The premultiplied flag does not take part in the lookup; it is carried
/// over unchanged by the conversion.
pub fn lookup(from: PixelFormat, to: PixelFormat) -> Option<&'static Transcode> {
    let from = from.with_premultiplied(false);
    let to = to.with_premultiplied(false);
    MATRIX.iter().find(|e| e.from == from && e.to == to)
}

pub fn is_supported(from: PixelFormat, to: PixelFormat) -> bool {
    lookup(from, to).is_some()
}

/// Convert `src` into a new zero-filled buffer of format `to` with unpadded rows
pub fn convert(src: &PixelBuffer, to: PixelFormat) -> Result<PixelBuffer> {
    let to = to.with_premultiplied(src.format().premultiplied_alpha());
    let mut dst = PixelBuffer::new(to, src.width(), src.height());
    convert_into(src, &mut dst)?;
    Ok(dst)
}

/// Convert `src` into an existing buffer of the target format.
///
/// Exactly `height` rows are visited. Per row, only the pixels that fit in
/// both `min(src.stride, dst.stride)` are touched; trailing bytes of the
/// destination row are left as they were, so callers that need defined
/// padding must zero the destination first.
pub fn convert_into(src: &PixelBuffer, dst: &mut PixelBuffer) -> Result<()> {
    let entry = lookup(src.format(), dst.format()).ok_or_else(|| {
        at(Error::usage(format!(
            "conversion from {} to {} is not supported",
            src.format(),
            dst.format()
        )))
    })?;
    if src.width() != dst.width() || src.height() != dst.height() {
        return Err(at(Error::usage(format!(
            "size mismatch: {}x{} into {}x{}",
            src.width(),
            src.height(),
            dst.width(),
            dst.height()
        ))));
    }
    log::trace!(
        "converting {}x{} {} -> {}",
        src.width(),
        src.height(),
        entry.from,
        entry.to
    );
    let (src_stride, dst_stride, height) = (src.stride(), dst.stride(), src.height() as usize);
    transcode_rows(
        src.data(),
        src_stride,
        dst.data_mut(),
        dst_stride,
        height,
        entry,
    );
    Ok(())
}

/// Destination channel `c` reads source channel `SWAP[c]`
const SWAP: [usize; 4] = [2, 1, 0, 3];

fn transcode_rows(
    src: &[u8],
    src_stride: usize,
    dst: &mut [u8],
    dst_stride: usize,
    height: usize,
    entry: &Transcode,
) {
    let channels = entry.from.channels() as usize;
    let src_bps = entry.from.bytes_per_sample();
    let dst_bps = entry.to.bytes_per_sample();
    let stride_elements = (src_stride / src_bps).min(dst_stride / dst_bps) / channels;
    let swap = entry.swap && channels >= 3;

    for row in 0..height {
        let src_row = &src[row * src_stride..][..stride_elements * channels * src_bps];
        let dst_row = &mut dst[row * dst_stride..][..stride_elements * channels * dst_bps];
        for i in 0..stride_elements {
            for c in 0..channels {
                let from = i * channels + if swap { SWAP[c] } else { c };
                let to = i * channels + c;
                match entry.op {
                    Same => dst_row[to] = src_row[from],
                    Promote => write_u16(dst_row, to, src_row[from] as u16),
                    Widen(shift) => write_u16(dst_row, to, read_u16(src_row, from) << shift),
                    Narrow(shift) => write_u16(dst_row, to, read_u16(src_row, from) >> shift),
                }
            }
        }
    }
}

#[inline]
fn read_u16(row: &[u8], index: usize) -> u16 {
    u16::from_le_bytes([row[index * 2], row[index * 2 + 1]])
}

#[inline]
fn write_u16(row: &mut [u8], index: usize, v: u16) {
    row[index * 2..index * 2 + 2].copy_from_slice(&v.to_le_bytes());
}
