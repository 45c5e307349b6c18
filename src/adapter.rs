//! Codec adapter: container and image state to and from engine calls
//!
//! Every engine call goes through here and is checked immediately; native
//! objects are wrapped in [`ScopedHandle`] before anything else can fail.

use crate::engine::{
    CompressionFormat, DecodeOptions, Engine, EngineError, ErrorCode, HandleInfo, HandleKind,
    ItemId, RawMetadata,
};
use crate::error::{Error, Result, native};
use crate::handle::ScopedHandle;
use crate::io::{HeifReader, HeifWriter};
use crate::metadata::{ColorProfile, MetadataBlock};
use crate::pixel::{PixelBuffer, PixelFormat};
use crate::registry;
use crate::config::Quality;
use std::fmt;
use std::rc::Rc;
use whereat::{At, at};

/// Mime type announced by the `ftyp` major brand, if it is a known one
pub fn mime_type(data: &[u8]) -> Option<&'static str> {
    if data.get(4..8)? != b"ftyp" {
        return None;
    }
    match data.get(8..12)? {
        b"heic" | b"heix" | b"heim" | b"heis" => Some("image/heic"),
        b"hevc" | b"hevx" | b"hevm" | b"hevs" => Some("image/heic-sequence"),
        b"mif1" => Some("image/heif"),
        b"msf1" => Some("image/heif-sequence"),
        b"avif" => Some("image/avif"),
        b"avis" => Some("image/avif-sequence"),
        _ => None,
    }
}

/// Whether `data` starts like a file this crate can read. Never fails.
pub fn is_supported(data: &[u8]) -> bool {
    mime_type(data).is_some()
}

/// Compression implied by the brand, when the brand pins one down
pub(crate) fn brand_format(data: &[u8]) -> Option<CompressionFormat> {
    match mime_type(data)? {
        "image/avif" | "image/avif-sequence" => Some(CompressionFormat::Av1),
        "image/heic" | "image/heic-sequence" => Some(CompressionFormat::Hevc),
        _ => None,
    }
}

/// Reject inputs that are not containers, or whose codec is unavailable
pub(crate) fn check_readable(engine: &dyn Engine, prefix: &[u8]) -> Result<()> {
    if !is_supported(prefix) {
        return Err(at(Error::Format(
            "not a HEIF or AVIF file (missing ftyp or unknown brand)".into(),
        )));
    }
    if let Some(format) = brand_format(prefix)
        && !engine.supports_decoding(format)
    {
        return Err(at(Error::UnsupportedFormat(format!(
            "{} decoding is not available",
            format.name()
        ))));
    }
    Ok(())
}

#[track_caller]
fn decode_error(e: EngineError) -> At<Error> {
    at(Error::Decode {
        code: e.code as i32,
        subcode: e.subcode,
        message: e.message,
    })
}

/// Where a decode session reads from
pub(crate) enum Input<'a> {
    Memory(&'a [u8]),
    Stream(&'a mut dyn HeifReader),
}

/// An opened file
pub(crate) struct DecodeSession {
    ctx: Rc<ScopedHandle>,
}

impl DecodeSession {
    pub(crate) fn open(engine: &Rc<dyn Engine>, input: Input<'_>) -> Result<Self> {
        let ctx = ScopedHandle::acquire(engine, HandleKind::Context, |e| e.alloc_context())?;
        let raw = ctx.raw()?;
        match input {
            Input::Memory(data) => engine.read_from_memory(raw, data),
            Input::Stream(reader) => engine.read_from_reader(raw, reader),
        }
        .map_err(native)?;
        Ok(Self { ctx: Rc::new(ctx) })
    }

    fn engine(&self) -> &Rc<dyn Engine> {
        self.ctx.engine()
    }

    pub(crate) fn primary_id(&self) -> Result<ItemId> {
        self.engine()
            .primary_image_id(self.ctx.raw()?)
            .map_err(native)
    }

    pub(crate) fn image_ids(&self) -> Result<Vec<ItemId>> {
        self.engine()
            .top_level_image_ids(self.ctx.raw()?)
            .map_err(native)
    }

    pub(crate) fn image(&self, id: ItemId) -> Result<NativeImage> {
        let ctx = self.ctx.raw()?;
        let handle =
            ScopedHandle::acquire(self.engine(), HandleKind::ImageHandle, |e| e.image_handle(ctx, id))?;
        Ok(NativeImage {
            handle,
            ctx: Rc::clone(&self.ctx),
            id,
        })
    }
}

/// An image item of an opened file. Keeps the file open while it lives.
pub(crate) struct NativeImage {
    // dropped before `ctx`: the item goes first, then possibly its file
    handle: ScopedHandle,
    ctx: Rc<ScopedHandle>,
    id: ItemId,
}

impl fmt::Debug for NativeImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeImage")
            .field("id", &self.id)
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

impl NativeImage {
    fn engine(&self) -> &Rc<dyn Engine> {
        self.handle.engine()
    }

    pub(crate) fn id(&self) -> ItemId {
        self.id
    }

    pub(crate) fn info(&self) -> Result<HandleInfo> {
        self.engine().handle_info(self.handle.raw()?).map_err(native)
    }

    pub(crate) fn color_profile(&self) -> Result<ColorProfile> {
        self.engine()
            .color_profile(self.handle.raw()?)
            .map_err(native)
    }

    pub(crate) fn metadata(&self) -> Result<Vec<RawMetadata>> {
        self.engine()
            .metadata_blocks(self.handle.raw()?)
            .map_err(native)
    }

    pub(crate) fn thumbnails(&self) -> Result<Vec<NativeImage>> {
        let raw = self.handle.raw()?;
        let ids = self.engine().thumbnail_ids(raw).map_err(native)?;
        ids.into_iter()
            .map(|id| -> Result<NativeImage> {
                let handle = ScopedHandle::acquire(self.engine(), HandleKind::ImageHandle, |e| {
                    e.thumbnail_handle(raw, id)
                })?;
                Ok(NativeImage {
                    handle,
                    ctx: Rc::clone(&self.ctx),
                    id,
                })
            })
            .collect()
    }

    /// Decode into `format`, which must be the registry layout of this item
    pub(crate) fn decode(&self, format: PixelFormat, threads: u32) -> Result<PixelBuffer> {
        let entry = registry::lookup(format)
            .ok_or_else(|| at(Error::usage(format!("{format} has no decoder layout"))))?;
        let options = DecodeOptions {
            convert_hdr_to_8bit: format.bits_per_channel() == 8,
            threads,
        };
        let raw = self.handle.raw()?;
        let image = ScopedHandle::acquire(self.engine(), HandleKind::Image, |e| {
            e.decode(raw, entry.colorspace, entry.chroma, options)
        })?;
        log::trace!("decoded item {} as {format}", self.id);
        read_plane(&image, format)
    }
}

/// Copy an engine image out as a buffer of `format`
fn read_plane(image: &ScopedHandle, format: PixelFormat) -> Result<PixelBuffer> {
    let plane = image.engine().plane(image.raw()?).map_err(native)?;
    if plane.bits != format.bits_per_channel() {
        return Err(at(Error::Decode {
            code: ErrorCode::Decoder as i32,
            subcode: 0,
            message: format!(
                "engine produced {}-bit samples for {format}",
                plane.bits
            ),
        }));
    }
    PixelBuffer::from_vec(format, plane.width, plane.height, plane.stride, plane.data)
}

/// Hand a pixel buffer to the engine as a new engine image
fn create_image(engine: &Rc<dyn Engine>, buf: &PixelBuffer) -> Result<ScopedHandle> {
    let format = buf.format();
    let entry = registry::lookup(format)
        .ok_or_else(|| at(Error::usage(format!("{format} is not a registered format"))))?;
    let image = ScopedHandle::acquire(engine, HandleKind::Image, |e| {
        e.create_image(
            buf.width(),
            buf.height(),
            entry.colorspace,
            entry.chroma,
            format.bits_per_channel(),
            buf.data(),
            buf.stride(),
        )
    })?;
    if format.premultiplied_alpha() {
        engine
            .set_premultiplied_alpha(image.raw()?, true)
            .map_err(native)?;
    }
    Ok(image)
}

/// Resize through the engine; failures are reported as decode errors
pub(crate) fn scale(
    engine: &Rc<dyn Engine>,
    buf: &PixelBuffer,
    width: u32,
    height: u32,
) -> Result<PixelBuffer> {
    let source = create_image(engine, buf)?;
    let raw = source.raw()?;
    let scaled = engine.scale(raw, width, height).map_err(decode_error)?;
    let scaled = ScopedHandle::adopt(engine, HandleKind::Image, scaled);
    let mut out = read_plane(&scaled, buf.format().with_premultiplied(false))?;
    out.set_format_flags(buf.format());
    Ok(out)
}

/// An image written into an [`EncodeSession`]
pub(crate) struct EncodedImage {
    item: ScopedHandle,
    /// Engine image the item was encoded from, reused for thumbnails
    source: ScopedHandle,
}

/// A file being written
pub(crate) struct EncodeSession {
    encoder: ScopedHandle,
    ctx: ScopedHandle,
}

impl EncodeSession {
    pub(crate) fn new(engine: &Rc<dyn Engine>, format: CompressionFormat) -> Result<Self> {
        if !engine.supports_encoding(format) {
            return Err(at(Error::Encode {
                code: ErrorCode::Encoder as i32,
                subcode: 0,
                message: format!("no {} encoder found", format.name()),
            }));
        }
        let ctx = ScopedHandle::acquire(engine, HandleKind::Context, |e| e.alloc_context())?;
        let raw_ctx = ctx.raw()?;
        let encoder = ScopedHandle::acquire(engine, HandleKind::Encoder, |e| {
            e.encoder_for_format(raw_ctx, format)
        })?;
        Ok(Self { encoder, ctx })
    }

    fn engine(&self) -> &Rc<dyn Engine> {
        self.ctx.engine()
    }

    pub(crate) fn set_quality(&self, quality: Quality) -> Result<()> {
        let enc = self.encoder.raw()?;
        match quality {
            Quality::Lossless => self.engine().set_lossless(enc, true),
            Quality::Lossy(q) => self
                .engine()
                .set_lossless(enc, false)
                .and_then(|()| self.engine().set_lossy_quality(enc, q)),
        }
        .map_err(native)
    }

    pub(crate) fn set_parameter(&self, name: &str, value: &str) -> Result<()> {
        self.engine()
            .set_parameter(self.encoder.raw()?, name, value)
            .map_err(native)
    }

    pub(crate) fn add_image(&self, buf: &PixelBuffer, profile: &ColorProfile) -> Result<EncodedImage> {
        let engine = self.engine();
        let source = create_image(engine, buf)?;
        if !profile.is_none() {
            engine
                .set_color_profile(source.raw()?, profile)
                .map_err(native)?;
        }
        let (ctx, enc, img) = (self.ctx.raw()?, self.encoder.raw()?, source.raw()?);
        let item = ScopedHandle::acquire(engine, HandleKind::ImageHandle, |e| {
            e.encode_image(ctx, enc, img)
        })?;
        Ok(EncodedImage { item, source })
    }

    pub(crate) fn set_primary(&self, image: &EncodedImage) -> Result<()> {
        self.engine()
            .set_primary_image(self.ctx.raw()?, image.item.raw()?)
            .map_err(native)
    }

    pub(crate) fn add_exif(&self, image: &EncodedImage, exif: &[u8]) -> Result<()> {
        self.engine()
            .add_exif(self.ctx.raw()?, image.item.raw()?, exif)
            .map_err(native)
    }

    pub(crate) fn add_xmp(&self, image: &EncodedImage, xmp: &[u8]) -> Result<()> {
        self.engine()
            .add_xmp(self.ctx.raw()?, image.item.raw()?, xmp)
            .map_err(native)
    }

    pub(crate) fn add_metadata(&self, image: &EncodedImage, block: &MetadataBlock) -> Result<()> {
        self.engine()
            .add_generic_metadata(self.ctx.raw()?, image.item.raw()?, &block.to_raw())
            .map_err(native)
    }

    /// Encode a thumbnail of `image` that fits a `bbox` square
    pub(crate) fn add_thumbnail(&self, image: &EncodedImage, bbox: u32) -> Result<()> {
        let thumb = self
            .engine()
            .encode_thumbnail(
                self.ctx.raw()?,
                self.encoder.raw()?,
                image.source.raw()?,
                image.item.raw()?,
                bbox,
            )
            .map_err(native)?;
        if let Some(raw) = thumb {
            drop(ScopedHandle::adopt(self.engine(), HandleKind::ImageHandle, raw));
        }
        Ok(())
    }

    pub(crate) fn write(&self, writer: &mut dyn HeifWriter) -> Result<()> {
        self.engine()
            .write(self.ctx.raw()?, writer)
            .map_err(native)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::UncompressedEngine;

    fn ftyp(brand: &[u8; 4]) -> Vec<u8> {
        let mut v = vec![0, 0, 0, 16];
        v.extend_from_slice(b"ftyp");
        v.extend_from_slice(brand);
        v.extend_from_slice(&[0, 0, 0, 0]);
        v
    }

    #[test]
    fn brands_map_to_mime_types() {
        assert_eq!(mime_type(&ftyp(b"heic")), Some("image/heic"));
        assert_eq!(mime_type(&ftyp(b"hevx")), Some("image/heic-sequence"));
        assert_eq!(mime_type(&ftyp(b"mif1")), Some("image/heif"));
        assert_eq!(mime_type(&ftyp(b"avis")), Some("image/avif-sequence"));
        assert_eq!(mime_type(&ftyp(b"jpeg")), None);
    }

    #[test]
    fn short_input_is_not_supported() {
        let full = ftyp(b"avif");
        assert!(is_supported(&full));
        assert!(!is_supported(&full[..4]));
        assert!(!is_supported(&[]));
    }

    #[test]
    fn unavailable_codec_is_unsupported_format() {
        let engine = UncompressedEngine::new().without_decoder(CompressionFormat::Av1);
        let err = check_readable(&engine, &ftyp(b"avif")).unwrap_err().into_inner();
        assert!(matches!(err, Error::UnsupportedFormat(_)));
        let err = check_readable(&engine, b"GIF89a").unwrap_err().into_inner();
        assert!(matches!(err, Error::Format(_)));
        check_readable(&engine, &ftyp(b"heic")).unwrap();
    }

    #[test]
    fn image_handle_is_released_before_its_file() {
        let bytes = crate::encode_to_vec(
            PixelFormat::RGB8,
            (2, 2),
            &[7; 12],
            crate::SaveOptions::new(),
        )
        .unwrap();
        let concrete = Rc::new(UncompressedEngine::new());
        let engine: Rc<dyn Engine> = concrete.clone();
        let session = DecodeSession::open(&engine, Input::Memory(&bytes)).unwrap();
        let image = session.image(session.primary_id().unwrap()).unwrap();
        drop(session);
        assert!(concrete.released.borrow().is_empty());

        drop(image);
        assert_eq!(
            *concrete.released.borrow(),
            [HandleKind::ImageHandle, HandleKind::Context]
        );
        assert_eq!(concrete.live_handles(), 0);
    }

    #[test]
    fn scale_keeps_format_and_releases_handles() {
        let concrete = Rc::new(UncompressedEngine::new());
        let engine: Rc<dyn Engine> = concrete.clone();
        let buf = PixelBuffer::from_vec(
            PixelFormat::RGBA8.with_premultiplied(true),
            4,
            4,
            16,
            (0..64).collect(),
        )
        .unwrap();
        let out = scale(&engine, &buf, 2, 2).unwrap();
        assert_eq!((out.width(), out.height()), (2, 2));
        assert!(out.format().premultiplied_alpha());
        assert_eq!(out.row(0), &[0, 1, 2, 3, 8, 9, 10, 11]);
        assert_eq!(concrete.live_handles(), 0);
    }

    #[test]
    fn missing_encoder_is_encode_error() {
        let engine: Rc<dyn Engine> =
            Rc::new(UncompressedEngine::new().without_encoder(CompressionFormat::Av1));
        let err = EncodeSession::new(&engine, CompressionFormat::Av1)
            .err()
            .unwrap()
            .into_inner();
        assert!(matches!(err, Error::Encode { .. }));
    }
}
