//! Images and thumbnails with lazily decoded pixels

use crate::adapter::{self, EncodeSession, NativeImage};
use crate::config::OpenOptions;
use crate::convert;
use crate::engine::{Engine, HandleInfo, ItemId};
use crate::error::{Error, Result};
use crate::metadata::{self, ColorProfile, MetadataBlock};
use crate::pixel::{ChannelOrder, PixelBuffer, PixelFormat};
use crate::registry;
use std::fmt;
use std::rc::Rc;
use whereat::at;

/// Pixel residency of a frame
#[derive(Debug, Clone, Default)]
enum Pixels {
    #[default]
    Unloaded,
    Loaded(PixelBuffer),
}

/// State shared by images and thumbnails: geometry, format and pixels
#[derive(Debug)]
struct Frame {
    id: ItemId,
    width: u32,
    height: u32,
    format: PixelFormat,
    /// Layout requested from the engine; converted into `format` after decoding
    decode_as: PixelFormat,
    original_bit_depth: u8,
    pixels: Pixels,
    /// Where unloaded pixels come from; `None` once pixels exist only in memory
    native: Option<NativeImage>,
    threads: u32,
    engine: Rc<dyn Engine>,
}

/// Layout delivered in BGR mode
fn bgr_format(format: PixelFormat) -> PixelFormat {
    match (format.channel_order(), format.bits_per_channel()) {
        (ChannelOrder::Mono, _) => format,
        (_, 8) => format.with_order(ChannelOrder::Bgr),
        _ => format.with_bits(16).with_order(ChannelOrder::Bgr),
    }
}

impl Frame {
    fn from_native(
        native: NativeImage,
        info: &HandleInfo,
        options: &OpenOptions,
        engine: &Rc<dyn Engine>,
    ) -> Self {
        let bits = if options.convert_hdr_to_8bit {
            8
        } else {
            info.bit_depth
        };
        let decode_as = registry::native_format(bits, info.has_alpha, info.monochrome)
            .with_premultiplied(info.premultiplied_alpha);
        let format = if options.bgr_mode {
            bgr_format(decode_as)
        } else {
            decode_as
        };
        Self {
            id: native.id(),
            width: info.width,
            height: info.height,
            format,
            decode_as,
            original_bit_depth: info.bit_depth,
            pixels: Pixels::Unloaded,
            native: Some(native),
            threads: options.threads,
            engine: Rc::clone(engine),
        }
    }

    fn from_buffer(
        id: ItemId,
        buf: PixelBuffer,
        original_bit_depth: u8,
        engine: &Rc<dyn Engine>,
    ) -> Self {
        Self {
            id,
            width: buf.width(),
            height: buf.height(),
            format: buf.format(),
            decode_as: buf.format(),
            original_bit_depth,
            pixels: Pixels::Loaded(buf),
            native: None,
            threads: 0,
            engine: Rc::clone(engine),
        }
    }

    fn is_loaded(&self) -> bool {
        matches!(self.pixels, Pixels::Loaded(_))
    }

    fn loaded(&self) -> Option<&PixelBuffer> {
        match &self.pixels {
            Pixels::Loaded(buf) => Some(buf),
            Pixels::Unloaded => None,
        }
    }

    fn load(&mut self) -> Result<&mut PixelBuffer> {
        if !self.is_loaded() {
            let buf = self.decode()?;
            self.pixels = Pixels::Loaded(buf);
        }
        match &mut self.pixels {
            Pixels::Loaded(buf) => Ok(buf),
            Pixels::Unloaded => Err(at(Error::usage("image pixels are unavailable"))),
        }
    }

    fn decode(&self) -> Result<PixelBuffer> {
        let native = self.native.as_ref().ok_or_else(|| {
            at(Error::usage(
                "image pixels were taken and there is no file to decode them from",
            ))
        })?;
        log::trace!("lazy decode of item {} as {}", self.id, self.format);
        let buf = native.decode(self.decode_as, self.threads)?;
        if (buf.width(), buf.height()) != (self.width, self.height) {
            return Err(at(Error::Decode {
                code: crate::engine::ErrorCode::Decoder as i32,
                subcode: 0,
                message: format!(
                    "item {} decoded as {}x{}, expected {}x{}",
                    self.id,
                    buf.width(),
                    buf.height(),
                    self.width,
                    self.height
                ),
            }));
        }
        if buf.format() == self.format {
            Ok(buf)
        } else {
            convert::convert(&buf, self.format)
        }
    }

    /// Drop resident pixels if they can be decoded again
    fn unload(&mut self) {
        if self.native.is_some() {
            self.pixels = Pixels::Unloaded;
        }
    }

    fn take(&mut self) -> Result<PixelBuffer> {
        self.load()?;
        match std::mem::take(&mut self.pixels) {
            Pixels::Loaded(buf) => Ok(buf),
            Pixels::Unloaded => Err(at(Error::usage("image pixels are unavailable"))),
        }
    }

    /// Replace the pixels, detaching the frame from its file
    fn replace(&mut self, buf: PixelBuffer) {
        self.width = buf.width();
        self.height = buf.height();
        self.format = buf.format();
        self.decode_as = buf.format();
        self.pixels = Pixels::Loaded(buf);
        self.native = None;
    }

    fn convert_to(&mut self, target: PixelFormat) -> Result<()> {
        if self.format == target {
            return Ok(());
        }
        if self.format.with_premultiplied(false) == target.with_premultiplied(false) {
            self.set_premultiplied(target.premultiplied_alpha());
            return Ok(());
        }
        if !convert::is_supported(self.format, target) {
            return Err(at(Error::usage(format!(
                "conversion from {} to {target} is not supported",
                self.format
            ))));
        }
        let mut converted = convert::convert(self.load()?, target)?;
        converted.set_format_flags(target);
        self.replace(converted);
        Ok(())
    }

    fn scale(&mut self, width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(at(Error::usage(format!("cannot scale to {width}x{height}"))));
        }
        let engine = Rc::clone(&self.engine);
        let scaled = adapter::scale(&engine, self.load()?, width, height)?;
        self.replace(scaled);
        Ok(())
    }

    fn set_premultiplied(&mut self, premultiplied: bool) {
        self.format = self.format.with_premultiplied(premultiplied);
        self.decode_as = self.decode_as.with_premultiplied(premultiplied);
        let format = self.format;
        if let Pixels::Loaded(buf) = &mut self.pixels {
            buf.set_format_flags(format);
        }
    }

    /// Memory-only copy with the pixels loaded
    fn duplicate(&mut self) -> Result<Frame> {
        let buf = self.load()?.clone();
        Ok(Frame::from_buffer(
            self.id,
            buf,
            self.original_bit_depth,
            &self.engine,
        ))
    }
}

fn describe(f: &mut fmt::Formatter<'_>, kind: &str, frame: &Frame) -> fmt::Result {
    write!(
        f,
        "{kind} {}x{} {} with ",
        frame.width, frame.height, frame.format
    )?;
    match frame.loaded() {
        Some(buf) => write!(f, "{} bytes image data", buf.data().len()),
        None => f.write_str("no image data"),
    }
}

/// Reduced-resolution copy of an [`Image`]
#[derive(Debug)]
pub struct Thumbnail {
    frame: Frame,
    owner: usize,
}

impl Thumbnail {
    /// Item id in the file it was read from; 0 for thumbnails made in memory
    pub fn id(&self) -> u32 {
        self.frame.id
    }

    /// Index of the owning image in its container
    pub fn owner_index(&self) -> usize {
        self.owner
    }

    pub fn width(&self) -> u32 {
        self.frame.width
    }

    pub fn height(&self) -> u32 {
        self.frame.height
    }

    pub fn size(&self) -> (u32, u32) {
        (self.frame.width, self.frame.height)
    }

    pub fn format(&self) -> PixelFormat {
        self.frame.format
    }

    pub fn original_bit_depth(&self) -> u8 {
        self.frame.original_bit_depth
    }

    pub fn is_loaded(&self) -> bool {
        self.frame.is_loaded()
    }

    /// Decode the pixels if they are not resident
    pub fn load(&mut self) -> Result<&mut Self> {
        self.frame.load()?;
        Ok(self)
    }

    pub fn unload(&mut self) {
        self.frame.unload();
    }

    /// Pixels, decoding them on first access
    pub fn pixels(&mut self) -> Result<&PixelBuffer> {
        self.frame.load().map(|buf| &*buf)
    }

    pub fn loaded_pixels(&self) -> Option<&PixelBuffer> {
        self.frame.loaded()
    }

    pub fn take_pixels(&mut self) -> Result<PixelBuffer> {
        self.frame.take()
    }

    pub fn convert_to(&mut self, format: PixelFormat) -> Result<&mut Self> {
        self.frame.convert_to(format)?;
        Ok(self)
    }

    fn duplicate(&mut self) -> Result<Thumbnail> {
        Ok(Thumbnail {
            frame: self.frame.duplicate()?,
            owner: self.owner,
        })
    }
}

impl fmt::Display for Thumbnail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        describe(f, "HeifThumbnail", &self.frame)
    }
}

/// One top-level image of a container
#[derive(Debug)]
pub struct Image {
    frame: Frame,
    primary: bool,
    index: usize,
    color_profile: ColorProfile,
    exif: Option<Vec<u8>>,
    xmp: Option<Vec<u8>>,
    metadata: Vec<MetadataBlock>,
    thumbnails: Vec<Thumbnail>,
}

impl Image {
    /// Build from an item of an opened file; pixels stay undecoded
    pub(crate) fn from_native(
        native: NativeImage,
        options: &OpenOptions,
        engine: &Rc<dyn Engine>,
        index: usize,
    ) -> Result<Self> {
        let info = native.info()?;
        let color_profile = native.color_profile()?;
        let extracted = metadata::extract(native.metadata()?);
        let thumbnails = if options.thumbnails {
            native
                .thumbnails()?
                .into_iter()
                .map(|thumb| -> Result<Thumbnail> {
                    let info = thumb.info()?;
                    Ok(Thumbnail {
                        frame: Frame::from_native(thumb, &info, options, engine),
                        owner: index,
                    })
                })
                .collect::<Result<Vec<_>>>()?
        } else {
            Vec::new()
        };
        Ok(Self {
            frame: Frame::from_native(native, &info, options, engine),
            primary: info.is_primary,
            index,
            color_profile,
            exif: extracted.exif,
            xmp: extracted.xmp,
            metadata: extracted.blocks,
            thumbnails,
        })
    }

    pub(crate) fn from_buffer(id: ItemId, buf: PixelBuffer, engine: &Rc<dyn Engine>) -> Self {
        let bits = buf.format().bits_per_channel();
        Self {
            frame: Frame::from_buffer(id, buf, bits, engine),
            primary: false,
            index: 0,
            color_profile: ColorProfile::None,
            exif: None,
            xmp: None,
            metadata: Vec::new(),
            thumbnails: Vec::new(),
        }
    }

    /// Item id; unique among the images of one container
    pub fn id(&self) -> u32 {
        self.frame.id
    }

    pub fn width(&self) -> u32 {
        self.frame.width
    }

    pub fn height(&self) -> u32 {
        self.frame.height
    }

    pub fn size(&self) -> (u32, u32) {
        (self.frame.width, self.frame.height)
    }

    /// Format of the pixels once loaded
    pub fn format(&self) -> PixelFormat {
        self.frame.format
    }

    /// Bit depth of the in-memory pixels
    pub fn bit_depth(&self) -> u8 {
        self.frame.format.bits_per_channel()
    }

    /// Bit depth stored in the file, before any reduction to 8 bits
    pub fn original_bit_depth(&self) -> u8 {
        self.frame.original_bit_depth
    }

    pub fn has_alpha(&self) -> bool {
        self.frame.format.has_alpha()
    }

    pub fn premultiplied_alpha(&self) -> bool {
        self.frame.format.premultiplied_alpha()
    }

    /// Relabel alpha as premultiplied or straight; samples are untouched
    pub fn set_premultiplied_alpha(&mut self, premultiplied: bool) {
        self.frame.set_premultiplied(premultiplied);
    }

    pub fn is_primary(&self) -> bool {
        self.primary
    }

    pub fn is_loaded(&self) -> bool {
        self.frame.is_loaded()
    }

    pub fn exif(&self) -> Option<&[u8]> {
        self.exif.as_deref()
    }

    /// EXIF payload, without the 4-byte TIFF offset prefix
    pub fn set_exif(&mut self, exif: Option<Vec<u8>>) {
        self.exif = exif;
    }

    pub fn xmp(&self) -> Option<&[u8]> {
        self.xmp.as_deref()
    }

    pub fn set_xmp(&mut self, xmp: Option<Vec<u8>>) {
        self.xmp = xmp;
    }

    /// Metadata blocks other than EXIF and XMP
    pub fn metadata(&self) -> &[MetadataBlock] {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut Vec<MetadataBlock> {
        &mut self.metadata
    }

    pub fn color_profile(&self) -> &ColorProfile {
        &self.color_profile
    }

    pub fn set_color_profile(&mut self, profile: ColorProfile) {
        self.color_profile = profile;
    }

    pub fn thumbnails(&self) -> &[Thumbnail] {
        &self.thumbnails
    }

    pub fn thumbnails_mut(&mut self) -> &mut [Thumbnail] {
        &mut self.thumbnails
    }

    /// Decode the pixels if they are not resident. Safe to call repeatedly.
    pub fn load(&mut self) -> Result<&mut Self> {
        self.frame.load()?;
        Ok(self)
    }

    /// Drop resident pixels of the image and its thumbnails
    ///
    /// Pixels that exist only in memory (added from bytes, converted or
    /// scaled) are kept, since nothing could restore them.
    pub fn unload(&mut self) {
        self.frame.unload();
        for thumb in &mut self.thumbnails {
            thumb.unload();
        }
    }

    /// Pixels, decoding them on first access
    pub fn pixels(&mut self) -> Result<&PixelBuffer> {
        self.frame.load().map(|buf| &*buf)
    }

    /// Pixels if already resident
    pub fn loaded_pixels(&self) -> Option<&PixelBuffer> {
        self.frame.loaded()
    }

    /// Move the pixels out, leaving the image unloaded
    pub fn take_pixels(&mut self) -> Result<PixelBuffer> {
        self.frame.take()
    }

    /// Resize in place
    pub fn scale(&mut self, width: u32, height: u32) -> Result<&mut Self> {
        self.frame.scale(width, height)?;
        Ok(self)
    }

    /// Convert the pixels to `format`
    ///
    /// Does nothing, and decodes nothing, when the image already has that
    /// format. Pairs missing from the conversion matrix are usage errors.
    pub fn convert_to(&mut self, format: PixelFormat) -> Result<&mut Self> {
        self.frame.convert_to(format)?;
        Ok(self)
    }

    /// Add one thumbnail per bounding box size
    ///
    /// A box is skipped when it is 3 or smaller, when the image already fits
    /// inside it, or when a thumbnail of that size exists.
    pub fn add_thumbnails(&mut self, sizes: &[u32]) -> Result<()> {
        for &bbox in sizes {
            let (width, height) = self.size();
            if bbox <= 3 || (width <= bbox && height <= bbox) {
                continue;
            }
            let (w, h) = if width >= height {
                (bbox, (height as u64 * bbox as u64 / width as u64) as u32)
            } else {
                ((width as u64 * bbox as u64 / height as u64) as u32, bbox)
            };
            let (w, h) = (even(w), even(h));
            let longest = w.max(h);
            if self.thumbnails.iter().any(|t| {
                let m = t.width().max(t.height());
                m == bbox || m == longest
            }) {
                continue;
            }
            let engine = Rc::clone(&self.frame.engine);
            let scaled = adapter::scale(&engine, self.frame.load()?, w, h)?;
            log::trace!("added {w}x{h} thumbnail to image {}", self.index);
            self.thumbnails.push(Thumbnail {
                frame: Frame::from_buffer(0, scaled, self.frame.original_bit_depth, &engine),
                owner: self.index,
            });
        }
        Ok(())
    }

    /// Deep copy held entirely in memory; loads this image and its thumbnails
    pub fn duplicate(&mut self) -> Result<Image> {
        let thumbnails = self
            .thumbnails
            .iter_mut()
            .map(Thumbnail::duplicate)
            .collect::<Result<Vec<_>>>()?;
        Ok(Image {
            frame: self.frame.duplicate()?,
            primary: false,
            index: self.index,
            color_profile: self.color_profile.clone(),
            exif: self.exif.clone(),
            xmp: self.xmp.clone(),
            metadata: self.metadata.clone(),
            thumbnails,
        })
    }

    pub(crate) fn set_id(&mut self, id: ItemId) {
        self.frame.id = id;
    }

    pub(crate) fn set_primary_flag(&mut self, primary: bool) {
        self.primary = primary;
    }

    pub(crate) fn set_index(&mut self, index: usize) {
        self.index = index;
        for thumb in &mut self.thumbnails {
            thumb.owner = index;
        }
    }

    /// Largest item id used by this image or its thumbnails
    pub(crate) fn max_id(&self) -> ItemId {
        self.thumbnails
            .iter()
            .map(Thumbnail::id)
            .fold(self.frame.id, ItemId::max)
    }

    /// Write this image, its metadata and its thumbnails into `session`
    ///
    /// `primary` carries the overrides that apply to the primary image only.
    pub(crate) fn encode_into(
        &mut self,
        session: &EncodeSession,
        primary: Option<&PrimaryOverrides>,
    ) -> Result<()> {
        let buf = self.frame.load()?;
        let saved;
        let buf = match registry::lookup(buf.format()).and_then(|e| e.save_as) {
            Some(target) => {
                log::trace!("converting {} to {target} for encoding", buf.format());
                saved = convert::convert(buf, target)?;
                &saved
            }
            None => &*buf,
        };
        let encoded = session.add_image(buf, &self.color_profile)?;

        let mut exif = self.exif.as_deref();
        let mut xmp = self.xmp.as_deref();
        if let Some(overrides) = primary {
            session.set_primary(&encoded)?;
            if let Some(value) = &overrides.exif {
                exif = value.as_deref();
            }
            if let Some(value) = &overrides.xmp {
                xmp = value.as_deref();
            }
        }
        if let Some(exif) = exif {
            session.add_exif(&encoded, exif)?;
        }
        if let Some(xmp) = xmp {
            session.add_xmp(&encoded, xmp)?;
        }
        for block in &self.metadata {
            session.add_metadata(&encoded, block)?;
        }

        let longest = self.width().max(self.height());
        for thumb in &self.thumbnails {
            let bbox = thumb.width().max(thumb.height());
            if bbox > 3 && bbox < longest {
                session.add_thumbnail(&encoded, bbox)?;
            }
        }
        Ok(())
    }
}

/// Save-time replacements applied to the primary image
#[derive(Debug, Default)]
pub(crate) struct PrimaryOverrides {
    pub exif: Option<Option<Vec<u8>>>,
    pub xmp: Option<Option<Vec<u8>>>,
}

/// Round an odd dimension down to even, keeping at least 1
/// Round down to even, with a minimum of 1
fn even(v: u32) -> u32 {
    if v > 1 { v & !1 } else { 1 }
}

impl fmt::Display for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        describe(f, "HeifImage", &self.frame)?;
        write!(f, " and {} thumbnails", self.thumbnails.len())
    }
}
