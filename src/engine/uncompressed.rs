//! In-process engine that stores samples uncompressed
//!
//! Files are a flat sequence of ISOBMFF-style boxes: `ftyp`, an optional
//! `pitm` naming the primary item, then one `iimg` box per image item.
//! Thumbnail items are ordinary `iimg` boxes that name their parent.
//!
//! ```text
//! iimg := id:u32 width:u32 height:u32 bits:u8 channels:u8 flags:u8 0:u8
//!         thumbnail_of:u32 (0 = top level) child*
//! child := colr(fourcc, bytes) | meta(type, content type, bytes) | pxls(samples)
//! ```
//!
//! Samples are packed rows, one byte each at 8 bits and little-endian
//! 16-bit words above that.

use super::{
    CompressionFormat, DecodeOptions, Engine, EngineError, EngineResult, ErrorCode, HandleInfo,
    HandleKind, ItemId, Plane, RawHandle, RawMetadata,
};
use crate::io::{HeifReader, HeifWriter, SizeStatus};
use crate::metadata::{ColorProfile, IccKind};
use crate::registry::{Chroma, Colorspace};
use core::num::NonZeroU64;
use std::cell::RefCell;
use std::collections::HashMap;

/// Decoded rows are padded to a multiple of this many bytes
const ROW_ALIGN: usize = 16;

const SUBCODE_UNSUPPORTED_BIT_DEPTH: i32 = 1;
const SUBCODE_UNSUPPORTED_PARAMETER: i32 = 2;
const SUBCODE_INVALID_PARAMETER_VALUE: i32 = 3;
const SUBCODE_NO_ENCODER: i32 = 4;

/// Reference [`Engine`] keeping everything in process memory.
///
/// Lossy quality settings are recorded but never discard information, so
/// pixels survive a save/open cycle bit for bit.
#[derive(Debug, Default)]
pub struct UncompressedEngine {
    no_decode: Vec<CompressionFormat>,
    no_encode: Vec<CompressionFormat>,
    state: RefCell<State>,
    #[cfg(test)]
    pub(crate) released: RefCell<Vec<HandleKind>>,
}

impl UncompressedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse to read files of this compression format
    pub fn without_decoder(mut self, format: CompressionFormat) -> Self {
        self.no_decode.push(format);
        self
    }

    /// Refuse to create encoders for this compression format
    pub fn without_encoder(mut self, format: CompressionFormat) -> Self {
        self.no_encode.push(format);
        self
    }

    /// Number of handles handed out and not yet released
    pub fn live_handles(&self) -> usize {
        self.state.borrow().objects.len()
    }
}

#[derive(Debug, Default)]
struct State {
    issued: u64,
    objects: HashMap<RawHandle, Object>,
}

#[derive(Debug)]
enum Object {
    Context(Context),
    Encoder(EncoderState),
    ItemRef { ctx: RawHandle, item: ItemId },
    Image(Raster),
}

impl Object {
    fn kind(&self) -> HandleKind {
        match self {
            Object::Context(_) => HandleKind::Context,
            Object::Encoder(_) => HandleKind::Encoder,
            Object::ItemRef { .. } => HandleKind::ImageHandle,
            Object::Image(_) => HandleKind::Image,
        }
    }
}

#[derive(Debug, Default)]
struct Context {
    brand: Option<CompressionFormat>,
    items: Vec<Item>,
    primary: Option<ItemId>,
}

#[derive(Debug)]
struct EncoderState {
    format: CompressionFormat,
    lossless: bool,
    quality: u8,
    params: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
struct Item {
    id: ItemId,
    thumbnail_of: Option<ItemId>,
    width: u32,
    height: u32,
    bits: u8,
    channels: u8,
    premultiplied: bool,
    profile: ColorProfile,
    metadata: Vec<RawMetadata>,
    samples: Vec<u8>,
}

impl Item {
    fn sample_bytes(&self) -> usize {
        if self.bits > 8 { 2 } else { 1 }
    }

    fn row_bytes(&self) -> Option<usize> {
        byte_len(&[self.width as usize, self.channels as usize, self.sample_bytes()])
    }

    /// Size of the unpadded sample data, `None` when it cannot be addressed
    fn sample_len(&self) -> Option<usize> {
        self.row_bytes()?.checked_mul(self.height as usize)
    }
}

/// Interleaved engine image
#[derive(Debug, Clone)]
struct Raster {
    width: u32,
    height: u32,
    bits: u8,
    colorspace: Colorspace,
    chroma: Chroma,
    stride: usize,
    data: Vec<u8>,
    premultiplied: bool,
    profile: ColorProfile,
}

impl Raster {
    fn channels(&self) -> usize {
        self.chroma.interleaved_channels().unwrap_or(0) as usize
    }

    fn bytes_per_pixel(&self) -> usize {
        self.channels() * sample_bytes(self.chroma, self.bits)
    }

    fn sample(&self, offset: usize) -> u16 {
        if sample_bytes(self.chroma, self.bits) == 1 {
            self.data[offset] as u16
        } else if self.chroma.is_big_endian() {
            u16::from_be_bytes([self.data[offset], self.data[offset + 1]])
        } else {
            u16::from_le_bytes([self.data[offset], self.data[offset + 1]])
        }
    }
}

fn sample_bytes(chroma: Chroma, bits: u8) -> usize {
    if chroma.is_wide() || bits > 8 { 2 } else { 1 }
}

fn aligned(len: usize) -> Option<usize> {
    len.div_ceil(ROW_ALIGN).checked_mul(ROW_ALIGN)
}

/// Product of `dims`, `None` on overflow
fn byte_len(dims: &[usize]) -> Option<usize> {
    dims.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
}

fn usage(msg: impl Into<String>) -> EngineError {
    EngineError::new(ErrorCode::Usage, 0, msg)
}

fn invalid(msg: impl Into<String>) -> EngineError {
    EngineError::new(ErrorCode::InvalidInput, 0, msg)
}

fn io_error(e: std::io::Error) -> EngineError {
    EngineError::new(ErrorCode::Io, 0, e.to_string())
}

impl State {
    fn insert(&mut self, object: Object) -> RawHandle {
        let raw = RawHandle::from_raw(NonZeroU64::MIN.saturating_add(self.issued));
        self.issued += 1;
        self.objects.insert(raw, object);
        raw
    }

    fn context(&self, h: RawHandle) -> EngineResult<&Context> {
        match self.objects.get(&h) {
            Some(Object::Context(ctx)) => Ok(ctx),
            _ => Err(usage(format!("{} is not a context handle", h.get()))),
        }
    }

    fn context_mut(&mut self, h: RawHandle) -> EngineResult<&mut Context> {
        match self.objects.get_mut(&h) {
            Some(Object::Context(ctx)) => Ok(ctx),
            _ => Err(usage(format!("{} is not a context handle", h.get()))),
        }
    }

    fn encoder(&self, h: RawHandle) -> EngineResult<&EncoderState> {
        match self.objects.get(&h) {
            Some(Object::Encoder(enc)) => Ok(enc),
            _ => Err(usage(format!("{} is not an encoder handle", h.get()))),
        }
    }

    fn encoder_mut(&mut self, h: RawHandle) -> EngineResult<&mut EncoderState> {
        match self.objects.get_mut(&h) {
            Some(Object::Encoder(enc)) => Ok(enc),
            _ => Err(usage(format!("{} is not an encoder handle", h.get()))),
        }
    }

    fn raster(&self, h: RawHandle) -> EngineResult<&Raster> {
        match self.objects.get(&h) {
            Some(Object::Image(img)) => Ok(img),
            _ => Err(usage(format!("{} is not an image", h.get()))),
        }
    }

    fn raster_mut(&mut self, h: RawHandle) -> EngineResult<&mut Raster> {
        match self.objects.get_mut(&h) {
            Some(Object::Image(img)) => Ok(img),
            _ => Err(usage(format!("{} is not an image", h.get()))),
        }
    }

    fn item_ref(&self, h: RawHandle) -> EngineResult<(RawHandle, ItemId)> {
        match self.objects.get(&h) {
            Some(Object::ItemRef { ctx, item }) => Ok((*ctx, *item)),
            _ => Err(usage(format!("{} is not an image handle", h.get()))),
        }
    }

    fn item(&self, h: RawHandle) -> EngineResult<&Item> {
        let (ctx, id) = self.item_ref(h)?;
        self.context(ctx)?.item(id)
    }

    fn item_mut(&mut self, h: RawHandle) -> EngineResult<&mut Item> {
        let (ctx, id) = self.item_ref(h)?;
        self.context_mut(ctx)?.item_mut(id)
    }
}

impl Context {
    fn item(&self, id: ItemId) -> EngineResult<&Item> {
        self.items
            .iter()
            .find(|i| i.id == id)
            .ok_or_else(|| usage(format!("no item with id {id}")))
    }

    fn item_mut(&mut self, id: ItemId) -> EngineResult<&mut Item> {
        self.items
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| usage(format!("no item with id {id}")))
    }

    fn next_id(&self) -> EngineResult<ItemId> {
        self.items
            .iter()
            .map(|i| i.id)
            .max()
            .unwrap_or(0)
            .checked_add(1)
            .ok_or_else(|| usage("no item id left in this context"))
    }

    fn top_level(&self) -> impl Iterator<Item = &Item> {
        self.items.iter().filter(|i| i.thumbnail_of.is_none())
    }
}

impl UncompressedEngine {
    fn check_decodable(&self, format: CompressionFormat) -> EngineResult<()> {
        if self.supports_decoding(format) {
            Ok(())
        } else {
            Err(EngineError::new(
                ErrorCode::UnsupportedFeature,
                0,
                format!("{} decoding is not available", format.name()),
            ))
        }
    }

    fn load(&self, ctx: RawHandle, data: &[u8]) -> EngineResult<()> {
        let (brand, parsed) = parse_file(data)?;
        self.check_decodable(brand)?;
        log::trace!(
            "parsed {} file: {} items, primary {:?}",
            brand.name(),
            parsed.items.len(),
            parsed.primary
        );
        let mut state = self.state.borrow_mut();
        let slot = state.context_mut(ctx)?;
        if !slot.items.is_empty() {
            return Err(usage("context already holds a file"));
        }
        *slot = parsed;
        Ok(())
    }
}

/// Store an engine image as a new item of `ctx`
fn store_item(
    state: &mut State,
    ctx: RawHandle,
    raster: Raster,
    thumbnail_of: Option<ItemId>,
) -> EngineResult<RawHandle> {
    if raster.bits > 12 {
        return Err(EngineError::new(
            ErrorCode::Encoder,
            SUBCODE_UNSUPPORTED_BIT_DEPTH,
            format!("{}-bit samples cannot be encoded", raster.bits),
        ));
    }
    let channels = raster.channels();
    let width = raster.width as usize;
    let sb = sample_bytes(raster.chroma, raster.bits);
    let mut samples = Vec::with_capacity(width * channels * sb * raster.height as usize);
    for y in 0..raster.height as usize {
        let row = y * raster.stride;
        for i in 0..width * channels {
            let v = raster.sample(row + i * sb);
            if raster.bits > 8 {
                samples.extend_from_slice(&v.to_le_bytes());
            } else {
                samples.push(v as u8);
            }
        }
    }
    let target = state.context_mut(ctx)?;
    let id = target.next_id()?;
    target.items.push(Item {
        id,
        thumbnail_of,
        width: raster.width,
        height: raster.height,
        bits: raster.bits,
        channels: channels as u8,
        premultiplied: raster.premultiplied,
        profile: raster.profile,
        metadata: Vec::new(),
        samples,
    });
    if thumbnail_of.is_none() && target.primary.is_none() {
        target.primary = Some(id);
    }
    Ok(state.insert(Object::ItemRef { ctx, item: id }))
}

fn decode_item(
    item: &Item,
    colorspace: Colorspace,
    chroma: Chroma,
    options: DecodeOptions,
) -> EngineResult<Raster> {
    if chroma.interleaved_channels() != Some(item.channels) {
        return Err(EngineError::new(
            ErrorCode::UnsupportedFeature,
            0,
            format!("cannot deliver a {}-channel item as {chroma:?}", item.channels),
        ));
    }
    let narrow_chroma = !chroma.is_wide() && chroma != Chroma::Monochrome;
    let bits = if item.bits > 8 && (options.convert_hdr_to_8bit || narrow_chroma) {
        8
    } else {
        item.bits
    };
    if chroma.is_wide() && bits == 8 {
        return Err(usage(format!("{chroma:?} needs more than 8 bits per sample")));
    }
    let shift = item.bits - bits;
    let in_bytes = item.sample_bytes();
    let out_bytes = sample_bytes(chroma, bits);
    let too_large = || {
        invalid(format!("item {}: {}x{} is too large", item.id, item.width, item.height))
    };
    let row_bytes = item.row_bytes().ok_or_else(too_large)?;
    if item.sample_len() != Some(item.samples.len()) {
        return Err(invalid(format!("item {}: sample data has the wrong size", item.id)));
    }
    let samples_per_row = row_bytes / in_bytes;
    let stride = byte_len(&[samples_per_row, out_bytes])
        .and_then(aligned)
        .ok_or_else(too_large)?;
    let len = stride.checked_mul(item.height as usize).ok_or_else(too_large)?;
    let mut data = vec![0u8; len];
    for (y, src) in item.samples.chunks_exact(row_bytes).enumerate() {
        let dst = &mut data[y * stride..][..samples_per_row * out_bytes];
        for i in 0..samples_per_row {
            let v = if in_bytes == 1 {
                src[i] as u16
            } else {
                u16::from_le_bytes([src[2 * i], src[2 * i + 1]])
            };
            let v = v >> shift;
            if out_bytes == 1 {
                dst[i] = v as u8;
            } else if chroma.is_big_endian() {
                dst[2 * i..2 * i + 2].copy_from_slice(&v.to_be_bytes());
            } else {
                dst[2 * i..2 * i + 2].copy_from_slice(&v.to_le_bytes());
            }
        }
    }
    Ok(Raster {
        width: item.width,
        height: item.height,
        bits,
        colorspace,
        chroma,
        stride,
        data,
        premultiplied: item.premultiplied,
        profile: item.profile.clone(),
    })
}

/// Nearest-neighbour resize
fn resize(src: &Raster, width: u32, height: u32) -> EngineResult<Raster> {
    let bpp = src.bytes_per_pixel();
    let len = byte_len(&[width as usize, bpp])
        .and_then(aligned)
        .and_then(|stride| Some((stride, stride.checked_mul(height as usize)?)));
    let Some((stride, len)) = len else {
        return Err(usage(format!("cannot scale to {width}x{height}")));
    };
    let mut data = vec![0u8; len];
    for y in 0..height as usize {
        let sy = y * src.height as usize / height as usize;
        for x in 0..width as usize {
            let sx = x * src.width as usize / width as usize;
            let from = sy * src.stride + sx * bpp;
            let to = y * stride + x * bpp;
            data[to..to + bpp].copy_from_slice(&src.data[from..from + bpp]);
        }
    }
    Ok(Raster {
        width,
        height,
        bits: src.bits,
        colorspace: src.colorspace,
        chroma: src.chroma,
        stride,
        data,
        premultiplied: src.premultiplied,
        profile: src.profile.clone(),
    })
}

/// Thumbnail size for a bounding box, `None` when the image already fits
fn thumbnail_size(width: u32, height: u32, bbox: u32) -> Option<(u32, u32)> {
    if width <= bbox && height <= bbox {
        return None;
    }
    let (w, h) = if width > height {
        (bbox, (height as u64 * bbox as u64 / width as u64) as u32)
    } else {
        ((width as u64 * bbox as u64 / height as u64) as u32, bbox)
    };
    Some(((w & !1).max(1), (h & !1).max(1)))
}

fn brand_fourcc(format: CompressionFormat) -> &'static [u8; 4] {
    match format {
        CompressionFormat::Hevc => b"heic",
        CompressionFormat::Av1 => b"avif",
    }
}

fn brand_format(brand: &[u8]) -> Option<CompressionFormat> {
    match brand {
        b"heic" | b"heix" | b"heim" | b"heis" | b"hevc" | b"hevx" | b"hevm" | b"hevs" => {
            Some(CompressionFormat::Hevc)
        }
        b"avif" | b"avis" => Some(CompressionFormat::Av1),
        _ => None,
    }
}

impl Engine for UncompressedEngine {
    fn supports_decoding(&self, format: CompressionFormat) -> bool {
        !self.no_decode.contains(&format)
    }

    fn supports_encoding(&self, format: CompressionFormat) -> bool {
        !self.no_encode.contains(&format)
    }

    fn release(&self, handle: RawHandle, kind: HandleKind) {
        let mut state = self.state.borrow_mut();
        match state.objects.get(&handle).map(Object::kind) {
            Some(found) if found == kind => {
                state.objects.remove(&handle);
                #[cfg(test)]
                self.released.borrow_mut().push(kind);
            }
            Some(found) => log::warn!(
                "release of handle {} as {kind:?} ignored, it is a {found:?}",
                handle.get()
            ),
            None => log::warn!("release of unknown {kind:?} handle {}", handle.get()),
        }
    }

    fn alloc_context(&self) -> EngineResult<RawHandle> {
        Ok(self
            .state
            .borrow_mut()
            .insert(Object::Context(Context::default())))
    }

    fn read_from_memory(&self, ctx: RawHandle, data: &[u8]) -> EngineResult<()> {
        self.load(ctx, data)
    }

    fn read_from_reader(&self, ctx: RawHandle, reader: &mut dyn HeifReader) -> EngineResult<()> {
        let data = read_boxes(reader)?;
        self.load(ctx, &data)
    }

    fn primary_image_id(&self, ctx: RawHandle) -> EngineResult<ItemId> {
        let state = self.state.borrow();
        state
            .context(ctx)?
            .primary
            .ok_or_else(|| invalid("file has no primary image"))
    }

    fn top_level_image_ids(&self, ctx: RawHandle) -> EngineResult<Vec<ItemId>> {
        let state = self.state.borrow();
        Ok(state.context(ctx)?.top_level().map(|i| i.id).collect())
    }

    fn image_handle(&self, ctx: RawHandle, id: ItemId) -> EngineResult<RawHandle> {
        let mut state = self.state.borrow_mut();
        let item = state.context(ctx)?.item(id)?;
        if item.thumbnail_of.is_some() {
            return Err(usage(format!("item {id} is a thumbnail")));
        }
        Ok(state.insert(Object::ItemRef { ctx, item: id }))
    }

    fn handle_info(&self, handle: RawHandle) -> EngineResult<HandleInfo> {
        let state = self.state.borrow();
        let (ctx, _) = state.item_ref(handle)?;
        let primary = state.context(ctx)?.primary;
        let item = state.item(handle)?;
        Ok(HandleInfo {
            width: item.width,
            height: item.height,
            has_alpha: item.channels == 4,
            premultiplied_alpha: item.premultiplied,
            monochrome: item.channels == 1,
            bit_depth: item.bits,
            is_primary: primary == Some(item.id),
        })
    }

    fn thumbnail_ids(&self, handle: RawHandle) -> EngineResult<Vec<ItemId>> {
        let state = self.state.borrow();
        let (ctx, id) = state.item_ref(handle)?;
        Ok(state
            .context(ctx)?
            .items
            .iter()
            .filter(|i| i.thumbnail_of == Some(id))
            .map(|i| i.id)
            .collect())
    }

    fn thumbnail_handle(&self, handle: RawHandle, id: ItemId) -> EngineResult<RawHandle> {
        let mut state = self.state.borrow_mut();
        let (ctx, parent) = state.item_ref(handle)?;
        if state.context(ctx)?.item(id)?.thumbnail_of != Some(parent) {
            return Err(usage(format!("item {id} is not a thumbnail of item {parent}")));
        }
        Ok(state.insert(Object::ItemRef { ctx, item: id }))
    }

    fn color_profile(&self, handle: RawHandle) -> EngineResult<ColorProfile> {
        Ok(self.state.borrow().item(handle)?.profile.clone())
    }

    fn metadata_blocks(&self, handle: RawHandle) -> EngineResult<Vec<RawMetadata>> {
        Ok(self.state.borrow().item(handle)?.metadata.clone())
    }

    fn decode(
        &self,
        handle: RawHandle,
        colorspace: Colorspace,
        chroma: Chroma,
        options: DecodeOptions,
    ) -> EngineResult<RawHandle> {
        let mut state = self.state.borrow_mut();
        let raster = decode_item(state.item(handle)?, colorspace, chroma, options)?;
        log::trace!(
            "decoded {}x{} as {chroma:?} ({} bits)",
            raster.width,
            raster.height,
            raster.bits
        );
        Ok(state.insert(Object::Image(raster)))
    }

    fn plane(&self, image: RawHandle) -> EngineResult<Plane> {
        let state = self.state.borrow();
        let raster = state.raster(image)?;
        Ok(Plane {
            width: raster.width,
            height: raster.height,
            bits: raster.bits,
            stride: raster.stride,
            data: raster.data.clone(),
        })
    }

    fn scale(&self, image: RawHandle, width: u32, height: u32) -> EngineResult<RawHandle> {
        if width == 0 || height == 0 {
            return Err(usage(format!("cannot scale to {width}x{height}")));
        }
        let mut state = self.state.borrow_mut();
        let scaled = resize(state.raster(image)?, width, height)?;
        Ok(state.insert(Object::Image(scaled)))
    }

    fn create_image(
        &self,
        width: u32,
        height: u32,
        colorspace: Colorspace,
        chroma: Chroma,
        bits: u8,
        data: &[u8],
        stride: usize,
    ) -> EngineResult<RawHandle> {
        let Some(channels) = chroma.interleaved_channels() else {
            return Err(EngineError::new(
                ErrorCode::UnsupportedFeature,
                0,
                format!("planar chroma {chroma:?} is not supported"),
            ));
        };
        if width == 0 || height == 0 || !matches!(bits, 8 | 10 | 12 | 16) {
            return Err(usage(format!("invalid image {width}x{height} at {bits} bits")));
        }
        let too_large = || usage(format!("{width}x{height} image is too large"));
        let row = byte_len(&[width as usize, channels as usize, sample_bytes(chroma, bits)])
            .ok_or_else(too_large)?;
        let needed = stride
            .checked_mul(height as usize - 1)
            .and_then(|n| n.checked_add(row))
            .ok_or_else(too_large)?;
        if stride < row || data.len() < needed {
            return Err(usage("pixel data is smaller than stride * height"));
        }
        let len = row.checked_mul(height as usize).ok_or_else(too_large)?;
        let mut copy = vec![0u8; len];
        for (y, out) in copy.chunks_exact_mut(row).enumerate() {
            out.copy_from_slice(&data[y * stride..y * stride + row]);
        }
        let raster = Raster {
            width,
            height,
            bits,
            colorspace,
            chroma,
            stride: row,
            data: copy,
            premultiplied: false,
            profile: ColorProfile::None,
        };
        Ok(self.state.borrow_mut().insert(Object::Image(raster)))
    }

    fn set_color_profile(&self, image: RawHandle, profile: &ColorProfile) -> EngineResult<()> {
        self.state.borrow_mut().raster_mut(image)?.profile = profile.clone();
        Ok(())
    }

    fn set_premultiplied_alpha(&self, image: RawHandle, premultiplied: bool) -> EngineResult<()> {
        self.state.borrow_mut().raster_mut(image)?.premultiplied = premultiplied;
        Ok(())
    }

    fn encoder_for_format(&self, ctx: RawHandle, format: CompressionFormat)
    -> EngineResult<RawHandle> {
        if !self.supports_encoding(format) {
            return Err(EngineError::new(
                ErrorCode::Encoder,
                SUBCODE_NO_ENCODER,
                format!("no {} encoder available", format.name()),
            ));
        }
        let mut state = self.state.borrow_mut();
        let target = state.context_mut(ctx)?;
        match target.brand {
            Some(brand) if brand != format => {
                return Err(usage(format!(
                    "context already holds {} images",
                    brand.name()
                )));
            }
            _ => target.brand = Some(format),
        }
        Ok(state.insert(Object::Encoder(EncoderState {
            format,
            lossless: false,
            quality: 50,
            params: Vec::new(),
        })))
    }

    fn set_lossless(&self, encoder: RawHandle, lossless: bool) -> EngineResult<()> {
        self.state.borrow_mut().encoder_mut(encoder)?.lossless = lossless;
        Ok(())
    }

    fn set_lossy_quality(&self, encoder: RawHandle, quality: u8) -> EngineResult<()> {
        if quality > 100 {
            return Err(usage(format!("quality {quality} is outside 0..=100")));
        }
        self.state.borrow_mut().encoder_mut(encoder)?.quality = quality;
        Ok(())
    }

    fn set_parameter(&self, encoder: RawHandle, name: &str, value: &str) -> EngineResult<()> {
        let bad_value = || {
            EngineError::new(
                ErrorCode::Usage,
                SUBCODE_INVALID_PARAMETER_VALUE,
                format!("invalid value `{value}` for parameter `{name}`"),
            )
        };
        match name {
            "chroma" => {
                if !matches!(value, "420" | "422" | "444") {
                    return Err(bad_value());
                }
            }
            "speed" => match value.parse::<u8>() {
                Ok(0..=10) => {}
                _ => return Err(bad_value()),
            },
            // codec-specific options pass through untouched
            _ if name.contains(':') => {}
            _ => {
                return Err(EngineError::new(
                    ErrorCode::Usage,
                    SUBCODE_UNSUPPORTED_PARAMETER,
                    format!("unsupported encoder parameter `{name}`"),
                ));
            }
        }
        self.state
            .borrow_mut()
            .encoder_mut(encoder)?
            .params
            .push((name.to_owned(), value.to_owned()));
        Ok(())
    }

    fn encode_image(
        &self,
        ctx: RawHandle,
        encoder: RawHandle,
        image: RawHandle,
    ) -> EngineResult<RawHandle> {
        let mut state = self.state.borrow_mut();
        let enc = state.encoder(encoder)?;
        log::trace!(
            "encoding {} image, lossless={} quality={} params={:?}",
            enc.format.name(),
            enc.lossless,
            enc.quality,
            enc.params
        );
        let raster = state.raster(image)?.clone();
        store_item(&mut state, ctx, raster, None)
    }

    fn set_primary_image(&self, ctx: RawHandle, handle: RawHandle) -> EngineResult<()> {
        let mut state = self.state.borrow_mut();
        let (owner, id) = state.item_ref(handle)?;
        if owner != ctx {
            return Err(usage("image handle belongs to another context"));
        }
        state.context_mut(ctx)?.primary = Some(id);
        Ok(())
    }

    fn add_exif(&self, _ctx: RawHandle, handle: RawHandle, data: &[u8]) -> EngineResult<()> {
        let offset: u32 = if data.starts_with(b"Exif\0\0") { 6 } else { 0 };
        let mut stored = offset.to_be_bytes().to_vec();
        stored.extend_from_slice(data);
        self.state.borrow_mut().item_mut(handle)?.metadata.push(RawMetadata {
            item_type: "Exif".to_owned(),
            content_type: String::new(),
            data: stored,
        });
        Ok(())
    }

    fn add_xmp(&self, _ctx: RawHandle, handle: RawHandle, data: &[u8]) -> EngineResult<()> {
        self.state.borrow_mut().item_mut(handle)?.metadata.push(RawMetadata {
            item_type: "mime".to_owned(),
            content_type: "application/rdf+xml".to_owned(),
            data: data.to_vec(),
        });
        Ok(())
    }

    fn add_generic_metadata(
        &self,
        _ctx: RawHandle,
        handle: RawHandle,
        block: &RawMetadata,
    ) -> EngineResult<()> {
        self.state
            .borrow_mut()
            .item_mut(handle)?
            .metadata
            .push(block.clone());
        Ok(())
    }

    fn encode_thumbnail(
        &self,
        ctx: RawHandle,
        encoder: RawHandle,
        image: RawHandle,
        parent: RawHandle,
        bbox: u32,
    ) -> EngineResult<Option<RawHandle>> {
        let mut state = self.state.borrow_mut();
        state.encoder(encoder)?;
        let (_, parent_id) = state.item_ref(parent)?;
        let source = state.raster(image)?;
        let Some((width, height)) = thumbnail_size(source.width, source.height, bbox) else {
            return Ok(None);
        };
        let thumb = resize(source, width, height)?;
        store_item(&mut state, ctx, thumb, Some(parent_id))
            .map(Some)
    }

    fn write(&self, ctx: RawHandle, writer: &mut dyn HeifWriter) -> EngineResult<()> {
        let bytes = {
            let state = self.state.borrow();
            serialize(state.context(ctx)?)?
        };
        writer.write(&bytes).map_err(io_error)
    }
}

fn put_box(out: &mut Vec<u8>, kind: &[u8; 4], body: &[u8]) -> EngineResult<()> {
    let size = u32::try_from(body.len() + 8).map_err(|_| {
        EngineError::new(ErrorCode::Encoder, 0, "box larger than 4 GiB")
    })?;
    out.extend_from_slice(&size.to_be_bytes());
    out.extend_from_slice(kind);
    out.extend_from_slice(body);
    Ok(())
}

fn put_str(out: &mut Vec<u8>, s: &str) -> EngineResult<()> {
    let len = u16::try_from(s.len()).map_err(|_| {
        usage(format!("metadata type of {} bytes does not fit a box", s.len()))
    })?;
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(s.as_bytes());
    Ok(())
}

fn serialize(ctx: &Context) -> EngineResult<Vec<u8>> {
    let brand = ctx
        .brand
        .ok_or_else(|| usage("no encoder was created for this context"))?;
    if ctx.top_level().next().is_none() {
        return Err(usage("no images to write"));
    }
    let mut out = Vec::new();
    let major = brand_fourcc(brand);
    let mut ftyp = major.to_vec();
    ftyp.extend_from_slice(&0u32.to_be_bytes());
    ftyp.extend_from_slice(major);
    ftyp.extend_from_slice(b"mif1");
    put_box(&mut out, b"ftyp", &ftyp)?;
    if let Some(primary) = ctx.primary {
        put_box(&mut out, b"pitm", &primary.to_be_bytes())?;
    }
    for item in &ctx.items {
        let mut body = Vec::with_capacity(24 + item.samples.len());
        body.extend_from_slice(&item.id.to_be_bytes());
        body.extend_from_slice(&item.width.to_be_bytes());
        body.extend_from_slice(&item.height.to_be_bytes());
        body.extend_from_slice(&[item.bits, item.channels, item.premultiplied as u8, 0]);
        body.extend_from_slice(&item.thumbnail_of.unwrap_or(0).to_be_bytes());
        match &item.profile {
            ColorProfile::None => {}
            ColorProfile::Icc { kind, data } => {
                let mut colr = kind.fourcc().to_vec();
                colr.extend_from_slice(data);
                put_box(&mut body, b"colr", &colr)?;
            }
            ColorProfile::Nclx(data) => {
                let mut colr = b"nclx".to_vec();
                colr.extend_from_slice(data);
                put_box(&mut body, b"colr", &colr)?;
            }
        }
        for block in &item.metadata {
            let mut meta = Vec::new();
            put_str(&mut meta, &block.item_type)?;
            put_str(&mut meta, &block.content_type)?;
            meta.extend_from_slice(&block.data);
            put_box(&mut body, b"meta", &meta)?;
        }
        put_box(&mut body, b"pxls", &item.samples)?;
        put_box(&mut out, b"iimg", &body)?;
    }
    Ok(out)
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> EngineResult<&'a [u8]> {
        let out = self
            .data
            .get(self.pos..self.pos.saturating_add(n))
            .ok_or_else(|| invalid("unexpected end of box"))?;
        self.pos += n;
        Ok(out)
    }

    fn u8(&mut self) -> EngineResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> EngineResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> EngineResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn fourcc(&mut self) -> EngineResult<[u8; 4]> {
        let b = self.take(4)?;
        Ok([b[0], b[1], b[2], b[3]])
    }

    fn string(&mut self) -> EngineResult<String> {
        let len = self.u16()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| invalid("metadata type is not UTF-8"))
    }

    fn rest(&mut self) -> &'a [u8] {
        let out = &self.data[self.pos.min(self.data.len())..];
        self.pos = self.data.len();
        out
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Next `(type, body)` pair
    fn next_box(&mut self) -> EngineResult<([u8; 4], &'a [u8])> {
        let size = self.u32()? as usize;
        let kind = self.fourcc()?;
        if size < 8 {
            return Err(invalid(format!(
                "box `{}` declares size {size}",
                String::from_utf8_lossy(&kind)
            )));
        }
        Ok((kind, self.take(size - 8)?))
    }
}

fn parse_file(data: &[u8]) -> EngineResult<(CompressionFormat, Context)> {
    if data.get(4..8) != Some(b"ftyp".as_slice()) {
        return Err(invalid("missing ftyp box"));
    }
    let mut boxes = Cursor::new(data);
    let (_, ftyp) = boxes.next_box()?;
    let mut brands = Cursor::new(ftyp);
    let major = brands.fourcc()?;
    brands.u32()?;
    let brand = brand_format(&major)
        .or_else(|| brands.rest().chunks_exact(4).find_map(brand_format))
        .ok_or_else(|| {
            EngineError::new(
                ErrorCode::UnsupportedFiletype,
                0,
                format!("unknown brand `{}`", String::from_utf8_lossy(&major)),
            )
        })?;

    let mut ctx = Context {
        brand: Some(brand),
        ..Context::default()
    };
    while !boxes.is_empty() {
        let (kind, body) = boxes.next_box()?;
        match &kind {
            b"pitm" => ctx.primary = Some(Cursor::new(body).u32()?),
            b"iimg" => ctx.items.push(parse_item(body)?),
            _ => {}
        }
    }

    for item in &ctx.items {
        if let Some(parent) = item.thumbnail_of {
            if !ctx.top_level().any(|i| i.id == parent) {
                return Err(invalid(format!(
                    "thumbnail {} references missing item {parent}",
                    item.id
                )));
            }
        }
    }
    let first = ctx
        .top_level()
        .next()
        .map(|i| i.id)
        .ok_or_else(|| invalid("file contains no images"))?;
    match ctx.primary {
        None => ctx.primary = Some(first),
        Some(id) if !ctx.top_level().any(|i| i.id == id) => {
            return Err(invalid(format!("primary item {id} does not exist")));
        }
        Some(_) => {}
    }
    Ok((brand, ctx))
}

fn parse_item(body: &[u8]) -> EngineResult<Item> {
    let mut c = Cursor::new(body);
    let id = c.u32()?;
    let width = c.u32()?;
    let height = c.u32()?;
    let bits = c.u8()?;
    let channels = c.u8()?;
    let flags = c.u8()?;
    c.u8()?;
    let thumbnail_of = c.u32()?;
    if id == 0 || width == 0 || height == 0 {
        return Err(invalid("item has a zero id or size"));
    }
    if !matches!(bits, 8 | 10 | 12) || !matches!(channels, 1 | 3 | 4) {
        return Err(invalid(format!(
            "item {id}: unsupported layout {channels}x{bits} bits"
        )));
    }
    let mut item = Item {
        id,
        thumbnail_of: (thumbnail_of != 0).then_some(thumbnail_of),
        width,
        height,
        bits,
        channels,
        premultiplied: flags & 1 != 0,
        profile: ColorProfile::None,
        metadata: Vec::new(),
        samples: Vec::new(),
    };
    let mut samples = None;
    while !c.is_empty() {
        let (kind, child) = c.next_box()?;
        let mut cc = Cursor::new(child);
        match &kind {
            b"colr" => {
                let fourcc = cc.fourcc()?;
                let data = cc.rest().to_vec();
                item.profile = match IccKind::from_fourcc(fourcc) {
                    Some(kind) => ColorProfile::Icc { kind, data },
                    None if &fourcc == b"nclx" => ColorProfile::Nclx(data),
                    None => return Err(invalid("unknown color profile type")),
                };
            }
            b"meta" => {
                let item_type = cc.string()?;
                let content_type = cc.string()?;
                item.metadata.push(RawMetadata {
                    item_type,
                    content_type,
                    data: cc.rest().to_vec(),
                });
            }
            b"pxls" => samples = Some(child.to_vec()),
            _ => {}
        }
    }
    let samples = samples.ok_or_else(|| invalid(format!("item {id} has no samples")))?;
    if item.sample_len() != Some(samples.len()) {
        return Err(invalid(format!("item {id}: sample data has the wrong size")));
    }
    item.samples = samples;
    Ok(item)
}

/// Pull a complete file through reader callbacks, one box at a time
fn read_boxes(reader: &mut dyn HeifReader) -> EngineResult<Vec<u8>> {
    reader.seek(0).map_err(io_error)?;
    let mut data = Vec::new();
    loop {
        let mut header = [0u8; 8];
        let got = reader.read(&mut header).map_err(io_error)?;
        if got == 0 {
            break;
        }
        if got < header.len() {
            return Err(invalid("truncated box header"));
        }
        let size = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
        if size < 8 {
            return Err(invalid(format!("box declares size {size}")));
        }
        match reader.wait_for_size((data.len() + size) as u64) {
            SizeStatus::Available => {}
            SizeStatus::Unavailable => return Err(invalid("input ends inside a box")),
            SizeStatus::Error => {
                return Err(EngineError::new(ErrorCode::Io, 0, "reader cannot report its size"));
            }
        }
        data.extend_from_slice(&header);
        let start = data.len();
        data.resize(start + size - 8, 0);
        if reader.read(&mut data[start..]).map_err(io_error)? < size - 8 {
            return Err(invalid("input ends inside a box"));
        }
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::StreamReader;
    use std::io::Cursor as IoCursor;

    fn rgb_image(engine: &UncompressedEngine, w: u32, h: u32) -> RawHandle {
        let data: Vec<u8> = (0..w * h * 3).map(|i| (i % 251) as u8).collect();
        engine
            .create_image(w, h, Colorspace::Rgb, Chroma::InterleavedRgb, 8, &data, w as usize * 3)
            .unwrap()
    }

    fn encode_one(engine: &UncompressedEngine, format: CompressionFormat) -> Vec<u8> {
        let ctx = engine.alloc_context().unwrap();
        let enc = engine.encoder_for_format(ctx, format).unwrap();
        let img = rgb_image(engine, 8, 4);
        let item = engine.encode_image(ctx, enc, img).unwrap();
        engine.add_exif(ctx, item, b"Exif\0\0MM\0*").unwrap();
        engine.encode_thumbnail(ctx, enc, img, item, 4).unwrap();
        let mut out = Vec::new();
        engine.write(ctx, &mut out).unwrap();
        out
    }

    #[test]
    fn written_file_starts_with_brand() {
        let engine = UncompressedEngine::new();
        let heic = encode_one(&engine, CompressionFormat::Hevc);
        assert_eq!(&heic[4..12], b"ftypheic");
        let avif = encode_one(&engine, CompressionFormat::Av1);
        assert_eq!(&avif[4..12], b"ftypavif");
    }

    #[test]
    fn parse_recovers_items_and_thumbnails() {
        let engine = UncompressedEngine::new();
        let bytes = encode_one(&engine, CompressionFormat::Hevc);
        let (brand, ctx) = parse_file(&bytes).unwrap();
        assert_eq!(brand, CompressionFormat::Hevc);
        assert_eq!(ctx.top_level().count(), 1);
        assert_eq!(ctx.items.len(), 2);
        let thumb = &ctx.items[1];
        assert_eq!(thumb.thumbnail_of, Some(ctx.items[0].id));
        assert_eq!((thumb.width, thumb.height), (4, 2));
        let exif = &ctx.items[0].metadata[0];
        assert_eq!(&exif.data[..4], &[0, 0, 0, 6]);
    }

    #[test]
    fn stream_and_memory_reads_agree() {
        let engine = UncompressedEngine::new();
        let bytes = encode_one(&engine, CompressionFormat::Hevc);
        let streamed = read_boxes(&mut StreamReader::new(IoCursor::new(bytes.clone()))).unwrap();
        assert_eq!(streamed, bytes);
        let err = read_boxes(&mut StreamReader::new(IoCursor::new(bytes[..bytes.len() - 3].to_vec())))
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidInput);
    }

    #[test]
    fn decode_pads_rows_and_narrows_high_bit_depth() {
        let engine = UncompressedEngine::new();
        let ctx = engine.alloc_context().unwrap();
        let enc = engine.encoder_for_format(ctx, CompressionFormat::Hevc).unwrap();
        let words: Vec<u8> = [1023u16, 512, 4].iter().flat_map(|v| v.to_le_bytes()).collect();
        let img = engine
            .create_image(1, 1, Colorspace::Rgb, Chroma::InterleavedRrggbbLe, 10, &words, 6)
            .unwrap();
        let item = engine.encode_image(ctx, enc, img).unwrap();

        let wide = engine
            .decode(item, Colorspace::Rgb, Chroma::InterleavedRrggbbLe, DecodeOptions::default())
            .unwrap();
        let plane = engine.plane(wide).unwrap();
        assert_eq!(plane.stride, 16);
        assert_eq!(&plane.data[..6], &words[..]);

        let options = DecodeOptions {
            convert_hdr_to_8bit: true,
            threads: 0,
        };
        let narrow = engine
            .decode(item, Colorspace::Rgb, Chroma::InterleavedRgb, options)
            .unwrap();
        let plane = engine.plane(narrow).unwrap();
        assert_eq!(plane.bits, 8);
        assert_eq!(&plane.data[..3], &[255, 128, 1]);
    }

    #[test]
    fn sixteen_bit_images_are_not_encodable() {
        let engine = UncompressedEngine::new();
        let ctx = engine.alloc_context().unwrap();
        let enc = engine.encoder_for_format(ctx, CompressionFormat::Hevc).unwrap();
        let img = engine
            .create_image(1, 1, Colorspace::Rgb, Chroma::InterleavedRrggbbLe, 16, &[0; 6], 6)
            .unwrap();
        let err = engine.encode_image(ctx, enc, img).unwrap_err();
        assert_eq!(err.code, ErrorCode::Encoder);
        assert_eq!(err.subcode, SUBCODE_UNSUPPORTED_BIT_DEPTH);
    }

    #[test]
    fn disabled_formats() {
        let engine = UncompressedEngine::new().without_decoder(CompressionFormat::Av1);
        let avif = encode_one(&engine, CompressionFormat::Av1);
        let ctx = engine.alloc_context().unwrap();
        let err = engine.read_from_memory(ctx, &avif).unwrap_err();
        assert_eq!(err.code, ErrorCode::UnsupportedFeature);

        let engine = UncompressedEngine::new().without_encoder(CompressionFormat::Hevc);
        let ctx = engine.alloc_context().unwrap();
        let err = engine
            .encoder_for_format(ctx, CompressionFormat::Hevc)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Encoder);
    }

    #[test]
    fn parameters_are_validated() {
        let engine = UncompressedEngine::new();
        let ctx = engine.alloc_context().unwrap();
        let enc = engine.encoder_for_format(ctx, CompressionFormat::Hevc).unwrap();
        engine.set_parameter(enc, "chroma", "444").unwrap();
        engine.set_parameter(enc, "x265:ctu", "32").unwrap();
        assert!(engine.set_parameter(enc, "chroma", "411").is_err());
        assert!(engine.set_parameter(enc, "speed", "11").is_err());
        let err = engine.set_parameter(enc, "bogus", "1").unwrap_err();
        assert_eq!(err.subcode, SUBCODE_UNSUPPORTED_PARAMETER);
    }

    #[test]
    fn thumbnail_box_fitting() {
        assert_eq!(thumbnail_size(512, 512, 64), Some((64, 64)));
        assert_eq!(thumbnail_size(640, 480, 100), Some((100, 74)));
        assert_eq!(thumbnail_size(64, 64, 64), None);
    }

    #[test]
    fn release_tracks_live_handles() {
        let engine = UncompressedEngine::new();
        let ctx = engine.alloc_context().unwrap();
        let img = rgb_image(&engine, 2, 2);
        assert_eq!(engine.live_handles(), 2);
        engine.release(img, HandleKind::Context);
        assert_eq!(engine.live_handles(), 2);
        engine.release(img, HandleKind::Image);
        engine.release(ctx, HandleKind::Context);
        engine.release(ctx, HandleKind::Context);
        assert_eq!(engine.live_handles(), 0);
    }

    /// File with one `iimg` box whose header declares `size`, `bits` and `channels`
    fn single_item(id: u32, size: (u32, u32), bits: u8, channels: u8, pxls: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        put_box(&mut out, b"ftyp", b"heic\0\0\0\0").unwrap();
        let mut body = Vec::new();
        body.extend_from_slice(&id.to_be_bytes());
        body.extend_from_slice(&size.0.to_be_bytes());
        body.extend_from_slice(&size.1.to_be_bytes());
        body.extend_from_slice(&[bits, channels, 0, 0]);
        body.extend_from_slice(&0u32.to_be_bytes());
        put_box(&mut body, b"pxls", pxls).unwrap();
        put_box(&mut out, b"iimg", &body).unwrap();
        out
    }

    #[test]
    fn oversized_dimensions_are_invalid_input() {
        let bytes = single_item(1, (0x8000_0000, 0x8000_0000), 10, 4, &[]);
        assert_eq!(parse_file(&bytes).unwrap_err().code, ErrorCode::InvalidInput);
        let bytes = single_item(1, (u32::MAX, 1), 8, 3, &[]);
        assert_eq!(parse_file(&bytes).unwrap_err().code, ErrorCode::InvalidInput);

        // an item that skipped parsing must not be sliced past its samples
        let item = Item {
            id: 1,
            thumbnail_of: None,
            width: 0x8000_0000,
            height: 0x8000_0000,
            bits: 10,
            channels: 4,
            premultiplied: false,
            profile: ColorProfile::None,
            metadata: Vec::new(),
            samples: Vec::new(),
        };
        let err = decode_item(
            &item,
            Colorspace::Rgb,
            Chroma::InterleavedRrggbbaaLe,
            DecodeOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidInput);
    }

    #[test]
    fn truncated_samples_are_invalid_input() {
        let bytes = single_item(1, (2, 2), 8, 3, &[0; 11]);
        assert_eq!(parse_file(&bytes).unwrap_err().code, ErrorCode::InvalidInput);

        let bytes = single_item(1, (2, 2), 8, 3, &[0; 12]);
        assert!(parse_file(&bytes).is_ok());
        let cut = &bytes[..bytes.len() - 7];
        assert_eq!(parse_file(cut).unwrap_err().code, ErrorCode::InvalidInput);
        let err = read_boxes(&mut StreamReader::new(IoCursor::new(cut.to_vec()))).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidInput);
    }

    #[test]
    fn scaling_beyond_addressable_memory_fails() {
        let engine = UncompressedEngine::new();
        let img = rgb_image(&engine, 2, 2);
        let err = engine.scale(img, u32::MAX, u32::MAX).unwrap_err();
        assert_eq!(err.code, ErrorCode::Usage);
        let err = engine
            .create_image(u32::MAX, u32::MAX, Colorspace::Rgb, Chroma::InterleavedRgb, 8, &[], 0)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Usage);
    }

    #[test]
    fn overlong_metadata_type_is_refused() {
        let engine = UncompressedEngine::new();
        let ctx = engine.alloc_context().unwrap();
        let enc = engine.encoder_for_format(ctx, CompressionFormat::Hevc).unwrap();
        let item = engine.encode_image(ctx, enc, rgb_image(&engine, 2, 2)).unwrap();
        let block = RawMetadata {
            item_type: "x".repeat(usize::from(u16::MAX) + 1),
            content_type: String::new(),
            data: vec![1],
        };
        engine.add_generic_metadata(ctx, item, &block).unwrap();
        let mut out = Vec::new();
        let err = engine.write(ctx, &mut out).unwrap_err();
        assert_eq!(err.code, ErrorCode::Usage);
        assert!(out.is_empty());
    }

    #[test]
    fn garbage_is_rejected() {
        assert_eq!(parse_file(b"abc").unwrap_err().code, ErrorCode::InvalidInput);
        let mut bogus = Vec::new();
        put_box(&mut bogus, b"ftyp", b"jpeg\0\0\0\0jpeg").unwrap();
        assert_eq!(
            parse_file(&bogus).unwrap_err().code,
            ErrorCode::UnsupportedFiletype
        );
    }
}
