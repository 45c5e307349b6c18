//! Open and save configuration

use crate::container::Container;
use crate::engine::CompressionFormat;
use crate::error::{Error, Result};
use crate::image::Image;
use crate::io::ReadMode;
use whereat::at;

/// Configuration for reading a container
#[derive(Debug, Clone)]
pub struct OpenOptions {
    /// Decode samples above 8 bits as 8-bit
    pub(crate) convert_hdr_to_8bit: bool,
    /// Deliver BGR/BGRA instead of RGB/RGBA
    pub(crate) bgr_mode: bool,
    /// Read thumbnail associations
    pub(crate) thumbnails: bool,
    pub(crate) read_mode: ReadMode,
    /// Codec worker threads (0 = engine default)
    pub(crate) threads: u32,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            convert_hdr_to_8bit: true,
            bgr_mode: false,
            thumbnails: true,
            read_mode: ReadMode::InMemory,
            threads: 0,
        }
    }
}

impl OpenOptions {
    /// Create open options with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Reduce 10- and 12-bit images to 8 bits when decoding (default: true)
    pub fn convert_hdr_to_8bit(mut self, convert: bool) -> Self {
        self.convert_hdr_to_8bit = convert;
        self
    }

    /// Deliver pixels in BGR channel order
    ///
    /// 8-bit images become `BGR`/`BGRA`; 10- and 12-bit images are widened
    /// to `BGR;16`/`BGRA;16`. Monochrome images are unaffected.
    pub fn bgr_mode(mut self, bgr: bool) -> Self {
        self.bgr_mode = bgr;
        self
    }

    /// Whether thumbnails are exposed (default: true)
    pub fn thumbnails(mut self, thumbnails: bool) -> Self {
        self.thumbnails = thumbnails;
        self
    }

    pub fn read_mode(mut self, mode: ReadMode) -> Self {
        self.read_mode = mode;
        self
    }

    /// Set the number of codec threads
    ///
    /// 0 lets the engine decide.
    pub fn threads(mut self, threads: u32) -> Self {
        self.threads = threads;
        self
    }
}

/// Chroma subsampling requested from the encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChromaSubsampling {
    Cs420,
    Cs422,
    Cs444,
}

impl ChromaSubsampling {
    /// Encoder parameter value
    pub fn as_str(self) -> &'static str {
        match self {
            ChromaSubsampling::Cs420 => "420",
            ChromaSubsampling::Cs422 => "422",
            ChromaSubsampling::Cs444 => "444",
        }
    }
}

/// Encoder quality
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quality {
    Lossless,
    /// 0 (worst) to 100 (best)
    Lossy(u8),
}

impl Quality {
    /// Interpret the integer convention: -1 is lossless, 0..=100 lossy
    pub fn from_value(value: i32) -> Result<Self> {
        match value {
            -1 => Ok(Quality::Lossless),
            0..=100 => Ok(Quality::Lossy(value as u8)),
            _ => Err(at(Error::usage(format!(
                "quality {value} is outside -1..=100"
            )))),
        }
    }
}

/// Extra images written after the container's own
#[derive(Debug)]
pub enum Appendable<'a> {
    Image(&'a mut Image),
    Container(&'a mut Container),
}

/// Configuration for writing a container
#[derive(Debug)]
pub struct SaveOptions<'a> {
    /// Write every image, or only the primary one
    pub(crate) save_all: bool,
    pub(crate) append: Vec<Appendable<'a>>,
    pub(crate) quality: Option<i32>,
    pub(crate) encoder_params: Vec<(String, String)>,
    /// `Some(None)` strips EXIF from the primary image
    pub(crate) exif: Option<Option<Vec<u8>>>,
    pub(crate) xmp: Option<Option<Vec<u8>>>,
    pub(crate) primary_index: Option<i32>,
    pub(crate) chroma: Option<ChromaSubsampling>,
    pub(crate) format: CompressionFormat,
}

impl Default for SaveOptions<'_> {
    fn default() -> Self {
        Self {
            save_all: true,
            append: Vec::new(),
            quality: None,
            encoder_params: Vec::new(),
            exif: None,
            xmp: None,
            primary_index: None,
            chroma: None,
            format: CompressionFormat::Hevc,
        }
    }
}

impl<'a> SaveOptions<'a> {
    /// Create save options with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Write all images (default) or only the primary image
    pub fn save_all(mut self, all: bool) -> Self {
        self.save_all = all;
        self
    }

    /// Write a copy of `image` after the container's images
    ///
    /// The image is loaded as part of saving.
    pub fn append_image(mut self, image: &'a mut Image) -> Self {
        self.append.push(Appendable::Image(image));
        self
    }

    /// Write copies of every image of `container` after the container's images
    pub fn append_container(mut self, container: &'a mut Container) -> Self {
        self.append.push(Appendable::Container(container));
        self
    }

    /// Encoder quality: -1 for lossless, 0..=100 for lossy
    ///
    /// Values outside that range fail at save time.
    pub fn quality(mut self, quality: i32) -> Self {
        self.quality = Some(quality);
        self
    }

    pub fn lossless(self) -> Self {
        self.quality(-1)
    }

    /// Pass a named parameter through to the encoder
    pub fn encoder_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.encoder_params.push((name.into(), value.into()));
        self
    }

    /// Replace the primary image's EXIF; `None` writes none
    pub fn exif(mut self, exif: Option<Vec<u8>>) -> Self {
        self.exif = Some(exif);
        self
    }

    /// Replace the primary image's XMP; `None` writes none
    pub fn xmp(mut self, xmp: Option<Vec<u8>>) -> Self {
        self.xmp = Some(xmp);
        self
    }

    /// Mark the image at `index` as primary in the written file
    ///
    /// -1 or an index outside the written images keeps the current primary.
    pub fn primary_index(mut self, index: i32) -> Self {
        self.primary_index = Some(index);
        self
    }

    pub fn chroma(mut self, chroma: ChromaSubsampling) -> Self {
        self.chroma = Some(chroma);
        self
    }

    /// Compression of the written file (default: HEVC)
    pub fn format(mut self, format: CompressionFormat) -> Self {
        self.format = format;
        self
    }
}
