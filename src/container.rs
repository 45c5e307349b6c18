//! Multi-image container with primary-image tracking and the save pipeline

use crate::adapter::{self, DecodeSession, EncodeSession, Input};
use crate::config::{Appendable, OpenOptions, Quality, SaveOptions};
use crate::engine::{Engine, ItemId, UncompressedEngine};
use crate::error::{Error, Result, io};
use crate::image::{Image, PrimaryOverrides, Thumbnail};
use crate::io::{ReadMode, StreamReader, peek_prefix};
use crate::pixel::{PixelBuffer, PixelFormat};
use crate::registry;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::rc::Rc;
use whereat::at;

/// Bytes needed to recognize a file: box size, `ftyp`, major brand
const SNIFF_LEN: usize = 12;

/// Engine used by the constructors that do not take one
pub fn default_engine() -> Rc<dyn Engine> {
    Rc::new(UncompressedEngine::new())
}

/// Ordered collection of images persisted to or read from one file
///
/// At most one image carries the primary flag. When none does (for example
/// after the primary image was removed), index 0 acts as primary.
#[derive(Debug)]
pub struct Container {
    engine: Rc<dyn Engine>,
    images: Vec<Image>,
    mime_type: Option<&'static str>,
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl Container {
    /// Empty container backed by the default engine
    pub fn new() -> Self {
        Self::with_engine(default_engine())
    }

    /// Empty container backed by `engine`
    pub fn with_engine(engine: Rc<dyn Engine>) -> Self {
        Self {
            engine,
            images: Vec::new(),
            mime_type: None,
        }
    }

    /// Open an in-memory file with default options
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::open_bytes(default_engine(), data, &OpenOptions::default())
    }

    /// Open a file on disk with default options
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_path(default_engine(), path, &OpenOptions::default())
    }

    /// Open a seekable stream with default options
    pub fn from_reader<R: Read + Seek>(reader: R) -> Result<Self> {
        Self::open_reader(default_engine(), reader, &OpenOptions::default())
    }

    /// Open an in-memory file
    ///
    /// Image properties and metadata are read now; pixels are decoded on
    /// first access.
    pub fn open_bytes(engine: Rc<dyn Engine>, data: &[u8], options: &OpenOptions) -> Result<Self> {
        adapter::check_readable(engine.as_ref(), data)?;
        let session = match options.read_mode {
            ReadMode::InMemory => DecodeSession::open(&engine, Input::Memory(data))?,
            ReadMode::Streaming => {
                let mut reader = StreamReader::new(std::io::Cursor::new(data));
                DecodeSession::open(&engine, Input::Stream(&mut reader))?
            }
        };
        Self::from_session(engine, &session, adapter::mime_type(data), options)
    }

    pub fn open_path(
        engine: Rc<dyn Engine>,
        path: impl AsRef<Path>,
        options: &OpenOptions,
    ) -> Result<Self> {
        let file = File::open(path.as_ref()).map_err(io)?;
        Self::open_reader(engine, BufReader::new(file), options)
    }

    /// Open a seekable stream, read from its start
    pub fn open_reader<R: Read + Seek>(
        engine: Rc<dyn Engine>,
        mut reader: R,
        options: &OpenOptions,
    ) -> Result<Self> {
        let prefix = peek_prefix(&mut reader, SNIFF_LEN).map_err(io)?;
        adapter::check_readable(engine.as_ref(), &prefix)?;
        reader.seek(SeekFrom::Start(0)).map_err(io)?;
        match options.read_mode {
            ReadMode::InMemory => {
                let mut data = Vec::new();
                reader.read_to_end(&mut data).map_err(io)?;
                Self::open_bytes(engine, &data, options)
            }
            ReadMode::Streaming => {
                let mut stream = StreamReader::new(reader);
                let session = DecodeSession::open(&engine, Input::Stream(&mut stream))?;
                Self::from_session(engine, &session, adapter::mime_type(&prefix), options)
            }
        }
    }

    fn from_session(
        engine: Rc<dyn Engine>,
        session: &DecodeSession,
        mime_type: Option<&'static str>,
        options: &OpenOptions,
    ) -> Result<Self> {
        let ids = session.image_ids()?;
        let primary_id = session.primary_id()?;
        let images = ids
            .into_iter()
            .enumerate()
            .map(|(index, id)| -> Result<Image> {
                Image::from_native(session.image(id)?, options, &engine, index)
            })
            .collect::<Result<Vec<_>>>()?;
        log::debug!(
            "opened {} with {} images, primary item {primary_id}",
            mime_type.unwrap_or("container"),
            images.len()
        );
        Ok(Self {
            engine,
            images,
            mime_type,
        })
    }

    pub fn engine(&self) -> &Rc<dyn Engine> {
        &self.engine
    }

    /// Mime type of the file this container was read from
    pub fn mime_type(&self) -> Option<&'static str> {
        self.mime_type
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Image> {
        self.images.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Image> {
        self.images.get_mut(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Image> {
        self.images.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Image> {
        self.images.iter_mut()
    }

    pub fn images(&self) -> &[Image] {
        &self.images
    }

    /// Index of the primary image; 0 when no image carries the flag
    pub fn primary_index(&self) -> Result<usize> {
        if self.images.is_empty() {
            return Err(at(Error::usage("container has no images")));
        }
        Ok(self.images.iter().position(Image::is_primary).unwrap_or(0))
    }

    pub fn primary(&self) -> Result<&Image> {
        let index = self.primary_index()?;
        Ok(&self.images[index])
    }

    pub fn primary_mut(&mut self) -> Result<&mut Image> {
        let index = self.primary_index()?;
        Ok(&mut self.images[index])
    }

    /// Make the image at `index` the only primary image
    pub fn set_primary(&mut self, index: usize) -> Result<()> {
        self.check_index(index)?;
        for (i, image) in self.images.iter_mut().enumerate() {
            image.set_primary_flag(i == index);
        }
        Ok(())
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.images.len() {
            return Err(at(Error::usage(format!(
                "index {index} is out of range for {} images",
                self.images.len()
            ))));
        }
        Ok(())
    }

    /// Id for a new image: 2 + the largest id in use
    fn next_id(&self) -> Result<ItemId> {
        let max = self.images.iter().map(Image::max_id).max().unwrap_or(0);
        max.checked_add(2)
            .ok_or_else(|| at(Error::usage(format!("no item id left after {max}"))))
    }

    fn push(&mut self, mut image: Image) -> &mut Image {
        let index = self.images.len();
        image.set_index(index);
        self.images.push(image);
        &mut self.images[index]
    }

    /// Append an image built from raw pixels
    ///
    /// `stride` defaults to unpadded rows. The primary image is unchanged.
    pub fn add_from_bytes(
        &mut self,
        format: PixelFormat,
        size: (u32, u32),
        data: &[u8],
        stride: Option<usize>,
    ) -> Result<&mut Image> {
        if registry::lookup(format).is_none() {
            return Err(at(Error::usage(format!("{format} is not a supported pixel format"))));
        }
        let (width, height) = size;
        let stride = stride.unwrap_or_else(|| format.min_stride(width));
        let buf = PixelBuffer::from_slice(format, width, height, stride, data)?;
        let image = Image::from_buffer(self.next_id()?, buf, &self.engine);
        Ok(self.push(image))
    }

    /// Append a deep copy of `image`, loading it first. The copy is never primary.
    pub fn add_image(&mut self, image: &mut Image) -> Result<&mut Image> {
        let mut copy = image.duplicate()?;
        copy.set_id(self.next_id()?);
        Ok(self.push(copy))
    }

    /// Append deep copies of every image of `other`
    pub fn add_from_container(&mut self, other: &mut Container) -> Result<()> {
        for image in other.images.iter_mut() {
            self.add_image(image)?;
        }
        Ok(())
    }

    /// Remove and return the image at `index`
    ///
    /// Removing the primary image does not promote another one.
    pub fn remove(&mut self, index: usize) -> Result<Image> {
        self.check_index(index)?;
        let removed = self.images.remove(index);
        for (i, image) in self.images.iter_mut().enumerate().skip(index) {
            image.set_index(i);
        }
        Ok(removed)
    }

    /// Thumbnails of every image with the index of their owner
    ///
    /// With `one_for_image`, only the first thumbnail of each image.
    pub fn thumbnails_all(
        &self,
        one_for_image: bool,
    ) -> impl Iterator<Item = (usize, &Thumbnail)> {
        let per_image = if one_for_image { 1 } else { usize::MAX };
        self.images.iter().enumerate().flat_map(move |(index, image)| {
            image
                .thumbnails()
                .iter()
                .take(per_image)
                .map(move |thumb| (index, thumb))
        })
    }

    /// Decode every image and thumbnail now
    pub fn load_all(&mut self) -> Result<()> {
        for image in &mut self.images {
            image.load()?;
            for thumb in image.thumbnails_mut() {
                thumb.load()?;
            }
        }
        Ok(())
    }

    /// Resize the primary image
    pub fn scale(&mut self, width: u32, height: u32) -> Result<()> {
        self.primary_mut()?.scale(width, height)?;
        Ok(())
    }

    /// Convert the primary image
    pub fn convert_to(&mut self, format: PixelFormat) -> Result<()> {
        self.primary_mut()?.convert_to(format)?;
        Ok(())
    }

    /// Encode every image (and anything appended) into `writer`
    ///
    /// Every written image is loaded first. Formats the engine cannot encode
    /// directly are converted on a copy.
    pub fn save<W: Write>(&mut self, writer: &mut W, options: SaveOptions<'_>) -> Result<()> {
        let SaveOptions {
            save_all,
            append,
            quality,
            encoder_params,
            exif,
            xmp,
            primary_index,
            chroma,
            format,
        } = options;
        let quality = quality.map(Quality::from_value).transpose()?;

        let mut images: Vec<&mut Image> = self.images.iter_mut().collect();
        for extra in append {
            match extra {
                Appendable::Image(image) => images.push(image),
                Appendable::Container(container) => images.extend(container.images.iter_mut()),
            }
        }
        if images.is_empty() {
            return Err(at(Error::usage("cannot write a file with no images")));
        }

        let flagged = images.iter().position(|i| i.is_primary()).unwrap_or(0);
        let mut primary = match primary_index {
            Some(j) if j >= 0 && (j as usize) < images.len() => j as usize,
            None | Some(-1) => flagged,
            Some(j) => {
                log::warn!(
                    "primary_index {j} is outside 0..{}, keeping image {flagged}",
                    images.len()
                );
                flagged
            }
        };
        if !save_all {
            images = vec![images.swap_remove(primary)];
            primary = 0;
        }

        let session = EncodeSession::new(&self.engine, format)?;
        if let Some(quality) = quality {
            session.set_quality(quality)?;
        }
        if let Some(chroma) = chroma {
            session.set_parameter("chroma", chroma.as_str())?;
        }
        for (name, value) in &encoder_params {
            session.set_parameter(name, value)?;
        }

        let overrides = PrimaryOverrides { exif, xmp };
        let count = images.len();
        for (i, image) in images.into_iter().enumerate() {
            image.encode_into(&session, (i == primary).then_some(&overrides))?;
        }
        session.write(writer)?;
        log::debug!(
            "wrote {} file with {count} images, primary index {primary}",
            format.name()
        );
        Ok(())
    }

    pub fn save_to_path(&mut self, path: impl AsRef<Path>, options: SaveOptions<'_>) -> Result<()> {
        let mut out = BufWriter::new(File::create(path.as_ref()).map_err(io)?);
        self.save(&mut out, options)?;
        out.flush().map_err(io)
    }

    pub fn save_to_vec(&mut self, options: SaveOptions<'_>) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.save(&mut out, options)?;
        Ok(out)
    }
}

impl<'a> IntoIterator for &'a Container {
    type Item = &'a Image;
    type IntoIter = std::slice::Iter<'a, Image>;

    fn into_iter(self) -> Self::IntoIter {
        self.images.iter()
    }
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HeifFile with {} images", self.images.len())?;
        for image in &self.images {
            write!(f, "\n  {image}")?;
        }
        Ok(())
    }
}
