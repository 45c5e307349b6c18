//! Color profiles and metadata blocks attached to image items

use crate::engine::RawMetadata;

/// Which ICC box an embedded profile came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IccKind {
    /// Full profile (`prof`)
    Prof,
    /// Restricted profile (`rICC`)
    RIcc,
}

impl IccKind {
    pub fn fourcc(self) -> [u8; 4] {
        match self {
            IccKind::Prof => *b"prof",
            IccKind::RIcc => *b"rICC",
        }
    }

    pub fn from_fourcc(fourcc: [u8; 4]) -> Option<Self> {
        match &fourcc {
            b"prof" => Some(IccKind::Prof),
            b"rICC" => Some(IccKind::RIcc),
            _ => None,
        }
    }
}

/// Color profile of an image; profile contents are opaque
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ColorProfile {
    #[default]
    None,
    Icc { kind: IccKind, data: Vec<u8> },
    /// Native NCLX struct bytes
    Nclx(Vec<u8>),
}

impl ColorProfile {
    pub fn is_none(&self) -> bool {
        matches!(self, ColorProfile::None)
    }

    /// Raw profile bytes, if any
    pub fn data(&self) -> Option<&[u8]> {
        match self {
            ColorProfile::None => None,
            ColorProfile::Icc { data, .. } | ColorProfile::Nclx(data) => Some(data),
        }
    }
}

/// What a [`MetadataBlock`] carries
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataKind {
    Exif,
    Xmp,
    Generic {
        item_type: String,
        content_type: String,
    },
}

/// Metadata item kept alongside an image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataBlock {
    pub kind: MetadataKind,
    pub data: Vec<u8>,
}

impl MetadataBlock {
    pub fn generic(
        item_type: impl Into<String>,
        content_type: impl Into<String>,
        data: Vec<u8>,
    ) -> Self {
        Self {
            kind: MetadataKind::Generic {
                item_type: item_type.into(),
                content_type: content_type.into(),
            },
            data,
        }
    }

    /// Item type as written to the file
    pub fn item_type(&self) -> &str {
        match &self.kind {
            MetadataKind::Exif => EXIF_TYPE,
            MetadataKind::Xmp => XMP_TYPE,
            MetadataKind::Generic { item_type, .. } => item_type,
        }
    }

    pub(crate) fn to_raw(&self) -> RawMetadata {
        let content_type = match &self.kind {
            MetadataKind::Exif => String::new(),
            MetadataKind::Xmp => XMP_CONTENT_TYPE.to_owned(),
            MetadataKind::Generic { content_type, .. } => content_type.clone(),
        };
        RawMetadata {
            item_type: self.item_type().to_owned(),
            content_type,
            data: self.data.clone(),
        }
    }
}

pub(crate) const EXIF_TYPE: &str = "Exif";
pub(crate) const XMP_TYPE: &str = "mime";
pub(crate) const XMP_CONTENT_TYPE: &str = "application/rdf+xml";

/// Length of the TIFF header offset that precedes stored EXIF payloads
pub(crate) const EXIF_OFFSET_LEN: usize = 4;

/// Metadata of one image item split into its well-known parts
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct Extracted {
    pub exif: Option<Vec<u8>>,
    pub xmp: Option<Vec<u8>>,
    /// Everything that is neither EXIF nor XMP, in file order
    pub blocks: Vec<MetadataBlock>,
}

/// Split raw metadata blocks into EXIF, XMP and the rest.
///
/// EXIF payloads lose their 4-byte offset prefix. Every `Exif` block is
/// consumed, but only the first whose payload starts with `Exif` is kept.
/// Every `mime` block is consumed and the first becomes the XMP packet.
/// Empty blocks are dropped.
pub(crate) fn extract(raw: Vec<RawMetadata>) -> Extracted {
    let mut out = Extracted::default();
    for block in raw {
        if block.data.is_empty() {
            continue;
        }
        match block.item_type.as_str() {
            EXIF_TYPE => {
                let payload = block.data.get(EXIF_OFFSET_LEN..).unwrap_or_default();
                if out.exif.is_none() && payload.starts_with(b"Exif") {
                    out.exif = Some(payload.to_vec());
                }
            }
            XMP_TYPE => {
                if out.xmp.is_none() {
                    out.xmp = Some(block.data);
                }
            }
            _ => out
                .blocks
                .push(MetadataBlock::generic(block.item_type, block.content_type, block.data)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(item_type: &str, data: &[u8]) -> RawMetadata {
        RawMetadata {
            item_type: item_type.to_owned(),
            content_type: String::new(),
            data: data.to_vec(),
        }
    }

    #[test]
    fn exif_loses_offset_prefix() {
        let out = extract(vec![raw("Exif", b"\0\0\0\x06Exif\0\0MM")]);
        assert_eq!(out.exif.as_deref(), Some(&b"Exif\0\0MM"[..]));
        assert!(out.blocks.is_empty());
    }

    #[test]
    fn only_first_valid_exif_survives() {
        let out = extract(vec![
            raw("Exif", b"\0\0\0\0II*\0"),
            raw("Exif", b"\0\0\0\x06Exif\0\0first"),
            raw("Exif", b"\0\0\0\x06Exif\0\0second"),
        ]);
        assert_eq!(out.exif.as_deref(), Some(&b"Exif\0\0first"[..]));
        assert!(out.blocks.is_empty());
    }

    #[test]
    fn first_mime_block_is_xmp() {
        let out = extract(vec![
            raw("mime", b"<x:xmpmeta/>"),
            raw("mime", b"<other/>"),
            raw("uuid", b"payload"),
        ]);
        assert_eq!(out.xmp.as_deref(), Some(&b"<x:xmpmeta/>"[..]));
        assert_eq!(out.blocks.len(), 1);
        assert_eq!(out.blocks[0].item_type(), "uuid");
    }

    #[test]
    fn empty_blocks_are_dropped() {
        let out = extract(vec![raw("uuid", b""), raw("Exif", b"")]);
        assert_eq!(out, Extracted::default());
    }

    #[test]
    fn icc_fourcc_roundtrip() {
        for kind in [IccKind::Prof, IccKind::RIcc] {
            assert_eq!(IccKind::from_fourcc(kind.fourcc()), Some(kind));
        }
        assert_eq!(IccKind::from_fourcc(*b"nclx"), None);
    }
}
