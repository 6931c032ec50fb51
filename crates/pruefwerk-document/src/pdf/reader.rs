// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF reader: page geometry and embedded image inspection using the `lopdf`
// crate. Nothing here renders; it only answers the questions the rasterizer
// and the scan renderer ask before pixels are produced.

use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use pruefwerk_core::error::{InspectError, Result};
use tracing::{debug, instrument, warn};

/// Maximum depth followed when walking `/Parent` links for inherited
/// attributes. Page trees deeper than this are treated as malformed.
const MAX_TREE_DEPTH: usize = 64;

/// Geometry of one page in PDF points (1/72 inch), after `/Rotate`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    /// 1-based page number.
    pub number: u32,
    pub width_pt: f64,
    pub height_pt: f64,
    /// Normalised `/Rotate` value: 0, 90, 180 or 270.
    pub rotation: i64,
}

/// An image XObject referenced from a page's resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageXObject {
    pub id: ObjectId,
    pub width: u32,
    pub height: u32,
}

impl ImageXObject {
    pub fn pixels(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

/// Read-only view over a parsed PDF document.
pub struct PdfReader {
    /// The underlying lopdf document.
    document: Document,
}

impl PdfReader {
    // -- Construction ---------------------------------------------------------

    /// Parse a PDF held in memory.
    #[instrument(skip_all, fields(bytes_len = data.len()))]
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let document = Document::load_mem(data)
            .map_err(|err| InspectError::corrupt_pdf(format!("failed to load PDF: {err}")))?;

        debug!(pages = document.get_pages().len(), "PDF loaded from bytes");
        Ok(Self { document })
    }

    // -- Inspection -----------------------------------------------------------

    /// Number of pages in the document.
    pub fn page_count(&self) -> usize {
        self.document.get_pages().len()
    }

    /// Borrow the underlying lopdf document.
    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Ordered page object ids, keyed by 1-based page number.
    pub fn page_ids(&self) -> Vec<(u32, ObjectId)> {
        self.document.get_pages().into_iter().collect()
    }

    /// Geometry of every page, in page order.
    #[instrument(skip(self))]
    pub fn page_geometries(&self) -> Result<Vec<PageGeometry>> {
        self.page_ids()
            .into_iter()
            .map(|(number, id)| self.page_geometry(number, id))
            .collect()
    }

    /// Geometry of a single page: its (inherited) MediaBox, with width and
    /// height swapped for quarter-turn rotations.
    pub fn page_geometry(&self, number: u32, page_id: ObjectId) -> Result<PageGeometry> {
        let [llx, lly, urx, ury] = self.media_box(number, page_id)?;
        let (width, height) = (urx - llx, ury - lly);

        let rotation = self
            .inherited(page_id, b"Rotate")?
            .and_then(|object| object.as_i64().ok())
            .unwrap_or(0)
            .rem_euclid(360);

        let (width_pt, height_pt) = match rotation {
            90 | 270 => (height, width),
            _ => (width, height),
        };

        Ok(PageGeometry {
            number,
            width_pt,
            height_pt,
            rotation,
        })
    }

    /// The (inherited) MediaBox of a page as `[llx, lly, urx, ury]`, with the
    /// corners normalised so that `llx < urx` and `lly < ury`.
    pub fn media_box(&self, number: u32, page_id: ObjectId) -> Result<[f64; 4]> {
        let media_box = self.inherited(page_id, b"MediaBox")?.ok_or_else(|| {
            InspectError::corrupt_pdf(format!("page {number} has no MediaBox"))
        })?;
        self.rectangle(media_box).ok_or_else(|| {
            InspectError::corrupt_pdf(format!("page {number} has an unusable MediaBox"))
        })
    }

    /// The (inherited) `/Resources` dictionary of a page.
    pub fn page_resources(&self, page_id: ObjectId) -> Result<Option<&Dictionary>> {
        Ok(self
            .inherited(page_id, b"Resources")?
            .and_then(|resources| self.resolve_dict(resources)))
    }

    /// Look up a named XObject stream in a resource dictionary.
    pub fn xobject<'a>(
        &'a self,
        resources: &'a Dictionary,
        name: &[u8],
    ) -> Option<(ObjectId, &'a Stream)> {
        let xobjects = resources
            .get(b"XObject")
            .ok()
            .and_then(|object| self.resolve_dict(object))?;
        let id = xobjects.get(name).and_then(Object::as_reference).ok()?;
        let stream = self.document.get_object(id).and_then(Object::as_stream).ok()?;
        Some((id, stream))
    }

    /// Size of an image XObject, or `None` when `stream` is not an image or
    /// has no usable `/Width` and `/Height`.
    pub fn image_xobject(&self, id: ObjectId, stream: &Stream) -> Option<ImageXObject> {
        let is_image = stream
            .dict
            .get(b"Subtype")
            .and_then(Object::as_name)
            .is_ok_and(|subtype| subtype == b"Image");
        if !is_image {
            return None;
        }
        match self.image_size(&stream.dict) {
            Some((width, height)) => Some(ImageXObject { id, width, height }),
            None => {
                warn!(?id, "image XObject without usable dimensions, skipping");
                None
            }
        }
    }

    /// `/Width` and `/Height` of an image dictionary.
    pub fn image_size(&self, dict: &Dictionary) -> Option<(u32, u32)> {
        Some((
            self.dimension(dict, b"Width")?,
            self.dimension(dict, b"Height")?,
        ))
    }

    /// Image XObjects directly referenced from a page's `/Resources`.
    pub fn page_images(&self, page_id: ObjectId) -> Result<Vec<ImageXObject>> {
        let Some(resources) = self.page_resources(page_id)? else {
            return Ok(Vec::new());
        };
        let Some(xobjects) = resources
            .get(b"XObject")
            .ok()
            .and_then(|object| self.resolve_dict(object))
        else {
            return Ok(Vec::new());
        };

        let mut images = Vec::new();
        for (name, value) in xobjects.iter() {
            let Ok(id) = value.as_reference() else {
                continue;
            };
            let Ok(Object::Stream(stream)) = self.document.get_object(id) else {
                warn!(name = %String::from_utf8_lossy(name), "XObject is not a stream, skipping");
                continue;
            };
            images.extend(self.image_xobject(id, stream));
        }
        Ok(images)
    }

    /// Fail with an oversized-document error when any page embeds an image
    /// larger than `max_pixels`.
    #[instrument(skip(self))]
    pub fn check_image_sizes(&self, max_pixels: u64) -> Result<()> {
        for (number, page_id) in self.page_ids() {
            for image in self.page_images(page_id)? {
                if image.pixels() > max_pixels {
                    return Err(InspectError::oversized_pdf(format!(
                        "page {number} embeds a {}x{} image ({} pixels, limit {max_pixels})",
                        image.width,
                        image.height,
                        image.pixels()
                    )));
                }
            }
        }
        Ok(())
    }

    // -- Helpers --------------------------------------------------------------

    /// Look up `key` on the page dictionary, then on each `/Parent` up the
    /// page tree. Returns the dereferenced value.
    fn inherited(&self, page_id: ObjectId, key: &[u8]) -> Result<Option<&Object>> {
        let mut current = Some(page_id);
        let mut depth = 0;

        while let Some(id) = current {
            if depth > MAX_TREE_DEPTH {
                return Err(InspectError::corrupt_pdf("page tree is too deep"));
            }
            let dict = self.document.get_dictionary(id).map_err(|err| {
                InspectError::corrupt_pdf(format!("cannot read page tree node {id:?}: {err}"))
            })?;

            if let Ok(value) = dict.get(key) {
                let (_, value) = self.document.dereference(value).map_err(|err| {
                    InspectError::corrupt_pdf(format!("broken reference in page tree: {err}"))
                })?;
                return Ok(Some(value));
            }

            current = dict.get(b"Parent").and_then(Object::as_reference).ok();
            depth += 1;
        }
        Ok(None)
    }

    /// Dereference `object` and return it as a dictionary.
    pub fn resolve_dict<'a>(&'a self, object: &'a Object) -> Option<&'a Dictionary> {
        self.document
            .dereference(object)
            .ok()
            .and_then(|(_, object)| object.as_dict().ok())
    }

    /// Dereference `object` and return it as a number.
    pub fn number(&self, object: &Object) -> Option<f64> {
        self.document
            .dereference(object)
            .ok()
            .and_then(|(_, object)| object.as_float().ok())
            .map(f64::from)
    }

    fn dimension(&self, dict: &Dictionary, key: &[u8]) -> Option<u32> {
        let value = self.number(dict.get(key).ok()?)?;
        (value.is_finite() && value >= 1.0 && value <= f64::from(u32::MAX)).then(|| value as u32)
    }

    /// A `[llx lly urx ury]` rectangle with positive area, corners normalised.
    fn rectangle(&self, object: &Object) -> Option<[f64; 4]> {
        let coords = object.as_array().ok()?;
        if coords.len() != 4 {
            return None;
        }
        let values: Vec<f64> = coords.iter().map(|c| self.number(c)).collect::<Option<_>>()?;
        let rect = [
            values[0].min(values[2]),
            values[1].min(values[3]),
            values[0].max(values[2]),
            values[1].max(values[3]),
        ];
        let (width, height) = (rect[2] - rect[0], rect[3] - rect[1]);
        (width.is_finite() && height.is_finite() && width > 0.0 && height > 0.0).then_some(rect)
    }
}
