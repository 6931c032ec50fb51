// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scan renderer: pure-Rust page renderer for image-based PDFs (scanner output
// and the annotated PDFs this crate exports). Each page is painted by
// replaying the image operators of its content stream onto a white canvas.
// Vector graphics and text are not drawn.

use std::io::{Cursor, Read};

use flate2::read::ZlibDecoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, ImageReader, Rgba, RgbaImage};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Object, ObjectId, Stream, dictionary};
use pruefwerk_core::config::RasterConfig;
use pruefwerk_core::error::{InspectError, Result};
use tracing::{debug, instrument, warn};
use weezl::{BitOrder, LzwStatus, decode::Decoder};

use crate::pdf::raster::{PageRenderer, RenderTarget};
use crate::pdf::reader::PdfReader;

/// Largest decoded content stream accepted, in bytes.
const MAX_CONTENT_BYTES: usize = 16 * 1024 * 1024;

/// Form XObjects nested deeper than this are treated as malformed.
const MAX_FORM_DEPTH: usize = 8;

/// Largest `/Indexed` palette: 256 entries of up to four components.
const MAX_PALETTE_BYTES: usize = 256 * 4;

const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Renders each page from the images its content stream draws.
#[derive(Debug, Clone, Copy)]
pub struct ScanPageRenderer {
    /// Largest image, in pixels, decoded while rendering.
    max_image_pixels: u64,
}

impl ScanPageRenderer {
    pub fn new() -> Self {
        Self::with_image_limit(RasterConfig::default().max_image_pixels)
    }

    /// A renderer that refuses to decode images larger than `max_pixels`.
    pub fn with_image_limit(max_pixels: u64) -> Self {
        Self {
            max_image_pixels: max_pixels,
        }
    }

    fn render_page(
        &self,
        reader: &PdfReader,
        number: u32,
        page_id: ObjectId,
        target: &RenderTarget,
    ) -> Result<DynamicImage> {
        let geometry = reader.page_geometry(number, page_id)?;
        let media_box = reader.media_box(number, page_id)?;
        let (width, height) = match geometry.rotation {
            90 | 270 => (target.height, target.width),
            _ => (target.width, target.height),
        };

        let mut canvas = Canvas::new(width, height, media_box, self.max_image_pixels);
        let content = page_content(reader, page_id)?;
        let resources = reader.page_resources(page_id)?;
        canvas.replay(reader, &content.operations, resources, Matrix::IDENTITY, 0)?;
        if canvas.drawn == 0 {
            debug!(page = number, "No images drawn, rendering blank page");
        }

        let page = DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(canvas.pixels).into_rgb8());
        Ok(match geometry.rotation {
            90 => page.rotate90(),
            180 => page.rotate180(),
            270 => page.rotate270(),
            _ => page,
        })
    }
}

impl Default for ScanPageRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl PageRenderer for ScanPageRenderer {
    fn name(&self) -> &str {
        "scan"
    }

    #[instrument(skip_all, fields(pages = targets.len()))]
    fn render(&self, document: &[u8], targets: &[RenderTarget]) -> Result<Vec<DynamicImage>> {
        let reader = PdfReader::from_bytes(document)?;
        let pages = reader.page_ids();

        targets
            .iter()
            .map(|target| {
                let Some(&(number, page_id)) =
                    pages.iter().find(|(number, _)| *number == target.page_index)
                else {
                    return Err(InspectError::corrupt_pdf(format!(
                        "page {} not found in page tree",
                        target.page_index
                    )));
                };
                self.render_page(&reader, number, page_id, target)
            })
            .collect()
    }
}

// -- Page content -------------------------------------------------------------

/// Decoded operators of all content streams of a page, in order.
fn page_content(reader: &PdfReader, page_id: ObjectId) -> Result<Content<Vec<Operation>>> {
    let document = reader.document();
    let mut data = Vec::new();
    for id in document.get_page_contents(page_id) {
        let stream = document
            .get_object(id)
            .and_then(Object::as_stream)
            .map_err(|err| InspectError::corrupt_pdf(format!("cannot read page content: {err}")))?;
        data.extend(decode_filters(stream, &filter_names(stream)?, MAX_CONTENT_BYTES)?);
        data.push(b'\n');
        if data.len() > MAX_CONTENT_BYTES {
            return Err(InspectError::oversized_pdf(format!(
                "page content exceeds {MAX_CONTENT_BYTES} bytes"
            )));
        }
    }
    parse_content(&data)
}

fn parse_content(data: &[u8]) -> Result<Content<Vec<Operation>>> {
    Content::<Vec<Operation>>::decode(data)
        .map_err(|err| InspectError::corrupt_pdf(format!("cannot parse page content: {err}")))
}

/// A PDF transformation matrix `[a b c d e f]`, mapping `(x, y)` to
/// `(a*x + c*y + e, b*x + d*y + f)`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Matrix([f64; 6]);

impl Matrix {
    const IDENTITY: Self = Self([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    fn from_operands(reader: &PdfReader, operands: &[Object]) -> Option<Self> {
        if operands.len() != 6 {
            return None;
        }
        let mut values = [0.0; 6];
        for (value, operand) in values.iter_mut().zip(operands) {
            *value = reader.number(operand).filter(|v| v.is_finite())?;
        }
        Some(Self(values))
    }

    /// The transform that applies `self` first and `outer` second.
    fn then(self, outer: Self) -> Self {
        let [a, b, c, d, e, f] = self.0;
        let [oa, ob, oc, od, oe, of] = outer.0;
        Self([
            a * oa + b * oc,
            a * ob + b * od,
            c * oa + d * oc,
            c * ob + d * od,
            e * oa + f * oc + oe,
            e * ob + f * od + of,
        ])
    }
}

/// White page canvas in unrotated page orientation.
struct Canvas {
    pixels: RgbaImage,
    /// Maps default user space to canvas pixels, y axis pointing down.
    device: Matrix,
    max_image_pixels: u64,
    drawn: usize,
}

impl Canvas {
    fn new(width: u32, height: u32, media_box: [f64; 4], max_image_pixels: u64) -> Self {
        let [llx, lly, urx, ury] = media_box;
        let sx = f64::from(width) / (urx - llx);
        let sy = f64::from(height) / (ury - lly);
        Self {
            pixels: RgbaImage::from_pixel(width, height, WHITE),
            device: Matrix([sx, 0.0, 0.0, -sy, -llx * sx, ury * sy]),
            max_image_pixels,
            drawn: 0,
        }
    }

    /// Paint every image drawn by `operations`, in painting order.
    fn replay(
        &mut self,
        reader: &PdfReader,
        operations: &[Operation],
        resources: Option<&Dictionary>,
        base: Matrix,
        depth: usize,
    ) -> Result<()> {
        let mut ctm = base;
        let mut saved = Vec::new();

        for operation in operations {
            match operation.operator.as_str() {
                "q" => saved.push(ctm),
                "Q" => ctm = saved.pop().unwrap_or(base),
                "cm" => match Matrix::from_operands(reader, &operation.operands) {
                    Some(matrix) => ctm = matrix.then(ctm),
                    None => warn!("Ignoring malformed cm operator"),
                },
                "Do" => {
                    let Some(name) = operation.operands.first().and_then(|o| o.as_name().ok())
                    else {
                        continue;
                    };
                    let Some((_, stream)) = resources.and_then(|r| reader.xobject(r, name)) else {
                        warn!(name = %String::from_utf8_lossy(name), "Drawn XObject is missing from resources");
                        continue;
                    };
                    match stream.dict.get(b"Subtype").and_then(Object::as_name) {
                        Ok(b"Image") => self.paint(reader, stream, ctm)?,
                        Ok(b"Form") => self.replay_form(reader, stream, resources, ctm, depth)?,
                        _ => {}
                    }
                }
                "BI" => {
                    if let Some(Object::Stream(inline)) = operation.operands.first() {
                        self.paint(reader, &expand_inline_image(inline), ctm)?;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn replay_form(
        &mut self,
        reader: &PdfReader,
        form: &Stream,
        parent: Option<&Dictionary>,
        ctm: Matrix,
        depth: usize,
    ) -> Result<()> {
        if depth >= MAX_FORM_DEPTH {
            return Err(InspectError::corrupt_pdf("form XObjects are nested too deeply"));
        }
        let matrix = form
            .dict
            .get(b"Matrix")
            .and_then(Object::as_array)
            .ok()
            .and_then(|values| Matrix::from_operands(reader, values))
            .unwrap_or(Matrix::IDENTITY);
        let resources = form
            .dict
            .get(b"Resources")
            .ok()
            .and_then(|object| reader.resolve_dict(object))
            .or(parent);

        let content = parse_content(&decode_filters(form, &filter_names(form)?, MAX_CONTENT_BYTES)?)?;
        self.replay(reader, &content.operations, resources, matrix.then(ctm), depth + 1)
    }

    /// Paint an image whose unit square `ctm` maps into user space.
    fn paint(&mut self, reader: &PdfReader, stream: &Stream, ctm: Matrix) -> Result<()> {
        let Some((width, height)) = reader.image_size(&stream.dict) else {
            warn!("Image without usable dimensions, skipping");
            return Ok(());
        };
        let pixels = u64::from(width) * u64::from(height);
        if pixels > self.max_image_pixels {
            return Err(InspectError::oversized_pdf(format!(
                "page draws a {width}x{height} image ({pixels} pixels, limit {})",
                self.max_image_pixels
            )));
        }

        let [a, b, c, d, e, f] = ctm.then(self.device).0;
        let extent = a.abs().max(b.abs()).max(c.abs()).max(d.abs());
        if !(extent.is_finite() && extent > 0.0 && e.is_finite() && f.is_finite()) {
            debug!("Image has a degenerate placement, skipping");
            return Ok(());
        }
        let tolerance = extent * 1e-6;
        let quarter_turn = if b.abs() <= tolerance && c.abs() <= tolerance {
            false
        } else if a.abs() <= tolerance && d.abs() <= tolerance {
            true
        } else {
            return Err(InspectError::unsupported_pdf(
                "image drawn with a rotated or skewed transform",
            ));
        };

        let decoded = decode_image(reader, stream, width, height, self.max_image_pixels)?;
        // Image row 0 is the top edge of the unit square.
        let (mut image, flip_x, flip_y, rect) = if quarter_turn {
            let rect = [e.min(e + c), f.min(f + b), c.abs(), b.abs()];
            (imageops::rotate90(&decoded), c < 0.0, b < 0.0, rect)
        } else {
            let rect = [e.min(e + a), f.min(f + d), a.abs(), d.abs()];
            (decoded, a < 0.0, d > 0.0, rect)
        };
        if flip_x {
            imageops::flip_horizontal_in_place(&mut image);
        }
        if flip_y {
            imageops::flip_vertical_in_place(&mut image);
        }

        self.composite(&image, rect);
        self.drawn += 1;
        Ok(())
    }

    /// Scale `image` into `rect` (`[x, y, width, height]` in canvas pixels,
    /// possibly reaching past the edges) and blend its visible part in.
    fn composite(&mut self, image: &RgbaImage, rect: [f64; 4]) {
        let [x, y, width, height] = rect;
        if !rect.iter().all(|v| v.is_finite()) || width <= 0.0 || height <= 0.0 {
            return;
        }
        let canvas_width = f64::from(self.pixels.width());
        let canvas_height = f64::from(self.pixels.height());
        let left = x.max(0.0).round();
        let top = y.max(0.0).round();
        let right = (x + width).min(canvas_width).round();
        let bottom = (y + height).min(canvas_height).round();
        if right <= left || bottom <= top {
            debug!("Image lies outside the page");
            return;
        }

        let source_width = f64::from(image.width());
        let source_height = f64::from(image.height());
        let source_left = ((left - x) / width * source_width)
            .floor()
            .clamp(0.0, source_width - 1.0);
        let source_top = ((top - y) / height * source_height)
            .floor()
            .clamp(0.0, source_height - 1.0);
        let source_right = ((right - x) / width * source_width)
            .ceil()
            .clamp(source_left + 1.0, source_width);
        let source_bottom = ((bottom - y) / height * source_height)
            .ceil()
            .clamp(source_top + 1.0, source_height);

        let visible = imageops::crop_imm(
            image,
            source_left as u32,
            source_top as u32,
            (source_right - source_left) as u32,
            (source_bottom - source_top) as u32,
        )
        .to_image();
        let scaled = imageops::resize(
            &visible,
            (right - left) as u32,
            (bottom - top) as u32,
            FilterType::Triangle,
        );
        imageops::overlay(&mut self.pixels, &scaled, left as i64, top as i64);
    }
}

/// Inline image (`BI ... ID ... EI`) with its abbreviated keys spelled out.
fn expand_inline_image(inline: &Stream) -> Stream {
    let mut dict = dictionary! { "Subtype" => "Image" };
    for (key, value) in inline.dict.iter() {
        let key: &[u8] = match key.as_slice() {
            b"W" => b"Width",
            b"H" => b"Height",
            b"BPC" => b"BitsPerComponent",
            b"CS" => b"ColorSpace",
            b"D" => b"Decode",
            b"DP" => b"DecodeParms",
            b"F" => b"Filter",
            b"IM" => b"ImageMask",
            other => other,
        };
        dict.set(key.to_vec(), value.clone());
    }
    Stream::new(dict, inline.content.clone())
}

// -- Image decoding -----------------------------------------------------------

/// Colour model of image samples.
#[derive(Debug, Clone, PartialEq)]
enum ColorSpace {
    Gray,
    Rgb,
    Cmyk,
    /// One sample per pixel, looked up in a palette of `base` colours.
    Indexed {
        base: Box<ColorSpace>,
        palette: Vec<u8>,
    },
    /// 1-bit stencil painted in black.
    Mask,
}

impl ColorSpace {
    /// Samples per pixel.
    fn components(&self) -> usize {
        match self {
            Self::Gray | Self::Indexed { .. } | Self::Mask => 1,
            Self::Rgb => 3,
            Self::Cmyk => 4,
        }
    }

    /// Opaque colour of a pixel given as 8-bit component levels.
    fn color(&self, levels: &[u8]) -> Rgba<u8> {
        match (self, levels) {
            (Self::Rgb, &[r, g, b, ..]) => Rgba([r, g, b, 255]),
            (Self::Cmyk, &[c, m, y, k, ..]) => {
                let [r, g, b] = cmyk(c, m, y, k);
                Rgba([r, g, b, 255])
            }
            (_, &[gray, ..]) => Rgba([gray, gray, gray, 255]),
            (_, []) => WHITE,
        }
    }
}

/// Decode an image stream into RGBA pixels. Stencil masks decode to black
/// where they paint and to transparent elsewhere.
fn decode_image(
    reader: &PdfReader,
    stream: &Stream,
    width: u32,
    height: u32,
    max_pixels: u64,
) -> Result<RgbaImage> {
    let filters = filter_names(stream)?;
    let raw_size = |bytes_per_pixel: u64| -> Result<usize> {
        let size = u64::from(width) * u64::from(height) * bytes_per_pixel + u64::from(height);
        usize::try_from(size)
            .map_err(|_| InspectError::oversized_pdf(format!("{width}x{height} image is too large")))
    };

    if filters.last().is_some_and(|f| matches!(f.as_slice(), b"DCTDecode" | b"DCT")) {
        let jpeg = decode_filters(stream, &filters[..filters.len() - 1], raw_size(4)?)?;
        return decode_jpeg(&jpeg, max_pixels);
    }

    let is_mask = stream
        .dict
        .get(b"ImageMask")
        .and_then(Object::as_bool)
        .unwrap_or(false);
    let (space, bits) = if is_mask {
        (ColorSpace::Mask, 1)
    } else {
        let space = color_space(reader, stream.dict.get(b"ColorSpace").ok(), false)?;
        let bits = bits_per_component(&stream.dict)?;
        if bits == 16 && matches!(space, ColorSpace::Indexed { .. }) {
            return Err(InspectError::corrupt_pdf("16-bit samples in an Indexed image"));
        }
        (space, bits)
    };

    let components = space.components();
    let row_bytes = (width as usize * components * usize::from(bits)).div_ceil(8);
    let expected = row_bytes * height as usize;
    let samples = decode_filters(stream, &filters, raw_size(8)?)?;
    if samples.len() < expected {
        return Err(InspectError::corrupt_pdf(format!(
            "page image data is shorter than its {width}x{height} size"
        )));
    }
    if samples.len() > expected {
        warn!(extra = samples.len() - expected, "Trailing bytes in page image");
    }

    let inverted = decode_inversions(reader, &stream.dict, components);
    let mut image = RgbaImage::new(width, height);
    let mut levels = [0u8; 4];
    for (y, row) in samples.chunks_exact(row_bytes).take(height as usize).enumerate() {
        for x in 0..width as usize {
            let pixel = match &space {
                ColorSpace::Mask => {
                    let painted = (sample(row, x, bits) == 0) != inverted[0];
                    Rgba([0, 0, 0, if painted { 255 } else { 0 }])
                }
                ColorSpace::Indexed { base, palette } => {
                    let stride = base.components();
                    let entries = palette.len() / stride;
                    let index = usize::from(sample(row, x, bits)).min(entries - 1);
                    base.color(&palette[index * stride..(index + 1) * stride])
                }
                direct => {
                    for (k, level) in levels.iter_mut().take(components).enumerate() {
                        let value = scale_sample(sample(row, x * components + k, bits), bits);
                        *level = if inverted[k] { 255 - value } else { value };
                    }
                    direct.color(&levels[..components])
                }
            };
            image.put_pixel(x as u32, y as u32, pixel);
        }
    }
    Ok(image)
}

fn decode_jpeg(jpeg: &[u8], max_pixels: u64) -> Result<RgbaImage> {
    let corrupt =
        |err: image::ImageError| InspectError::corrupt_pdf(format!("cannot decode JPEG page image: {err}"));

    let (width, height) = ImageReader::with_format(Cursor::new(jpeg), ImageFormat::Jpeg)
        .into_dimensions()
        .map_err(corrupt)?;
    let pixels = u64::from(width) * u64::from(height);
    if pixels > max_pixels {
        return Err(InspectError::oversized_pdf(format!(
            "page image decodes to {width}x{height} pixels (limit {max_pixels})"
        )));
    }
    ImageReader::with_format(Cursor::new(jpeg), ImageFormat::Jpeg)
        .decode()
        .map(|image| image.to_rgba8())
        .map_err(corrupt)
}

/// Resolve an image `/ColorSpace`. `nested` is set while resolving the base
/// of an `/Indexed` space, where a second palette is not allowed.
fn color_space(reader: &PdfReader, object: Option<&Object>, nested: bool) -> Result<ColorSpace> {
    let Some(object) = object else {
        return Err(InspectError::corrupt_pdf("page image has no colour space"));
    };
    let (_, object) = reader
        .document()
        .dereference(object)
        .map_err(|err| InspectError::corrupt_pdf(format!("broken colour space reference: {err}")))?;
    let (family, params): (&[u8], &[Object]) = match object {
        Object::Name(name) => (name.as_slice(), &[][..]),
        Object::Array(items) => match items.split_first() {
            Some((Object::Name(name), rest)) => (name.as_slice(), rest),
            _ => return Err(InspectError::corrupt_pdf("malformed colour space array")),
        },
        _ => return Err(InspectError::corrupt_pdf("malformed colour space")),
    };

    match family {
        b"DeviceGray" | b"G" | b"CalGray" => Ok(ColorSpace::Gray),
        b"DeviceRGB" | b"RGB" | b"CalRGB" => Ok(ColorSpace::Rgb),
        b"DeviceCMYK" | b"CMYK" => Ok(ColorSpace::Cmyk),
        b"ICCBased" => {
            let channels = params
                .first()
                .and_then(|profile| reader.document().dereference(profile).ok())
                .and_then(|(_, profile)| profile.as_stream().ok())
                .and_then(|profile| profile.dict.get(b"N").and_then(Object::as_i64).ok());
            match channels {
                Some(1) => Ok(ColorSpace::Gray),
                Some(3) => Ok(ColorSpace::Rgb),
                Some(4) => Ok(ColorSpace::Cmyk),
                other => Err(InspectError::unsupported_pdf(format!(
                    "ICC colour space with {other:?} components"
                ))),
            }
        }
        b"Indexed" | b"I" if !nested => indexed(reader, params),
        b"Indexed" | b"I" => Err(InspectError::corrupt_pdf(
            "Indexed colour space based on another Indexed space",
        )),
        other => Err(InspectError::unsupported_pdf(format!(
            "colour space {}",
            String::from_utf8_lossy(other)
        ))),
    }
}

/// Resolve `[/Indexed base hival lookup]` from its operands.
fn indexed(reader: &PdfReader, params: &[Object]) -> Result<ColorSpace> {
    let [base, hival, lookup] = params else {
        return Err(InspectError::corrupt_pdf("malformed Indexed colour space"));
    };
    let base = color_space(reader, Some(base), true)?;
    let hival = reader
        .number(hival)
        .filter(|value| (0.0..=255.0).contains(value))
        .ok_or_else(|| InspectError::corrupt_pdf("Indexed colour space has an invalid hival"))?
        as usize;

    let (_, lookup) = reader
        .document()
        .dereference(lookup)
        .map_err(|err| InspectError::corrupt_pdf(format!("broken palette reference: {err}")))?;
    let mut palette = match lookup {
        Object::String(bytes, _) => bytes.clone(),
        Object::Stream(stream) => decode_filters(stream, &filter_names(stream)?, MAX_PALETTE_BYTES)?,
        _ => return Err(InspectError::corrupt_pdf("Indexed colour space has no palette")),
    };

    let size = (hival + 1) * base.components();
    if palette.len() < size {
        warn!(have = palette.len(), need = size, "Short Indexed palette, padding with zeros");
    }
    palette.resize(size, 0);
    Ok(ColorSpace::Indexed {
        base: Box::new(base),
        palette,
    })
}

fn bits_per_component(dict: &Dictionary) -> Result<u8> {
    match dict.get(b"BitsPerComponent").and_then(Object::as_i64) {
        Ok(bits @ (1 | 2 | 4 | 8 | 16)) => Ok(bits as u8),
        Ok(bits) => Err(InspectError::corrupt_pdf(format!(
            "invalid image depth of {bits} bits per component"
        ))),
        Err(_) => Err(InspectError::corrupt_pdf("page image has no BitsPerComponent")),
    }
}

/// Per-component inversion requested by a `/Decode` array such as `[1 0]`.
fn decode_inversions(reader: &PdfReader, dict: &Dictionary, components: usize) -> Vec<bool> {
    let ranges = dict.get(b"Decode").and_then(Object::as_array).ok();
    (0..components)
        .map(|k| {
            let bound = |i: usize| ranges.and_then(|r| r.get(i)).and_then(|v| reader.number(v));
            matches!((bound(2 * k), bound(2 * k + 1)), (Some(low), Some(high)) if low > high)
        })
        .collect()
}

/// The `index`-th sample of a packed row of `bits`-bit samples.
fn sample(row: &[u8], index: usize, bits: u8) -> u16 {
    match bits {
        16 => u16::from_be_bytes([row[2 * index], row[2 * index + 1]]),
        8 => u16::from(row[index]),
        _ => {
            let bit = index * usize::from(bits);
            let shift = 8 - usize::from(bits) - bit % 8;
            u16::from((row[bit / 8] >> shift) & ((1u8 << bits) - 1))
        }
    }
}

/// Stretch a raw sample to the 0..=255 range.
fn scale_sample(raw: u16, bits: u8) -> u8 {
    match bits {
        16 => (raw >> 8) as u8,
        8 => raw as u8,
        _ => (u32::from(raw) * 255 / ((1u32 << bits) - 1)) as u8,
    }
}

fn cmyk(c: u8, m: u8, y: u8, k: u8) -> [u8; 3] {
    let channel = |v: u8| -> u8 { ((255 - u16::from(v)) * (255 - u16::from(k)) / 255) as u8 };
    [channel(c), channel(m), channel(y)]
}

// -- Stream filters -----------------------------------------------------------

fn filter_names(stream: &Stream) -> Result<Vec<Vec<u8>>> {
    if stream.dict.get(b"Filter").is_err() {
        return Ok(Vec::new());
    }
    stream
        .filters()
        .map(|names| names.into_iter().map(<[u8]>::to_vec).collect())
        .map_err(|err| InspectError::corrupt_pdf(format!("malformed stream filter: {err}")))
}

/// Undo `filters` on the stream content. Any decompression step producing
/// more than `limit` bytes fails with an oversized-document error.
fn decode_filters(stream: &Stream, filters: &[Vec<u8>], limit: usize) -> Result<Vec<u8>> {
    let params = stream.dict.get(b"DecodeParms").and_then(Object::as_dict).ok();
    let mut data = stream.content.clone();

    for filter in filters {
        data = match filter.as_slice() {
            b"FlateDecode" | b"Fl" => unpredict(inflate(&data, limit)?, params)?,
            b"LZWDecode" | b"LZW" => unpredict(unlzw(&data, params, limit)?, params)?,
            b"ASCII85Decode" | b"A85" => {
                Stream::new(dictionary! { "Filter" => "ASCII85Decode" }, data)
                    .decompressed_content()
                    .map_err(|err| {
                        InspectError::corrupt_pdf(format!("cannot decode ASCII85 data: {err}"))
                    })?
            }
            other => {
                return Err(InspectError::unsupported_pdf(format!(
                    "stream filter {}",
                    String::from_utf8_lossy(other)
                )));
            }
        };
    }
    Ok(data)
}

fn exceeds(limit: usize) -> InspectError {
    InspectError::oversized_pdf(format!("stream decompresses to more than {limit} bytes"))
}

fn inflate(data: &[u8], limit: usize) -> Result<Vec<u8>> {
    let mut output = Vec::new();
    let mut decoder = ZlibDecoder::new(data).take(limit as u64 + 1);
    if let Err(err) = decoder.read_to_end(&mut output) {
        warn!(%err, "Flate stream ended early");
    }
    if output.len() > limit {
        return Err(exceeds(limit));
    }
    Ok(output)
}

fn unlzw(data: &[u8], params: Option<&Dictionary>, limit: usize) -> Result<Vec<u8>> {
    let early_change = params
        .and_then(|p| p.get(b"EarlyChange").and_then(Object::as_i64).ok())
        .is_none_or(|value| value != 0);
    let mut decoder = if early_change {
        Decoder::with_tiff_size_switch(BitOrder::Msb, 8)
    } else {
        Decoder::new(BitOrder::Msb, 8)
    };

    let mut output = Vec::new();
    let mut buffer = [0u8; 4096];
    let mut input = data;
    loop {
        let result = decoder.decode_bytes(input, &mut buffer);
        input = &input[result.consumed_in..];
        output.extend_from_slice(&buffer[..result.consumed_out]);
        if output.len() > limit {
            return Err(exceeds(limit));
        }
        match result.status {
            Ok(LzwStatus::Ok) => {}
            Ok(LzwStatus::Done | LzwStatus::NoProgress) => break,
            Err(err) => {
                warn!(%err, "LZW stream ended early");
                break;
            }
        }
    }
    Ok(output)
}

/// Reverse a PNG predictor named in `/DecodeParms`.
fn unpredict(data: Vec<u8>, params: Option<&Dictionary>) -> Result<Vec<u8>> {
    let Some(params) = params else {
        return Ok(data);
    };
    let param = |key: &[u8], default: i64| -> usize {
        params
            .get(key)
            .and_then(Object::as_i64)
            .unwrap_or(default)
            .max(1) as usize
    };

    match params.get(b"Predictor").and_then(Object::as_i64).unwrap_or(1) {
        1 => Ok(data),
        10..=15 => {
            let bits_per_pixel = param(b"Colors", 1) * param(b"BitsPerComponent", 8);
            let row_bytes = (param(b"Columns", 1) * bits_per_pixel).div_ceil(8);
            let bytes_per_pixel = bits_per_pixel.div_ceil(8);
            if row_bytes % bytes_per_pixel != 0 {
                return Err(InspectError::unsupported_pdf("PNG predictor row layout"));
            }
            lopdf::filters::png::decode_frame(&data, bytes_per_pixel, row_bytes / bytes_per_pixel)
                .map_err(|err| InspectError::corrupt_pdf(format!("bad PNG predictor data: {err}")))
        }
        2 => Err(InspectError::unsupported_pdf("TIFF predictor")),
        other => Err(InspectError::corrupt_pdf(format!("unknown predictor {other}"))),
    }
}
