//! Image ingestion: format check, pixel size, resolution and drawing markup.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::io::Cursor;
use std::path::Path;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use thiserror::Error;

use crate::docx::xml::escape_xml;
use crate::error::{Error as DocError, ErrorKind};

pub const EMU_PER_INCH: f64 = 914_400.0;
pub const DEFAULT_DPI: f64 = 72.0;

/// Extensions the image-path predicate accepts
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "webp"];

const EXIF_X_RESOLUTION: u16 = 0x011A;
const EXIF_Y_RESOLUTION: u16 = 0x011B;
const EXIF_ORIENTATION: u16 = 0x0112;
const EXIF_RESOLUTION_UNIT: u16 = 0x0128;

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("failed to read image {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),

    #[error("image conversion failed: {0}")]
    Convert(String),

    #[error("invalid data URI: {0}")]
    DataUri(String),

    #[error("invalid image size {width}x{height}")]
    InvalidSize { width: i64, height: i64 },
}

impl From<ImageError> for DocError {
    fn from(err: ImageError) -> Self {
        let mut out = DocError::new(ErrorKind::ImageError, err.to_string());
        if matches!(err, ImageError::UnsupportedFormat(_)) {
            out = out.with_suggestion("use PNG or JPEG images (GIF, BMP and WebP are converted)");
        }
        out.with_cause(err)
    }
}

pub type Result<T> = std::result::Result<T, ImageError>;

/// Formats that can be embedded as-is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    Jpeg,
    Png,
}

impl ImageFormat {
    /// Magic-byte detection; anything but JPEG and PNG is rejected
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(Self::Jpeg)
        } else if data.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
            Some(Self::Png)
        } else {
            None
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
        }
    }

    fn codec(&self) -> image::ImageFormat {
        match self {
            Self::Jpeg => image::ImageFormat::Jpeg,
            Self::Png => image::ImageFormat::Png,
        }
    }
}

/// An image leaf of the data tree
#[derive(Debug, Clone, PartialEq)]
pub struct ImageHandle {
    bytes: Vec<u8>,
    format: ImageFormat,
    /// Display size in pixels (orientation already applied)
    width: u32,
    height: u32,
    dpi_x: f64,
    dpi_y: f64,
    name: String,
}

impl ImageHandle {
    pub fn from_bytes(bytes: Vec<u8>, default_dpi: f64) -> Result<Self> {
        let format = ImageFormat::from_bytes(&bytes).ok_or_else(|| {
            ImageError::UnsupportedFormat(format!("unrecognised signature {:02X?}", head(&bytes)))
        })?;
        let probe = match format {
            ImageFormat::Png => probe_png(&bytes),
            ImageFormat::Jpeg => probe_jpeg(&bytes),
        };
        let (Some(mut width), Some(mut height)) = (probe.width, probe.height) else {
            return Err(ImageError::UnsupportedFormat(format!(
                "could not read {} dimensions",
                format.extension()
            )));
        };
        if width == 0 || height == 0 {
            return Err(ImageError::InvalidSize {
                width: width as i64,
                height: height as i64,
            });
        }
        // orientations 5-8 are rotated by 90 degrees
        if matches!(probe.orientation, Some(5..=8)) {
            std::mem::swap(&mut width, &mut height);
        }
        Ok(Self {
            bytes,
            format,
            width,
            height,
            dpi_x: probe.dpi_x.unwrap_or(default_dpi),
            dpi_y: probe.dpi_y.unwrap_or(default_dpi),
            name: String::new(),
        })
    }

    /// Load a file; GIF, BMP and WebP are converted to PNG first
    pub fn from_path(path: &Path, default_dpi: f64) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|source| ImageError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        let bytes = convert_if_needed(bytes, ext.as_deref())?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::from_bytes(bytes, default_dpi)?.with_name(name))
    }

    /// `data:image/<fmt>;base64,<payload>`
    pub fn from_data_uri(uri: &str, default_dpi: f64) -> Result<Self> {
        use base64::Engine;

        let rest = uri
            .strip_prefix("data:image/")
            .ok_or_else(|| ImageError::DataUri("expected data:image/ prefix".to_string()))?;
        let (subtype, payload) = rest
            .split_once(";base64,")
            .ok_or_else(|| ImageError::DataUri("only base64 payloads are supported".to_string()))?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .map_err(|e| ImageError::DataUri(format!("base64 decoding failed: {}", e)))?;
        let subtype = subtype.to_ascii_lowercase();
        let bytes = convert_if_needed(bytes, Some(subtype.as_str()))?;
        Ok(Self::from_bytes(bytes, default_dpi)?.with_name(format!("image.{}", subtype)))
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Display size in pixels
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn dpi(&self) -> (f64, f64) {
        (self.dpi_x, self.dpi_y)
    }

    /// Display size in EMU: `pixels / dpi × 914400`
    pub fn extent_emu(&self) -> (u64, u64) {
        (
            px_to_emu(self.width, self.dpi_x),
            px_to_emu(self.height, self.dpi_y),
        )
    }

    /// Content hash used to share one media part between identical images
    pub fn digest(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.bytes.hash(&mut hasher);
        hasher.finish()
    }

    /// Nearest-neighbour resize to `width`×`height` pixels, re-encoded in the same format
    pub fn resized(&self, width: i64, height: i64) -> Result<Self> {
        if width <= 0 || height <= 0 || width > u32::MAX as i64 || height > u32::MAX as i64 {
            return Err(ImageError::InvalidSize { width, height });
        }
        let (width, height) = (width as u32, height as u32);
        let decoded = image::load_from_memory_with_format(&self.bytes, self.format.codec())
            .map_err(|e| ImageError::Convert(format!("decode failed: {}", e)))?;
        let scaled = decoded.resize_exact(width, height, image::imageops::FilterType::Nearest);
        let scaled = match self.format {
            // JPEG has no alpha channel
            ImageFormat::Jpeg => image::DynamicImage::ImageRgb8(scaled.to_rgb8()),
            ImageFormat::Png => scaled,
        };

        let mut bytes = Vec::new();
        scaled
            .write_to(&mut Cursor::new(&mut bytes), self.format.codec())
            .map_err(|e| ImageError::Convert(format!("encode failed: {}", e)))?;

        tracing::debug!(width, height, format = self.format.extension(), "resized image");
        Ok(Self {
            bytes,
            format: self.format,
            width,
            height,
            dpi_x: self.dpi_x,
            dpi_y: self.dpi_y,
            name: self.name.clone(),
        })
    }

    /// `<w:drawing>` with an inline picture referencing relationship `rel_id`
    pub fn drawing_xml(&self, rel_id: &str, doc_pr_id: u32) -> String {
        let (cx, cy) = self.extent_emu();
        let descr = escape_xml(&self.name);
        let rel_id = escape_xml(rel_id);
        format!(
            concat!(
                r#"<w:drawing><wp:inline distT="0" distB="0" distL="0" distR="0" xmlns:wp="http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing">"#,
                r#"<wp:extent cx="{cx}" cy="{cy}"/><wp:effectExtent l="0" t="0" r="0" b="0"/>"#,
                r#"<wp:docPr id="{id}" name="Picture {id}" descr="{descr}"/>"#,
                r#"<wp:cNvGraphicFramePr><a:graphicFrameLocks xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" noChangeAspect="1"/></wp:cNvGraphicFramePr>"#,
                r#"<a:graphic xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main">"#,
                r#"<a:graphicData uri="http://schemas.openxmlformats.org/drawingml/2006/picture">"#,
                r#"<pic:pic xmlns:pic="http://schemas.openxmlformats.org/drawingml/2006/picture">"#,
                r#"<pic:nvPicPr><pic:cNvPr id="0" name="Picture {id}" descr="{descr}"/><pic:cNvPicPr/></pic:nvPicPr>"#,
                r#"<pic:blipFill><a:blip r:embed="{rel}" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"/><a:stretch><a:fillRect/></a:stretch></pic:blipFill>"#,
                r#"<pic:spPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="{cx}" cy="{cy}"/></a:xfrm><a:prstGeom prst="rect"><a:avLst/></a:prstGeom></pic:spPr>"#,
                r#"</pic:pic></a:graphicData></a:graphic></wp:inline></w:drawing>"#
            ),
            cx = cx,
            cy = cy,
            id = doc_pr_id,
            descr = descr,
            rel = rel_id
        )
    }
}

/// True when the string ends with one of [`IMAGE_EXTENSIONS`]
pub fn has_image_extension(s: &str) -> bool {
    Path::new(s)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

pub fn is_data_uri(s: &str) -> bool {
    s.starts_with("data:image/") && s.contains(";base64,")
}

fn px_to_emu(px: u32, dpi: f64) -> u64 {
    let dpi = if dpi > 0.0 { dpi } else { DEFAULT_DPI };
    (px as f64 / dpi * EMU_PER_INCH).round() as u64
}

fn head(bytes: &[u8]) -> &[u8] {
    &bytes[..bytes.len().min(4)]
}

/// Converts formats Word handles poorly to PNG
fn convert_if_needed(bytes: Vec<u8>, ext: Option<&str>) -> Result<Vec<u8>> {
    if ImageFormat::from_bytes(&bytes).is_some() {
        return Ok(bytes);
    }
    match ext {
        Some("gif") | Some("bmp") | Some("webp") => convert_to_png(&bytes),
        _ if is_gif(&bytes) || is_bmp(&bytes) || is_webp(&bytes) => convert_to_png(&bytes),
        _ => Ok(bytes),
    }
}

fn convert_to_png(bytes: &[u8]) -> Result<Vec<u8>> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| ImageError::Convert(format!("decode failed: {}", e)))?;

    let mut png_bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut png_bytes), image::ImageFormat::Png)
        .map_err(|e| ImageError::Convert(format!("PNG encoding failed: {}", e)))?;
    Ok(png_bytes)
}

fn is_gif(bytes: &[u8]) -> bool {
    bytes.starts_with(b"GIF8")
}

fn is_bmp(bytes: &[u8]) -> bool {
    bytes.len() >= 26 && bytes.starts_with(b"BM")
}

fn is_webp(bytes: &[u8]) -> bool {
    bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP"
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
struct Probe {
    width: Option<u32>,
    height: Option<u32>,
    dpi_x: Option<f64>,
    dpi_y: Option<f64>,
    orientation: Option<u16>,
}

impl Probe {
    fn merge_exif(&mut self, exif: Probe) {
        self.dpi_x = exif.dpi_x.or(self.dpi_x);
        self.dpi_y = exif.dpi_y.or(self.dpi_y);
        self.orientation = exif.orientation.or(self.orientation);
    }
}

fn probe_png(data: &[u8]) -> Probe {
    let mut probe = Probe::default();
    // PNG: 8-byte sig + 4-byte chunk_len + 4-byte "IHDR" + 4-byte width + 4-byte height
    if data.len() < 24 {
        return probe;
    }
    probe.width = Some(BigEndian::read_u32(&data[16..20]));
    probe.height = Some(BigEndian::read_u32(&data[20..24]));

    // resolution comes from EXIF only; pHYs is not consulted
    let mut pos = 8;
    while pos + 8 <= data.len() {
        let len = BigEndian::read_u32(&data[pos..pos + 4]) as usize;
        let kind = &data[pos + 4..pos + 8];
        let start = pos + 8;
        let Some(end) = start.checked_add(len).filter(|&e| e <= data.len()) else {
            break;
        };
        let chunk = &data[start..end];
        match kind {
            b"eXIf" => probe.merge_exif(parse_tiff(chunk)),
            b"IDAT" | b"IEND" => break,
            _ => {}
        }
        pos = end + 4; // crc
    }
    probe
}

fn probe_jpeg(data: &[u8]) -> Probe {
    let mut probe = Probe::default();
    let mut i = 2;
    while i + 3 < data.len() {
        if data[i] != 0xFF {
            i += 1;
            continue;
        }
        let marker = data[i + 1];
        match marker {
            // padding and standalone markers
            0xFF => {
                i += 1;
                continue;
            }
            0x01 | 0xD0..=0xD7 => {
                i += 2;
                continue;
            }
            0xD9 | 0xDA => break,
            _ => {}
        }
        let seg_len = BigEndian::read_u16(&data[i + 2..i + 4]) as usize;
        let seg_start = i + 4;
        let seg_end = (i + 2 + seg_len).min(data.len());
        if seg_len < 2 || seg_start > seg_end {
            break;
        }
        let segment = &data[seg_start..seg_end];
        match marker {
            0xE1 if segment.starts_with(b"Exif\0\0") => probe.merge_exif(parse_tiff(&segment[6..])),
            // SOF0..SOF15 except DHT, JPG and DAC
            0xC0..=0xCF if !matches!(marker, 0xC4 | 0xC8 | 0xCC) => {
                if segment.len() >= 5 {
                    probe.height = Some(BigEndian::read_u16(&segment[1..3]) as u32);
                    probe.width = Some(BigEndian::read_u16(&segment[3..5]) as u32);
                }
            }
            _ => {}
        }
        i += 2 + seg_len;
    }
    probe
}

/// Resolution and orientation from a TIFF-structured EXIF block
fn parse_tiff(tiff: &[u8]) -> Probe {
    match tiff.get(0..2) {
        Some([b'I', b'I']) => parse_ifd0::<LittleEndian>(tiff),
        Some([b'M', b'M']) => parse_ifd0::<BigEndian>(tiff),
        _ => None,
    }
    .unwrap_or_default()
}

fn parse_ifd0<B: ByteOrder>(tiff: &[u8]) -> Option<Probe> {
    if B::read_u16(tiff.get(2..4)?) != 42 {
        return None;
    }
    let ifd = B::read_u32(tiff.get(4..8)?) as usize;
    let count = B::read_u16(tiff.get(ifd..ifd + 2)?) as usize;

    let mut probe = Probe::default();
    let mut unit = 2u16;
    for n in 0..count {
        let entry = tiff.get(ifd + 2 + n * 12..ifd + 14 + n * 12)?;
        let tag = B::read_u16(&entry[0..2]);
        let value = &entry[8..12];
        match tag {
            EXIF_X_RESOLUTION => probe.dpi_x = read_rational::<B>(tiff, value),
            EXIF_Y_RESOLUTION => probe.dpi_y = read_rational::<B>(tiff, value),
            EXIF_ORIENTATION => probe.orientation = Some(B::read_u16(&value[0..2])),
            EXIF_RESOLUTION_UNIT => unit = B::read_u16(&value[0..2]),
            _ => {}
        }
    }
    // 3 = centimetre
    if unit == 3 {
        probe.dpi_x = probe.dpi_x.map(|v| v * 2.54);
        probe.dpi_y = probe.dpi_y.map(|v| v * 2.54);
    }
    Some(probe)
}

/// `num/den` at the offset stored in `value`; `None` for a zero denominator
fn read_rational<B: ByteOrder>(tiff: &[u8], value: &[u8]) -> Option<f64> {
    let offset = B::read_u32(value) as usize;
    let raw = tiff.get(offset..offset + 8)?;
    let num = B::read_u32(&raw[0..4]);
    let den = B::read_u32(&raw[4..8]);
    if den == 0 || num == 0 {
        return None;
    }
    Some(num as f64 / den as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(width, height, image::Rgba([255, 0, 0, 255]));
        let mut out = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
            .unwrap();
        out
    }

    fn jpeg(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([0, 128, 255]));
        let mut out = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Jpeg)
            .unwrap();
        out
    }

    /// APP1 Exif segment (big endian) with resolution and orientation
    fn exif_segment(dpi: u32, den: u32, orientation: u16) -> Vec<u8> {
        let mut tiff = Vec::new();
        tiff.extend_from_slice(b"MM");
        tiff.extend_from_slice(&42u16.to_be_bytes());
        tiff.extend_from_slice(&8u32.to_be_bytes());
        let entries: u16 = 3;
        tiff.extend_from_slice(&entries.to_be_bytes());
        let data_offset = 8 + 2 + 12 * entries as u32 + 4;
        let mut entry = |tag: u16, kind: u16, value: [u8; 4]| {
            tiff.extend_from_slice(&tag.to_be_bytes());
            tiff.extend_from_slice(&kind.to_be_bytes());
            tiff.extend_from_slice(&1u32.to_be_bytes());
            tiff.extend_from_slice(&value);
        };
        entry(EXIF_X_RESOLUTION, 5, data_offset.to_be_bytes());
        entry(EXIF_Y_RESOLUTION, 5, (data_offset + 8).to_be_bytes());
        let o = orientation.to_be_bytes();
        entry(EXIF_ORIENTATION, 3, [o[0], o[1], 0, 0]);
        tiff.extend_from_slice(&0u32.to_be_bytes());
        for _ in 0..2 {
            tiff.extend_from_slice(&dpi.to_be_bytes());
            tiff.extend_from_slice(&den.to_be_bytes());
        }

        let mut seg = vec![0xFF, 0xE1];
        let len = (2 + 6 + tiff.len()) as u16;
        seg.extend_from_slice(&len.to_be_bytes());
        seg.extend_from_slice(b"Exif\0\0");
        seg.extend_from_slice(&tiff);
        seg
    }

    fn with_exif(jpeg: &[u8], segment: &[u8]) -> Vec<u8> {
        let mut out = jpeg[..2].to_vec();
        out.extend_from_slice(segment);
        out.extend_from_slice(&jpeg[2..]);
        out
    }

    #[test]
    fn test_png_defaults_to_72_dpi() {
        let handle = ImageHandle::from_bytes(png(100, 50), DEFAULT_DPI).unwrap();
        assert_eq!(handle.format(), ImageFormat::Png);
        assert_eq!(handle.size(), (100, 50));
        assert_eq!(handle.extent_emu(), (100 * 12700, 50 * 12700));
    }

    #[test]
    fn test_png_phys_is_ignored() {
        let plain = png(100, 50);
        // 3780 px/m, unit metre: 96 DPI
        let mut phys = vec![0, 0, 0, 9];
        phys.extend_from_slice(b"pHYs");
        phys.extend_from_slice(&3780u32.to_be_bytes());
        phys.extend_from_slice(&3780u32.to_be_bytes());
        phys.push(1);
        phys.extend_from_slice(&[0; 4]);
        // after the signature and the 25-byte IHDR chunk
        let mut bytes = plain[..33].to_vec();
        bytes.extend_from_slice(&phys);
        bytes.extend_from_slice(&plain[33..]);

        let handle = ImageHandle::from_bytes(bytes, DEFAULT_DPI).unwrap();
        assert_eq!(handle.dpi(), (72.0, 72.0));
        assert_eq!(handle.extent_emu(), (100 * 12700, 50 * 12700));
    }

    #[test]
    fn test_jpeg_dimensions() {
        let handle = ImageHandle::from_bytes(jpeg(40, 30), DEFAULT_DPI).unwrap();
        assert_eq!(handle.format(), ImageFormat::Jpeg);
        assert_eq!(handle.size(), (40, 30));
    }

    #[test]
    fn test_exif_resolution_and_orientation() {
        let bytes = with_exif(&jpeg(40, 30), &exif_segment(144, 1, 6));
        let handle = ImageHandle::from_bytes(bytes, DEFAULT_DPI).unwrap();
        assert_eq!(handle.dpi(), (144.0, 144.0));
        assert_eq!(handle.size(), (30, 40));
        assert_eq!(handle.extent_emu(), (30 * 6350, 40 * 6350));
    }

    #[test]
    fn test_zero_denominator_falls_back() {
        let bytes = with_exif(&jpeg(10, 10), &exif_segment(300, 0, 1));
        let handle = ImageHandle::from_bytes(bytes, 96.0).unwrap();
        assert_eq!(handle.dpi(), (96.0, 96.0));
    }

    #[test]
    fn test_rejects_unknown_signature() {
        let err = ImageHandle::from_bytes(b"GIF89a-not-really".to_vec(), DEFAULT_DPI).unwrap_err();
        assert!(matches!(err, ImageError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_gif_is_converted_to_png() {
        let img = image::RgbaImage::from_pixel(8, 4, image::Rgba([0, 0, 0, 255]));
        let mut gif = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut gif), image::ImageFormat::Gif)
            .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pic.gif");
        std::fs::write(&path, gif).unwrap();

        let handle = ImageHandle::from_path(&path, DEFAULT_DPI).unwrap();
        assert_eq!(handle.format(), ImageFormat::Png);
        assert_eq!(handle.size(), (8, 4));
        assert_eq!(handle.name(), "pic.gif");
    }

    #[test]
    fn test_data_uri() {
        use base64::Engine;
        let payload = base64::engine::general_purpose::STANDARD.encode(png(3, 2));
        let handle =
            ImageHandle::from_data_uri(&format!("data:image/png;base64,{}", payload), DEFAULT_DPI)
                .unwrap();
        assert_eq!(handle.size(), (3, 2));
        assert!(ImageHandle::from_data_uri("data:image/png,xyz", DEFAULT_DPI).is_err());
    }

    #[test]
    fn test_resize_keeps_format() {
        let handle = ImageHandle::from_bytes(jpeg(40, 30), DEFAULT_DPI).unwrap();
        let small = handle.resized(20, 10).unwrap();
        assert_eq!(small.format(), ImageFormat::Jpeg);
        assert_eq!(small.size(), (20, 10));
        assert_eq!(ImageFormat::from_bytes(small.bytes()), Some(ImageFormat::Jpeg));
        assert!(handle.resized(0, 10).is_err());
    }

    #[test]
    fn test_drawing_xml() {
        let handle = ImageHandle::from_bytes(png(100, 50), DEFAULT_DPI)
            .unwrap()
            .with_name("a&b.png");
        let xml = handle.drawing_xml("rId9", 4);
        assert!(xml.contains(r#"<wp:extent cx="1270000" cy="635000"/>"#));
        assert!(xml.contains(r#"r:embed="rId9""#));
        assert!(xml.contains(r#"<wp:docPr id="4" name="Picture 4" descr="a&amp;b.png"/>"#));
        assert!(crate::docx::xml::Element::parse(&xml).is_ok());
    }

    #[test]
    fn test_has_image_extension() {
        assert!(has_image_extension("/tmp/logo.PNG"));
        assert!(has_image_extension("photo.jpeg"));
        assert!(!has_image_extension("notes.txt"));
        assert!(!has_image_extension("png"));
    }
}
