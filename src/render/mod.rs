//! Placeholder processing.
//!
//! A render runs in three stages per part: the fragment merger makes every
//! `{{ … }}` contiguous, the template engine evaluates the part's XML as
//! template text, and the result is parsed back (line breaks expanded,
//! whitespace preserved). The body goes first, then headers, footers, notes
//! and document properties in archive order. Media and hyperlinks created
//! on the way are registered in the [`SideTables`] of the part being
//! rendered.

pub mod data;
pub mod image;
pub mod merger;
pub mod options;
pub mod scanner;
pub mod ser;

use std::collections::{BTreeMap, BTreeSet};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info};

pub use data::normalize;
pub use image::{ImageError, ImageFormat, ImageHandle};
pub use options::RenderOptions;
pub use ser::DataError;
pub use crate::template::Value;

use crate::docx::body::{ensure_space_preserve, expand_line_breaks, Body};
use crate::docx::content_types::ContentTypes;
use crate::docx::package::DOCUMENT_PART;
use crate::docx::relationships::{rel_type, Relationships, TargetMode};
use crate::docx::xml::{escape_xml, unescape_xml, XmlDocument, XmlError};
use crate::docx::PeripheralPart;
use crate::error::{Error, ErrorKind, Result};
use crate::template::{Engine, PartContext, TemplateError};

const BODY_LOCATION: &str = "body";
const MEDIA_DIR: &str = "word/media/";

static WATERMARK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"<v:textpath\b[^>]*?\sstring="([^"]*)""#).unwrap());

/// Brackets a masked watermark index; private-use code points never occur in
/// Word markup
const WATERMARK_MARK: (char, char) = ('\u{E000}', '\u{E001}');

static DRAWING_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r#"<wp:docPr\b[^>]*?\sid="(\d+)""#).unwrap());

/// A media part added during rendering
#[derive(Debug, Clone, PartialEq)]
pub struct MediaPart {
    pub name: String,
    pub data: Vec<u8>,
    digest: u64,
}

/// Media parts created by renders, shared by every part of the document
#[derive(Debug, Clone, Default)]
pub struct MediaStore {
    parts: Vec<MediaPart>,
    /// Media names already present in the source package
    taken: BTreeSet<String>,
}

impl MediaStore {
    pub fn new(existing: impl IntoIterator<Item = String>) -> Self {
        Self {
            parts: Vec::new(),
            taken: existing.into_iter().collect(),
        }
    }

    pub fn parts(&self) -> &[MediaPart] {
        &self.parts
    }

    /// Part name holding `image`; identical bytes share one part
    fn insert(&mut self, image: &ImageHandle) -> String {
        let digest = image.digest();
        if let Some(existing) = self
            .parts
            .iter()
            .find(|p| p.digest == digest && p.data == image.bytes())
        {
            return existing.name.clone();
        }
        let ext = image.format().extension();
        let mut n = self.parts.len() + 1;
        let name = loop {
            let candidate = format!("{}image{}.{}", MEDIA_DIR, n, ext);
            if !self.taken.contains(&candidate) && !self.parts.iter().any(|p| p.name == candidate) {
                break candidate;
            }
            n += 1;
        };
        debug!(part = %name, bytes = image.bytes().len(), "registered media");
        self.parts.push(MediaPart {
            name: name.clone(),
            data: image.bytes().to_vec(),
            digest,
        });
        name
    }
}

/// Content types, relationship catalogues and media of a document
#[derive(Debug, Clone)]
pub struct SideTables {
    pub content_types: ContentTypes,
    /// Keyed by source part name
    pub rels: BTreeMap<String, Relationships>,
    pub media: MediaStore,
    /// Next free `wp:docPr` id
    pub next_drawing_id: u32,
}

impl SideTables {
    fn rels_mut(&mut self, part: &str) -> &mut Relationships {
        self.rels
            .entry(part.to_string())
            .or_insert_with(|| Relationships::new(part))
    }
}

/// Everything a render reads and writes
#[derive(Debug, Clone)]
pub struct Parts {
    pub body: Body,
    pub peripherals: Vec<PeripheralPart>,
    pub side: SideTables,
}

impl Parts {
    pub fn new(
        body: Body,
        peripherals: Vec<PeripheralPart>,
        content_types: ContentTypes,
        rels: BTreeMap<String, Relationships>,
        media: MediaStore,
    ) -> Self {
        let highest = std::iter::once(body.to_xml())
            .chain(peripherals.iter().map(|p| p.xml.clone()))
            .flat_map(|xml| {
                DRAWING_ID
                    .captures_iter(&xml)
                    .filter_map(|c| c.get(1)?.as_str().parse::<u32>().ok())
                    .collect::<Vec<_>>()
            })
            .max()
            .unwrap_or(0);
        Self {
            body,
            peripherals,
            side: SideTables {
                content_types,
                rels,
                media,
                next_drawing_id: highest + 1,
            },
        }
    }
}

/// Counters of one render
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub parts: usize,
    /// Text slots absorbed by the fragment merger
    pub merged: usize,
    pub links: usize,
    pub images: usize,
}

/// [`PartContext`] of the part being rendered
struct PartScope<'a> {
    part: &'a str,
    side: &'a mut SideTables,
    links: usize,
    images: usize,
}

impl<'a> PartScope<'a> {
    fn new(part: &'a str, side: &'a mut SideTables) -> Self {
        Self {
            part,
            side,
            links: 0,
            images: 0,
        }
    }
}

impl PartContext for PartScope<'_> {
    fn part_name(&self) -> &str {
        self.part
    }

    fn hyperlink(&mut self, url: &str) -> String {
        self.links += 1;
        self.side
            .rels_mut(self.part)
            .get_or_add(rel_type::HYPERLINK, url, TargetMode::External)
    }

    fn embed_image(&mut self, image: &ImageHandle) -> std::result::Result<String, String> {
        let media = self.side.media.insert(image);
        self.side
            .content_types
            .ensure_media(image.format().extension());
        let target = relative_target(self.part, &media);
        let rel_id = self
            .side
            .rels_mut(self.part)
            .get_or_add(rel_type::IMAGE, &target, TargetMode::Internal);
        let drawing_id = self.side.next_drawing_id;
        self.side.next_drawing_id += 1;
        self.images += 1;
        Ok(format!(
            r#"</w:t>{}<w:t xml:space="preserve">"#,
            image.drawing_xml(&rel_id, drawing_id)
        ))
    }
}

/// Target of `media` as seen from `part`: relative when it lives below the
/// part's directory, absolute otherwise
fn relative_target(part: &str, media: &str) -> String {
    let dir = part.rsplit_once('/').map_or("", |(dir, _)| dir);
    match media.strip_prefix(dir).and_then(|rest| rest.strip_prefix('/')) {
        Some(relative) if !dir.is_empty() => relative.to_string(),
        _ => format!("/{}", media),
    }
}

/// Renders every part in place. On error `parts` may be partially
/// rendered; callers work on a copy.
pub fn render(
    parts: &mut Parts,
    engine: &Engine,
    options: &RenderOptions,
    data: &Value,
) -> Result<RenderStats> {
    let mut stats = RenderStats::default();
    render_body(parts, engine, data, &mut stats)?;

    if options.process_peripherals {
        for part in parts.peripherals.iter_mut() {
            if !part.xml.contains('{') {
                continue;
            }
            render_peripheral(part, &mut parts.side, engine, data, &mut stats)?;
        }
    }

    info!(
        parts = stats.parts,
        merged = stats.merged,
        links = stats.links,
        images = stats.images,
        "rendered document"
    );
    Ok(stats)
}

fn render_body(parts: &mut Parts, engine: &Engine, data: &Value, stats: &mut RenderStats) -> Result<()> {
    let root = parts.body.element_mut();
    let merge = merger::merge_tree(root).map_err(|e| Error::from(e).with_location(BODY_LOCATION))?;
    let straightened = merger::straighten_quotes_tree(root);
    debug!(
        paragraphs = merge.paragraphs,
        absorbed = merge.absorbed,
        straightened,
        "merged body fragments"
    );

    let xml = parts.body.body_xml();
    let mut scope = PartScope::new(DOCUMENT_PART, &mut parts.side);
    let out = engine
        .execute(&xml, data, &mut scope)
        .map_err(|e| template_error(e, BODY_LOCATION))?;
    stats.links += scope.links;
    stats.images += scope.images;

    parts
        .body
        .replace_body_xml(&out)
        .map_err(|e| invalid_output(e, BODY_LOCATION))?;
    let root = parts.body.element_mut();
    let breaks = expand_line_breaks(root);
    ensure_space_preserve(root);
    debug!(breaks, "rendered body");

    stats.parts += 1;
    stats.merged += merge.absorbed;
    Ok(())
}

fn render_peripheral(
    part: &mut PeripheralPart,
    side: &mut SideTables,
    engine: &Engine,
    data: &Value,
    stats: &mut RenderStats,
) -> Result<()> {
    let mut scope = PartScope::new(&part.name, side);

    let rendered = if part.kind.has_runs() {
        let (merged, absorbed) =
            merger::merge_raw(&part.xml).map_err(|e| Error::from(e).with_location(&part.name))?;
        stats.merged += absorbed;
        let mut xml = merger::straighten_quotes_raw(&merged);
        let mut watermarks = Vec::new();
        if part.kind.is_header_or_footer() {
            (xml, watermarks) = mask_watermarks(&xml);
        }
        let mut out = engine
            .execute(&xml, data, &mut scope)
            .map_err(|e| template_error(e, &part.name))?;
        if !watermarks.is_empty() {
            out = render_watermarks(&out, &watermarks, engine, data, &mut scope)
                .map_err(|e| template_error(e, &part.name))?;
        }
        let mut doc = XmlDocument::parse(&out).map_err(|e| invalid_output(e, &part.name))?;
        expand_line_breaks(&mut doc.root);
        ensure_space_preserve(&mut doc.root);
        doc.to_xml()
    } else {
        // property parts have no runs; newlines stay literal
        let out = engine
            .execute(&part.xml, data, &mut scope)
            .map_err(|e| template_error(e, &part.name))?;
        XmlDocument::parse(&out).map_err(|e| invalid_output(e, &part.name))?;
        out
    };

    stats.parts += 1;
    stats.links += scope.links;
    stats.images += scope.images;
    debug!(part = %part.name, links = scope.links, images = scope.images, "rendered part");
    part.xml = rendered;
    Ok(())
}

fn watermark_marker(index: usize) -> String {
    format!("{}{}{}", WATERMARK_MARK.0, index, WATERMARK_MARK.1)
}

/// Replaces templated VML watermark texts (`<v:textpath string="…">`) with
/// markers. Returns the masked markup and the decoded watermark sources.
fn mask_watermarks(xml: &str) -> (String, Vec<String>) {
    let mut out = String::with_capacity(xml.len());
    let mut sources = Vec::new();
    let mut last = 0;
    for caps in WATERMARK.captures_iter(xml) {
        let Some(value) = caps.get(1) else { continue };
        if !value.as_str().contains("{{") {
            continue;
        }
        out.push_str(&xml[last..value.start()]);
        out.push_str(&watermark_marker(sources.len()));
        sources.push(unescape_xml(value.as_str()));
        last = value.end();
    }
    out.push_str(&xml[last..]);
    (out, sources)
}

/// Evaluates each watermark source on its own and puts the result in place
/// of its marker. Runs after the part itself, so the output is never
/// evaluated again.
fn render_watermarks(
    xml: &str,
    sources: &[String],
    engine: &Engine,
    data: &Value,
    cx: &mut dyn PartContext,
) -> std::result::Result<String, TemplateError> {
    let mut out = xml.to_string();
    for (index, source) in sources.iter().enumerate() {
        let rendered = engine.execute(source, data, cx)?;
        let text = unescape_xml(&rendered).replace(['\r', '\n'], " ");
        out = out.replace(&watermark_marker(index), &escape_xml(&text));
    }
    Ok(out)
}

fn template_error(err: TemplateError, location: &str) -> Error {
    Error::from(err).with_location(location)
}

/// Evaluation produced text that no longer parses as XML
fn invalid_output(err: XmlError, location: &str) -> Error {
    Error::new(
        ErrorKind::ExecutionError,
        format!("rendered part is not well-formed XML: {}", err),
    )
    .with_location(location)
    .with_suggestion("image and link placeholders must be placed inside a text run, not between paragraphs")
    .with_cause(err)
}
