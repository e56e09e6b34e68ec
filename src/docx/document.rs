use std::collections::BTreeMap;
use std::fs;
use std::io::{Read, Seek, Write};
use std::path::Path;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::blank;
use super::body::Body;
use super::content_types::{mime, ContentTypes, CONTENT_TYPES_PART};
use super::package::{Package, PartKind, DOCUMENT_PART};
use super::relationships::{source_part_name, Relationships};
use crate::error::{Error, Result};
use crate::render::{self, normalize, MediaPart, MediaStore, Parts, RenderOptions};
use crate::template::{Engine, HelperError, PartContext, Value};

/// A header, footer, notes or document-properties part, kept as raw XML
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeripheralPart {
    pub name: String,
    pub kind: PartKind,
    pub xml: String,
}

/// A .docx template.
///
/// ```no_run
/// use docxtpl::Document;
/// use serde_json::json;
///
/// let mut doc = Document::open("invoice.docx")?;
/// doc.render(&json!({"Customer": "Ada", "Items": ["a", "b"]}))?;
/// doc.save("invoice-ada.docx")?;
/// # Ok::<(), docxtpl::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct Document {
    package: Package,
    parts: Parts,
    engine: Engine,
    options: RenderOptions,
    renders: usize,
}

impl Document {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|e| Error::from(e).with_location(path.display().to_string()))?;
        Self::from_bytes(&bytes).map_err(|e| e.or_location(path.display().to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_package(Package::from_bytes(bytes)?)
    }

    pub fn from_reader<R: Read + Seek>(reader: R) -> Result<Self> {
        Self::from_package(Package::from_reader(reader)?)
    }

    /// An empty document
    pub fn new() -> Result<Self> {
        Self::from_package(Package::from_parts(blank::parts()))
    }

    fn from_package(package: Package) -> Result<Self> {
        let body_xml = package
            .get_str(DOCUMENT_PART)?
            .ok_or_else(|| Error::corrupt(format!("archive has no {}", DOCUMENT_PART)))?;
        let body = Body::parse(body_xml).map_err(|e| Error::from(e).with_location(DOCUMENT_PART))?;

        let content_types = match package.get_str(CONTENT_TYPES_PART)? {
            Some(xml) => {
                ContentTypes::parse(xml).map_err(|e| Error::from(e).with_location(CONTENT_TYPES_PART))?
            }
            None => {
                warn!("package has no {}; starting from a minimal catalogue", CONTENT_TYPES_PART);
                ContentTypes::minimal()
            }
        };

        let mut rels = BTreeMap::new();
        let mut peripherals = Vec::new();
        let mut media = Vec::new();
        for entry in package.entries().iter().filter(|e| !e.is_dir) {
            let kind = entry.kind();
            match kind {
                PartKind::Relationships => {
                    let Some(source) = source_part_name(&entry.name) else {
                        continue;
                    };
                    let parsed = Relationships::parse(source.clone(), entry.as_str()?)
                        .map_err(|e| Error::from(e).with_location(entry.name.clone()))?;
                    rels.insert(source, parsed);
                }
                PartKind::Media => media.push(entry.name.clone()),
                _ if kind.is_peripheral() => peripherals.push(PeripheralPart {
                    name: entry.name.clone(),
                    kind,
                    xml: entry.as_str()?.to_string(),
                }),
                _ => {}
            }
        }
        debug!(
            peripherals = peripherals.len(),
            rels = rels.len(),
            media = media.len(),
            "loaded document"
        );

        let parts = Parts::new(body, peripherals, content_types, rels, MediaStore::new(media));
        Ok(Self {
            package,
            parts,
            engine: Engine::new(),
            options: RenderOptions::default(),
            renders: 0,
        })
    }

    pub fn with_options(mut self, options: RenderOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    /// Adds a helper visible to this document only
    pub fn register_helper<F>(&mut self, name: &str, helper: F) -> Result<()>
    where
        F: Fn(&mut dyn PartContext, &[Value]) -> std::result::Result<Value, HelperError>
            + Send
            + Sync
            + 'static,
    {
        self.engine.helpers_mut().insert(name, helper)?;
        Ok(())
    }

    /// Evaluates every placeholder against `data`.
    ///
    /// Either every part renders or the document is left as it was.
    pub fn render<T: Serialize + ?Sized>(&mut self, data: &T) -> Result<()> {
        if self.renders > 0 {
            warn!(renders = self.renders, "document was already rendered; rendering its output again");
        }
        let value = normalize(data, &self.options)?;
        let engine = self.engine.clone().missing_key(self.options.missing_key);

        let mut parts = self.parts.clone();
        render::render(&mut parts, &engine, &self.options, &value)?;
        self.parts = parts;
        self.renders += 1;
        Ok(())
    }

    /// Serialises the document, patching content types and relationships
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let (replacements, additions) = self.collect_parts();
        let bytes = self.package.to_bytes(&replacements, &additions)?;
        info!(
            bytes = bytes.len(),
            replaced = replacements.len(),
            added = additions.len(),
            "serialised document"
        );
        Ok(bytes)
    }

    pub fn write_to<W: Write + Seek>(&self, writer: W) -> Result<()> {
        let (replacements, additions) = self.collect_parts();
        self.package.write(writer, &replacements, &additions)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let bytes = self.to_bytes()?;
        fs::write(path, bytes).map_err(|e| {
            Error::write(format!("failed to write {}: {}", path.display(), e))
                .with_location(path.display().to_string())
                .with_cause(e)
        })
    }

    /// Parts to substitute and parts to append when writing the archive
    fn collect_parts(&self) -> (BTreeMap<String, Vec<u8>>, Vec<(String, Vec<u8>)>) {
        let side = &self.parts.side;
        let mut content_types = side.content_types.clone();
        let mut replacements = BTreeMap::new();
        let mut additions = Vec::new();

        replacements.insert(DOCUMENT_PART.to_string(), self.parts.body.to_xml().into_bytes());
        for part in &self.parts.peripherals {
            replacements.insert(part.name.clone(), part.xml.clone().into_bytes());
        }

        for rels in side.rels.values().filter(|r| r.is_dirty()) {
            let name = rels.part_name();
            let xml = rels.to_xml().into_bytes();
            if self.package.contains(&name) {
                replacements.insert(name, xml);
            } else {
                content_types.ensure_default("rels", mime::RELATIONSHIPS);
                additions.push((name, xml));
            }
        }

        for MediaPart { name, data, .. } in side.media.parts() {
            if let Some((_, ext)) = name.rsplit_once('.') {
                content_types.ensure_media(ext);
            }
            additions.push((name.clone(), data.clone()));
        }

        let types_xml = content_types.to_xml().into_bytes();
        if !self.package.contains(CONTENT_TYPES_PART) {
            additions.insert(0, (CONTENT_TYPES_PART.to_string(), types_xml));
        } else if content_types.is_dirty() {
            replacements.insert(CONTENT_TYPES_PART.to_string(), types_xml);
        }
        (replacements, additions)
    }

    pub fn body(&self) -> &Body {
        &self.parts.body
    }

    /// Replaces the content of the body with a `<w:body>…</w:body>` fragment
    pub fn set_body_xml(&mut self, xml: &str) -> Result<()> {
        self.parts
            .body
            .replace_body_xml(xml)
            .map_err(|e| Error::from(e).with_location(DOCUMENT_PART))
    }

    pub fn peripheral_parts(&self) -> &[PeripheralPart] {
        &self.parts.peripherals
    }

    pub fn content_types(&self) -> &ContentTypes {
        &self.parts.side.content_types
    }

    /// Relationships of the main document part
    pub fn relationships(&self) -> Option<&Relationships> {
        self.part_relationships(DOCUMENT_PART)
    }

    pub fn part_relationships(&self, part: &str) -> Option<&Relationships> {
        self.parts.side.rels.get(part)
    }

    /// Media added by renders
    pub fn media(&self) -> &[MediaPart] {
        self.parts.side.media.parts()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::template::MissingKey;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn with_body(body: &str) -> Document {
        let mut doc = Document::new().unwrap();
        doc.set_body_xml(&format!("<w:body>{}</w:body>", body)).unwrap();
        doc
    }

    #[test]
    fn test_blank_document_round_trips() {
        let doc = Document::new().unwrap();
        let reopened = Document::from_bytes(&doc.to_bytes().unwrap()).unwrap();
        assert!(reopened.body().paragraph_texts().is_empty());
        assert!(reopened.relationships().is_some());
    }

    #[test]
    fn test_render_and_reopen() {
        let mut doc = with_body("<w:p><w:r><w:t>Dear {{.Name}},</w:t></w:r></w:p>");
        doc.render(&json!({"Name": "Ada & Bob"})).unwrap();
        let reopened = Document::from_bytes(&doc.to_bytes().unwrap()).unwrap();
        assert_eq!(reopened.body().paragraph_texts(), vec!["Dear Ada & Bob,"]);
    }

    #[test]
    fn test_failed_render_leaves_document_untouched() {
        let mut doc = with_body(concat!(
            "<w:p><w:r><w:t>{{.Name}}</w:t></w:r></w:p>",
            "<w:p><w:r><w:t>{{if .X}}</w:t></w:r></w:p>"
        ));
        let before = doc.body().to_xml();
        let err = doc.render(&json!({"Name": "Ada"})).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SyntaxError);
        assert_eq!(err.location(), Some("body"));
        assert_eq!(doc.body().to_xml(), before);
    }

    #[test]
    fn test_document_helpers_are_local() {
        let mut doc = with_body("<w:p><w:r><w:t>{{shout .Name}}</w:t></w:r></w:p>");
        doc.register_helper("shout", |_: &mut dyn PartContext, args: &[Value]| {
            Ok::<_, HelperError>(Value::markup(args[0].to_text().to_uppercase()))
        })
        .unwrap();
        doc.render(&json!({"Name": "ada"})).unwrap();
        assert_eq!(doc.body().paragraph_texts(), vec!["ADA"]);

        let mut other = with_body("<w:p><w:r><w:t>{{shout .Name}}</w:t></w:r></w:p>");
        let err = other.render(&json!({"Name": "ada"})).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidFunction);
    }

    #[test]
    fn test_strict_missing_key() {
        let mut doc = with_body("<w:p><w:r><w:t>{{.Price}}</w:t></w:r></w:p>")
            .with_options(RenderOptions::default().missing_key(MissingKey::Error));
        let err = doc.render(&json!({})).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UndefinedField);
    }

    #[test]
    fn test_hyperlink_rels_are_patched_on_save() {
        let mut doc = with_body(r#"<w:p><w:r><w:t>{{link "https://x" "go"}}</w:t></w:r></w:p>"#);
        doc.render(&json!({})).unwrap();
        let reopened = Document::from_bytes(&doc.to_bytes().unwrap()).unwrap();
        let rels = reopened.relationships().unwrap();
        let link = rels
            .iter()
            .find(|r| r.target == "https://x")
            .unwrap();
        assert_eq!(link.target_mode, crate::docx::relationships::TargetMode::External);
        assert!(reopened.body().to_xml().contains(&format!("r:id=\"{}\"", link.id)));
    }

    #[test]
    fn test_bad_body_xml_is_corrupt() {
        let mut doc = Document::new().unwrap();
        let err = doc.set_body_xml("<w:body><w:p></w:body>").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CorruptContainer);
    }
}
