//! `[Content_Types].xml` catalogue.

use super::xml::{escape_xml, Element, Result, XmlDocument, XmlError};

pub const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
const NAMESPACE: &str = "http://schemas.openxmlformats.org/package/2006/content-types";

pub mod mime {
    pub const JPEG: &str = "image/jpeg";
    pub const PNG: &str = "image/png";
    pub const XML: &str = "application/xml";
    pub const RELATIONSHIPS: &str = "application/vnd.openxmlformats-package.relationships+xml";
    pub const DOCUMENT_MAIN: &str =
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml";
    pub const CORE_PROPERTIES: &str = "application/vnd.openxmlformats-package.core-properties+xml";
    pub const EXTENDED_PROPERTIES: &str =
        "application/vnd.openxmlformats-officedocument.extended-properties+xml";
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultEntry {
    pub extension: String,
    pub content_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverrideEntry {
    /// Absolute part name, e.g. `/word/document.xml`
    pub part_name: String,
    pub content_type: String,
}

/// Extension defaults and part-name overrides, in source order
#[derive(Debug, Clone, Default)]
pub struct ContentTypes {
    defaults: Vec<DefaultEntry>,
    overrides: Vec<OverrideEntry>,
    dirty: bool,
}

impl ContentTypes {
    pub fn parse(xml: &str) -> Result<Self> {
        let doc = XmlDocument::parse(xml)?;
        if !doc.root.name.ends_with("Types") {
            return Err(XmlError::Malformed(format!(
                "expected <Types> root, found <{}>",
                doc.root.name
            )));
        }
        let mut types = Self::default();
        for el in doc.root.child_elements() {
            match local_name(el) {
                "Default" => {
                    if let (Some(ext), Some(ct)) = (el.attr("Extension"), el.attr("ContentType")) {
                        types.defaults.push(DefaultEntry {
                            extension: ext.to_string(),
                            content_type: ct.to_string(),
                        });
                    }
                }
                "Override" => {
                    if let (Some(part), Some(ct)) = (el.attr("PartName"), el.attr("ContentType")) {
                        // duplicate overrides are collapsed on read
                        if !types.overrides.iter().any(|o| o.part_name.eq_ignore_ascii_case(part)) {
                            types.overrides.push(OverrideEntry {
                                part_name: part.to_string(),
                                content_type: ct.to_string(),
                            });
                        } else {
                            types.dirty = true;
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(types)
    }

    /// Catalogue for a freshly created package
    pub fn minimal() -> Self {
        let mut types = Self::default();
        types.ensure_default("rels", mime::RELATIONSHIPS);
        types.ensure_default("xml", mime::XML);
        types.ensure_override("/word/document.xml", mime::DOCUMENT_MAIN);
        types.ensure_override("/docProps/core.xml", mime::CORE_PROPERTIES);
        types.ensure_override("/docProps/app.xml", mime::EXTENDED_PROPERTIES);
        types
    }

    pub fn defaults(&self) -> &[DefaultEntry] {
        &self.defaults
    }

    pub fn overrides(&self) -> &[OverrideEntry] {
        &self.overrides
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn default_for(&self, extension: &str) -> Option<&str> {
        self.defaults
            .iter()
            .find(|d| d.extension.eq_ignore_ascii_case(extension))
            .map(|d| d.content_type.as_str())
    }

    pub fn override_for(&self, part_name: &str) -> Option<&str> {
        let wanted = absolute(part_name);
        self.overrides
            .iter()
            .find(|o| o.part_name.eq_ignore_ascii_case(&wanted))
            .map(|o| o.content_type.as_str())
    }

    /// Content type that applies to a part (override first, then extension default)
    pub fn content_type_of(&self, part_name: &str) -> Option<&str> {
        self.override_for(part_name).or_else(|| {
            let ext = part_name.rsplit_once('.').map(|(_, e)| e)?;
            self.default_for(ext)
        })
    }

    /// Adds an extension default unless one exists already
    pub fn ensure_default(&mut self, extension: &str, content_type: &str) {
        if self.default_for(extension).is_none() {
            self.defaults.push(DefaultEntry {
                extension: extension.to_ascii_lowercase(),
                content_type: content_type.to_string(),
            });
            self.dirty = true;
        }
    }

    /// Adds or replaces the override for a part; there is never more than one
    pub fn ensure_override(&mut self, part_name: &str, content_type: &str) {
        let part_name = absolute(part_name);
        match self
            .overrides
            .iter_mut()
            .find(|o| o.part_name.eq_ignore_ascii_case(&part_name))
        {
            Some(existing) if existing.content_type == content_type => {}
            Some(existing) => {
                existing.content_type = content_type.to_string();
                self.dirty = true;
            }
            None => {
                self.overrides.push(OverrideEntry {
                    part_name,
                    content_type: content_type.to_string(),
                });
                self.dirty = true;
            }
        }
    }

    /// Registers the defaults a media file needs. JPEG implies both `jpg` and `jpeg`.
    pub fn ensure_media(&mut self, extension: &str) {
        match extension.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => {
                self.ensure_default("jpg", mime::JPEG);
                self.ensure_default("jpeg", mime::JPEG);
            }
            "png" => self.ensure_default("png", mime::PNG),
            other => tracing::warn!(extension = other, "no content type known for media extension"),
        }
    }

    pub fn to_xml(&self) -> String {
        let mut xml = String::with_capacity(2048);
        xml.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
        xml.push_str("\r\n");
        xml.push_str(&format!(r#"<Types xmlns="{}">"#, NAMESPACE));
        for d in &self.defaults {
            xml.push_str(&format!(
                r#"<Default Extension="{}" ContentType="{}"/>"#,
                escape_xml(&d.extension),
                escape_xml(&d.content_type)
            ));
        }
        for o in &self.overrides {
            xml.push_str(&format!(
                r#"<Override PartName="{}" ContentType="{}"/>"#,
                escape_xml(&o.part_name),
                escape_xml(&o.content_type)
            ));
        }
        xml.push_str("</Types>");
        xml
    }
}

fn local_name(el: &Element) -> &str {
    el.name.rsplit_once(':').map(|(_, l)| l).unwrap_or(&el.name)
}

fn absolute(part_name: &str) -> String {
    if part_name.starts_with('/') {
        part_name.to_string()
    } else {
        format!("/{}", part_name)
    }
}
