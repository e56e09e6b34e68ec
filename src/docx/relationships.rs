//! Relationship catalogues (`*.rels` parts).

use super::xml::{escape_xml, Result, XmlDocument, XmlError};

const NAMESPACE: &str = "http://schemas.openxmlformats.org/package/2006/relationships";

pub mod rel_type {
    pub const HYPERLINK: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink";
    pub const IMAGE: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";
    pub const OFFICE_DOCUMENT: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";
    pub const CORE_PROPERTIES: &str =
        "http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties";
    pub const EXTENDED_PROPERTIES: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/extended-properties";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TargetMode {
    #[default]
    Internal,
    External,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub id: String,
    pub rel_type: String,
    pub target: String,
    pub target_mode: TargetMode,
}

/// Name of the `.rels` part holding the relationships of `source_part`.
///
/// `word/document.xml` → `word/_rels/document.xml.rels`, the package itself
/// (empty source) → `_rels/.rels`.
pub fn rels_part_name(source_part: &str) -> String {
    match source_part.rsplit_once('/') {
        Some((dir, file)) => format!("{}/_rels/{}.rels", dir, file),
        None if source_part.is_empty() => "_rels/.rels".to_string(),
        None => format!("_rels/{}.rels", source_part),
    }
}

/// Inverse of [`rels_part_name`]
pub fn source_part_name(rels_part: &str) -> Option<String> {
    let file = rels_part.strip_suffix(".rels")?;
    let (dir, name) = file.rsplit_once("_rels/")?;
    Some(format!("{}{}", dir, name))
}

/// Ordered relationship set of one source part
#[derive(Debug, Clone)]
pub struct Relationships {
    source_part: String,
    rels: Vec<Relationship>,
    dirty: bool,
}

impl Relationships {
    pub fn new(source_part: impl Into<String>) -> Self {
        Self {
            source_part: source_part.into(),
            rels: Vec::new(),
            dirty: false,
        }
    }

    pub fn parse(source_part: impl Into<String>, xml: &str) -> Result<Self> {
        let doc = XmlDocument::parse(xml)?;
        if !doc.root.name.ends_with("Relationships") {
            return Err(XmlError::Malformed(format!(
                "expected <Relationships> root, found <{}>",
                doc.root.name
            )));
        }
        let mut rels = Self::new(source_part);
        for el in doc.root.child_elements() {
            let (Some(id), Some(rel_type), Some(target)) =
                (el.attr("Id"), el.attr("Type"), el.attr("Target"))
            else {
                continue;
            };
            let target_mode = match el.attr("TargetMode") {
                Some(mode) if mode.eq_ignore_ascii_case("External") => TargetMode::External,
                _ => TargetMode::Internal,
            };
            rels.rels.push(Relationship {
                id: id.to_string(),
                rel_type: rel_type.to_string(),
                target: target.to_string(),
                target_mode,
            });
        }
        Ok(rels)
    }

    pub fn source_part(&self) -> &str {
        &self.source_part
    }

    pub fn part_name(&self) -> String {
        rels_part_name(&self.source_part)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn len(&self) -> usize {
        self.rels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Relationship> {
        self.rels.iter()
    }

    pub fn get(&self, id: &str) -> Option<&Relationship> {
        self.rels.iter().find(|r| r.id == id)
    }

    /// First id of the form `rIdN` that is not taken, counting up from the
    /// highest numeric suffix already present
    pub fn next_id(&self) -> String {
        let highest = self
            .rels
            .iter()
            .filter_map(|r| r.id.strip_prefix("rId"))
            .filter_map(|n| n.parse::<u32>().ok())
            .max()
            .unwrap_or(0);
        let mut n = highest + 1;
        loop {
            let candidate = format!("rId{}", n);
            if self.get(&candidate).is_none() {
                return candidate;
            }
            n += 1;
        }
    }

    pub fn add(&mut self, rel_type: &str, target: &str, target_mode: TargetMode) -> String {
        let id = self.next_id();
        self.rels.push(Relationship {
            id: id.clone(),
            rel_type: rel_type.to_string(),
            target: target.to_string(),
            target_mode,
        });
        self.dirty = true;
        id
    }

    /// Id of an existing relationship with the same type, target and mode, or a new one
    pub fn get_or_add(&mut self, rel_type: &str, target: &str, target_mode: TargetMode) -> String {
        if let Some(existing) = self
            .rels
            .iter()
            .find(|r| r.rel_type == rel_type && r.target == target && r.target_mode == target_mode)
        {
            return existing.id.clone();
        }
        self.add(rel_type, target, target_mode)
    }

    pub fn to_xml(&self) -> String {
        let mut xml = String::with_capacity(1024);
        xml.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
        xml.push_str("\r\n");
        xml.push_str(&format!(r#"<Relationships xmlns="{}">"#, NAMESPACE));
        for rel in &self.rels {
            xml.push_str(&format!(
                r#"<Relationship Id="{}" Type="{}" Target="{}""#,
                escape_xml(&rel.id),
                escape_xml(&rel.rel_type),
                escape_xml(&rel.target)
            ));
            if rel.target_mode == TargetMode::External {
                xml.push_str(r#" TargetMode="External""#);
            }
            xml.push_str("/>");
        }
        xml.push_str("</Relationships>");
        xml
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = concat!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
        r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
        r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>"#,
        r#"<Relationship Id="rId7" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink" Target="https://a.example/?x=1&amp;y=2" TargetMode="External"/>"#,
        r#"</Relationships>"#
    );

    #[test]
    fn test_rels_part_name() {
        assert_eq!(rels_part_name("word/document.xml"), "word/_rels/document.xml.rels");
        assert_eq!(rels_part_name(""), "_rels/.rels");
        assert_eq!(
            source_part_name("word/_rels/header1.xml.rels").as_deref(),
            Some("word/header1.xml")
        );
        assert_eq!(source_part_name("_rels/.rels").as_deref(), Some(""));
    }

    #[test]
    fn test_parse_unescapes_targets() {
        let rels = Relationships::parse("word/document.xml", SAMPLE).unwrap();
        assert_eq!(rels.len(), 2);
        let link = rels.get("rId7").unwrap();
        assert_eq!(link.target, "https://a.example/?x=1&y=2");
        assert_eq!(link.target_mode, TargetMode::External);
    }

    #[test]
    fn test_new_ids_do_not_collide() {
        let mut rels = Relationships::parse("word/document.xml", SAMPLE).unwrap();
        let id = rels.add(rel_type::HYPERLINK, "https://b.example", TargetMode::External);
        assert_eq!(id, "rId8");
        assert!(rels.is_dirty());
    }

    #[test]
    fn test_get_or_add_reuses() {
        let mut rels = Relationships::new("word/document.xml");
        let a = rels.get_or_add(rel_type::HYPERLINK, "https://x", TargetMode::External);
        let b = rels.get_or_add(rel_type::HYPERLINK, "https://x", TargetMode::External);
        assert_eq!(a, b);
        assert_eq!(rels.len(), 1);
    }

    #[test]
    fn test_to_xml_marks_external() {
        let mut rels = Relationships::new("word/document.xml");
        rels.add(rel_type::HYPERLINK, "https://x?a&b", TargetMode::External);
        let xml = rels.to_xml();
        assert!(xml.contains(r#"Target="https://x?a&amp;b" TargetMode="External""#));
    }
}
