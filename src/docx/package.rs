use std::collections::BTreeMap;
use std::io::{Cursor, Read, Seek, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{Error, Result};

pub const DOCUMENT_PART: &str = "word/document.xml";

/// Role of a part inside the .docx container, decided from its path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartKind {
    Body,
    Header,
    Footer,
    Footnotes,
    Endnotes,
    CoreProperties,
    AppProperties,
    ContentTypes,
    Relationships,
    Media,
    Other,
}

impl PartKind {
    pub fn classify(name: &str) -> Self {
        let lower = name.to_ascii_lowercase();
        if lower == DOCUMENT_PART {
            return Self::Body;
        }
        if lower == "[content_types].xml" {
            return Self::ContentTypes;
        }
        if lower.ends_with(".rels") {
            return Self::Relationships;
        }
        if lower.starts_with("word/media/") {
            return Self::Media;
        }
        match lower.as_str() {
            "word/footnotes.xml" => return Self::Footnotes,
            "word/endnotes.xml" => return Self::Endnotes,
            "docprops/core.xml" => return Self::CoreProperties,
            "docprops/app.xml" => return Self::AppProperties,
            _ => {}
        }
        if let Some(file) = lower.strip_prefix("word/") {
            if !file.contains('/') && file.ends_with(".xml") {
                if file.starts_with("header") {
                    return Self::Header;
                }
                if file.starts_with("footer") {
                    return Self::Footer;
                }
            }
        }
        Self::Other
    }

    /// Headers, footers, notes and document properties
    pub fn is_peripheral(&self) -> bool {
        matches!(
            self,
            Self::Header
                | Self::Footer
                | Self::Footnotes
                | Self::Endnotes
                | Self::CoreProperties
                | Self::AppProperties
        )
    }

    /// Parts made of paragraphs and runs (as opposed to flat property lists)
    pub fn has_runs(&self) -> bool {
        matches!(
            self,
            Self::Body | Self::Header | Self::Footer | Self::Footnotes | Self::Endnotes
        )
    }

    /// Parts that may carry a VML watermark
    pub fn is_header_or_footer(&self) -> bool {
        matches!(self, Self::Header | Self::Footer)
    }
}

/// One archive entry with its exact original path
#[derive(Debug, Clone)]
pub struct Entry {
    pub name: String,
    pub data: Vec<u8>,
    pub is_dir: bool,
    compression: CompressionMethod,
}

impl Entry {
    pub fn kind(&self) -> PartKind {
        PartKind::classify(&self.name)
    }

    pub fn as_str(&self) -> Result<&str> {
        std::str::from_utf8(&self.data).map_err(|e| {
            Error::corrupt(format!("part {} is not valid UTF-8", self.name)).with_cause(e)
        })
    }
}

/// The raw ZIP container, entries kept in central-directory order
#[derive(Debug, Clone, Default)]
pub struct Package {
    entries: Vec<Entry>,
}

impl Package {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_reader(Cursor::new(bytes))
    }

    pub fn from_reader<R: Read + Seek>(reader: R) -> Result<Self> {
        let mut archive = ZipArchive::new(reader).map_err(|e| {
            Error::corrupt(format!("not a readable ZIP archive: {}", e)).with_cause(e)
        })?;

        let mut entries = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            let name = file.name().to_string();
            let is_dir = file.is_dir();
            let compression = file.compression();
            let mut data = Vec::with_capacity(file.size() as usize);
            if !is_dir {
                file.read_to_end(&mut data).map_err(|e| {
                    Error::corrupt(format!("failed to inflate {}: {}", name, e)).with_cause(e)
                })?;
            }
            entries.push(Entry {
                name,
                data,
                is_dir,
                compression,
            });
        }

        let package = Self { entries };
        if package.get(DOCUMENT_PART).is_none() {
            return Err(Error::corrupt(format!("archive has no {}", DOCUMENT_PART))
                .with_suggestion("make sure the input is a Word .docx file, not .doc or .dotx"));
        }
        tracing::debug!(entries = package.entries.len(), "opened package");
        Ok(package)
    }

    /// Package made of the given parts, in order (all deflated)
    pub fn from_parts(parts: Vec<(String, Vec<u8>)>) -> Self {
        let entries = parts
            .into_iter()
            .map(|(name, data)| Entry {
                name,
                data,
                is_dir: false,
                compression: CompressionMethod::Deflated,
            })
            .collect();
        Self { entries }
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn get(&self, name: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Part as UTF-8 text
    pub fn get_str(&self, name: &str) -> Result<Option<&str>> {
        self.get(name).map(Entry::as_str).transpose()
    }

    /// Write a new archive: every original entry in order (substituted when
    /// `replacements` names it), then `additions` not already present.
    pub fn write<W: Write + Seek>(
        &self,
        writer: W,
        replacements: &BTreeMap<String, Vec<u8>>,
        additions: &[(String, Vec<u8>)],
    ) -> Result<()> {
        let mut zip = ZipWriter::new(writer);
        let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);

        for entry in &self.entries {
            if entry.is_dir {
                zip.add_directory(entry.name.as_str(), deflated)
                    .map_err(|e| Error::write(format!("{}: {}", entry.name, e)).with_cause(e))?;
                continue;
            }
            let data = replacements.get(&entry.name).unwrap_or(&entry.data);
            let options = match entry.compression {
                CompressionMethod::Stored => stored,
                _ => deflated,
            };
            write_entry(&mut zip, &entry.name, data, options)?;
        }

        for (name, data) in additions {
            if self.contains(name) {
                continue;
            }
            // media is already compressed
            let options = if PartKind::classify(name) == PartKind::Media {
                stored
            } else {
                deflated
            };
            write_entry(&mut zip, name, data, options)?;
        }

        zip.finish()
            .map_err(|e| Error::write(format!("failed to finish archive: {}", e)).with_cause(e))?;
        Ok(())
    }

    pub fn to_bytes(
        &self,
        replacements: &BTreeMap<String, Vec<u8>>,
        additions: &[(String, Vec<u8>)],
    ) -> Result<Vec<u8>> {
        let mut buffer = Cursor::new(Vec::new());
        self.write(&mut buffer, replacements, additions)?;
        Ok(buffer.into_inner())
    }
}

fn write_entry<W: Write + Seek>(
    zip: &mut ZipWriter<W>,
    name: &str,
    data: &[u8],
    options: SimpleFileOptions,
) -> Result<()> {
    zip.start_file(name, options)
        .map_err(|e| Error::write(format!("{}: {}", name, e)).with_cause(e))?;
    zip.write_all(data)
        .map_err(|e| Error::write(format!("{}: {}", name, e)).with_cause(e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_classify() {
        assert_eq!(PartKind::classify("word/document.xml"), PartKind::Body);
        assert_eq!(PartKind::classify("word/header2.xml"), PartKind::Header);
        assert_eq!(PartKind::classify("word/footer1.xml"), PartKind::Footer);
        assert_eq!(PartKind::classify("word/footnotes.xml"), PartKind::Footnotes);
        assert_eq!(PartKind::classify("word/endnotes.xml"), PartKind::Endnotes);
        assert_eq!(PartKind::classify("docProps/core.xml"), PartKind::CoreProperties);
        assert_eq!(PartKind::classify("docProps/app.xml"), PartKind::AppProperties);
        assert_eq!(PartKind::classify("[Content_Types].xml"), PartKind::ContentTypes);
        assert_eq!(
            PartKind::classify("word/_rels/header2.xml.rels"),
            PartKind::Relationships
        );
        assert_eq!(PartKind::classify("word/media/image1.png"), PartKind::Media);
        assert_eq!(PartKind::classify("word/styles.xml"), PartKind::Other);
        assert_eq!(PartKind::classify("word/theme/header.xml"), PartKind::Other);
    }

    #[test]
    fn test_garbage_is_corrupt_container() {
        let err = Package::from_bytes(b"definitely not a zip").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CorruptContainer);
    }

    #[test]
    fn test_missing_body_is_corrupt_container() {
        let bytes = Package::from_parts(vec![("a.txt".to_string(), b"x".to_vec())])
            .to_bytes(&BTreeMap::new(), &[])
            .unwrap();
        let err = Package::from_bytes(&bytes).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CorruptContainer);
    }

    #[test]
    fn test_write_substitutes_and_appends() {
        let package = Package::from_parts(vec![
            (DOCUMENT_PART.to_string(), b"<old/>".to_vec()),
            ("word/styles.xml".to_string(), b"<styles/>".to_vec()),
        ]);
        let mut replacements = BTreeMap::new();
        replacements.insert(DOCUMENT_PART.to_string(), b"<new/>".to_vec());
        let additions = vec![("word/media/image1.png".to_string(), vec![1, 2, 3])];

        let bytes = package.to_bytes(&replacements, &additions).unwrap();
        let reread = Package::from_bytes(&bytes).unwrap();
        let names: Vec<_> = reread.entries().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(
            names,
            vec![DOCUMENT_PART, "word/styles.xml", "word/media/image1.png"]
        );
        assert_eq!(reread.get_str(DOCUMENT_PART).unwrap(), Some("<new/>"));
    }
}
