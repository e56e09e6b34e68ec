//! Minimal part set of an empty Word document.

use super::content_types::{ContentTypes, CONTENT_TYPES_PART};
use super::package::DOCUMENT_PART;
use super::relationships::{rel_type, Relationships, TargetMode};

pub const WORDML_NAMESPACES: &str = concat!(
    r#"xmlns:wpc="http://schemas.microsoft.com/office/word/2010/wordprocessingCanvas" "#,
    r#"xmlns:mc="http://schemas.openxmlformats.org/markup-compatibility/2006" "#,
    r#"xmlns:o="urn:schemas-microsoft-com:office:office" "#,
    r#"xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" "#,
    r#"xmlns:m="http://schemas.openxmlformats.org/officeDocument/2006/math" "#,
    r#"xmlns:v="urn:schemas-microsoft-com:vml" "#,
    r#"xmlns:wp="http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing" "#,
    r#"xmlns:w10="urn:schemas-microsoft-com:office:word" "#,
    r#"xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main" "#,
    r#"xmlns:wne="http://schemas.microsoft.com/office/word/2006/wordml" "#,
    r#"xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" "#,
    r#"xmlns:pic="http://schemas.openxmlformats.org/drawingml/2006/picture""#
);

/// `word/document.xml` around the given body content
pub fn document_xml(body_content: &str) -> String {
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
            "\r\n",
            r#"<w:document {}><w:body>{}"#,
            r#"<w:sectPr><w:pgSz w:w="11906" w:h="16838"/>"#,
            r#"<w:pgMar w:top="1440" w:right="1440" w:bottom="1440" w:left="1440" w:header="708" w:footer="708" w:gutter="0"/>"#,
            r#"</w:sectPr></w:body></w:document>"#
        ),
        WORDML_NAMESPACES, body_content
    )
}

pub fn core_properties_xml() -> String {
    concat!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
        "\r\n",
        r#"<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" "#,
        r#"xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:dcterms="http://purl.org/dc/terms/" "#,
        r#"xmlns:dcmitype="http://purl.org/dc/dcmitype/" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">"#,
        r#"<dc:title></dc:title><dc:creator></dc:creator>"#,
        r#"</cp:coreProperties>"#
    )
    .to_string()
}

pub fn app_properties_xml() -> String {
    concat!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
        "\r\n",
        r#"<Properties xmlns="http://schemas.openxmlformats.org/officeDocument/2006/extended-properties" "#,
        r#"xmlns:vt="http://schemas.openxmlformats.org/officeDocument/2006/docPropsVTypes">"#,
        r#"<Application>docxtpl</Application></Properties>"#
    )
    .to_string()
}

/// Every part of an empty document, in archive order
pub fn parts() -> Vec<(String, Vec<u8>)> {
    let mut package_rels = Relationships::new("");
    package_rels.add(rel_type::OFFICE_DOCUMENT, DOCUMENT_PART, TargetMode::Internal);
    package_rels.add(rel_type::CORE_PROPERTIES, "docProps/core.xml", TargetMode::Internal);
    package_rels.add(rel_type::EXTENDED_PROPERTIES, "docProps/app.xml", TargetMode::Internal);

    let document_rels = Relationships::new(DOCUMENT_PART);

    vec![
        (
            CONTENT_TYPES_PART.to_string(),
            ContentTypes::minimal().to_xml().into_bytes(),
        ),
        (package_rels.part_name(), package_rels.to_xml().into_bytes()),
        (DOCUMENT_PART.to_string(), document_xml("").into_bytes()),
        (document_rels.part_name(), document_rels.to_xml().into_bytes()),
        ("docProps/core.xml".to_string(), core_properties_xml().into_bytes()),
        ("docProps/app.xml".to_string(), app_properties_xml().into_bytes()),
    ]
}
