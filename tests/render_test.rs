mod common;

use std::collections::BTreeMap;

use common::*;
use docxtpl::{Document, ErrorKind, RenderOptions};
use pretty_assertions::assert_eq;
use serde::Serialize;
use serde_json::json;

fn render(body: &str, data: serde_json::Value) -> Document {
    init_tracing();
    let mut doc = Document::from_bytes(&docx(body)).unwrap();
    doc.render(&data).unwrap();
    doc
}

fn reopen(doc: &Document) -> (Vec<u8>, Document) {
    let bytes = doc.to_bytes().unwrap();
    let reopened = Document::from_bytes(&bytes).unwrap();
    (bytes, reopened)
}

#[test]
fn test_split_placeholder_is_merged() {
    let doc = render(&paragraph(&["{{.First", "Name}}"]), json!({"FirstName": "Ada"}));
    let (_, saved) = reopen(&doc);
    assert_eq!(saved.body().paragraph_texts(), vec!["Ada"]);
    let runs: Vec<String> = saved.body().run_texts()[0]
        .iter()
        .filter(|t| !t.is_empty())
        .cloned()
        .collect();
    assert_eq!(runs, vec!["Ada"]);
}

#[test]
fn test_range_with_line_breaks() {
    let doc = render(
        &paragraph(&["{{range .Items}}- {{.}}\n{{end}}"]),
        json!({"Items": ["a", "b", "c"]}),
    );
    assert_eq!(doc.body().paragraph_texts(), vec!["- a\n- b\n- c\n"]);
    let xml = doc.body().to_xml();
    assert_eq!(xml.matches("<w:br/>").count(), 3);
}

#[test]
fn test_missing_field_renders_empty() {
    let doc = render(&paragraph(&["{{.Price}}"]), json!({"Name": "Ada"}));
    assert_eq!(doc.body().paragraph_texts(), vec![""]);
}

#[test]
fn test_image_path_becomes_drawing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("logo.png");
    std::fs::write(&path, png(100, 50)).unwrap();

    let doc = render(&paragraph(&["{{.Logo}}"]), json!({"Logo": path.to_string_lossy()}));
    let xml = doc.body().to_xml();
    assert!(xml.contains(r#"<wp:extent cx="1270000" cy="635000"/>"#), "{}", xml);
    assert_eq!(doc.content_types().default_for("png"), Some("image/png"));

    let (bytes, saved) = reopen(&doc);
    let names = part_names(&bytes);
    assert!(names.contains(&"word/media/image1.png".to_string()));
    let rels = saved.relationships().unwrap();
    let image = rels.iter().find(|r| r.target == "media/image1.png").unwrap();
    assert!(saved.body().to_xml().contains(&format!(r#"r:embed="{}""#, image.id)));
    assert!(read_part_str(&bytes, "[Content_Types].xml").contains(r#"Extension="png""#));
}

#[test]
fn test_jpeg_registers_both_extensions() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("photo.jpg"), jpeg(20, 10)).unwrap();

    let mut doc = Document::from_bytes(&docx(&paragraph(&["{{.Photo}}"])))
        .unwrap()
        .with_options(RenderOptions::default().image_base_dir(dir.path()));
    doc.render(&json!({"Photo": "photo.jpg"})).unwrap();
    assert_eq!(doc.content_types().default_for("jpg"), Some("image/jpeg"));
    assert_eq!(doc.content_types().default_for("jpeg"), Some("image/jpeg"));
}

#[test]
fn test_link_helper_registers_relationship() {
    let doc = render(&paragraph(&[r#"{{link "https://x" "go"}}"#]), json!({}));
    let body = doc.body().to_xml();
    let (bytes, saved) = reopen(&doc);

    let rels = saved.relationships().unwrap();
    let links: Vec<_> = rels.iter().filter(|r| r.target == "https://x").collect();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].target_mode, docxtpl::docx::TargetMode::External);
    // the pre-existing styles relationship keeps rId1
    assert_ne!(links[0].id, "rId1");
    assert!(body.contains(&format!(r#"<w:hyperlink r:id="{}""#, links[0].id)));
    assert!(read_part_str(&bytes, "word/_rels/document.xml.rels").contains(r#"TargetMode="External""#));
    assert_eq!(saved.body().paragraph_texts(), vec!["go"]);
}

#[test]
fn test_same_url_shares_one_relationship() {
    let doc = render(
        &paragraph(&[r#"{{link .Url "a"}} and {{link .Url "b"}}"#]),
        json!({"Url": "https://example.com/?q=1&r=2"}),
    );
    let rels = doc.relationships().unwrap();
    let links: Vec<_> = rels
        .iter()
        .filter(|r| r.target == "https://example.com/?q=1&r=2")
        .collect();
    assert_eq!(links.len(), 1);
}

#[test]
fn test_trim_markers_strip_value_and_text() {
    let doc = render(&paragraph(&["Hello, {{-  .Name  -}} !"]), json!({"Name": " Ada "}));
    assert_eq!(doc.body().paragraph_texts(), vec!["Hello,Ada!"]);

    let doc = render(&paragraph(&["{{-  .Name  -}}"]), json!({"Name": " Ada "}));
    assert_eq!(doc.body().paragraph_texts(), vec!["Ada"]);
}

#[test]
fn test_conditionals_and_nested_fields() {
    #[derive(Serialize)]
    struct Customer {
        name: String,
        vip: bool,
        address: Option<BTreeMap<String, String>>,
    }
    #[derive(Serialize)]
    struct Data {
        customer: Customer,
    }

    let body = [
        paragraph(&["{{if .customer.vip}}Dear valued {{.customer.name}}{{else}}Hi{{end}}"]),
        paragraph(&["{{with .customer.address}}{{.city}}{{else}}no address{{end}}"]),
    ]
    .concat();
    let mut doc = Document::from_bytes(&docx(&body)).unwrap();
    doc.render(&Data {
        customer: Customer {
            name: "Ada".to_string(),
            vip: true,
            address: None,
        },
    })
    .unwrap();
    assert_eq!(doc.body().paragraph_texts(), vec!["Dear valued Ada", "no address"]);
}

#[test]
fn test_values_are_escaped() {
    let doc = render(&paragraph(&["{{.Text}}"]), json!({"Text": "<b>Tom & \"Jerry\"</b>"}));
    let (bytes, saved) = reopen(&doc);
    assert_eq!(saved.body().paragraph_texts(), vec!["<b>Tom & \"Jerry\"</b>"]);
    let xml = read_part_str(&bytes, "word/document.xml");
    assert!(xml.contains("&lt;b&gt;Tom &amp;"));
}

#[test]
fn test_header_placeholders_and_links() {
    init_tracing();
    let header = header_xml(&paragraph(&["Page for {{.Na", "me}} ", r#"{{link "https://h" "site"}}"#]));
    let bytes = docx_with(&paragraph(&["{{.Name}}"]), &[("word/header1.xml", header.as_bytes())]);
    let mut doc = Document::from_bytes(&bytes).unwrap();
    doc.render(&json!({"Name": "Ada"})).unwrap();

    let (out, saved) = reopen(&doc);
    let header = saved
        .peripheral_parts()
        .iter()
        .find(|p| p.name == "word/header1.xml")
        .unwrap();
    assert!(header.xml.contains("Page for Ada"));
    let rels = saved.part_relationships("word/header1.xml").unwrap();
    assert_eq!(rels.iter().next().unwrap().target, "https://h");
    assert!(part_names(&out).contains(&"word/_rels/header1.xml.rels".to_string()));
    // the body registry is untouched by header links
    assert!(saved
        .relationships()
        .unwrap()
        .iter()
        .all(|r| r.target != "https://h"));
}

#[test]
fn test_watermark_text_is_rendered() {
    let watermark = concat!(
        r#"<w:p><w:r><w:pict><v:shape id="PowerPlusWaterMarkObject">"#,
        r#"<v:textpath style="font-family:&quot;Calibri&quot;" string="{{.Status}}"/>"#,
        r#"</v:shape></w:pict></w:r></w:p>"#
    );
    let header = header_xml(watermark);
    let bytes = docx_with(&paragraph(&["body"]), &[("word/header1.xml", header.as_bytes())]);
    let mut doc = Document::from_bytes(&bytes).unwrap();
    doc.render(&json!({"Status": "CONFIDENTIAL"})).unwrap();
    assert!(doc.peripheral_parts()[0].xml.contains(r#"string="CONFIDENTIAL""#));
}

#[test]
fn test_watermark_data_is_not_template_code() {
    let header = header_xml(concat!(
        r#"<w:p><w:r><w:pict><v:shape id="PowerPlusWaterMarkObject">"#,
        r#"<v:textpath string="{{.Status}}"/></v:shape></w:pict></w:r></w:p>"#,
        r#"<w:p><w:r><w:t>{{.Status}}</w:t></w:r></w:p>"#
    ));
    let bytes = docx_with(&paragraph(&["{{.Status}}"]), &[("word/header1.xml", header.as_bytes())]);
    let mut doc = Document::from_bytes(&bytes).unwrap();
    doc.render(&json!({"Status": "{{.Secret}}", "Secret": "LEAKED"})).unwrap();

    let header = &doc.peripheral_parts()[0].xml;
    assert!(header.contains(r#"string="{{.Secret}}""#), "{}", header);
    assert!(header.contains(">{{.Secret}}</w:t>"), "{}", header);
    assert!(!header.contains("LEAKED"));
    assert_eq!(doc.body().paragraph_texts(), vec!["{{.Secret}}"]);
}

#[test]
fn test_core_properties_are_rendered() {
    let core = concat!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
        r#"<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" "#,
        r#"xmlns:dc="http://purl.org/dc/elements/1.1/"><dc:title>{{.Title}}</dc:title></cp:coreProperties>"#
    );
    let bytes = docx_with(&paragraph(&["x"]), &[("docProps/core.xml", core.as_bytes())]);
    let mut doc = Document::from_bytes(&bytes).unwrap();
    doc.render(&json!({"Title": "Q3 & Q4"})).unwrap();
    let out = doc.to_bytes().unwrap();
    assert!(read_part_str(&out, "docProps/core.xml").contains("<dc:title>Q3 &amp; Q4</dc:title>"));
}

#[test]
fn test_error_reports_location_and_placeholder() {
    init_tracing();
    let mut doc = Document::from_bytes(&docx(&paragraph(&["{{upper .Name}}"]))).unwrap();
    let err = doc.render(&json!({"Name": "Ada"})).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidFunction);
    assert_eq!(err.location(), Some("body"));
    assert_eq!(err.placeholder(), Some("{{upper .Name}}"));

    let header = header_xml(&paragraph(&["{{end}}"]));
    let bytes = docx_with(&paragraph(&["ok"]), &[("word/header2.xml", header.as_bytes())]);
    let mut doc = Document::from_bytes(&bytes).unwrap();
    let err = doc.render(&json!({})).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SyntaxError);
    assert_eq!(err.location(), Some("word/header2.xml"));
}

#[test]
fn test_unclosed_tag_is_reported() {
    let mut doc = Document::from_bytes(&docx(&paragraph(&["Dear {{.Name", " and more"]))).unwrap();
    let err = doc.render(&json!({"Name": "Ada"})).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnclosedTag);
    assert!(!err.suggestions().is_empty());
}

#[test]
fn test_failed_render_keeps_every_part() {
    let header = header_xml(&paragraph(&["{{.Broken"]));
    let bytes = docx_with(&paragraph(&["{{.Name}}"]), &[("word/header1.xml", header.as_bytes())]);
    let mut doc = Document::from_bytes(&bytes).unwrap();
    let before = doc.body().to_xml();

    assert!(doc.render(&json!({"Name": "Ada"})).is_err());
    assert_eq!(doc.body().to_xml(), before);
    assert!(doc.peripheral_parts()[0].xml.contains("{{.Broken"));
}

#[test]
fn test_broken_image_fails_with_image_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fake.png");
    std::fs::write(&path, b"GIF89a not really").unwrap();

    let mut doc = Document::from_bytes(&docx(&paragraph(&["{{.Logo}}"]))).unwrap();
    let err = doc.render(&json!({"Logo": path.to_string_lossy()})).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ImageError);
}

#[test]
fn test_table_rows_repeat_inside_cells() {
    let table = concat!(
        "<w:tbl><w:tr><w:tc>",
        r#"<w:p><w:r><w:t>{{range $i, $row := .Rows}}{{if $i}}, {{end}}{{$row.name}}={{printf "%.2f" $row.price}}{{end}}</w:t></w:r></w:p>"#,
        "</w:tc></w:tr></w:tbl>"
    );
    let doc = render(
        table,
        json!({"Rows": [{"name": "tea", "price": 1.5}, {"name": "cake", "price": 3.0}]}),
    );
    assert_eq!(doc.body().paragraph_texts(), vec!["tea=1.50, cake=3.00"]);
}
