//! Views over the `w:body` of `word/document.xml`.
//!
//! Paragraphs are found at any depth (table cells, content controls, text
//! boxes); runs and text nodes are always resolved relative to their nearest
//! enclosing paragraph.

use super::xml::{Element, Node, Result, XmlDocument, XmlError};

pub const PARAGRAPH: &str = "w:p";
pub const RUN: &str = "w:r";
pub const TEXT: &str = "w:t";
pub const TABLE: &str = "w:tbl";
pub const BREAK: &str = "w:br";
pub const TAB: &str = "w:tab";
const BODY: &str = "w:body";

/// Top-level item of the body
#[derive(Debug, Clone, Copy)]
pub enum BodyItem<'a> {
    Paragraph(&'a Element),
    Table(&'a Element),
    Other(&'a Element),
}

/// Parsed main document part
#[derive(Debug, Clone)]
pub struct Body {
    document: XmlDocument,
}

impl Body {
    pub fn parse(xml: &str) -> Result<Self> {
        let document = XmlDocument::parse(xml)?;
        if document.root.first_child(BODY).is_none() {
            return Err(XmlError::Malformed("document has no <w:body>".to_string()));
        }
        Ok(Self { document })
    }

    pub fn to_xml(&self) -> String {
        self.document.to_xml()
    }

    pub fn element(&self) -> &Element {
        // presence checked in parse
        self.document
            .root
            .first_child(BODY)
            .unwrap_or(&self.document.root)
    }

    pub fn element_mut(&mut self) -> &mut Element {
        if self.document.root.first_child(BODY).is_none() {
            return &mut self.document.root;
        }
        self.document
            .root
            .first_child_mut(BODY)
            .unwrap_or_else(|| unreachable!("w:body checked above"))
    }

    /// Serialised `<w:body>…</w:body>`
    pub fn body_xml(&self) -> String {
        self.element().to_xml()
    }

    /// Replace the body with a freshly parsed `<w:body>` fragment
    pub fn replace_body_xml(&mut self, xml: &str) -> Result<()> {
        let parsed = Element::parse(xml)?;
        if !parsed.is(BODY) {
            return Err(XmlError::Malformed(format!(
                "expected <{}> fragment, found <{}>",
                BODY, parsed.name
            )));
        }
        *self.element_mut() = parsed;
        Ok(())
    }

    pub fn items(&self) -> Vec<BodyItem<'_>> {
        self.element()
            .child_elements()
            .map(|el| match el.name.as_str() {
                PARAGRAPH => BodyItem::Paragraph(el),
                TABLE => BodyItem::Table(el),
                _ => BodyItem::Other(el),
            })
            .collect()
    }

    /// Every paragraph in document order, including those nested in tables
    pub fn paragraphs(&self) -> Vec<&Element> {
        let body = self.element();
        paragraph_paths(body)
            .iter()
            .filter_map(|path| body.at_path(path))
            .collect()
    }

    /// Visible text of every paragraph (`w:br` → `\n`, `w:tab` → `\t`)
    pub fn paragraph_texts(&self) -> Vec<String> {
        self.paragraphs().into_iter().map(paragraph_text).collect()
    }

    /// Text of each run, per paragraph
    pub fn run_texts(&self) -> Vec<Vec<String>> {
        self.paragraphs()
            .into_iter()
            .map(|p| runs(p).into_iter().map(run_text).collect())
            .collect()
    }

    /// Visible text of the whole body, one line per paragraph
    pub fn text(&self) -> String {
        self.paragraph_texts().join("\n")
    }
}

/// Paths of all paragraphs below `root` (nested paragraphs included), parents first
pub fn paragraph_paths(root: &Element) -> Vec<Vec<usize>> {
    fn walk(el: &Element, prefix: &mut Vec<usize>, out: &mut Vec<Vec<usize>>) {
        for (idx, child) in el.children.iter().enumerate() {
            let Node::Element(child) = child else { continue };
            prefix.push(idx);
            if child.is(PARAGRAPH) {
                out.push(prefix.clone());
            }
            walk(child, prefix, out);
            prefix.pop();
        }
    }
    let mut out = Vec::new();
    walk(root, &mut Vec::new(), &mut out);
    out
}

/// Paths of the `w:t` nodes that belong to `paragraph` itself
pub fn text_paths(paragraph: &Element) -> Vec<Vec<usize>> {
    paragraph.find_paths(TEXT, &|el| el.is(PARAGRAPH))
}

/// Runs that belong to `paragraph` (hyperlinks, insertions and content controls are looked through)
pub fn runs(paragraph: &Element) -> Vec<&Element> {
    paragraph
        .find_paths(RUN, &|el| el.is(PARAGRAPH))
        .iter()
        .filter_map(|path| paragraph.at_path(path))
        .collect()
}

pub fn run_text(run: &Element) -> String {
    let mut out = String::new();
    for child in run.child_elements() {
        match child.name.as_str() {
            TEXT => out.push_str(&child.text()),
            BREAK | "w:cr" => out.push('\n'),
            TAB => out.push('\t'),
            _ => {}
        }
    }
    out
}

pub fn paragraph_text(paragraph: &Element) -> String {
    runs(paragraph).into_iter().map(run_text).collect()
}

/// Names of the non-text children of a paragraph's runs, plus run siblings
/// such as bookmarks, in document order
pub fn non_text_children(paragraph: &Element) -> Vec<String> {
    fn walk(el: &Element, out: &mut Vec<String>) {
        for child in el.child_elements() {
            match child.name.as_str() {
                PARAGRAPH | TEXT | "w:rPr" | "w:pPr" => {}
                RUN | "w:hyperlink" | "w:ins" | "w:smartTag" | "w:sdt" | "w:sdtContent" => {
                    walk(child, out)
                }
                name => out.push(name.to_string()),
            }
        }
    }
    let mut out = Vec::new();
    walk(paragraph, &mut out);
    out
}

/// Split text nodes that contain `\n` or `\t` into `w:t`/`w:br`/`w:tab`
/// siblings. Returns the number of text nodes rewritten.
pub fn expand_line_breaks(root: &mut Element) -> usize {
    let mut rewritten = 0;
    root.visit_mut(&mut |el| {
        if !el.is(RUN) {
            return;
        }
        let needs_split = el.child_elements().any(|c| {
            c.is(TEXT) && c.text().contains(|ch| ch == '\n' || ch == '\t' || ch == '\r')
        });
        if !needs_split {
            return;
        }
        let children = std::mem::take(&mut el.children);
        for child in children {
            match child {
                Node::Element(t) if t.is(TEXT) && t.text().contains(['\n', '\t', '\r']) => {
                    rewritten += 1;
                    split_text_node(&t, &mut el.children);
                }
                other => el.children.push(other),
            }
        }
    });
    rewritten
}

fn split_text_node(t: &Element, out: &mut Vec<Node>) {
    let text = t.text().replace("\r\n", "\n").replace('\r', "\n");
    let mut segment = String::new();
    let flush = |segment: &mut String, out: &mut Vec<Node>| {
        if !segment.is_empty() {
            let mut piece = Element::new(TEXT);
            piece.set_attr("xml:space", "preserve");
            piece.set_text(std::mem::take(segment));
            out.push(Node::Element(piece));
        }
    };
    for ch in text.chars() {
        match ch {
            '\n' => {
                flush(&mut segment, out);
                out.push(Node::Element(Element::new(BREAK)));
            }
            '\t' => {
                flush(&mut segment, out);
                out.push(Node::Element(Element::new(TAB)));
            }
            c => segment.push(c),
        }
    }
    flush(&mut segment, out);
}

/// Mark every `w:t` whose text starts or ends with whitespace as space-preserving
pub fn ensure_space_preserve(root: &mut Element) {
    root.visit_mut(&mut |el| {
        if el.is(TEXT) && el.attr("xml:space").is_none() {
            let text = el.text();
            if text.starts_with(char::is_whitespace) || text.ends_with(char::is_whitespace) {
                el.set_attr("xml:space", "preserve");
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = concat!(
        r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>"#,
        r#"<w:p><w:r><w:t>Hello </w:t></w:r><w:r><w:t>World</w:t></w:r></w:p>"#,
        r#"<w:tbl><w:tr><w:tc><w:p><w:r><w:t>cell</w:t><w:tab/><w:t>x</w:t></w:r></w:p></w:tc></w:tr></w:tbl>"#,
        r#"<w:sectPr/></w:body></w:document>"#
    );

    #[test]
    fn test_items_and_paragraphs() {
        let body = Body::parse(DOC).unwrap();
        let items = body.items();
        assert_eq!(items.len(), 3);
        assert!(matches!(items[0], BodyItem::Paragraph(_)));
        assert!(matches!(items[1], BodyItem::Table(_)));
        assert_eq!(body.paragraph_texts(), vec!["Hello World", "cell\tx"]);
    }

    #[test]
    fn test_run_texts() {
        let body = Body::parse(DOC).unwrap();
        assert_eq!(body.run_texts()[0], vec!["Hello ", "World"]);
    }

    #[test]
    fn test_replace_body_xml() {
        let mut body = Body::parse(DOC).unwrap();
        body.replace_body_xml("<w:body><w:p><w:r><w:t>new</w:t></w:r></w:p></w:body>")
            .unwrap();
        assert_eq!(body.paragraph_texts(), vec!["new"]);
        assert!(body.replace_body_xml("<w:p/>").is_err());
    }

    #[test]
    fn test_expand_line_breaks() {
        let mut el = Element::parse("<w:r><w:rPr/><w:t>a\nb\tc</w:t></w:r>").unwrap();
        assert_eq!(expand_line_breaks(&mut el), 1);
        assert_eq!(
            el.to_xml(),
            concat!(
                r#"<w:r><w:rPr/><w:t xml:space="preserve">a</w:t><w:br/>"#,
                r#"<w:t xml:space="preserve">b</w:t><w:tab/><w:t xml:space="preserve">c</w:t></w:r>"#
            )
        );
    }

    #[test]
    fn test_ensure_space_preserve() {
        let mut el = Element::parse("<w:r><w:t> a</w:t><w:t>b</w:t></w:r>").unwrap();
        ensure_space_preserve(&mut el);
        assert_eq!(
            el.to_xml(),
            r#"<w:r><w:t xml:space="preserve"> a</w:t><w:t>b</w:t></w:r>"#
        );
    }

    #[test]
    fn test_non_text_children() {
        let p = Element::parse(
            r#"<w:p><w:bookmarkStart w:id="0"/><w:r><w:rPr/><w:t>a</w:t><w:br/></w:r><w:bookmarkEnd w:id="0"/></w:p>"#,
        )
        .unwrap();
        assert_eq!(
            non_text_children(&p),
            vec!["w:bookmarkStart", "w:br", "w:bookmarkEnd"]
        );
    }
}
