//! Fragment merger.
//!
//! Word splits text into runs whenever editing history, spell checking or
//! formatting changes, so `{{.FirstName}}` regularly arrives as
//! `["{{.First", "Name}}"]`. The merger moves text forward into the run
//! that opened the placeholder until the delimiters balance again. Absorbed
//! runs keep their formatting and non-text children and only lose their text.
//!
//! Two front ends share the same core ([`coalesce`]): a tree walker for the
//! parsed body and a raw-string walker for peripheral parts.

use thiserror::Error;

use super::scanner::{self, Trailing};
use crate::docx::body::{paragraph_paths, text_paths, TEXT};
use crate::docx::xml::{escape_text, unescape_xml, Element};
use crate::error::{Error as DocError, ErrorKind};

const EXCERPT_LEN: usize = 40;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MergeError {
    #[error("placeholder opened but never closed in its paragraph: {fragment:?}")]
    Unclosed { fragment: String },

    #[error("closing delimiter without an opening one: {fragment:?}")]
    UnmatchedEnd { fragment: String },
}

impl MergeError {
    pub fn fragment(&self) -> &str {
        match self {
            Self::Unclosed { fragment } | Self::UnmatchedEnd { fragment } => fragment,
        }
    }
}

impl From<MergeError> for DocError {
    fn from(err: MergeError) -> Self {
        let (kind, hint) = match err {
            MergeError::Unclosed { .. } => (
                ErrorKind::UnclosedTag,
                "close the placeholder with }} in the same paragraph",
            ),
            MergeError::UnmatchedEnd { .. } => (
                ErrorKind::UnmatchedEnd,
                "remove the stray }} or add the {{ it belongs to",
            ),
        };
        DocError::new(kind, err.to_string())
            .with_placeholder(err.fragment())
            .with_suggestion(hint)
            .with_cause(err)
    }
}

/// Counters of one merge pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub paragraphs: usize,
    /// Text slots whose content moved into an anchor
    pub absorbed: usize,
}

/// Re-anchor the text slots of one paragraph so that every placeholder sits
/// in a single slot.
///
/// Returns the indices of the slots whose text changed. Slots that gave their
/// text away are left empty. Visible text (the concatenation of all slots) is
/// unchanged.
pub fn coalesce(texts: &mut [String]) -> Result<Vec<usize>, MergeError> {
    let mut changed = Vec::new();
    let mut anchor: Option<usize> = None;
    let mut buffer = String::new();

    for i in 0..texts.len() {
        if let Some(a) = anchor {
            if texts[i].is_empty() {
                continue;
            }
            // a lone `{` only pairs with a fragment that starts with `{`
            if scanner::scan(&buffer).depth > 0 || texts[i].starts_with('{') {
                buffer.push_str(&texts[i]);
                texts[i].clear();
                changed.push(i);

                let report = scanner::scan(&buffer);
                if let Some(offset) = report.unmatched_close {
                    return Err(MergeError::UnmatchedEnd {
                        fragment: excerpt_around(&buffer, offset),
                    });
                }
                if !report.needs_more() {
                    texts[a] = std::mem::take(&mut buffer);
                    changed.push(a);
                    anchor = None;
                }
                continue;
            }
            release(texts, a, &mut buffer, &mut changed);
            anchor = None;
        }

        let report = scanner::scan(&texts[i]);
        if let Some(offset) = report.unmatched_close {
            return Err(MergeError::UnmatchedEnd {
                fragment: excerpt_around(&texts[i], offset),
            });
        }
        if report.needs_more() {
            anchor = Some(i);
            buffer.clone_from(&texts[i]);
        }
    }

    if let Some(a) = anchor {
        let report = scanner::scan(&buffer);
        if report.depth > 0 {
            let start = report.open_at.unwrap_or(0);
            return Err(MergeError::Unclosed {
                fragment: excerpt(&buffer[start..]),
            });
        }
        // only a lone `{` was pending: it is plain text
        debug_assert_eq!(report.trailing, Trailing::HalfOpen);
        release(texts, a, &mut buffer, &mut changed);
    }

    changed.sort_unstable();
    changed.dedup();
    Ok(changed)
}

/// Drops a pending lone `{`, keeping whatever the anchor already absorbed
fn release(texts: &mut [String], anchor: usize, buffer: &mut String, changed: &mut Vec<usize>) {
    let text = std::mem::take(buffer);
    if texts[anchor] != text {
        texts[anchor] = text;
        changed.push(anchor);
    }
}

/// Merge the text nodes of a single paragraph (nested paragraphs are left to
/// their own pass). Returns the number of slots that were absorbed.
pub fn merge_paragraph(paragraph: &mut Element) -> Result<usize, MergeError> {
    let paths = text_paths(paragraph);
    if paths.len() < 2 {
        // a lone slot still has to be balanced
        if let Some(t) = paths.first().and_then(|p| paragraph.at_path(p)) {
            let mut single = [t.text()];
            coalesce(&mut single)?;
        }
        return Ok(0);
    }

    let mut texts: Vec<String> = paths
        .iter()
        .map(|p| paragraph.at_path(p).map(Element::text).unwrap_or_default())
        .collect();
    let changed = coalesce(&mut texts)?;

    let mut absorbed = 0;
    for idx in changed {
        let Some(t) = paragraph.at_path_mut(&paths[idx]) else {
            continue;
        };
        let text = std::mem::take(&mut texts[idx]);
        if text.is_empty() {
            absorbed += 1;
        } else if needs_preserve(&text) || text.contains("{{") {
            t.set_attr("xml:space", "preserve");
        }
        t.set_text(text);
    }
    Ok(absorbed)
}

/// Merge every paragraph below `root`, table cells and text boxes included
pub fn merge_tree(root: &mut Element) -> Result<MergeStats, MergeError> {
    let mut stats = MergeStats::default();
    for path in paragraph_paths(root) {
        let Some(paragraph) = root.at_path_mut(&path) else {
            continue;
        };
        stats.paragraphs += 1;
        stats.absorbed += merge_paragraph(paragraph)?;
    }
    Ok(stats)
}

/// Replace typographic quotes inside placeholders with ASCII ones.
/// Returns `None` when nothing changed.
pub fn straighten_quotes(text: &str) -> Option<String> {
    let tags = scanner::tags(text);
    if tags.is_empty() {
        return None;
    }
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    let mut changed = false;
    for tag in tags {
        out.push_str(&text[last..tag.start]);
        for c in text[tag.start..tag.end].chars() {
            let straight = match c {
                '\u{201C}' | '\u{201D}' | '\u{201E}' => '"',
                '\u{2018}' | '\u{2019}' => '\'',
                other => other,
            };
            changed |= straight != c;
            out.push(straight);
        }
        last = tag.end;
    }
    out.push_str(&text[last..]);
    changed.then_some(out)
}

/// [`straighten_quotes`] over every `w:t` below `root`
pub fn straighten_quotes_tree(root: &mut Element) -> usize {
    let mut count = 0;
    root.visit_mut(&mut |el| {
        if el.is(TEXT) {
            if let Some(fixed) = straighten_quotes(&el.text()) {
                el.set_text(fixed);
                count += 1;
            }
        }
    });
    count
}

/// A `<w:t>` found in raw markup
#[derive(Debug, Clone)]
struct RawSlot {
    /// Index of the enclosing paragraph, `None` outside any paragraph
    paragraph: Option<usize>,
    open_tag: (usize, usize),
    content: (usize, usize),
}

/// Raw-string variant of [`merge_tree`] for parts that are kept as text.
///
/// Returns the rewritten markup and the number of absorbed slots. Slot
/// content is escaped text, which does not change delimiter positions since
/// braces are never escaped.
pub fn merge_raw(xml: &str) -> Result<(String, usize), MergeError> {
    let slots = raw_text_slots(xml);
    if slots.is_empty() {
        return Ok((xml.to_string(), 0));
    }

    let mut edits: Vec<(usize, usize, String)> = Vec::new();
    let mut absorbed = 0;

    let mut start = 0;
    while start < slots.len() {
        let group = slots[start].paragraph;
        let mut end = start + 1;
        while end < slots.len() && group.is_some() && slots[end].paragraph == group {
            end += 1;
        }
        let members = &slots[start..end];
        let mut texts: Vec<String> = members
            .iter()
            .map(|s| unescape_xml(&xml[s.content.0..s.content.1]))
            .collect();

        for idx in coalesce(&mut texts)? {
            let slot = &members[idx];
            let text = &texts[idx];
            if text.is_empty() {
                absorbed += 1;
            } else {
                let open = &xml[slot.open_tag.0..slot.open_tag.1];
                if !open.contains("xml:space") {
                    edits.push((slot.open_tag.0, slot.open_tag.1, preserve_open_tag(open)));
                }
            }
            edits.push((slot.content.0, slot.content.1, escape_text(text)));
        }
        start = end;
    }

    if edits.is_empty() {
        return Ok((xml.to_string(), 0));
    }
    edits.sort_by_key(|(s, _, _)| *s);
    Ok((apply_edits(xml, &edits), absorbed))
}

/// [`straighten_quotes`] over every `w:t` of raw markup
pub fn straighten_quotes_raw(xml: &str) -> String {
    let mut edits = Vec::new();
    for slot in raw_text_slots(xml) {
        let content = unescape_xml(&xml[slot.content.0..slot.content.1]);
        if let Some(fixed) = straighten_quotes(&content) {
            edits.push((slot.content.0, slot.content.1, escape_text(&fixed)));
        }
    }
    if edits.is_empty() {
        return xml.to_string();
    }
    apply_edits(xml, &edits)
}

fn apply_edits(xml: &str, edits: &[(usize, usize, String)]) -> String {
    let mut out = String::with_capacity(xml.len());
    let mut last = 0;
    for (s, e, replacement) in edits {
        out.push_str(&xml[last..*s]);
        out.push_str(replacement);
        last = *e;
    }
    out.push_str(&xml[last..]);
    out
}

fn preserve_open_tag(open: &str) -> String {
    let body = open.trim_end_matches('>');
    format!(r#"{} xml:space="preserve">"#, body)
}

/// Locate every non-empty `<w:t>` element and the paragraph that owns it
fn raw_text_slots(xml: &str) -> Vec<RawSlot> {
    let mut slots = Vec::new();
    let mut stack: Vec<usize> = Vec::new();
    let mut next_paragraph = 0;
    let mut pos = 0;

    while let Some(rel) = xml[pos..].find('<') {
        let lt = pos + rel;
        let rest = &xml[lt..];

        if rest.starts_with("<!--") {
            pos = rest.find("-->").map_or(xml.len(), |e| lt + e + 3);
            continue;
        }
        if rest.starts_with("<![CDATA[") {
            pos = rest.find("]]>").map_or(xml.len(), |e| lt + e + 3);
            continue;
        }
        if rest.starts_with("<?") {
            pos = rest.find("?>").map_or(xml.len(), |e| lt + e + 2);
            continue;
        }

        let Some(gt) = tag_end(xml, lt) else { break };
        let tag = &xml[lt..=gt];
        let self_closing = tag.ends_with("/>");

        if let Some(name) = tag.strip_prefix("</") {
            if element_name(name) == "w:p" {
                stack.pop();
            }
            pos = gt + 1;
            continue;
        }

        match element_name(&tag[1..]) {
            "w:p" if !self_closing => {
                stack.push(next_paragraph);
                next_paragraph += 1;
            }
            "w:t" if !self_closing => {
                let content_start = gt + 1;
                let Some(close_rel) = xml[content_start..].find("</w:t>") else {
                    break;
                };
                let content_end = content_start + close_rel;
                slots.push(RawSlot {
                    paragraph: stack.last().copied(),
                    open_tag: (lt, gt + 1),
                    content: (content_start, content_end),
                });
                pos = content_end + "</w:t>".len();
                continue;
            }
            _ => {}
        }
        pos = gt + 1;
    }
    slots
}

/// Index of the `>` closing the tag that starts at `lt`, skipping quoted attribute values
fn tag_end(xml: &str, lt: usize) -> Option<usize> {
    let mut quote: Option<u8> = None;
    for (i, &b) in xml.as_bytes()[lt..].iter().enumerate() {
        match (quote, b) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, b'"') | (None, b'\'') => quote = Some(b),
            (None, b'>') => return Some(lt + i),
            _ => {}
        }
    }
    None
}

fn element_name(tag_body: &str) -> &str {
    let end = tag_body
        .find(|c: char| c.is_whitespace() || c == '/' || c == '>')
        .unwrap_or(tag_body.len());
    &tag_body[..end]
}

fn needs_preserve(text: &str) -> bool {
    text.starts_with(char::is_whitespace) || text.ends_with(char::is_whitespace)
}

fn excerpt(text: &str) -> String {
    if text.chars().count() <= EXCERPT_LEN {
        return text.to_string();
    }
    let mut s: String = text.chars().take(EXCERPT_LEN).collect();
    s.push('…');
    s
}

fn excerpt_around(text: &str, offset: usize) -> String {
    let start = text[..offset]
        .char_indices()
        .rev()
        .nth(EXCERPT_LEN / 2)
        .map_or(0, |(i, _)| i);
    excerpt(&text[start..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docx::body::paragraph_text;
    use pretty_assertions::assert_eq;

    fn strings(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_coalesce_split_placeholder() {
        let mut texts = strings(&["{{.First", "Name}}"]);
        let changed = coalesce(&mut texts).unwrap();
        assert_eq!(texts, strings(&["{{.FirstName}}", ""]));
        assert_eq!(changed, vec![0, 1]);
    }

    #[test]
    fn test_coalesce_keeps_surrounding_text() {
        let mut texts = strings(&["Dear {{", ".Title", " }}, ", "welcome"]);
        coalesce(&mut texts).unwrap();
        assert_eq!(texts, strings(&["Dear {{.Title }}, ", "", "", "welcome"]));
    }

    #[test]
    fn test_coalesce_split_open_delimiter() {
        let mut texts = strings(&["x {", "{.A}} y"]);
        coalesce(&mut texts).unwrap();
        assert_eq!(texts, strings(&["x {{.A}} y", ""]));
    }

    #[test]
    fn test_coalesce_lone_brace_is_text() {
        let mut texts = strings(&["price {"]);
        assert!(coalesce(&mut texts).unwrap().is_empty());
        assert_eq!(texts, strings(&["price {"]));
    }

    #[test]
    fn test_coalesce_lone_brace_before_plain_text() {
        let mut texts = strings(&["f(x) = {", " y ", "done"]);
        assert!(coalesce(&mut texts).unwrap().is_empty());
        assert_eq!(texts, strings(&["f(x) = {", " y ", "done"]));

        let mut texts = strings(&["a {", "{.X}} {", "plain", "{{.Y}}"]);
        coalesce(&mut texts).unwrap();
        assert_eq!(texts, strings(&["a {{.X}} {", "", "plain", "{{.Y}}"]));
    }

    #[test]
    fn test_merge_paragraph_keeps_formatting_after_lone_brace() {
        let xml = concat!(
            r#"<w:p><w:r><w:rPr><w:b/></w:rPr><w:t>set {</w:t></w:r>"#,
            r#"<w:r><w:rPr><w:i/></w:rPr><w:t>italic text</w:t></w:r></w:p>"#
        );
        let mut p = Element::parse(xml).unwrap();
        assert_eq!(merge_paragraph(&mut p).unwrap(), 0);
        assert_eq!(p.to_xml(), xml);
    }

    #[test]
    fn test_coalesce_skips_empty_slots() {
        let mut texts = strings(&["{{if", "", " .A}}"]);
        let changed = coalesce(&mut texts).unwrap();
        assert_eq!(texts, strings(&["{{if .A}}", "", ""]));
        assert_eq!(changed, vec![0, 2]);
    }

    #[test]
    fn test_coalesce_unclosed() {
        let mut texts = strings(&["{{.Name", " and more"]);
        let err = coalesce(&mut texts).unwrap_err();
        assert_eq!(
            err,
            MergeError::Unclosed {
                fragment: "{{.Name and more".to_string()
            }
        );
    }

    #[test]
    fn test_coalesce_unmatched_end() {
        let mut texts = strings(&["oops }}"]);
        assert!(matches!(
            coalesce(&mut texts),
            Err(MergeError::UnmatchedEnd { .. })
        ));
    }

    #[test]
    fn test_merge_paragraph_preserves_run_properties() {
        let mut p = Element::parse(concat!(
            r#"<w:p><w:r><w:rPr><w:b/></w:rPr><w:t>{{.First</w:t></w:r>"#,
            r#"<w:r><w:rPr><w:i/></w:rPr><w:t>Name}}</w:t><w:br/></w:r></w:p>"#
        ))
        .unwrap();
        assert_eq!(merge_paragraph(&mut p).unwrap(), 1);
        assert_eq!(
            p.to_xml(),
            concat!(
                r#"<w:p><w:r><w:rPr><w:b/></w:rPr><w:t xml:space="preserve">{{.FirstName}}</w:t></w:r>"#,
                r#"<w:r><w:rPr><w:i/></w:rPr><w:t/><w:br/></w:r></w:p>"#
            )
        );
        assert_eq!(paragraph_text(&p), "{{.FirstName}}\n");
    }

    #[test]
    fn test_merge_tree_handles_table_cells() {
        let mut body = Element::parse(concat!(
            r#"<w:body><w:tbl><w:tr><w:tc><w:p><w:r><w:t>{{.</w:t></w:r>"#,
            r#"<w:r><w:t>Cell}}</w:t></w:r></w:p></w:tc></w:tr></w:tbl></w:body>"#
        ))
        .unwrap();
        let stats = merge_tree(&mut body).unwrap();
        assert_eq!(stats.paragraphs, 1);
        assert_eq!(stats.absorbed, 1);
        assert!(body.to_xml().contains("{{.Cell}}"));
    }

    #[test]
    fn test_straighten_quotes_only_inside_tags() {
        let fixed = straighten_quotes("“quoted” {{link “https://x” ‘go’}}").unwrap();
        assert_eq!(fixed, "“quoted” {{link \"https://x\" 'go'}}");
        assert_eq!(straighten_quotes("{{.A}}"), None);
    }

    #[test]
    fn test_merge_raw_groups_by_paragraph() {
        let xml = concat!(
            r#"<w:hdr><w:p><w:r><w:t>{{.Com</w:t></w:r><w:r><w:t xml:space="preserve">pany}} &amp; co</w:t></w:r></w:p>"#,
            r#"<w:p><w:r><w:t>plain</w:t></w:r></w:p></w:hdr>"#
        );
        let (merged, absorbed) = merge_raw(xml).unwrap();
        assert_eq!(absorbed, 1);
        assert_eq!(
            merged,
            concat!(
                r#"<w:hdr><w:p><w:r><w:t xml:space="preserve">{{.Company}} &amp; co</w:t></w:r><w:r><w:t xml:space="preserve"></w:t></w:r></w:p>"#,
                r#"<w:p><w:r><w:t>plain</w:t></w:r></w:p></w:hdr>"#
            )
        );
    }

    #[test]
    fn test_merge_raw_ignores_similar_tag_names() {
        let xml = r#"<w:p><w:tab/><w:tbl/><w:r><w:t>{{.A}}</w:t></w:r><w:p/></w:p>"#;
        let (merged, absorbed) = merge_raw(xml).unwrap();
        assert_eq!(absorbed, 0);
        assert_eq!(merged, xml);
    }

    #[test]
    fn test_merge_raw_reports_unclosed() {
        let xml = r#"<w:ftr><w:p><w:r><w:t>{{.Page</w:t></w:r></w:p></w:ftr>"#;
        assert!(matches!(merge_raw(xml), Err(MergeError::Unclosed { .. })));
    }

    #[test]
    fn test_straighten_quotes_raw() {
        let xml = "<w:p><w:r><w:t>{{printf “%d” 3}}</w:t></w:r></w:p>";
        assert_eq!(
            straighten_quotes_raw(xml),
            "<w:p><w:r><w:t>{{printf \"%d\" 3}}</w:t></w:r></w:p>"
        );
    }
}
