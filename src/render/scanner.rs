//! Delimiter scanner.
//!
//! Works on the literal character stream only: the interior of a tag is never
//! interpreted here, `{{` and `}}` are counted wherever they appear.

pub const OPEN: &str = "{{";
pub const CLOSE: &str = "}}";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelimiterKind {
    Open,
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delimiter {
    pub kind: DelimiterKind,
    /// Byte offset of the first brace
    pub offset: usize,
    /// `{{-` or `-}}` trim marker
    pub trim: bool,
    /// Nesting depth after this delimiter was applied
    pub depth: usize,
}

/// A brace at the very end of the input that may combine with the next fragment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Trailing {
    #[default]
    None,
    /// Lone `{`
    HalfOpen,
    /// Lone `}`
    HalfClose,
}

/// A complete `{{ … }}` pair at depth one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag {
    pub start: usize,
    /// Exclusive end, just past `}}`
    pub end: usize,
    pub trim_left: bool,
    pub trim_right: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub delimiters: Vec<Delimiter>,
    /// Depth at the end of the input
    pub depth: usize,
    /// Offset of the outermost `{{` that is still open at the end
    pub open_at: Option<usize>,
    /// Offset of the first `}}` seen at depth zero
    pub unmatched_close: Option<usize>,
    pub trailing: Trailing,
}

impl ScanReport {
    pub fn is_balanced(&self) -> bool {
        self.depth == 0 && self.unmatched_close.is_none()
    }

    /// True when the text cannot stand alone: an opened tag is pending or a
    /// lone `{` may pair with the next fragment
    pub fn needs_more(&self) -> bool {
        self.depth > 0 || self.trailing == Trailing::HalfOpen
    }

    /// Complete outermost tags
    pub fn tags(&self) -> Vec<Tag> {
        let mut tags = Vec::new();
        let mut current: Option<(usize, bool)> = None;
        for d in &self.delimiters {
            match d.kind {
                DelimiterKind::Open if d.depth == 1 => current = Some((d.offset, d.trim)),
                DelimiterKind::Close if d.depth == 0 => {
                    if let Some((start, trim_left)) = current.take() {
                        tags.push(Tag {
                            start,
                            end: d.offset + CLOSE.len(),
                            trim_left,
                            trim_right: d.trim,
                        });
                    }
                }
                _ => {}
            }
        }
        tags
    }
}

pub fn scan(text: &str) -> ScanReport {
    let bytes = text.as_bytes();
    let mut report = ScanReport::default();
    let mut depth = 0usize;
    let mut i = 0;
    // end of the last byte consumed by a delimiter
    let mut consumed = 0usize;

    while i + 1 < bytes.len() {
        if bytes[i] == b'{' && bytes[i + 1] == b'{' {
            depth += 1;
            if depth == 1 {
                report.open_at = Some(i);
            }
            report.delimiters.push(Delimiter {
                kind: DelimiterKind::Open,
                offset: i,
                trim: is_left_trim(bytes, i + 2),
                depth,
            });
            i += 2;
            consumed = i;
        } else if bytes[i] == b'}' && bytes[i + 1] == b'}' {
            if depth == 0 {
                if report.unmatched_close.is_none() {
                    report.unmatched_close = Some(i);
                }
            } else {
                depth -= 1;
                if depth == 0 {
                    report.open_at = None;
                }
                report.delimiters.push(Delimiter {
                    kind: DelimiterKind::Close,
                    offset: i,
                    trim: is_right_trim(bytes, i),
                    depth,
                });
            }
            i += 2;
            consumed = i;
        } else {
            i += 1;
        }
    }

    report.depth = depth;
    if bytes.len() > consumed {
        report.trailing = match bytes.last() {
            Some(b'{') => Trailing::HalfOpen,
            Some(b'}') => Trailing::HalfClose,
            _ => Trailing::None,
        };
    }
    report
}

/// Depth after scanning `text` (unmatched closes are ignored)
pub fn balance(text: &str) -> usize {
    scan(text).depth
}

pub fn tags(text: &str) -> Vec<Tag> {
    scan(text).tags()
}

// `{{- ` : dash followed by whitespace; `{{-3}}` is a negative number
fn is_left_trim(bytes: &[u8], after_open: usize) -> bool {
    bytes.get(after_open) == Some(&b'-')
        && bytes
            .get(after_open + 1)
            .is_some_and(|b| b.is_ascii_whitespace())
}

fn is_right_trim(bytes: &[u8], close: usize) -> bool {
    close >= 2 && bytes[close - 1] == b'-' && bytes[close - 2].is_ascii_whitespace()
}
