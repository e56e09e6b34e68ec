//! Tokenizer for `{{ … }}` templates.
//!
//! Text between actions becomes a single `Text` item with trim markers
//! already applied; the inside of each action is split into operator,
//! operand and keyword items. Every item keeps its byte span so that errors
//! can quote the action they came from.

use super::error::{Result, TemplateError};

const LEFT: &str = "{{";
const RIGHT: &str = "}}";
const COMMENT_OPEN: &str = "/*";
const COMMENT_CLOSE: &str = "*/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    If,
    Else,
    End,
    Range,
    With,
    Break,
    Continue,
}

impl Keyword {
    fn lookup(word: &str) -> Option<Self> {
        Some(match word {
            "if" => Self::If,
            "else" => Self::Else,
            "end" => Self::End,
            "range" => Self::Range,
            "with" => Self::With,
            "break" => Self::Break,
            "continue" => Self::Continue,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::If => "if",
            Self::Else => "else",
            Self::End => "end",
            Self::Range => "range",
            Self::With => "with",
            Self::Break => "break",
            Self::Continue => "continue",
        }
    }
}

/// Words that can never name a helper
pub fn is_reserved(word: &str) -> bool {
    Keyword::lookup(word).is_some() || matches!(word, "true" | "false" | "nil")
}

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Text(String),
    LeftDelim { trim: bool },
    RightDelim { trim: bool },
    Keyword(Keyword),
    Identifier(String),
    /// `.Name`, stored without the dot
    Field(String),
    Dot,
    /// `$name` or `$`, stored with the dollar
    Variable(String),
    Declare,
    Assign,
    Pipe,
    LeftParen,
    RightParen,
    Comma,
    /// Unquoted string literal
    String(String),
    Number(String),
    Bool(bool),
    Nil,
    Eof,
}

impl Token {
    pub fn describe(&self) -> String {
        match self {
            Self::Text(_) => "text".to_string(),
            Self::LeftDelim { .. } => "\"{{\"".to_string(),
            Self::RightDelim { .. } => "\"}}\"".to_string(),
            Self::Keyword(k) => format!("<{}>", k.as_str()),
            Self::Identifier(name) => format!("{:?}", name),
            Self::Field(name) => format!("field .{}", name),
            Self::Dot => "\".\"".to_string(),
            Self::Variable(name) => format!("variable {}", name),
            Self::Declare => "\":=\"".to_string(),
            Self::Assign => "\"=\"".to_string(),
            Self::Pipe => "\"|\"".to_string(),
            Self::LeftParen => "\"(\"".to_string(),
            Self::RightParen => "\")\"".to_string(),
            Self::Comma => "\",\"".to_string(),
            Self::String(s) => format!("string {:?}", s),
            Self::Number(n) => format!("number {}", n),
            Self::Bool(b) => b.to_string(),
            Self::Nil => "nil".to_string(),
            Self::Eof => "EOF".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub token: Token,
    pub start: usize,
    pub end: usize,
}

/// 1-based line of a byte offset
pub fn line_of(src: &str, offset: usize) -> usize {
    src.as_bytes()[..offset.min(src.len())]
        .iter()
        .filter(|&&b| b == b'\n')
        .count()
        + 1
}

pub fn lex(src: &str) -> Result<Vec<Item>> {
    Lexer {
        src,
        items: Vec::new(),
    }
    .run()
}

struct Lexer<'a> {
    src: &'a str,
    items: Vec<Item>,
}

impl<'a> Lexer<'a> {
    fn run(mut self) -> Result<Vec<Item>> {
        let src = self.src;
        let mut pos = 0;
        let mut trim_next = false;

        loop {
            let Some(rel) = src[pos..].find(LEFT) else {
                let mut text = &src[pos..];
                if trim_next {
                    text = trim_space_start(text);
                }
                self.push_text(text, src.len() - text.len());
                break;
            };
            let open = pos + rel;
            let trim_left = has_left_trim(&src[open + LEFT.len()..]);

            let raw = &src[pos..open];
            let lead = if trim_next {
                raw.len() - trim_space_start(raw).len()
            } else {
                0
            };
            let mut text = &raw[lead..];
            if trim_left {
                text = trim_space_end(text);
            }
            self.push_text(text, pos + lead);

            let mut cur = open + LEFT.len();
            if trim_left {
                cur += 2;
            }

            if src[cur..].starts_with(COMMENT_OPEN) {
                let (after, trim_right) = self.skip_comment(open, cur)?;
                pos = after;
                trim_next = trim_right;
                continue;
            }

            self.items.push(Item {
                token: Token::LeftDelim { trim: trim_left },
                start: open,
                end: cur,
            });
            let (after, trim_right) = self.lex_action(open, cur)?;
            pos = after;
            trim_next = trim_right;
        }

        self.items.push(Item {
            token: Token::Eof,
            start: src.len(),
            end: src.len(),
        });
        Ok(self.items)
    }

    fn push_text(&mut self, text: &str, start: usize) {
        if !text.is_empty() {
            self.items.push(Item {
                token: Token::Text(text.to_string()),
                start,
                end: start + text.len(),
            });
        }
    }

    fn error(&self, message: impl Into<String>, open: usize, end: usize) -> TemplateError {
        let end = end.min(self.src.len());
        TemplateError::syntax(
            message,
            line_of(self.src, open),
            Some(self.src[open..end].to_string()),
        )
    }

    /// Returns the offset after the closing delimiter and its trim flag
    fn skip_comment(&self, open: usize, cur: usize) -> Result<(usize, bool)> {
        let body = cur + COMMENT_OPEN.len();
        let Some(rel) = self.src[body..].find(COMMENT_CLOSE) else {
            return Err(self.error("unclosed comment", open, self.src.len()));
        };
        let after_comment = body + rel + COMMENT_CLOSE.len();
        let rest = &self.src[after_comment..];
        if rest.starts_with(RIGHT) {
            return Ok((after_comment + RIGHT.len(), false));
        }
        if has_right_trim(rest) && rest[2..].starts_with(RIGHT) {
            return Ok((after_comment + 2 + RIGHT.len(), true));
        }
        Err(self.error("comment ends before closing delimiter", open, after_comment))
    }

    /// Tokenises one action body. Returns the offset after `}}` and whether it trims.
    fn lex_action(&mut self, open: usize, mut cur: usize) -> Result<(usize, bool)> {
        let src = self.src;
        let bytes = src.as_bytes();
        loop {
            if cur >= bytes.len() {
                return Err(self.error("unclosed action", open, src.len()));
            }
            let rest = &src[cur..];

            if rest.starts_with(RIGHT) {
                self.push(Token::RightDelim { trim: false }, cur, cur + 2);
                return Ok((cur + 2, false));
            }

            let c = bytes[cur];
            if is_space(c) {
                if has_right_trim(rest) {
                    let dash = cur + 1;
                    if src[dash + 1..].starts_with(RIGHT) {
                        self.push(Token::RightDelim { trim: true }, cur, dash + 3);
                        return Ok((dash + 3, true));
                    }
                }
                cur += 1;
                continue;
            }

            let start = cur;
            match c {
                b'|' => {
                    self.push(Token::Pipe, start, start + 1);
                    cur += 1;
                }
                b'(' => {
                    self.push(Token::LeftParen, start, start + 1);
                    cur += 1;
                }
                b')' => {
                    self.push(Token::RightParen, start, start + 1);
                    cur += 1;
                }
                b',' => {
                    self.push(Token::Comma, start, start + 1);
                    cur += 1;
                }
                b':' => {
                    if bytes.get(cur + 1) != Some(&b'=') {
                        return Err(self.error("expected :=", open, cur + 1));
                    }
                    self.push(Token::Declare, start, start + 2);
                    cur += 2;
                }
                b'=' => {
                    self.push(Token::Assign, start, start + 1);
                    cur += 1;
                }
                b'"' => {
                    let (value, end) = self.quoted(open, cur)?;
                    self.push(Token::String(value), start, end);
                    cur = end;
                }
                b'`' => {
                    let Some(rel) = src[cur + 1..].find('`') else {
                        return Err(self.error("unterminated raw quoted string", open, src.len()));
                    };
                    let end = cur + 1 + rel + 1;
                    self.push(
                        Token::String(src[cur + 1..end - 1].to_string()),
                        start,
                        end,
                    );
                    cur = end;
                }
                b'\'' => {
                    let (ch, end) = self.char_constant(open, cur)?;
                    self.push(Token::Number((ch as u32).to_string()), start, end);
                    cur = end;
                }
                b'.' if bytes.get(cur + 1).is_some_and(u8::is_ascii_digit) => {
                    cur = self.number(start);
                }
                b'.' => {
                    let end = ident_end(bytes, cur + 1);
                    if end == cur + 1 {
                        self.push(Token::Dot, start, end);
                    } else {
                        self.push(Token::Field(src[cur + 1..end].to_string()), start, end);
                    }
                    cur = end;
                }
                b'$' => {
                    let end = ident_end(bytes, cur + 1);
                    self.push(Token::Variable(src[cur..end].to_string()), start, end);
                    cur = end;
                }
                b'0'..=b'9' => cur = self.number(start),
                b'-' | b'+'
                    if bytes.get(cur + 1).is_some_and(|b| b.is_ascii_digit() || *b == b'.') =>
                {
                    cur = self.number(start)
                }
                c if c == b'_' || c.is_ascii_alphabetic() => {
                    let end = ident_end(bytes, cur);
                    let word = &src[cur..end];
                    let token = match word {
                        "true" => Token::Bool(true),
                        "false" => Token::Bool(false),
                        "nil" => Token::Nil,
                        _ => match Keyword::lookup(word) {
                            Some(k) => Token::Keyword(k),
                            None => Token::Identifier(word.to_string()),
                        },
                    };
                    self.push(token, start, end);
                    cur = end;
                }
                _ => {
                    let ch = rest.chars().next().unwrap_or('?');
                    return Err(self.error(
                        format!("unexpected {:?} in command", ch),
                        open,
                        cur + ch.len_utf8(),
                    ));
                }
            }
        }
    }

    fn push(&mut self, token: Token, start: usize, end: usize) {
        self.items.push(Item { token, start, end });
    }

    fn number(&mut self, start: usize) -> usize {
        let bytes = self.src.as_bytes();
        let mut cur = start;
        if matches!(bytes[cur], b'+' | b'-') {
            cur += 1;
        }
        let hex = bytes.get(cur) == Some(&b'0')
            && matches!(bytes.get(cur + 1), Some(b'x') | Some(b'X'));
        if hex {
            cur += 2;
            while cur < bytes.len() && (bytes[cur].is_ascii_hexdigit() || bytes[cur] == b'_') {
                cur += 1;
            }
        } else {
            while cur < bytes.len() && (bytes[cur].is_ascii_digit() || bytes[cur] == b'_') {
                cur += 1;
            }
            if bytes.get(cur) == Some(&b'.') {
                cur += 1;
                while cur < bytes.len() && bytes[cur].is_ascii_digit() {
                    cur += 1;
                }
            }
            if matches!(bytes.get(cur), Some(b'e') | Some(b'E')) {
                let mut exp = cur + 1;
                if matches!(bytes.get(exp), Some(b'+') | Some(b'-')) {
                    exp += 1;
                }
                if bytes.get(exp).is_some_and(u8::is_ascii_digit) {
                    cur = exp;
                    while cur < bytes.len() && bytes[cur].is_ascii_digit() {
                        cur += 1;
                    }
                }
            }
        }
        self.push(Token::Number(self.src[start..cur].to_string()), start, cur);
        cur
    }

    /// Double-quoted string with Go-style escapes
    fn quoted(&self, open: usize, quote: usize) -> Result<(String, usize)> {
        let mut out = String::new();
        let mut chars = self.src[quote + 1..].char_indices();
        while let Some((i, c)) = chars.next() {
            match c {
                '"' => return Ok((out, quote + 1 + i + 1)),
                '\n' => break,
                '\\' => {
                    let Some((_, esc)) = chars.next() else { break };
                    match esc {
                        'n' => out.push('\n'),
                        't' => out.push('\t'),
                        'r' => out.push('\r'),
                        '\\' => out.push('\\'),
                        '"' => out.push('"'),
                        '\'' => out.push('\''),
                        'x' | 'u' | 'U' => {
                            let width = match esc {
                                'x' => 2,
                                'u' => 4,
                                _ => 8,
                            };
                            let digits: String = chars.by_ref().take(width).map(|(_, d)| d).collect();
                            let decoded = u32::from_str_radix(&digits, 16)
                                .ok()
                                .and_then(char::from_u32)
                                .ok_or_else(|| {
                                    self.error(format!("invalid escape \\{}{}", esc, digits), open, quote + 1 + i)
                                })?;
                            out.push(decoded);
                        }
                        other => {
                            return Err(self.error(
                                format!("unknown escape sequence \\{}", other),
                                open,
                                quote + 1 + i,
                            ))
                        }
                    }
                }
                c => out.push(c),
            }
        }
        Err(self.error("unterminated quoted string", open, self.src.len()))
    }

    fn char_constant(&self, open: usize, quote: usize) -> Result<(char, usize)> {
        let rest = &self.src[quote + 1..];
        let mut chars = rest.char_indices();
        let value = match chars.next() {
            Some((_, '\\')) => match chars.next() {
                Some((_, 'n')) => '\n',
                Some((_, 't')) => '\t',
                Some((_, '\\')) => '\\',
                Some((_, '\'')) => '\'',
                _ => return Err(self.error("invalid character constant", open, quote + 1)),
            },
            Some((_, c)) if c != '\'' => c,
            _ => return Err(self.error("empty character constant", open, quote + 1)),
        };
        match chars.next() {
            Some((i, '\'')) => Ok((value, quote + 1 + i + 1)),
            _ => Err(self.error("unterminated character constant", open, quote + 1)),
        }
    }
}

fn is_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | b'\n')
}

fn trim_space_start(s: &str) -> &str {
    s.trim_start_matches([' ', '\t', '\r', '\n'])
}

fn trim_space_end(s: &str) -> &str {
    s.trim_end_matches([' ', '\t', '\r', '\n'])
}

/// `- ` right after `{{`
fn has_left_trim(after_delim: &str) -> bool {
    let b = after_delim.as_bytes();
    b.len() >= 2 && b[0] == b'-' && is_space(b[1])
}

/// ` -` right before `}}`
fn has_right_trim(before_delim: &str) -> bool {
    let b = before_delim.as_bytes();
    b.len() >= 2 && is_space(b[0]) && b[1] == b'-'
}

fn ident_end(bytes: &[u8], mut cur: usize) -> usize {
    while cur < bytes.len() && (bytes[cur] == b'_' || bytes[cur].is_ascii_alphanumeric()) {
        cur += 1;
    }
    cur
}
