//! Helper functions callable from templates.
//!
//! A process-wide table holds the standard helpers (`link`, `resize`,
//! `date`) and anything added with [`register_helper`]. Engines take a
//! snapshot of it when they are created, so later registrations do not
//! affect documents that already exist.

use std::collections::BTreeMap;
use std::fmt::{self, Write as _};
use std::sync::Arc;

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;
use thiserror::Error;

use super::error::{Result, TemplateError};
use super::lexer::is_reserved;
use super::value::Value;
use super::PartContext;
use crate::docx::xml::{escape_xml, unescape_xml};
use crate::render::image::ImageError;

#[derive(Debug, Error)]
pub enum HelperError {
    #[error("{0}")]
    Message(String),

    #[error(transparent)]
    Image(#[from] ImageError),
}

impl From<String> for HelperError {
    fn from(message: String) -> Self {
        Self::Message(message)
    }
}

impl From<&str> for HelperError {
    fn from(message: &str) -> Self {
        Self::Message(message.to_string())
    }
}

pub type Helper =
    Arc<dyn Fn(&mut dyn PartContext, &[Value]) -> std::result::Result<Value, HelperError> + Send + Sync>;

static HELPER_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

static GLOBAL_HELPERS: Lazy<RwLock<HelperTable>> = Lazy::new(|| RwLock::new(HelperTable::standard()));

/// Adds a helper to the process-wide table
pub fn register_helper<F>(name: &str, helper: F) -> Result<()>
where
    F: Fn(&mut dyn PartContext, &[Value]) -> std::result::Result<Value, HelperError>
        + Send
        + Sync
        + 'static,
{
    GLOBAL_HELPERS.write().insert(name, helper)
}

#[derive(Clone, Default)]
pub struct HelperTable {
    helpers: BTreeMap<String, Helper>,
}

impl fmt::Debug for HelperTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.helpers.keys()).finish()
    }
}

impl HelperTable {
    /// Empty table, without even the standard helpers
    pub fn new() -> Self {
        Self::default()
    }

    /// `link`, `resize` and `date`
    pub fn standard() -> Self {
        let mut table = Self::new();
        table.helpers.insert("link".to_string(), Arc::new(link));
        table.helpers.insert("resize".to_string(), Arc::new(resize));
        table.helpers.insert("date".to_string(), Arc::new(date));
        table
    }

    /// Snapshot of the process-wide table
    pub fn global() -> Self {
        GLOBAL_HELPERS.read().clone()
    }

    pub fn insert<F>(&mut self, name: &str, helper: F) -> Result<()>
    where
        F: Fn(&mut dyn PartContext, &[Value]) -> std::result::Result<Value, HelperError>
            + Send
            + Sync
            + 'static,
    {
        if !HELPER_NAME.is_match(name) || is_reserved(name) {
            return Err(TemplateError::InvalidHelperName(name.to_string()));
        }
        if self.helpers.insert(name.to_string(), Arc::new(helper)).is_some() {
            tracing::debug!(name, "replaced helper");
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Helper> {
        self.helpers.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.helpers.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.helpers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.helpers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.helpers.is_empty()
    }
}

/// `{{link "https://…" "text"}}`: closes the current run, emits a hyperlink
/// run and reopens a plain run
fn link(cx: &mut dyn PartContext, args: &[Value]) -> std::result::Result<Value, HelperError> {
    let [url, text] = args else {
        return Err(format!("link expects (url, text), got {} arguments", args.len()).into());
    };
    let url = unescape_xml(&url.to_text());
    if url.is_empty() {
        return Err("link url is empty".into());
    }
    let rel_id = cx.hyperlink(&url);
    Ok(Value::markup(format!(
        concat!(
            r#"</w:t></w:r><w:hyperlink r:id="{rid}" w:history="1">"#,
            r#"<w:r><w:rPr><w:rStyle w:val="Hyperlink"/><w:color w:val="0563C1"/><w:u w:val="single"/></w:rPr>"#,
            r#"<w:t xml:space="preserve">{text}</w:t></w:r></w:hyperlink>"#,
            r#"<w:r><w:t xml:space="preserve">"#
        ),
        rid = escape_xml(&rel_id),
        text = text.to_text()
    )))
}

/// `{{resize .Logo 120 60}}`: nearest-neighbour resize to a pixel box.
/// The image may be given in any position so `{{.Logo | resize 120 60}}` works too.
fn resize(_: &mut dyn PartContext, args: &[Value]) -> std::result::Result<Value, HelperError> {
    if args.len() != 3 {
        return Err(format!("resize expects (image, width, height), got {} arguments", args.len()).into());
    }
    if args.iter().any(Value::is_null) {
        return Ok(Value::Null);
    }
    let Some(image) = args.iter().find_map(Value::as_image) else {
        return Err("resize needs an image argument".into());
    };
    let dims: Vec<i64> = args
        .iter()
        .filter(|v| v.as_image().is_none())
        .map(|v| v.as_i64().ok_or_else(|| format!("resize size must be an integer, got {}", v.type_name())))
        .collect::<std::result::Result<_, _>>()?;
    let &[width, height] = dims.as_slice() else {
        return Err("resize needs exactly one image".into());
    };
    Ok(Value::image(image.resized(width, height)?))
}

/// `{{date "%d %B %Y" .Due}}` or `{{.Due | date "%Y"}}`.
///
/// The layout is the argument containing `%`; values may be RFC 3339
/// timestamps, `YYYY-MM-DD[ HH:MM:SS]` strings or Unix seconds.
fn date(_: &mut dyn PartContext, args: &[Value]) -> std::result::Result<Value, HelperError> {
    let [a, b] = args else {
        return Err(format!("date expects (layout, value), got {} arguments", args.len()).into());
    };
    let (layout, value) = if a.as_str().is_some_and(|s| s.contains('%')) {
        (a, b)
    } else {
        (b, a)
    };
    if value.is_null() {
        return Ok(Value::Null);
    }
    let layout = unescape_xml(&layout.to_text());
    let items: Vec<Item<'_>> = StrftimeItems::new(&layout).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return Err(format!("invalid date layout {:?}", layout).into());
    }

    let when = parse_date(value)?;
    let mut out = String::new();
    write!(out, "{}", when.format_with_items(items.iter()))
        .map_err(|_| format!("date layout {:?} does not fit value", layout))?;
    Ok(Value::text(&out))
}

fn parse_date(value: &Value) -> std::result::Result<DateTime<FixedOffset>, HelperError> {
    if let Value::Int(secs) = value {
        return DateTime::<Utc>::from_timestamp(*secs, 0)
            .map(|dt| dt.fixed_offset())
            .ok_or_else(|| format!("timestamp {} out of range", secs).into());
    }
    let Some(text) = value.as_str() else {
        return Err(format!("date value must be a string or integer, got {}", value.type_name()).into());
    };
    let text = unescape_xml(text);
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt);
    }
    for layout in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, layout) {
            return Ok(naive.and_utc().fixed_offset());
        }
    }
    if let Ok(day) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        if let Some(naive) = day.and_hms_opt(0, 0, 0) {
            return Ok(naive.and_utc().fixed_offset());
        }
    }
    Err(format!("cannot parse {:?} as a date", text).into())
}
