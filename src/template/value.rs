use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::docx::xml::escape_xml;
use crate::render::image::ImageHandle;

/// Data the evaluator works on.
///
/// `String` holds XML-safe text: values coming from the caller are escaped
/// when the tree is built, helper output is trusted markup.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Seq(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Image(Arc<ImageHandle>),
}

impl Value {
    /// Plain text, escaped for XML
    pub fn text(s: &str) -> Self {
        Self::String(escape_xml(s))
    }

    /// Markup inserted verbatim
    pub fn markup(s: impl Into<String>) -> Self {
        Self::String(s.into())
    }

    pub fn image(handle: ImageHandle) -> Self {
        Self::Image(Arc::new(handle))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Truth value used by `if`, `with`, `and`, `or` and `not`
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Int(n) => *n != 0,
            Self::Float(f) => *f != 0.0,
            Self::String(s) => !s.is_empty(),
            Self::Seq(items) => !items.is_empty(),
            Self::Map(map) => !map.is_empty(),
            Self::Image(_) => true,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "nil",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Seq(_) => "sequence",
            Self::Map(_) => "map",
            Self::Image(_) => "image",
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Self::Map(map) => map.get(key),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            Self::Float(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(n) => Some(*n as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_image(&self) -> Option<&Arc<ImageHandle>> {
        match self {
            Self::Image(img) => Some(img),
            _ => None,
        }
    }

    /// Printed form. Absent values print as nothing.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        self.write_text(&mut out);
        out
    }

    fn write_text(&self, out: &mut String) {
        match self {
            Self::Null => {}
            Self::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            Self::Int(n) => out.push_str(&n.to_string()),
            Self::Float(f) => out.push_str(&format_float(*f)),
            Self::String(s) => out.push_str(s),
            Self::Seq(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(' ');
                    }
                    item.write_text(out);
                }
                out.push(']');
            }
            Self::Map(map) => {
                out.push_str("map[");
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        out.push(' ');
                    }
                    out.push_str(k);
                    out.push(':');
                    v.write_text(out);
                }
                out.push(']');
            }
            Self::Image(img) => out.push_str(&escape_xml(img.name())),
        }
    }
}

pub(crate) fn format_float(f: f64) -> String {
    if f.is_infinite() {
        return if f > 0.0 { "+Inf" } else { "-Inf" }.to_string();
    }
    if f.is_nan() {
        return "NaN".to_string();
    }
    let abs = f.abs();
    if abs != 0.0 && !(1e-4..1e21).contains(&abs) {
        return format!("{:e}", f);
    }
    format!("{}", f)
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Int(n as i64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Self::Int(n as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::text(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::text(&s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::Seq(items)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self::Map(map)
    }
}

impl From<ImageHandle> for Value {
    fn from(img: ImageHandle) -> Self {
        Self::image(img)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Self::Null, Into::into)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Value {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::Map(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(!Value::Seq(vec![]).is_truthy());
        assert!(Value::from("x").is_truthy());
        assert!(Value::Float(0.5).is_truthy());
    }

    #[test]
    fn test_text_is_escaped() {
        assert_eq!(Value::from("a<b & \"c\"").to_text(), "a&lt;b &amp; &quot;c&quot;");
        assert_eq!(Value::markup("<w:br/>").to_text(), "<w:br/>");
    }

    #[test]
    fn test_composite_printing() {
        let v: Value = [("b", Value::Int(2)), ("a", Value::from(vec![Value::Int(1), Value::Null]))]
            .into_iter()
            .collect();
        assert_eq!(v.to_text(), "map[a:[1 ] b:2]");
    }

    #[test]
    fn test_float_printing() {
        assert_eq!(Value::Float(100.0).to_text(), "100");
        assert_eq!(Value::Float(3.25).to_text(), "3.25");
        assert_eq!(Value::Float(1e21).to_text(), "1e21");
    }
}
