//! Builtin functions.
//!
//! `and` and `or` are listed here but evaluated by the executor, since their
//! arguments are evaluated lazily.

use std::cmp::Ordering;

use super::value::{format_float, Value};
use crate::docx::xml::{escape_text, unescape_xml};

const BUILTINS: &[&str] = &[
    "and", "or", "not", "len", "index", "eq", "ne", "lt", "le", "gt", "ge", "print", "printf",
    "println",
];

pub(super) fn is_builtin(name: &str) -> bool {
    BUILTINS.contains(&name)
}

type FuncResult = std::result::Result<Value, String>;

pub(super) fn call(name: &str, args: &[Value]) -> FuncResult {
    match name {
        "not" => {
            let [arg] = args else {
                return Err(arity(1, args.len()));
            };
            Ok(Value::Bool(!arg.is_truthy()))
        }
        "len" => {
            let [arg] = args else {
                return Err(arity(1, args.len()));
            };
            len(arg)
        }
        "index" => {
            let Some((item, keys)) = args.split_first() else {
                return Err(arity(1, 0));
            };
            index(item, keys)
        }
        "eq" => {
            let Some((first, rest)) = args.split_first() else {
                return Err("missing argument for comparison".to_string());
            };
            if rest.is_empty() {
                return Err("missing argument for comparison".to_string());
            }
            for other in rest {
                if equal(first, other)? {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }
        "ne" => {
            let [a, b] = args else {
                return Err(arity(2, args.len()));
            };
            Ok(Value::Bool(!equal(a, b)?))
        }
        "lt" | "le" | "gt" | "ge" => {
            let [a, b] = args else {
                return Err(arity(2, args.len()));
            };
            let ord = order(a, b)?;
            Ok(Value::Bool(match name {
                "lt" => ord == Ordering::Less,
                "le" => ord != Ordering::Greater,
                "gt" => ord == Ordering::Greater,
                _ => ord != Ordering::Less,
            }))
        }
        "print" => Ok(Value::markup(sprint(args))),
        "println" => {
            let parts: Vec<String> = args.iter().map(Value::to_text).collect();
            Ok(Value::markup(format!("{}\n", parts.join(" "))))
        }
        "printf" => {
            let Some((format, rest)) = args.split_first() else {
                return Err(arity(1, 0));
            };
            Ok(Value::markup(sprintf(&format.to_text(), rest)))
        }
        _ => Err(format!("function {:?} not defined", name)),
    }
}

fn arity(want: usize, got: usize) -> String {
    format!("wrong number of args: want {} got {}", want, got)
}

fn len(value: &Value) -> FuncResult {
    match value {
        Value::String(s) => Ok(Value::from(unescape_xml(s).chars().count())),
        Value::Seq(items) => Ok(Value::from(items.len())),
        Value::Map(map) => Ok(Value::from(map.len())),
        Value::Null => Ok(Value::Int(0)),
        other => Err(format!("len of type {}", other.type_name())),
    }
}

fn index(item: &Value, keys: &[Value]) -> FuncResult {
    let mut cur = item.clone();
    for key in keys {
        cur = match cur {
            Value::Seq(mut items) => {
                let i = position(key, items.len())?;
                items.swap_remove(i)
            }
            Value::String(s) => {
                let raw = unescape_xml(&s);
                let i = position(key, raw.len())?;
                Value::Int(i64::from(raw.as_bytes()[i]))
            }
            Value::Map(mut map) => match key {
                Value::String(k) => map.remove(&unescape_xml(k)).unwrap_or_default(),
                other => return Err(format!("value has type {}; should be string", other.type_name())),
            },
            Value::Null => return Ok(Value::Null),
            other => return Err(format!("can't index item of type {}", other.type_name())),
        };
    }
    Ok(cur)
}

fn position(key: &Value, len: usize) -> std::result::Result<usize, String> {
    let i = key
        .as_i64()
        .ok_or_else(|| format!("cannot index slice/array with type {}", key.type_name()))?;
    if i < 0 || i as usize >= len {
        return Err(format!("index out of range: {}", i));
    }
    Ok(i as usize)
}

fn equal(a: &Value, b: &Value) -> std::result::Result<bool, String> {
    Ok(match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            a.as_f64() == b.as_f64()
        }
        (Value::String(x), Value::String(y)) => x == y || unescape_xml(x) == unescape_xml(y),
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Image(x), Value::Image(y)) => x == y,
        (Value::Seq(_) | Value::Map(_), _) | (_, Value::Seq(_) | Value::Map(_)) => {
            return Err(format!(
                "non-comparable types {}: {}",
                a.type_name(),
                b.type_name()
            ));
        }
        _ => return Err("incompatible types for comparison".to_string()),
    })
}

fn order(a: &Value, b: &Value) -> std::result::Result<Ordering, String> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok(x.cmp(y)),
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => a
            .as_f64()
            .zip(b.as_f64())
            .and_then(|(x, y)| x.partial_cmp(&y))
            .ok_or_else(|| "invalid type for comparison".to_string()),
        (Value::String(x), Value::String(y)) => Ok(unescape_xml(x).cmp(&unescape_xml(y))),
        _ if a.type_name() != b.type_name() => Err("incompatible types for comparison".to_string()),
        _ => Err("invalid type for comparison".to_string()),
    }
}

/// Operands are separated by a space when neither side is a string
fn sprint(args: &[Value]) -> String {
    let mut out = String::new();
    for (i, arg) in args.iter().enumerate() {
        if i > 0 && !matches!(arg, Value::String(_)) && !matches!(args[i - 1], Value::String(_)) {
            out.push(' ');
        }
        out.push_str(&arg.to_text());
    }
    out
}

#[derive(Default)]
struct Spec {
    minus: bool,
    plus: bool,
    space: bool,
    zero: bool,
    width: Option<usize>,
    precision: Option<usize>,
}

fn sprintf(format: &str, args: &[Value]) -> String {
    let mut out = String::with_capacity(format.len());
    let mut chars = format.chars().peekable();
    let mut next_arg = 0;

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }

        let mut spec = Spec::default();
        while let Some(&flag) = chars.peek() {
            match flag {
                '-' => spec.minus = true,
                '+' => spec.plus = true,
                ' ' => spec.space = true,
                '0' => spec.zero = true,
                _ => break,
            }
            chars.next();
        }
        spec.width = digits(&mut chars);
        if chars.peek() == Some(&'.') {
            chars.next();
            spec.precision = Some(digits(&mut chars).unwrap_or(0));
        }

        let Some(verb) = chars.next() else {
            out.push_str("%!(NOVERB)");
            break;
        };
        if verb == '%' {
            out.push('%');
            continue;
        }
        let Some(arg) = args.get(next_arg) else {
            out.push_str(&format!("%!{}(MISSING)", verb));
            continue;
        };
        next_arg += 1;

        let body = match format_verb(verb, arg, &spec) {
            Some(body) => body,
            None => format!("%!{}({}={})", verb, arg.type_name(), arg.to_text()),
        };
        out.push_str(&pad(body, &spec, is_numeric_verb(verb) && arg.as_f64().is_some()));
    }

    if next_arg < args.len() {
        let extra: Vec<String> = args[next_arg..]
            .iter()
            .map(|a| format!("{}={}", a.type_name(), a.to_text()))
            .collect();
        out.push_str(&format!("%!(EXTRA {})", extra.join(", ")));
    }
    out
}

fn digits(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Option<usize> {
    let mut n: Option<usize> = None;
    while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
        n = Some(n.unwrap_or(0) * 10 + d as usize);
        chars.next();
    }
    n
}

fn is_numeric_verb(verb: char) -> bool {
    matches!(verb, 'd' | 'f' | 'F' | 'e' | 'E' | 'g' | 'G' | 'v' | 'x' | 'X')
}

fn format_verb(verb: char, arg: &Value, spec: &Spec) -> Option<String> {
    let signed = |s: String, negative: bool| {
        if negative {
            s
        } else if spec.plus {
            format!("+{}", s)
        } else if spec.space {
            format!(" {}", s)
        } else {
            s
        }
    };

    Some(match verb {
        'v' => match arg {
            Value::Int(n) => signed(n.to_string(), *n < 0),
            Value::Float(f) => signed(format_float(*f), *f < 0.0),
            other => other.to_text(),
        },
        's' => match arg {
            Value::String(s) => truncate(s, spec.precision),
            other => truncate(&other.to_text(), spec.precision),
        },
        'd' => {
            let n = match arg {
                Value::Int(n) => *n,
                _ => return None,
            };
            signed(n.to_string(), n < 0)
        }
        'f' | 'F' => {
            let f = arg.as_f64()?;
            signed(format!("{:.*}", spec.precision.unwrap_or(6), f), f < 0.0)
        }
        'e' | 'E' => {
            let f = arg.as_f64()?;
            let s = exponent(f, spec.precision.unwrap_or(6));
            let s = if verb == 'E' { s.to_uppercase() } else { s };
            signed(s, f < 0.0)
        }
        'g' | 'G' => {
            let f = arg.as_f64()?;
            let s = match spec.precision {
                Some(p) => trim_float(&format!("{:.*}", p, f)),
                None => format_float(f),
            };
            signed(s, f < 0.0)
        }
        't' => match arg {
            Value::Bool(b) => b.to_string(),
            _ => return None,
        },
        'q' => match arg {
            Value::String(s) => escape_text(&format!("{:?}", unescape_xml(s))),
            Value::Int(n) => escape_text(&format!("{:?}", char::from_u32(*n as u32)?)),
            _ => return None,
        },
        'x' | 'X' => {
            let s = match arg {
                Value::Int(n) if *n < 0 => format!("-{:x}", n.unsigned_abs()),
                Value::Int(n) => format!("{:x}", n),
                Value::String(s) => unescape_xml(s).bytes().map(|b| format!("{:02x}", b)).collect(),
                _ => return None,
            };
            if verb == 'X' {
                s.to_uppercase()
            } else {
                s
            }
        }
        'c' => match arg {
            Value::Int(n) => escape_text(&char::from_u32(*n as u32)?.to_string()),
            _ => return None,
        },
        _ => return None,
    })
}

/// `1.5e+02` style exponent
fn exponent(f: f64, precision: usize) -> String {
    let s = format!("{:.*e}", precision, f);
    match s.split_once('e') {
        Some((mantissa, exp)) => {
            let exp: i32 = exp.parse().unwrap_or(0);
            let sign = if exp < 0 { '-' } else { '+' };
            format!("{}e{}{:02}", mantissa, sign, exp.abs())
        }
        None => s,
    }
}

fn trim_float(s: &str) -> String {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s.to_string()
    }
}

fn truncate(s: &str, precision: Option<usize>) -> String {
    match precision {
        Some(p) => escape_text(&unescape_xml(s).chars().take(p).collect::<String>()),
        None => s.to_string(),
    }
}

fn pad(body: String, spec: &Spec, numeric: bool) -> String {
    let Some(width) = spec.width else {
        return body;
    };
    let len = body.chars().count();
    if len >= width {
        return body;
    }
    let fill = width - len;
    if spec.minus {
        return format!("{}{}", body, " ".repeat(fill));
    }
    if spec.zero && numeric {
        let split = body
            .char_indices()
            .find(|(_, c)| !matches!(c, '+' | '-' | ' '))
            .map_or(0, |(i, _)| i);
        return format!("{}{}{}", &body[..split], "0".repeat(fill), &body[split..]);
    }
    format!("{}{}", " ".repeat(fill), body)
}
